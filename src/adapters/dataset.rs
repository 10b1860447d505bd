use crate::domain::model::{HexagramRecord, LineTextRecord};
use crate::domain::ports::HexagramDataset;
use crate::utils::error::{DivinationError, Result};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

const BUNDLED_JSON: &str = include_str!("../../assets/hexagrams.json");

static BUNDLED: OnceCell<Arc<InMemoryDataset>> = OnceCell::new();

#[derive(Debug, Deserialize)]
struct DatasetFile {
    hexagrams: Vec<HexagramRecord>,
    lines: Vec<LineTextRecord>,
}

/// Reference dataset held entirely in memory, indexed by binary code and by
/// (hexagram id, line position). Read-only after construction.
#[derive(Debug)]
pub struct InMemoryDataset {
    by_code: HashMap<String, HexagramRecord>,
    lines: HashMap<(u32, u8), LineTextRecord>,
}

impl InMemoryDataset {
    pub fn from_records(
        hexagrams: Vec<HexagramRecord>,
        lines: Vec<LineTextRecord>,
    ) -> Result<Self> {
        let mut by_code = HashMap::with_capacity(hexagrams.len());
        for record in hexagrams {
            if let Some(previous) = by_code.insert(record.binary_code.clone(), record) {
                return Err(DivinationError::DatasetError {
                    message: format!("duplicate binary code {}", previous.binary_code),
                });
            }
        }

        let mut line_map = HashMap::with_capacity(lines.len());
        for line in lines {
            let key = (line.hexagram_id, line.position_num);
            if line_map.insert(key, line).is_some() {
                return Err(DivinationError::DatasetError {
                    message: format!("duplicate line text for hexagram {} position {}", key.0, key.1),
                });
            }
        }

        Ok(Self {
            by_code,
            lines: line_map,
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: DatasetFile = serde_json::from_str(json)?;
        if file.hexagrams.len() != 64 {
            tracing::warn!(
                "reference dataset has {} hexagrams, expected 64",
                file.hexagrams.len()
            );
        }
        Self::from_records(file.hexagrams, file.lines)
    }

    /// The dataset bundled with the crate, loaded lazily at most once per
    /// process and shared read-only across all lookup call sites.
    pub fn bundled() -> Result<Arc<Self>> {
        BUNDLED
            .get_or_try_init(|| Self::from_json(BUNDLED_JSON).map(Arc::new))
            .cloned()
    }
}

impl HexagramDataset for InMemoryDataset {
    fn hexagram_by_code(&self, code: &str) -> Result<Option<HexagramRecord>> {
        Ok(self.by_code.get(code).cloned())
    }

    fn line_texts(&self, hexagram_id: u32, positions: &[u8]) -> Result<Vec<LineTextRecord>> {
        Ok(positions
            .iter()
            .filter_map(|&position| self.lines.get(&(hexagram_id, position)).cloned())
            .collect())
    }
}
