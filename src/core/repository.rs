use crate::domain::model::{CastSequence, HexagramCode, HexagramContext};
use crate::domain::ports::HexagramDataset;
use crate::utils::error::{DivinationError, Result};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Read-only lookup of hexagram metadata and changing-line texts.
///
/// Consulted twice per reading: right after a cast, and again when
/// rendering persisted history. Both paths go through [`lookup`] so the
/// resulting context shape is identical for identical inputs.
///
/// [`lookup`]: HexagramRepository::lookup
pub struct HexagramRepository<D: HexagramDataset> {
    dataset: Arc<D>,
}

impl<D: HexagramDataset> HexagramRepository<D> {
    pub fn new(dataset: Arc<D>) -> Self {
        Self { dataset }
    }

    /// Resolves a code plus changing lines to a full display context.
    ///
    /// Zero matches for a well-formed code means the dataset itself is bad:
    /// all 64 codes must be present exactly once.
    pub fn lookup(&self, code: &HexagramCode, changing_lines: &[u8]) -> Result<HexagramContext> {
        let record = self
            .dataset
            .hexagram_by_code(code.as_str())?
            .ok_or_else(|| {
                tracing::error!("dataset has no hexagram for code {code}");
                DivinationError::HexagramNotFound {
                    code: code.to_string(),
                }
            })?;

        let changing_lines = normalize_changing_lines(changing_lines);

        let mut changing_line_texts = Vec::with_capacity(changing_lines.len());
        for line in self.dataset.line_texts(record.id, &changing_lines)? {
            let position = line.position.trim();
            let text = line.text.trim();
            if !position.is_empty() && !text.is_empty() {
                changing_line_texts.push(format!("{position}，{text}"));
            } else if !text.is_empty() {
                changing_line_texts.push(text.to_string());
            }
        }

        let name = record.name.trim();
        let (display_name, trigram_title) = split_hexagram_name(name);

        Ok(HexagramContext {
            hexagram_id: record.id,
            hexagram_code: record.binary_code.clone(),
            hexagram_name: name.to_string(),
            display_name,
            trigram_title,
            judgment: record.judgment.trim().to_string(),
            changing_lines,
            changing_line_texts,
        })
    }

    /// Lookup for codes reconstructed from persisted or remote data, which
    /// may be corrupt. Fails with `InvalidHexagramCode` before touching the
    /// dataset.
    pub fn lookup_code_str(&self, code: &str, changing_lines: &[u8]) -> Result<HexagramContext> {
        let code = HexagramCode::new(code.trim())?;
        self.lookup(&code, changing_lines)
    }

    /// Lookup straight from a live cast.
    pub fn lookup_cast(&self, cast: &CastSequence) -> Result<HexagramContext> {
        let encoding = crate::core::encode::encode(cast);
        self.lookup(&encoding.code, &encoding.changing_lines)
    }
}

/// Deduplicates, clamps to [1, 6], sorts ascending.
fn normalize_changing_lines(changing_lines: &[u8]) -> Vec<u8> {
    changing_lines
        .iter()
        .copied()
        .filter(|p| (1..=6).contains(p))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// First whitespace token is the display name; the rest, joined by a single
/// space, is the trigram title (empty when absent).
fn split_hexagram_name(raw: &str) -> (String, String) {
    let mut parts = raw.split_whitespace();
    match parts.next() {
        Some(first) => (
            first.to_string(),
            parts.collect::<Vec<_>>().join(" "),
        ),
        None => (raw.to_string(), String::new()),
    }
}
