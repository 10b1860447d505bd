use crate::domain::model::{NewReading, SavedReading};
use crate::domain::ports::ReadingStore;
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::{broadcast, Mutex};

/// Notifications for observers of the local reading file, so UI surfaces can
/// refresh without polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    Saved(i64),
    Deleted(i64),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    next_id: i64,
    items: Vec<SavedReading>,
}

/// Readings persisted as a single JSON file on disk. Writes go through one
/// async mutex; the file is rewritten whole on every mutation.
pub struct LocalReadingStore {
    path: PathBuf,
    lock: Mutex<()>,
    events: broadcast::Sender<StoreEvent>,
}

impl LocalReadingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    async fn load(path: &Path) -> Result<StoreFile> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(path: &Path, file: &StoreFile) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, serde_json::to_vec_pretty(file)?).await?;
        Ok(())
    }
}

#[async_trait]
impl ReadingStore for LocalReadingStore {
    async fn save(&self, reading: NewReading) -> Result<i64> {
        let _guard = self.lock.lock().await;
        let mut file = Self::load(&self.path).await?;

        let id = file.next_id.max(1);
        file.next_id = id + 1;
        file.items.push(SavedReading {
            id,
            question: reading.question,
            throws: reading.throws,
            hexagram_id: reading.hexagram_id,
            hexagram_code: reading.hexagram_code,
            hexagram_name: reading.hexagram_name,
            display_name: reading.display_name,
            trigram_title: reading.trigram_title,
            judgment: reading.judgment,
            changing_lines: reading.changing_lines,
            changing_line_texts: reading.changing_line_texts,
            created_at: Utc::now(),
        });

        Self::persist(&self.path, &file).await?;
        tracing::debug!("saved reading {id} to {}", self.path.display());
        let _ = self.events.send(StoreEvent::Saved(id));
        Ok(id)
    }

    async fn list(&self, limit: usize) -> Result<Vec<SavedReading>> {
        let _guard = self.lock.lock().await;
        let file = Self::load(&self.path).await?;
        let mut items = file.items;
        items.sort_by(|a, b| b.id.cmp(&a.id));
        items.truncate(limit);
        Ok(items)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut file = Self::load(&self.path).await?;

        let before = file.items.len();
        file.items.retain(|item| item.id != id);
        if file.items.len() == before {
            return Ok(false);
        }

        Self::persist(&self.path, &file).await?;
        let _ = self.events.send(StoreEvent::Deleted(id));
        Ok(true)
    }
}
