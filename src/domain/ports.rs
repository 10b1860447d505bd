use crate::domain::model::{
    CastSequence, HexagramRecord, InterpretationOutcome, LineTextRecord, NewReading, SavedReading,
};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Read-only access to the reference dataset. Lookups never suspend; the
/// backing data is loaded once and shared across all call sites.
pub trait HexagramDataset: Send + Sync {
    /// Returns the unique record for a binary code. Zero matches is a
    /// data-integrity failure reported by the repository, not here.
    fn hexagram_by_code(&self, code: &str) -> Result<Option<HexagramRecord>>;

    /// Line texts for the given hexagram at the given 1-based positions,
    /// ordered by position. Missing positions are simply absent.
    fn line_texts(&self, hexagram_id: u32, positions: &[u8]) -> Result<Vec<LineTextRecord>>;
}

/// Local append-only persistence for completed readings.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn save(&self, reading: NewReading) -> Result<i64>;
    async fn list(&self, limit: usize) -> Result<Vec<SavedReading>>;
    async fn delete(&self, id: i64) -> Result<bool>;
}

/// Remote interpretation service consumed as a narrative stream.
///
/// `on_fragment` receives narrative text in arrival order. Once `cancel` is
/// triggered, further fragments become no-ops (the read itself is not
/// aborted) but the outcome is still returned to the caller.
#[async_trait]
pub trait Interpreter: Send + Sync {
    async fn interpret_stream(
        &self,
        question: &str,
        throws: &CastSequence,
        unlock_token: Option<&str>,
        cancel: &CancellationToken,
        on_fragment: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<InterpretationOutcome>;
}

pub trait ConfigProvider: Send + Sync {
    fn api_base_url(&self) -> &str;
    fn auth_token(&self) -> Option<&str>;
    fn store_path(&self) -> &str;
    /// Pause between revealed lines during casting. Presentation only.
    fn line_delay(&self) -> Duration;
}
