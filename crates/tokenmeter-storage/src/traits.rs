//! Storage trait definitions

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokenmeter_core::{CachedSummary, EventFilter, UsageEvent};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Lazy, forward-only sequence of events read from the log
pub type EventStream = BoxStream<'static, UsageEvent>;

/// Outcome of an age-based trim
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrimStats {
    pub kept: u64,
    pub removed: u64,
    pub duration_ms: u64,
}

/// Append-only store of usage events
#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    /// Append a single event as one line
    async fn append(&self, event: &UsageEvent) -> StorageResult<()>;

    /// Stream events matching `filter`. A missing log yields an empty stream.
    async fn read(&self, filter: EventFilter) -> StorageResult<EventStream>;

    /// Drop every event older than `cutoff` (ms)
    async fn trim(&self, cutoff: i64) -> StorageResult<TrimStats>;

    /// Delete the whole log
    async fn clear(&self) -> StorageResult<()>;
}

/// Persisted tier of the summary cache
#[async_trait::async_trait]
pub trait SummaryStore: Send + Sync {
    /// Load the persisted summary, `None` when nothing has been saved yet
    async fn load(&self) -> StorageResult<Option<CachedSummary>>;

    async fn save(&self, cached: &CachedSummary) -> StorageResult<()>;

    async fn clear(&self) -> StorageResult<()>;
}

#[cfg(test)]
mod tests;
