//! Error types for the token monitor

use tokenmeter_storage::StorageError;

/// Result type for monitor operations
pub type MonitorResult<T> = Result<T, MonitorError>;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] tokenmeter_core::Error),
}
