use conclave_host_storage::StorageError;
use thiserror::Error;

/// Error type for the [`LogIndexer`](crate::LogIndexer).
#[derive(Error, Debug)]
pub enum LogIndexerError {
    /// Failed to read or write relevance metadata.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Failed to look up contract code in state.
    #[error("failed to read state: {0}")]
    StateAccess(String),

    /// The batch holds more transactions or logs than a log key can address.
    #[error("log position out of range: {0}")]
    PositionOverflow(String),
}
