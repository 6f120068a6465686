use conclave_protocol::InvalidPageSize;
use reth_db::DatabaseError;
use thiserror::Error;

/// Errors that may occur while interacting with the host chain store.
///
/// This enum is used across all implementations of the storage traits.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Represents a database error that occurred while interacting with storage.
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Represents an error that occurred while initializing the database.
    #[error(transparent)]
    DatabaseInit(#[from] eyre::Report),

    /// The expected entry was not found in the database.
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// An entry with the same identity is already stored.
    #[error("entry already exists: {0}")]
    EntryAlreadyExists(String),

    /// Represents a conflict occurred while attempting to write to the database.
    #[error("conflict error: {0}")]
    ConflictError(String),

    /// The query was rejected before touching the database.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl StorageError {
    /// Returns `true` if the error reports a missing entry.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::EntryNotFound(_))
    }

    /// Returns `true` if the error reports an entry that is already stored.
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::EntryAlreadyExists(_))
    }
}

impl From<InvalidPageSize> for StorageError {
    fn from(err: InvalidPageSize) -> Self {
        Self::InvalidQuery(err.to_string())
    }
}
