use conclave_host_storage::StorageError;
use thiserror::Error;

/// Errors reported by a [`PeerMessenger`](crate::PeerMessenger).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PeerError {
    /// No connection to the addressed peer.
    #[error("peer {0} is unreachable")]
    Unreachable(String),

    /// The message could not be delivered.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// The inbound message subscription could not be registered.
    #[error("failed to subscribe to inbound messages: {0}")]
    SubscriptionFailed(String),
}

/// Errors reported by an [`EnclaveClient`](crate::EnclaveClient).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnclaveError {
    /// The enclave holds no batch with the requested sequence number.
    #[error("enclave has no batch with sequence number {0}")]
    BatchNotFound(u64),

    /// The enclave could not be reached.
    #[error("enclave unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by the [`BatchRepository`](crate::BatchRepository).
#[derive(Debug, Error)]
pub enum BatchRepositoryError {
    /// Represents an error that occurred while interacting with the storage layer.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Represents an error returned by the enclave fallback.
    #[error(transparent)]
    Enclave(#[from] EnclaveError),

    /// Represents an error returned by the peer layer.
    #[error(transparent)]
    Peer(#[from] PeerError),

    /// The repository was started twice.
    #[error("batch repository is already running")]
    AlreadyRunning,
}

impl BatchRepositoryError {
    /// Returns `true` if the requested batch is not available yet.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(err) if err.is_not_found()) ||
            matches!(self, Self::Enclave(EnclaveError::BatchNotFound(_)))
    }

    /// Returns `true` if the batch was already stored.
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::Storage(err) if err.is_already_exists())
    }
}
