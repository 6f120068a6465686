use crate::repository::{EnclaveError, InboundPeerMessage, PeerError};
use async_trait::async_trait;
use conclave_protocol::{BatchMsg, ExtBatch};
use std::fmt::Debug;
use tokio::sync::mpsc;

/// The peer layer used by the batch repository.
///
/// Implementations own the transport; the repository only deals in logical messages.
#[async_trait]
pub trait PeerMessenger: Send + Sync + Debug {
    /// Asks the sequencer for the batches starting at `from_seq_no`.
    ///
    /// The reply arrives asynchronously as a catch-up [`BatchMsg`].
    async fn request_batches_from_sequencer(&self, from_seq_no: u64) -> Result<(), PeerError>;

    /// Sends `msg` directly to the peer identified by `to`.
    async fn send_batches(&self, msg: BatchMsg, to: &str) -> Result<(), PeerError>;

    /// Registers `sender` to receive inbound batches and batch requests.
    fn subscribe(&self, sender: mpsc::Sender<InboundPeerMessage>) -> Result<(), PeerError>;
}

/// Access to the local enclave, used by the sequencer to back-fill batches it never stored.
#[async_trait]
pub trait EnclaveClient: Send + Sync + Debug {
    /// Looks up the batch with the given sequence number.
    async fn lookup_batch_by_seq_no(&self, seq_no: u64) -> Result<ExtBatch, EnclaveError>;
}

/// Receives every new live batch.
#[async_trait]
pub trait BatchSubscriber: Send + Sync + Debug {
    /// Handles a new batch. Calls for different subscribers run concurrently.
    async fn handle_batch(&self, batch: ExtBatch);
}
