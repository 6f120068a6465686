use crate::repository::{BatchRepository, EnclaveClient, PeerMessenger};
use conclave_host_storage::{BatchStorageReader, BatchStorageWriter};
use conclave_protocol::{BatchMsg, BatchRequest};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};

/// A message delivered to the batch repository by the peer layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundPeerMessage {
    /// Batches gossiped by the sequencer or sent in reply to a catch-up request.
    Batches(BatchMsg),
    /// A peer asking for batches.
    BatchRequest(BatchRequest),
}

/// Represents an actor that feeds inbound peer messages to a [`BatchRepository`].
#[derive(Debug)]
pub struct BatchRepositoryActor<DB, P, E> {
    repository: BatchRepository<DB, P, E>,
    cancel_token: CancellationToken,
    inbound_rx: mpsc::Receiver<InboundPeerMessage>,
}

impl<DB, P, E> BatchRepositoryActor<DB, P, E>
where
    DB: BatchStorageReader + BatchStorageWriter + Send + Sync + 'static,
    P: PeerMessenger + 'static,
    E: EnclaveClient + 'static,
{
    /// Creates a new [`BatchRepositoryActor`].
    pub const fn new(
        repository: BatchRepository<DB, P, E>,
        cancel_token: CancellationToken,
        inbound_rx: mpsc::Receiver<InboundPeerMessage>,
    ) -> Self {
        Self { repository, cancel_token, inbound_rx }
    }

    /// Starts the actor, dispatching messages until cancelled or the channel closes.
    pub async fn start(mut self) {
        loop {
            tokio::select! {
                maybe_message = self.inbound_rx.recv() => {
                    let Some(message) = maybe_message else {
                        info!(
                            target: "batch_repository",
                            "Inbound peer channel closed, stopping..."
                        );
                        break;
                    };
                    self.handle_message(message).await;
                }
                _ = self.cancel_token.cancelled() => {
                    info!(
                        target: "batch_repository",
                        "BatchRepositoryActor cancellation requested, stopping..."
                    );
                    break;
                }
            }
        }
    }

    async fn handle_message(&self, message: InboundPeerMessage) {
        match message {
            InboundPeerMessage::Batches(msg) => {
                trace!(
                    target: "batch_repository",
                    count = msg.batches.len(),
                    is_catch_up = msg.is_catch_up,
                    "Received batches"
                );
                self.repository.handle_batches(&msg.batches, !msg.is_catch_up).await;
            }
            InboundPeerMessage::BatchRequest(request) => {
                trace!(
                    target: "batch_repository",
                    requester = %request.requester,
                    from_seq_no = request.from_seq_no,
                    "Received batch request"
                );
                self.repository.handle_batch_request(&request.requester, request.from_seq_no).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        RepositoryConfig,
        repository::{EnclaveError, PeerError},
    };
    use async_trait::async_trait;
    use conclave_host_storage::ChainDb;
    use conclave_protocol::{BatchHeader, ExtBatch};
    use mockall::mock;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tracing::Span;

    mock! {
        #[derive(Debug)]
        pub Peers {}

        #[async_trait]
        impl PeerMessenger for Peers {
            async fn request_batches_from_sequencer(
                &self,
                from_seq_no: u64,
            ) -> Result<(), PeerError>;
            async fn send_batches(&self, msg: BatchMsg, to: &str) -> Result<(), PeerError>;
            fn subscribe(&self, sender: mpsc::Sender<InboundPeerMessage>) -> Result<(), PeerError>;
        }
    }

    mock! {
        #[derive(Debug)]
        pub Enclave {}

        #[async_trait]
        impl EnclaveClient for Enclave {
            async fn lookup_batch_by_seq_no(&self, seq_no: u64) -> Result<ExtBatch, EnclaveError>;
        }
    }

    fn batch(seq_no: u64) -> ExtBatch {
        let header =
            BatchHeader { number: seq_no, sequencer_order_no: seq_no, ..Default::default() };
        ExtBatch::new(header, vec![], Default::default())
    }

    #[tokio::test]
    async fn test_actor_dispatches_until_channel_closes() {
        let dir = TempDir::new().expect("create temp dir");
        let db = Arc::new(ChainDb::new(dir.path()).expect("create db"));

        let mut peers = MockPeers::new();
        peers
            .expect_send_batches()
            .withf(|msg, to| {
                to.to_string() == "peer-1" && msg.is_catch_up && msg.batches == vec![batch(1)]
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let repository = BatchRepository::new(
            RepositoryConfig::default(),
            Arc::clone(&db),
            Arc::new(peers),
            Arc::new(MockEnclave::new()),
            Span::none(),
        );
        let (tx, rx) = mpsc::channel(10);
        let actor = BatchRepositoryActor::new(repository.clone(), CancellationToken::new(), rx);
        let handle = tokio::spawn(actor.start());

        tx.send(InboundPeerMessage::Batches(BatchMsg::catch_up(vec![batch(1)])))
            .await
            .expect("send batches");
        tx.send(InboundPeerMessage::BatchRequest(BatchRequest {
            requester: "peer-1".to_string(),
            from_seq_no: 1,
        }))
        .await
        .expect("send request");

        // Drop the sender to close the channel and end the actor.
        drop(tx);
        handle.await.expect("actor task");

        assert_eq!(repository.latest_batch_seq_no(), 1);
    }

    #[tokio::test]
    async fn test_actor_stops_on_cancellation() {
        let dir = TempDir::new().expect("create temp dir");
        let db = Arc::new(ChainDb::new(dir.path()).expect("create db"));
        let repository = BatchRepository::new(
            RepositoryConfig::default(),
            db,
            Arc::new(MockPeers::new()),
            Arc::new(MockEnclave::new()),
            Span::none(),
        );

        let (_tx, rx) = mpsc::channel(10);
        let cancel_token = CancellationToken::new();
        let actor = BatchRepositoryActor::new(repository, cancel_token.clone(), rx);
        let handle = tokio::spawn(actor.start());

        cancel_token.cancel();
        handle.await.expect("actor task");
    }
}
