use crate::{
    Metrics, RepositoryConfig,
    repository::{
        BatchRepositoryActor, BatchRepositoryError, BatchSubscriber, EnclaveClient, PeerMessenger,
    },
};
use conclave_host_storage::{BatchStorageReader, BatchStorageWriter};
use conclave_protocol::{BatchMsg, ExtBatch};
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use tokio::{
    sync::{Mutex, RwLock, mpsc},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, trace, warn};

/// Capacity of the channel carrying inbound peer messages to the actor.
const INBOUND_CHANNEL_SIZE: usize = 256;

/// A catch-up request that has been sent but not answered yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InFlightRequest {
    seq_no: u64,
    requested_at: Instant,
}

/// Health of a [`BatchRepository`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthStatus {
    /// Why the repository is unhealthy, if it is.
    pub error: Option<String>,
}

impl HealthStatus {
    /// Returns `true` if no problem was reported.
    pub const fn is_healthy(&self) -> bool {
        self.error.is_none()
    }
}

/// Stores batches and keeps the local store in sync with the network.
///
/// The repository tracks the highest batch sequence number seen from any source. A lookup for a
/// lower sequence number that misses the store reveals a gap: a sequencer back-fills it from its
/// own enclave, a validator asks its peers for the missing batches and reports the batch as not
/// found until the reply has been ingested. At most one catch-up request is in flight at a time,
/// and an unanswered request expires after
/// [`catch_up_request_timeout`](RepositoryConfig::catch_up_request_timeout).
///
/// The handle is cheap to clone; clones share all state.
#[derive(Debug)]
pub struct BatchRepository<DB, P, E> {
    inner: Arc<RepositoryInner<DB, P, E>>,
}

impl<DB, P, E> Clone for BatchRepository<DB, P, E> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

#[derive(Debug)]
struct RepositoryInner<DB, P, E> {
    config: RepositoryConfig,
    db: Arc<DB>,
    peers: Arc<P>,
    enclave: Arc<E>,
    subscribers: RwLock<Vec<Arc<dyn BatchSubscriber>>>,

    // Highest sequence number of any successfully stored batch.
    latest_batch_seq_no: AtomicU64,

    // Guards both the check and the update of the catch-up marker.
    in_flight: Mutex<Option<InFlightRequest>>,

    running: AtomicBool,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    span: Span,
}

impl<DB, P, E> BatchRepository<DB, P, E>
where
    DB: BatchStorageReader + BatchStorageWriter + Send + Sync + 'static,
    P: PeerMessenger + 'static,
    E: EnclaveClient + 'static,
{
    /// Creates a new [`BatchRepository`].
    ///
    /// Work spawned by the repository is instrumented with `span`.
    pub fn new(
        config: RepositoryConfig,
        db: Arc<DB>,
        peers: Arc<P>,
        enclave: Arc<E>,
        span: Span,
    ) -> Self {
        let inner = RepositoryInner {
            config,
            db,
            peers,
            enclave,
            subscribers: RwLock::new(Vec::new()),
            latest_batch_seq_no: AtomicU64::new(0),
            in_flight: Mutex::new(None),
            running: AtomicBool::new(false),
            task: Mutex::new(None),
            span,
        };
        Self { inner: Arc::new(inner) }
    }

    /// Returns the configuration of this repository.
    pub fn config(&self) -> &RepositoryConfig {
        &self.inner.config
    }

    /// Returns the highest sequence number of any batch stored through this repository.
    pub fn latest_batch_seq_no(&self) -> u64 {
        self.inner.latest_batch_seq_no.load(Ordering::Acquire)
    }

    /// Registers a subscriber for new live batches.
    pub async fn subscribe(&self, subscriber: Arc<dyn BatchSubscriber>) {
        self.inner.subscribers.write().await.push(subscriber);
    }

    /// Registers with the peer layer and starts serving inbound peer messages.
    pub async fn start(&self) -> Result<(), BatchRepositoryError> {
        let mut task = self.inner.task.lock().await;
        if task.is_some() {
            warn!(target: "batch_repository", "Batch repository is already running");
            return Err(BatchRepositoryError::AlreadyRunning);
        }

        Metrics::init();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_SIZE);
        self.inner.peers.subscribe(inbound_tx)?;

        let cancel_token = CancellationToken::new();
        let actor = BatchRepositoryActor::new(self.clone(), cancel_token.clone(), inbound_rx);
        let handle = tokio::spawn(actor.start().instrument(self.inner.span.clone()));
        *task = Some((cancel_token, handle));

        self.inner.running.store(true, Ordering::Release);
        info!(target: "batch_repository", node_type = %self.inner.config.node_type, "Started");
        Ok(())
    }

    /// Stops serving inbound peer messages.
    pub async fn stop(&self) {
        let task = self.inner.task.lock().await.take();
        self.inner.running.store(false, Ordering::Release);
        let Some((cancel_token, handle)) = task else {
            return;
        };
        cancel_token.cancel();
        if let Err(err) = handle.await {
            warn!(target: "batch_repository", %err, "Batch repository actor did not stop cleanly");
        }
        info!(target: "batch_repository", "Stopped");
    }

    /// Reports whether the repository is serving.
    pub fn health_status(&self) -> HealthStatus {
        let error =
            (!self.inner.running.load(Ordering::Acquire)).then(|| "not running".to_string());
        HealthStatus { error }
    }

    /// Stores a batch produced locally, read from a rollup or received from a peer.
    ///
    /// # Returns
    /// * `Err(e)` with `e.is_already_exists()` if the batch is already stored. Callers
    ///   typically ignore this.
    pub fn add_batch(&self, batch: &ExtBatch) -> Result<(), BatchRepositoryError> {
        let seq_no = batch.seq_no();
        debug!(target: "batch_repository", seq_no, hash = %batch.hash(), "Saving batch");
        self.inner.db.add_batch(batch)?;
        self.inner.latest_batch_seq_no.fetch_max(seq_no, Ordering::AcqRel);
        Ok(())
    }

    /// Returns the batch with the given sequence number.
    ///
    /// Never waits for the network. If the batch is missing but a later one has been seen, a
    /// validator schedules a catch-up request and returns not found straight away; the caller
    /// is expected to retry. A sequencer asks its enclave instead.
    pub async fn fetch_batch_by_seq_no(
        &self,
        seq_no: u64,
    ) -> Result<ExtBatch, BatchRepositoryError> {
        let err = match self.inner.db.get_batch_by_seq_no(seq_no) {
            Ok(batch) => return Ok(batch),
            Err(err) => err,
        };
        if !err.is_not_found() || seq_no >= self.latest_batch_seq_no() {
            return Err(err.into());
        }

        if self.inner.config.is_sequencer() {
            return self.fetch_batch_from_enclave(seq_no).await;
        }

        let repository = self.clone();
        tokio::spawn(
            async move { repository.request_missing_batches_from_peers(seq_no).await }
                .instrument(self.inner.span.clone()),
        );
        Err(err.into())
    }

    /// Looks the batch up in the enclave and stores it in the background.
    async fn fetch_batch_from_enclave(
        &self,
        seq_no: u64,
    ) -> Result<ExtBatch, BatchRepositoryError> {
        let batch = self.inner.enclave.lookup_batch_by_seq_no(seq_no).await?;

        let repository = self.clone();
        let backfill = batch.clone();
        tokio::spawn(
            async move {
                if let Err(err) = repository.add_batch(&backfill) {
                    info!(
                        target: "batch_repository",
                        seq_no,
                        %err,
                        "Unable to store batch returned by the enclave"
                    );
                }
            }
            .instrument(self.inner.span.clone()),
        );
        Ok(batch)
    }

    /// Ingests batches delivered by a peer.
    ///
    /// A response whose first batch is the one last requested clears the in-flight catch-up
    /// marker, whatever happens to the batches afterwards. Batches are then stored in order:
    /// already stored ones are skipped, and the first other failure drops the rest of the
    /// response. New live batches are handed to every subscriber.
    pub async fn handle_batches(&self, batches: &[ExtBatch], is_live: bool) {
        if let Some(first) = batches.first() {
            let mut in_flight = self.inner.in_flight.lock().await;
            if in_flight.is_some_and(|request| request.seq_no == first.seq_no()) {
                debug!(
                    target: "batch_repository",
                    seq_no = first.seq_no(),
                    "Catch-up request answered"
                );
                *in_flight = None;
            }
        }

        let subscribers =
            if is_live { self.inner.subscribers.read().await.clone() } else { Vec::new() };

        let mut ingested = 0;
        for batch in batches {
            match self.add_batch(batch) {
                Ok(()) => {
                    ingested += 1;
                    self.notify_subscribers(&subscribers, batch);
                }
                Err(err) if err.is_already_exists() => {
                    trace!(target: "batch_repository", seq_no = batch.seq_no(), "Batch known");
                }
                Err(err) => {
                    warn!(
                        target: "batch_repository",
                        seq_no = batch.seq_no(),
                        %err,
                        "Unable to add peer batch"
                    );
                    break;
                }
            }
        }
        Metrics::record_batches_ingested(ingested, is_live);
    }

    fn notify_subscribers(&self, subscribers: &[Arc<dyn BatchSubscriber>], batch: &ExtBatch) {
        for subscriber in subscribers {
            let subscriber = Arc::clone(subscriber);
            let batch = batch.clone();
            tokio::spawn(
                async move { subscriber.handle_batch(batch).await }
                    .instrument(self.inner.span.clone()),
            );
        }
    }

    /// Serves a catch-up request from a peer.
    ///
    /// Sends the consecutive batches starting at `from_seq_no`, stopping at the first gap or at
    /// [`max_batches_in_response`](RepositoryConfig::max_batches_in_response). Nothing is sent
    /// if the first batch is missing.
    pub async fn handle_batch_request(&self, requester: &str, from_seq_no: u64) {
        let cap = self.inner.config.max_batches_in_response;
        let mut batches = Vec::new();
        let mut next = from_seq_no;
        while batches.len() < cap {
            match self.inner.db.get_batch_by_seq_no(next) {
                Ok(batch) => batches.push(batch),
                Err(err) => {
                    if !err.is_not_found() {
                        warn!(
                            target: "batch_repository",
                            seq_no = next,
                            %err,
                            "Unexpected error fetching batch for peer request"
                        );
                    }
                    break;
                }
            }
            let Some(following) = next.checked_add(1) else { break };
            next = following;
        }

        if batches.is_empty() {
            trace!(target: "batch_repository", requester, from_seq_no, "No batches to send");
            return;
        }

        let count = batches.len() as u64;
        match self.inner.peers.send_batches(BatchMsg::catch_up(batches), requester).await {
            Ok(()) => {
                metrics::counter!(Metrics::BATCHES_SERVED_TOTAL).increment(count);
                debug!(target: "batch_repository", requester, from_seq_no, count, "Sent batches");
            }
            Err(err) => {
                warn!(
                    target: "batch_repository",
                    requester,
                    %err,
                    "Unable to send batches to peer"
                );
            }
        }
    }

    /// Asks the sequencer for the batches starting at `from_seq_no`.
    ///
    /// Does nothing while a previous request is still fresh. The in-flight marker is only
    /// recorded once the request has been sent.
    pub(crate) async fn request_missing_batches_from_peers(&self, from_seq_no: u64) {
        let mut in_flight = self.inner.in_flight.lock().await;
        let timeout = self.inner.config.catch_up_request_timeout();
        if let Some(request) = *in_flight {
            if request.requested_at.elapsed() < timeout {
                trace!(
                    target: "batch_repository",
                    from_seq_no,
                    requested = request.seq_no,
                    "Catch-up request already in flight"
                );
                metrics::counter!(Metrics::CATCH_UP_REQUESTS_SUPPRESSED_TOTAL).increment(1);
                return;
            }
        }

        debug!(target: "batch_repository", from_seq_no, "Requesting missing batches");
        if let Err(err) = self.inner.peers.request_batches_from_sequencer(from_seq_no).await {
            warn!(
                target: "batch_repository",
                from_seq_no,
                %err,
                "Unable to request missing batches from sequencer"
            );
            metrics::counter!(Metrics::CATCH_UP_REQUESTS_FAILED_TOTAL).increment(1);
            return;
        }
        *in_flight = Some(InFlightRequest { seq_no: from_seq_no, requested_at: Instant::now() });
        metrics::counter!(Metrics::CATCH_UP_REQUESTS_SENT_TOTAL).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{EnclaveError, InboundPeerMessage, PeerError};
    use async_trait::async_trait;
    use conclave_host_storage::ChainDb;
    use conclave_protocol::{BatchHeader, BatchRequest};
    use mockall::mock;
    use std::{sync::Mutex as StdMutex, time::Duration};
    use tempfile::TempDir;

    #[derive(Debug, Default)]
    struct RecordingPeers {
        fail_requests: AtomicBool,
        requests: StdMutex<Vec<u64>>,
        sent: StdMutex<Vec<(String, BatchMsg)>>,
        inbound: StdMutex<Option<mpsc::Sender<InboundPeerMessage>>>,
    }

    impl RecordingPeers {
        fn requests(&self) -> Vec<u64> {
            self.requests.lock().unwrap().clone()
        }

        fn sent(&self) -> Vec<(String, BatchMsg)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PeerMessenger for RecordingPeers {
        async fn request_batches_from_sequencer(&self, from_seq_no: u64) -> Result<(), PeerError> {
            self.requests.lock().unwrap().push(from_seq_no);
            if self.fail_requests.load(Ordering::SeqCst) {
                return Err(PeerError::Unreachable("sequencer".to_string()));
            }
            Ok(())
        }

        async fn send_batches(&self, msg: BatchMsg, to: &str) -> Result<(), PeerError> {
            self.sent.lock().unwrap().push((to.to_string(), msg));
            Ok(())
        }

        fn subscribe(&self, sender: mpsc::Sender<InboundPeerMessage>) -> Result<(), PeerError> {
            *self.inbound.lock().unwrap() = Some(sender);
            Ok(())
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

    #[derive(Debug)]
    struct ChannelSubscriber(mpsc::UnboundedSender<u64>);

    #[async_trait]
    impl BatchSubscriber for ChannelSubscriber {
        async fn handle_batch(&self, batch: ExtBatch) {
            self.0.send(batch.seq_no()).unwrap();
        }
    }

    type TestRepository = BatchRepository<ChainDb, RecordingPeers, MockEnclave>;

    struct Harness {
        _dir: TempDir,
        repository: TestRepository,
        peers: Arc<RecordingPeers>,
        db: Arc<ChainDb>,
    }

    fn harness_with(config: RepositoryConfig, enclave: MockEnclave) -> Harness {
        let dir = TempDir::new().expect("create temp dir");
        let db = Arc::new(ChainDb::new(dir.path()).expect("create db"));
        let peers = Arc::new(RecordingPeers::default());
        let repository = BatchRepository::new(
            config,
            Arc::clone(&db),
            Arc::clone(&peers),
            Arc::new(enclave),
            Span::none(),
        );
        Harness { _dir: dir, repository, peers, db }
    }

    fn harness() -> Harness {
        harness_with(RepositoryConfig::default(), MockEnclave::new())
    }

    fn batch(seq_no: u64) -> ExtBatch {
        let header =
            BatchHeader { number: seq_no, sequencer_order_no: seq_no, ..Default::default() };
        ExtBatch::new(header, vec![], Default::default())
    }

    /// Lets spawned tasks run.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_gap_triggers_single_catch_up_request() {
        let Harness { repository, peers, _dir, .. } = harness();
        repository.add_batch(&batch(5)).expect("add 5");
        repository.add_batch(&batch(7)).expect("add 7");

        let err = repository.fetch_batch_by_seq_no(6).await.unwrap_err();
        assert!(err.is_not_found());
        settle().await;
        assert_eq!(peers.requests(), vec![6]);

        // Within the freshness window the request is not repeated.
        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(repository.fetch_batch_by_seq_no(6).await.unwrap_err().is_not_found());
        settle().await;
        assert_eq!(peers.requests(), vec![6]);

        // Once it expires a new request goes out.
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(repository.fetch_batch_by_seq_no(6).await.unwrap_err().is_not_found());
        settle().await;
        assert_eq!(peers.requests(), vec![6, 6]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_above_watermark_does_not_request() {
        let Harness { repository, peers, _dir, .. } = harness();
        repository.add_batch(&batch(5)).expect("add 5");

        assert!(repository.fetch_batch_by_seq_no(6).await.unwrap_err().is_not_found());
        settle().await;
        assert!(peers.requests().is_empty());
        assert_eq!(repository.fetch_batch_by_seq_no(5).await.expect("stored"), batch(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_request_does_not_set_marker() {
        let Harness { repository, peers, _dir, .. } = harness();
        peers.fail_requests.store(true, Ordering::SeqCst);

        repository.request_missing_batches_from_peers(3).await;
        repository.request_missing_batches_from_peers(3).await;
        assert_eq!(peers.requests(), vec![3, 3]);
        assert!(repository.inner.in_flight.lock().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_matching_response_clears_marker() {
        let Harness { repository, peers, _dir, .. } = harness();
        repository.add_batch(&batch(6)).expect("add 6");

        repository.request_missing_batches_from_peers(6).await;
        repository.request_missing_batches_from_peers(6).await;
        assert_eq!(peers.requests(), vec![6]);

        // Batch 6 is already stored, the marker must still be cleared.
        repository.handle_batches(&[batch(6), batch(7)], false).await;
        assert!(repository.inner.in_flight.lock().await.is_none());
        assert_eq!(repository.latest_batch_seq_no(), 7);

        repository.request_missing_batches_from_peers(8).await;
        assert_eq!(peers.requests(), vec![6, 8]);
    }

    #[tokio::test]
    async fn test_live_batches_notify_subscribers() {
        let Harness { repository, _dir, .. } = harness();
        let (tx, mut rx) = mpsc::unbounded_channel();
        repository.subscribe(Arc::new(ChannelSubscriber(tx))).await;

        repository.add_batch(&batch(2)).expect("add 2");
        repository.handle_batches(&[batch(1), batch(2), batch(3)], true).await;

        let mut notified = vec![rx.recv().await.expect("first"), rx.recv().await.expect("second")];
        notified.sort_unstable();
        assert_eq!(notified, vec![1, 3]);

        repository.handle_batches(&[batch(4)], false).await;
        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_batch_request_is_capped() {
        let config = RepositoryConfig { max_batches_in_response: 3, ..Default::default() };
        let Harness { repository, peers, _dir, .. } = harness_with(config, MockEnclave::new());
        for seq_no in 1..=5 {
            repository.add_batch(&batch(seq_no)).expect("add batch");
        }

        repository.handle_batch_request("peer-1", 2).await;
        let sent = peers.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "peer-1");
        assert!(sent[0].1.is_catch_up);
        let served: Vec<_> = sent[0].1.batches.iter().map(ExtBatch::seq_no).collect();
        assert_eq!(served, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_batch_request_stops_at_gap() {
        let Harness { repository, peers, _dir, .. } = harness();
        for seq_no in [1, 2, 4] {
            repository.add_batch(&batch(seq_no)).expect("add batch");
        }

        repository.handle_batch_request("peer-1", 1).await;
        let served: Vec<_> = peers.sent()[0].1.batches.iter().map(ExtBatch::seq_no).collect();
        assert_eq!(served, vec![1, 2]);

        repository.handle_batch_request("peer-1", 3).await;
        assert_eq!(peers.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_sequencer_falls_back_to_enclave() {
        let mut enclave = MockEnclave::new();
        enclave.expect_lookup_batch_by_seq_no().times(1).returning(|seq_no| Ok(batch(seq_no)));
        let config = RepositoryConfig::for_node_type(crate::NodeType::Sequencer);
        let Harness { repository, peers, db, _dir } = harness_with(config, enclave);
        repository.add_batch(&batch(9)).expect("add 9");

        let fetched = repository.fetch_batch_by_seq_no(4).await.expect("enclave batch");
        assert_eq!(fetched, batch(4));
        assert!(peers.requests().is_empty());

        for _ in 0..100 {
            if db.get_batch_by_seq_no(4).is_ok() {
                return;
            }
            settle().await;
        }
        panic!("batch from the enclave was not stored");
    }

    #[tokio::test]
    async fn test_duplicate_batch_is_reported() {
        let Harness { repository, _dir, .. } = harness();
        repository.add_batch(&batch(3)).expect("add 3");
        let err = repository.add_batch(&batch(3)).unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(repository.latest_batch_seq_no(), 3);
    }

    #[tokio::test]
    async fn test_start_serves_inbound_messages() {
        let Harness { repository, peers, _dir, .. } = harness();
        assert!(!repository.health_status().is_healthy());

        repository.start().await.expect("start");
        assert!(repository.health_status().is_healthy());
        assert!(matches!(repository.start().await, Err(BatchRepositoryError::AlreadyRunning)));

        let inbound = peers.inbound.lock().unwrap().clone().expect("subscribed");
        inbound
            .send(InboundPeerMessage::Batches(BatchMsg::live(vec![batch(1)])))
            .await
            .expect("send batches");
        inbound
            .send(InboundPeerMessage::BatchRequest(BatchRequest {
                requester: "peer-2".to_string(),
                from_seq_no: 1,
            }))
            .await
            .expect("send request");

        for _ in 0..100 {
            if !peers.sent().is_empty() {
                break;
            }
            settle().await;
        }
        assert_eq!(peers.sent()[0].1.batches, vec![batch(1)]);

        repository.stop().await;
        assert!(!repository.health_status().is_healthy());
    }
}
