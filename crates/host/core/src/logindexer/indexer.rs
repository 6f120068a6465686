use crate::logindexer::{
    LogIndexerError, StateCodeProvider, TransactionReceipt, extract_potential_address,
};
use alloy_primitives::{Address, B256, map::HashMap};
use conclave_host_storage::{
    EventLogEntry, EventLogFilter, EventLogKey, EventLogRecord, EventLogStorageReader,
    EventLogStorageWriter, models::RELEVANT_ADDRESS_SLOTS,
};
use conclave_protocol::BatchHeader;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// The [`LogIndexer`] is responsible for computing the relevance metadata of the logs emitted
/// by a batch and persisting it alongside the logs.
#[derive(Debug)]
pub struct LogIndexer<S> {
    /// Component that stores relevance rows and answers whether an address is already known.
    store: Arc<S>,
}

impl<S> LogIndexer<S>
where
    S: EventLogStorageReader + EventLogStorageWriter,
{
    /// Creates a new [`LogIndexer`] backed by `store`.
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Indexes the logs emitted by the transactions of a batch.
    ///
    /// For every log:
    /// - Topic 0 is the event signature and never names an account.
    /// - Each further address-shaped topic names an end-user account if the address is already
    ///   relevant to a stored log, was classified as one earlier in this batch, or has no code in
    ///   `state`. Such accounts fill the relevant-address slot of their topic.
    /// - A log with no relevant address is a lifecycle event.
    ///
    /// Logs with more topics than a filter can address are skipped. All rows of the batch are
    /// written in one transaction.
    ///
    /// Returns the number of logs indexed.
    pub fn index_batch_logs(
        &self,
        header: &BatchHeader,
        receipts: &[TransactionReceipt],
        state: &dyn StateCodeProvider,
    ) -> Result<usize, LogIndexerError> {
        let batch_hash = header.hash_slow();
        let mut classified = HashMap::default();
        let mut records = Vec::new();
        let mut log_index: u32 = 0;

        for (tx_index, receipt) in receipts.iter().enumerate() {
            let tx_index = u32::try_from(tx_index).map_err(|_| {
                LogIndexerError::PositionOverflow(format!("transaction index {tx_index}"))
            })?;

            for log in &receipt.logs {
                let position = log_index;
                log_index = log_index.checked_add(1).ok_or_else(|| {
                    LogIndexerError::PositionOverflow(format!("log index in batch {batch_hash}"))
                })?;

                let topics = log.data.topics();
                if topics.len() > EventLogFilter::MAX_TOPICS {
                    warn!(
                        target: "log_indexer",
                        tx_hash = %receipt.tx_hash,
                        log_index = position,
                        topics = topics.len(),
                        "Skipping log with too many topics"
                    );
                    continue;
                }

                let mut relevant = [None; RELEVANT_ADDRESS_SLOTS];
                for (slot, topic) in topics.iter().skip(1).enumerate() {
                    relevant[slot] = self.end_user_account(topic, state, &mut classified)?;
                }

                let entry = EventLogEntry::new(
                    log.address,
                    topics,
                    relevant,
                    log.data.data.clone(),
                    receipt.tx_hash,
                    batch_hash,
                );
                trace!(
                    target: "log_indexer",
                    tx_hash = %receipt.tx_hash,
                    log_index = position,
                    is_lifecycle = entry.is_lifecycle(),
                    "Indexed log"
                );
                let key = EventLogKey::new(
                    header.number,
                    header.sequencer_order_no,
                    tx_index,
                    position,
                );
                records.push(EventLogRecord::new(key, entry));
            }
        }

        self.store.store_event_logs(&records)?;
        debug!(
            target: "log_indexer",
            batch = %batch_hash,
            number = header.number,
            logs = records.len(),
            "Stored event logs"
        );
        Ok(records.len())
    }

    /// Returns the account named by `topic`, if it is an end-user account.
    ///
    /// The relevance index is consulted before state.
    fn end_user_account(
        &self,
        topic: &B256,
        state: &dyn StateCodeProvider,
        classified: &mut HashMap<Address, bool>,
    ) -> Result<Option<Address>, LogIndexerError> {
        let Some(address) = extract_potential_address(topic) else {
            return Ok(None);
        };
        if let Some(is_end_user) = classified.get(&address) {
            return Ok(is_end_user.then_some(address));
        }

        let is_end_user =
            self.store.is_relevant_address(address)? || !state.has_code(address)?;
        classified.insert(address, is_end_user);
        Ok(is_end_user.then_some(address))
    }
}
