//! Provider for event logs and the relevance index.
use crate::{
    StorageError,
    filter::EventLogFilter,
    models::{
        AddressRef, BatchHashes, Batches, EventLogEntry, EventLogKey, EventLogRecord, EventLogs,
        EventTopicKey, EventTopics, HashRef, IndexedAddress, IndexedTopic, RelevantAddressKey,
        RelevantAddresses,
    },
    providers::BatchProvider,
};
use alloy_primitives::{Address, B256, LogData};
use alloy_rpc_types_eth::Log;
use reth_db_api::{
    cursor::DbCursorRO,
    transaction::{DbTx, DbTxMut},
};
use std::{
    collections::{BTreeSet, HashMap},
    ops::RangeInclusive,
};
use tracing::{debug, error, trace};

/// An event log storage that wraps transactional reference.
pub(crate) struct EventProvider<'tx, TX> {
    tx: &'tx TX,
}

impl<'tx, TX> EventProvider<'tx, TX> {
    pub(crate) const fn new(tx: &'tx TX) -> Self {
        Self { tx }
    }
}

impl<TX> EventProvider<'_, TX>
where
    TX: DbTx,
{
    /// Returns `true` if any stored log lists `address` as a relevant address.
    pub(crate) fn is_relevant_address(&self, address: Address) -> Result<bool, StorageError> {
        let indexed = IndexedAddress::new(address);
        let mut cursor = self.tx.cursor_read::<RelevantAddresses>()?;
        let walker = cursor.walk_range(
            RelevantAddressKey::new(indexed.short, EventLogKey::first_at_height(0))..=
                RelevantAddressKey::new(indexed.short, EventLogKey::last_at_height(u64::MAX)),
        )?;
        for entry in walker {
            let (_, reference) = entry?;
            if reference.address == address {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Returns the logs matching `filter` that `requester` is allowed to see.
    ///
    /// Only logs of canonical batches are returned, ordered by batch height, transaction index
    /// and log index.
    pub(crate) fn filter_logs(
        &self,
        requester: Option<Address>,
        filter: &EventLogFilter,
    ) -> Result<Vec<Log>, StorageError> {
        let requester = requester.ok_or_else(|| {
            StorageError::InvalidQuery("logs can only be requested for an account".to_string())
        })?;
        filter.validate()?;
        let account = IndexedAddress::new(requester);

        let candidates = self.candidate_logs(filter)?;
        trace!(target: "host_storage", candidates = candidates.len(), "Filtering event logs");

        let mut canonical = HashMap::new();
        let mut logs = Vec::new();
        for EventLogRecord { key, entry } in candidates {
            if !filter.matches(&key, &entry) || !entry.is_visible_to(&account) {
                continue;
            }
            if !self.is_canonical_emitter(&mut canonical, &key, &entry)? {
                continue;
            }
            logs.push(to_rpc_log(&key, &entry));
        }
        Ok(logs)
    }

    /// Returns every stored log of a transaction, with its relevance metadata.
    pub(crate) fn logs_for_tx(&self, tx_hash: B256) -> Result<Vec<EventLogRecord>, StorageError> {
        let location = BatchProvider::new(self.tx).get_tx_location(tx_hash)?;
        let tx_index = u32::try_from(location.index).map_err(|_| {
            StorageError::ConflictError(format!("transaction index {} overflows", location.index))
        })?;
        let records = self.walk_logs(
            EventLogKey::new(location.number, location.sequence, tx_index, 0)..=
                EventLogKey::new(location.number, location.sequence, tx_index, u32::MAX),
        )?;
        Ok(records.into_iter().filter(|record| record.entry.tx_hash == tx_hash).collect())
    }

    /// Picks the cheapest way to enumerate candidate logs for `filter`.
    ///
    /// A batch hash narrows the walk to one batch. Otherwise the first constrained topic
    /// position drives a walk of the topic index. With neither, the height range is scanned.
    fn candidate_logs(&self, filter: &EventLogFilter) -> Result<Vec<EventLogRecord>, StorageError> {
        if let Some(batch_hash) = filter.batch_hash {
            let Some(sequence) = self.tx.get::<BatchHashes>(batch_hash)? else {
                return Ok(Vec::new());
            };
            let Some(stored) = self.tx.get::<Batches>(sequence.number)? else {
                return Ok(Vec::new());
            };
            let number = stored.batch.number();
            return self.walk_logs(
                EventLogKey::first_in_batch(number, sequence.number)..=
                    EventLogKey::last_in_batch(number, sequence.number),
            );
        }

        if let Some((position, accepted)) = filter.first_topic_constraint() {
            let position = position as u8;
            let mut keys = BTreeSet::new();
            let mut cursor = self.tx.cursor_read::<EventTopics>()?;
            for topic in accepted {
                let indexed = IndexedTopic::new(*topic);
                let walker = cursor.walk_range(
                    EventTopicKey::new(
                        position,
                        indexed.short,
                        EventLogKey::first_at_height(filter.lowest_height()),
                    )..=
                        EventTopicKey::new(
                            position,
                            indexed.short,
                            EventLogKey::last_at_height(filter.highest_height()),
                        ),
                )?;
                for entry in walker {
                    let (key, full) = entry?;
                    if full.hash == indexed.full {
                        keys.insert(key.log);
                    }
                }
            }

            let mut records = Vec::with_capacity(keys.len());
            for key in keys {
                if let Some(entry) = self.tx.get::<EventLogs>(key)? {
                    records.push(EventLogRecord::new(key, entry));
                }
            }
            return Ok(records);
        }

        self.walk_logs(
            EventLogKey::first_at_height(filter.lowest_height())..=
                EventLogKey::last_at_height(filter.highest_height()),
        )
    }

    fn walk_logs(
        &self,
        range: RangeInclusive<EventLogKey>,
    ) -> Result<Vec<EventLogRecord>, StorageError> {
        let mut cursor = self.tx.cursor_read::<EventLogs>()?;
        let records = cursor
            .walk_range(range)?
            .map(|entry| entry.map(|(key, entry)| EventLogRecord::new(key, entry)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Returns `true` if the batch that emitted the log is still stored and canonical.
    ///
    /// A sequence number re-used by a replacement batch no longer vouches for logs of the batch
    /// it replaced, so the stored batch hash must match as well.
    fn is_canonical_emitter(
        &self,
        cache: &mut HashMap<(u64, B256), bool>,
        key: &EventLogKey,
        entry: &EventLogEntry,
    ) -> Result<bool, StorageError> {
        let cache_key = (key.sequence, entry.batch_hash);
        if let Some(is_canonical) = cache.get(&cache_key) {
            return Ok(*is_canonical);
        }
        let is_canonical = self.tx.get::<Batches>(key.sequence)?.is_some_and(|stored| {
            stored.is_canonical && stored.batch.hash() == entry.batch_hash
        });
        cache.insert(cache_key, is_canonical);
        Ok(is_canonical)
    }
}

impl<TX> EventProvider<'_, TX>
where
    TX: DbTxMut + DbTx,
{
    /// Stores logs and their index entries.
    ///
    /// A log already stored at the same position is replaced together with its index entries.
    pub(crate) fn store_event_logs(&self, records: &[EventLogRecord]) -> Result<(), StorageError> {
        for EventLogRecord { key, entry } in records {
            if let Some(previous) = self.tx.get::<EventLogs>(*key)? {
                self.remove_index_entries(key, &previous)?;
            }

            self.tx.put::<EventLogs>(*key, entry.clone()).inspect_err(|err| {
                error!(target: "host_storage", ?key, %err, "Failed to store event log");
            })?;
            for relevant in entry.relevant_addresses.iter().flatten() {
                self.tx.put::<RelevantAddresses>(
                    RelevantAddressKey::new(relevant.short, *key),
                    AddressRef { address: relevant.full },
                )?;
            }
            for (position, topic) in entry.topics.iter().enumerate() {
                self.tx.put::<EventTopics>(
                    EventTopicKey::new(position as u8, topic.short, *key),
                    HashRef { hash: topic.full },
                )?;
            }
        }
        debug!(target: "host_storage", logs = records.len(), "Stored event logs");
        Ok(())
    }

    fn remove_index_entries(
        &self,
        key: &EventLogKey,
        entry: &EventLogEntry,
    ) -> Result<(), StorageError> {
        for relevant in entry.relevant_addresses.iter().flatten() {
            self.tx
                .delete::<RelevantAddresses>(RelevantAddressKey::new(relevant.short, *key), None)?;
        }
        for (position, topic) in entry.topics.iter().enumerate() {
            self.tx.delete::<EventTopics>(
                EventTopicKey::new(position as u8, topic.short, *key),
                None,
            )?;
        }
        Ok(())
    }
}

fn to_rpc_log(key: &EventLogKey, entry: &EventLogEntry) -> Log {
    Log {
        inner: alloy_primitives::Log {
            address: entry.address,
            data: LogData::new_unchecked(entry.full_topics(), entry.data.clone()),
        },
        block_hash: Some(entry.batch_hash),
        block_number: Some(key.number),
        block_timestamp: None,
        transaction_hash: Some(entry.tx_hash),
        transaction_index: Some(key.tx_index as u64),
        log_index: Some(key.log_index as u64),
        removed: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tables;
    use alloy_primitives::Bytes;
    use conclave_protocol::{BatchHeader, ExtBatch};
    use reth_db::{
        DatabaseEnv,
        mdbx::{DatabaseArguments, init_db_for},
    };
    use reth_db_api::Database;
    use tempfile::TempDir;

    fn setup_db() -> (TempDir, DatabaseEnv) {
        let temp_dir = TempDir::new().expect("Could not create temp dir");
        let env = init_db_for::<_, Tables>(temp_dir.path(), DatabaseArguments::default())
            .expect("Failed to init database");
        (temp_dir, env)
    }

    fn record(key: EventLogKey, topics: &[B256], relevant: Option<Address>) -> EventLogRecord {
        EventLogRecord::new(
            key,
            EventLogEntry::new(
                Address::repeat_byte(0xc0),
                topics,
                [relevant, None, None, None],
                Bytes::new(),
                B256::repeat_byte(0x0a),
                B256::repeat_byte(0x0b),
            ),
        )
    }

    #[test]
    fn test_is_relevant_address() {
        let (_dir, db) = setup_db();
        let tx = db.tx_mut().expect("Failed to create write transaction");
        let provider = EventProvider::new(&tx);
        let alice = Address::repeat_byte(0xa1);

        assert!(!provider.is_relevant_address(alice).expect("lookup"));
        provider
            .store_event_logs(&[record(EventLogKey::new(1, 1, 0, 0), &[B256::ZERO], Some(alice))])
            .expect("store logs");
        assert!(provider.is_relevant_address(alice).expect("lookup"));
        assert!(!provider.is_relevant_address(Address::repeat_byte(0xb0)).expect("lookup"));
    }

    #[test]
    fn test_replacing_log_drops_stale_index_entries() {
        let (_dir, db) = setup_db();
        let tx = db.tx_mut().expect("Failed to create write transaction");
        let provider = EventProvider::new(&tx);
        let alice = Address::repeat_byte(0xa1);
        let key = EventLogKey::new(1, 1, 0, 0);

        provider.store_event_logs(&[record(key, &[B256::ZERO], Some(alice))]).expect("store");
        provider.store_event_logs(&[record(key, &[B256::ZERO], None)]).expect("replace");
        assert!(!provider.is_relevant_address(alice).expect("lookup"));
    }

    #[test]
    fn test_filter_logs_requires_requester() {
        let (_dir, db) = setup_db();
        let tx = db.tx().expect("Failed to create transaction");
        let provider = EventProvider::new(&tx);

        let err = provider.filter_logs(None, &EventLogFilter::default()).unwrap_err();
        assert!(matches!(err, StorageError::InvalidQuery(_)));
    }

    #[test]
    fn test_filter_logs_skips_unknown_batches() {
        let (_dir, db) = setup_db();
        let tx = db.tx_mut().expect("Failed to create write transaction");
        let batch = ExtBatch::new(
            BatchHeader { number: 1, sequencer_order_no: 1, ..Default::default() },
            vec![B256::repeat_byte(0x0a)],
            Default::default(),
        );
        BatchProvider::new(&tx).add_batch(&batch).expect("add batch");

        let provider = EventProvider::new(&tx);
        let mut stored = record(EventLogKey::new(1, 1, 0, 0), &[B256::ZERO], None);
        stored.entry.batch_hash = batch.hash();
        let orphan = record(EventLogKey::new(2, 2, 0, 0), &[B256::ZERO], None);
        provider.store_event_logs(&[stored, orphan]).expect("store");

        let logs = provider
            .filter_logs(Some(Address::repeat_byte(1)), &EventLogFilter::default())
            .expect("filter logs");
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].block_hash, Some(batch.hash()));
        assert_eq!(logs[0].block_number, Some(1));
    }
}
