//! Provider for batches and their lookup indexes.
use crate::{
    StorageError,
    models::{
        BatchHashes, BatchHeights, Batches, BatchesByL1Proof, CounterKey, HashRef, HeadRef,
        HeadRefKey, HeightSequenceKey, L1ProofKey, NumberRef, StoredBatch, TransactionBatches,
        TxLocation,
    },
    providers::{BlockProvider, HeadRefProvider},
};
use alloy_primitives::B256;
use conclave_protocol::{ExtBatch, QueryPagination};
use reth_db_api::{
    cursor::DbCursorRO,
    transaction::{DbTx, DbTxMut},
};
use tracing::{debug, error, warn};

/// A batch storage that wraps transactional reference.
pub(crate) struct BatchProvider<'tx, TX> {
    tx: &'tx TX,
}

impl<'tx, TX> BatchProvider<'tx, TX> {
    pub(crate) const fn new(tx: &'tx TX) -> Self {
        Self { tx }
    }
}

impl<TX> BatchProvider<'_, TX>
where
    TX: DbTx,
{
    pub(crate) fn get_stored_batch(&self, sequence: u64) -> Result<StoredBatch, StorageError> {
        let result = self.tx.get::<Batches>(sequence).inspect_err(|err| {
            error!(target: "host_storage", sequence, %err, "Failed to read batch");
        })?;
        result.ok_or_else(|| StorageError::EntryNotFound(format!("batch with sequence {sequence}")))
    }

    pub(crate) fn get_batch_by_seq_no(&self, sequence: u64) -> Result<ExtBatch, StorageError> {
        Ok(self.get_stored_batch(sequence)?.batch)
    }

    pub(crate) fn get_sequence_by_hash(&self, hash: B256) -> Result<u64, StorageError> {
        let result = self.tx.get::<BatchHashes>(hash).inspect_err(|err| {
            error!(target: "host_storage", %hash, %err, "Failed to read batch hash index");
        })?;
        result
            .map(|reference| reference.number)
            .ok_or_else(|| StorageError::EntryNotFound(format!("batch with hash {hash}")))
    }

    pub(crate) fn get_batch_by_hash(&self, hash: B256) -> Result<ExtBatch, StorageError> {
        let sequence = self.get_sequence_by_hash(hash)?;
        self.get_batch_by_seq_no(sequence)
    }

    pub(crate) fn get_head_batch(&self) -> Result<ExtBatch, StorageError> {
        let head = HeadRefProvider::new(self.tx).get_head_ref(HeadRefKey::HeadBatch)?;
        self.get_batch_by_seq_no(head.number)
    }

    /// Returns the canonical batch at `number`.
    ///
    /// If several batches at that height are flagged canonical, the one with the highest
    /// sequence number wins.
    pub(crate) fn get_canonical_batch_at_height(
        &self,
        number: u64,
    ) -> Result<ExtBatch, StorageError> {
        let mut cursor = self.tx.cursor_read::<BatchHeights>()?;
        let walker = cursor.walk_range(
            HeightSequenceKey::new(number, 0)..=HeightSequenceKey::new(number, u64::MAX),
        )?;

        let mut canonical = None;
        for entry in walker {
            let (key, _) = entry?;
            let stored = self.get_stored_batch(key.sequence)?;
            if stored.is_canonical {
                canonical = Some(stored.batch);
            }
        }
        canonical.ok_or_else(|| {
            StorageError::EntryNotFound(format!("canonical batch at height {number}"))
        })
    }

    pub(crate) fn get_tx_location(&self, tx_hash: B256) -> Result<TxLocation, StorageError> {
        let result = self.tx.get::<TransactionBatches>(tx_hash).inspect_err(|err| {
            error!(target: "host_storage", %tx_hash, %err, "Failed to read transaction index");
        })?;
        result.ok_or_else(|| StorageError::EntryNotFound(format!("transaction {tx_hash}")))
    }

    pub(crate) fn get_batch_by_tx(&self, tx_hash: B256) -> Result<ExtBatch, StorageError> {
        let location = self.get_tx_location(tx_hash)?;
        self.get_batch_by_seq_no(location.sequence)
    }

    pub(crate) fn get_total_tx_count(&self) -> Result<u64, StorageError> {
        HeadRefProvider::new(self.tx).get_counter(CounterKey::TotalTransactions)
    }

    /// Lists batches newest first, counting back from the head batch.
    ///
    /// Sequence numbers with no stored batch are skipped, so a page may come back short.
    pub(crate) fn list_batches(
        &self,
        pagination: &QueryPagination,
    ) -> Result<Vec<ExtBatch>, StorageError> {
        pagination.validate()?;
        let Some(head) = HeadRefProvider::new(self.tx).find_head_ref(HeadRefKey::HeadBatch)? else {
            return Ok(Vec::new());
        };
        let Some(from) = head.number.checked_sub(pagination.offset) else {
            return Ok(Vec::new());
        };
        let to = from.saturating_sub(pagination.size - 1).max(1);

        let mut batches = Vec::with_capacity(pagination.size as usize);
        for sequence in (to..=from).rev() {
            if let Some(stored) = self.tx.get::<Batches>(sequence)? {
                batches.push(stored.batch);
            }
        }
        Ok(batches)
    }
}

impl<TX> BatchProvider<'_, TX>
where
    TX: DbTxMut + DbTx,
{
    /// Stores a batch and all its indexes.
    ///
    /// A batch already stored under a different hash at the same sequence number is replaced:
    /// its hash, height, L1 proof and transaction index entries are removed first.
    pub(crate) fn add_batch(&self, batch: &ExtBatch) -> Result<(), StorageError> {
        let hash = batch.hash();
        let sequence = batch.seq_no();
        let number = batch.number();
        let l1_proof = batch.header().l1_proof;

        if self.tx.get::<BatchHashes>(hash)?.is_some() {
            debug!(target: "host_storage", %hash, sequence, "Batch already stored");
            return Err(StorageError::EntryAlreadyExists(format!("batch with hash {hash}")));
        }

        let mut removed_txs = 0;
        if let Some(previous) = self.tx.get::<Batches>(sequence)? {
            warn!(
                target: "host_storage",
                sequence,
                previous = %previous.batch.hash(),
                replacement = %hash,
                "Replacing batch stored at the same sequence"
            );
            removed_txs = self.remove_batch_indexes(&previous.batch)?;
        }

        let is_canonical = BlockProvider::new(self.tx)
            .find_block(l1_proof)?
            .is_none_or(|block| block.is_canonical);

        self.tx
            .put::<Batches>(sequence, StoredBatch { batch: batch.clone(), is_canonical })
            .inspect_err(|err| {
                error!(target: "host_storage", sequence, %hash, %err, "Failed to store batch");
            })?;
        self.tx.put::<BatchHashes>(hash, NumberRef { number: sequence })?;
        self.tx.put::<BatchHeights>(HeightSequenceKey::new(number, sequence), HashRef { hash })?;
        self.tx.put::<BatchesByL1Proof>(L1ProofKey::new(l1_proof, sequence), HashRef { hash })?;
        for (index, tx_hash) in batch.tx_hashes().iter().enumerate() {
            self.tx.put::<TransactionBatches>(
                *tx_hash,
                TxLocation { sequence, number, index: index as u64 },
            )?;
        }

        let head_refs = HeadRefProvider::new(self.tx);
        head_refs.adjust_counter(
            CounterKey::TotalTransactions,
            batch.tx_hashes().len() as u64,
            removed_txs,
        )?;
        let head = head_refs.find_head_ref(HeadRefKey::HeadBatch)?;
        if head.is_none_or(|head| sequence >= head.number) {
            head_refs.update_head_ref(HeadRefKey::HeadBatch, HeadRef { hash, number: sequence })?;
        }

        debug!(target: "host_storage", %hash, sequence, number, is_canonical, "Stored batch");
        Ok(())
    }

    /// Removes the secondary index entries of a batch, returning its transaction count.
    fn remove_batch_indexes(&self, batch: &ExtBatch) -> Result<u64, StorageError> {
        let sequence = batch.seq_no();
        self.tx.delete::<BatchHashes>(batch.hash(), None)?;
        self.tx.delete::<BatchHeights>(HeightSequenceKey::new(batch.number(), sequence), None)?;
        self.tx.delete::<BatchesByL1Proof>(
            L1ProofKey::new(batch.header().l1_proof, sequence),
            None,
        )?;

        for tx_hash in batch.tx_hashes() {
            let location = self.tx.get::<TransactionBatches>(*tx_hash)?;
            // The transaction may since have been indexed under another batch.
            if location.is_some_and(|location| location.sequence == sequence) {
                self.tx.delete::<TransactionBatches>(*tx_hash, None)?;
            }
        }
        Ok(batch.tx_hashes().len() as u64)
    }

    /// Sets the canonical flag of every batch produced against `l1_proof`.
    ///
    /// Returns the number of batches found.
    pub(crate) fn set_canonical_by_l1_proof(
        &self,
        l1_proof: B256,
        is_canonical: bool,
    ) -> Result<usize, StorageError> {
        let sequences = {
            let mut cursor = self.tx.cursor_read::<BatchesByL1Proof>()?;
            cursor
                .walk_range(L1ProofKey::new(l1_proof, 0)..=L1ProofKey::new(l1_proof, u64::MAX))?
                .map(|entry| entry.map(|(key, _)| key.sequence))
                .collect::<Result<Vec<_>, _>>()?
        };

        for sequence in &sequences {
            let Some(mut stored) = self.tx.get::<Batches>(*sequence)? else { continue };
            if stored.is_canonical != is_canonical {
                stored.is_canonical = is_canonical;
                self.tx.put::<Batches>(*sequence, stored)?;
            }
        }
        Ok(sequences.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tables;
    use conclave_protocol::BatchHeader;
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

    fn batch(sequence: u64, number: u64, txs: &[u8]) -> ExtBatch {
        let header = BatchHeader {
            number,
            sequencer_order_no: sequence,
            l1_proof: B256::repeat_byte(0xee),
            ..Default::default()
        };
        ExtBatch::new(
            header,
            txs.iter().map(|tx| B256::repeat_byte(*tx)).collect(),
            Default::default(),
        )
    }

    #[test]
    fn test_add_batch_populates_indexes() {
        let (_dir, db) = setup_db();
        let tx = db.tx_mut().expect("Failed to create write transaction");
        let provider = BatchProvider::new(&tx);

        let stored = batch(1, 1, &[0x01, 0x02]);
        provider.add_batch(&stored).expect("add batch");

        assert_eq!(provider.get_batch_by_hash(stored.hash()).expect("by hash"), stored);
        assert_eq!(provider.get_head_batch().expect("head"), stored);
        let location = provider.get_tx_location(B256::repeat_byte(0x02)).expect("location");
        assert_eq!(location, TxLocation { sequence: 1, number: 1, index: 1 });
        assert_eq!(provider.get_total_tx_count().expect("count"), 2);
    }

    #[test]
    fn test_replacing_batch_drops_stale_indexes() {
        let (_dir, db) = setup_db();
        let tx = db.tx_mut().expect("Failed to create write transaction");
        let provider = BatchProvider::new(&tx);

        let original = batch(4, 4, &[0x01, 0x02]);
        let mut header = original.header().clone();
        header.timestamp = 99;
        let replacement = ExtBatch::new(header, vec![B256::repeat_byte(0x03)], Default::default());

        provider.add_batch(&original).expect("add original");
        provider.add_batch(&replacement).expect("add replacement");

        assert!(provider.get_batch_by_hash(original.hash()).unwrap_err().is_not_found());
        assert!(provider.get_tx_location(B256::repeat_byte(0x01)).unwrap_err().is_not_found());
        assert_eq!(provider.get_batch_by_seq_no(4).expect("by seq"), replacement);
        assert_eq!(provider.get_total_tx_count().expect("count"), 1);
    }

    #[test]
    fn test_set_canonical_by_l1_proof() {
        let (_dir, db) = setup_db();
        let tx = db.tx_mut().expect("Failed to create write transaction");
        let provider = BatchProvider::new(&tx);

        provider.add_batch(&batch(1, 1, &[])).expect("add batch");
        provider.add_batch(&batch(2, 2, &[])).expect("add batch");

        let flipped = provider
            .set_canonical_by_l1_proof(B256::repeat_byte(0xee), false)
            .expect("flip batches");
        assert_eq!(flipped, 2);
        assert!(!provider.get_stored_batch(1).expect("batch").is_canonical);
        assert!(provider.get_canonical_batch_at_height(2).unwrap_err().is_not_found());
    }
}
