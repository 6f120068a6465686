//! Provider for rollups.
use crate::{
    StorageError,
    models::{
        HashRef, HeadRef, HeadRefKey, RollupKey, Rollups, RollupsByL1Block, RollupsBySequence,
        StoredRollup,
    },
    providers::{BlockProvider, HeadRefProvider},
};
use alloy_primitives::B256;
use conclave_protocol::{ExtRollup, L1BlockInfo, QueryPagination, RollupMetadata};
use reth_db_api::{
    cursor::DbCursorRO,
    transaction::{DbTx, DbTxMut},
};
use tracing::{debug, error, warn};

/// A rollup storage that wraps transactional reference.
pub(crate) struct RollupProvider<'tx, TX> {
    tx: &'tx TX,
}

impl<'tx, TX> RollupProvider<'tx, TX> {
    pub(crate) const fn new(tx: &'tx TX) -> Self {
        Self { tx }
    }
}

impl<TX> RollupProvider<'_, TX>
where
    TX: DbTx,
{
    /// Looks a rollup up by full hash.
    ///
    /// A stored rollup whose full hash differs from `hash` shares only the truncated key and is
    /// treated as absent.
    pub(crate) fn find_rollup(&self, hash: B256) -> Result<Option<StoredRollup>, StorageError> {
        let result = self.tx.get::<Rollups>(RollupKey::from_hash(&hash)).inspect_err(|err| {
            error!(target: "host_storage", %hash, %err, "Failed to read rollup");
        })?;
        Ok(result.filter(|stored| stored.hash == hash))
    }

    pub(crate) fn get_rollup(&self, hash: B256) -> Result<StoredRollup, StorageError> {
        self.find_rollup(hash)?
            .ok_or_else(|| StorageError::EntryNotFound(format!("rollup with hash {hash}")))
    }

    pub(crate) fn get_rollup_by_l1_block(
        &self,
        l1_block_hash: B256,
    ) -> Result<StoredRollup, StorageError> {
        let reference = self.tx.get::<RollupsByL1Block>(l1_block_hash)?.ok_or_else(|| {
            StorageError::EntryNotFound(format!("rollup in L1 block {l1_block_hash}"))
        })?;
        self.get_rollup(reference.hash)
    }

    pub(crate) fn get_tip_rollup(&self) -> Result<StoredRollup, StorageError> {
        let tip = HeadRefProvider::new(self.tx).get_head_ref(HeadRefKey::TipRollup)?;
        self.get_rollup(tip.hash)
    }

    /// Lists rollups newest first, ordered by the sequence number of their last batch.
    pub(crate) fn list_rollups(
        &self,
        pagination: &QueryPagination,
    ) -> Result<Vec<StoredRollup>, StorageError> {
        pagination.validate()?;
        let offset = usize::try_from(pagination.offset).unwrap_or(usize::MAX);

        let mut cursor = self.tx.cursor_read::<RollupsBySequence>()?;
        let mut rollups = Vec::with_capacity(pagination.size as usize);
        for entry in cursor.walk_back(None)?.skip(offset).take(pagination.size as usize) {
            let (sequence, reference) = entry?;
            match self.find_rollup(reference.hash)? {
                Some(stored) => rollups.push(stored),
                None => warn!(
                    target: "host_storage",
                    sequence,
                    hash = %reference.hash,
                    "Dangling rollup reference"
                ),
            }
        }
        Ok(rollups)
    }
}

impl<TX> RollupProvider<'_, TX>
where
    TX: DbTxMut + DbTx,
{
    /// Stores a rollup carried by `l1_block`.
    ///
    /// The tip advances only if the new rollup's L1 proof number is strictly greater than the
    /// current tip's.
    pub(crate) fn add_rollup(
        &self,
        rollup: &ExtRollup,
        metadata: &RollupMetadata,
        l1_block: &L1BlockInfo,
    ) -> Result<(), StorageError> {
        let hash = rollup.hash();
        let key = RollupKey::from_hash(&hash);

        if let Some(existing) = self.tx.get::<Rollups>(key)? {
            if existing.hash == hash {
                return Err(StorageError::EntryAlreadyExists(format!("rollup with hash {hash}")));
            }
            return Err(StorageError::ConflictError(format!(
                "rollup {hash} collides with stored rollup {}",
                existing.hash
            )));
        }

        let is_canonical = BlockProvider::new(self.tx)
            .find_block(l1_block.hash)?
            .is_none_or(|block| block.is_canonical);
        let stored = StoredRollup {
            hash,
            rollup: rollup.clone(),
            metadata: *metadata,
            l1_block_hash: l1_block.hash,
            is_canonical,
        };
        self.tx.put::<Rollups>(key, stored).inspect_err(|err| {
            error!(target: "host_storage", %hash, %err, "Failed to store rollup");
        })?;
        self.tx.put::<RollupsBySequence>(rollup.header().last_batch_seq_no, HashRef { hash })?;
        self.tx.put::<RollupsByL1Block>(l1_block.hash, HashRef { hash })?;

        let l1_proof_number = rollup.header().l1_proof_number;
        let head_refs = HeadRefProvider::new(self.tx);
        let tip = head_refs.find_head_ref(HeadRefKey::TipRollup)?;
        if tip.is_none_or(|tip| l1_proof_number > tip.number) {
            head_refs
                .update_head_ref(HeadRefKey::TipRollup, HeadRef { hash, number: l1_proof_number })?;
        }

        debug!(
            target: "host_storage",
            %hash,
            l1_block = %l1_block.hash,
            last_batch = rollup.header().last_batch_seq_no,
            "Stored rollup"
        );
        Ok(())
    }

    /// Sets the canonical flag of the rollup carried by `l1_block_hash`, if any.
    pub(crate) fn set_canonical_by_l1_block(
        &self,
        l1_block_hash: B256,
        is_canonical: bool,
    ) -> Result<bool, StorageError> {
        let Some(reference) = self.tx.get::<RollupsByL1Block>(l1_block_hash)? else {
            return Ok(false);
        };
        let Some(mut stored) = self.find_rollup(reference.hash)? else {
            return Ok(false);
        };
        if stored.is_canonical != is_canonical {
            stored.is_canonical = is_canonical;
            self.tx.put::<Rollups>(RollupKey::from_hash(&reference.hash), stored)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tables;
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

    fn rollup(last_seq: u64, l1_proof_number: u64) -> ExtRollup {
        let header = BatchHeader { sequencer_order_no: last_seq, ..Default::default() };
        let head = ExtBatch::new(header, vec![], Default::default());
        ExtRollup::from_ext_batches(head, vec![], l1_proof_number)
    }

    fn l1_block(byte: u8) -> L1BlockInfo {
        L1BlockInfo::new(B256::repeat_byte(byte), byte as u64, B256::ZERO, 0)
    }

    #[test]
    fn test_tip_advances_only_on_greater_proof_number() {
        let (_dir, db) = setup_db();
        let tx = db.tx_mut().expect("Failed to create write transaction");
        let provider = RollupProvider::new(&tx);
        let metadata = RollupMetadata::default();

        let first = rollup(10, 100);
        let same_height = rollup(11, 100);
        let higher = rollup(12, 101);

        provider.add_rollup(&first, &metadata, &l1_block(1)).expect("add first");
        provider.add_rollup(&same_height, &metadata, &l1_block(2)).expect("add second");
        assert_eq!(provider.get_tip_rollup().expect("tip").hash, first.hash());

        provider.add_rollup(&higher, &metadata, &l1_block(3)).expect("add third");
        assert_eq!(provider.get_tip_rollup().expect("tip").hash, higher.hash());
    }

    #[test]
    fn test_list_rollups_newest_first() {
        let (_dir, db) = setup_db();
        let tx = db.tx_mut().expect("Failed to create write transaction");
        let provider = RollupProvider::new(&tx);
        let metadata = RollupMetadata::default();

        for (index, last_seq) in [10u64, 20, 30].into_iter().enumerate() {
            let block = l1_block(index as u8 + 1);
            provider.add_rollup(&rollup(last_seq, last_seq), &metadata, &block).expect("add");
        }

        let page = QueryPagination::new(1, 5).expect("valid pagination");
        let listed: Vec<_> = provider
            .list_rollups(&page)
            .expect("list rollups")
            .iter()
            .map(|stored| stored.rollup.header().last_batch_seq_no)
            .collect();
        assert_eq!(listed, vec![20, 10]);

        let page = QueryPagination::new(3, 5).expect("valid pagination");
        assert!(provider.list_rollups(&page).expect("list rollups").is_empty());
    }

    #[test]
    fn test_duplicate_rollup_rejected() {
        let (_dir, db) = setup_db();
        let tx = db.tx_mut().expect("Failed to create write transaction");
        let provider = RollupProvider::new(&tx);
        let metadata = RollupMetadata::default();

        let stored = rollup(10, 100);
        provider.add_rollup(&stored, &metadata, &l1_block(1)).expect("add rollup");
        let err = provider.add_rollup(&stored, &metadata, &l1_block(1)).unwrap_err();
        assert!(err.is_already_exists());
    }
}
