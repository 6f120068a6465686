//! Provider for head pointers and running counters.
use crate::{
    StorageError,
    models::{CounterKey, Counters, HeadRef, HeadRefKey, HeadRefs, NumberRef},
};
use reth_db_api::transaction::{DbTx, DbTxMut};
use tracing::{debug, error};

/// A head reference storage that wraps transactional reference.
pub(crate) struct HeadRefProvider<'tx, TX> {
    tx: &'tx TX,
}

impl<'tx, TX> HeadRefProvider<'tx, TX> {
    pub(crate) const fn new(tx: &'tx TX) -> Self {
        Self { tx }
    }
}

impl<TX> HeadRefProvider<'_, TX>
where
    TX: DbTx,
{
    /// Returns the head reference stored under `key`, if any.
    pub(crate) fn find_head_ref(&self, key: HeadRefKey) -> Result<Option<HeadRef>, StorageError> {
        let result = self.tx.get::<HeadRefs>(key).inspect_err(|err| {
            error!(target: "host_storage", ?key, %err, "Failed to seek head reference");
        })?;
        Ok(result)
    }

    pub(crate) fn get_head_ref(&self, key: HeadRefKey) -> Result<HeadRef, StorageError> {
        self.find_head_ref(key)?.ok_or_else(|| {
            debug!(target: "host_storage", ?key, "No head reference found");
            StorageError::EntryNotFound(format!("no head reference for {key:?}"))
        })
    }

    /// Returns the counter stored under `key`, zero if it was never written.
    pub(crate) fn get_counter(&self, key: CounterKey) -> Result<u64, StorageError> {
        let result = self.tx.get::<Counters>(key).inspect_err(|err| {
            error!(target: "host_storage", ?key, %err, "Failed to read counter");
        })?;
        Ok(result.map_or(0, |counter| counter.number))
    }
}

impl<TX> HeadRefProvider<'_, TX>
where
    TX: DbTxMut + DbTx,
{
    pub(crate) fn update_head_ref(
        &self,
        key: HeadRefKey,
        head_ref: HeadRef,
    ) -> Result<(), StorageError> {
        self.tx.put::<HeadRefs>(key, head_ref).inspect_err(|err| {
            error!(target: "host_storage", ?key, %err, "Failed to store head reference");
        })?;
        Ok(())
    }

    /// Adds `added` and subtracts `removed` from the counter under `key`.
    pub(crate) fn adjust_counter(
        &self,
        key: CounterKey,
        added: u64,
        removed: u64,
    ) -> Result<u64, StorageError> {
        let updated = self.get_counter(key)?.saturating_add(added).saturating_sub(removed);
        self.tx.put::<Counters>(key, NumberRef { number: updated }).inspect_err(|err| {
            error!(target: "host_storage", ?key, %err, "Failed to store counter");
        })?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tables;
    use alloy_primitives::B256;
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

    #[test]
    fn test_head_ref_read_write() {
        let (_dir, db) = setup_db();

        let write_tx = db.tx_mut().expect("Failed to create write transaction");
        let write_provider = HeadRefProvider::new(&write_tx);

        let result = write_provider.get_head_ref(HeadRefKey::HeadBatch);
        assert!(matches!(result, Err(StorageError::EntryNotFound(_))));

        let head = HeadRef { hash: B256::repeat_byte(0x12), number: 8 };
        write_provider.update_head_ref(HeadRefKey::HeadBatch, head).expect("update head ref");
        write_tx.commit().expect("Failed to commit the write transaction");

        let tx = db.tx().expect("Failed to create transaction");
        let provider = HeadRefProvider::new(&tx);
        assert_eq!(provider.get_head_ref(HeadRefKey::HeadBatch).expect("head ref"), head);
        assert!(provider.find_head_ref(HeadRefKey::TipRollup).expect("lookup").is_none());
    }

    #[test]
    fn test_counter_adjustments() {
        let (_dir, db) = setup_db();
        let tx = db.tx_mut().expect("Failed to create write transaction");
        let provider = HeadRefProvider::new(&tx);

        assert_eq!(provider.get_counter(CounterKey::TotalTransactions).expect("counter"), 0);
        assert_eq!(provider.adjust_counter(CounterKey::TotalTransactions, 5, 0).expect("add"), 5);
        assert_eq!(provider.adjust_counter(CounterKey::TotalTransactions, 1, 3).expect("swap"), 3);
        assert_eq!(provider.adjust_counter(CounterKey::TotalTransactions, 0, 10).expect("sub"), 0);
    }
}
