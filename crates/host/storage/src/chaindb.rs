//! Main database access structure and transaction contexts.

use crate::{
    EventLogFilter,
    error::StorageError,
    models::{EventLogRecord, StoredRollup, Tables},
    providers::{BatchProvider, BlockProvider, EventProvider, RollupProvider},
    traits::{
        BatchStorageReader, BatchStorageWriter, EventLogStorageReader, EventLogStorageWriter,
        L1BlockStorage, RollupStorageReader, RollupStorageWriter,
    },
};
use alloy_primitives::{Address, B256};
use alloy_rpc_types_eth::Log;
use conclave_protocol::{
    BatchHeader, ExtBatch, ExtRollup, L1BlockInfo, QueryPagination, RollupHeader, RollupMetadata,
};
use reth_db::{
    DatabaseEnv,
    mdbx::{DatabaseArguments, init_db_for},
};
use reth_db_api::{database::Database, transaction::DbTx};
use std::path::Path;
use tracing::{debug, warn};

/// Manages the database environment of the host chain store.
/// Provides transactional access to data via providers.
#[derive(Debug)]
pub struct ChainDb {
    env: DatabaseEnv,
}

impl ChainDb {
    /// Creates or opens a database environment at the given path.
    pub fn new(path: &Path) -> Result<Self, StorageError> {
        Self::with_args(path, DatabaseArguments::default())
    }

    /// Creates or opens a database environment at the given path with custom arguments.
    pub fn with_args(path: &Path, args: DatabaseArguments) -> Result<Self, StorageError> {
        let env = init_db_for::<_, Tables>(path, args)?;
        Ok(Self { env })
    }

    /// Runs `f` in a read-write transaction.
    ///
    /// The transaction is committed if `f` succeeds and aborted otherwise, so a failed write
    /// leaves no trace.
    fn write<T>(
        &self,
        f: impl FnOnce(&<DatabaseEnv as Database>::TXMut) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let tx = self.env.tx_mut()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                tx.abort();
                Err(err)
            }
        }
    }
}

impl BatchStorageReader for ChainDb {
    fn get_batch_by_hash(&self, hash: B256) -> Result<ExtBatch, StorageError> {
        self.env.view(|tx| BatchProvider::new(tx).get_batch_by_hash(hash))?
    }

    fn get_batch_by_seq_no(&self, seq_no: u64) -> Result<ExtBatch, StorageError> {
        self.env.view(|tx| BatchProvider::new(tx).get_batch_by_seq_no(seq_no))?
    }

    fn get_batch_header(&self, hash: B256) -> Result<BatchHeader, StorageError> {
        let batch = self.get_batch_by_hash(hash)?;
        Ok(batch.header().clone())
    }

    fn get_head_batch_header(&self) -> Result<BatchHeader, StorageError> {
        let batch = self.env.view(|tx| BatchProvider::new(tx).get_head_batch())??;
        Ok(batch.header().clone())
    }

    fn get_batch_by_height(&self, number: u64) -> Result<BatchHeader, StorageError> {
        let batch =
            self.env.view(|tx| BatchProvider::new(tx).get_canonical_batch_at_height(number))??;
        Ok(batch.header().clone())
    }

    fn get_batch_hash_by_number(&self, number: u64) -> Result<B256, StorageError> {
        let batch =
            self.env.view(|tx| BatchProvider::new(tx).get_canonical_batch_at_height(number))??;
        Ok(batch.hash())
    }

    fn get_batch_by_tx(&self, tx_hash: B256) -> Result<ExtBatch, StorageError> {
        self.env.view(|tx| BatchProvider::new(tx).get_batch_by_tx(tx_hash))?
    }

    fn get_batch_number(&self, tx_hash: B256) -> Result<u64, StorageError> {
        let location = self.env.view(|tx| BatchProvider::new(tx).get_tx_location(tx_hash))??;
        Ok(location.number)
    }

    fn get_batch_txs(&self, hash: B256) -> Result<Vec<B256>, StorageError> {
        let batch = self.get_batch_by_hash(hash)?;
        Ok(batch.tx_hashes().to_vec())
    }

    fn get_total_tx_count(&self) -> Result<u64, StorageError> {
        self.env.view(|tx| BatchProvider::new(tx).get_total_tx_count())?
    }

    fn list_batches(&self, pagination: &QueryPagination) -> Result<Vec<ExtBatch>, StorageError> {
        self.env.view(|tx| BatchProvider::new(tx).list_batches(pagination))?
    }
}

impl BatchStorageWriter for ChainDb {
    fn add_batch(&self, batch: &ExtBatch) -> Result<(), StorageError> {
        self.write(|tx| BatchProvider::new(tx).add_batch(batch))
    }
}

impl RollupStorageReader for ChainDb {
    fn get_rollup_header(&self, hash: B256) -> Result<RollupHeader, StorageError> {
        let stored = self.env.view(|tx| RollupProvider::new(tx).get_rollup(hash))??;
        Ok(stored.rollup.header().clone())
    }

    fn get_ext_rollup(&self, hash: B256) -> Result<ExtRollup, StorageError> {
        let stored = self.env.view(|tx| RollupProvider::new(tx).get_rollup(hash))??;
        Ok(stored.rollup)
    }

    fn get_rollup_metadata(&self, hash: B256) -> Result<RollupMetadata, StorageError> {
        let stored = self.env.view(|tx| RollupProvider::new(tx).get_rollup(hash))??;
        Ok(stored.metadata)
    }

    fn get_rollup_header_by_block(
        &self,
        l1_block_hash: B256,
    ) -> Result<RollupHeader, StorageError> {
        let stored =
            self.env.view(|tx| RollupProvider::new(tx).get_rollup_by_l1_block(l1_block_hash))??;
        Ok(stored.rollup.header().clone())
    }

    fn get_tip_rollup_header(&self) -> Result<RollupHeader, StorageError> {
        let stored = self.env.view(|tx| RollupProvider::new(tx).get_tip_rollup())??;
        Ok(stored.rollup.header().clone())
    }

    fn list_rollups(
        &self,
        pagination: &QueryPagination,
    ) -> Result<Vec<StoredRollup>, StorageError> {
        self.env.view(|tx| RollupProvider::new(tx).list_rollups(pagination))?
    }
}

impl RollupStorageWriter for ChainDb {
    fn add_rollup(
        &self,
        rollup: &ExtRollup,
        metadata: &RollupMetadata,
        l1_block: &L1BlockInfo,
    ) -> Result<(), StorageError> {
        self.write(|tx| RollupProvider::new(tx).add_rollup(rollup, metadata, l1_block))
    }
}

impl L1BlockStorage for ChainDb {
    fn add_block(&self, block: &L1BlockInfo) -> Result<(), StorageError> {
        self.write(|tx| BlockProvider::new(tx).add_block(block))
    }

    fn get_block(&self, hash: B256) -> Result<L1BlockInfo, StorageError> {
        self.env.view(|tx| BlockProvider::new(tx).get_block(hash))?
    }

    fn get_block_by_height(&self, number: u64) -> Result<L1BlockInfo, StorageError> {
        self.env.view(|tx| BlockProvider::new(tx).get_canonical_block_at_height(number))?
    }

    fn get_head_block(&self) -> Result<L1BlockInfo, StorageError> {
        self.env.view(|tx| BlockProvider::new(tx).get_head_block())?
    }

    fn list_blocks(
        &self,
        pagination: &QueryPagination,
    ) -> Result<Vec<L1BlockInfo>, StorageError> {
        self.env.view(|tx| BlockProvider::new(tx).list_blocks(pagination))?
    }

    fn update_canonical_blocks(
        &self,
        canonical: &[B256],
        non_canonical: &[B256],
    ) -> Result<(), StorageError> {
        if let Some(hash) = canonical.iter().find(|hash| non_canonical.contains(hash)) {
            return Err(StorageError::InvalidQuery(format!(
                "L1 block {hash} is both canonical and non-canonical"
            )));
        }

        self.write(|tx| {
            let blocks = BlockProvider::new(tx);
            let batches = BatchProvider::new(tx);
            let rollups = RollupProvider::new(tx);

            // Demote first so that validation sees the final state of every height.
            let mut demoted = Vec::with_capacity(non_canonical.len());
            for hash in non_canonical {
                match blocks.set_canonical(*hash, false)? {
                    Some(block) => demoted.push(block),
                    None => debug!(target: "host_storage", %hash, "Demoting unknown L1 block"),
                }
                let flipped = batches.set_canonical_by_l1_proof(*hash, false)?;
                rollups.set_canonical_by_l1_block(*hash, false)?;
                debug!(target: "host_storage", %hash, batches = flipped, "Demoted L1 block");
            }

            let mut promoted = Vec::with_capacity(canonical.len());
            for hash in canonical {
                match blocks.set_canonical(*hash, true)? {
                    Some(block) => promoted.push(block),
                    None => debug!(target: "host_storage", %hash, "Promoting unknown L1 block"),
                }
                let flipped = batches.set_canonical_by_l1_proof(*hash, true)?;
                rollups.set_canonical_by_l1_block(*hash, true)?;
                debug!(target: "host_storage", %hash, batches = flipped, "Promoted L1 block");
            }

            let checks = promoted
                .iter()
                .map(|block| (block, blocks.validate_canonical(block)))
                .chain(demoted.iter().map(|block| (block, blocks.validate_demoted(block))));
            for (block, check) in checks {
                check.inspect_err(|err| {
                    warn!(
                        target: "host_storage",
                        hash = %block.hash,
                        number = block.number,
                        %err,
                        "Rejecting canonical chain update"
                    );
                })?;
            }
            Ok(())
        })
    }
}

impl EventLogStorageReader for ChainDb {
    fn is_relevant_address(&self, address: Address) -> Result<bool, StorageError> {
        self.env.view(|tx| EventProvider::new(tx).is_relevant_address(address))?
    }

    fn filter_logs(
        &self,
        requester: Option<Address>,
        filter: &EventLogFilter,
    ) -> Result<Vec<Log>, StorageError> {
        self.env.view(|tx| EventProvider::new(tx).filter_logs(requester, filter))?
    }

    fn debug_logs(&self, tx_hash: B256) -> Result<Vec<EventLogRecord>, StorageError> {
        self.env.view(|tx| EventProvider::new(tx).logs_for_tx(tx_hash))?
    }
}

impl EventLogStorageWriter for ChainDb {
    fn store_event_logs(&self, records: &[EventLogRecord]) -> Result<(), StorageError> {
        self.write(|tx| EventProvider::new(tx).store_event_logs(records))
    }
}
