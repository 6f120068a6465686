use crate::{EventLogFilter, StorageError, models::{EventLogRecord, StoredRollup}};
use alloy_primitives::{Address, B256};
use alloy_rpc_types_eth::Log;
use conclave_protocol::{
    BatchHeader, ExtBatch, ExtRollup, L1BlockInfo, QueryPagination, RollupHeader, RollupMetadata,
};
use std::fmt::Debug;

/// Provides an interface for reading batches and their lookup indexes.
///
/// Implementations are expected to provide persistent and thread-safe access to batch data.
/// Lookups of absent entries fail with [`StorageError::EntryNotFound`].
pub trait BatchStorageReader: Debug {
    /// Gets the batch with the given hash.
    fn get_batch_by_hash(&self, hash: B256) -> Result<ExtBatch, StorageError>;

    /// Gets the batch with the given sequencer order number.
    fn get_batch_by_seq_no(&self, seq_no: u64) -> Result<ExtBatch, StorageError>;

    /// Gets the header of the batch with the given hash.
    fn get_batch_header(&self, hash: B256) -> Result<BatchHeader, StorageError>;

    /// Gets the header of the batch with the highest sequence number.
    fn get_head_batch_header(&self) -> Result<BatchHeader, StorageError>;

    /// Gets the header of the canonical batch at the given height.
    fn get_batch_by_height(&self, number: u64) -> Result<BatchHeader, StorageError>;

    /// Gets the hash of the canonical batch at the given height.
    fn get_batch_hash_by_number(&self, number: u64) -> Result<B256, StorageError>;

    /// Gets the batch that includes the given transaction.
    fn get_batch_by_tx(&self, tx_hash: B256) -> Result<ExtBatch, StorageError>;

    /// Gets the height of the batch that includes the given transaction.
    fn get_batch_number(&self, tx_hash: B256) -> Result<u64, StorageError>;

    /// Gets the transaction hashes of the batch with the given hash.
    fn get_batch_txs(&self, hash: B256) -> Result<Vec<B256>, StorageError>;

    /// Gets the number of transactions across all stored batches.
    fn get_total_tx_count(&self) -> Result<u64, StorageError>;

    /// Lists batches newest first.
    ///
    /// The page starts `offset` sequence numbers below the head batch. Sequence numbers with no
    /// stored batch are skipped.
    fn list_batches(&self, pagination: &QueryPagination) -> Result<Vec<ExtBatch>, StorageError>;
}

/// Provides an interface for persisting batches.
pub trait BatchStorageWriter: Debug {
    /// Stores a batch and indexes it by hash, height, L1 proof block and transaction.
    ///
    /// # Returns
    /// * `Ok(())` if the batch and every index entry were committed.
    /// * `Err(StorageError::EntryAlreadyExists)` if a batch with the same hash is stored.
    /// * `Err(StorageError)` on any other failure, in which case nothing was written.
    fn add_batch(&self, batch: &ExtBatch) -> Result<(), StorageError>;
}

/// Provides an interface for reading rollups.
pub trait RollupStorageReader: Debug {
    /// Gets the header of the rollup with the given hash.
    fn get_rollup_header(&self, hash: B256) -> Result<RollupHeader, StorageError>;

    /// Gets the rollup with the given hash.
    fn get_ext_rollup(&self, hash: B256) -> Result<ExtRollup, StorageError>;

    /// Gets the host-side metadata of the rollup with the given hash.
    fn get_rollup_metadata(&self, hash: B256) -> Result<RollupMetadata, StorageError>;

    /// Gets the header of the rollup carried by the given L1 block.
    fn get_rollup_header_by_block(&self, l1_block_hash: B256)
    -> Result<RollupHeader, StorageError>;

    /// Gets the header of the rollup with the highest L1 proof number.
    fn get_tip_rollup_header(&self) -> Result<RollupHeader, StorageError>;

    /// Lists rollups newest first.
    fn list_rollups(&self, pagination: &QueryPagination)
    -> Result<Vec<StoredRollup>, StorageError>;
}

/// Provides an interface for persisting rollups.
pub trait RollupStorageWriter: Debug {
    /// Stores a rollup carried by `l1_block`.
    fn add_rollup(
        &self,
        rollup: &ExtRollup,
        metadata: &RollupMetadata,
        l1_block: &L1BlockInfo,
    ) -> Result<(), StorageError>;
}

/// Provides an interface for tracking L1 blocks and their canonical status.
pub trait L1BlockStorage: Debug {
    /// Stores an L1 block, initially flagged canonical.
    fn add_block(&self, block: &L1BlockInfo) -> Result<(), StorageError>;

    /// Gets the L1 block with the given hash.
    fn get_block(&self, hash: B256) -> Result<L1BlockInfo, StorageError>;

    /// Gets the canonical L1 block at the given height.
    fn get_block_by_height(&self, number: u64) -> Result<L1BlockInfo, StorageError>;

    /// Gets the highest canonical L1 block.
    fn get_head_block(&self) -> Result<L1BlockInfo, StorageError>;

    /// Lists canonical L1 blocks, newest first.
    fn list_blocks(&self, pagination: &QueryPagination)
    -> Result<Vec<L1BlockInfo>, StorageError>;

    /// Flips the canonical flag of L1 blocks, and of the batches and rollups that reference
    /// them, in a single transaction.
    ///
    /// # Returns
    /// * `Ok(())` if every flag was updated.
    /// * `Err(StorageError::ConflictError)` if the result would leave two canonical blocks at
    ///   one height, or a canonical block on a non-canonical parent, including the canonical
    ///   child of a demoted block. Nothing is written.
    fn update_canonical_blocks(
        &self,
        canonical: &[B256],
        non_canonical: &[B256],
    ) -> Result<(), StorageError>;
}

/// Provides an interface for querying the event log relevance index.
pub trait EventLogStorageReader: Debug {
    /// Returns `true` if any stored log lists `address` as a relevant address.
    fn is_relevant_address(&self, address: Address) -> Result<bool, StorageError>;

    /// Returns the logs matching `filter` that `requester` may see.
    ///
    /// # Returns
    /// * `Err(StorageError::InvalidQuery)` if `requester` is missing or the filter is invalid.
    fn filter_logs(
        &self,
        requester: Option<Address>,
        filter: &EventLogFilter,
    ) -> Result<Vec<Log>, StorageError>;

    /// Returns every stored log of a transaction, with its relevance metadata.
    fn debug_logs(&self, tx_hash: B256) -> Result<Vec<EventLogRecord>, StorageError>;
}

/// Provides an interface for populating the event log relevance index.
pub trait EventLogStorageWriter: Debug {
    /// Stores logs and their index entries in a single transaction.
    fn store_event_logs(&self, records: &[EventLogRecord]) -> Result<(), StorageError>;
}

/// Combines every read and write interface of the host chain store.
pub trait ChainStore:
    BatchStorageReader
    + BatchStorageWriter
    + RollupStorageReader
    + RollupStorageWriter
    + L1BlockStorage
    + EventLogStorageReader
    + EventLogStorageWriter
{
}

impl<T> ChainStore for T where
    T: BatchStorageReader
        + BatchStorageWriter
        + RollupStorageReader
        + RollupStorageWriter
        + L1BlockStorage
        + EventLogStorageReader
        + EventLogStorageWriter
{
}
