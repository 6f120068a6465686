//! Database table schemas used by the host chain store.
//!
//! This module defines the value types, keys, and table layouts for all data
//! persisted by the host: batches, rollups, L1 blocks, head pointers and the
//! event log relevance index.
//!
//! The tables are registered using [`reth_db_api::table::TableInfo`] and grouped into a
//! [`reth_db_api::TableSet`] for database initialization via Reth's storage-api.
//!
//! Keys are encoded big-endian so that the natural ordering of the database matches the
//! numeric ordering of heights and sequence numbers, which the range walks rely on.

use alloy_primitives::{Address, B256};
use reth_codecs::Compact;
use reth_db_api::DatabaseError;
use serde::{Deserialize, Serialize};

mod batch;
pub use batch::{
    BatchHashes, BatchHeights, Batches, BatchesByL1Proof, HeightSequenceKey, L1ProofKey,
    StoredBatch, TransactionBatches, TxLocation,
};

mod rollup;
pub use rollup::{RollupKey, Rollups, RollupsByL1Block, RollupsBySequence, StoredRollup};

mod block;
pub use block::{BlockKey, L1BlockNumbers, L1Blocks, StoredBlock};

mod head_ref;
pub use head_ref::{CounterKey, Counters, HeadRef, HeadRefKey, HeadRefs};

mod event;
pub use event::{
    EventLogEntry, EventLogKey, EventLogRecord, EventLogs, EventTopicKey, EventTopics,
    IndexedAddress, IndexedTopic, RELEVANT_ADDRESS_SLOTS, RelevantAddressKey, RelevantAddresses,
    SHORT_HASH_LEN,
};

/// Reference to an entry keyed by hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Compact)]
pub struct HashRef {
    /// The referenced hash.
    pub hash: B256,
}

/// Reference to an entry keyed by number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Compact)]
pub struct NumberRef {
    /// The referenced number.
    pub number: u64,
}

/// Full value of an address indexed under its short hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Compact)]
pub struct AddressRef {
    /// The full address.
    pub address: Address,
}

/// Reads a big-endian `u64` at `offset`.
pub(crate) fn read_u64(value: &[u8], offset: usize) -> Result<u64, DatabaseError> {
    value
        .get(offset..offset + 8)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u64::from_be_bytes)
        .ok_or(DatabaseError::Decode)
}

/// Reads a big-endian `u32` at `offset`.
pub(crate) fn read_u32(value: &[u8], offset: usize) -> Result<u32, DatabaseError> {
    value
        .get(offset..offset + 4)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u32::from_be_bytes)
        .ok_or(DatabaseError::Decode)
}

/// Reads a fixed-size byte array at `offset`.
pub(crate) fn read_array<const N: usize>(
    value: &[u8],
    offset: usize,
) -> Result<[u8; N], DatabaseError> {
    value
        .get(offset..offset + N)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(DatabaseError::Decode)
}

/// Implements [`reth_db_api::table::Compress`] and [`reth_db_api::table::Decompress`] traits for
/// types that implement [`reth_codecs::Compact`].
///
/// # Example
/// ```ignore
/// impl_compression_for_compact!(HashRef, NumberRef);
/// ```
macro_rules! impl_compression_for_compact {
    ($($name:ident),+ $(,)?) => {
        $(
            impl reth_db_api::table::Compress for $name {
                type Compressed = Vec<u8>;

                fn compress_to_buf<B: bytes::BufMut + AsMut<[u8]>>(&self, buf: &mut B) {
                    let _ = reth_codecs::Compact::to_compact(self, buf);
                }
            }

            impl reth_db_api::table::Decompress for $name {
                fn decompress(value: &[u8]) -> Result<$name, reth_db_api::DatabaseError> {
                    let (obj, _) = reth_codecs::Compact::from_compact(value, value.len());
                    Ok(obj)
                }
            }
        )+
    };
}

/// Implements [`reth_db_api::table::Compress`] and [`reth_db_api::table::Decompress`] traits for
/// types that implement [`alloy_rlp::Encodable`] and [`alloy_rlp::Decodable`].
///
/// Used for the envelopes whose canonical encoding is RLP. Unlike the compact codec, decoding
/// is fallible and trailing bytes are rejected.
///
/// # Example
/// ```ignore
/// impl_compression_for_rlp!(StoredBatch, StoredRollup);
/// ```
macro_rules! impl_compression_for_rlp {
    ($($name:ident),+ $(,)?) => {
        $(
            impl reth_db_api::table::Compress for $name {
                type Compressed = Vec<u8>;

                fn compress_to_buf<B: bytes::BufMut + AsMut<[u8]>>(&self, buf: &mut B) {
                    alloy_rlp::Encodable::encode(self, buf);
                }
            }

            impl reth_db_api::table::Decompress for $name {
                fn decompress(value: &[u8]) -> Result<$name, reth_db_api::DatabaseError> {
                    let mut buf = value;
                    let obj = <$name as alloy_rlp::Decodable>::decode(&mut buf)
                        .map_err(|_| reth_db_api::DatabaseError::Decode)?;
                    if !buf.is_empty() {
                        return Err(reth_db_api::DatabaseError::Decode);
                    }
                    Ok(obj)
                }
            }
        )+
    };
}

/// Implements [`reth_db_api::table::TableInfo`] for one or more table types that implement
/// [`reth_db_api::table::Table`].
///
/// This allows the table to be registered and introspected by the Reth database schema system.
macro_rules! impl_table_info {
    ($($table:ty),+ $(,)?) => {
        $(
            impl reth_db_api::table::TableInfo for $table
            where
                $table: reth_db_api::table::Table,
            {
                fn name(&self) -> &'static str {
                    <$table as reth_db_api::table::Table>::NAME
                }

                fn is_dupsort(&self) -> bool {
                    <$table as reth_db_api::table::Table>::DUPSORT
                }
            }
        )+
    };
}

/// Declares a struct representing a collection of tables and implements [`reth_db_api::TableSet`]
/// for it.
///
/// The resulting struct can be passed to Reth's `init_db_for::<_, YourTableSet>()`
/// to initialize only the specified tables.
macro_rules! impl_table_set {
    (
        $(#[$outer:meta])*
        $set_name:ident, $($table:ty),+ $(,)?
    ) => {
        $(#[$outer])*
        #[derive(Debug)]
        pub(crate) struct $set_name;

        impl reth_db_api::TableSet for $set_name {
            fn tables() -> Box<dyn Iterator<Item = Box<dyn reth_db_api::table::TableInfo>>> {
                Box::new(vec![
                    $(
                        Box::new(<$table>::default()) as Box<dyn reth_db_api::table::TableInfo>
                    ),*
                ].into_iter())
            }
        }
    };
}

// Fixed-layout references use the compact codec
impl_compression_for_compact!(HashRef, NumberRef, AddressRef, TxLocation, HeadRef);

// Envelopes use their canonical RLP encoding
impl_compression_for_rlp!(StoredBatch, StoredRollup, StoredBlock, EventLogEntry);

// Enable reflection for each table (name + dupsort metadata)
impl_table_info!(
    Batches,
    BatchHashes,
    BatchHeights,
    BatchesByL1Proof,
    TransactionBatches,
    Rollups,
    RollupsBySequence,
    RollupsByL1Block,
    L1Blocks,
    L1BlockNumbers,
    HeadRefs,
    Counters,
    EventLogs,
    RelevantAddresses,
    EventTopics,
);

impl_table_set!(
    /// Every table of the host chain store.
    Tables,
    Batches,
    BatchHashes,
    BatchHeights,
    BatchesByL1Proof,
    TransactionBatches,
    Rollups,
    RollupsBySequence,
    RollupsByL1Block,
    L1Blocks,
    L1BlockNumbers,
    HeadRefs,
    Counters,
    EventLogs,
    RelevantAddresses,
    EventTopics,
);

#[cfg(test)]
mod tests {
    use super::*;
    use reth_db_api::table::{Compress, Decompress};

    #[test]
    fn test_read_helpers_reject_short_input() {
        let value = 7u64.to_be_bytes();
        assert_eq!(read_u64(&value, 0).expect("read u64"), 7);
        assert!(read_u64(&value, 1).is_err());
        assert!(read_u32(&value, 6).is_err());
        assert!(read_array::<9>(&value, 0).is_err());
    }

    #[test]
    fn test_compact_reference_compression() {
        let reference = HashRef { hash: B256::repeat_byte(0x42) };
        let compressed = reference.compress();
        let decompressed = HashRef::decompress(&compressed).expect("decompress");
        assert_eq!(decompressed, reference);
    }

    #[test]
    fn test_rlp_decompression_rejects_trailing_bytes() {
        let stored = StoredBlock::default();
        let mut compressed = stored.clone().compress();
        assert_eq!(StoredBlock::decompress(&compressed).expect("decompress"), stored);

        compressed.push(0x80);
        assert!(StoredBlock::decompress(&compressed).is_err());
    }
}
