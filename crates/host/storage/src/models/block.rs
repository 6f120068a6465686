//! Models for storing L1 block references.
//!
//! Competing forks may store several blocks at one height, so blocks are keyed by
//! `(number, hash)` and carry a canonical flag. At most one block per height is canonical.

use super::{read_array, read_u64};
use alloy_primitives::B256;
use alloy_rlp::{RlpDecodable, RlpEncodable};
use conclave_protocol::L1BlockInfo;
use reth_db_api::{
    DatabaseError,
    table::{Decode, Encode, Table},
};
use serde::{Deserialize, Serialize};

/// Composite `(number, hash)` key of an L1 block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockKey {
    /// The block number.
    pub number: u64,
    /// The block hash.
    pub hash: B256,
}

impl BlockKey {
    /// Creates a new [`BlockKey`].
    pub const fn new(number: u64, hash: B256) -> Self {
        Self { number, hash }
    }
}

impl From<&L1BlockInfo> for BlockKey {
    fn from(block: &L1BlockInfo) -> Self {
        Self::new(block.number, block.hash)
    }
}

impl Encode for BlockKey {
    type Encoded = [u8; 40];

    fn encode(self) -> Self::Encoded {
        let mut buf = [0u8; 40];
        buf[..8].copy_from_slice(&self.number.to_be_bytes());
        buf[8..].copy_from_slice(self.hash.as_slice());
        buf
    }
}

impl Decode for BlockKey {
    fn decode(value: &[u8]) -> Result<Self, DatabaseError> {
        if value.len() != 40 {
            return Err(DatabaseError::Decode);
        }
        Ok(Self { number: read_u64(value, 0)?, hash: B256::from(read_array::<32>(value, 8)?) })
    }
}

/// An L1 block as persisted, with its canonical flag.
#[derive(
    Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, RlpEncodable, RlpDecodable,
)]
pub struct StoredBlock {
    /// The block reference.
    pub block: L1BlockInfo,
    /// Whether the block is on the canonical L1 chain.
    pub is_canonical: bool,
}

/// L1 blocks by `(number, hash)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct L1Blocks;

impl Table for L1Blocks {
    const NAME: &'static str = "l1_blocks";
    const DUPSORT: bool = false;
    type Key = BlockKey;
    type Value = StoredBlock;
}

/// L1 block number by hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct L1BlockNumbers;

impl Table for L1BlockNumbers {
    const NAME: &'static str = "l1_block_numbers";
    const DUPSORT: bool = false;
    type Key = B256;
    type Value = super::NumberRef;
}
