//! Models for storing rollups.
//!
//! Rollups are keyed by the first 16 bytes of their hash. The full hash is kept in the value
//! and checked on every read, so a short-key collision surfaces as a miss rather than as the
//! wrong rollup.

use alloy_primitives::B256;
use alloy_rlp::{RlpDecodable, RlpEncodable};
use conclave_protocol::{ExtRollup, RollupMetadata};
use reth_db_api::{
    DatabaseError,
    table::{Decode, Encode, Table},
};
use serde::{Deserialize, Serialize};

/// Truncated rollup hash used as the primary key of [`Rollups`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RollupKey(pub [u8; 16]);

impl RollupKey {
    /// Truncates a rollup hash to its key.
    pub fn from_hash(hash: &B256) -> Self {
        let mut key = [0u8; 16];
        key.copy_from_slice(&hash[..16]);
        Self(key)
    }
}

impl Encode for RollupKey {
    type Encoded = [u8; 16];

    fn encode(self) -> Self::Encoded {
        self.0
    }
}

impl Decode for RollupKey {
    fn decode(value: &[u8]) -> Result<Self, DatabaseError> {
        value.try_into().map(Self).map_err(|_| DatabaseError::Decode)
    }
}

/// A rollup as persisted, with host-side metadata.
#[derive(
    Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, RlpEncodable, RlpDecodable,
)]
pub struct StoredRollup {
    /// Full rollup hash.
    pub hash: B256,
    /// The rollup envelope.
    pub rollup: ExtRollup,
    /// Host-side metadata.
    pub metadata: RollupMetadata,
    /// Hash of the L1 block that carried the rollup.
    pub l1_block_hash: B256,
    /// Whether the carrying L1 block is canonical.
    pub is_canonical: bool,
}

/// Rollups by truncated hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct Rollups;

impl Table for Rollups {
    const NAME: &'static str = "rollups";
    const DUPSORT: bool = false;
    type Key = RollupKey;
    type Value = StoredRollup;
}

/// Rollup hash by the sequence number of the newest batch it contains.
///
/// Walked backwards to list rollups newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct RollupsBySequence;

impl Table for RollupsBySequence {
    const NAME: &'static str = "rollups_by_sequence";
    const DUPSORT: bool = false;
    type Key = u64;
    type Value = super::HashRef;
}

/// Rollup hash by the hash of the L1 block that carried it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct RollupsByL1Block;

impl Table for RollupsByL1Block {
    const NAME: &'static str = "rollups_by_l1_block";
    const DUPSORT: bool = false;
    type Key = B256;
    type Value = super::HashRef;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollup_key_truncates_hash() {
        let mut bytes = [0u8; 32];
        bytes[..16].copy_from_slice(&[0x11; 16]);
        bytes[16..].copy_from_slice(&[0x22; 16]);
        let key = RollupKey::from_hash(&B256::from(bytes));

        assert_eq!(key, RollupKey([0x11; 16]));
        assert_eq!(RollupKey::decode(&key.encode()).expect("decode key"), key);
        assert!(RollupKey::decode(&[0u8; 32]).is_err());
    }
}
