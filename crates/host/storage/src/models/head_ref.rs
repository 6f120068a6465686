use alloy_primitives::B256;
use reth_codecs::Compact;
use reth_db_api::{
    DatabaseError,
    table::{Decode, Encode, Table},
};
use serde::{Deserialize, Serialize};

/// Key representing a particular head reference type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HeadRefKey {
    /// The batch with the highest sequence number stored.
    HeadBatch,

    /// The rollup with the highest L1 proof number stored.
    TipRollup,
}

impl Encode for HeadRefKey {
    type Encoded = [u8; 1];

    fn encode(self) -> Self::Encoded {
        match self {
            Self::HeadBatch => [0],
            Self::TipRollup => [1],
        }
    }
}

impl Decode for HeadRefKey {
    fn decode(value: &[u8]) -> Result<Self, DatabaseError> {
        match value {
            [0] => Ok(Self::HeadBatch),
            [1] => Ok(Self::TipRollup),
            _ => Err(DatabaseError::Decode),
        }
    }
}

/// A head pointer: the hash of the referenced entry and the number it was ranked by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Compact)]
pub struct HeadRef {
    /// Hash of the referenced batch or rollup.
    pub hash: B256,
    /// Sequence number for batches, L1 proof number for rollups.
    pub number: u64,
}

/// Head pointers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct HeadRefs;

impl Table for HeadRefs {
    const NAME: &'static str = "head_refs";
    const DUPSORT: bool = false;
    type Key = HeadRefKey;
    type Value = HeadRef;
}

/// Key of a running aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CounterKey {
    /// Number of transactions across all stored batches.
    TotalTransactions,
}

impl Encode for CounterKey {
    type Encoded = [u8; 1];

    fn encode(self) -> Self::Encoded {
        match self {
            Self::TotalTransactions => [0],
        }
    }
}

impl Decode for CounterKey {
    fn decode(value: &[u8]) -> Result<Self, DatabaseError> {
        match value {
            [0] => Ok(Self::TotalTransactions),
            _ => Err(DatabaseError::Decode),
        }
    }
}

/// Running aggregates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct Counters;

impl Table for Counters {
    const NAME: &'static str = "counters";
    const DUPSORT: bool = false;
    type Key = CounterKey;
    type Value = super::NumberRef;
}
