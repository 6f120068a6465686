//! Models for storing batches and their lookup indexes.
//!
//! Batches are keyed by sequence number, the only identifier that is unique across the
//! canonical chain. Every other way of reaching a batch (hash, height, L1 proof block,
//! transaction) goes through a secondary index table pointing back at the sequence number
//! or hash.

use super::{read_array, read_u64};
use alloy_primitives::B256;
use alloy_rlp::{RlpDecodable, RlpEncodable};
use conclave_protocol::ExtBatch;
use reth_codecs::Compact;
use reth_db_api::{
    DatabaseError,
    table::{Decode, Encode, Table},
};
use serde::{Deserialize, Serialize};

/// A batch as persisted, with its canonical flag.
#[derive(
    Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, RlpEncodable, RlpDecodable,
)]
pub struct StoredBatch {
    /// The batch envelope.
    pub batch: ExtBatch,
    /// Whether the batch sits on the canonical L1 chain.
    pub is_canonical: bool,
}

/// Composite `(height, sequence)` key.
///
/// Several batches may share a height after a reorg; the sequence number disambiguates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HeightSequenceKey {
    /// L2 height.
    pub number: u64,
    /// Sequencer order number.
    pub sequence: u64,
}

impl HeightSequenceKey {
    /// Creates a new [`HeightSequenceKey`].
    pub const fn new(number: u64, sequence: u64) -> Self {
        Self { number, sequence }
    }
}

impl Encode for HeightSequenceKey {
    type Encoded = [u8; 16];

    fn encode(self) -> Self::Encoded {
        let mut buf = [0u8; 16];
        buf[..8].copy_from_slice(&self.number.to_be_bytes());
        buf[8..].copy_from_slice(&self.sequence.to_be_bytes());
        buf
    }
}

impl Decode for HeightSequenceKey {
    fn decode(value: &[u8]) -> Result<Self, DatabaseError> {
        if value.len() != 16 {
            return Err(DatabaseError::Decode);
        }
        Ok(Self { number: read_u64(value, 0)?, sequence: read_u64(value, 8)? })
    }
}

/// Composite `(l1 block hash, sequence)` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct L1ProofKey {
    /// Hash of the L1 block the batch was produced against.
    pub l1_proof: B256,
    /// Sequencer order number.
    pub sequence: u64,
}

impl L1ProofKey {
    /// Creates a new [`L1ProofKey`].
    pub const fn new(l1_proof: B256, sequence: u64) -> Self {
        Self { l1_proof, sequence }
    }
}

impl Encode for L1ProofKey {
    type Encoded = [u8; 40];

    fn encode(self) -> Self::Encoded {
        let mut buf = [0u8; 40];
        buf[..32].copy_from_slice(self.l1_proof.as_slice());
        buf[32..].copy_from_slice(&self.sequence.to_be_bytes());
        buf
    }
}

impl Decode for L1ProofKey {
    fn decode(value: &[u8]) -> Result<Self, DatabaseError> {
        if value.len() != 40 {
            return Err(DatabaseError::Decode);
        }
        Ok(Self {
            l1_proof: B256::from(read_array::<32>(value, 0)?),
            sequence: read_u64(value, 32)?,
        })
    }
}

/// Position of a transaction within the batch that includes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Compact)]
pub struct TxLocation {
    /// Sequence number of the including batch.
    pub sequence: u64,
    /// Height of the including batch.
    pub number: u64,
    /// Index of the transaction in the batch.
    pub index: u64,
}

/// Batches by sequence number.
///
/// - **Key**: `u64`: sequencer order number
/// - **Value**: [`StoredBatch`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct Batches;

impl Table for Batches {
    const NAME: &'static str = "batches";
    const DUPSORT: bool = false;
    type Key = u64;
    type Value = StoredBatch;
}

/// Sequence number by batch hash.
///
/// - **Key**: [`B256`]: batch hash
/// - **Value**: [`super::NumberRef`]: sequencer order number
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct BatchHashes;

impl Table for BatchHashes {
    const NAME: &'static str = "batch_hashes";
    const DUPSORT: bool = false;
    type Key = B256;
    type Value = super::NumberRef;
}

/// Batch hash by `(height, sequence)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct BatchHeights;

impl Table for BatchHeights {
    const NAME: &'static str = "batch_heights";
    const DUPSORT: bool = false;
    type Key = HeightSequenceKey;
    type Value = super::HashRef;
}

/// Batch hash by `(l1 proof hash, sequence)`.
///
/// Walked when an L1 block changes canonical status, to flip every batch produced against it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct BatchesByL1Proof;

impl Table for BatchesByL1Proof {
    const NAME: &'static str = "batches_by_l1_proof";
    const DUPSORT: bool = false;
    type Key = L1ProofKey;
    type Value = super::HashRef;
}

/// Location of a transaction by transaction hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct TransactionBatches;

impl Table for TransactionBatches {
    const NAME: &'static str = "transaction_batches";
    const DUPSORT: bool = false;
    type Key = B256;
    type Value = TxLocation;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_height_sequence_key_orders_by_height_first() {
        let low = HeightSequenceKey::new(1, 900).encode();
        let high = HeightSequenceKey::new(2, 5).encode();
        assert!(low < high);

        let decoded = HeightSequenceKey::decode(&high).expect("decode key");
        assert_eq!(decoded, HeightSequenceKey::new(2, 5));
    }

    #[test]
    fn test_l1_proof_key_decode() {
        let key = L1ProofKey::new(B256::repeat_byte(0xab), 77);
        let decoded = L1ProofKey::decode(&key.encode()).expect("decode key");
        assert_eq!(decoded, key);
        assert!(L1ProofKey::decode(&[0u8; 39]).is_err());
    }
}
