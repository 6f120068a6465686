//! Rollups: the unit of data published to L1.

use crate::{ExtBatch, RollupHeader, header::decode_rlp_list};
use alloy_primitives::B256;
use alloy_rlp::{BufMut, Decodable, Encodable, Header, RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A rollup as seen from outside the enclave: a header and the batches it compresses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtRollup {
    header: RollupHeader,
    batches: Vec<ExtBatch>,
    #[serde(skip)]
    hash: OnceLock<B256>,
}

impl ExtRollup {
    /// Creates a new [`ExtRollup`].
    pub fn new(header: RollupHeader, batches: Vec<ExtBatch>) -> Self {
        Self { header, batches, hash: OnceLock::new() }
    }

    /// Packs a batch `head` and the `additional` batches preceding it into a rollup.
    ///
    /// The rollup header is derived from the head batch. `additional` is expected in ascending
    /// sequence order; `head` is appended last.
    pub fn from_ext_batches(
        head: ExtBatch,
        additional: Vec<ExtBatch>,
        l1_proof_number: u64,
    ) -> Self {
        let header = head.header().to_rollup_header(l1_proof_number);
        let mut batches = additional;
        batches.push(head);
        Self::new(header, batches)
    }

    /// Returns the rollup hash.
    pub fn hash(&self) -> B256 {
        *self.hash.get_or_init(|| self.header.hash_slow())
    }

    /// Returns the rollup header.
    pub const fn header(&self) -> &RollupHeader {
        &self.header
    }

    /// Returns the batches packed into the rollup.
    pub fn batches(&self) -> &[ExtBatch] {
        &self.batches
    }

    fn rlp_payload_length(&self) -> usize {
        self.header.length() + self.batches.length()
    }
}

impl PartialEq for ExtRollup {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.batches == other.batches
    }
}

impl Eq for ExtRollup {}

impl Encodable for ExtRollup {
    fn encode(&self, out: &mut dyn BufMut) {
        Header { list: true, payload_length: self.rlp_payload_length() }.encode(out);
        self.header.encode(out);
        self.batches.encode(out);
    }

    fn length(&self) -> usize {
        Header { list: true, payload_length: self.rlp_payload_length() }.length_with_payload()
    }
}

impl Decodable for ExtRollup {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let raw: alloy_rlp::Result<RawRollup> =
            decode_rlp_list!(buf, RawRollup { header, batches });
        let RawRollup { header, batches } = raw?;
        Ok(Self::new(header, batches))
    }
}

struct RawRollup {
    header: RollupHeader,
    batches: Vec<ExtBatch>,
}

/// Host-side metadata recorded alongside a rollup.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable,
)]
pub struct RollupMetadata {
    /// Sequence number of the oldest batch in the rollup.
    pub first_batch_sequence: u64,
    /// Timestamp of the oldest batch in the rollup.
    pub start_time: u64,
}

impl RollupMetadata {
    /// Derives the metadata of a rollup from its batches.
    ///
    /// Returns [`None`] if the rollup is empty.
    pub fn from_rollup(rollup: &ExtRollup) -> Option<Self> {
        rollup.batches().iter().min_by_key(|batch| batch.seq_no()).map(|first| Self {
            first_batch_sequence: first.seq_no(),
            start_time: first.header().timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BatchHeader;
    use alloy_primitives::Bytes;

    fn batch(seq_no: u64, timestamp: u64) -> ExtBatch {
        let header = BatchHeader {
            number: seq_no,
            sequencer_order_no: seq_no,
            timestamp,
            l1_proof: B256::repeat_byte(seq_no as u8),
            ..Default::default()
        };
        ExtBatch::new(header, vec![], Bytes::new())
    }

    #[test]
    fn test_from_ext_batches_uses_head_header() {
        let rollup =
            ExtRollup::from_ext_batches(batch(12, 120), vec![batch(10, 100), batch(11, 110)], 7);

        assert_eq!(rollup.header().last_batch_seq_no, 12);
        assert_eq!(rollup.header().compression_l1_head, B256::repeat_byte(12));
        assert_eq!(rollup.header().l1_proof_number, 7);
        let seqs: Vec<_> = rollup.batches().iter().map(ExtBatch::seq_no).collect();
        assert_eq!(seqs, vec![10, 11, 12]);
    }

    #[test]
    fn test_metadata_from_rollup() {
        let rollup =
            ExtRollup::from_ext_batches(batch(12, 120), vec![batch(10, 100), batch(11, 110)], 7);
        let metadata = RollupMetadata::from_rollup(&rollup).expect("non-empty rollup");

        assert_eq!(metadata, RollupMetadata { first_batch_sequence: 10, start_time: 100 });
        assert!(RollupMetadata::from_rollup(&ExtRollup::default()).is_none());
    }

    #[test]
    fn test_rlp_decode_restores_rollup() {
        let rollup = ExtRollup::from_ext_batches(batch(2, 20), vec![batch(1, 10)], 3);
        let encoded = alloy_rlp::encode(&rollup);
        let decoded = ExtRollup::decode(&mut encoded.as_slice()).expect("decode rollup");

        assert_eq!(decoded, rollup);
        assert_eq!(decoded.hash(), rollup.hash());
    }
}
