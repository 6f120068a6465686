//! The external batch envelope exchanged between hosts.

use crate::{BatchHeader, header::decode_rlp_list};
use alloy_primitives::{B256, Bytes};
use alloy_rlp::{BufMut, Decodable, Encodable, Header};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A batch as seen from outside the enclave.
///
/// Holds the plaintext header, the hashes of the contained transactions and the encrypted
/// transaction payload. The envelope is immutable once built; its hash is computed from the
/// header on first use and cached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtBatch {
    header: BatchHeader,
    tx_hashes: Vec<B256>,
    encrypted_tx_blob: Bytes,
    #[serde(skip)]
    hash: OnceLock<B256>,
}

impl ExtBatch {
    /// Creates a new [`ExtBatch`].
    pub fn new(header: BatchHeader, tx_hashes: Vec<B256>, encrypted_tx_blob: Bytes) -> Self {
        Self { header, tx_hashes, encrypted_tx_blob, hash: OnceLock::new() }
    }

    /// Returns the batch hash.
    pub fn hash(&self) -> B256 {
        *self.hash.get_or_init(|| self.header.hash_slow())
    }

    /// Returns the plaintext header.
    pub const fn header(&self) -> &BatchHeader {
        &self.header
    }

    /// Returns the hashes of the transactions in the batch, in execution order.
    pub fn tx_hashes(&self) -> &[B256] {
        &self.tx_hashes
    }

    /// Returns the encrypted transaction payload.
    pub const fn encrypted_tx_blob(&self) -> &Bytes {
        &self.encrypted_tx_blob
    }

    /// Returns the sequencer order number of the batch.
    pub const fn seq_no(&self) -> u64 {
        self.header.sequencer_order_no
    }

    /// Returns the L2 height of the batch.
    pub const fn number(&self) -> u64 {
        self.header.number
    }

    /// Consumes the envelope, returning its parts.
    pub fn into_parts(self) -> (BatchHeader, Vec<B256>, Bytes) {
        (self.header, self.tx_hashes, self.encrypted_tx_blob)
    }

    fn rlp_payload_length(&self) -> usize {
        self.header.length() + self.tx_hashes.length() + self.encrypted_tx_blob.length()
    }
}

impl PartialEq for ExtBatch {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header &&
            self.tx_hashes == other.tx_hashes &&
            self.encrypted_tx_blob == other.encrypted_tx_blob
    }
}

impl Eq for ExtBatch {}

impl Encodable for ExtBatch {
    fn encode(&self, out: &mut dyn BufMut) {
        Header { list: true, payload_length: self.rlp_payload_length() }.encode(out);
        self.header.encode(out);
        self.tx_hashes.encode(out);
        self.encrypted_tx_blob.encode(out);
    }

    fn length(&self) -> usize {
        Header { list: true, payload_length: self.rlp_payload_length() }.length_with_payload()
    }
}

impl Decodable for ExtBatch {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let raw: alloy_rlp::Result<RawBatch> =
            decode_rlp_list!(buf, RawBatch { header, tx_hashes, encrypted_tx_blob });
        let RawBatch { header, tx_hashes, encrypted_tx_blob } = raw?;
        Ok(Self::new(header, tx_hashes, encrypted_tx_blob))
    }
}

struct RawBatch {
    header: BatchHeader,
    tx_hashes: Vec<B256>,
    encrypted_tx_blob: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    fn batch(seq_no: u64) -> ExtBatch {
        let header = BatchHeader {
            number: seq_no,
            sequencer_order_no: seq_no,
            r: U256::from(seq_no),
            ..Default::default()
        };
        ExtBatch::new(
            header,
            vec![B256::repeat_byte(0x11), B256::repeat_byte(0x22)],
            Bytes::from_static(&[0xde, 0xad]),
        )
    }

    #[test]
    fn test_hash_matches_header_hash() {
        let batch = batch(3);
        assert_eq!(batch.hash(), batch.header().hash_slow());
        // Cached value is served on subsequent calls.
        assert_eq!(batch.hash(), batch.hash());
    }

    #[test]
    fn test_equality_ignores_hash_cache() {
        let left = batch(3);
        let right = batch(3);
        let _ = left.hash();

        assert_eq!(left, right);
        assert_ne!(left, batch(4));
    }

    #[test]
    fn test_rlp_decode_restores_envelope() {
        let original = batch(9);
        let encoded = alloy_rlp::encode(&original);
        let decoded = ExtBatch::decode(&mut encoded.as_slice()).expect("decode batch");

        assert_eq!(decoded, original);
        assert_eq!(decoded.hash(), original.hash());
        assert_eq!(decoded.tx_hashes().len(), 2);
    }

    #[test]
    fn test_serde_skips_hash_cache() {
        let original = batch(5);
        let _ = original.hash();
        let json = serde_json::to_string(&original).expect("serialize batch");
        assert!(!json.contains("\"hash\""));

        let decoded: ExtBatch = serde_json::from_str(&json).expect("deserialize batch");
        assert_eq!(decoded.hash(), original.hash());
    }
}
