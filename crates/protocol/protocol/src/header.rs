//! Plaintext headers of batches and rollups.
//!
//! Both headers carry an ECDSA signature split into `r` and `s`. The hash of a header is the
//! keccak256 of its canonical RLP encoding with the signature fields left out, so that the
//! hash is stable across re-signing.

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use alloy_rlp::{BufMut, Decodable, Encodable, Header};
use serde::{Deserialize, Serialize};

/// Decodes a list of fields in declaration order, checking that the list payload is consumed
/// exactly.
macro_rules! decode_rlp_list {
    ($buf:ident, $ty:ident { $($field:ident),+ $(,)? }) => {{
        let rlp_head = Header::decode($buf)?;
        if !rlp_head.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        let started_len = $buf.len();
        if started_len < rlp_head.payload_length {
            return Err(alloy_rlp::Error::InputTooShort);
        }
        let this = $ty { $($field: Decodable::decode($buf)?),+ };
        let consumed = started_len - $buf.len();
        if consumed != rlp_head.payload_length {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: rlp_head.payload_length,
                got: consumed,
            });
        }
        Ok(this)
    }};
}

pub(crate) use decode_rlp_list;

/// The plaintext header of a batch.
///
/// A batch is the rollup's unit of L2 block production. Every batch carries a sequencer-assigned
/// order number that is unique across the canonical chain and may skip heights after a reorg.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchHeader {
    /// Hash of the parent batch.
    pub parent_hash: B256,
    /// Post-execution state root.
    pub state_root: B256,
    /// Root of the transactions trie.
    pub transactions_root: B256,
    /// Root of the receipts trie.
    pub receipts_root: B256,
    /// L2 height of the batch.
    pub number: u64,
    /// Sequencer-assigned order number.
    pub sequencer_order_no: u64,
    /// Gas limit of the batch.
    pub gas_limit: u64,
    /// Gas consumed by the batch.
    pub gas_used: u64,
    /// Creation time, in seconds since the unix epoch.
    pub timestamp: u64,
    /// Arbitrary extra data.
    pub extra_data: Bytes,
    /// Base fee per gas.
    pub base_fee: u64,
    /// Address credited with the batch fees.
    pub coinbase: Address,
    /// Hash of the L1 block this batch was produced against.
    pub l1_proof: B256,
    /// Hash of the inbound cross-chain message bundle.
    pub inbound_cross_chain_hash: B256,
    /// L1 height of the inbound cross-chain message bundle.
    pub inbound_cross_chain_height: u64,
    /// Root of the value transfer tree.
    pub transfers_tree: B256,
    /// Signature `r` value.
    pub r: U256,
    /// Signature `s` value.
    pub s: U256,
}

impl BatchHeader {
    /// Computes the hash of the header, excluding the signature.
    ///
    /// Prefer [`crate::ExtBatch::hash`], which caches the result.
    pub fn hash_slow(&self) -> B256 {
        let mut out = Vec::with_capacity(self.rlp_payload_length(false) + 4);
        self.encode_with(&mut out, false);
        keccak256(&out)
    }

    /// Builds the header of a rollup whose newest batch is this one.
    pub const fn to_rollup_header(&self, l1_proof_number: u64) -> RollupHeader {
        RollupHeader {
            compression_l1_head: self.l1_proof,
            l1_proof_number,
            coinbase: self.coinbase,
            payload_hash: B256::ZERO,
            last_batch_seq_no: self.sequencer_order_no,
            r: U256::ZERO,
            s: U256::ZERO,
        }
    }

    fn rlp_payload_length(&self, with_signature: bool) -> usize {
        let mut length = self.parent_hash.length() +
            self.state_root.length() +
            self.transactions_root.length() +
            self.receipts_root.length() +
            self.number.length() +
            self.sequencer_order_no.length() +
            self.gas_limit.length() +
            self.gas_used.length() +
            self.timestamp.length() +
            self.extra_data.length() +
            self.base_fee.length() +
            self.coinbase.length() +
            self.l1_proof.length() +
            self.inbound_cross_chain_hash.length() +
            self.inbound_cross_chain_height.length() +
            self.transfers_tree.length();
        if with_signature {
            length += self.r.length() + self.s.length();
        }
        length
    }

    fn encode_with(&self, out: &mut dyn BufMut, with_signature: bool) {
        Header { list: true, payload_length: self.rlp_payload_length(with_signature) }.encode(out);
        self.parent_hash.encode(out);
        self.state_root.encode(out);
        self.transactions_root.encode(out);
        self.receipts_root.encode(out);
        self.number.encode(out);
        self.sequencer_order_no.encode(out);
        self.gas_limit.encode(out);
        self.gas_used.encode(out);
        self.timestamp.encode(out);
        self.extra_data.encode(out);
        self.base_fee.encode(out);
        self.coinbase.encode(out);
        self.l1_proof.encode(out);
        self.inbound_cross_chain_hash.encode(out);
        self.inbound_cross_chain_height.encode(out);
        self.transfers_tree.encode(out);
        if with_signature {
            self.r.encode(out);
            self.s.encode(out);
        }
    }
}

impl Encodable for BatchHeader {
    fn encode(&self, out: &mut dyn BufMut) {
        self.encode_with(out, true);
    }

    fn length(&self) -> usize {
        let payload_length = self.rlp_payload_length(true);
        Header { list: true, payload_length }.length_with_payload()
    }
}

impl Decodable for BatchHeader {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        decode_rlp_list!(
            buf,
            Self {
                parent_hash,
                state_root,
                transactions_root,
                receipts_root,
                number,
                sequencer_order_no,
                gas_limit,
                gas_used,
                timestamp,
                extra_data,
                base_fee,
                coinbase,
                l1_proof,
                inbound_cross_chain_hash,
                inbound_cross_chain_height,
                transfers_tree,
                r,
                s,
            }
        )
    }
}

/// The plaintext header of a rollup published to L1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RollupHeader {
    /// The L1 block the rollup was compressed against.
    pub compression_l1_head: B256,
    /// L1 height at which the rollup was proven.
    pub l1_proof_number: u64,
    /// Address credited with the rollup fees.
    pub coinbase: Address,
    /// Hash of the compressed batch payload.
    pub payload_hash: B256,
    /// Sequence number of the newest batch in the rollup.
    pub last_batch_seq_no: u64,
    /// Signature `r` value.
    pub r: U256,
    /// Signature `s` value.
    pub s: U256,
}

impl RollupHeader {
    /// Computes the hash of the header, excluding the signature.
    pub fn hash_slow(&self) -> B256 {
        let mut out = Vec::with_capacity(self.rlp_payload_length(false) + 2);
        self.encode_with(&mut out, false);
        keccak256(&out)
    }

    fn rlp_payload_length(&self, with_signature: bool) -> usize {
        let mut length = self.compression_l1_head.length() +
            self.l1_proof_number.length() +
            self.coinbase.length() +
            self.payload_hash.length() +
            self.last_batch_seq_no.length();
        if with_signature {
            length += self.r.length() + self.s.length();
        }
        length
    }

    fn encode_with(&self, out: &mut dyn BufMut, with_signature: bool) {
        Header { list: true, payload_length: self.rlp_payload_length(with_signature) }.encode(out);
        self.compression_l1_head.encode(out);
        self.l1_proof_number.encode(out);
        self.coinbase.encode(out);
        self.payload_hash.encode(out);
        self.last_batch_seq_no.encode(out);
        if with_signature {
            self.r.encode(out);
            self.s.encode(out);
        }
    }
}

impl Encodable for RollupHeader {
    fn encode(&self, out: &mut dyn BufMut) {
        self.encode_with(out, true);
    }

    fn length(&self) -> usize {
        let payload_length = self.rlp_payload_length(true);
        Header { list: true, payload_length }.length_with_payload()
    }
}

impl Decodable for RollupHeader {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        decode_rlp_list!(
            buf,
            Self {
                compression_l1_head,
                l1_proof_number,
                coinbase,
                payload_hash,
                last_batch_seq_no,
                r,
                s,
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> BatchHeader {
        BatchHeader {
            parent_hash: B256::repeat_byte(0x01),
            number: 42,
            sequencer_order_no: 57,
            gas_limit: 30_000_000,
            gas_used: 21_000,
            timestamp: 1_700_000_000,
            extra_data: Bytes::from_static(b"conclave"),
            coinbase: Address::repeat_byte(0xaa),
            l1_proof: B256::repeat_byte(0x0f),
            r: U256::from(7u64),
            s: U256::from(9u64),
            ..Default::default()
        }
    }

    #[test]
    fn test_batch_header_hash_ignores_signature() {
        let header = sample_header();
        let mut resigned = header.clone();
        resigned.r = U256::from(1234u64);
        resigned.s = U256::from(5678u64);

        assert_eq!(header.hash_slow(), resigned.hash_slow());
    }

    #[test]
    fn test_batch_header_hash_covers_sequence() {
        let header = sample_header();
        let mut other = header.clone();
        other.sequencer_order_no += 1;

        assert_ne!(header.hash_slow(), other.hash_slow());
    }

    #[test]
    fn test_batch_header_rlp_keeps_signature() {
        let header = sample_header();
        let encoded = alloy_rlp::encode(&header);
        assert_eq!(encoded.len(), header.length());

        let decoded = BatchHeader::decode(&mut encoded.as_slice()).expect("decode header");
        assert_eq!(decoded, header);
        assert_eq!(decoded.r, U256::from(7u64));
    }

    #[test]
    fn test_batch_header_decode_rejects_truncated_input() {
        let encoded = alloy_rlp::encode(sample_header());
        let truncated = &encoded[..encoded.len() - 3];
        assert!(BatchHeader::decode(&mut &truncated[..]).is_err());
    }

    #[test]
    fn test_rollup_header_from_batch() {
        let header = sample_header();
        let rollup = header.to_rollup_header(100);

        assert_eq!(rollup.last_batch_seq_no, 57);
        assert_eq!(rollup.compression_l1_head, header.l1_proof);
        assert_eq!(rollup.l1_proof_number, 100);
        assert_eq!(rollup.coinbase, header.coinbase);
    }

    #[test]
    fn test_rollup_header_hash_ignores_signature() {
        let rollup = sample_header().to_rollup_header(100);
        let mut signed = rollup.clone();
        signed.r = U256::from(3u64);

        assert_eq!(rollup.hash_slow(), signed.hash_slow());
        assert_ne!(alloy_rlp::encode(&rollup), alloy_rlp::encode(&signed));
    }
}
