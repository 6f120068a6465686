//! Messages exchanged between hosts over the peer network.

use crate::ExtBatch;
use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

/// A set of batches sent from one host to another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
pub struct BatchMsg {
    /// The batches, in ascending sequence order.
    pub batches: Vec<ExtBatch>,
    /// Whether the batches answer a catch-up request rather than being freshly produced.
    pub is_catch_up: bool,
}

impl BatchMsg {
    /// Creates a message carrying freshly produced batches.
    pub const fn live(batches: Vec<ExtBatch>) -> Self {
        Self { batches, is_catch_up: false }
    }

    /// Creates a message answering a catch-up request.
    pub const fn catch_up(batches: Vec<ExtBatch>) -> Self {
        Self { batches, is_catch_up: true }
    }
}

/// A request for the batches starting at a sequence number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
pub struct BatchRequest {
    /// Address of the requesting peer.
    pub requester: String,
    /// First sequence number wanted.
    pub from_seq_no: u64,
}
