use crate::LogIndexerError;
use alloy_primitives::{Address, B256, Log};
use std::fmt::Debug;

/// The receipt of an executed transaction, reduced to what the log indexer needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionReceipt {
    /// Hash of the transaction.
    pub tx_hash: B256,
    /// Logs emitted by the transaction, in emission order.
    pub logs: Vec<Log>,
}

impl TransactionReceipt {
    /// Creates a new [`TransactionReceipt`].
    pub const fn new(tx_hash: B256, logs: Vec<Log>) -> Self {
        Self { tx_hash, logs }
    }
}

/// Read access to the post-execution state of a batch.
pub trait StateCodeProvider: Debug {
    /// Returns `true` if contract code is deployed at `address`.
    fn has_code(&self, address: Address) -> Result<bool, LogIndexerError>;
}
