//! Log indexing module computing the relevance metadata of event logs.
//!
//! An event log is relevant to the end-user accounts named in its indexed topics. Logs naming
//! no end-user account are lifecycle events and are visible to everyone. The metadata computed
//! here is what lets filtered log queries enforce that rule without decrypting anything.
//!
//! # Modules
//!
//! - [`LogIndexer`]: computes relevance rows for the logs of a batch and persists them.
//! - [`LogIndexerError`]: error type for failures in classifying or storing logs.
//! - `relevance`: the address-shape heuristic applied to topics.
//! - `types`: receipts and the state accessor consumed by the indexer.

mod error;
pub use error::LogIndexerError;

mod indexer;
pub use indexer::LogIndexer;

mod relevance;
pub use relevance::extract_potential_address;

mod types;
pub use types::{StateCodeProvider, TransactionReceipt};
