//! Providers for the host chain store.
//!
//! Each provider wraps a borrowed database transaction and implements the reads and writes of
//! one area of the store:
//! - Batches and their secondary indexes ([`BatchProvider`])
//! - Rollups ([`RollupProvider`])
//! - L1 blocks and canonical status ([`BlockProvider`])
//! - Head pointers and running counters ([`HeadRefProvider`])
//! - Event logs and the relevance index ([`EventProvider`])
//!
//! Providers never commit. The caller owns the transaction and decides whether to commit or
//! abort it, which keeps a multi-table write atomic.
mod batch_provider;
pub(crate) use batch_provider::BatchProvider;

mod rollup_provider;
pub(crate) use rollup_provider::RollupProvider;

mod block_provider;
pub(crate) use block_provider::BlockProvider;

mod head_ref_provider;
pub(crate) use head_ref_provider::HeadRefProvider;

mod event_provider;
pub(crate) use event_provider::EventProvider;
