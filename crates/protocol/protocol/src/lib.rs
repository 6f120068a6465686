#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod header;
pub use header::{BatchHeader, RollupHeader};

mod batch;
pub use batch::ExtBatch;

mod rollup;
pub use rollup::{ExtRollup, RollupMetadata};

mod block;
pub use block::L1BlockInfo;

mod pagination;
pub use pagination::{InvalidPageSize, QueryPagination};

mod messages;
pub use messages::{BatchMsg, BatchRequest};
