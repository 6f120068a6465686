#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod chaindb;
pub use chaindb::ChainDb;

mod error;
pub use error::StorageError;

mod filter;
pub use filter::EventLogFilter;

pub mod models;
pub use models::{EventLogEntry, EventLogKey, EventLogRecord, StoredRollup};

mod providers;

mod traits;
pub use traits::{
    BatchStorageReader, BatchStorageWriter, ChainStore, EventLogStorageReader,
    EventLogStorageWriter, L1BlockStorage, RollupStorageReader, RollupStorageWriter,
};
