#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod config;
pub use config::{ConfigError, NodeType, RepositoryConfig};

pub mod logindexer;
pub use logindexer::{LogIndexer, LogIndexerError};

mod metrics;
pub(crate) use self::metrics::Metrics;

pub mod repository;
pub use repository::{
    BatchRepository, BatchRepositoryActor, BatchRepositoryError, BatchSubscriber, EnclaveClient,
    HealthStatus, InboundPeerMessage, PeerMessenger,
};
