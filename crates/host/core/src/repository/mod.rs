//! Batch ingestion and peer catch-up.
//!
//! - [`BatchRepository`] stores batches, tracks the network high watermark and recovers gaps.
//! - [`BatchRepositoryActor`] feeds [`InboundPeerMessage`]s from the peer layer into it.
//! - [`PeerMessenger`], [`EnclaveClient`] and [`BatchSubscriber`] are the collaborators the
//!   repository is wired to.

mod actor;
pub use actor::{BatchRepositoryActor, InboundPeerMessage};

mod error;
pub use error::{BatchRepositoryError, EnclaveError, PeerError};

#[allow(clippy::module_inception)]
mod repository;
pub use repository::{BatchRepository, HealthStatus};

mod traits;
pub use traits::{BatchSubscriber, EnclaveClient, PeerMessenger};
