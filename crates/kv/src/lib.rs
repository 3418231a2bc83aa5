//! Client-side access layer for a replicated key-value store.
//!
//! Provides: version-vector causality tracking, tunable consistency tiers
//! (ONE/QUORUM/ALL), and a coordinator that fans out replica calls.

pub mod chaos;
pub mod coordinator;
pub mod placement;
pub mod transport;
pub mod vclock;

pub use coordinator::{
    Coordinator, CoordinatorConfig, CoordinatorError, GetResult, NodeStat, StatReport, WriteAck,
};
pub use placement::{Placement, ReplicaSet, StaticPlacement};
pub use transport::{
    NodeStatus, ReplicaRequest, ReplicaResponse, Transport, TransportError, VersionedValue,
};
pub use vclock::{Causality, VersionVector};
