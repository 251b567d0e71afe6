//! NAS QoS object model and transaction engine.
//!
//! This crate is the in-memory authority for a multi-NPU switch's QoS
//! configuration: queues, schedulers and their hierarchy, buffer pools and
//! profiles, priority groups, policers, WRED profiles, classification maps
//! and per-port QoS profiles.
//!
//! # Architecture
//!
//! - [`switch`]: one [`QosSwitch`] registry per logical switch (one keyed
//!   table plus one bounded id pool per object type, one mutex per type),
//!   cached in an explicitly-owned [`QosContext`] built from the injected
//!   driver ([`nas_ndi::QosNdi`]) and topology collaborators.
//! - [`base`]: the dirty-attribute/hardware-handle contract every object
//!   type satisfies, and the generic commit/rollback routines on top.
//! - One module per object family (`policer`, `wred`, `map`, `scheduler`,
//!   `sched_group`, `queue`, `buffer`, `pg`, `port`), each with its types
//!   and transaction handler.
//!
//! Requests run synchronously to completion under their object type's
//! table lock; operations on different types proceed concurrently and are
//! not atomic with respect to each other. Every mutating operation returns
//! a previous-state snapshot the caller can replay through `rollback` to
//! undo a partially-applied multi-object transaction.
//!
//! Nothing is persisted: registries are rebuilt from hardware and topology
//! queries (lazy per-port initialization) after a restart.

pub mod audit;
pub mod base;
pub mod buffer;
pub mod config;
pub mod error;
pub mod map;
pub mod pg;
pub mod policer;
pub mod port;
pub mod queue;
pub mod sched_group;
pub mod scheduler;
pub mod switch;
#[cfg(test)]
pub(crate) mod testing;
pub mod wred;

pub use base::{ObjId, OrchStats, Snapshot};
pub use config::QosConfig;
pub use error::{QosError, QosResult};
pub use switch::{QosContext, QosSwitch, TopologyInventory};

pub use buffer::BufferOrch;
pub use map::MapOrch;
pub use pg::PriorityGroupOrch;
pub use policer::PolicerOrch;
pub use port::PortQosOrch;
pub use queue::QueueOrch;
pub use sched_group::SchedGroupOrch;
pub use scheduler::SchedulerOrch;
pub use wred::WredOrch;
