//! Shared object-model machinery: bounded id pools, the per-object
//! dirty/handle bookkeeping contract, and the generic commit engine built
//! on top of it.

mod id_alloc;
mod object;
mod txn;

pub use id_alloc::IdAllocator;
pub use object::{DirtySet, HandleMap, NpuSet, ObjId, OrchStats, QosObject};
pub use txn::{commit_create, commit_delete, commit_modify, Snapshot};

/// Type tag folded into queue ids so they stay distinguishable from every
/// other id space in the subsystem.
pub const QUEUE_ID_TYPE_MASK: ObjId = 0x0001_0000_0000_0000;

/// Type tag folded into scheduler-group ids.
pub const SCHED_GROUP_ID_TYPE_MASK: ObjId = 0x0002_0000_0000_0000;
