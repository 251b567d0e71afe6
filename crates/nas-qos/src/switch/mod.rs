//! Per-switch object registries and the process-wide switch directory.

mod context;
mod registry;

pub use context::{QosContext, TopologyInventory};
pub use registry::{HasObjId, IdTable, PortKeyed, PortTable, ProfileTable, QosSwitch};
