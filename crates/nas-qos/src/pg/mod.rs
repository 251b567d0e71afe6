//! Priority-group object type and its transaction handler.

mod orch;
mod types;

pub use orch::{init_port_priority_groups, PriorityGroupOrch, PriorityGroupSnapshot};
pub use types::{PgKey, PriorityGroup, PriorityGroupReq};
