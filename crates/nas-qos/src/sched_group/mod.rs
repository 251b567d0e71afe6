//! Scheduler-group object type, the hierarchy consistency engine, and the
//! transaction handler on top of them.

mod hierarchy;
mod orch;
mod types;

pub use orch::{init_port_sched_groups, SchedGroupOrch, SchedGroupSnapshot};
pub use types::{SchedGroup, SchedGroupReq};
