//! Scheduler profile object type and its transaction handler.

mod orch;
mod types;

pub use orch::{SchedulerOrch, SchedulerSnapshot};
pub use types::{Scheduler, SchedulerReq};
