//! Queue object type and its transaction handler.

mod orch;
mod types;

pub use orch::{init_port_queues, QueueOrch, QueueSnapshot};
pub use types::{Queue, QueueKey, QueueReq};
