//! Classification map object type (with its entry sub-resource) and its
//! transaction handler.

mod orch;
mod types;

pub use orch::{MapOrch, MapSnapshot};
pub use types::{MapReq, QosMap};
