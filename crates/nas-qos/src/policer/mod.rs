//! Policer object type and its transaction handler.

mod orch;
mod types;

pub use orch::{PolicerOrch, PolicerSnapshot};
pub use types::{Policer, PolicerReq};
