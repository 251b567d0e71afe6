//! WRED profile object type and its transaction handler.

mod orch;
mod types;

pub use orch::{WredOrch, WredSnapshot};
pub use types::{WredProfile, WredReq};
