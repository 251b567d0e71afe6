//! Buffer pool and buffer profile object types and their transaction
//! handler.

mod orch;
mod types;

pub use orch::{BufferOrch, BufferPoolSnapshot, BufferProfileSnapshot};
pub use types::{BufferPool, BufferPoolReq, BufferProfile, BufferProfileReq};
