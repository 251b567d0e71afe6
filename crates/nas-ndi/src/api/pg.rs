//! Priority-group definitions for the driver surface.
//!
//! Priority groups exist on the NPU from boot; the driver only exposes
//! attribute writes and discovery queries, never create or delete.

use crate::types::RawNdiObjectId;

/// Priority-group configuration as the driver consumes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriorityGroupNdiCfg {
    pub buffer_profile_id: RawNdiObjectId,
}

/// Priority-group attribute ids, shared with the dirty-tracking layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityGroupAttr {
    BufferProfileId,
}
