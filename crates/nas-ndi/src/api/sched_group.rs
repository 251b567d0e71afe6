//! Scheduler-group definitions for the driver surface.

use crate::types::{NdiPort, RawNdiObjectId};

/// Scheduler-group configuration as the driver consumes it.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedGroupNdiCfg {
    pub port: NdiPort,
    /// Depth in the port's scheduling tree; 0 is attached to the port.
    pub level: u32,
    pub scheduler_profile_id: RawNdiObjectId,
}

/// Scheduler-group attribute ids, shared with the dirty-tracking layer.
///
/// `ChildList` is the one non-leaf attribute in the QoS model: editing it
/// requires cross-object coordination and uses the bulk child calls below
/// rather than a plain set-attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchedGroupAttr {
    SchedulerProfileId,
    ChildList,
}

/// What the driver reports about one existing scheduler group, used during
/// lazy per-port discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedGroupNdiInfo {
    pub level: u32,
    pub max_child: u32,
    pub parent: RawNdiObjectId,
    pub scheduler_profile_id: RawNdiObjectId,
    pub child_list: Vec<RawNdiObjectId>,
}
