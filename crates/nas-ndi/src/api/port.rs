//! Port ingress/egress QoS profile definitions for the driver surface.
//!
//! Port profiles do not create driver objects; every field maps to an
//! attribute write against the port itself.

use crate::types::RawNdiObjectId;

/// Port ingress QoS configuration as the driver consumes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortIngressNdiCfg {
    pub default_traffic_class: u8,
    pub dot1p_to_tc_map: RawNdiObjectId,
    pub dscp_to_tc_map: RawNdiObjectId,
    pub tc_to_priority_group_map: RawNdiObjectId,
    pub policer_id: RawNdiObjectId,
    /// Bit vector of priorities with PFC enabled.
    pub per_priority_flow_control: u8,
}

/// Port ingress attribute ids, shared with the dirty-tracking layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PortIngressAttr {
    DefaultTrafficClass,
    Dot1pToTcMap,
    DscpToTcMap,
    TcToPriorityGroupMap,
    PolicerId,
    PerPriorityFlowControl,
}

/// Port egress QoS configuration as the driver consumes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortEgressNdiCfg {
    /// Per-port buffer ceiling in bytes; 0 means unlimited.
    pub buffer_limit: u64,
    pub scheduler_profile_id: RawNdiObjectId,
    pub tc_to_queue_map: RawNdiObjectId,
    pub tc_to_dot1p_map: RawNdiObjectId,
    pub tc_to_dscp_map: RawNdiObjectId,
}

/// Port egress attribute ids, shared with the dirty-tracking layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PortEgressAttr {
    BufferLimit,
    SchedulerProfileId,
    TcToQueueMap,
    TcToDot1pMap,
    TcToDscpMap,
}
