//! Queue definitions for the driver surface.

use crate::types::{NdiPort, RawNdiObjectId};

/// Queue type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueueType {
    Unicast,
    Multicast,
    Cpu,
}

impl QueueType {
    /// Parses a queue type string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "UCAST" | "UNICAST" => Some(Self::Unicast),
            "MCAST" | "MULTICAST" => Some(Self::Multicast),
            "CPU" => Some(Self::Cpu),
            _ => None,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unicast => "UCAST",
            Self::Multicast => "MCAST",
            Self::Cpu => "CPU",
        }
    }
}

/// Switch-wide queue partitioning, read once per switch from the hardware
/// layer. Unicast queues occupy the first `ucast_per_port` local indexes of
/// a port; multicast queues follow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueuePartition {
    pub ucast_per_port: u32,
    pub mcast_per_port: u32,
    pub total_per_port: u32,
    pub cpu_queues: u32,
}

/// Queue configuration as the driver consumes it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueNdiCfg {
    pub port: NdiPort,
    pub queue_type: QueueType,
    /// Port-local queue index.
    pub queue_index: u32,
    /// Parent scheduler-group handle; null when unattached.
    pub parent: RawNdiObjectId,
    pub wred_id: RawNdiObjectId,
    pub buffer_profile_id: RawNdiObjectId,
    pub scheduler_profile_id: RawNdiObjectId,
}

/// Queue attribute ids, shared with the dirty-tracking layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueueAttr {
    WredId,
    BufferProfileId,
    SchedulerProfileId,
    ParentId,
}

/// What the driver reports about one existing queue, used during lazy
/// per-port discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueNdiInfo {
    pub queue_type: QueueType,
    pub queue_index: u32,
    pub parent: RawNdiObjectId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_type_parse() {
        assert_eq!(QueueType::parse("UCAST"), Some(QueueType::Unicast));
        assert_eq!(QueueType::parse("multicast"), Some(QueueType::Multicast));
        assert_eq!(QueueType::parse("invalid"), None);
    }
}
