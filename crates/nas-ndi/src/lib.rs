//! NDI (NPU Driver Interface) boundary for the NAS QoS subsystem.
//!
//! This crate defines everything the QoS object model needs from the
//! hardware side of the house, without linking any driver:
//!
//! - [`types`]: type-safe NDI object ids (a queue handle cannot be passed
//!   where a scheduler-group handle is expected), plus the small identifier
//!   aliases shared across the stack.
//! - [`error`]: raw driver status codes and their conversion into Rust
//!   `Result` values.
//! - [`api`]: the [`QosNdi`] trait — the full set of outbound hardware calls
//!   (per-type create/set/delete, scheduler-group bulk child edits, and the
//!   per-port discovery queries used for lazy initialization).
//!
//! Production builds implement [`QosNdi`] over the vendor driver; tests
//! implement it over an in-memory object store.

pub mod api;
pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod types;

pub use api::{
    BufferPoolAttr, BufferPoolCfg, BufferPoolType, BufferProfileAttr, BufferProfileCfg,
    ColorSource, MapAttr, MapEntry, MapEntryKey, MapType, MeterType, PacketAction, PacketColor,
    PolicerAttr, PolicerCfg, PolicerMode, PortEgressAttr, PortEgressNdiCfg, PortIngressAttr,
    PortIngressNdiCfg,
    PriorityGroupAttr, PriorityGroupNdiCfg, QosNdi, QueueAttr, QueueNdiCfg, QueueNdiInfo,
    QueuePartition, QueueType, SchedGroupAttr, SchedGroupNdiCfg, SchedGroupNdiInfo, SchedulerAttr,
    SchedulerCfg, SchedulerType, ThresholdMode, WredAttr, WredCfg,
};
pub use error::{NdiError, NdiResult, NdiStatus, NdiStatusExt};
pub use types::{
    BufferPoolNdiId, BufferProfileNdiId, IfIndex, MapNdiId, NdiObjectId, NdiObjectKind, NdiPort,
    NpuId, PolicerNdiId, PortNdiId, PriorityGroupNdiId, QueueNdiId, RawNdiObjectId,
    SchedGroupNdiId, SchedulerNdiId, SwitchId, WredNdiId,
};
