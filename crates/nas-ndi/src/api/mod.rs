//! The QoS driver call surface.
//!
//! [`QosNdi`] is everything the object-model layer is allowed to ask of an
//! NPU: per-type create/set-attribute/delete, the scheduler-group bulk
//! child-list edits, and the discovery queries used to lazily materialize
//! per-port objects that the hardware creates on its own (queues, priority
//! groups, the default scheduling tree).
//!
//! All calls are synchronous and may block on driver I/O. Where a call takes
//! an id list, ordering within the list is unspecified; implementations must
//! treat the list as a set.

mod buffer;
mod map;
mod pg;
mod policer;
mod port;
mod queue;
mod sched_group;
mod scheduler;
mod wred;

pub use buffer::{
    BufferPoolAttr, BufferPoolCfg, BufferPoolType, BufferProfileAttr, BufferProfileCfg,
    ThresholdMode,
};
pub use map::{MapAttr, MapEntry, MapEntryKey, MapType, PacketColor};
pub use pg::{PriorityGroupAttr, PriorityGroupNdiCfg};
pub use policer::{ColorSource, MeterType, PacketAction, PolicerAttr, PolicerCfg, PolicerMode};
pub use port::{PortEgressAttr, PortEgressNdiCfg, PortIngressAttr, PortIngressNdiCfg};
pub use queue::{QueueAttr, QueueNdiCfg, QueueNdiInfo, QueuePartition, QueueType};
pub use sched_group::{SchedGroupAttr, SchedGroupNdiCfg, SchedGroupNdiInfo};
pub use scheduler::{SchedulerAttr, SchedulerCfg, SchedulerType};
pub use wred::{WredAttr, WredCfg};

use crate::error::NdiResult;
use crate::types::{
    BufferPoolNdiId, BufferProfileNdiId, MapNdiId, NdiPort, NpuId, PolicerNdiId,
    PriorityGroupNdiId, QueueNdiId, RawNdiObjectId, SchedGroupNdiId, SchedulerNdiId, WredNdiId,
};

/// Outbound hardware calls for QoS programming, one implementation per
/// driver (or one mock per test suite).
pub trait QosNdi: Send + Sync {
    // ------------------------------------------------------------------
    // Switch-wide queries
    // ------------------------------------------------------------------

    /// Reports the switch-wide queue partitioning constants.
    fn queue_partition(&self, npu: NpuId) -> NdiResult<QueuePartition>;

    // ------------------------------------------------------------------
    // Policer
    // ------------------------------------------------------------------

    fn create_policer(&self, npu: NpuId, cfg: &PolicerCfg) -> NdiResult<PolicerNdiId>;
    fn set_policer_attr(
        &self,
        npu: NpuId,
        id: PolicerNdiId,
        attr: PolicerAttr,
        cfg: &PolicerCfg,
    ) -> NdiResult<()>;
    fn delete_policer(&self, npu: NpuId, id: PolicerNdiId) -> NdiResult<()>;

    // ------------------------------------------------------------------
    // WRED profile
    // ------------------------------------------------------------------

    fn create_wred(&self, npu: NpuId, cfg: &WredCfg) -> NdiResult<WredNdiId>;
    fn set_wred_attr(
        &self,
        npu: NpuId,
        id: WredNdiId,
        attr: WredAttr,
        cfg: &WredCfg,
    ) -> NdiResult<()>;
    fn delete_wred(&self, npu: NpuId, id: WredNdiId) -> NdiResult<()>;

    // ------------------------------------------------------------------
    // Scheduler profile
    // ------------------------------------------------------------------

    fn create_scheduler(&self, npu: NpuId, cfg: &SchedulerCfg) -> NdiResult<SchedulerNdiId>;
    fn set_scheduler_attr(
        &self,
        npu: NpuId,
        id: SchedulerNdiId,
        attr: SchedulerAttr,
        cfg: &SchedulerCfg,
    ) -> NdiResult<()>;
    fn delete_scheduler(&self, npu: NpuId, id: SchedulerNdiId) -> NdiResult<()>;

    // ------------------------------------------------------------------
    // Classification maps
    // ------------------------------------------------------------------

    fn create_map(&self, npu: NpuId, map_type: MapType) -> NdiResult<MapNdiId>;
    fn delete_map(&self, npu: NpuId, id: MapNdiId) -> NdiResult<()>;
    /// Installs or overwrites one entry of a map.
    fn set_map_entry(
        &self,
        npu: NpuId,
        id: MapNdiId,
        map_type: MapType,
        entry: &MapEntry,
    ) -> NdiResult<()>;
    /// Removes one entry of a map.
    fn del_map_entry(
        &self,
        npu: NpuId,
        id: MapNdiId,
        map_type: MapType,
        key: MapEntryKey,
    ) -> NdiResult<()>;

    // ------------------------------------------------------------------
    // Buffer pools and profiles
    // ------------------------------------------------------------------

    fn create_buffer_pool(&self, npu: NpuId, cfg: &BufferPoolCfg) -> NdiResult<BufferPoolNdiId>;
    fn set_buffer_pool_attr(
        &self,
        npu: NpuId,
        id: BufferPoolNdiId,
        attr: BufferPoolAttr,
        cfg: &BufferPoolCfg,
    ) -> NdiResult<()>;
    fn delete_buffer_pool(&self, npu: NpuId, id: BufferPoolNdiId) -> NdiResult<()>;

    fn create_buffer_profile(
        &self,
        npu: NpuId,
        cfg: &BufferProfileCfg,
    ) -> NdiResult<BufferProfileNdiId>;
    fn set_buffer_profile_attr(
        &self,
        npu: NpuId,
        id: BufferProfileNdiId,
        attr: BufferProfileAttr,
        cfg: &BufferProfileCfg,
    ) -> NdiResult<()>;
    fn delete_buffer_profile(&self, npu: NpuId, id: BufferProfileNdiId) -> NdiResult<()>;

    // ------------------------------------------------------------------
    // Queues
    // ------------------------------------------------------------------

    fn create_queue(&self, npu: NpuId, cfg: &QueueNdiCfg) -> NdiResult<QueueNdiId>;
    fn set_queue_attr(
        &self,
        npu: NpuId,
        id: QueueNdiId,
        attr: QueueAttr,
        cfg: &QueueNdiCfg,
    ) -> NdiResult<()>;
    fn delete_queue(&self, npu: NpuId, id: QueueNdiId) -> NdiResult<()>;

    /// Number of queues the hardware created on a port.
    fn port_queue_count(&self, port: NdiPort) -> NdiResult<u32>;
    /// Handles of all hardware queues on a port.
    fn port_queue_id_list(&self, port: NdiPort) -> NdiResult<Vec<QueueNdiId>>;
    /// Attributes of one hardware queue.
    fn queue_info(&self, npu: NpuId, id: QueueNdiId) -> NdiResult<QueueNdiInfo>;

    // ------------------------------------------------------------------
    // Priority groups
    // ------------------------------------------------------------------

    fn set_priority_group_attr(
        &self,
        npu: NpuId,
        id: PriorityGroupNdiId,
        attr: PriorityGroupAttr,
        cfg: &PriorityGroupNdiCfg,
    ) -> NdiResult<()>;
    fn port_priority_group_count(&self, port: NdiPort) -> NdiResult<u32>;
    fn port_priority_group_id_list(&self, port: NdiPort) -> NdiResult<Vec<PriorityGroupNdiId>>;

    // ------------------------------------------------------------------
    // Scheduler groups
    // ------------------------------------------------------------------

    fn create_sched_group(&self, npu: NpuId, cfg: &SchedGroupNdiCfg) -> NdiResult<SchedGroupNdiId>;
    fn set_sched_group_attr(
        &self,
        npu: NpuId,
        id: SchedGroupNdiId,
        attr: SchedGroupAttr,
        cfg: &SchedGroupNdiCfg,
    ) -> NdiResult<()>;
    fn delete_sched_group(&self, npu: NpuId, id: SchedGroupNdiId) -> NdiResult<()>;

    /// Fan-out ceiling the hardware reports for a scheduler group.
    fn sched_group_max_child(&self, npu: NpuId, id: SchedGroupNdiId) -> NdiResult<u32>;
    /// Attaches a set of children (queues or scheduler groups) in one call.
    fn sched_group_add_children(
        &self,
        npu: NpuId,
        id: SchedGroupNdiId,
        children: &[RawNdiObjectId],
    ) -> NdiResult<()>;
    /// Detaches a set of children in one call.
    fn sched_group_remove_children(
        &self,
        npu: NpuId,
        id: SchedGroupNdiId,
        children: &[RawNdiObjectId],
    ) -> NdiResult<()>;

    fn port_sched_group_count(&self, port: NdiPort) -> NdiResult<u32>;
    fn port_sched_group_id_list(&self, port: NdiPort) -> NdiResult<Vec<SchedGroupNdiId>>;
    /// Attributes of one hardware scheduler group.
    fn sched_group_info(&self, npu: NpuId, id: SchedGroupNdiId) -> NdiResult<SchedGroupNdiInfo>;

    // ------------------------------------------------------------------
    // Port profiles
    // ------------------------------------------------------------------

    fn set_port_ingress_attr(
        &self,
        port: NdiPort,
        attr: PortIngressAttr,
        cfg: &PortIngressNdiCfg,
    ) -> NdiResult<()>;
    fn set_port_egress_attr(
        &self,
        port: NdiPort,
        attr: PortEgressAttr,
        cfg: &PortEgressNdiCfg,
    ) -> NdiResult<()>;
}
