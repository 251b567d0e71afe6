//! Queue object type.

use nas_ndi::types::QueueKind;
use nas_ndi::{
    IfIndex, NdiPort, NpuId, QosNdi, QueueAttr, QueueNdiCfg, QueueNdiId, QueuePartition, QueueType,
    RawNdiObjectId,
};

use crate::base::{DirtySet, HandleMap, NpuSet, ObjId, QosObject};
use crate::buffer::BufferProfile;
use crate::error::{QosError, QosResult};
use crate::scheduler::Scheduler;
use crate::switch::{HasObjId, IdTable, PortKeyed};
use crate::wred::WredProfile;

/// Queue key: port-primary so one port's queues form one contiguous key
/// range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueKey {
    pub port_id: IfIndex,
    pub local_queue_id: u32,
    pub queue_type: QueueType,
}

impl PortKeyed for QueueKey {
    fn port(&self) -> IfIndex {
        self.port_id
    }

    fn port_floor(port: IfIndex) -> Self {
        Self {
            port_id: port,
            local_queue_id: 0,
            queue_type: QueueType::Unicast,
        }
    }
}

/// Attribute set carried by a queue create or modify request.
#[derive(Debug, Clone, Default)]
pub struct QueueReq {
    pub wred_id: Option<ObjId>,
    pub buffer_profile_id: Option<ObjId>,
    pub scheduler_profile_id: Option<ObjId>,
}

/// A queue in the switch registry. Owned by exactly one NPU (the one that
/// owns its port).
#[derive(Debug, Clone)]
pub struct Queue {
    key: QueueKey,
    id: ObjId,
    ndi_port: NdiPort,
    parent_id: Option<ObjId>,
    wred_id: Option<ObjId>,
    buffer_profile_id: Option<ObjId>,
    scheduler_profile_id: Option<ObjId>,
    ndi_cfg: QueueNdiCfg,
    npus: NpuSet,
    dirty: DirtySet<QueueAttr>,
    handles: HandleMap<QueueKind>,
}

impl Queue {
    pub fn new(key: QueueKey, id: ObjId, ndi_port: NdiPort) -> Self {
        Self {
            key,
            id,
            ndi_port,
            parent_id: None,
            wred_id: None,
            buffer_profile_id: None,
            scheduler_profile_id: None,
            ndi_cfg: QueueNdiCfg {
                port: ndi_port,
                queue_type: key.queue_type,
                queue_index: key.local_queue_id,
                parent: 0,
                wred_id: 0,
                buffer_profile_id: 0,
                scheduler_profile_id: 0,
            },
            npus: NpuSet::single(ndi_port.npu),
            dirty: DirtySet::new(),
            handles: HandleMap::new(),
        }
    }

    /// Materializes a queue discovered on hardware, handle included.
    pub fn discovered(key: QueueKey, id: ObjId, ndi_port: NdiPort, handle: QueueNdiId) -> Self {
        let mut queue = Self::new(key, id, ndi_port);
        queue.handles.insert(ndi_port.npu, handle);
        queue
    }

    pub fn key(&self) -> QueueKey {
        self.key
    }

    pub fn ndi_port(&self) -> NdiPort {
        self.ndi_port
    }

    pub fn parent_id(&self) -> Option<ObjId> {
        self.parent_id
    }

    pub fn is_attached(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn wred_id(&self) -> Option<ObjId> {
        self.wred_id
    }

    pub fn buffer_profile_id(&self) -> Option<ObjId> {
        self.buffer_profile_id
    }

    pub fn scheduler_profile_id(&self) -> Option<ObjId> {
        self.scheduler_profile_id
    }

    /// Hardware handle on the owning NPU, if programmed.
    pub fn ndi_id(&self) -> Option<QueueNdiId> {
        self.handles.get(self.ndi_port.npu)
    }

    /// Parent pointer maintenance; only the hierarchy engine calls these.
    pub(crate) fn attach(&mut self, parent: ObjId) {
        self.parent_id = Some(parent);
    }

    pub(crate) fn detach(&mut self) {
        self.parent_id = None;
    }

    /// Applies a request's attributes, recording each as dirty.
    pub fn apply(&mut self, req: &QueueReq) {
        if let Some(v) = req.wred_id {
            self.dirty.mark(QueueAttr::WredId);
            self.wred_id = Some(v);
        }
        if let Some(v) = req.buffer_profile_id {
            self.dirty.mark(QueueAttr::BufferProfileId);
            self.buffer_profile_id = Some(v);
        }
        if let Some(v) = req.scheduler_profile_id {
            self.dirty.mark(QueueAttr::SchedulerProfileId);
            self.scheduler_profile_id = Some(v);
        }
    }

    /// Marks every user-settable attribute dirty, for full re-push during
    /// rollback. The parent pointer is derived state and excluded.
    pub fn mark_all_dirty(&mut self) {
        for attr in [
            QueueAttr::WredId,
            QueueAttr::BufferProfileId,
            QueueAttr::SchedulerProfileId,
        ] {
            self.dirty.mark(attr);
        }
    }

    /// Validates the referenced profiles and caches their hardware ids for
    /// this queue's NPU in the driver config.
    pub(crate) fn resolve(
        &mut self,
        partition: QueuePartition,
        wreds: &IdTable<WredProfile>,
        buffer_profiles: &IdTable<BufferProfile>,
        schedulers: &IdTable<Scheduler>,
    ) -> QosResult<()> {
        let npu = self.ndi_port.npu;
        self.ndi_cfg.queue_index = match self.key.queue_type {
            QueueType::Multicast => self.key.local_queue_id + partition.ucast_per_port,
            QueueType::Unicast | QueueType::Cpu => self.key.local_queue_id,
        };
        self.ndi_cfg.wred_id = resolve_ref(
            self.wred_id,
            |id| wreds.get(id).map(|w| w.handles().get(npu)),
            Self::OBJECT_TYPE,
            &self.key,
            "wred",
            npu,
        )?;
        self.ndi_cfg.buffer_profile_id = resolve_ref(
            self.buffer_profile_id,
            |id| buffer_profiles.get(id).map(|p| p.handles().get(npu)),
            Self::OBJECT_TYPE,
            &self.key,
            "buffer-profile",
            npu,
        )?;
        self.ndi_cfg.scheduler_profile_id = resolve_ref(
            self.scheduler_profile_id,
            |id| schedulers.get(id).map(|s| s.handles().get(npu)),
            Self::OBJECT_TYPE,
            &self.key,
            "scheduler",
            npu,
        )?;
        Ok(())
    }
}

/// Maps an optional registry reference to the raw hardware id for one NPU.
fn resolve_ref<K: nas_ndi::NdiObjectKind>(
    reference: Option<ObjId>,
    lookup: impl FnOnce(ObjId) -> Option<Option<nas_ndi::NdiObjectId<K>>>,
    object_type: &'static str,
    key: &QueueKey,
    what: &str,
    npu: NpuId,
) -> QosResult<RawNdiObjectId> {
    match reference {
        None => Ok(0),
        Some(id) => match lookup(id) {
            None => Err(QosError::inconsistent(
                object_type,
                format!("{:?}", key),
                format!("{} {} does not exist", what, id),
            )),
            Some(None) => Err(QosError::inconsistent(
                object_type,
                format!("{:?}", key),
                format!("{} {} has no handle on npu {}", what, id, npu),
            )),
            Some(Some(handle)) => Ok(handle.as_raw()),
        },
    }
}

impl HasObjId for Queue {
    fn obj_id(&self) -> ObjId {
        self.id
    }
}

impl QosObject for Queue {
    type Attr = QueueAttr;
    type NdiKind = QueueKind;

    const OBJECT_TYPE: &'static str = "queue";

    fn key_string(&self) -> String {
        format!(
            "{}:{}:{}",
            self.key.port_id,
            self.key.queue_type.as_str(),
            self.key.local_queue_id
        )
    }

    fn npu_list(&self) -> &NpuSet {
        &self.npus
    }

    fn dirty(&self) -> &DirtySet<QueueAttr> {
        &self.dirty
    }

    fn dirty_mut(&mut self) -> &mut DirtySet<QueueAttr> {
        &mut self.dirty
    }

    fn handles(&self) -> &HandleMap<QueueKind> {
        &self.handles
    }

    fn handles_mut(&mut self) -> &mut HandleMap<QueueKind> {
        &mut self.handles
    }

    fn push_create(&self, ndi: &dyn QosNdi, npu: NpuId) -> QosResult<QueueNdiId> {
        ndi.create_queue(npu, &self.ndi_cfg)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.key_string(), npu, e))
    }

    fn push_leaf_attr(&self, ndi: &dyn QosNdi, attr: QueueAttr, npu: NpuId) -> QosResult<()> {
        let handle = self.handles.get(npu).ok_or_else(|| {
            QosError::inconsistent(
                Self::OBJECT_TYPE,
                self.key_string(),
                format!("no hardware handle for npu {}", npu),
            )
        })?;
        ndi.set_queue_attr(npu, handle, attr, &self.ndi_cfg)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.key_string(), npu, e))
    }

    fn push_delete(&self, ndi: &dyn QosNdi, npu: NpuId) -> QosResult<()> {
        let handle = self.handles.get(npu).ok_or_else(|| {
            QosError::inconsistent(
                Self::OBJECT_TYPE,
                self.key_string(),
                format!("no hardware handle for npu {}", npu),
            )
        })?;
        ndi.delete_queue(npu, handle)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.key_string(), npu, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ordering_is_port_primary() {
        let a = QueueKey {
            port_id: 1,
            local_queue_id: 7,
            queue_type: QueueType::Multicast,
        };
        let b = QueueKey {
            port_id: 2,
            local_queue_id: 0,
            queue_type: QueueType::Unicast,
        };
        assert!(a < b);
        assert!(QueueKey::port_floor(1) <= a);
    }

    #[test]
    fn test_attach_detach() {
        let key = QueueKey {
            port_id: 1,
            local_queue_id: 0,
            queue_type: QueueType::Unicast,
        };
        let mut queue = Queue::new(key, 0x0001_0000_0000_0001, NdiPort { npu: 0, port: 1 });
        assert!(!queue.is_attached());
        queue.attach(7);
        assert_eq!(queue.parent_id(), Some(7));
        queue.detach();
        assert!(!queue.is_attached());
    }
}
