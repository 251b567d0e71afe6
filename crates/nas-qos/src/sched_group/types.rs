//! Scheduler-group node type.
//!
//! Scheduler groups form the per-port scheduling tree. A node at level 0
//! hangs off the port and is always attached; deeper nodes are attached
//! once a parent's child-list edit adopts them. The child list is the one
//! non-leaf attribute in the QoS model — the hierarchy engine owns it, and
//! a node's parent pointer is a derived cache the engine keeps in sync.

use nas_ndi::types::SchedGroupKind;
use nas_ndi::{
    IfIndex, NdiPort, NpuId, QosNdi, RawNdiObjectId, SchedGroupAttr, SchedGroupNdiCfg,
    SchedGroupNdiId,
};

use crate::base::{DirtySet, HandleMap, NpuSet, ObjId, QosObject};
use crate::error::{QosError, QosResult};
use crate::scheduler::Scheduler;
use crate::switch::IdTable;

/// Attribute set carried by a scheduler-group create or modify request.
///
/// There is deliberately no parent field: a node is attached and detached
/// only through its parent's `child_list`, never by naming a parent
/// directly.
#[derive(Debug, Clone, Default)]
pub struct SchedGroupReq {
    /// Create-only.
    pub port_id: Option<IfIndex>,
    /// Create-only.
    pub level: Option<u32>,
    pub scheduler_profile_id: Option<ObjId>,
    pub child_list: Option<Vec<ObjId>>,
}

/// A scheduler-group node in the switch registry.
#[derive(Debug, Clone)]
pub struct SchedGroup {
    id: ObjId,
    port_id: IfIndex,
    ndi_port: NdiPort,
    level: u32,
    max_levels: u32,
    /// Hardware fan-out ceiling, read once after create; 0 = not yet known.
    max_child: u32,
    parent_id: Option<ObjId>,
    scheduler_profile_id: Option<ObjId>,
    child_list: Vec<ObjId>,
    ndi_scheduler_profile: RawNdiObjectId,
    npus: NpuSet,
    dirty: DirtySet<SchedGroupAttr>,
    handles: HandleMap<SchedGroupKind>,
}

impl SchedGroup {
    pub fn new(id: ObjId, port_id: IfIndex, ndi_port: NdiPort, level: u32, max_levels: u32) -> Self {
        Self {
            id,
            port_id,
            ndi_port,
            level,
            max_levels,
            max_child: 0,
            parent_id: None,
            scheduler_profile_id: None,
            child_list: Vec::new(),
            ndi_scheduler_profile: 0,
            npus: NpuSet::single(ndi_port.npu),
            dirty: DirtySet::new(),
            handles: HandleMap::new(),
        }
    }

    pub fn id(&self) -> ObjId {
        self.id
    }

    pub fn port_id(&self) -> IfIndex {
        self.port_id
    }

    pub fn ndi_port(&self) -> NdiPort {
        self.ndi_port
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn parent_id(&self) -> Option<ObjId> {
        self.parent_id
    }

    /// A root (level 0) is attached by definition; anything deeper is
    /// attached iff a parent has adopted it.
    pub fn is_attached(&self) -> bool {
        self.level == 0 || self.parent_id.is_some()
    }

    /// Whether this node's children are queues (leaf level next) rather
    /// than further scheduler groups.
    pub fn next_level_is_queue(&self) -> bool {
        self.level >= self.max_levels.saturating_sub(2)
    }

    pub fn max_child(&self) -> u32 {
        self.max_child
    }

    pub fn scheduler_profile_id(&self) -> Option<ObjId> {
        self.scheduler_profile_id
    }

    pub fn child_list(&self) -> &[ObjId] {
        &self.child_list
    }

    pub fn child_count(&self) -> usize {
        self.child_list.len()
    }

    /// Hardware handle on the owning NPU, if programmed.
    pub fn ndi_id(&self) -> Option<SchedGroupNdiId> {
        self.handles.get(self.ndi_port.npu)
    }

    pub(crate) fn set_max_child(&mut self, max_child: u32) {
        self.max_child = max_child;
    }

    /// Parent pointer maintenance; only the hierarchy engine calls these.
    pub(crate) fn set_parent(&mut self, parent: ObjId) {
        self.parent_id = Some(parent);
    }

    pub(crate) fn clear_parent(&mut self) {
        self.parent_id = None;
    }

    /// In-memory child list replacement after a successful hardware edit.
    pub(crate) fn set_child_list(&mut self, children: Vec<ObjId>) {
        self.child_list = children;
    }

    /// Applies the leaf attributes of a request. The child list is not
    /// touched here; the hierarchy engine applies it.
    pub fn apply(&mut self, req: &SchedGroupReq) {
        if let Some(v) = req.scheduler_profile_id {
            self.dirty.mark(SchedGroupAttr::SchedulerProfileId);
            self.scheduler_profile_id = Some(v);
        }
    }

    /// Marks every leaf attribute dirty, for full re-push during rollback.
    pub fn mark_all_dirty(&mut self) {
        self.dirty.mark(SchedGroupAttr::SchedulerProfileId);
    }

    /// Validates the referenced scheduler profile and caches its hardware
    /// id for this node's NPU.
    pub(crate) fn resolve(&mut self, schedulers: &IdTable<Scheduler>) -> QosResult<()> {
        let npu = self.ndi_port.npu;
        self.ndi_scheduler_profile = match self.scheduler_profile_id {
            None => 0,
            Some(id) => {
                let scheduler = schedulers.get(id).ok_or_else(|| {
                    QosError::inconsistent(
                        Self::OBJECT_TYPE,
                        self.id,
                        format!("scheduler {} does not exist", id),
                    )
                })?;
                scheduler
                    .handles()
                    .get(npu)
                    .map(|h| h.as_raw())
                    .ok_or_else(|| {
                        QosError::inconsistent(
                            Self::OBJECT_TYPE,
                            self.id,
                            format!("scheduler {} has no handle on npu {}", id, npu),
                        )
                    })?
            }
        };
        Ok(())
    }

    fn ndi_cfg(&self) -> SchedGroupNdiCfg {
        SchedGroupNdiCfg {
            port: self.ndi_port,
            level: self.level,
            scheduler_profile_id: self.ndi_scheduler_profile,
        }
    }

    fn handle(&self, npu: NpuId) -> QosResult<SchedGroupNdiId> {
        self.handles.get(npu).ok_or_else(|| {
            QosError::inconsistent(
                Self::OBJECT_TYPE,
                self.id,
                format!("no hardware handle for npu {}", npu),
            )
        })
    }
}

impl QosObject for SchedGroup {
    type Attr = SchedGroupAttr;
    type NdiKind = SchedGroupKind;

    const OBJECT_TYPE: &'static str = "sched-group";

    fn key_string(&self) -> String {
        self.id.to_string()
    }

    fn npu_list(&self) -> &NpuSet {
        &self.npus
    }

    fn dirty(&self) -> &DirtySet<SchedGroupAttr> {
        &self.dirty
    }

    fn dirty_mut(&mut self) -> &mut DirtySet<SchedGroupAttr> {
        &mut self.dirty
    }

    fn handles(&self) -> &HandleMap<SchedGroupKind> {
        &self.handles
    }

    fn handles_mut(&mut self) -> &mut HandleMap<SchedGroupKind> {
        &mut self.handles
    }

    fn is_leaf_attr(&self, attr: SchedGroupAttr) -> bool {
        attr != SchedGroupAttr::ChildList
    }

    fn push_create(&self, ndi: &dyn QosNdi, npu: NpuId) -> QosResult<SchedGroupNdiId> {
        ndi.create_sched_group(npu, &self.ndi_cfg())
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.id, npu, e))
    }

    fn push_leaf_attr(&self, ndi: &dyn QosNdi, attr: SchedGroupAttr, npu: NpuId) -> QosResult<()> {
        let handle = self.handle(npu)?;
        ndi.set_sched_group_attr(npu, handle, attr, &self.ndi_cfg())
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.id, npu, e))
    }

    fn push_delete(&self, ndi: &dyn QosNdi, npu: NpuId) -> QosResult<()> {
        let handle = self.handle(npu)?;
        ndi.delete_sched_group(npu, handle)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.id, npu, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(level: u32) -> SchedGroup {
        SchedGroup::new(
            0x0002_0000_0000_0001,
            1,
            NdiPort { npu: 0, port: 1 },
            level,
            4,
        )
    }

    #[test]
    fn test_attach_predicate() {
        let root = node(0);
        assert!(root.is_attached());

        let mut mid = node(1);
        assert!(!mid.is_attached());
        mid.set_parent(7);
        assert!(mid.is_attached());
        mid.clear_parent();
        assert!(!mid.is_attached());
    }

    #[test]
    fn test_next_level_is_queue() {
        // 4 levels: nodes at level >= 2 parent queues
        assert!(!node(0).next_level_is_queue());
        assert!(!node(1).next_level_is_queue());
        assert!(node(2).next_level_is_queue());
        assert!(node(3).next_level_is_queue());
    }

    #[test]
    fn test_child_list_is_non_leaf() {
        let sg = node(0);
        assert!(!sg.is_leaf_attr(SchedGroupAttr::ChildList));
        assert!(sg.is_leaf_attr(SchedGroupAttr::SchedulerProfileId));
    }
}
