//! Priority-group object type.
//!
//! Priority groups exist on the NPU from boot; the registry materializes
//! them through per-port discovery and only their buffer profile binding is
//! configurable. Create and delete are not supported operations.

use nas_ndi::types::PriorityGroupKind;
use nas_ndi::{
    IfIndex, NdiPort, NpuId, PriorityGroupAttr, PriorityGroupNdiCfg, PriorityGroupNdiId, QosNdi,
};

use crate::base::{DirtySet, HandleMap, NpuSet, ObjId, QosObject};
use crate::buffer::BufferProfile;
use crate::error::{QosError, QosResult};
use crate::switch::{HasObjId, IdTable, PortKeyed};

/// Priority-group key: port-primary for per-port range scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PgKey {
    pub port_id: IfIndex,
    pub local_id: u8,
}

impl PortKeyed for PgKey {
    fn port(&self) -> IfIndex {
        self.port_id
    }

    fn port_floor(port: IfIndex) -> Self {
        Self {
            port_id: port,
            local_id: 0,
        }
    }
}

/// Attribute set carried by a priority-group modify request.
#[derive(Debug, Clone, Default)]
pub struct PriorityGroupReq {
    pub buffer_profile_id: Option<ObjId>,
}

/// A priority group in the switch registry.
#[derive(Debug, Clone)]
pub struct PriorityGroup {
    key: PgKey,
    id: ObjId,
    ndi_port: NdiPort,
    buffer_profile_id: Option<ObjId>,
    ndi_cfg: PriorityGroupNdiCfg,
    npus: NpuSet,
    dirty: DirtySet<PriorityGroupAttr>,
    handles: HandleMap<PriorityGroupKind>,
}

impl PriorityGroup {
    /// Materializes a priority group discovered on hardware.
    pub fn discovered(key: PgKey, id: ObjId, ndi_port: NdiPort, handle: PriorityGroupNdiId) -> Self {
        let mut handles = HandleMap::new();
        handles.insert(ndi_port.npu, handle);
        Self {
            key,
            id,
            ndi_port,
            buffer_profile_id: None,
            ndi_cfg: PriorityGroupNdiCfg::default(),
            npus: NpuSet::single(ndi_port.npu),
            dirty: DirtySet::new(),
            handles,
        }
    }

    pub fn key(&self) -> PgKey {
        self.key
    }

    pub fn buffer_profile_id(&self) -> Option<ObjId> {
        self.buffer_profile_id
    }

    pub fn ndi_id(&self) -> Option<PriorityGroupNdiId> {
        self.handles.get(self.ndi_port.npu)
    }

    pub fn apply(&mut self, req: &PriorityGroupReq) {
        if let Some(v) = req.buffer_profile_id {
            self.dirty.mark(PriorityGroupAttr::BufferProfileId);
            self.buffer_profile_id = Some(v);
        }
    }

    pub fn mark_all_dirty(&mut self) {
        self.dirty.mark(PriorityGroupAttr::BufferProfileId);
    }

    /// Validates the referenced buffer profile and caches its hardware id.
    pub(crate) fn resolve(&mut self, buffer_profiles: &IdTable<BufferProfile>) -> QosResult<()> {
        let npu = self.ndi_port.npu;
        self.ndi_cfg.buffer_profile_id = match self.buffer_profile_id {
            None => 0,
            Some(id) => {
                let profile = buffer_profiles.get(id).ok_or_else(|| {
                    QosError::inconsistent(
                        Self::OBJECT_TYPE,
                        format!("{:?}", self.key),
                        format!("buffer-profile {} does not exist", id),
                    )
                })?;
                profile
                    .handles()
                    .get(npu)
                    .ok_or_else(|| {
                        QosError::inconsistent(
                            Self::OBJECT_TYPE,
                            format!("{:?}", self.key),
                            format!("buffer-profile {} has no handle on npu {}", id, npu),
                        )
                    })?
                    .as_raw()
            }
        };
        Ok(())
    }
}

impl HasObjId for PriorityGroup {
    fn obj_id(&self) -> ObjId {
        self.id
    }
}

impl QosObject for PriorityGroup {
    type Attr = PriorityGroupAttr;
    type NdiKind = PriorityGroupKind;

    const OBJECT_TYPE: &'static str = "priority-group";

    fn key_string(&self) -> String {
        format!("{}:{}", self.key.port_id, self.key.local_id)
    }

    fn npu_list(&self) -> &NpuSet {
        &self.npus
    }

    fn dirty(&self) -> &DirtySet<PriorityGroupAttr> {
        &self.dirty
    }

    fn dirty_mut(&mut self) -> &mut DirtySet<PriorityGroupAttr> {
        &mut self.dirty
    }

    fn handles(&self) -> &HandleMap<PriorityGroupKind> {
        &self.handles
    }

    fn handles_mut(&mut self) -> &mut HandleMap<PriorityGroupKind> {
        &mut self.handles
    }

    fn push_create(&self, _ndi: &dyn QosNdi, _npu: NpuId) -> QosResult<PriorityGroupNdiId> {
        Err(QosError::unsupported(
            Self::OBJECT_TYPE,
            "hardware owns priority-group creation",
        ))
    }

    fn push_leaf_attr(&self, ndi: &dyn QosNdi, attr: PriorityGroupAttr, npu: NpuId) -> QosResult<()> {
        let handle = self.handles.get(npu).ok_or_else(|| {
            QosError::inconsistent(
                Self::OBJECT_TYPE,
                self.key_string(),
                format!("no hardware handle for npu {}", npu),
            )
        })?;
        ndi.set_priority_group_attr(npu, handle, attr, &self.ndi_cfg)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.key_string(), npu, e))
    }

    fn push_delete(&self, _ndi: &dyn QosNdi, _npu: NpuId) -> QosResult<()> {
        Err(QosError::unsupported(
            Self::OBJECT_TYPE,
            "hardware owns priority-group deletion",
        ))
    }
}
