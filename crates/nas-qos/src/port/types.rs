//! Port ingress/egress QoS profile object types.
//!
//! Port profiles carry no hardware object of their own: every attribute is
//! a write against the port itself, so "create" just pushes the attributes
//! present in the request and "delete" erases the registry entry.

use nas_ndi::types::PortKind;
use nas_ndi::{
    IfIndex, NdiPort, NpuId, PortEgressAttr, PortEgressNdiCfg, PortIngressAttr, PortIngressNdiCfg,
    PortNdiId, QosNdi, RawNdiObjectId,
};

use crate::base::{DirtySet, HandleMap, NpuSet, ObjId, QosObject};
use crate::error::{QosError, QosResult};
use crate::map::QosMap;
use crate::policer::Policer;
use crate::scheduler::Scheduler;
use crate::switch::IdTable;

fn resolve_map_ref(
    object_type: &'static str,
    port_id: IfIndex,
    maps: &IdTable<QosMap>,
    reference: Option<ObjId>,
    npu: NpuId,
) -> QosResult<RawNdiObjectId> {
    match reference {
        None => Ok(0),
        Some(id) => {
            let map = maps.get(id).ok_or_else(|| {
                QosError::inconsistent(object_type, port_id, format!("map {} does not exist", id))
            })?;
            map.handles()
                .get(npu)
                .map(|h| h.as_raw())
                .ok_or_else(|| {
                    QosError::inconsistent(
                        object_type,
                        port_id,
                        format!("map {} has no handle on npu {}", id, npu),
                    )
                })
        }
    }
}

/// Attribute set carried by a port ingress profile request.
#[derive(Debug, Clone, Default)]
pub struct PortIngressReq {
    pub default_traffic_class: Option<u8>,
    pub dot1p_to_tc_map: Option<ObjId>,
    pub dscp_to_tc_map: Option<ObjId>,
    pub tc_to_priority_group_map: Option<ObjId>,
    pub policer_id: Option<ObjId>,
    pub per_priority_flow_control: Option<u8>,
}

/// Per-port ingress QoS profile, keyed by ifindex.
#[derive(Debug, Clone)]
pub struct PortIngress {
    port_id: IfIndex,
    ndi_port: NdiPort,
    pub default_traffic_class: u8,
    pub dot1p_to_tc_map: Option<ObjId>,
    pub dscp_to_tc_map: Option<ObjId>,
    pub tc_to_priority_group_map: Option<ObjId>,
    pub policer_id: Option<ObjId>,
    pub per_priority_flow_control: u8,
    ndi_cfg: PortIngressNdiCfg,
    npus: NpuSet,
    dirty: DirtySet<PortIngressAttr>,
    handles: HandleMap<PortKind>,
}

impl PortIngress {
    pub fn new(port_id: IfIndex, ndi_port: NdiPort) -> Self {
        Self {
            port_id,
            ndi_port,
            default_traffic_class: 0,
            dot1p_to_tc_map: None,
            dscp_to_tc_map: None,
            tc_to_priority_group_map: None,
            policer_id: None,
            per_priority_flow_control: 0,
            ndi_cfg: PortIngressNdiCfg::default(),
            npus: NpuSet::single(ndi_port.npu),
            dirty: DirtySet::new(),
            handles: HandleMap::new(),
        }
    }

    pub fn port_id(&self) -> IfIndex {
        self.port_id
    }

    pub fn apply(&mut self, req: &PortIngressReq) {
        if let Some(v) = req.default_traffic_class {
            self.dirty.mark(PortIngressAttr::DefaultTrafficClass);
            self.default_traffic_class = v;
        }
        if let Some(v) = req.dot1p_to_tc_map {
            self.dirty.mark(PortIngressAttr::Dot1pToTcMap);
            self.dot1p_to_tc_map = Some(v);
        }
        if let Some(v) = req.dscp_to_tc_map {
            self.dirty.mark(PortIngressAttr::DscpToTcMap);
            self.dscp_to_tc_map = Some(v);
        }
        if let Some(v) = req.tc_to_priority_group_map {
            self.dirty.mark(PortIngressAttr::TcToPriorityGroupMap);
            self.tc_to_priority_group_map = Some(v);
        }
        if let Some(v) = req.policer_id {
            self.dirty.mark(PortIngressAttr::PolicerId);
            self.policer_id = Some(v);
        }
        if let Some(v) = req.per_priority_flow_control {
            self.dirty.mark(PortIngressAttr::PerPriorityFlowControl);
            self.per_priority_flow_control = v;
        }
    }

    pub fn mark_all_dirty(&mut self) {
        for attr in [
            PortIngressAttr::DefaultTrafficClass,
            PortIngressAttr::Dot1pToTcMap,
            PortIngressAttr::DscpToTcMap,
            PortIngressAttr::TcToPriorityGroupMap,
            PortIngressAttr::PolicerId,
            PortIngressAttr::PerPriorityFlowControl,
        ] {
            self.dirty.mark(attr);
        }
    }

    /// Validates the referenced objects and fills the driver config with
    /// their hardware ids.
    pub(crate) fn resolve(
        &mut self,
        maps: &IdTable<QosMap>,
        policers: &IdTable<Policer>,
    ) -> QosResult<()> {
        let npu = self.ndi_port.npu;
        self.ndi_cfg.default_traffic_class = self.default_traffic_class;
        self.ndi_cfg.per_priority_flow_control = self.per_priority_flow_control;
        self.ndi_cfg.dot1p_to_tc_map =
            resolve_map_ref(Self::OBJECT_TYPE, self.port_id, maps, self.dot1p_to_tc_map, npu)?;
        self.ndi_cfg.dscp_to_tc_map =
            resolve_map_ref(Self::OBJECT_TYPE, self.port_id, maps, self.dscp_to_tc_map, npu)?;
        self.ndi_cfg.tc_to_priority_group_map = resolve_map_ref(
            Self::OBJECT_TYPE,
            self.port_id,
            maps,
            self.tc_to_priority_group_map,
            npu,
        )?;
        self.ndi_cfg.policer_id = match self.policer_id {
            None => 0,
            Some(id) => {
                let policer = policers.get(id).ok_or_else(|| {
                    QosError::inconsistent(
                        Self::OBJECT_TYPE,
                        self.port_id,
                        format!("policer {} does not exist", id),
                    )
                })?;
                policer
                    .handles()
                    .get(npu)
                    .map(|h| h.as_raw())
                    .ok_or_else(|| {
                        QosError::inconsistent(
                            Self::OBJECT_TYPE,
                            self.port_id,
                            format!("policer {} has no handle on npu {}", id, npu),
                        )
                    })?
            }
        };
        Ok(())
    }
}

impl QosObject for PortIngress {
    type Attr = PortIngressAttr;
    type NdiKind = PortKind;

    const OBJECT_TYPE: &'static str = "port-ingress";

    fn key_string(&self) -> String {
        self.port_id.to_string()
    }

    fn npu_list(&self) -> &NpuSet {
        &self.npus
    }

    fn dirty(&self) -> &DirtySet<PortIngressAttr> {
        &self.dirty
    }

    fn dirty_mut(&mut self) -> &mut DirtySet<PortIngressAttr> {
        &mut self.dirty
    }

    fn handles(&self) -> &HandleMap<PortKind> {
        &self.handles
    }

    fn handles_mut(&mut self) -> &mut HandleMap<PortKind> {
        &mut self.handles
    }

    /// No driver object to create: pushes the attributes set so far and
    /// reports the port itself as the handle.
    fn push_create(&self, ndi: &dyn QosNdi, npu: NpuId) -> QosResult<PortNdiId> {
        for attr in self.dirty.iter() {
            ndi.set_port_ingress_attr(self.ndi_port, attr, &self.ndi_cfg)
                .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.port_id, npu, e))?;
        }
        Ok(PortNdiId::from_raw_unchecked(self.ndi_port.port as u64))
    }

    fn push_leaf_attr(&self, ndi: &dyn QosNdi, attr: PortIngressAttr, npu: NpuId) -> QosResult<()> {
        ndi.set_port_ingress_attr(self.ndi_port, attr, &self.ndi_cfg)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.port_id, npu, e))
    }

    /// Nothing to remove on the NPU; the port keeps its last-programmed
    /// attributes.
    fn push_delete(&self, _ndi: &dyn QosNdi, _npu: NpuId) -> QosResult<()> {
        Ok(())
    }
}

/// Attribute set carried by a port egress profile request.
#[derive(Debug, Clone, Default)]
pub struct PortEgressReq {
    pub buffer_limit: Option<u64>,
    pub scheduler_profile_id: Option<ObjId>,
    pub tc_to_queue_map: Option<ObjId>,
    pub tc_to_dot1p_map: Option<ObjId>,
    pub tc_to_dscp_map: Option<ObjId>,
}

/// Per-port egress QoS profile, keyed by ifindex.
#[derive(Debug, Clone)]
pub struct PortEgress {
    port_id: IfIndex,
    ndi_port: NdiPort,
    pub buffer_limit: u64,
    pub scheduler_profile_id: Option<ObjId>,
    pub tc_to_queue_map: Option<ObjId>,
    pub tc_to_dot1p_map: Option<ObjId>,
    pub tc_to_dscp_map: Option<ObjId>,
    ndi_cfg: PortEgressNdiCfg,
    npus: NpuSet,
    dirty: DirtySet<PortEgressAttr>,
    handles: HandleMap<PortKind>,
}

impl PortEgress {
    pub fn new(port_id: IfIndex, ndi_port: NdiPort) -> Self {
        Self {
            port_id,
            ndi_port,
            buffer_limit: 0,
            scheduler_profile_id: None,
            tc_to_queue_map: None,
            tc_to_dot1p_map: None,
            tc_to_dscp_map: None,
            ndi_cfg: PortEgressNdiCfg::default(),
            npus: NpuSet::single(ndi_port.npu),
            dirty: DirtySet::new(),
            handles: HandleMap::new(),
        }
    }

    pub fn port_id(&self) -> IfIndex {
        self.port_id
    }

    pub fn apply(&mut self, req: &PortEgressReq) {
        if let Some(v) = req.buffer_limit {
            self.dirty.mark(PortEgressAttr::BufferLimit);
            self.buffer_limit = v;
        }
        if let Some(v) = req.scheduler_profile_id {
            self.dirty.mark(PortEgressAttr::SchedulerProfileId);
            self.scheduler_profile_id = Some(v);
        }
        if let Some(v) = req.tc_to_queue_map {
            self.dirty.mark(PortEgressAttr::TcToQueueMap);
            self.tc_to_queue_map = Some(v);
        }
        if let Some(v) = req.tc_to_dot1p_map {
            self.dirty.mark(PortEgressAttr::TcToDot1pMap);
            self.tc_to_dot1p_map = Some(v);
        }
        if let Some(v) = req.tc_to_dscp_map {
            self.dirty.mark(PortEgressAttr::TcToDscpMap);
            self.tc_to_dscp_map = Some(v);
        }
    }

    pub fn mark_all_dirty(&mut self) {
        for attr in [
            PortEgressAttr::BufferLimit,
            PortEgressAttr::SchedulerProfileId,
            PortEgressAttr::TcToQueueMap,
            PortEgressAttr::TcToDot1pMap,
            PortEgressAttr::TcToDscpMap,
        ] {
            self.dirty.mark(attr);
        }
    }

    /// Validates the referenced objects and fills the driver config with
    /// their hardware ids.
    pub(crate) fn resolve(
        &mut self,
        maps: &IdTable<QosMap>,
        schedulers: &IdTable<Scheduler>,
    ) -> QosResult<()> {
        let npu = self.ndi_port.npu;
        self.ndi_cfg.buffer_limit = self.buffer_limit;
        self.ndi_cfg.tc_to_queue_map =
            resolve_map_ref(Self::OBJECT_TYPE, self.port_id, maps, self.tc_to_queue_map, npu)?;
        self.ndi_cfg.tc_to_dot1p_map =
            resolve_map_ref(Self::OBJECT_TYPE, self.port_id, maps, self.tc_to_dot1p_map, npu)?;
        self.ndi_cfg.tc_to_dscp_map =
            resolve_map_ref(Self::OBJECT_TYPE, self.port_id, maps, self.tc_to_dscp_map, npu)?;
        self.ndi_cfg.scheduler_profile_id = match self.scheduler_profile_id {
            None => 0,
            Some(id) => {
                let scheduler = schedulers.get(id).ok_or_else(|| {
                    QosError::inconsistent(
                        Self::OBJECT_TYPE,
                        self.port_id,
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
                            self.port_id,
                            format!("scheduler {} has no handle on npu {}", id, npu),
                        )
                    })?
            }
        };
        Ok(())
    }
}

impl QosObject for PortEgress {
    type Attr = PortEgressAttr;
    type NdiKind = PortKind;

    const OBJECT_TYPE: &'static str = "port-egress";

    fn key_string(&self) -> String {
        self.port_id.to_string()
    }

    fn npu_list(&self) -> &NpuSet {
        &self.npus
    }

    fn dirty(&self) -> &DirtySet<PortEgressAttr> {
        &self.dirty
    }

    fn dirty_mut(&mut self) -> &mut DirtySet<PortEgressAttr> {
        &mut self.dirty
    }

    fn handles(&self) -> &HandleMap<PortKind> {
        &self.handles
    }

    fn handles_mut(&mut self) -> &mut HandleMap<PortKind> {
        &mut self.handles
    }

    fn push_create(&self, ndi: &dyn QosNdi, npu: NpuId) -> QosResult<PortNdiId> {
        for attr in self.dirty.iter() {
            ndi.set_port_egress_attr(self.ndi_port, attr, &self.ndi_cfg)
                .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.port_id, npu, e))?;
        }
        Ok(PortNdiId::from_raw_unchecked(self.ndi_port.port as u64))
    }

    fn push_leaf_attr(&self, ndi: &dyn QosNdi, attr: PortEgressAttr, npu: NpuId) -> QosResult<()> {
        ndi.set_port_egress_attr(self.ndi_port, attr, &self.ndi_cfg)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.port_id, npu, e))
    }

    fn push_delete(&self, _ndi: &dyn QosNdi, _npu: NpuId) -> QosResult<()> {
        Ok(())
    }
}
