//! Policer object type.

use nas_ndi::types::PolicerKind;
use nas_ndi::{
    ColorSource, MeterType, NpuId, PacketAction, PolicerAttr, PolicerCfg, PolicerMode,
    PolicerNdiId, QosNdi,
};

use crate::base::{DirtySet, HandleMap, NpuSet, ObjId, QosObject};
use crate::error::{QosError, QosResult};

/// Attribute set carried by a policer create or modify request. Absent
/// fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct PolicerReq {
    pub meter_type: Option<MeterType>,
    pub mode: Option<PolicerMode>,
    pub color_source: Option<ColorSource>,
    pub cir: Option<u64>,
    pub cbs: Option<u64>,
    pub pir: Option<u64>,
    pub pbs: Option<u64>,
    pub green_action: Option<PacketAction>,
    pub yellow_action: Option<PacketAction>,
    pub red_action: Option<PacketAction>,
}

/// A policer in the switch registry. The embedded [`PolicerCfg`] is pushed
/// to the driver verbatim; there are no cross-object references to resolve.
#[derive(Debug, Clone)]
pub struct Policer {
    id: ObjId,
    npus: NpuSet,
    cfg: PolicerCfg,
    dirty: DirtySet<PolicerAttr>,
    handles: HandleMap<PolicerKind>,
}

impl Policer {
    pub fn new(id: ObjId, npus: NpuSet) -> Self {
        Self {
            id,
            npus,
            cfg: PolicerCfg::default(),
            dirty: DirtySet::new(),
            handles: HandleMap::new(),
        }
    }

    pub fn id(&self) -> ObjId {
        self.id
    }

    pub fn cfg(&self) -> &PolicerCfg {
        &self.cfg
    }

    /// Applies a request's attributes, recording each as dirty.
    pub fn apply(&mut self, req: &PolicerReq) {
        if let Some(v) = req.meter_type {
            self.dirty.mark(PolicerAttr::MeterType);
            self.cfg.meter_type = v;
        }
        if let Some(v) = req.mode {
            self.dirty.mark(PolicerAttr::Mode);
            self.cfg.mode = v;
        }
        if let Some(v) = req.color_source {
            self.dirty.mark(PolicerAttr::ColorSource);
            self.cfg.color_source = v;
        }
        if let Some(v) = req.cir {
            self.dirty.mark(PolicerAttr::Cir);
            self.cfg.cir = v;
        }
        if let Some(v) = req.cbs {
            self.dirty.mark(PolicerAttr::Cbs);
            self.cfg.cbs = v;
        }
        if let Some(v) = req.pir {
            self.dirty.mark(PolicerAttr::Pir);
            self.cfg.pir = v;
        }
        if let Some(v) = req.pbs {
            self.dirty.mark(PolicerAttr::Pbs);
            self.cfg.pbs = v;
        }
        if let Some(v) = req.green_action {
            self.dirty.mark(PolicerAttr::GreenAction);
            self.cfg.green_action = v;
        }
        if let Some(v) = req.yellow_action {
            self.dirty.mark(PolicerAttr::YellowAction);
            self.cfg.yellow_action = v;
        }
        if let Some(v) = req.red_action {
            self.dirty.mark(PolicerAttr::RedAction);
            self.cfg.red_action = v;
        }
    }

    /// Marks every attribute dirty, for full re-push during rollback.
    pub fn mark_all_dirty(&mut self) {
        for attr in [
            PolicerAttr::MeterType,
            PolicerAttr::Mode,
            PolicerAttr::ColorSource,
            PolicerAttr::Cir,
            PolicerAttr::Cbs,
            PolicerAttr::Pir,
            PolicerAttr::Pbs,
            PolicerAttr::GreenAction,
            PolicerAttr::YellowAction,
            PolicerAttr::RedAction,
        ] {
            self.dirty.mark(attr);
        }
    }

    fn handle(&self, npu: NpuId) -> QosResult<PolicerNdiId> {
        self.handles.get(npu).ok_or_else(|| {
            QosError::inconsistent(
                Self::OBJECT_TYPE,
                self.id,
                format!("no hardware handle for npu {}", npu),
            )
        })
    }
}

impl QosObject for Policer {
    type Attr = PolicerAttr;
    type NdiKind = PolicerKind;

    const OBJECT_TYPE: &'static str = "policer";

    fn key_string(&self) -> String {
        self.id.to_string()
    }

    fn npu_list(&self) -> &NpuSet {
        &self.npus
    }

    fn dirty(&self) -> &DirtySet<PolicerAttr> {
        &self.dirty
    }

    fn dirty_mut(&mut self) -> &mut DirtySet<PolicerAttr> {
        &mut self.dirty
    }

    fn handles(&self) -> &HandleMap<PolicerKind> {
        &self.handles
    }

    fn handles_mut(&mut self) -> &mut HandleMap<PolicerKind> {
        &mut self.handles
    }

    fn push_create(&self, ndi: &dyn QosNdi, npu: NpuId) -> QosResult<PolicerNdiId> {
        ndi.create_policer(npu, &self.cfg)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.id, npu, e))
    }

    fn push_leaf_attr(&self, ndi: &dyn QosNdi, attr: PolicerAttr, npu: NpuId) -> QosResult<()> {
        let handle = self.handle(npu)?;
        ndi.set_policer_attr(npu, handle, attr, &self.cfg)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.id, npu, e))
    }

    fn push_delete(&self, ndi: &dyn QosNdi, npu: NpuId) -> QosResult<()> {
        let handle = self.handle(npu)?;
        ndi.delete_policer(npu, handle)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.id, npu, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_marks_dirty() {
        let mut policer = Policer::new(1, NpuSet::single(0));
        assert!(policer.dirty().is_empty());

        policer.apply(&PolicerReq {
            cir: Some(1_000_000),
            ..PolicerReq::default()
        });

        assert!(policer.dirty().contains(PolicerAttr::Cir));
        assert!(!policer.dirty().contains(PolicerAttr::Pir));
        assert_eq!(policer.cfg().cir, 1_000_000);
    }
}
