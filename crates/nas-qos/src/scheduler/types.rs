//! Scheduler profile object type.

use nas_ndi::types::SchedulerKind;
use nas_ndi::{MeterType, NpuId, QosNdi, SchedulerAttr, SchedulerCfg, SchedulerNdiId, SchedulerType};

use crate::base::{DirtySet, HandleMap, NpuSet, ObjId, QosObject};
use crate::error::{QosError, QosResult};

/// Attribute set carried by a scheduler create or modify request.
#[derive(Debug, Clone, Default)]
pub struct SchedulerReq {
    pub algorithm: Option<SchedulerType>,
    pub weight: Option<u32>,
    pub meter_type: Option<MeterType>,
    pub min_rate: Option<u64>,
    pub min_burst: Option<u64>,
    pub max_rate: Option<u64>,
    pub max_burst: Option<u64>,
}

/// Validates cross-field consistency of a scheduler configuration.
pub(crate) fn validate_cfg(cfg: &SchedulerCfg) -> QosResult<()> {
    if cfg.algorithm != SchedulerType::Strict && cfg.weight == 0 {
        return Err(QosError::attribute_value(
            "scheduler",
            "weight",
            "round-robin weight must be non-zero",
        ));
    }
    if cfg.max_rate != 0 && cfg.min_rate > cfg.max_rate {
        return Err(QosError::attribute_value(
            "scheduler",
            "min-rate",
            format!("min rate {} exceeds max rate {}", cfg.min_rate, cfg.max_rate),
        ));
    }
    Ok(())
}

/// A scheduler profile in the switch registry. Referenced by queues,
/// scheduler groups and port egress profiles.
#[derive(Debug, Clone)]
pub struct Scheduler {
    id: ObjId,
    npus: NpuSet,
    cfg: SchedulerCfg,
    dirty: DirtySet<SchedulerAttr>,
    handles: HandleMap<SchedulerKind>,
}

impl Scheduler {
    pub fn new(id: ObjId, npus: NpuSet) -> Self {
        Self {
            id,
            npus,
            cfg: SchedulerCfg::default(),
            dirty: DirtySet::new(),
            handles: HandleMap::new(),
        }
    }

    pub fn id(&self) -> ObjId {
        self.id
    }

    pub fn cfg(&self) -> &SchedulerCfg {
        &self.cfg
    }

    /// Applies a request's attributes, recording each as dirty.
    pub fn apply(&mut self, req: &SchedulerReq) {
        if let Some(v) = req.algorithm {
            self.dirty.mark(SchedulerAttr::Algorithm);
            self.cfg.algorithm = v;
        }
        if let Some(v) = req.weight {
            self.dirty.mark(SchedulerAttr::Weight);
            self.cfg.weight = v;
        }
        if let Some(v) = req.meter_type {
            self.dirty.mark(SchedulerAttr::MeterType);
            self.cfg.meter_type = v;
        }
        if let Some(v) = req.min_rate {
            self.dirty.mark(SchedulerAttr::MinRate);
            self.cfg.min_rate = v;
        }
        if let Some(v) = req.min_burst {
            self.dirty.mark(SchedulerAttr::MinBurst);
            self.cfg.min_burst = v;
        }
        if let Some(v) = req.max_rate {
            self.dirty.mark(SchedulerAttr::MaxRate);
            self.cfg.max_rate = v;
        }
        if let Some(v) = req.max_burst {
            self.dirty.mark(SchedulerAttr::MaxBurst);
            self.cfg.max_burst = v;
        }
    }

    /// Marks every attribute dirty, for full re-push during rollback.
    pub fn mark_all_dirty(&mut self) {
        for attr in [
            SchedulerAttr::Algorithm,
            SchedulerAttr::Weight,
            SchedulerAttr::MeterType,
            SchedulerAttr::MinRate,
            SchedulerAttr::MinBurst,
            SchedulerAttr::MaxRate,
            SchedulerAttr::MaxBurst,
        ] {
            self.dirty.mark(attr);
        }
    }

    fn handle(&self, npu: NpuId) -> QosResult<SchedulerNdiId> {
        self.handles.get(npu).ok_or_else(|| {
            QosError::inconsistent(
                Self::OBJECT_TYPE,
                self.id,
                format!("no hardware handle for npu {}", npu),
            )
        })
    }
}

impl QosObject for Scheduler {
    type Attr = SchedulerAttr;
    type NdiKind = SchedulerKind;

    const OBJECT_TYPE: &'static str = "scheduler";

    fn key_string(&self) -> String {
        self.id.to_string()
    }

    fn npu_list(&self) -> &NpuSet {
        &self.npus
    }

    fn dirty(&self) -> &DirtySet<SchedulerAttr> {
        &self.dirty
    }

    fn dirty_mut(&mut self) -> &mut DirtySet<SchedulerAttr> {
        &mut self.dirty
    }

    fn handles(&self) -> &HandleMap<SchedulerKind> {
        &self.handles
    }

    fn handles_mut(&mut self) -> &mut HandleMap<SchedulerKind> {
        &mut self.handles
    }

    fn push_create(&self, ndi: &dyn QosNdi, npu: NpuId) -> QosResult<SchedulerNdiId> {
        ndi.create_scheduler(npu, &self.cfg)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.id, npu, e))
    }

    fn push_leaf_attr(&self, ndi: &dyn QosNdi, attr: SchedulerAttr, npu: NpuId) -> QosResult<()> {
        let handle = self.handle(npu)?;
        ndi.set_scheduler_attr(npu, handle, attr, &self.cfg)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.id, npu, e))
    }

    fn push_delete(&self, ndi: &dyn QosNdi, npu: NpuId) -> QosResult<()> {
        let handle = self.handle(npu)?;
        ndi.delete_scheduler(npu, handle)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.id, npu, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_weight() {
        let cfg = SchedulerCfg {
            algorithm: SchedulerType::Wrr,
            weight: 0,
            ..SchedulerCfg::default()
        };
        assert!(validate_cfg(&cfg).is_err());

        let strict = SchedulerCfg {
            algorithm: SchedulerType::Strict,
            weight: 0,
            ..SchedulerCfg::default()
        };
        validate_cfg(&strict).unwrap();
    }
}
