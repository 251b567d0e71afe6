//! WRED profile object type.

use nas_ndi::types::WredKind;
use nas_ndi::{NpuId, QosNdi, WredAttr, WredCfg, WredNdiId};

use crate::base::{DirtySet, HandleMap, NpuSet, ObjId, QosObject};
use crate::error::{QosError, QosResult};

/// Attribute set carried by a WRED create or modify request.
#[derive(Debug, Clone, Default)]
pub struct WredReq {
    pub green_enable: Option<bool>,
    pub green_min_threshold: Option<u32>,
    pub green_max_threshold: Option<u32>,
    pub green_drop_probability: Option<u8>,
    pub yellow_enable: Option<bool>,
    pub yellow_min_threshold: Option<u32>,
    pub yellow_max_threshold: Option<u32>,
    pub yellow_drop_probability: Option<u8>,
    pub red_enable: Option<bool>,
    pub red_min_threshold: Option<u32>,
    pub red_max_threshold: Option<u32>,
    pub red_drop_probability: Option<u8>,
    pub weight: Option<u8>,
    pub ecn_enable: Option<bool>,
}

/// Validates cross-field consistency of a WRED configuration.
pub(crate) fn validate_cfg(cfg: &WredCfg) -> QosResult<()> {
    for (color, min, max) in [
        ("green", cfg.green_min_threshold, cfg.green_max_threshold),
        ("yellow", cfg.yellow_min_threshold, cfg.yellow_max_threshold),
        ("red", cfg.red_min_threshold, cfg.red_max_threshold),
    ] {
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(QosError::attribute_value(
                    "wred",
                    "min-threshold",
                    format!("{} min {} exceeds max {}", color, min, max),
                ));
            }
        }
    }
    for (attr, prob) in [
        ("green-drop-probability", cfg.green_drop_probability),
        ("yellow-drop-probability", cfg.yellow_drop_probability),
        ("red-drop-probability", cfg.red_drop_probability),
    ] {
        if let Some(prob) = prob {
            if prob > 100 {
                return Err(QosError::attribute_value(
                    "wred",
                    attr,
                    format!("{} is not a percentage", prob),
                ));
            }
        }
    }
    Ok(())
}

/// A WRED profile in the switch registry.
#[derive(Debug, Clone)]
pub struct WredProfile {
    id: ObjId,
    npus: NpuSet,
    cfg: WredCfg,
    dirty: DirtySet<WredAttr>,
    handles: HandleMap<WredKind>,
}

impl WredProfile {
    pub fn new(id: ObjId, npus: NpuSet) -> Self {
        Self {
            id,
            npus,
            cfg: WredCfg::default(),
            dirty: DirtySet::new(),
            handles: HandleMap::new(),
        }
    }

    pub fn id(&self) -> ObjId {
        self.id
    }

    pub fn cfg(&self) -> &WredCfg {
        &self.cfg
    }

    /// Applies a request's attributes, recording each as dirty.
    pub fn apply(&mut self, req: &WredReq) {
        macro_rules! apply_field {
            ($field:ident, $attr:ident) => {
                if let Some(v) = req.$field {
                    self.dirty.mark(WredAttr::$attr);
                    self.cfg.$field = v;
                }
            };
            ($field:ident, $attr:ident, opt) => {
                if let Some(v) = req.$field {
                    self.dirty.mark(WredAttr::$attr);
                    self.cfg.$field = Some(v);
                }
            };
        }
        apply_field!(green_enable, GreenEnable);
        apply_field!(green_min_threshold, GreenMinThreshold, opt);
        apply_field!(green_max_threshold, GreenMaxThreshold, opt);
        apply_field!(green_drop_probability, GreenDropProbability, opt);
        apply_field!(yellow_enable, YellowEnable);
        apply_field!(yellow_min_threshold, YellowMinThreshold, opt);
        apply_field!(yellow_max_threshold, YellowMaxThreshold, opt);
        apply_field!(yellow_drop_probability, YellowDropProbability, opt);
        apply_field!(red_enable, RedEnable);
        apply_field!(red_min_threshold, RedMinThreshold, opt);
        apply_field!(red_max_threshold, RedMaxThreshold, opt);
        apply_field!(red_drop_probability, RedDropProbability, opt);
        apply_field!(weight, Weight);
        apply_field!(ecn_enable, EcnEnable);
    }

    /// Marks every attribute dirty, for full re-push during rollback.
    pub fn mark_all_dirty(&mut self) {
        for attr in [
            WredAttr::GreenEnable,
            WredAttr::GreenMinThreshold,
            WredAttr::GreenMaxThreshold,
            WredAttr::GreenDropProbability,
            WredAttr::YellowEnable,
            WredAttr::YellowMinThreshold,
            WredAttr::YellowMaxThreshold,
            WredAttr::YellowDropProbability,
            WredAttr::RedEnable,
            WredAttr::RedMinThreshold,
            WredAttr::RedMaxThreshold,
            WredAttr::RedDropProbability,
            WredAttr::Weight,
            WredAttr::EcnEnable,
        ] {
            self.dirty.mark(attr);
        }
    }

    fn handle(&self, npu: NpuId) -> QosResult<WredNdiId> {
        self.handles.get(npu).ok_or_else(|| {
            QosError::inconsistent(
                Self::OBJECT_TYPE,
                self.id,
                format!("no hardware handle for npu {}", npu),
            )
        })
    }
}

impl QosObject for WredProfile {
    type Attr = WredAttr;
    type NdiKind = WredKind;

    const OBJECT_TYPE: &'static str = "wred";

    fn key_string(&self) -> String {
        self.id.to_string()
    }

    fn npu_list(&self) -> &NpuSet {
        &self.npus
    }

    fn dirty(&self) -> &DirtySet<WredAttr> {
        &self.dirty
    }

    fn dirty_mut(&mut self) -> &mut DirtySet<WredAttr> {
        &mut self.dirty
    }

    fn handles(&self) -> &HandleMap<WredKind> {
        &self.handles
    }

    fn handles_mut(&mut self) -> &mut HandleMap<WredKind> {
        &mut self.handles
    }

    fn push_create(&self, ndi: &dyn QosNdi, npu: NpuId) -> QosResult<WredNdiId> {
        ndi.create_wred(npu, &self.cfg)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.id, npu, e))
    }

    fn push_leaf_attr(&self, ndi: &dyn QosNdi, attr: WredAttr, npu: NpuId) -> QosResult<()> {
        let handle = self.handle(npu)?;
        ndi.set_wred_attr(npu, handle, attr, &self.cfg)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.id, npu, e))
    }

    fn push_delete(&self, ndi: &dyn QosNdi, npu: NpuId) -> QosResult<()> {
        let handle = self.handle(npu)?;
        ndi.delete_wred(npu, handle)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.id, npu, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_thresholds() {
        let mut cfg = WredCfg {
            green_enable: true,
            green_min_threshold: Some(2000),
            green_max_threshold: Some(1000),
            ..WredCfg::default()
        };
        assert!(matches!(
            validate_cfg(&cfg),
            Err(QosError::AttributeValue { .. })
        ));

        cfg.green_min_threshold = Some(1000);
        cfg.green_max_threshold = Some(1000);
        validate_cfg(&cfg).unwrap();
    }

    #[test]
    fn test_validate_drop_probability() {
        let cfg = WredCfg {
            red_drop_probability: Some(101),
            ..WredCfg::default()
        };
        assert!(validate_cfg(&cfg).is_err());
    }
}
