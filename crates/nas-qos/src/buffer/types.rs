//! Buffer pool and buffer profile object types.

use nas_ndi::types::{BufferPoolKind, BufferProfileKind};
use nas_ndi::{
    BufferPoolAttr, BufferPoolCfg, BufferPoolNdiId, BufferPoolType, BufferProfileAttr,
    BufferProfileCfg, BufferProfileNdiId, NpuId, QosNdi, ThresholdMode,
};

use crate::base::{DirtySet, HandleMap, NpuSet, ObjId, QosObject};
use crate::error::{QosError, QosResult};
use crate::switch::IdTable;

/// Attribute set carried by a buffer pool create or modify request.
#[derive(Debug, Clone, Default)]
pub struct BufferPoolReq {
    pub pool_type: Option<BufferPoolType>,
    pub size: Option<u64>,
    pub threshold_mode: Option<ThresholdMode>,
}

/// A buffer pool in the switch registry.
#[derive(Debug, Clone)]
pub struct BufferPool {
    id: ObjId,
    npus: NpuSet,
    cfg: BufferPoolCfg,
    dirty: DirtySet<BufferPoolAttr>,
    handles: HandleMap<BufferPoolKind>,
}

impl BufferPool {
    pub fn new(id: ObjId, npus: NpuSet) -> Self {
        Self {
            id,
            npus,
            cfg: BufferPoolCfg::default(),
            dirty: DirtySet::new(),
            handles: HandleMap::new(),
        }
    }

    pub fn id(&self) -> ObjId {
        self.id
    }

    pub fn cfg(&self) -> &BufferPoolCfg {
        &self.cfg
    }

    pub fn apply(&mut self, req: &BufferPoolReq) {
        if let Some(v) = req.pool_type {
            self.dirty.mark(BufferPoolAttr::PoolType);
            self.cfg.pool_type = v;
        }
        if let Some(v) = req.size {
            self.dirty.mark(BufferPoolAttr::Size);
            self.cfg.size = v;
        }
        if let Some(v) = req.threshold_mode {
            self.dirty.mark(BufferPoolAttr::ThresholdMode);
            self.cfg.threshold_mode = v;
        }
    }

    pub fn mark_all_dirty(&mut self) {
        for attr in [
            BufferPoolAttr::PoolType,
            BufferPoolAttr::Size,
            BufferPoolAttr::ThresholdMode,
        ] {
            self.dirty.mark(attr);
        }
    }

    fn handle(&self, npu: NpuId) -> QosResult<BufferPoolNdiId> {
        self.handles.get(npu).ok_or_else(|| {
            QosError::inconsistent(
                Self::OBJECT_TYPE,
                self.id,
                format!("no hardware handle for npu {}", npu),
            )
        })
    }
}

impl QosObject for BufferPool {
    type Attr = BufferPoolAttr;
    type NdiKind = BufferPoolKind;

    const OBJECT_TYPE: &'static str = "buffer-pool";

    fn key_string(&self) -> String {
        self.id.to_string()
    }

    fn npu_list(&self) -> &NpuSet {
        &self.npus
    }

    fn dirty(&self) -> &DirtySet<BufferPoolAttr> {
        &self.dirty
    }

    fn dirty_mut(&mut self) -> &mut DirtySet<BufferPoolAttr> {
        &mut self.dirty
    }

    fn handles(&self) -> &HandleMap<BufferPoolKind> {
        &self.handles
    }

    fn handles_mut(&mut self) -> &mut HandleMap<BufferPoolKind> {
        &mut self.handles
    }

    fn push_create(&self, ndi: &dyn QosNdi, npu: NpuId) -> QosResult<BufferPoolNdiId> {
        ndi.create_buffer_pool(npu, &self.cfg)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.id, npu, e))
    }

    fn push_leaf_attr(&self, ndi: &dyn QosNdi, attr: BufferPoolAttr, npu: NpuId) -> QosResult<()> {
        let handle = self.handle(npu)?;
        ndi.set_buffer_pool_attr(npu, handle, attr, &self.cfg)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.id, npu, e))
    }

    fn push_delete(&self, ndi: &dyn QosNdi, npu: NpuId) -> QosResult<()> {
        let handle = self.handle(npu)?;
        ndi.delete_buffer_pool(npu, handle)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.id, npu, e))
    }
}

/// Attribute set carried by a buffer profile create or modify request.
#[derive(Debug, Clone, Default)]
pub struct BufferProfileReq {
    pub pool_id: Option<ObjId>,
    pub buffer_size: Option<u64>,
    pub shared_dynamic_th: Option<u8>,
    pub shared_static_th: Option<u64>,
    pub xoff_th: Option<u64>,
    pub xon_th: Option<u64>,
}

/// A buffer profile in the switch registry.
///
/// References its pool by registry id; the per-NPU pool handles are copied
/// in by [`resolve`](Self::resolve) before each commit so the driver sees
/// the right hardware id on every NPU.
#[derive(Debug, Clone)]
pub struct BufferProfile {
    id: ObjId,
    npus: NpuSet,
    pool_id: Option<ObjId>,
    buffer_size: u64,
    shared_dynamic_th: Option<u8>,
    shared_static_th: Option<u64>,
    xoff_th: u64,
    xon_th: u64,
    pool_handles: HandleMap<BufferPoolKind>,
    dirty: DirtySet<BufferProfileAttr>,
    handles: HandleMap<BufferProfileKind>,
}

impl BufferProfile {
    pub fn new(id: ObjId, npus: NpuSet) -> Self {
        Self {
            id,
            npus,
            pool_id: None,
            buffer_size: 0,
            shared_dynamic_th: None,
            shared_static_th: None,
            xoff_th: 0,
            xon_th: 0,
            pool_handles: HandleMap::new(),
            dirty: DirtySet::new(),
            handles: HandleMap::new(),
        }
    }

    pub fn id(&self) -> ObjId {
        self.id
    }

    pub fn pool_id(&self) -> Option<ObjId> {
        self.pool_id
    }

    pub fn buffer_size(&self) -> u64 {
        self.buffer_size
    }

    pub fn apply(&mut self, req: &BufferProfileReq) {
        if let Some(v) = req.pool_id {
            self.dirty.mark(BufferProfileAttr::PoolId);
            self.pool_id = Some(v);
        }
        if let Some(v) = req.buffer_size {
            self.dirty.mark(BufferProfileAttr::BufferSize);
            self.buffer_size = v;
        }
        if let Some(v) = req.shared_dynamic_th {
            self.dirty.mark(BufferProfileAttr::SharedDynamicTh);
            self.shared_dynamic_th = Some(v);
        }
        if let Some(v) = req.shared_static_th {
            self.dirty.mark(BufferProfileAttr::SharedStaticTh);
            self.shared_static_th = Some(v);
        }
        if let Some(v) = req.xoff_th {
            self.dirty.mark(BufferProfileAttr::XoffTh);
            self.xoff_th = v;
        }
        if let Some(v) = req.xon_th {
            self.dirty.mark(BufferProfileAttr::XonTh);
            self.xon_th = v;
        }
    }

    pub fn mark_all_dirty(&mut self) {
        for attr in [
            BufferProfileAttr::PoolId,
            BufferProfileAttr::BufferSize,
            BufferProfileAttr::SharedDynamicTh,
            BufferProfileAttr::SharedStaticTh,
            BufferProfileAttr::XoffTh,
            BufferProfileAttr::XonTh,
        ] {
            self.dirty.mark(attr);
        }
    }

    /// Validates cross-field and cross-object consistency and caches the
    /// referenced pool's per-NPU handles.
    pub fn resolve(&mut self, pools: &IdTable<BufferPool>) -> QosResult<()> {
        if self.shared_dynamic_th.is_some() && self.shared_static_th.is_some() {
            return Err(QosError::inconsistent(
                Self::OBJECT_TYPE,
                self.id,
                "dynamic and static shared thresholds are mutually exclusive",
            ));
        }
        match self.pool_id {
            Some(pool_id) => {
                let pool = pools.get(pool_id).ok_or_else(|| {
                    QosError::inconsistent(
                        Self::OBJECT_TYPE,
                        self.id,
                        format!("buffer pool {} does not exist", pool_id),
                    )
                })?;
                self.pool_handles = pool.handles().clone();
            }
            None => self.pool_handles = HandleMap::new(),
        }
        Ok(())
    }

    fn ndi_cfg(&self, npu: NpuId) -> QosResult<BufferProfileCfg> {
        let pool_raw = match self.pool_id {
            Some(_) => self
                .pool_handles
                .get(npu)
                .ok_or_else(|| {
                    QosError::inconsistent(
                        Self::OBJECT_TYPE,
                        self.id,
                        format!("buffer pool has no handle on npu {}", npu),
                    )
                })?
                .as_raw(),
            None => 0,
        };
        Ok(BufferProfileCfg {
            pool_id: pool_raw,
            buffer_size: self.buffer_size,
            shared_dynamic_th: self.shared_dynamic_th,
            shared_static_th: self.shared_static_th,
            xoff_th: self.xoff_th,
            xon_th: self.xon_th,
        })
    }

    fn handle(&self, npu: NpuId) -> QosResult<BufferProfileNdiId> {
        self.handles.get(npu).ok_or_else(|| {
            QosError::inconsistent(
                Self::OBJECT_TYPE,
                self.id,
                format!("no hardware handle for npu {}", npu),
            )
        })
    }
}

impl QosObject for BufferProfile {
    type Attr = BufferProfileAttr;
    type NdiKind = BufferProfileKind;

    const OBJECT_TYPE: &'static str = "buffer-profile";

    fn key_string(&self) -> String {
        self.id.to_string()
    }

    fn npu_list(&self) -> &NpuSet {
        &self.npus
    }

    fn dirty(&self) -> &DirtySet<BufferProfileAttr> {
        &self.dirty
    }

    fn dirty_mut(&mut self) -> &mut DirtySet<BufferProfileAttr> {
        &mut self.dirty
    }

    fn handles(&self) -> &HandleMap<BufferProfileKind> {
        &self.handles
    }

    fn handles_mut(&mut self) -> &mut HandleMap<BufferProfileKind> {
        &mut self.handles
    }

    fn push_create(&self, ndi: &dyn QosNdi, npu: NpuId) -> QosResult<BufferProfileNdiId> {
        let cfg = self.ndi_cfg(npu)?;
        ndi.create_buffer_profile(npu, &cfg)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.id, npu, e))
    }

    fn push_leaf_attr(&self, ndi: &dyn QosNdi, attr: BufferProfileAttr, npu: NpuId) -> QosResult<()> {
        let handle = self.handle(npu)?;
        let cfg = self.ndi_cfg(npu)?;
        ndi.set_buffer_profile_attr(npu, handle, attr, &cfg)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.id, npu, e))
    }

    fn push_delete(&self, ndi: &dyn QosNdi, npu: NpuId) -> QosResult<()> {
        let handle = self.handle(npu)?;
        ndi.delete_buffer_profile(npu, handle)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.id, npu, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_threshold_modes_exclusive() {
        let mut profile = BufferProfile::new(1, NpuSet::single(0));
        profile.apply(&BufferProfileReq {
            shared_dynamic_th: Some(3),
            shared_static_th: Some(4096),
            ..BufferProfileReq::default()
        });

        let pools: IdTable<BufferPool> = IdTable::new("buffer-pool", 32);
        assert!(matches!(
            profile.resolve(&pools),
            Err(QosError::Inconsistent { .. })
        ));
    }

    #[test]
    fn test_profile_missing_pool() {
        let mut profile = BufferProfile::new(1, NpuSet::single(0));
        profile.apply(&BufferProfileReq {
            pool_id: Some(9),
            ..BufferProfileReq::default()
        });

        let pools: IdTable<BufferPool> = IdTable::new("buffer-pool", 32);
        assert!(matches!(
            profile.resolve(&pools),
            Err(QosError::Inconsistent { .. })
        ));
    }
}
