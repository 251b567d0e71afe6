//! Buffer pool/profile transaction handler.

use std::sync::{Arc, Mutex};

use log::warn;
use nas_ndi::SwitchId;

use super::types::{BufferPool, BufferPoolReq, BufferProfile, BufferProfileReq};
use crate::audit::{AuditCategory, AuditRecord};
use crate::audit_log;
use crate::base::{commit_create, commit_delete, commit_modify, ObjId, OrchStats, Snapshot};
use crate::error::{QosError, QosResult};
use crate::switch::QosContext;

/// Previous-state record for buffer pool writes.
pub type BufferPoolSnapshot = Snapshot<ObjId, BufferPool>;
/// Previous-state record for buffer profile writes.
pub type BufferProfileSnapshot = Snapshot<ObjId, BufferProfile>;

/// Serialized transactions for buffer pools and the profiles carved out of
/// them. Two separate table locks: pool and profile operations of
/// different kinds may run concurrently, but profile operations take the
/// profile lock before the pool lock when they need both.
pub struct BufferOrch {
    ctx: Arc<QosContext>,
    stats: Mutex<OrchStats>,
}

impl BufferOrch {
    pub fn new(ctx: Arc<QosContext>) -> Self {
        Self {
            ctx,
            stats: Mutex::new(OrchStats::default()),
        }
    }

    pub fn stats(&self) -> OrchStats {
        *self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn count(&self, update: impl FnOnce(&mut OrchStats)) {
        update(&mut self.stats.lock().unwrap_or_else(|e| e.into_inner()));
    }

    fn audit(
        &self,
        category: AuditCategory,
        object_type: &str,
        action: &str,
        key: impl ToString,
        err: Option<&QosError>,
    ) {
        let mut record = AuditRecord::new(category, "BufferOrch", action)
            .with_object_type(object_type)
            .with_object_id(key.to_string());
        if let Some(err) = err {
            record = record.with_error(err);
        }
        audit_log!(record);
    }

    // ------------------------------------------------------------------
    // Buffer pools
    // ------------------------------------------------------------------

    pub fn create_pool(&self, switch_id: SwitchId, req: &BufferPoolReq) -> QosResult<ObjId> {
        let result = self.do_create_pool(switch_id, req);
        match &result {
            Ok(id) => {
                self.count(|s| s.created += 1);
                self.audit(AuditCategory::ResourceCreate, "buffer-pool", "create", id, None);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                self.audit(AuditCategory::ResourceCreate, "buffer-pool", "create", "-", Some(err));
            }
        }
        result
    }

    fn do_create_pool(&self, switch_id: SwitchId, req: &BufferPoolReq) -> QosResult<ObjId> {
        req.pool_type
            .ok_or_else(|| QosError::missing_attribute("buffer-pool", "pool-type"))?;
        let size = req
            .size
            .ok_or_else(|| QosError::missing_attribute("buffer-pool", "size"))?;
        if size == 0 {
            return Err(QosError::attribute_value(
                "buffer-pool",
                "size",
                "pool size must be non-zero",
            ));
        }

        let switch = self.ctx.get_switch(switch_id)?;
        let mut pools = switch.buffer_pools();

        let id = pools.alloc_id()?;
        let mut pool = BufferPool::new(id, switch.npus().clone());
        pool.apply(req);

        if let Err(err) = commit_create(&mut pool, self.ctx.ndi()) {
            pools.release_id(id);
            return Err(err);
        }
        pools.insert(id, pool)?;
        Ok(id)
    }

    pub fn modify_pool(
        &self,
        switch_id: SwitchId,
        id: ObjId,
        req: &BufferPoolReq,
    ) -> QosResult<BufferPoolSnapshot> {
        let result = self.do_modify_pool(switch_id, id, req);
        match &result {
            Ok(_) => {
                self.count(|s| s.modified += 1);
                self.audit(AuditCategory::ResourceModify, "buffer-pool", "modify", id, None);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                self.audit(AuditCategory::ResourceModify, "buffer-pool", "modify", id, Some(err));
            }
        }
        result
    }

    fn do_modify_pool(
        &self,
        switch_id: SwitchId,
        id: ObjId,
        req: &BufferPoolReq,
    ) -> QosResult<BufferPoolSnapshot> {
        let switch = self.ctx.get_switch(switch_id)?;
        let mut pools = switch.buffer_pools();

        let current = pools
            .get(id)
            .ok_or_else(|| QosError::not_found("buffer-pool", id))?;
        let previous = current.clone();

        let mut scratch = current.clone();
        scratch.apply(req);
        commit_modify(&mut scratch, self.ctx.ndi())?;

        if let Some(stored) = pools.get_mut(id) {
            *stored = scratch;
        }
        Ok(Snapshot::Modified { previous })
    }

    pub fn delete_pool(&self, switch_id: SwitchId, id: ObjId) -> QosResult<BufferPoolSnapshot> {
        let result = self.do_delete_pool(switch_id, id);
        match &result {
            Ok(_) => {
                self.count(|s| s.deleted += 1);
                self.audit(AuditCategory::ResourceDelete, "buffer-pool", "delete", id, None);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                self.audit(AuditCategory::ResourceDelete, "buffer-pool", "delete", id, Some(err));
            }
        }
        result
    }

    fn do_delete_pool(&self, switch_id: SwitchId, id: ObjId) -> QosResult<BufferPoolSnapshot> {
        let switch = self.ctx.get_switch(switch_id)?;

        // profiles lock first, then pools (same order as profile commits)
        {
            let profiles = switch.buffer_profiles();
            if profiles.values().any(|p| p.pool_id() == Some(id)) {
                return Err(QosError::inconsistent(
                    "buffer-pool",
                    id,
                    "still referenced by a buffer profile",
                ));
            }
        }

        let mut pools = switch.buffer_pools();
        let pool = pools
            .get(id)
            .ok_or_else(|| QosError::not_found("buffer-pool", id))?;
        commit_delete(pool, self.ctx.ndi())?;

        let previous = pools
            .remove(id)
            .ok_or_else(|| QosError::not_found("buffer-pool", id))?;
        Ok(Snapshot::Deleted { previous })
    }

    pub fn get_pool(&self, switch_id: SwitchId, id: ObjId) -> QosResult<BufferPool> {
        let switch = self.ctx.get_switch(switch_id)?;
        let pools = switch.buffer_pools();
        pools
            .get(id)
            .cloned()
            .ok_or_else(|| QosError::not_found("buffer-pool", id))
    }

    pub fn rollback_pool(&self, switch_id: SwitchId, snapshot: BufferPoolSnapshot) -> QosResult<()> {
        let result = self.do_rollback_pool(switch_id, snapshot);
        match &result {
            Ok(()) => {
                self.count(|s| s.rollbacks += 1);
                self.audit(AuditCategory::Rollback, "buffer-pool", "rollback", "-", None);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                self.audit(AuditCategory::Rollback, "buffer-pool", "rollback", "-", Some(err));
            }
        }
        result
    }

    fn do_rollback_pool(&self, switch_id: SwitchId, snapshot: BufferPoolSnapshot) -> QosResult<()> {
        match snapshot {
            Snapshot::Created { key } => match self.do_delete_pool(switch_id, key) {
                Ok(_) => Ok(()),
                Err(QosError::KeyNotFound { .. }) => {
                    warn!("buffer-pool {}: rollback of create found no entry", key);
                    Ok(())
                }
                Err(err) => Err(err),
            },
            Snapshot::Modified { previous } => {
                let switch = self.ctx.get_switch(switch_id)?;
                let mut pools = switch.buffer_pools();
                let id = previous.id();
                if pools.get(id).is_none() {
                    return Err(QosError::not_found("buffer-pool", id));
                }
                let mut scratch = previous;
                scratch.mark_all_dirty();
                commit_modify(&mut scratch, self.ctx.ndi())?;
                if let Some(stored) = pools.get_mut(id) {
                    *stored = scratch;
                }
                Ok(())
            }
            Snapshot::Deleted { previous } => {
                let switch = self.ctx.get_switch(switch_id)?;
                let mut pools = switch.buffer_pools();
                let id = previous.id();
                pools.reserve_id(id)?;
                let mut pool = previous;
                if let Err(err) = commit_create(&mut pool, self.ctx.ndi()) {
                    pools.release_id(id);
                    return Err(err);
                }
                if let Err(err) = pools.insert(id, pool) {
                    pools.release_id(id);
                    return Err(err);
                }
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Buffer profiles
    // ------------------------------------------------------------------

    pub fn create_profile(&self, switch_id: SwitchId, req: &BufferProfileReq) -> QosResult<ObjId> {
        let result = self.do_create_profile(switch_id, req);
        match &result {
            Ok(id) => {
                self.count(|s| s.created += 1);
                self.audit(AuditCategory::ResourceCreate, "buffer-profile", "create", id, None);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                self.audit(AuditCategory::ResourceCreate, "buffer-profile", "create", "-", Some(err));
            }
        }
        result
    }

    fn do_create_profile(&self, switch_id: SwitchId, req: &BufferProfileReq) -> QosResult<ObjId> {
        if req.pool_id.is_none() {
            return Err(QosError::missing_attribute("buffer-profile", "pool-id"));
        }

        let switch = self.ctx.get_switch(switch_id)?;
        let mut profiles = switch.buffer_profiles();

        let id = profiles.alloc_id()?;
        let mut profile = BufferProfile::new(id, switch.npus().clone());
        profile.apply(req);
        {
            let pools = switch.buffer_pools();
            if let Err(err) = profile.resolve(&pools) {
                profiles.release_id(id);
                return Err(err);
            }
        }

        if let Err(err) = commit_create(&mut profile, self.ctx.ndi()) {
            profiles.release_id(id);
            return Err(err);
        }
        profiles.insert(id, profile)?;
        Ok(id)
    }

    pub fn modify_profile(
        &self,
        switch_id: SwitchId,
        id: ObjId,
        req: &BufferProfileReq,
    ) -> QosResult<BufferProfileSnapshot> {
        let result = self.do_modify_profile(switch_id, id, req);
        match &result {
            Ok(_) => {
                self.count(|s| s.modified += 1);
                self.audit(AuditCategory::ResourceModify, "buffer-profile", "modify", id, None);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                self.audit(AuditCategory::ResourceModify, "buffer-profile", "modify", id, Some(err));
            }
        }
        result
    }

    fn do_modify_profile(
        &self,
        switch_id: SwitchId,
        id: ObjId,
        req: &BufferProfileReq,
    ) -> QosResult<BufferProfileSnapshot> {
        let switch = self.ctx.get_switch(switch_id)?;
        let mut profiles = switch.buffer_profiles();

        let current = profiles
            .get(id)
            .ok_or_else(|| QosError::not_found("buffer-profile", id))?;
        let previous = current.clone();

        let mut scratch = current.clone();
        scratch.apply(req);
        {
            let pools = switch.buffer_pools();
            scratch.resolve(&pools)?;
        }
        commit_modify(&mut scratch, self.ctx.ndi())?;

        if let Some(stored) = profiles.get_mut(id) {
            *stored = scratch;
        }
        Ok(Snapshot::Modified { previous })
    }

    pub fn delete_profile(&self, switch_id: SwitchId, id: ObjId) -> QosResult<BufferProfileSnapshot> {
        let result = self.do_delete_profile(switch_id, id);
        match &result {
            Ok(_) => {
                self.count(|s| s.deleted += 1);
                self.audit(AuditCategory::ResourceDelete, "buffer-profile", "delete", id, None);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                self.audit(AuditCategory::ResourceDelete, "buffer-profile", "delete", id, Some(err));
            }
        }
        result
    }

    fn do_delete_profile(&self, switch_id: SwitchId, id: ObjId) -> QosResult<BufferProfileSnapshot> {
        let switch = self.ctx.get_switch(switch_id)?;

        {
            let queues = switch.queues();
            if queues.values().any(|q| q.buffer_profile_id() == Some(id)) {
                return Err(QosError::inconsistent(
                    "buffer-profile",
                    id,
                    "still referenced by a queue",
                ));
            }
        }
        {
            let pgs = switch.priority_groups();
            if pgs.values().any(|pg| pg.buffer_profile_id() == Some(id)) {
                return Err(QosError::inconsistent(
                    "buffer-profile",
                    id,
                    "still referenced by a priority group",
                ));
            }
        }

        let mut profiles = switch.buffer_profiles();
        let profile = profiles
            .get(id)
            .ok_or_else(|| QosError::not_found("buffer-profile", id))?;
        commit_delete(profile, self.ctx.ndi())?;

        let previous = profiles
            .remove(id)
            .ok_or_else(|| QosError::not_found("buffer-profile", id))?;
        Ok(Snapshot::Deleted { previous })
    }

    pub fn get_profile(&self, switch_id: SwitchId, id: ObjId) -> QosResult<BufferProfile> {
        let switch = self.ctx.get_switch(switch_id)?;
        let profiles = switch.buffer_profiles();
        profiles
            .get(id)
            .cloned()
            .ok_or_else(|| QosError::not_found("buffer-profile", id))
    }

    pub fn rollback_profile(
        &self,
        switch_id: SwitchId,
        snapshot: BufferProfileSnapshot,
    ) -> QosResult<()> {
        let result = self.do_rollback_profile(switch_id, snapshot);
        match &result {
            Ok(()) => {
                self.count(|s| s.rollbacks += 1);
                self.audit(AuditCategory::Rollback, "buffer-profile", "rollback", "-", None);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                self.audit(AuditCategory::Rollback, "buffer-profile", "rollback", "-", Some(err));
            }
        }
        result
    }

    fn do_rollback_profile(
        &self,
        switch_id: SwitchId,
        snapshot: BufferProfileSnapshot,
    ) -> QosResult<()> {
        match snapshot {
            Snapshot::Created { key } => match self.do_delete_profile(switch_id, key) {
                Ok(_) => Ok(()),
                Err(QosError::KeyNotFound { .. }) => {
                    warn!("buffer-profile {}: rollback of create found no entry", key);
                    Ok(())
                }
                Err(err) => Err(err),
            },
            Snapshot::Modified { previous } => {
                let switch = self.ctx.get_switch(switch_id)?;
                let mut profiles = switch.buffer_profiles();
                let id = previous.id();
                if profiles.get(id).is_none() {
                    return Err(QosError::not_found("buffer-profile", id));
                }
                let mut scratch = previous;
                scratch.mark_all_dirty();
                {
                    let pools = switch.buffer_pools();
                    scratch.resolve(&pools)?;
                }
                commit_modify(&mut scratch, self.ctx.ndi())?;
                if let Some(stored) = profiles.get_mut(id) {
                    *stored = scratch;
                }
                Ok(())
            }
            Snapshot::Deleted { previous } => {
                let switch = self.ctx.get_switch(switch_id)?;
                let mut profiles = switch.buffer_profiles();
                let id = previous.id();
                profiles.reserve_id(id)?;
                let mut profile = previous;
                {
                    let pools = switch.buffer_pools();
                    if let Err(err) = profile.resolve(&pools) {
                        profiles.release_id(id);
                        return Err(err);
                    }
                }
                if let Err(err) = commit_create(&mut profile, self.ctx.ndi()) {
                    profiles.release_id(id);
                    return Err(err);
                }
                if let Err(err) = profiles.insert(id, profile) {
                    profiles.release_id(id);
                    return Err(err);
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_context, SWITCH};
    use nas_ndi::BufferPoolType;

    fn pool_req(size: u64) -> BufferPoolReq {
        BufferPoolReq {
            pool_type: Some(BufferPoolType::Ingress),
            size: Some(size),
            ..BufferPoolReq::default()
        }
    }

    #[test]
    fn test_create_pool_and_get() {
        let (ctx, _mock) = test_context();
        let orch = BufferOrch::new(ctx);

        // fresh id in [1, MAX), requested size visible on read-back
        let id = orch.create_pool(SWITCH, &pool_req(1 << 20)).unwrap();
        assert!(id >= 1 && id < 32);
        let pool = orch.get_pool(SWITCH, id).unwrap();
        assert_eq!(pool.cfg().size, 1 << 20);
    }

    #[test]
    fn test_create_pool_requires_type_and_size() {
        let (ctx, _mock) = test_context();
        let orch = BufferOrch::new(ctx);

        assert!(matches!(
            orch.create_pool(SWITCH, &BufferPoolReq::default()),
            Err(QosError::MissingAttribute { .. })
        ));
        assert!(matches!(
            orch.create_pool(
                SWITCH,
                &BufferPoolReq {
                    pool_type: Some(BufferPoolType::Egress),
                    ..BufferPoolReq::default()
                }
            ),
            Err(QosError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn test_pool_id_exhaustion() {
        let (ctx, _mock) = test_context();
        let orch = BufferOrch::new(ctx);

        for _ in 0..32 {
            orch.create_pool(SWITCH, &pool_req(4096)).unwrap();
        }
        assert!(matches!(
            orch.create_pool(SWITCH, &pool_req(4096)),
            Err(QosError::ResourceExhausted { .. })
        ));
    }

    #[test]
    fn test_profile_requires_existing_pool() {
        let (ctx, mock) = test_context();
        let orch = BufferOrch::new(ctx);

        let err = orch
            .create_profile(
                SWITCH,
                &BufferProfileReq {
                    pool_id: Some(17),
                    buffer_size: Some(9216),
                    ..BufferProfileReq::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, QosError::Inconsistent { .. }));
        assert_eq!(mock.object_count(0), 0);
    }

    #[test]
    fn test_pool_delete_blocked_by_profile() {
        let (ctx, _mock) = test_context();
        let orch = BufferOrch::new(ctx);

        let pool_id = orch.create_pool(SWITCH, &pool_req(1 << 20)).unwrap();
        let profile_id = orch
            .create_profile(
                SWITCH,
                &BufferProfileReq {
                    pool_id: Some(pool_id),
                    buffer_size: Some(9216),
                    ..BufferProfileReq::default()
                },
            )
            .unwrap();

        assert!(matches!(
            orch.delete_pool(SWITCH, pool_id),
            Err(QosError::Inconsistent { .. })
        ));

        orch.delete_profile(SWITCH, profile_id).unwrap();
        orch.delete_pool(SWITCH, pool_id).unwrap();
    }

    #[test]
    fn test_profile_modify_rollback() {
        let (ctx, _mock) = test_context();
        let orch = BufferOrch::new(ctx);

        let pool_id = orch.create_pool(SWITCH, &pool_req(1 << 20)).unwrap();
        let id = orch
            .create_profile(
                SWITCH,
                &BufferProfileReq {
                    pool_id: Some(pool_id),
                    buffer_size: Some(4096),
                    ..BufferProfileReq::default()
                },
            )
            .unwrap();

        let snapshot = orch
            .modify_profile(
                SWITCH,
                id,
                &BufferProfileReq {
                    buffer_size: Some(8192),
                    ..BufferProfileReq::default()
                },
            )
            .unwrap();
        assert_eq!(orch.get_profile(SWITCH, id).unwrap().buffer_size(), 8192);

        orch.rollback_profile(SWITCH, snapshot).unwrap();
        assert_eq!(orch.get_profile(SWITCH, id).unwrap().buffer_size(), 4096);
    }
}
