//! Policer transaction handler.

use std::sync::{Arc, Mutex};

use log::{debug, warn};
use nas_ndi::{PolicerMode, SwitchId};

use super::types::{Policer, PolicerReq};
use crate::audit::{AuditCategory, AuditRecord};
use crate::audit_log;
use crate::base::{commit_create, commit_delete, commit_modify, ObjId, OrchStats, Snapshot};
use crate::error::{QosError, QosResult};
use crate::switch::QosContext;

/// Previous-state record for policer writes.
pub type PolicerSnapshot = Snapshot<ObjId, Policer>;

/// Serialized create/modify/delete/rollback for policers. The per-type
/// table lock inside the registry serializes concurrent requests.
pub struct PolicerOrch {
    ctx: Arc<QosContext>,
    stats: Mutex<OrchStats>,
}

impl PolicerOrch {
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

    fn audit(&self, category: AuditCategory, action: &str, key: impl ToString, err: Option<&QosError>) {
        let mut record = AuditRecord::new(category, "PolicerOrch", action)
            .with_object_type("policer")
            .with_object_id(key.to_string());
        if let Some(err) = err {
            record = record.with_error(err);
        }
        audit_log!(record);
    }

    /// Creates a policer: validate, allocate an id, program every NPU,
    /// register.
    pub fn create(&self, switch_id: SwitchId, req: &PolicerReq) -> QosResult<ObjId> {
        let result = self.do_create(switch_id, req);
        match &result {
            Ok(id) => {
                self.count(|s| s.created += 1);
                self.audit(AuditCategory::ResourceCreate, "create", id, None);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                self.audit(AuditCategory::ResourceCreate, "create", "-", Some(err));
            }
        }
        result
    }

    fn do_create(&self, switch_id: SwitchId, req: &PolicerReq) -> QosResult<ObjId> {
        let meter_type = req
            .meter_type
            .ok_or_else(|| QosError::missing_attribute("policer", "meter-type"))?;
        let mode = req
            .mode
            .ok_or_else(|| QosError::missing_attribute("policer", "mode"))?;
        match mode {
            PolicerMode::TrTcm if req.pir.unwrap_or(0) == 0 => {
                return Err(QosError::missing_attribute("policer", "pir"));
            }
            PolicerMode::StormControl if req.cir.unwrap_or(0) == 0 => {
                return Err(QosError::missing_attribute("policer", "cir"));
            }
            _ => {}
        }
        debug!(
            "switch {}: creating policer ({:?}/{:?})",
            switch_id, meter_type, mode
        );

        let switch = self.ctx.get_switch(switch_id)?;
        let mut policers = switch.policers();

        let id = policers.alloc_id()?;
        let mut policer = Policer::new(id, switch.npus().clone());
        policer.apply(req);

        if let Err(err) = commit_create(&mut policer, self.ctx.ndi()) {
            policers.release_id(id);
            return Err(err);
        }
        policers.insert(id, policer)?;
        Ok(id)
    }

    /// Modifies a policer. The stored copy stays authoritative until every
    /// dirty attribute was pushed; on failure the scratch copy is dropped.
    pub fn modify(
        &self,
        switch_id: SwitchId,
        id: ObjId,
        req: &PolicerReq,
    ) -> QosResult<PolicerSnapshot> {
        let result = self.do_modify(switch_id, id, req);
        match &result {
            Ok(_) => {
                self.count(|s| s.modified += 1);
                self.audit(AuditCategory::ResourceModify, "modify", id, None);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                self.audit(AuditCategory::ResourceModify, "modify", id, Some(err));
            }
        }
        result
    }

    fn do_modify(
        &self,
        switch_id: SwitchId,
        id: ObjId,
        req: &PolicerReq,
    ) -> QosResult<PolicerSnapshot> {
        let switch = self.ctx.get_switch(switch_id)?;
        let mut policers = switch.policers();

        let current = policers
            .get(id)
            .ok_or_else(|| QosError::not_found("policer", id))?;
        let previous = current.clone();

        let mut scratch = current.clone();
        scratch.apply(req);
        commit_modify(&mut scratch, self.ctx.ndi())?;

        if let Some(stored) = policers.get_mut(id) {
            *stored = scratch;
        }
        Ok(Snapshot::Modified { previous })
    }

    /// Deletes a policer: push the delete to every NPU, then erase the
    /// registry entry and release the id.
    pub fn delete(&self, switch_id: SwitchId, id: ObjId) -> QosResult<PolicerSnapshot> {
        let result = self.do_delete(switch_id, id);
        match &result {
            Ok(_) => {
                self.count(|s| s.deleted += 1);
                self.audit(AuditCategory::ResourceDelete, "delete", id, None);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                self.audit(AuditCategory::ResourceDelete, "delete", id, Some(err));
            }
        }
        result
    }

    fn do_delete(&self, switch_id: SwitchId, id: ObjId) -> QosResult<PolicerSnapshot> {
        let switch = self.ctx.get_switch(switch_id)?;

        {
            let ingress = switch.port_ingress();
            if ingress.values().any(|p| p.policer_id == Some(id)) {
                return Err(QosError::inconsistent(
                    "policer",
                    id,
                    "still referenced by a port ingress profile",
                ));
            }
        }

        let mut policers = switch.policers();

        let policer = policers
            .get(id)
            .ok_or_else(|| QosError::not_found("policer", id))?;
        commit_delete(policer, self.ctx.ndi())?;

        let previous = policers
            .remove(id)
            .ok_or_else(|| QosError::not_found("policer", id))?;
        Ok(Snapshot::Deleted { previous })
    }

    /// Reads a policer.
    pub fn get(&self, switch_id: SwitchId, id: ObjId) -> QosResult<Policer> {
        let switch = self.ctx.get_switch(switch_id)?;
        let policers = switch.policers();
        policers
            .get(id)
            .cloned()
            .ok_or_else(|| QosError::not_found("policer", id))
    }

    /// Replays the inverse of a previously-applied write.
    pub fn rollback(&self, switch_id: SwitchId, snapshot: PolicerSnapshot) -> QosResult<()> {
        let result = self.do_rollback(switch_id, snapshot);
        match &result {
            Ok(()) => {
                self.count(|s| s.rollbacks += 1);
                self.audit(AuditCategory::Rollback, "rollback", "-", None);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                self.audit(AuditCategory::Rollback, "rollback", "-", Some(err));
            }
        }
        result
    }

    fn do_rollback(&self, switch_id: SwitchId, snapshot: PolicerSnapshot) -> QosResult<()> {
        match snapshot {
            Snapshot::Created { key } => match self.do_delete(switch_id, key) {
                Ok(_) => Ok(()),
                Err(QosError::KeyNotFound { .. }) => {
                    warn!("policer {}: rollback of create found no entry", key);
                    Ok(())
                }
                Err(err) => Err(err),
            },
            Snapshot::Modified { previous } => {
                let switch = self.ctx.get_switch(switch_id)?;
                let mut policers = switch.policers();
                let id = previous.id();
                if policers.get(id).is_none() {
                    return Err(QosError::not_found("policer", id));
                }
                let mut scratch = previous;
                scratch.mark_all_dirty();
                commit_modify(&mut scratch, self.ctx.ndi())?;
                if let Some(stored) = policers.get_mut(id) {
                    *stored = scratch;
                }
                Ok(())
            }
            Snapshot::Deleted { previous } => {
                let switch = self.ctx.get_switch(switch_id)?;
                let mut policers = switch.policers();
                let id = previous.id();
                policers.reserve_id(id)?;
                let mut policer = previous;
                if let Err(err) = commit_create(&mut policer, self.ctx.ndi()) {
                    policers.release_id(id);
                    return Err(err);
                }
                if let Err(err) = policers.insert(id, policer) {
                    policers.release_id(id);
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
    use nas_ndi::MeterType;

    fn create_req() -> PolicerReq {
        PolicerReq {
            meter_type: Some(MeterType::Bytes),
            mode: Some(PolicerMode::SrTcm),
            cir: Some(1_000_000),
            cbs: Some(65_536),
            ..PolicerReq::default()
        }
    }

    #[test]
    fn test_create_and_get() {
        let (ctx, mock) = test_context();
        let orch = PolicerOrch::new(ctx);

        let id = orch.create(SWITCH, &create_req()).unwrap();
        let policer = orch.get(SWITCH, id).unwrap();
        assert_eq!(policer.cfg().cir, 1_000_000);

        // programmed on both NPUs of the switch
        assert_eq!(mock.object_count(0), 1);
        assert_eq!(mock.object_count(1), 1);
        assert_eq!(orch.stats().created, 1);
    }

    #[test]
    fn test_create_missing_mandatory_attr() {
        let (ctx, mock) = test_context();
        let orch = PolicerOrch::new(ctx);

        let err = orch
            .create(SWITCH, &PolicerReq { meter_type: Some(MeterType::Bytes), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, QosError::MissingAttribute { .. }));
        // rejected before any hardware call
        assert_eq!(mock.object_count(0), 0);
    }

    #[test]
    fn test_create_failure_releases_id_and_unwinds() {
        let (ctx, mock) = test_context();
        let orch = PolicerOrch::new(ctx);

        // first NPU succeeds, second NPU fails
        mock.fail_nth("create_policer", 1, 1);
        let err = orch.create(SWITCH, &create_req()).unwrap_err();
        assert!(matches!(err, QosError::Hardware { npu: 1, .. }));

        // the object programmed on NPU 0 was unwound again
        assert_eq!(mock.object_count(0), 0);
        assert_eq!(mock.object_count(1), 0);

        // the released id is handed out again
        let id = orch.create(SWITCH, &create_req()).unwrap();
        assert_eq!(id, 1);
    }

    #[test]
    fn test_modify_and_rollback() {
        let (ctx, _mock) = test_context();
        let orch = PolicerOrch::new(ctx);

        let id = orch.create(SWITCH, &create_req()).unwrap();
        let snapshot = orch
            .modify(
                SWITCH,
                id,
                &PolicerReq {
                    cir: Some(5_000_000),
                    ..PolicerReq::default()
                },
            )
            .unwrap();
        assert_eq!(orch.get(SWITCH, id).unwrap().cfg().cir, 5_000_000);

        orch.rollback(SWITCH, snapshot).unwrap();
        assert_eq!(orch.get(SWITCH, id).unwrap().cfg().cir, 1_000_000);
    }

    #[test]
    fn test_modify_failure_keeps_previous_state() {
        let (ctx, mock) = test_context();
        let orch = PolicerOrch::new(ctx);

        let id = orch.create(SWITCH, &create_req()).unwrap();
        mock.fail_on("set_policer_attr", 1);

        let err = orch
            .modify(
                SWITCH,
                id,
                &PolicerReq {
                    cir: Some(9_999),
                    ..PolicerReq::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, QosError::Hardware { .. }));
        assert_eq!(orch.get(SWITCH, id).unwrap().cfg().cir, 1_000_000);
    }

    #[test]
    fn test_delete_and_rollback() {
        let (ctx, mock) = test_context();
        let orch = PolicerOrch::new(ctx);

        let id = orch.create(SWITCH, &create_req()).unwrap();
        let snapshot = orch.delete(SWITCH, id).unwrap();
        assert!(matches!(
            orch.get(SWITCH, id),
            Err(QosError::KeyNotFound { .. })
        ));
        assert_eq!(mock.object_count(0), 0);

        // rollback re-creates under the same id
        orch.rollback(SWITCH, snapshot).unwrap();
        let restored = orch.get(SWITCH, id).unwrap();
        assert_eq!(restored.cfg().cir, 1_000_000);
        assert_eq!(mock.object_count(0), 1);
    }

    #[test]
    fn test_modify_unknown_key() {
        let (ctx, _mock) = test_context();
        let orch = PolicerOrch::new(ctx);
        assert!(matches!(
            orch.modify(SWITCH, 77, &PolicerReq::default()),
            Err(QosError::KeyNotFound { .. })
        ));
    }
}
