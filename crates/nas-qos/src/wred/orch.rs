//! WRED transaction handler.

use std::sync::{Arc, Mutex};

use log::warn;
use nas_ndi::SwitchId;

use super::types::{validate_cfg, WredProfile, WredReq};
use crate::audit::{AuditCategory, AuditRecord};
use crate::audit_log;
use crate::base::{commit_create, commit_delete, commit_modify, ObjId, OrchStats, Snapshot};
use crate::error::{QosError, QosResult};
use crate::switch::QosContext;

/// Previous-state record for WRED writes.
pub type WredSnapshot = Snapshot<ObjId, WredProfile>;

/// Serialized create/modify/delete/rollback for WRED profiles.
pub struct WredOrch {
    ctx: Arc<QosContext>,
    stats: Mutex<OrchStats>,
}

impl WredOrch {
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
        let mut record = AuditRecord::new(category, "WredOrch", action)
            .with_object_type("wred")
            .with_object_id(key.to_string());
        if let Some(err) = err {
            record = record.with_error(err);
        }
        audit_log!(record);
    }

    pub fn create(&self, switch_id: SwitchId, req: &WredReq) -> QosResult<ObjId> {
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

    fn do_create(&self, switch_id: SwitchId, req: &WredReq) -> QosResult<ObjId> {
        let switch = self.ctx.get_switch(switch_id)?;
        let mut wreds = switch.wreds();

        let id = wreds.alloc_id()?;
        let mut profile = WredProfile::new(id, switch.npus().clone());
        profile.apply(req);
        if let Err(err) = validate_cfg(profile.cfg()) {
            wreds.release_id(id);
            return Err(err);
        }

        if let Err(err) = commit_create(&mut profile, self.ctx.ndi()) {
            wreds.release_id(id);
            return Err(err);
        }
        wreds.insert(id, profile)?;
        Ok(id)
    }

    pub fn modify(&self, switch_id: SwitchId, id: ObjId, req: &WredReq) -> QosResult<WredSnapshot> {
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

    fn do_modify(&self, switch_id: SwitchId, id: ObjId, req: &WredReq) -> QosResult<WredSnapshot> {
        let switch = self.ctx.get_switch(switch_id)?;
        let mut wreds = switch.wreds();

        let current = wreds
            .get(id)
            .ok_or_else(|| QosError::not_found("wred", id))?;
        let previous = current.clone();

        let mut scratch = current.clone();
        scratch.apply(req);
        validate_cfg(scratch.cfg())?;
        commit_modify(&mut scratch, self.ctx.ndi())?;

        if let Some(stored) = wreds.get_mut(id) {
            *stored = scratch;
        }
        Ok(Snapshot::Modified { previous })
    }

    pub fn delete(&self, switch_id: SwitchId, id: ObjId) -> QosResult<WredSnapshot> {
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

    fn do_delete(&self, switch_id: SwitchId, id: ObjId) -> QosResult<WredSnapshot> {
        let switch = self.ctx.get_switch(switch_id)?;

        // a WRED profile referenced by any queue must stay
        {
            let queues = switch.queues();
            if queues.values().any(|q| q.wred_id() == Some(id)) {
                return Err(QosError::inconsistent(
                    "wred",
                    id,
                    "still referenced by a queue",
                ));
            }
        }

        let mut wreds = switch.wreds();
        let profile = wreds
            .get(id)
            .ok_or_else(|| QosError::not_found("wred", id))?;
        commit_delete(profile, self.ctx.ndi())?;

        let previous = wreds
            .remove(id)
            .ok_or_else(|| QosError::not_found("wred", id))?;
        Ok(Snapshot::Deleted { previous })
    }

    pub fn get(&self, switch_id: SwitchId, id: ObjId) -> QosResult<WredProfile> {
        let switch = self.ctx.get_switch(switch_id)?;
        let wreds = switch.wreds();
        wreds
            .get(id)
            .cloned()
            .ok_or_else(|| QosError::not_found("wred", id))
    }

    pub fn rollback(&self, switch_id: SwitchId, snapshot: WredSnapshot) -> QosResult<()> {
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

    fn do_rollback(&self, switch_id: SwitchId, snapshot: WredSnapshot) -> QosResult<()> {
        match snapshot {
            Snapshot::Created { key } => match self.do_delete(switch_id, key) {
                Ok(_) => Ok(()),
                Err(QosError::KeyNotFound { .. }) => {
                    warn!("wred {}: rollback of create found no entry", key);
                    Ok(())
                }
                Err(err) => Err(err),
            },
            Snapshot::Modified { previous } => {
                let switch = self.ctx.get_switch(switch_id)?;
                let mut wreds = switch.wreds();
                let id = previous.id();
                if wreds.get(id).is_none() {
                    return Err(QosError::not_found("wred", id));
                }
                let mut scratch = previous;
                scratch.mark_all_dirty();
                commit_modify(&mut scratch, self.ctx.ndi())?;
                if let Some(stored) = wreds.get_mut(id) {
                    *stored = scratch;
                }
                Ok(())
            }
            Snapshot::Deleted { previous } => {
                let switch = self.ctx.get_switch(switch_id)?;
                let mut wreds = switch.wreds();
                let id = previous.id();
                wreds.reserve_id(id)?;
                let mut profile = previous;
                if let Err(err) = commit_create(&mut profile, self.ctx.ndi()) {
                    wreds.release_id(id);
                    return Err(err);
                }
                if let Err(err) = wreds.insert(id, profile) {
                    wreds.release_id(id);
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

    fn green_req(min: u32, max: u32) -> WredReq {
        WredReq {
            green_enable: Some(true),
            green_min_threshold: Some(min),
            green_max_threshold: Some(max),
            ..WredReq::default()
        }
    }

    #[test]
    fn test_create_and_get() {
        let (ctx, _mock) = test_context();
        let orch = WredOrch::new(ctx);

        let id = orch.create(SWITCH, &green_req(1000, 2000)).unwrap();
        let profile = orch.get(SWITCH, id).unwrap();
        assert_eq!(profile.cfg().green_min_threshold, Some(1000));
    }

    #[test]
    fn test_create_bad_thresholds_rejected_before_hardware() {
        let (ctx, mock) = test_context();
        let orch = WredOrch::new(ctx);

        let err = orch.create(SWITCH, &green_req(2000, 1000)).unwrap_err();
        assert!(matches!(err, QosError::AttributeValue { .. }));
        assert_eq!(mock.object_count(0), 0);

        // released id is reused
        let id = orch.create(SWITCH, &green_req(1000, 2000)).unwrap();
        assert_eq!(id, 1);
    }

    #[test]
    fn test_modify_validates_merged_cfg() {
        let (ctx, _mock) = test_context();
        let orch = WredOrch::new(ctx);

        let id = orch.create(SWITCH, &green_req(1000, 2000)).unwrap();
        // merged result would have min 3000 > max 2000
        let err = orch
            .modify(
                SWITCH,
                id,
                &WredReq {
                    green_min_threshold: Some(3000),
                    ..WredReq::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, QosError::AttributeValue { .. }));
        assert_eq!(
            orch.get(SWITCH, id).unwrap().cfg().green_min_threshold,
            Some(1000)
        );
    }
}
