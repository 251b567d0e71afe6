//! Scheduler profile transaction handler.

use std::sync::{Arc, Mutex};

use log::warn;
use nas_ndi::SwitchId;

use super::types::{validate_cfg, Scheduler, SchedulerReq};
use crate::audit::{AuditCategory, AuditRecord};
use crate::audit_log;
use crate::base::{commit_create, commit_delete, commit_modify, ObjId, OrchStats, Snapshot};
use crate::error::{QosError, QosResult};
use crate::switch::QosContext;

/// Previous-state record for scheduler writes.
pub type SchedulerSnapshot = Snapshot<ObjId, Scheduler>;

/// Serialized create/modify/delete/rollback for scheduler profiles.
pub struct SchedulerOrch {
    ctx: Arc<QosContext>,
    stats: Mutex<OrchStats>,
}

impl SchedulerOrch {
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
        let mut record = AuditRecord::new(category, "SchedulerOrch", action)
            .with_object_type("scheduler")
            .with_object_id(key.to_string());
        if let Some(err) = err {
            record = record.with_error(err);
        }
        audit_log!(record);
    }

    pub fn create(&self, switch_id: SwitchId, req: &SchedulerReq) -> QosResult<ObjId> {
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

    fn do_create(&self, switch_id: SwitchId, req: &SchedulerReq) -> QosResult<ObjId> {
        req.algorithm
            .ok_or_else(|| QosError::missing_attribute("scheduler", "algorithm"))?;

        let switch = self.ctx.get_switch(switch_id)?;
        let mut schedulers = switch.schedulers();

        let id = schedulers.alloc_id()?;
        let mut scheduler = Scheduler::new(id, switch.npus().clone());
        scheduler.apply(req);
        if let Err(err) = validate_cfg(scheduler.cfg()) {
            schedulers.release_id(id);
            return Err(err);
        }

        if let Err(err) = commit_create(&mut scheduler, self.ctx.ndi()) {
            schedulers.release_id(id);
            return Err(err);
        }
        schedulers.insert(id, scheduler)?;
        Ok(id)
    }

    pub fn modify(
        &self,
        switch_id: SwitchId,
        id: ObjId,
        req: &SchedulerReq,
    ) -> QosResult<SchedulerSnapshot> {
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
        req: &SchedulerReq,
    ) -> QosResult<SchedulerSnapshot> {
        let switch = self.ctx.get_switch(switch_id)?;
        let mut schedulers = switch.schedulers();

        let current = schedulers
            .get(id)
            .ok_or_else(|| QosError::not_found("scheduler", id))?;
        let previous = current.clone();

        let mut scratch = current.clone();
        scratch.apply(req);
        validate_cfg(scratch.cfg())?;
        commit_modify(&mut scratch, self.ctx.ndi())?;

        if let Some(stored) = schedulers.get_mut(id) {
            *stored = scratch;
        }
        Ok(Snapshot::Modified { previous })
    }

    pub fn delete(&self, switch_id: SwitchId, id: ObjId) -> QosResult<SchedulerSnapshot> {
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

    fn do_delete(&self, switch_id: SwitchId, id: ObjId) -> QosResult<SchedulerSnapshot> {
        let switch = self.ctx.get_switch(switch_id)?;

        // scheduler profiles are shared; refuse to delete while referenced
        {
            let sched_groups = switch.sched_groups();
            if sched_groups
                .values()
                .any(|sg| sg.scheduler_profile_id() == Some(id))
            {
                return Err(QosError::inconsistent(
                    "scheduler",
                    id,
                    "still referenced by a scheduler group",
                ));
            }
        }
        {
            let queues = switch.queues();
            if queues.values().any(|q| q.scheduler_profile_id() == Some(id)) {
                return Err(QosError::inconsistent(
                    "scheduler",
                    id,
                    "still referenced by a queue",
                ));
            }
        }
        {
            let egress = switch.port_egress();
            if egress.values().any(|p| p.scheduler_profile_id == Some(id)) {
                return Err(QosError::inconsistent(
                    "scheduler",
                    id,
                    "still referenced by a port egress profile",
                ));
            }
        }

        let mut schedulers = switch.schedulers();
        let scheduler = schedulers
            .get(id)
            .ok_or_else(|| QosError::not_found("scheduler", id))?;
        commit_delete(scheduler, self.ctx.ndi())?;

        let previous = schedulers
            .remove(id)
            .ok_or_else(|| QosError::not_found("scheduler", id))?;
        Ok(Snapshot::Deleted { previous })
    }

    pub fn get(&self, switch_id: SwitchId, id: ObjId) -> QosResult<Scheduler> {
        let switch = self.ctx.get_switch(switch_id)?;
        let schedulers = switch.schedulers();
        schedulers
            .get(id)
            .cloned()
            .ok_or_else(|| QosError::not_found("scheduler", id))
    }

    pub fn rollback(&self, switch_id: SwitchId, snapshot: SchedulerSnapshot) -> QosResult<()> {
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

    fn do_rollback(&self, switch_id: SwitchId, snapshot: SchedulerSnapshot) -> QosResult<()> {
        match snapshot {
            Snapshot::Created { key } => match self.do_delete(switch_id, key) {
                Ok(_) => Ok(()),
                Err(QosError::KeyNotFound { .. }) => {
                    warn!("scheduler {}: rollback of create found no entry", key);
                    Ok(())
                }
                Err(err) => Err(err),
            },
            Snapshot::Modified { previous } => {
                let switch = self.ctx.get_switch(switch_id)?;
                let mut schedulers = switch.schedulers();
                let id = previous.id();
                if schedulers.get(id).is_none() {
                    return Err(QosError::not_found("scheduler", id));
                }
                let mut scratch = previous;
                scratch.mark_all_dirty();
                commit_modify(&mut scratch, self.ctx.ndi())?;
                if let Some(stored) = schedulers.get_mut(id) {
                    *stored = scratch;
                }
                Ok(())
            }
            Snapshot::Deleted { previous } => {
                let switch = self.ctx.get_switch(switch_id)?;
                let mut schedulers = switch.schedulers();
                let id = previous.id();
                schedulers.reserve_id(id)?;
                let mut scheduler = previous;
                if let Err(err) = commit_create(&mut scheduler, self.ctx.ndi()) {
                    schedulers.release_id(id);
                    return Err(err);
                }
                if let Err(err) = schedulers.insert(id, scheduler) {
                    schedulers.release_id(id);
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
    use nas_ndi::SchedulerType;

    fn wrr_req(weight: u32) -> SchedulerReq {
        SchedulerReq {
            algorithm: Some(SchedulerType::Wrr),
            weight: Some(weight),
            ..SchedulerReq::default()
        }
    }

    #[test]
    fn test_create_modify_delete() {
        let (ctx, mock) = test_context();
        let orch = SchedulerOrch::new(ctx);

        let id = orch.create(SWITCH, &wrr_req(10)).unwrap();
        assert_eq!(orch.get(SWITCH, id).unwrap().cfg().weight, 10);

        orch.modify(
            SWITCH,
            id,
            &SchedulerReq {
                weight: Some(20),
                ..SchedulerReq::default()
            },
        )
        .unwrap();
        assert_eq!(orch.get(SWITCH, id).unwrap().cfg().weight, 20);

        orch.delete(SWITCH, id).unwrap();
        assert_eq!(mock.object_count(0), 0);
    }

    #[test]
    fn test_create_zero_weight_rejected() {
        let (ctx, _mock) = test_context();
        let orch = SchedulerOrch::new(ctx);
        assert!(matches!(
            orch.create(SWITCH, &wrr_req(0)),
            Err(QosError::AttributeValue { .. })
        ));
    }

    #[test]
    fn test_create_requires_algorithm() {
        let (ctx, _mock) = test_context();
        let orch = SchedulerOrch::new(ctx);
        assert!(matches!(
            orch.create(SWITCH, &SchedulerReq::default()),
            Err(QosError::MissingAttribute { .. })
        ));
    }
}
