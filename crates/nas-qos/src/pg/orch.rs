//! Priority-group transaction handler and lazy per-port discovery.

use std::sync::{Arc, Mutex};

use log::debug;
use nas_ndi::{NdiPort, QosNdi};

use super::types::{PgKey, PriorityGroup, PriorityGroupReq};
use crate::audit::{AuditCategory, AuditRecord};
use crate::audit_log;
use crate::base::{commit_modify, ObjId, OrchStats, Snapshot};
use crate::error::{QosError, QosResult};
use crate::switch::{QosContext, QosSwitch};

/// Previous-state record for priority-group writes.
pub type PriorityGroupSnapshot = Snapshot<PgKey, PriorityGroup>;

/// Materializes a port's hardware priority groups in the registry on first
/// touch. Idempotent; returns the number of entries added.
pub fn init_port_priority_groups(
    switch: &QosSwitch,
    ndi: &dyn QosNdi,
    ndi_port: NdiPort,
    port_id: u32,
) -> QosResult<usize> {
    let mut pgs = switch.priority_groups();
    if pgs.port_is_initialized(port_id) {
        return Ok(0);
    }

    let ids = ndi
        .port_priority_group_id_list(ndi_port)
        .map_err(|e| QosError::hardware("priority-group", port_id, ndi_port.npu, e))?;

    let mut added = 0;
    for (local_id, handle) in ids.into_iter().enumerate() {
        let key = PgKey {
            port_id,
            local_id: local_id as u8,
        };
        let id = pgs.alloc_id()?;
        let pg = PriorityGroup::discovered(key, id, ndi_port, handle);
        if let Err(err) = pgs.insert(key, pg) {
            pgs.release_id(id);
            return Err(err);
        }
        added += 1;
    }
    debug!(
        "port {}: materialized {} hardware priority groups (npu {})",
        port_id, added, ndi_port.npu
    );
    Ok(added)
}

/// Serialized modify/read/rollback for priority groups. Create and delete
/// are rejected as unsupported: the hardware owns the PG population.
pub struct PriorityGroupOrch {
    ctx: Arc<QosContext>,
    stats: Mutex<OrchStats>,
}

impl PriorityGroupOrch {
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
        let mut record = AuditRecord::new(category, "PriorityGroupOrch", action)
            .with_object_type("priority-group")
            .with_object_id(key.to_string());
        if let Some(err) = err {
            record = record.with_error(err);
        }
        audit_log!(record);
    }

    fn key_str(key: PgKey) -> String {
        format!("{}:{}", key.port_id, key.local_id)
    }

    /// Pulls a port's hardware priority groups into the registry.
    pub fn init_port(&self, port_id: u32) -> QosResult<usize> {
        let (switch, ndi_port) = self.ctx.switch_for_port(port_id)?;
        init_port_priority_groups(&switch, self.ctx.ndi(), ndi_port, port_id)
    }

    /// Creating priority groups is not an operation this type recognizes.
    pub fn create(&self, _key: PgKey, _req: &PriorityGroupReq) -> QosResult<ObjId> {
        Err(QosError::unsupported(
            "priority-group",
            "create: hardware owns the priority-group population",
        ))
    }

    /// Deleting priority groups is not an operation this type recognizes.
    pub fn delete(&self, _key: PgKey) -> QosResult<PriorityGroupSnapshot> {
        Err(QosError::unsupported(
            "priority-group",
            "delete: hardware owns the priority-group population",
        ))
    }

    pub fn modify(&self, key: PgKey, req: &PriorityGroupReq) -> QosResult<PriorityGroupSnapshot> {
        let result = self.do_modify(key, req);
        match &result {
            Ok(_) => {
                self.count(|s| s.modified += 1);
                self.audit(AuditCategory::ResourceModify, "modify", Self::key_str(key), None);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                self.audit(AuditCategory::ResourceModify, "modify", Self::key_str(key), Some(err));
            }
        }
        result
    }

    fn do_modify(&self, key: PgKey, req: &PriorityGroupReq) -> QosResult<PriorityGroupSnapshot> {
        let (switch, _ndi_port) = self.ctx.switch_for_port(key.port_id)?;
        let mut pgs = switch.priority_groups();

        let current = pgs
            .get(key)
            .ok_or_else(|| QosError::not_found("priority-group", Self::key_str(key)))?;
        let previous = current.clone();

        let mut scratch = current.clone();
        scratch.apply(req);
        {
            let buffer_profiles = switch.buffer_profiles();
            scratch.resolve(&buffer_profiles)?;
        }
        commit_modify(&mut scratch, self.ctx.ndi())?;

        if let Some(stored) = pgs.get_mut(key) {
            *stored = scratch;
        }
        Ok(Snapshot::Modified { previous })
    }

    pub fn get(&self, key: PgKey) -> QosResult<PriorityGroup> {
        let (switch, _ndi_port) = self.ctx.switch_for_port(key.port_id)?;
        let pgs = switch.priority_groups();
        pgs.get(key)
            .cloned()
            .ok_or_else(|| QosError::not_found("priority-group", Self::key_str(key)))
    }

    /// All priority groups of a port, in key order.
    pub fn get_port_priority_groups(&self, port_id: u32) -> QosResult<Vec<PriorityGroup>> {
        let (switch, _ndi_port) = self.ctx.switch_for_port(port_id)?;
        let pgs = switch.priority_groups();
        Ok(pgs.port_entries(port_id).map(|(_, pg)| pg.clone()).collect())
    }

    pub fn rollback(&self, snapshot: PriorityGroupSnapshot) -> QosResult<()> {
        let result = self.do_rollback(snapshot);
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

    fn do_rollback(&self, snapshot: PriorityGroupSnapshot) -> QosResult<()> {
        match snapshot {
            Snapshot::Modified { previous } => {
                let key = previous.key();
                let (switch, _ndi_port) = self.ctx.switch_for_port(key.port_id)?;
                let mut pgs = switch.priority_groups();
                if pgs.get(key).is_none() {
                    return Err(QosError::not_found("priority-group", Self::key_str(key)));
                }
                let mut scratch = previous;
                scratch.mark_all_dirty();
                {
                    let buffer_profiles = switch.buffer_profiles();
                    scratch.resolve(&buffer_profiles)?;
                }
                commit_modify(&mut scratch, self.ctx.ndi())?;
                if let Some(stored) = pgs.get_mut(key) {
                    *stored = scratch;
                }
                Ok(())
            }
            Snapshot::Created { .. } | Snapshot::Deleted { .. } => Err(QosError::unsupported(
                "priority-group",
                "rollback of create/delete: hardware owns the priority-group population",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferOrch, BufferPoolReq, BufferProfileReq};
    use crate::testing::{test_context, SWITCH};
    use nas_ndi::BufferPoolType;

    #[test]
    fn test_lazy_init_and_modify() {
        let (ctx, mock) = test_context();
        mock.provision_port_priority_groups(NdiPort { npu: 0, port: 2 }, 8);

        let buffer_orch = BufferOrch::new(ctx.clone());
        let pool_id = buffer_orch
            .create_pool(
                SWITCH,
                &BufferPoolReq {
                    pool_type: Some(BufferPoolType::Ingress),
                    size: Some(1 << 20),
                    ..BufferPoolReq::default()
                },
            )
            .unwrap();
        let profile_id = buffer_orch
            .create_profile(
                SWITCH,
                &BufferProfileReq {
                    pool_id: Some(pool_id),
                    buffer_size: Some(9216),
                    ..BufferProfileReq::default()
                },
            )
            .unwrap();

        let orch = PriorityGroupOrch::new(ctx);
        assert_eq!(orch.init_port(2).unwrap(), 8);
        assert_eq!(orch.init_port(2).unwrap(), 0);

        let key = PgKey {
            port_id: 2,
            local_id: 3,
        };
        let snapshot = orch
            .modify(
                key,
                &PriorityGroupReq {
                    buffer_profile_id: Some(profile_id),
                },
            )
            .unwrap();
        assert_eq!(orch.get(key).unwrap().buffer_profile_id(), Some(profile_id));

        orch.rollback(snapshot).unwrap();
        assert_eq!(orch.get(key).unwrap().buffer_profile_id(), None);
    }

    #[test]
    fn test_create_unsupported() {
        let (ctx, _mock) = test_context();
        let orch = PriorityGroupOrch::new(ctx);
        let key = PgKey {
            port_id: 2,
            local_id: 0,
        };
        assert!(matches!(
            orch.create(key, &PriorityGroupReq::default()),
            Err(QosError::Unsupported { .. })
        ));
    }
}
