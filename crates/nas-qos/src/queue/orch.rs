//! Queue transaction handler and lazy per-port discovery.

use std::sync::{Arc, Mutex};

use log::{debug, warn};
use nas_ndi::{NdiPort, QosNdi, QueueType};

use super::types::{Queue, QueueKey, QueueReq};
use crate::audit::{AuditCategory, AuditRecord};
use crate::audit_log;
use crate::base::{commit_create, commit_delete, commit_modify, ObjId, OrchStats, Snapshot};
use crate::error::{QosError, QosResult};
use crate::switch::{HasObjId, QosContext, QosSwitch};

/// Previous-state record for queue writes.
pub type QueueSnapshot = Snapshot<QueueKey, Queue>;

/// Materializes a port's hardware queues in the registry on first touch.
///
/// Queries the driver for the port's queue handles and attributes, derives
/// each queue's port-local id from the switch-wide partition constants, and
/// registers one entry per hardware queue. Idempotent: a port that already
/// has queue entries is left alone. Returns the number of entries added.
///
/// Callers must not hold the queue table lock.
pub fn init_port_queues(
    switch: &QosSwitch,
    ndi: &dyn QosNdi,
    ndi_port: NdiPort,
    port_id: u32,
) -> QosResult<usize> {
    let mut queues = switch.queues();
    if queues.port_is_initialized(port_id) {
        return Ok(0);
    }

    let ids = ndi
        .port_queue_id_list(ndi_port)
        .map_err(|e| QosError::hardware("queue", port_id, ndi_port.npu, e))?;

    let mut added = 0;
    for handle in ids {
        let info = ndi
            .queue_info(ndi_port.npu, handle)
            .map_err(|e| QosError::hardware("queue", port_id, ndi_port.npu, e))?;
        let local_queue_id = match info.queue_type {
            QueueType::Multicast => switch.mcast_local_id(info.queue_index),
            QueueType::Unicast | QueueType::Cpu => info.queue_index,
        };
        let key = QueueKey {
            port_id,
            local_queue_id,
            queue_type: info.queue_type,
        };
        let id = queues.alloc_id()?;
        let queue = Queue::discovered(key, id, ndi_port, handle);
        if let Err(err) = queues.insert(key, queue) {
            queues.release_id(id);
            return Err(err);
        }
        added += 1;
    }
    debug!(
        "port {}: materialized {} hardware queues (npu {})",
        port_id, added, ndi_port.npu
    );
    Ok(added)
}

/// Serialized create/modify/delete/rollback for queues.
pub struct QueueOrch {
    ctx: Arc<QosContext>,
    stats: Mutex<OrchStats>,
}

impl QueueOrch {
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
        let mut record = AuditRecord::new(category, "QueueOrch", action)
            .with_object_type("queue")
            .with_object_id(key.to_string());
        if let Some(err) = err {
            record = record.with_error(err);
        }
        audit_log!(record);
    }

    fn key_str(key: QueueKey) -> String {
        format!(
            "{}:{}:{}",
            key.port_id,
            key.queue_type.as_str(),
            key.local_queue_id
        )
    }

    /// Pulls a port's hardware queues into the registry on first access.
    pub fn init_port(&self, port_id: u32) -> QosResult<usize> {
        let (switch, ndi_port) = self.ctx.switch_for_port(port_id)?;
        init_port_queues(&switch, self.ctx.ndi(), ndi_port, port_id)
    }

    /// Creates a software-defined queue (e.g. a CPU queue on platforms
    /// that allow it).
    pub fn create(&self, key: QueueKey, req: &QueueReq) -> QosResult<ObjId> {
        let result = self.do_create(key, req);
        match &result {
            Ok(id) => {
                self.count(|s| s.created += 1);
                self.audit(AuditCategory::ResourceCreate, "create", id, None);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                self.audit(AuditCategory::ResourceCreate, "create", Self::key_str(key), Some(err));
            }
        }
        result
    }

    fn do_create(&self, key: QueueKey, req: &QueueReq) -> QosResult<ObjId> {
        let (switch, ndi_port) = self.ctx.switch_for_port(key.port_id)?;
        let mut queues = switch.queues();

        if queues.get(key).is_some() {
            return Err(QosError::duplicate("queue", Self::key_str(key)));
        }

        let id = queues.alloc_id()?;
        let mut queue = Queue::new(key, id, ndi_port);
        queue.apply(req);
        {
            let wreds = switch.wreds();
            let buffer_profiles = switch.buffer_profiles();
            let schedulers = switch.schedulers();
            if let Err(err) =
                queue.resolve(switch.partition(), &wreds, &buffer_profiles, &schedulers)
            {
                queues.release_id(id);
                return Err(err);
            }
        }

        if let Err(err) = commit_create(&mut queue, self.ctx.ndi()) {
            queues.release_id(id);
            return Err(err);
        }
        if let Err(err) = queues.insert(key, queue) {
            queues.release_id(id);
            return Err(err);
        }
        Ok(id)
    }

    pub fn modify(&self, key: QueueKey, req: &QueueReq) -> QosResult<QueueSnapshot> {
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

    fn do_modify(&self, key: QueueKey, req: &QueueReq) -> QosResult<QueueSnapshot> {
        let (switch, _ndi_port) = self.ctx.switch_for_port(key.port_id)?;
        let mut queues = switch.queues();

        let current = queues
            .get(key)
            .ok_or_else(|| QosError::not_found("queue", Self::key_str(key)))?;
        let previous = current.clone();

        let mut scratch = current.clone();
        scratch.apply(req);
        {
            let wreds = switch.wreds();
            let buffer_profiles = switch.buffer_profiles();
            let schedulers = switch.schedulers();
            scratch.resolve(switch.partition(), &wreds, &buffer_profiles, &schedulers)?;
        }
        commit_modify(&mut scratch, self.ctx.ndi())?;

        if let Some(stored) = queues.get_mut(key) {
            *stored = scratch;
        }
        Ok(Snapshot::Modified { previous })
    }

    /// Deletes a queue. A queue still attached to a scheduler group is
    /// refused; detach it through the parent's child-list first.
    pub fn delete(&self, key: QueueKey) -> QosResult<QueueSnapshot> {
        let result = self.do_delete(key);
        match &result {
            Ok(_) => {
                self.count(|s| s.deleted += 1);
                self.audit(AuditCategory::ResourceDelete, "delete", Self::key_str(key), None);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                self.audit(AuditCategory::ResourceDelete, "delete", Self::key_str(key), Some(err));
            }
        }
        result
    }

    fn do_delete(&self, key: QueueKey) -> QosResult<QueueSnapshot> {
        let (switch, _ndi_port) = self.ctx.switch_for_port(key.port_id)?;
        let mut queues = switch.queues();

        let queue = queues
            .get(key)
            .ok_or_else(|| QosError::not_found("queue", Self::key_str(key)))?;
        if queue.is_attached() {
            return Err(QosError::inconsistent(
                "queue",
                Self::key_str(key),
                "still attached to a scheduler group",
            ));
        }
        commit_delete(queue, self.ctx.ndi())?;

        let previous = queues
            .remove(key)
            .ok_or_else(|| QosError::not_found("queue", Self::key_str(key)))?;
        Ok(Snapshot::Deleted { previous })
    }

    pub fn get(&self, key: QueueKey) -> QosResult<Queue> {
        let (switch, _ndi_port) = self.ctx.switch_for_port(key.port_id)?;
        let queues = switch.queues();
        queues
            .get(key)
            .cloned()
            .ok_or_else(|| QosError::not_found("queue", Self::key_str(key)))
    }

    /// All queues of a port, in key order.
    pub fn get_port_queues(&self, port_id: u32) -> QosResult<Vec<Queue>> {
        let (switch, _ndi_port) = self.ctx.switch_for_port(port_id)?;
        let queues = switch.queues();
        Ok(queues.port_entries(port_id).map(|(_, q)| q.clone()).collect())
    }

    pub fn rollback(&self, snapshot: QueueSnapshot) -> QosResult<()> {
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

    fn do_rollback(&self, snapshot: QueueSnapshot) -> QosResult<()> {
        match snapshot {
            Snapshot::Created { key } => match self.do_delete(key) {
                Ok(_) => Ok(()),
                Err(QosError::KeyNotFound { .. }) => {
                    warn!("queue {}: rollback of create found no entry", Self::key_str(key));
                    Ok(())
                }
                Err(err) => Err(err),
            },
            Snapshot::Modified { previous } => {
                let key = previous.key();
                let (switch, _ndi_port) = self.ctx.switch_for_port(key.port_id)?;
                let mut queues = switch.queues();
                if queues.get(key).is_none() {
                    return Err(QosError::not_found("queue", Self::key_str(key)));
                }
                let mut scratch = previous;
                scratch.mark_all_dirty();
                {
                    let wreds = switch.wreds();
                    let buffer_profiles = switch.buffer_profiles();
                    let schedulers = switch.schedulers();
                    scratch.resolve(switch.partition(), &wreds, &buffer_profiles, &schedulers)?;
                }
                commit_modify(&mut scratch, self.ctx.ndi())?;
                if let Some(stored) = queues.get_mut(key) {
                    *stored = scratch;
                }
                Ok(())
            }
            Snapshot::Deleted { previous } => {
                let key = previous.key();
                let (switch, _ndi_port) = self.ctx.switch_for_port(key.port_id)?;
                let mut queues = switch.queues();
                queues.reserve_id(previous.obj_id())?;
                let id = previous.obj_id();
                let mut queue = previous;
                if let Err(err) = commit_create(&mut queue, self.ctx.ndi()) {
                    queues.release_id(id);
                    return Err(err);
                }
                if let Err(err) = queues.insert(key, queue) {
                    queues.release_id(id);
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
    use crate::base::QUEUE_ID_TYPE_MASK;
    use crate::testing::test_context;
    use crate::wred::{WredOrch, WredReq};
    use crate::switch::HasObjId;
    use crate::testing::SWITCH;
    use nas_ndi::NdiPort;

    #[test]
    fn test_lazy_port_init_partitions_local_ids() {
        let (ctx, mock) = test_context();
        mock.provision_port_queues(NdiPort { npu: 0, port: 5 });
        let orch = QueueOrch::new(ctx.clone());

        // 8 unicast + 4 multicast per the mock's default partition
        let added = orch.init_port(5).unwrap();
        assert_eq!(added, 12);

        let queues = orch.get_port_queues(5).unwrap();
        let ucast: Vec<_> = queues
            .iter()
            .filter(|q| q.key().queue_type == QueueType::Unicast)
            .collect();
        let mcast: Vec<_> = queues
            .iter()
            .filter(|q| q.key().queue_type == QueueType::Multicast)
            .collect();
        assert_eq!(ucast.len(), 8);
        assert_eq!(mcast.len(), 4);
        // multicast local ids restart at 0 past the unicast block
        assert_eq!(mcast[0].key().local_queue_id, 0);
        assert_eq!(mcast[3].key().local_queue_id, 3);

        // queue ids carry the queue type tag
        for q in &queues {
            assert_eq!(q.obj_id() & QUEUE_ID_TYPE_MASK, QUEUE_ID_TYPE_MASK);
        }

        // second touch is a no-op
        assert_eq!(orch.init_port(5).unwrap(), 0);
        assert_eq!(orch.get_port_queues(5).unwrap().len(), 12);

        // reverse lookup by driver handle
        let switch = ctx.get_switch(SWITCH).unwrap();
        let raw = queues[0].ndi_id().unwrap().as_raw();
        assert_eq!(switch.queue_by_ndi_id(0, raw), Some(queues[0].obj_id()));
        assert_eq!(switch.queue_by_ndi_id(0, 0xdead), None);
    }

    #[test]
    fn test_modify_resolves_references() {
        let (ctx, mock) = test_context();
        mock.provision_port_queues(NdiPort { npu: 0, port: 3 });

        let wred_orch = WredOrch::new(ctx.clone());
        let wred_id = wred_orch
            .create(
                SWITCH,
                &WredReq {
                    green_enable: Some(true),
                    green_min_threshold: Some(100),
                    green_max_threshold: Some(200),
                    ..WredReq::default()
                },
            )
            .unwrap();

        let orch = QueueOrch::new(ctx);
        orch.init_port(3).unwrap();
        let key = QueueKey {
            port_id: 3,
            local_queue_id: 0,
            queue_type: QueueType::Unicast,
        };

        orch.modify(
            key,
            &QueueReq {
                wred_id: Some(wred_id),
                ..QueueReq::default()
            },
        )
        .unwrap();
        assert_eq!(orch.get(key).unwrap().wred_id(), Some(wred_id));

        // a dangling reference is rejected before hardware
        let err = orch
            .modify(
                key,
                &QueueReq {
                    wred_id: Some(999),
                    ..QueueReq::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, QosError::Inconsistent { .. }));
    }

    #[test]
    fn test_modify_unknown_queue() {
        let (ctx, _mock) = test_context();
        let orch = QueueOrch::new(ctx);
        let key = QueueKey {
            port_id: 3,
            local_queue_id: 0,
            queue_type: QueueType::Unicast,
        };
        assert!(matches!(
            orch.modify(key, &QueueReq::default()),
            Err(QosError::KeyNotFound { .. })
        ));
    }
}
