//! Port ingress/egress profile transaction handler.

use std::sync::{Arc, Mutex};

use log::warn;
use nas_ndi::IfIndex;

use super::types::{PortEgress, PortEgressReq, PortIngress, PortIngressReq};
use crate::audit::{AuditCategory, AuditRecord};
use crate::audit_log;
use crate::base::{commit_create, commit_modify, OrchStats, Snapshot};
use crate::error::{QosError, QosResult};
use crate::switch::QosContext;

/// Previous-state record for port ingress writes.
pub type PortIngressSnapshot = Snapshot<IfIndex, PortIngress>;
/// Previous-state record for port egress writes.
pub type PortEgressSnapshot = Snapshot<IfIndex, PortEgress>;

/// Serialized transactions for per-port QoS profiles. No id pool: profiles
/// are keyed by the port's ifindex and deleting one only forgets the
/// registry entry.
pub struct PortQosOrch {
    ctx: Arc<QosContext>,
    stats: Mutex<OrchStats>,
}

impl PortQosOrch {
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
        port_id: IfIndex,
        err: Option<&QosError>,
    ) {
        let mut record = AuditRecord::new(category, "PortQosOrch", action)
            .with_object_type(object_type)
            .with_object_id(port_id);
        if let Some(err) = err {
            record = record.with_error(err);
        }
        audit_log!(record);
    }

    // ------------------------------------------------------------------
    // Ingress
    // ------------------------------------------------------------------

    pub fn create_ingress(&self, port_id: IfIndex, req: &PortIngressReq) -> QosResult<()> {
        let result = self.do_create_ingress(port_id, req);
        match &result {
            Ok(()) => {
                self.count(|s| s.created += 1);
                self.audit(AuditCategory::ResourceCreate, "port-ingress", "create", port_id, None);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                self.audit(
                    AuditCategory::ResourceCreate,
                    "port-ingress",
                    "create",
                    port_id,
                    Some(err),
                );
            }
        }
        result
    }

    fn do_create_ingress(&self, port_id: IfIndex, req: &PortIngressReq) -> QosResult<()> {
        let (switch, ndi_port) = self.ctx.switch_for_port(port_id)?;
        let mut table = switch.port_ingress();

        if table.contains(port_id) {
            return Err(QosError::duplicate("port-ingress", port_id));
        }

        let mut profile = PortIngress::new(port_id, ndi_port);
        profile.apply(req);
        {
            let maps = switch.maps();
            let policers = switch.policers();
            profile.resolve(&maps, &policers)?;
        }
        commit_create(&mut profile, self.ctx.ndi())?;
        table.insert(port_id, profile)
    }

    pub fn modify_ingress(
        &self,
        port_id: IfIndex,
        req: &PortIngressReq,
    ) -> QosResult<PortIngressSnapshot> {
        let result = self.do_modify_ingress(port_id, req);
        match &result {
            Ok(_) => {
                self.count(|s| s.modified += 1);
                self.audit(AuditCategory::ResourceModify, "port-ingress", "modify", port_id, None);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                self.audit(
                    AuditCategory::ResourceModify,
                    "port-ingress",
                    "modify",
                    port_id,
                    Some(err),
                );
            }
        }
        result
    }

    fn do_modify_ingress(
        &self,
        port_id: IfIndex,
        req: &PortIngressReq,
    ) -> QosResult<PortIngressSnapshot> {
        let (switch, _ndi_port) = self.ctx.switch_for_port(port_id)?;
        let mut table = switch.port_ingress();

        let current = table
            .get(port_id)
            .ok_or_else(|| QosError::not_found("port-ingress", port_id))?;
        let previous = current.clone();

        let mut scratch = current.clone();
        scratch.apply(req);
        {
            let maps = switch.maps();
            let policers = switch.policers();
            scratch.resolve(&maps, &policers)?;
        }
        commit_modify(&mut scratch, self.ctx.ndi())?;

        if let Some(stored) = table.get_mut(port_id) {
            *stored = scratch;
        }
        Ok(Snapshot::Modified { previous })
    }

    /// Forgets a port's ingress profile. The port keeps its last-pushed
    /// attributes; there is no hardware delete and no id to release.
    pub fn delete_ingress(&self, port_id: IfIndex) -> QosResult<PortIngressSnapshot> {
        let result = self.do_delete_ingress(port_id);
        match &result {
            Ok(_) => {
                self.count(|s| s.deleted += 1);
                self.audit(AuditCategory::ResourceDelete, "port-ingress", "delete", port_id, None);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                self.audit(
                    AuditCategory::ResourceDelete,
                    "port-ingress",
                    "delete",
                    port_id,
                    Some(err),
                );
            }
        }
        result
    }

    fn do_delete_ingress(&self, port_id: IfIndex) -> QosResult<PortIngressSnapshot> {
        let (switch, _ndi_port) = self.ctx.switch_for_port(port_id)?;
        let mut table = switch.port_ingress();
        let previous = table
            .remove(port_id)
            .ok_or_else(|| QosError::not_found("port-ingress", port_id))?;
        Ok(Snapshot::Deleted { previous })
    }

    pub fn get_ingress(&self, port_id: IfIndex) -> QosResult<PortIngress> {
        let (switch, _ndi_port) = self.ctx.switch_for_port(port_id)?;
        let table = switch.port_ingress();
        table
            .get(port_id)
            .cloned()
            .ok_or_else(|| QosError::not_found("port-ingress", port_id))
    }

    pub fn rollback_ingress(&self, snapshot: PortIngressSnapshot) -> QosResult<()> {
        let result = self.do_rollback_ingress(snapshot);
        match &result {
            Ok(()) => {
                self.count(|s| s.rollbacks += 1);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                warn!("port-ingress rollback failed: {}", err);
            }
        }
        result
    }

    fn do_rollback_ingress(&self, snapshot: PortIngressSnapshot) -> QosResult<()> {
        match snapshot {
            Snapshot::Created { key } => match self.do_delete_ingress(key) {
                Ok(_) => Ok(()),
                Err(QosError::KeyNotFound { .. }) => Ok(()),
                Err(err) => Err(err),
            },
            Snapshot::Modified { previous } | Snapshot::Deleted { previous } => {
                let port_id = previous.port_id();
                let (switch, _ndi_port) = self.ctx.switch_for_port(port_id)?;
                let mut table = switch.port_ingress();
                let mut scratch = previous;
                scratch.mark_all_dirty();
                {
                    let maps = switch.maps();
                    let policers = switch.policers();
                    scratch.resolve(&maps, &policers)?;
                }
                commit_modify(&mut scratch, self.ctx.ndi())?;
                if table.contains(port_id) {
                    if let Some(stored) = table.get_mut(port_id) {
                        *stored = scratch;
                    }
                } else {
                    table.insert(port_id, scratch)?;
                }
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Egress
    // ------------------------------------------------------------------

    pub fn create_egress(&self, port_id: IfIndex, req: &PortEgressReq) -> QosResult<()> {
        let result = self.do_create_egress(port_id, req);
        match &result {
            Ok(()) => {
                self.count(|s| s.created += 1);
                self.audit(AuditCategory::ResourceCreate, "port-egress", "create", port_id, None);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                self.audit(
                    AuditCategory::ResourceCreate,
                    "port-egress",
                    "create",
                    port_id,
                    Some(err),
                );
            }
        }
        result
    }

    fn do_create_egress(&self, port_id: IfIndex, req: &PortEgressReq) -> QosResult<()> {
        let (switch, ndi_port) = self.ctx.switch_for_port(port_id)?;
        let mut table = switch.port_egress();

        if table.contains(port_id) {
            return Err(QosError::duplicate("port-egress", port_id));
        }

        let mut profile = PortEgress::new(port_id, ndi_port);
        profile.apply(req);
        {
            let maps = switch.maps();
            let schedulers = switch.schedulers();
            profile.resolve(&maps, &schedulers)?;
        }
        commit_create(&mut profile, self.ctx.ndi())?;
        table.insert(port_id, profile)
    }

    pub fn modify_egress(
        &self,
        port_id: IfIndex,
        req: &PortEgressReq,
    ) -> QosResult<PortEgressSnapshot> {
        let result = self.do_modify_egress(port_id, req);
        match &result {
            Ok(_) => {
                self.count(|s| s.modified += 1);
                self.audit(AuditCategory::ResourceModify, "port-egress", "modify", port_id, None);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                self.audit(
                    AuditCategory::ResourceModify,
                    "port-egress",
                    "modify",
                    port_id,
                    Some(err),
                );
            }
        }
        result
    }

    fn do_modify_egress(
        &self,
        port_id: IfIndex,
        req: &PortEgressReq,
    ) -> QosResult<PortEgressSnapshot> {
        let (switch, _ndi_port) = self.ctx.switch_for_port(port_id)?;
        let mut table = switch.port_egress();

        let current = table
            .get(port_id)
            .ok_or_else(|| QosError::not_found("port-egress", port_id))?;
        let previous = current.clone();

        let mut scratch = current.clone();
        scratch.apply(req);
        {
            let maps = switch.maps();
            let schedulers = switch.schedulers();
            scratch.resolve(&maps, &schedulers)?;
        }
        commit_modify(&mut scratch, self.ctx.ndi())?;

        if let Some(stored) = table.get_mut(port_id) {
            *stored = scratch;
        }
        Ok(Snapshot::Modified { previous })
    }

    /// Forgets a port's egress profile, registry-only like ingress.
    pub fn delete_egress(&self, port_id: IfIndex) -> QosResult<PortEgressSnapshot> {
        let result = self.do_delete_egress(port_id);
        match &result {
            Ok(_) => {
                self.count(|s| s.deleted += 1);
                self.audit(AuditCategory::ResourceDelete, "port-egress", "delete", port_id, None);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                self.audit(
                    AuditCategory::ResourceDelete,
                    "port-egress",
                    "delete",
                    port_id,
                    Some(err),
                );
            }
        }
        result
    }

    fn do_delete_egress(&self, port_id: IfIndex) -> QosResult<PortEgressSnapshot> {
        let (switch, _ndi_port) = self.ctx.switch_for_port(port_id)?;
        let mut table = switch.port_egress();
        let previous = table
            .remove(port_id)
            .ok_or_else(|| QosError::not_found("port-egress", port_id))?;
        Ok(Snapshot::Deleted { previous })
    }

    pub fn get_egress(&self, port_id: IfIndex) -> QosResult<PortEgress> {
        let (switch, _ndi_port) = self.ctx.switch_for_port(port_id)?;
        let table = switch.port_egress();
        table
            .get(port_id)
            .cloned()
            .ok_or_else(|| QosError::not_found("port-egress", port_id))
    }

    pub fn rollback_egress(&self, snapshot: PortEgressSnapshot) -> QosResult<()> {
        let result = self.do_rollback_egress(snapshot);
        match &result {
            Ok(()) => {
                self.count(|s| s.rollbacks += 1);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                warn!("port-egress rollback failed: {}", err);
            }
        }
        result
    }

    fn do_rollback_egress(&self, snapshot: PortEgressSnapshot) -> QosResult<()> {
        match snapshot {
            Snapshot::Created { key } => match self.do_delete_egress(key) {
                Ok(_) => Ok(()),
                Err(QosError::KeyNotFound { .. }) => Ok(()),
                Err(err) => Err(err),
            },
            Snapshot::Modified { previous } | Snapshot::Deleted { previous } => {
                let port_id = previous.port_id();
                let (switch, _ndi_port) = self.ctx.switch_for_port(port_id)?;
                let mut table = switch.port_egress();
                let mut scratch = previous;
                scratch.mark_all_dirty();
                {
                    let maps = switch.maps();
                    let schedulers = switch.schedulers();
                    scratch.resolve(&maps, &schedulers)?;
                }
                commit_modify(&mut scratch, self.ctx.ndi())?;
                if table.contains(port_id) {
                    if let Some(stored) = table.get_mut(port_id) {
                        *stored = scratch;
                    }
                } else {
                    table.insert(port_id, scratch)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;

    #[test]
    fn test_ingress_create_modify_delete() {
        let (ctx, mock) = test_context();
        let orch = PortQosOrch::new(ctx);

        orch.create_ingress(
            4,
            &PortIngressReq {
                default_traffic_class: Some(3),
                ..PortIngressReq::default()
            },
        )
        .unwrap();
        assert!(mock
            .calls()
            .iter()
            .any(|c| c.contains("set_port_ingress_attr") && c.contains("DefaultTrafficClass")));

        assert!(matches!(
            orch.create_ingress(4, &PortIngressReq::default()),
            Err(QosError::DuplicateKey { .. })
        ));

        let snapshot = orch
            .modify_ingress(
                4,
                &PortIngressReq {
                    default_traffic_class: Some(5),
                    ..PortIngressReq::default()
                },
            )
            .unwrap();
        assert_eq!(orch.get_ingress(4).unwrap().default_traffic_class, 5);

        orch.rollback_ingress(snapshot).unwrap();
        assert_eq!(orch.get_ingress(4).unwrap().default_traffic_class, 3);

        orch.delete_ingress(4).unwrap();
        assert!(orch.get_ingress(4).is_err());
    }

    #[test]
    fn test_egress_dangling_map_rejected() {
        let (ctx, _mock) = test_context();
        let orch = PortQosOrch::new(ctx);

        let err = orch
            .create_egress(
                4,
                &PortEgressReq {
                    tc_to_queue_map: Some(123),
                    ..PortEgressReq::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, QosError::Inconsistent { .. }));
    }
}
