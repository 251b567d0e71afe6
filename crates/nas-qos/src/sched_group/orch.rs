//! Scheduler-group transaction handler.

use std::sync::{Arc, Mutex};

use log::{debug, warn};
use nas_ndi::{NdiPort, QosNdi, SwitchId};

use super::hierarchy::apply_child_list;
use super::types::{SchedGroup, SchedGroupReq};
use crate::audit::{AuditCategory, AuditRecord};
use crate::audit_log;
use crate::base::{commit_create, commit_delete, commit_modify, ObjId, OrchStats, QosObject, Snapshot};
use crate::error::{QosError, QosResult};
use crate::queue::init_port_queues;
use crate::switch::{QosContext, QosSwitch};

/// Previous-state record for scheduler-group writes.
pub type SchedGroupSnapshot = Snapshot<ObjId, SchedGroup>;

/// Materializes a port's default scheduling tree from hardware on first
/// touch: the port's queues first, then every scheduler group with its
/// level and fan-out limit, then the parent/child relationships. Idempotent
/// per port; returns the number of scheduler groups added.
pub fn init_port_sched_groups(
    switch: &QosSwitch,
    ndi: &dyn QosNdi,
    ndi_port: NdiPort,
    port_id: u32,
    max_levels: u32,
) -> QosResult<usize> {
    init_port_queues(switch, ndi, ndi_port, port_id)?;

    let mut sched_groups = switch.sched_groups();
    if sched_groups.values().any(|sg| sg.port_id() == port_id) {
        return Ok(0);
    }

    let handles = ndi
        .port_sched_group_id_list(ndi_port)
        .map_err(|e| QosError::hardware("sched-group", port_id, ndi_port.npu, e))?;

    // first pass: one node per hardware group
    let mut discovered = Vec::with_capacity(handles.len());
    for handle in handles {
        let info = ndi
            .sched_group_info(ndi_port.npu, handle)
            .map_err(|e| QosError::hardware("sched-group", port_id, ndi_port.npu, e))?;
        let id = sched_groups.alloc_id()?;
        let mut node = SchedGroup::new(id, port_id, ndi_port, info.level, max_levels);
        node.set_max_child(info.max_child);
        node.handles_mut().insert(ndi_port.npu, handle);
        if let Err(err) = sched_groups.insert(id, node) {
            sched_groups.release_id(id);
            return Err(err);
        }
        discovered.push((id, handle, info));
    }

    // second pass: translate hardware child handles into registry ids and
    // wire up both directions of the relationship
    let mut queues = switch.queues();
    for (id, _handle, info) in &discovered {
        let mut children = Vec::with_capacity(info.child_list.len());
        let next_is_queue = sched_groups
            .get(*id)
            .map(|n| n.next_level_is_queue())
            .unwrap_or(false);
        for &child_raw in &info.child_list {
            if next_is_queue {
                let child_id = queues
                    .values()
                    .find(|q| {
                        q.key().port_id == port_id
                            && q.ndi_id().map(|h| h.as_raw()) == Some(child_raw)
                    })
                    .map(crate::switch::HasObjId::obj_id);
                if let Some(child_id) = child_id {
                    if let Some(queue) = queues.get_mut_by_obj_id(child_id) {
                        queue.attach(*id);
                    }
                    children.push(child_id);
                } else {
                    warn!(
                        "port {}: hardware queue 0x{:x} in sched-group child list not found",
                        port_id, child_raw
                    );
                }
            } else {
                let child_id = discovered
                    .iter()
                    .find(|(_, h, _)| h.as_raw() == child_raw)
                    .map(|(cid, _, _)| *cid);
                if let Some(child_id) = child_id {
                    if let Some(child) = sched_groups.get_mut(child_id) {
                        child.set_parent(*id);
                    }
                    children.push(child_id);
                } else {
                    warn!(
                        "port {}: hardware sched-group 0x{:x} in child list not found",
                        port_id, child_raw
                    );
                }
            }
        }
        if let Some(node) = sched_groups.get_mut(*id) {
            node.set_child_list(children);
        }
    }

    debug!(
        "port {}: materialized {} hardware scheduler groups (npu {})",
        port_id,
        discovered.len(),
        ndi_port.npu
    );
    Ok(discovered.len())
}

/// Serialized create/modify/delete/rollback for scheduler groups, the
/// hierarchy engine included.
pub struct SchedGroupOrch {
    ctx: Arc<QosContext>,
    stats: Mutex<OrchStats>,
}

impl SchedGroupOrch {
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
        let mut record = AuditRecord::new(category, "SchedGroupOrch", action)
            .with_object_type("sched-group")
            .with_object_id(key.to_string());
        if let Some(err) = err {
            record = record.with_error(err);
        }
        audit_log!(record);
    }

    /// Pulls a port's default scheduling tree into the registry.
    pub fn init_port(&self, port_id: u32) -> QosResult<usize> {
        let (switch, ndi_port) = self.ctx.switch_for_port(port_id)?;
        init_port_sched_groups(
            &switch,
            self.ctx.ndi(),
            ndi_port,
            port_id,
            self.ctx.config().max_sched_levels,
        )
    }

    /// Creates a scheduler group. An initial child list, if present, is
    /// applied through the hierarchy engine after the node exists; any
    /// failure there unwinds the whole create.
    pub fn create(&self, switch_id: SwitchId, req: &SchedGroupReq) -> QosResult<ObjId> {
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

    fn do_create(&self, switch_id: SwitchId, req: &SchedGroupReq) -> QosResult<ObjId> {
        let port_id = req
            .port_id
            .ok_or_else(|| QosError::missing_attribute("sched-group", "port-id"))?;
        let level = req
            .level
            .ok_or_else(|| QosError::missing_attribute("sched-group", "level"))?;
        let max_levels = self.ctx.config().max_sched_levels;
        if level >= max_levels {
            return Err(QosError::attribute_value(
                "sched-group",
                "level",
                format!("{} exceeds maximum depth {}", level, max_levels - 1),
            ));
        }

        let (switch, ndi_port) = self.ctx.switch_for_port(port_id)?;
        if switch.id() != switch_id {
            return Err(QosError::inconsistent(
                "sched-group",
                port_id,
                format!("port belongs to switch {}, not {}", switch.id(), switch_id),
            ));
        }

        let mut sched_groups = switch.sched_groups();
        let id = sched_groups.alloc_id()?;
        let mut node = SchedGroup::new(id, port_id, ndi_port, level, max_levels);
        node.apply(req);
        {
            let schedulers = switch.schedulers();
            if let Err(err) = node.resolve(&schedulers) {
                sched_groups.release_id(id);
                return Err(err);
            }
        }

        if let Err(err) = commit_create(&mut node, self.ctx.ndi()) {
            sched_groups.release_id(id);
            return Err(err);
        }

        // fan-out ceiling is read once, right after the hardware create
        let handle = node.ndi_id().ok_or_else(|| {
            QosError::inconsistent("sched-group", id, "create returned no handle")
        })?;
        match self.ctx.ndi().sched_group_max_child(ndi_port.npu, handle) {
            Ok(max_child) => node.set_max_child(max_child),
            Err(err) => {
                self.unwind_created(&node);
                sched_groups.release_id(id);
                return Err(QosError::hardware("sched-group", id, ndi_port.npu, err));
            }
        }

        if let Err(err) = sched_groups.insert(id, node) {
            sched_groups.release_id(id);
            return Err(err);
        }

        if let Some(children) = req.child_list.as_deref() {
            if !children.is_empty() {
                let mut queues = switch.queues();
                if let Err(err) =
                    apply_child_list(self.ctx.ndi(), &mut sched_groups, &mut queues, id, children)
                {
                    drop(queues);
                    if let Some(node) = sched_groups.remove(id) {
                        self.unwind_created(&node);
                    }
                    return Err(err);
                }
            }
        }
        Ok(id)
    }

    fn unwind_created(&self, node: &SchedGroup) {
        if let Err(err) = commit_delete(node, self.ctx.ndi()) {
            warn!(
                "sched-group {}: cleanup delete failed while unwinding create: {}",
                node.id(),
                err
            );
        }
    }

    /// Modifies a scheduler group. The child list goes through the
    /// hierarchy engine; leaf attributes follow, and a leaf failure
    /// reverse-applies a child-list edit that already succeeded.
    pub fn modify(
        &self,
        switch_id: SwitchId,
        id: ObjId,
        req: &SchedGroupReq,
    ) -> QosResult<SchedGroupSnapshot> {
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
        req: &SchedGroupReq,
    ) -> QosResult<SchedGroupSnapshot> {
        if req.port_id.is_some() {
            return Err(QosError::unsupported("sched-group", "port-id is create-only"));
        }
        if req.level.is_some() {
            return Err(QosError::unsupported("sched-group", "level is create-only"));
        }

        let switch = self.ctx.get_switch(switch_id)?;
        let mut sched_groups = switch.sched_groups();

        let previous = sched_groups
            .get(id)
            .cloned()
            .ok_or_else(|| QosError::not_found("sched-group", id))?;

        let mut child_edit_applied = false;
        if let Some(new_list) = req.child_list.as_deref() {
            let mut queues = switch.queues();
            apply_child_list(self.ctx.ndi(), &mut sched_groups, &mut queues, id, new_list)?;
            child_edit_applied = true;
        }

        if req.scheduler_profile_id.is_some() {
            let current = sched_groups
                .get(id)
                .ok_or_else(|| QosError::not_found("sched-group", id))?;
            let mut scratch = current.clone();
            scratch.apply(req);

            let leaf_result = {
                let schedulers = switch.schedulers();
                match scratch.resolve(&schedulers) {
                    Ok(()) => commit_modify(&mut scratch, self.ctx.ndi()),
                    Err(err) => Err(err),
                }
            };
            if let Err(err) = leaf_result {
                if child_edit_applied {
                    let mut queues = switch.queues();
                    if let Err(undo_err) = apply_child_list(
                        self.ctx.ndi(),
                        &mut sched_groups,
                        &mut queues,
                        id,
                        previous.child_list(),
                    ) {
                        warn!(
                            "sched-group {}: reverse child-list edit failed while unwinding: {}",
                            id, undo_err
                        );
                    }
                }
                return Err(err);
            }
            if let Some(stored) = sched_groups.get_mut(id) {
                *stored = scratch;
            }
        }

        Ok(Snapshot::Modified { previous })
    }

    /// Deletes a scheduler group. Nodes that still parent children or are
    /// still attached to a parent are refused.
    pub fn delete(&self, switch_id: SwitchId, id: ObjId) -> QosResult<SchedGroupSnapshot> {
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

    fn do_delete(&self, switch_id: SwitchId, id: ObjId) -> QosResult<SchedGroupSnapshot> {
        let switch = self.ctx.get_switch(switch_id)?;
        let mut sched_groups = switch.sched_groups();

        let node = sched_groups
            .get(id)
            .ok_or_else(|| QosError::not_found("sched-group", id))?;
        if node.child_count() > 0 {
            return Err(QosError::inconsistent(
                "sched-group",
                id,
                format!("still has {} children", node.child_count()),
            ));
        }
        if node.level() > 0 && node.parent_id().is_some() {
            return Err(QosError::inconsistent(
                "sched-group",
                id,
                "still attached to a parent",
            ));
        }
        commit_delete(node, self.ctx.ndi())?;

        let previous = sched_groups
            .remove(id)
            .ok_or_else(|| QosError::not_found("sched-group", id))?;
        Ok(Snapshot::Deleted { previous })
    }

    pub fn get(&self, switch_id: SwitchId, id: ObjId) -> QosResult<SchedGroup> {
        let switch = self.ctx.get_switch(switch_id)?;
        let sched_groups = switch.sched_groups();
        sched_groups
            .get(id)
            .cloned()
            .ok_or_else(|| QosError::not_found("sched-group", id))
    }

    /// All scheduler groups of a port, optionally filtered by level.
    pub fn get_port_sched_groups(
        &self,
        port_id: u32,
        level: Option<u32>,
    ) -> QosResult<Vec<SchedGroup>> {
        let (switch, _ndi_port) = self.ctx.switch_for_port(port_id)?;
        let sched_groups = switch.sched_groups();
        Ok(sched_groups
            .values()
            .filter(|sg| sg.port_id() == port_id && level.map_or(true, |l| sg.level() == l))
            .cloned()
            .collect())
    }

    /// Replays the inverse of a previously-applied write. A modified
    /// snapshot re-applies the previous child list via the reverse diff,
    /// then restores the leaf attributes.
    pub fn rollback(&self, switch_id: SwitchId, snapshot: SchedGroupSnapshot) -> QosResult<()> {
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

    fn do_rollback(&self, switch_id: SwitchId, snapshot: SchedGroupSnapshot) -> QosResult<()> {
        match snapshot {
            Snapshot::Created { key } => {
                let switch = self.ctx.get_switch(switch_id)?;
                let mut sched_groups = switch.sched_groups();
                let node = match sched_groups.get(key) {
                    Some(node) => node,
                    None => {
                        warn!("sched-group {}: rollback of create found no entry", key);
                        return Ok(());
                    }
                };
                if node.level() > 0 && node.parent_id().is_some() {
                    return Err(QosError::inconsistent(
                        "sched-group",
                        key,
                        "cannot roll back create while attached to a parent",
                    ));
                }
                if node.child_count() > 0 {
                    let mut queues = switch.queues();
                    apply_child_list(self.ctx.ndi(), &mut sched_groups, &mut queues, key, &[])?;
                }
                let node = sched_groups
                    .get(key)
                    .ok_or_else(|| QosError::not_found("sched-group", key))?;
                commit_delete(node, self.ctx.ndi())?;
                sched_groups.remove(key);
                Ok(())
            }
            Snapshot::Modified { previous } => {
                let switch = self.ctx.get_switch(switch_id)?;
                let mut sched_groups = switch.sched_groups();
                let id = previous.id();
                if sched_groups.get(id).is_none() {
                    return Err(QosError::not_found("sched-group", id));
                }
                {
                    let mut queues = switch.queues();
                    apply_child_list(
                        self.ctx.ndi(),
                        &mut sched_groups,
                        &mut queues,
                        id,
                        previous.child_list(),
                    )?;
                }
                let mut scratch = sched_groups
                    .get(id)
                    .cloned()
                    .ok_or_else(|| QosError::not_found("sched-group", id))?;
                scratch.apply(&SchedGroupReq {
                    scheduler_profile_id: previous.scheduler_profile_id(),
                    ..SchedGroupReq::default()
                });
                if previous.scheduler_profile_id().is_some()
                    || scratch.scheduler_profile_id().is_some()
                {
                    scratch.mark_all_dirty();
                    let schedulers = switch.schedulers();
                    scratch.resolve(&schedulers)?;
                    drop(schedulers);
                    commit_modify(&mut scratch, self.ctx.ndi())?;
                    if let Some(stored) = sched_groups.get_mut(id) {
                        *stored = scratch;
                    }
                }
                Ok(())
            }
            Snapshot::Deleted { previous } => {
                let switch = self.ctx.get_switch(switch_id)?;
                let mut sched_groups = switch.sched_groups();
                let id = previous.id();
                sched_groups.reserve_id(id)?;
                let children = previous.child_list().to_vec();
                let mut node = previous;
                node.set_child_list(Vec::new());
                if let Err(err) = commit_create(&mut node, self.ctx.ndi()) {
                    sched_groups.release_id(id);
                    return Err(err);
                }
                if let Err(err) = sched_groups.insert(id, node) {
                    sched_groups.release_id(id);
                    return Err(err);
                }
                if !children.is_empty() {
                    let mut queues = switch.queues();
                    if let Err(err) = apply_child_list(
                        self.ctx.ndi(),
                        &mut sched_groups,
                        &mut queues,
                        id,
                        &children,
                    ) {
                        drop(queues);
                        if let Some(node) = sched_groups.remove(id) {
                            self.unwind_created(&node);
                        }
                        return Err(err);
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueOrch;
    use crate::testing::{test_context, SWITCH};
    use nas_ndi::mock::MockNdi;
    use std::sync::Arc as StdArc;

    const PORT: u32 = 1;

    fn create_node(orch: &SchedGroupOrch, level: u32) -> ObjId {
        orch.create(
            SWITCH,
            &SchedGroupReq {
                port_id: Some(PORT),
                level: Some(level),
                ..SchedGroupReq::default()
            },
        )
        .unwrap()
    }

    fn setup() -> (StdArc<crate::switch::QosContext>, StdArc<MockNdi>, SchedGroupOrch) {
        let (ctx, mock) = test_context();
        let orch = SchedGroupOrch::new(ctx.clone());
        (ctx, mock, orch)
    }

    #[test]
    fn test_create_fetches_max_child() {
        let (_ctx, mock, orch) = setup();
        mock.set_max_child(16);

        let id = create_node(&orch, 0);
        let node = orch.get(SWITCH, id).unwrap();
        assert_eq!(node.max_child(), 16);
        assert!(node.is_attached()); // level 0 is root
    }

    #[test]
    fn test_attach_via_parent_child_list() {
        let (_ctx, _mock, orch) = setup();

        let root = create_node(&orch, 0);
        let mid = create_node(&orch, 1);
        assert!(!orch.get(SWITCH, mid).unwrap().is_attached());

        orch.modify(
            SWITCH,
            root,
            &SchedGroupReq {
                child_list: Some(vec![mid]),
                ..SchedGroupReq::default()
            },
        )
        .unwrap();

        let mid_node = orch.get(SWITCH, mid).unwrap();
        assert_eq!(mid_node.parent_id(), Some(root));
        assert!(mid_node.is_attached());
        assert_eq!(orch.get(SWITCH, root).unwrap().child_list(), &[mid]);
    }

    #[test]
    fn test_unattached_parent_cannot_adopt() {
        let (_ctx, _mock, orch) = setup();

        let mid = create_node(&orch, 1); // unattached
        let leaf = create_node(&orch, 2);
        let err = orch
            .modify(
                SWITCH,
                mid,
                &SchedGroupReq {
                    child_list: Some(vec![leaf]),
                    ..SchedGroupReq::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, QosError::Inconsistent { .. }));
    }

    #[test]
    fn test_level_mismatch_rejected() {
        let (_ctx, _mock, orch) = setup();

        let root = create_node(&orch, 0);
        let leaf = create_node(&orch, 2); // two levels below root
        let err = orch
            .modify(
                SWITCH,
                root,
                &SchedGroupReq {
                    child_list: Some(vec![leaf]),
                    ..SchedGroupReq::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, QosError::Inconsistent { .. }));
        assert!(orch.get(SWITCH, root).unwrap().child_list().is_empty());
    }

    #[test]
    fn test_child_cannot_have_two_parents() {
        let (_ctx, _mock, orch) = setup();

        let root_a = create_node(&orch, 0);
        let root_b = create_node(&orch, 0);
        let mid = create_node(&orch, 1);

        orch.modify(
            SWITCH,
            root_a,
            &SchedGroupReq {
                child_list: Some(vec![mid]),
                ..SchedGroupReq::default()
            },
        )
        .unwrap();

        let err = orch
            .modify(
                SWITCH,
                root_b,
                &SchedGroupReq {
                    child_list: Some(vec![mid]),
                    ..SchedGroupReq::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, QosError::Inconsistent { .. }));
    }

    #[test]
    fn test_detach_with_children_rejected() {
        let (_ctx, _mock, orch) = setup();

        let root = create_node(&orch, 0);
        let mid = create_node(&orch, 1);
        let leaf = create_node(&orch, 2);

        orch.modify(SWITCH, root, &SchedGroupReq { child_list: Some(vec![mid]), ..Default::default() })
            .unwrap();
        orch.modify(SWITCH, mid, &SchedGroupReq { child_list: Some(vec![leaf]), ..Default::default() })
            .unwrap();

        // detaching mid while it still parents leaf must fail, list intact
        let err = orch
            .modify(
                SWITCH,
                root,
                &SchedGroupReq {
                    child_list: Some(vec![]),
                    ..SchedGroupReq::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, QosError::Inconsistent { .. }));
        assert_eq!(orch.get(SWITCH, root).unwrap().child_list(), &[mid]);
        assert_eq!(orch.get(SWITCH, mid).unwrap().parent_id(), Some(root));
    }

    #[test]
    fn test_queue_children_attach_and_detach() {
        let (ctx, mock, orch) = setup();
        mock.provision_port_queues(NdiPort { npu: 0, port: PORT });

        let queue_orch = QueueOrch::new(ctx);
        queue_orch.init_port(PORT).unwrap();
        let queues = queue_orch.get_port_queues(PORT).unwrap();
        let q0 = queues[0].clone();

        let leaf_sg = create_node(&orch, 2); // children are queues at this level
        // a leaf-level group at level 2 is not attached; attach through a chain
        let root = create_node(&orch, 0);
        let mid = create_node(&orch, 1);
        orch.modify(SWITCH, root, &SchedGroupReq { child_list: Some(vec![mid]), ..Default::default() })
            .unwrap();
        orch.modify(SWITCH, mid, &SchedGroupReq { child_list: Some(vec![leaf_sg]), ..Default::default() })
            .unwrap();

        use crate::switch::HasObjId;
        orch.modify(
            SWITCH,
            leaf_sg,
            &SchedGroupReq {
                child_list: Some(vec![q0.obj_id()]),
                ..SchedGroupReq::default()
            },
        )
        .unwrap();

        assert_eq!(
            queue_orch.get(q0.key()).unwrap().parent_id(),
            Some(leaf_sg)
        );
        // the bulk driver call carried the queue's hardware id
        let sg_handle = orch.get(SWITCH, leaf_sg).unwrap().ndi_id().unwrap();
        assert_eq!(
            mock.children_of(0, sg_handle.as_raw()),
            vec![q0.ndi_id().unwrap().as_raw()]
        );

        // detach again
        orch.modify(
            SWITCH,
            leaf_sg,
            &SchedGroupReq {
                child_list: Some(vec![]),
                ..SchedGroupReq::default()
            },
        )
        .unwrap();
        assert_eq!(queue_orch.get(q0.key()).unwrap().parent_id(), None);
    }

    #[test]
    fn test_child_list_rollback_symmetry() {
        let (_ctx, _mock, orch) = setup();

        let root = create_node(&orch, 0);
        let a = create_node(&orch, 1);
        let b = create_node(&orch, 1);

        orch.modify(SWITCH, root, &SchedGroupReq { child_list: Some(vec![a]), ..Default::default() })
            .unwrap();

        // edit [a] -> [b], then roll it back
        let snapshot = orch
            .modify(
                SWITCH,
                root,
                &SchedGroupReq {
                    child_list: Some(vec![b]),
                    ..SchedGroupReq::default()
                },
            )
            .unwrap();
        assert_eq!(orch.get(SWITCH, a).unwrap().parent_id(), None);
        assert_eq!(orch.get(SWITCH, b).unwrap().parent_id(), Some(root));

        orch.rollback(SWITCH, snapshot).unwrap();
        assert_eq!(orch.get(SWITCH, a).unwrap().parent_id(), Some(root));
        assert_eq!(orch.get(SWITCH, b).unwrap().parent_id(), None);
        assert_eq!(orch.get(SWITCH, root).unwrap().child_list(), &[a]);
    }

    #[test]
    fn test_fan_out_ceiling() {
        let (_ctx, mock, orch) = setup();
        mock.set_max_child(2);

        let root = create_node(&orch, 0);
        let kids: Vec<ObjId> = (0..3).map(|_| create_node(&orch, 1)).collect();

        let err = orch
            .modify(
                SWITCH,
                root,
                &SchedGroupReq {
                    child_list: Some(kids.clone()),
                    ..SchedGroupReq::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, QosError::ResourceExhausted { .. }));

        orch.modify(
            SWITCH,
            root,
            &SchedGroupReq {
                child_list: Some(kids[..2].to_vec()),
                ..SchedGroupReq::default()
            },
        )
        .unwrap();
    }

    #[test]
    fn test_hardware_failure_rolls_back_memory() {
        let (_ctx, mock, orch) = setup();

        let root = create_node(&orch, 0);
        let mid = create_node(&orch, 1);

        mock.fail_on("sched_group_add_children", 1);
        let err = orch
            .modify(
                SWITCH,
                root,
                &SchedGroupReq {
                    child_list: Some(vec![mid]),
                    ..SchedGroupReq::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, QosError::Hardware { .. }));

        // memory untouched: no parent set, no child recorded
        assert_eq!(orch.get(SWITCH, mid).unwrap().parent_id(), None);
        assert!(orch.get(SWITCH, root).unwrap().child_list().is_empty());
    }

    #[test]
    fn test_delete_rules() {
        let (_ctx, _mock, orch) = setup();

        let root = create_node(&orch, 0);
        let mid = create_node(&orch, 1);
        orch.modify(SWITCH, root, &SchedGroupReq { child_list: Some(vec![mid]), ..Default::default() })
            .unwrap();

        // parent with children cannot be deleted
        assert!(matches!(
            orch.delete(SWITCH, root),
            Err(QosError::Inconsistent { .. })
        ));
        // attached child cannot be deleted either
        assert!(matches!(
            orch.delete(SWITCH, mid),
            Err(QosError::Inconsistent { .. })
        ));

        orch.modify(SWITCH, root, &SchedGroupReq { child_list: Some(vec![]), ..Default::default() })
            .unwrap();
        orch.delete(SWITCH, mid).unwrap();
        orch.delete(SWITCH, root).unwrap();
    }

    #[test]
    fn test_create_with_initial_children() {
        let (_ctx, _mock, orch) = setup();

        let mid = create_node(&orch, 1);
        let root = orch
            .create(
                SWITCH,
                &SchedGroupReq {
                    port_id: Some(PORT),
                    level: Some(0),
                    child_list: Some(vec![mid]),
                    ..SchedGroupReq::default()
                },
            )
            .unwrap();

        assert_eq!(orch.get(SWITCH, mid).unwrap().parent_id(), Some(root));
    }

    #[test]
    fn test_modify_level_is_create_only() {
        let (_ctx, _mock, orch) = setup();
        let root = create_node(&orch, 0);
        assert!(matches!(
            orch.modify(
                SWITCH,
                root,
                &SchedGroupReq {
                    level: Some(1),
                    ..SchedGroupReq::default()
                }
            ),
            Err(QosError::Unsupported { .. })
        ));
    }
}
