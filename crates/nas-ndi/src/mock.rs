//! In-memory mock driver for tests.
//!
//! Simulates enough of an NPU driver to exercise the object model without
//! hardware: object creation with generated handles, attribute writes,
//! scheduler-group child bookkeeping, pre-provisioned per-port queues and
//! priority groups, and per-operation failure injection.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use crate::api::*;
use crate::error::{NdiError, NdiResult, NdiStatus};
use crate::types::*;

#[derive(Debug, Clone)]
struct MockObject {
    kind: &'static str,
    #[allow(dead_code)]
    npu: NpuId,
}

#[derive(Debug, Clone, Copy, Default)]
struct FailPlan {
    /// Calls to let through before failing.
    skip: u32,
    /// Calls to fail after the skip window.
    count: u32,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    objects: HashMap<(NpuId, RawNdiObjectId), MockObject>,
    sg_children: HashMap<(NpuId, RawNdiObjectId), BTreeSet<RawNdiObjectId>>,
    port_queues: HashMap<NdiPort, Vec<RawNdiObjectId>>,
    queue_infos: HashMap<RawNdiObjectId, QueueNdiInfo>,
    port_pgs: HashMap<NdiPort, Vec<RawNdiObjectId>>,
    port_sgs: HashMap<NdiPort, Vec<RawNdiObjectId>>,
    sg_infos: HashMap<RawNdiObjectId, SchedGroupNdiInfo>,
    calls: Vec<String>,
    fail_ops: HashMap<&'static str, FailPlan>,
    partition: QueuePartition,
    max_child: u32,
}

/// Mock NDI driver backed by an in-memory object store.
pub struct MockNdi {
    state: Mutex<MockState>,
}

impl Default for MockNdi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNdi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_id: 0x1000,
                partition: QueuePartition {
                    ucast_per_port: 8,
                    mcast_per_port: 4,
                    total_per_port: 12,
                    cpu_queues: 8,
                },
                max_child: 8,
                ..MockState::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes the next `count` calls of `op` fail with `TableFull`.
    pub fn fail_on(&self, op: &'static str, count: u32) {
        self.fail_nth(op, 0, count);
    }

    /// Lets `skip` calls of `op` through, then fails the next `count`.
    pub fn fail_nth(&self, op: &'static str, skip: u32, count: u32) {
        self.lock().fail_ops.insert(op, FailPlan { skip, count });
    }

    pub fn set_partition(&self, partition: QueuePartition) {
        self.lock().partition = partition;
    }

    pub fn set_max_child(&self, max_child: u32) {
        self.lock().max_child = max_child;
    }

    /// All driver calls made so far, oldest first.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn has_object(&self, npu: NpuId, id: RawNdiObjectId) -> bool {
        self.lock().objects.contains_key(&(npu, id))
    }

    pub fn object_count(&self, npu: NpuId) -> usize {
        self.lock().objects.keys().filter(|(n, _)| *n == npu).count()
    }

    /// Children currently attached to a scheduler group, ascending.
    pub fn children_of(&self, npu: NpuId, sg: RawNdiObjectId) -> Vec<RawNdiObjectId> {
        self.lock()
            .sg_children
            .get(&(npu, sg))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Provisions the hardware queues of a port per the mock's partition,
    /// as a real NPU would have at boot. Returns the queue handles.
    pub fn provision_port_queues(&self, port: NdiPort) -> Vec<RawNdiObjectId> {
        let mut state = self.lock();
        let (ucast, mcast) = (state.partition.ucast_per_port, state.partition.mcast_per_port);
        let mut ids = Vec::new();
        for index in 0..(ucast + mcast) {
            let id = state.next_id;
            state.next_id += 1;
            state.objects.insert((port.npu, id), MockObject { kind: "queue", npu: port.npu });
            state.queue_infos.insert(
                id,
                QueueNdiInfo {
                    queue_type: if index < ucast {
                        QueueType::Unicast
                    } else {
                        QueueType::Multicast
                    },
                    queue_index: index,
                    parent: 0,
                },
            );
            ids.push(id);
        }
        state.port_queues.insert(port, ids.clone());
        log::debug!(
            "mock: provisioned {} queues on npu {} port {}",
            ids.len(),
            port.npu,
            port.port
        );
        ids
    }

    /// Provisions the hardware priority groups of a port.
    pub fn provision_port_priority_groups(&self, port: NdiPort, count: u32) -> Vec<RawNdiObjectId> {
        let mut state = self.lock();
        let mut ids = Vec::new();
        for _ in 0..count {
            let id = state.next_id;
            state.next_id += 1;
            state
                .objects
                .insert((port.npu, id), MockObject { kind: "priority-group", npu: port.npu });
            ids.push(id);
        }
        state.port_pgs.insert(port, ids.clone());
        ids
    }

    /// Provisions one node of a port's default scheduling tree.
    pub fn provision_sched_group(
        &self,
        port: NdiPort,
        level: u32,
        parent: RawNdiObjectId,
        children: &[RawNdiObjectId],
    ) -> RawNdiObjectId {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        let max_child = state.max_child;
        state
            .objects
            .insert((port.npu, id), MockObject { kind: "sched-group", npu: port.npu });
        state.sg_infos.insert(
            id,
            SchedGroupNdiInfo {
                level,
                max_child,
                parent,
                scheduler_profile_id: 0,
                child_list: children.to_vec(),
            },
        );
        state
            .sg_children
            .insert((port.npu, id), children.iter().copied().collect());
        state.port_sgs.entry(port).or_default().push(id);
        id
    }
}

impl MockState {
    fn check_fail(&mut self, op: &'static str) -> NdiResult<()> {
        if let Some(plan) = self.fail_ops.get_mut(op) {
            if plan.skip > 0 {
                plan.skip -= 1;
            } else if plan.count > 0 {
                plan.count -= 1;
                return Err(NdiError::from_status(NdiStatus::TableFull));
            }
        }
        Ok(())
    }

    fn create(&mut self, op: &'static str, kind: &'static str, npu: NpuId) -> NdiResult<RawNdiObjectId> {
        self.check_fail(op)?;
        let id = self.next_id;
        self.next_id += 1;
        self.objects.insert((npu, id), MockObject { kind, npu });
        self.calls.push(format!("{}:npu{}:0x{:x}", op, npu, id));
        Ok(id)
    }

    fn set_attr(
        &mut self,
        op: &'static str,
        kind: &'static str,
        npu: NpuId,
        id: RawNdiObjectId,
        attr: String,
    ) -> NdiResult<()> {
        self.check_fail(op)?;
        match self.objects.get(&(npu, id)) {
            Some(obj) if obj.kind == kind => {
                self.calls.push(format!("{}:npu{}:0x{:x}:{}", op, npu, id, attr));
                Ok(())
            }
            _ => Err(NdiError::from_status(NdiStatus::InvalidObjectId)),
        }
    }

    fn delete(
        &mut self,
        op: &'static str,
        kind: &'static str,
        npu: NpuId,
        id: RawNdiObjectId,
    ) -> NdiResult<()> {
        self.check_fail(op)?;
        match self.objects.get(&(npu, id)) {
            Some(obj) if obj.kind == kind => {
                self.objects.remove(&(npu, id));
                self.calls.push(format!("{}:npu{}:0x{:x}", op, npu, id));
                Ok(())
            }
            _ => Err(NdiError::from_status(NdiStatus::ItemNotFound)),
        }
    }
}

impl QosNdi for MockNdi {
    fn queue_partition(&self, _npu: NpuId) -> NdiResult<QueuePartition> {
        Ok(self.lock().partition)
    }

    fn create_policer(&self, npu: NpuId, _cfg: &PolicerCfg) -> NdiResult<PolicerNdiId> {
        let id = self.lock().create("create_policer", "policer", npu)?;
        Ok(PolicerNdiId::from_raw_unchecked(id))
    }

    fn set_policer_attr(
        &self,
        npu: NpuId,
        id: PolicerNdiId,
        attr: PolicerAttr,
        _cfg: &PolicerCfg,
    ) -> NdiResult<()> {
        self.lock()
            .set_attr("set_policer_attr", "policer", npu, id.as_raw(), format!("{:?}", attr))
    }

    fn delete_policer(&self, npu: NpuId, id: PolicerNdiId) -> NdiResult<()> {
        self.lock().delete("delete_policer", "policer", npu, id.as_raw())
    }

    fn create_wred(&self, npu: NpuId, _cfg: &WredCfg) -> NdiResult<WredNdiId> {
        let id = self.lock().create("create_wred", "wred", npu)?;
        Ok(WredNdiId::from_raw_unchecked(id))
    }

    fn set_wred_attr(&self, npu: NpuId, id: WredNdiId, attr: WredAttr, _cfg: &WredCfg) -> NdiResult<()> {
        self.lock()
            .set_attr("set_wred_attr", "wred", npu, id.as_raw(), format!("{:?}", attr))
    }

    fn delete_wred(&self, npu: NpuId, id: WredNdiId) -> NdiResult<()> {
        self.lock().delete("delete_wred", "wred", npu, id.as_raw())
    }

    fn create_scheduler(&self, npu: NpuId, _cfg: &SchedulerCfg) -> NdiResult<SchedulerNdiId> {
        let id = self.lock().create("create_scheduler", "scheduler", npu)?;
        Ok(SchedulerNdiId::from_raw_unchecked(id))
    }

    fn set_scheduler_attr(
        &self,
        npu: NpuId,
        id: SchedulerNdiId,
        attr: SchedulerAttr,
        _cfg: &SchedulerCfg,
    ) -> NdiResult<()> {
        self.lock()
            .set_attr("set_scheduler_attr", "scheduler", npu, id.as_raw(), format!("{:?}", attr))
    }

    fn delete_scheduler(&self, npu: NpuId, id: SchedulerNdiId) -> NdiResult<()> {
        self.lock().delete("delete_scheduler", "scheduler", npu, id.as_raw())
    }

    fn create_map(&self, npu: NpuId, _map_type: MapType) -> NdiResult<MapNdiId> {
        let id = self.lock().create("create_map", "map", npu)?;
        Ok(MapNdiId::from_raw_unchecked(id))
    }

    fn delete_map(&self, npu: NpuId, id: MapNdiId) -> NdiResult<()> {
        self.lock().delete("delete_map", "map", npu, id.as_raw())
    }

    fn set_map_entry(
        &self,
        npu: NpuId,
        id: MapNdiId,
        _map_type: MapType,
        entry: &MapEntry,
    ) -> NdiResult<()> {
        self.lock().set_attr(
            "set_map_entry",
            "map",
            npu,
            id.as_raw(),
            format!("key{}", entry.key.as_raw()),
        )
    }

    fn del_map_entry(
        &self,
        npu: NpuId,
        id: MapNdiId,
        _map_type: MapType,
        key: MapEntryKey,
    ) -> NdiResult<()> {
        self.lock()
            .set_attr("del_map_entry", "map", npu, id.as_raw(), format!("key{}", key.as_raw()))
    }

    fn create_buffer_pool(&self, npu: NpuId, _cfg: &BufferPoolCfg) -> NdiResult<BufferPoolNdiId> {
        let id = self.lock().create("create_buffer_pool", "buffer-pool", npu)?;
        Ok(BufferPoolNdiId::from_raw_unchecked(id))
    }

    fn set_buffer_pool_attr(
        &self,
        npu: NpuId,
        id: BufferPoolNdiId,
        attr: BufferPoolAttr,
        _cfg: &BufferPoolCfg,
    ) -> NdiResult<()> {
        self.lock()
            .set_attr("set_buffer_pool_attr", "buffer-pool", npu, id.as_raw(), format!("{:?}", attr))
    }

    fn delete_buffer_pool(&self, npu: NpuId, id: BufferPoolNdiId) -> NdiResult<()> {
        self.lock().delete("delete_buffer_pool", "buffer-pool", npu, id.as_raw())
    }

    fn create_buffer_profile(&self, npu: NpuId, cfg: &BufferProfileCfg) -> NdiResult<BufferProfileNdiId> {
        {
            let state = self.lock();
            if cfg.pool_id != 0 && !state.objects.contains_key(&(npu, cfg.pool_id)) {
                return Err(NdiError::from_status(NdiStatus::InvalidObjectId));
            }
        }
        let id = self.lock().create("create_buffer_profile", "buffer-profile", npu)?;
        Ok(BufferProfileNdiId::from_raw_unchecked(id))
    }

    fn set_buffer_profile_attr(
        &self,
        npu: NpuId,
        id: BufferProfileNdiId,
        attr: BufferProfileAttr,
        _cfg: &BufferProfileCfg,
    ) -> NdiResult<()> {
        self.lock().set_attr(
            "set_buffer_profile_attr",
            "buffer-profile",
            npu,
            id.as_raw(),
            format!("{:?}", attr),
        )
    }

    fn delete_buffer_profile(&self, npu: NpuId, id: BufferProfileNdiId) -> NdiResult<()> {
        self.lock().delete("delete_buffer_profile", "buffer-profile", npu, id.as_raw())
    }

    fn create_queue(&self, npu: NpuId, cfg: &QueueNdiCfg) -> NdiResult<QueueNdiId> {
        let id = self.lock().create("create_queue", "queue", npu)?;
        self.lock().queue_infos.insert(
            id,
            QueueNdiInfo {
                queue_type: cfg.queue_type,
                queue_index: cfg.queue_index,
                parent: cfg.parent,
            },
        );
        Ok(QueueNdiId::from_raw_unchecked(id))
    }

    fn set_queue_attr(
        &self,
        npu: NpuId,
        id: QueueNdiId,
        attr: QueueAttr,
        _cfg: &QueueNdiCfg,
    ) -> NdiResult<()> {
        self.lock()
            .set_attr("set_queue_attr", "queue", npu, id.as_raw(), format!("{:?}", attr))
    }

    fn delete_queue(&self, npu: NpuId, id: QueueNdiId) -> NdiResult<()> {
        self.lock().delete("delete_queue", "queue", npu, id.as_raw())
    }

    fn port_queue_count(&self, port: NdiPort) -> NdiResult<u32> {
        Ok(self.lock().port_queues.get(&port).map_or(0, |v| v.len() as u32))
    }

    fn port_queue_id_list(&self, port: NdiPort) -> NdiResult<Vec<QueueNdiId>> {
        Ok(self
            .lock()
            .port_queues
            .get(&port)
            .map(|v| v.iter().map(|&id| QueueNdiId::from_raw_unchecked(id)).collect())
            .unwrap_or_default())
    }

    fn queue_info(&self, _npu: NpuId, id: QueueNdiId) -> NdiResult<QueueNdiInfo> {
        self.lock()
            .queue_infos
            .get(&id.as_raw())
            .copied()
            .ok_or_else(|| NdiError::from_status(NdiStatus::ItemNotFound))
    }

    fn set_priority_group_attr(
        &self,
        npu: NpuId,
        id: PriorityGroupNdiId,
        attr: PriorityGroupAttr,
        _cfg: &PriorityGroupNdiCfg,
    ) -> NdiResult<()> {
        self.lock().set_attr(
            "set_priority_group_attr",
            "priority-group",
            npu,
            id.as_raw(),
            format!("{:?}", attr),
        )
    }

    fn port_priority_group_count(&self, port: NdiPort) -> NdiResult<u32> {
        Ok(self.lock().port_pgs.get(&port).map_or(0, |v| v.len() as u32))
    }

    fn port_priority_group_id_list(&self, port: NdiPort) -> NdiResult<Vec<PriorityGroupNdiId>> {
        Ok(self
            .lock()
            .port_pgs
            .get(&port)
            .map(|v| {
                v.iter()
                    .map(|&id| PriorityGroupNdiId::from_raw_unchecked(id))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn create_sched_group(&self, npu: NpuId, _cfg: &SchedGroupNdiCfg) -> NdiResult<SchedGroupNdiId> {
        let id = self.lock().create("create_sched_group", "sched-group", npu)?;
        self.lock().sg_children.insert((npu, id), BTreeSet::new());
        Ok(SchedGroupNdiId::from_raw_unchecked(id))
    }

    fn set_sched_group_attr(
        &self,
        npu: NpuId,
        id: SchedGroupNdiId,
        attr: SchedGroupAttr,
        _cfg: &SchedGroupNdiCfg,
    ) -> NdiResult<()> {
        self.lock()
            .set_attr("set_sched_group_attr", "sched-group", npu, id.as_raw(), format!("{:?}", attr))
    }

    fn delete_sched_group(&self, npu: NpuId, id: SchedGroupNdiId) -> NdiResult<()> {
        let mut state = self.lock();
        state.delete("delete_sched_group", "sched-group", npu, id.as_raw())?;
        state.sg_children.remove(&(npu, id.as_raw()));
        Ok(())
    }

    fn sched_group_max_child(&self, _npu: NpuId, _id: SchedGroupNdiId) -> NdiResult<u32> {
        Ok(self.lock().max_child)
    }

    fn sched_group_add_children(
        &self,
        npu: NpuId,
        id: SchedGroupNdiId,
        children: &[RawNdiObjectId],
    ) -> NdiResult<()> {
        let mut state = self.lock();
        state.check_fail("sched_group_add_children")?;
        if !state.objects.contains_key(&(npu, id.as_raw())) {
            return Err(NdiError::from_status(NdiStatus::InvalidObjectId));
        }
        state
            .sg_children
            .entry((npu, id.as_raw()))
            .or_default()
            .extend(children.iter().copied());
        state
            .calls
            .push(format!("add_children:npu{}:0x{:x}:{}", npu, id.as_raw(), children.len()));
        Ok(())
    }

    fn sched_group_remove_children(
        &self,
        npu: NpuId,
        id: SchedGroupNdiId,
        children: &[RawNdiObjectId],
    ) -> NdiResult<()> {
        let mut state = self.lock();
        state.check_fail("sched_group_remove_children")?;
        if let Some(set) = state.sg_children.get_mut(&(npu, id.as_raw())) {
            for child in children {
                set.remove(child);
            }
        }
        state
            .calls
            .push(format!("remove_children:npu{}:0x{:x}:{}", npu, id.as_raw(), children.len()));
        Ok(())
    }

    fn port_sched_group_count(&self, port: NdiPort) -> NdiResult<u32> {
        Ok(self.lock().port_sgs.get(&port).map_or(0, |v| v.len() as u32))
    }

    fn port_sched_group_id_list(&self, port: NdiPort) -> NdiResult<Vec<SchedGroupNdiId>> {
        Ok(self
            .lock()
            .port_sgs
            .get(&port)
            .map(|v| {
                v.iter()
                    .map(|&id| SchedGroupNdiId::from_raw_unchecked(id))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn sched_group_info(&self, _npu: NpuId, id: SchedGroupNdiId) -> NdiResult<SchedGroupNdiInfo> {
        self.lock()
            .sg_infos
            .get(&id.as_raw())
            .cloned()
            .ok_or_else(|| NdiError::from_status(NdiStatus::ItemNotFound))
    }

    fn set_port_ingress_attr(
        &self,
        port: NdiPort,
        attr: PortIngressAttr,
        _cfg: &PortIngressNdiCfg,
    ) -> NdiResult<()> {
        let mut state = self.lock();
        state.check_fail("set_port_ingress_attr")?;
        state
            .calls
            .push(format!("set_port_ingress_attr:npu{}:p{}:{:?}", port.npu, port.port, attr));
        Ok(())
    }

    fn set_port_egress_attr(
        &self,
        port: NdiPort,
        attr: PortEgressAttr,
        _cfg: &PortEgressNdiCfg,
    ) -> NdiResult<()> {
        let mut state = self.lock();
        state.check_fail("set_port_egress_attr")?;
        state
            .calls
            .push(format!("set_port_egress_attr:npu{}:p{}:{:?}", port.npu, port.port, attr));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_delete() {
        let mock = MockNdi::new();
        let id = mock.create_policer(0, &PolicerCfg::default()).unwrap();
        assert!(mock.has_object(0, id.as_raw()));
        mock.delete_policer(0, id).unwrap();
        assert!(!mock.has_object(0, id.as_raw()));
    }

    #[test]
    fn test_failure_injection() {
        let mock = MockNdi::new();
        mock.fail_on("create_policer", 1);
        assert!(mock.create_policer(0, &PolicerCfg::default()).is_err());
        assert!(mock.create_policer(0, &PolicerCfg::default()).is_ok());
    }

    #[test]
    fn test_child_bookkeeping() {
        let mock = MockNdi::new();
        let sg = mock
            .create_sched_group(
                0,
                &SchedGroupNdiCfg {
                    port: NdiPort { npu: 0, port: 1 },
                    level: 0,
                    scheduler_profile_id: 0,
                },
            )
            .unwrap();
        mock.sched_group_add_children(0, sg, &[7, 8]).unwrap();
        assert_eq!(mock.children_of(0, sg.as_raw()), vec![7, 8]);
        mock.sched_group_remove_children(0, sg, &[7]).unwrap();
        assert_eq!(mock.children_of(0, sg.as_raw()), vec![8]);
    }
}
