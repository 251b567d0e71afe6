//! The per-switch object registry.
//!
//! One [`QosSwitch`] owns one keyed table plus one bounded id pool per
//! object type. Every table sits behind its own mutex: all transactions
//! for one object type serialize on it, while different object types
//! proceed concurrently. Hardware pushes happen under the owning type's
//! lock, so two writers of the same type can never interleave
//! partially-applied changes.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use log::debug;
use nas_ndi::{IfIndex, NpuId, QueuePartition, SwitchId};

use crate::base::{
    IdAllocator, NpuSet, ObjId, QosObject, QUEUE_ID_TYPE_MASK, SCHED_GROUP_ID_TYPE_MASK,
};
use crate::buffer::{BufferPool, BufferProfile};
use crate::config::QosConfig;
use crate::error::{QosError, QosResult};
use crate::map::QosMap;
use crate::pg::{PgKey, PriorityGroup};
use crate::policer::Policer;
use crate::port::{PortEgress, PortIngress};
use crate::queue::{Queue, QueueKey};
use crate::sched_group::SchedGroup;
use crate::scheduler::Scheduler;
use crate::wred::WredProfile;

/// Objects that carry their own allocated id, for tables whose key is not
/// the id itself.
pub trait HasObjId {
    fn obj_id(&self) -> ObjId;
}

/// Composite keys that sort primarily by port, enabling bounded range
/// scans ("all entries of port N").
pub trait PortKeyed: Copy + Ord + std::fmt::Debug {
    fn port(&self) -> IfIndex;
    /// The smallest possible key for a port.
    fn port_floor(port: IfIndex) -> Self;
}

/// Id-keyed object table with its bounded id pool.
#[derive(Debug)]
pub struct IdTable<T> {
    object_type: &'static str,
    entries: HashMap<ObjId, T>,
    ids: IdAllocator,
}

impl<T> IdTable<T> {
    pub fn new(object_type: &'static str, id_max: u64) -> Self {
        Self::with_tag(object_type, id_max, 0)
    }

    pub fn with_tag(object_type: &'static str, id_max: u64, tag: ObjId) -> Self {
        Self {
            object_type,
            entries: HashMap::new(),
            ids: IdAllocator::with_tag(object_type, id_max, tag),
        }
    }

    pub fn alloc_id(&mut self) -> QosResult<ObjId> {
        self.ids.alloc()
    }

    pub fn release_id(&mut self, id: ObjId) {
        self.ids.release(id);
    }

    pub fn reserve_id(&mut self, id: ObjId) -> QosResult<()> {
        self.ids.reserve(id)
    }

    /// Never overwrites an existing entry.
    pub fn insert(&mut self, id: ObjId, value: T) -> QosResult<()> {
        if self.entries.contains_key(&id) {
            return Err(QosError::duplicate(self.object_type, id));
        }
        self.entries.insert(id, value);
        Ok(())
    }

    /// Removes an entry and releases its id; absent keys are a no-op.
    pub fn remove(&mut self, id: ObjId) -> Option<T> {
        let removed = self.entries.remove(&id);
        if removed.is_some() {
            self.ids.release(id);
        }
        removed
    }

    pub fn get(&self, id: ObjId) -> Option<&T> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjId) -> Option<&mut T> {
        self.entries.get_mut(&id)
    }

    pub fn contains(&self, id: ObjId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjId, &T)> {
        self.entries.iter().map(|(id, v)| (*id, v))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.values_mut()
    }

    /// Ids currently held by the pool, for pool-state assertions.
    pub fn allocated_ids(&self) -> usize {
        self.ids.allocated_count()
    }
}

/// Port-keyed object table ordered for per-port range scans, with its
/// bounded id pool.
#[derive(Debug)]
pub struct PortTable<K: PortKeyed, T: HasObjId> {
    object_type: &'static str,
    entries: BTreeMap<K, T>,
    ids: IdAllocator,
}

impl<K: PortKeyed, T: HasObjId> PortTable<K, T> {
    pub fn with_tag(object_type: &'static str, id_max: u64, tag: ObjId) -> Self {
        Self {
            object_type,
            entries: BTreeMap::new(),
            ids: IdAllocator::with_tag(object_type, id_max, tag),
        }
    }

    pub fn alloc_id(&mut self) -> QosResult<ObjId> {
        self.ids.alloc()
    }

    pub fn release_id(&mut self, id: ObjId) {
        self.ids.release(id);
    }

    pub fn reserve_id(&mut self, id: ObjId) -> QosResult<()> {
        self.ids.reserve(id)
    }

    /// Never overwrites an existing entry.
    pub fn insert(&mut self, key: K, value: T) -> QosResult<()> {
        if self.entries.contains_key(&key) {
            return Err(QosError::duplicate(self.object_type, format_key(&key)));
        }
        self.entries.insert(key, value);
        Ok(())
    }

    /// Removes an entry and releases the id it carries; absent keys are a
    /// no-op.
    pub fn remove(&mut self, key: K) -> Option<T> {
        let removed = self.entries.remove(&key);
        if let Some(obj) = &removed {
            self.ids.release(obj.obj_id());
        }
        removed
    }

    pub fn get(&self, key: K) -> Option<&T> {
        self.entries.get(&key)
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        self.entries.get_mut(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.values_mut()
    }

    /// All entries of one port, in key order. Keys sort by port first, so
    /// a scan from the port's floor key bounded by "port changes" yields
    /// exactly that port's entries.
    pub fn port_entries(&self, port: IfIndex) -> impl Iterator<Item = (&K, &T)> {
        self.entries
            .range(K::port_floor(port)..)
            .take_while(move |(k, _)| k.port() == port)
    }

    pub fn port_entries_mut(&mut self, port: IfIndex) -> impl Iterator<Item = (&K, &mut T)> {
        self.entries
            .range_mut(K::port_floor(port)..)
            .take_while(move |(k, _)| k.port() == port)
    }

    pub fn port_count(&self, port: IfIndex) -> usize {
        self.port_entries(port).count()
    }

    /// True once any entry for the port exists (lazy init already ran).
    pub fn port_is_initialized(&self, port: IfIndex) -> bool {
        self.port_entries(port).next().is_some()
    }

    /// Reverse lookup by the object's own id.
    pub fn get_by_obj_id(&self, id: ObjId) -> Option<&T> {
        self.entries.values().find(|v| v.obj_id() == id)
    }

    pub fn get_mut_by_obj_id(&mut self, id: ObjId) -> Option<&mut T> {
        self.entries.values_mut().find(|v| v.obj_id() == id)
    }

    pub fn key_by_obj_id(&self, id: ObjId) -> Option<K> {
        self.entries
            .iter()
            .find(|(_, v)| v.obj_id() == id)
            .map(|(k, _)| *k)
    }

    pub fn allocated_ids(&self) -> usize {
        self.ids.allocated_count()
    }
}

fn format_key<K: std::fmt::Debug>(key: &K) -> String {
    format!("{:?}", key)
}

/// Port-profile table: keyed by ifindex, no id pool.
#[derive(Debug)]
pub struct ProfileTable<T> {
    object_type: &'static str,
    entries: BTreeMap<IfIndex, T>,
}

impl<T> ProfileTable<T> {
    pub fn new(object_type: &'static str) -> Self {
        Self {
            object_type,
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, port: IfIndex, value: T) -> QosResult<()> {
        if self.entries.contains_key(&port) {
            return Err(QosError::duplicate(self.object_type, port));
        }
        self.entries.insert(port, value);
        Ok(())
    }

    pub fn remove(&mut self, port: IfIndex) -> Option<T> {
        self.entries.remove(&port)
    }

    pub fn get(&self, port: IfIndex) -> Option<&T> {
        self.entries.get(&port)
    }

    pub fn get_mut(&mut self, port: IfIndex) -> Option<&mut T> {
        self.entries.get_mut(&port)
    }

    pub fn contains(&self, port: IfIndex) -> bool {
        self.entries.contains_key(&port)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }
}

/// One logical switch: every QoS object table, the id pools feeding them,
/// and the switch-wide constants fetched once at construction.
pub struct QosSwitch {
    id: SwitchId,
    npus: NpuSet,
    partition: QueuePartition,
    policers: Mutex<IdTable<Policer>>,
    wreds: Mutex<IdTable<WredProfile>>,
    schedulers: Mutex<IdTable<Scheduler>>,
    maps: Mutex<IdTable<QosMap>>,
    buffer_pools: Mutex<IdTable<BufferPool>>,
    buffer_profiles: Mutex<IdTable<BufferProfile>>,
    sched_groups: Mutex<IdTable<SchedGroup>>,
    queues: Mutex<PortTable<QueueKey, Queue>>,
    priority_groups: Mutex<PortTable<PgKey, PriorityGroup>>,
    port_ingress: Mutex<ProfileTable<PortIngress>>,
    port_egress: Mutex<ProfileTable<PortEgress>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl QosSwitch {
    pub fn new(id: SwitchId, npus: NpuSet, partition: QueuePartition, config: &QosConfig) -> Self {
        Self {
            id,
            npus,
            partition,
            policers: Mutex::new(IdTable::new("policer", config.policer_id_max)),
            wreds: Mutex::new(IdTable::new("wred", config.wred_id_max)),
            schedulers: Mutex::new(IdTable::new("scheduler", config.scheduler_id_max)),
            maps: Mutex::new(IdTable::new("map", config.map_id_max)),
            buffer_pools: Mutex::new(IdTable::new("buffer-pool", config.buffer_pool_id_max)),
            buffer_profiles: Mutex::new(IdTable::new(
                "buffer-profile",
                config.buffer_profile_id_max,
            )),
            sched_groups: Mutex::new(IdTable::with_tag(
                "sched-group",
                config.sched_group_id_max,
                SCHED_GROUP_ID_TYPE_MASK,
            )),
            queues: Mutex::new(PortTable::with_tag(
                "queue",
                config.queue_id_max,
                QUEUE_ID_TYPE_MASK,
            )),
            priority_groups: Mutex::new(PortTable::with_tag(
                "priority-group",
                config.priority_group_id_max,
                0,
            )),
            port_ingress: Mutex::new(ProfileTable::new("port-ingress")),
            port_egress: Mutex::new(ProfileTable::new("port-egress")),
        }
    }

    pub fn id(&self) -> SwitchId {
        self.id
    }

    /// NPUs belonging to this switch, in fixed iteration order.
    pub fn npus(&self) -> &NpuSet {
        &self.npus
    }

    pub fn contains_npu(&self, npu: NpuId) -> bool {
        self.npus.contains(npu)
    }

    /// Switch-wide queue partitioning constants.
    pub fn partition(&self) -> QueuePartition {
        self.partition
    }

    /// Port-local id a multicast queue gets from its hardware index: the
    /// unicast block comes first, multicast indexes are offset past it.
    pub fn mcast_local_id(&self, queue_index: u32) -> u32 {
        queue_index.saturating_sub(self.partition.ucast_per_port)
    }

    pub fn policers(&self) -> MutexGuard<'_, IdTable<Policer>> {
        lock(&self.policers)
    }

    pub fn wreds(&self) -> MutexGuard<'_, IdTable<WredProfile>> {
        lock(&self.wreds)
    }

    pub fn schedulers(&self) -> MutexGuard<'_, IdTable<Scheduler>> {
        lock(&self.schedulers)
    }

    pub fn maps(&self) -> MutexGuard<'_, IdTable<QosMap>> {
        lock(&self.maps)
    }

    pub fn buffer_pools(&self) -> MutexGuard<'_, IdTable<BufferPool>> {
        lock(&self.buffer_pools)
    }

    pub fn buffer_profiles(&self) -> MutexGuard<'_, IdTable<BufferProfile>> {
        lock(&self.buffer_profiles)
    }

    pub fn sched_groups(&self) -> MutexGuard<'_, IdTable<SchedGroup>> {
        lock(&self.sched_groups)
    }

    pub fn queues(&self) -> MutexGuard<'_, PortTable<QueueKey, Queue>> {
        lock(&self.queues)
    }

    pub fn priority_groups(&self) -> MutexGuard<'_, PortTable<PgKey, PriorityGroup>> {
        lock(&self.priority_groups)
    }

    pub fn port_ingress(&self) -> MutexGuard<'_, ProfileTable<PortIngress>> {
        lock(&self.port_ingress)
    }

    pub fn port_egress(&self) -> MutexGuard<'_, ProfileTable<PortEgress>> {
        lock(&self.port_egress)
    }

    /// Registry id of the queue a driver handle refers to.
    pub fn queue_by_ndi_id(&self, npu: NpuId, raw: nas_ndi::RawNdiObjectId) -> Option<ObjId> {
        let queues = self.queues();
        let result = queues
            .values()
            .find(|q| q.handles().get(npu).map(|h| h.as_raw()) == Some(raw))
            .map(HasObjId::obj_id);
        result
    }

    /// Registry id of the scheduler group a driver handle refers to.
    pub fn sched_group_by_ndi_id(&self, npu: NpuId, raw: nas_ndi::RawNdiObjectId) -> Option<ObjId> {
        let sched_groups = self.sched_groups();
        let result = sched_groups
            .values()
            .find(|sg| sg.handles().get(npu).map(|h| h.as_raw()) == Some(raw))
            .map(|sg| sg.id());
        result
    }

    /// Registry id of the priority group a driver handle refers to.
    pub fn priority_group_by_ndi_id(
        &self,
        npu: NpuId,
        raw: nas_ndi::RawNdiObjectId,
    ) -> Option<ObjId> {
        let pgs = self.priority_groups();
        let result = pgs
            .values()
            .find(|pg| pg.handles().get(npu).map(|h| h.as_raw()) == Some(raw))
            .map(HasObjId::obj_id);
        result
    }

    /// Trace-dumps the port-keyed tables.
    pub fn dump(&self) {
        let queues = self.queues();
        for (key, queue) in queues.entries_iter() {
            debug!(
                "switch {}: queue (port {}, local {}, {:?}) id 0x{:x}",
                self.id, key.port_id, key.local_queue_id, key.queue_type, queue.obj_id()
            );
        }
        drop(queues);
        let pgs = self.priority_groups();
        for (key, pg) in pgs.entries_iter() {
            debug!(
                "switch {}: priority-group (port {}, local {}) id 0x{:x}",
                self.id, key.port_id, key.local_id, pg.obj_id()
            );
        }
    }
}

impl<K: PortKeyed, T: HasObjId> PortTable<K, T> {
    /// All entries in key order.
    pub fn entries_iter(&self) -> impl Iterator<Item = (&K, &T)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct TestObj {
        id: ObjId,
    }

    impl HasObjId for TestObj {
        fn obj_id(&self) -> ObjId {
            self.id
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    struct TestKey {
        port: IfIndex,
        local: u32,
    }

    impl PortKeyed for TestKey {
        fn port(&self) -> IfIndex {
            self.port
        }

        fn port_floor(port: IfIndex) -> Self {
            Self { port, local: 0 }
        }
    }

    #[test]
    fn test_id_table_duplicate_rejected() {
        let mut tab: IdTable<TestObj> = IdTable::new("test", 10);
        let id = tab.alloc_id().unwrap();
        tab.insert(id, TestObj { id }).unwrap();

        let err = tab.insert(id, TestObj { id }).unwrap_err();
        assert!(matches!(err, QosError::DuplicateKey { .. }));
        assert_eq!(tab.len(), 1);
    }

    #[test]
    fn test_id_table_round_trip() {
        let mut tab: IdTable<TestObj> = IdTable::new("test", 10);
        let before_len = tab.len();
        let before_ids = tab.allocated_ids();

        let id = tab.alloc_id().unwrap();
        tab.insert(id, TestObj { id }).unwrap();
        tab.remove(id);

        assert_eq!(tab.len(), before_len);
        assert_eq!(tab.allocated_ids(), before_ids);
    }

    #[test]
    fn test_id_table_remove_absent_is_noop() {
        let mut tab: IdTable<TestObj> = IdTable::new("test", 10);
        assert!(tab.remove(42).is_none());
    }

    #[test]
    fn test_port_table_range_scan() {
        let mut tab: PortTable<TestKey, TestObj> = PortTable::with_tag("test", 100, 0);
        for port in [3, 1, 2] {
            for local in 0..4 {
                let id = tab.alloc_id().unwrap();
                tab.insert(TestKey { port, local }, TestObj { id }).unwrap();
            }
        }

        let port2: Vec<u32> = tab.port_entries(2).map(|(k, _)| k.local).collect();
        assert_eq!(port2, vec![0, 1, 2, 3]);
        assert_eq!(tab.port_count(2), 4);
        assert!(tab.port_is_initialized(2));
        assert!(!tab.port_is_initialized(9));
    }

    #[test]
    fn test_port_table_remove_releases_contained_id() {
        let mut tab: PortTable<TestKey, TestObj> = PortTable::with_tag("test", 100, 0);
        let key = TestKey { port: 1, local: 0 };
        let id = tab.alloc_id().unwrap();
        tab.insert(key, TestObj { id }).unwrap();
        assert_eq!(tab.allocated_ids(), 1);

        tab.remove(key);
        assert_eq!(tab.allocated_ids(), 0);
        // released id is reusable
        assert_eq!(tab.alloc_id().unwrap(), id);
    }

    #[test]
    fn test_port_table_reverse_lookup() {
        let mut tab: PortTable<TestKey, TestObj> = PortTable::with_tag("test", 100, 0);
        let key = TestKey { port: 5, local: 2 };
        let id = tab.alloc_id().unwrap();
        tab.insert(key, TestObj { id }).unwrap();

        assert!(tab.get_by_obj_id(id).is_some());
        assert_eq!(tab.key_by_obj_id(id), Some(key));
        assert!(tab.get_by_obj_id(id + 1).is_none());
    }

    #[test]
    fn test_profile_table() {
        let mut tab: ProfileTable<u32> = ProfileTable::new("port-ingress");
        tab.insert(1, 10).unwrap();
        assert!(matches!(
            tab.insert(1, 11),
            Err(QosError::DuplicateKey { .. })
        ));
        assert_eq!(tab.get(1), Some(&10));
        tab.remove(1);
        assert!(!tab.contains(1));
    }
}
