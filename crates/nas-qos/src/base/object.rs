//! The per-object bookkeeping contract every QoS type satisfies: which
//! NPUs own the object, which attributes changed since the last commit,
//! and which hardware handle represents the object on each NPU.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use nas_ndi::{NdiObjectId, NdiObjectKind, NpuId, QosNdi};

use crate::error::QosResult;

/// Switch-scoped, type-tagged object identifier.
pub type ObjId = u64;

/// The set of NPUs an object is programmed on, iterated in a fixed
/// ascending order so multi-NPU pushes are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NpuSet(BTreeSet<NpuId>);

impl NpuSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(npu: NpuId) -> Self {
        let mut set = BTreeSet::new();
        set.insert(npu);
        Self(set)
    }

    pub fn insert(&mut self, npu: NpuId) {
        self.0.insert(npu);
    }

    pub fn contains(&self, npu: NpuId) -> bool {
        self.0.contains(&npu)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// NPUs in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = NpuId> + '_ {
        self.0.iter().copied()
    }

    /// First NPU of the set, if any.
    pub fn first(&self) -> Option<NpuId> {
        self.0.iter().next().copied()
    }
}

impl FromIterator<NpuId> for NpuSet {
    fn from_iter<I: IntoIterator<Item = NpuId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Attributes changed since the last successful commit.
///
/// Drives both what gets re-pushed to hardware and what a rollback has to
/// snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtySet<A: Copy + Ord>(BTreeSet<A>);

impl<A: Copy + Ord> DirtySet<A> {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn mark(&mut self, attr: A) {
        self.0.insert(attr);
    }

    pub fn contains(&self, attr: A) -> bool {
        self.0.contains(&attr)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = A> + '_ {
        self.0.iter().copied()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// Per-object association from NPU to the hardware handle the driver
/// returned for it. Kind-typed: a queue's map can only hold queue handles.
#[derive(Debug, Clone)]
pub struct HandleMap<K: NdiObjectKind>(BTreeMap<NpuId, NdiObjectId<K>>);

impl<K: NdiObjectKind> HandleMap<K> {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, npu: NpuId, id: NdiObjectId<K>) {
        self.0.insert(npu, id);
    }

    pub fn get(&self, npu: NpuId) -> Option<NdiObjectId<K>> {
        self.0.get(&npu).copied()
    }

    pub fn remove(&mut self, npu: NpuId) -> Option<NdiObjectId<K>> {
        self.0.remove(&npu)
    }

    pub fn contains(&self, npu: NpuId) -> bool {
        self.0.contains_key(&npu)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NpuId, NdiObjectId<K>)> + '_ {
        self.0.iter().map(|(npu, id)| (*npu, *id))
    }
}

impl<K: NdiObjectKind> Default for HandleMap<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// The capability contract driving the generic commit engine.
///
/// Each QoS object type implements this once; `base::txn` then provides
/// the shared create/modify/delete protocol. Attributes whose change
/// requires cross-object coordination (only the scheduler-group child
/// list) report `false` from [`is_leaf_attr`](Self::is_leaf_attr) and are
/// handled by that type's transaction handler, not by the engine.
pub trait QosObject {
    /// Per-type attribute id, shared with the NDI layer.
    type Attr: Copy + Ord + fmt::Debug + 'static;
    /// Hardware handle kind for this object type.
    type NdiKind: NdiObjectKind;

    /// Object type name for errors, logs and audit records.
    const OBJECT_TYPE: &'static str;

    /// Key rendered for error context.
    fn key_string(&self) -> String;

    fn npu_list(&self) -> &NpuSet;

    fn dirty(&self) -> &DirtySet<Self::Attr>;
    fn dirty_mut(&mut self) -> &mut DirtySet<Self::Attr>;

    fn handles(&self) -> &HandleMap<Self::NdiKind>;
    fn handles_mut(&mut self) -> &mut HandleMap<Self::NdiKind>;

    /// True if the attribute maps to a single independent hardware call.
    fn is_leaf_attr(&self, _attr: Self::Attr) -> bool {
        true
    }

    /// Programs the object onto one NPU, returning its hardware handle.
    /// The commit engine records the handle in the handle map.
    fn push_create(&self, ndi: &dyn QosNdi, npu: NpuId) -> QosResult<NdiObjectId<Self::NdiKind>>;

    /// Pushes one changed leaf attribute to one NPU.
    fn push_leaf_attr(&self, ndi: &dyn QosNdi, attr: Self::Attr, npu: NpuId) -> QosResult<()>;

    /// Removes the object from one NPU.
    fn push_delete(&self, ndi: &dyn QosNdi, npu: NpuId) -> QosResult<()>;
}

/// Transaction counters kept by every per-type handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchStats {
    pub created: u64,
    pub modified: u64,
    pub deleted: u64,
    pub rollbacks: u64,
    pub errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_npu_set_ordering() {
        let set: NpuSet = [3, 1, 2].into_iter().collect();
        let order: Vec<NpuId> = set.iter().collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(set.first(), Some(1));
    }

    #[test]
    fn test_dirty_set() {
        let mut dirty: DirtySet<u32> = DirtySet::new();
        assert!(dirty.is_empty());
        dirty.mark(2);
        dirty.mark(1);
        dirty.mark(2);
        assert_eq!(dirty.iter().collect::<Vec<_>>(), vec![1, 2]);
        dirty.clear();
        assert!(dirty.is_empty());
    }

    #[test]
    fn test_handle_map() {
        use nas_ndi::QueueNdiId;
        let mut handles: HandleMap<nas_ndi::types::QueueKind> = HandleMap::new();
        handles.insert(0, QueueNdiId::from_raw_unchecked(0x100));
        assert_eq!(handles.get(0), Some(QueueNdiId::from_raw_unchecked(0x100)));
        assert!(handles.get(1).is_none());
        handles.remove(0);
        assert!(handles.is_empty());
    }
}
