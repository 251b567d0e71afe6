//! Classification map object type.
//!
//! A map owns a set of entries keyed by [`MapEntryKey`]; entries are the
//! modification surface — there is no other mutable map attribute.

use std::collections::BTreeMap;

use nas_ndi::types::MapKind;
use nas_ndi::{MapAttr, MapEntry, MapEntryKey, MapNdiId, MapType, NpuId, QosNdi};

use crate::base::{DirtySet, HandleMap, NpuSet, ObjId, QosObject};
use crate::error::{QosError, QosResult};

/// Attribute set carried by a map create request.
#[derive(Debug, Clone, Default)]
pub struct MapReq {
    pub map_type: Option<MapType>,
    /// Entries to install as part of the create.
    pub entries: Vec<MapEntry>,
}

/// Validates an entry's key and value ranges against the owning map's
/// type.
pub(crate) fn validate_entry(map_type: MapType, entry: &MapEntry) -> QosResult<()> {
    let key1 = entry.key.key1();
    let (key_name, key_max) = match map_type {
        MapType::DscpToTc | MapType::DscpToColor => ("dscp", 63),
        MapType::Dot1pToTc | MapType::Dot1pToColor => ("dot1p", 7),
        MapType::TcToQueue
        | MapType::TcToDscp
        | MapType::TcToDot1p
        | MapType::TcToPriorityGroup => ("tc", 15),
        MapType::PriorityGroupToPfcPriority => ("priority-group", 31),
        MapType::PfcPriorityToQueue => ("pfc-priority", 7),
    };
    if key1 > key_max {
        return Err(QosError::attribute_value(
            "map-entry",
            "key",
            format!("{} {} exceeds {}", key_name, key1, key_max),
        ));
    }
    if entry.dscp > 63 {
        return Err(QosError::attribute_value(
            "map-entry",
            "dscp",
            format!("{} exceeds 63", entry.dscp),
        ));
    }
    if entry.dot1p > 7 {
        return Err(QosError::attribute_value(
            "map-entry",
            "dot1p",
            format!("{} exceeds 7", entry.dot1p),
        ));
    }
    Ok(())
}

/// A classification map in the switch registry.
#[derive(Debug, Clone)]
pub struct QosMap {
    id: ObjId,
    npus: NpuSet,
    map_type: MapType,
    entries: BTreeMap<MapEntryKey, MapEntry>,
    dirty: DirtySet<MapAttr>,
    handles: HandleMap<MapKind>,
}

impl QosMap {
    pub fn new(id: ObjId, npus: NpuSet, map_type: MapType) -> Self {
        Self {
            id,
            npus,
            map_type,
            entries: BTreeMap::new(),
            dirty: DirtySet::new(),
            handles: HandleMap::new(),
        }
    }

    pub fn id(&self) -> ObjId {
        self.id
    }

    pub fn map_type(&self) -> MapType {
        self.map_type
    }

    pub fn entry(&self, key: MapEntryKey) -> Option<&MapEntry> {
        self.entries.get(&key)
    }

    pub fn entries(&self) -> impl Iterator<Item = &MapEntry> {
        self.entries.values()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Installs or overwrites an entry in memory.
    pub fn put_entry(&mut self, entry: MapEntry) {
        self.dirty.mark(MapAttr::Entries);
        self.entries.insert(entry.key, entry);
    }

    /// Removes an entry in memory; absent keys are a no-op.
    pub fn remove_entry(&mut self, key: MapEntryKey) -> Option<MapEntry> {
        self.dirty.mark(MapAttr::Entries);
        self.entries.remove(&key)
    }

    /// Entry keys present in `self` but absent from `other`.
    pub fn entry_keys_not_in(&self, other: &QosMap) -> Vec<MapEntryKey> {
        self.entries
            .keys()
            .filter(|k| !other.entries.contains_key(k))
            .copied()
            .collect()
    }

    /// Pushes one entry to one NPU.
    pub fn push_entry(&self, ndi: &dyn QosNdi, npu: NpuId, entry: &MapEntry) -> QosResult<()> {
        let handle = self.handle(npu)?;
        ndi.set_map_entry(npu, handle, self.map_type, entry)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.id, npu, e))
    }

    /// Removes one entry from one NPU.
    pub fn push_entry_delete(
        &self,
        ndi: &dyn QosNdi,
        npu: NpuId,
        key: MapEntryKey,
    ) -> QosResult<()> {
        let handle = self.handle(npu)?;
        ndi.del_map_entry(npu, handle, self.map_type, key)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.id, npu, e))
    }

    fn handle(&self, npu: NpuId) -> QosResult<MapNdiId> {
        self.handles.get(npu).ok_or_else(|| {
            QosError::inconsistent(
                Self::OBJECT_TYPE,
                self.id,
                format!("no hardware handle for npu {}", npu),
            )
        })
    }
}

impl QosObject for QosMap {
    type Attr = MapAttr;
    type NdiKind = MapKind;

    const OBJECT_TYPE: &'static str = "map";

    fn key_string(&self) -> String {
        self.id.to_string()
    }

    fn npu_list(&self) -> &NpuSet {
        &self.npus
    }

    fn dirty(&self) -> &DirtySet<MapAttr> {
        &self.dirty
    }

    fn dirty_mut(&mut self) -> &mut DirtySet<MapAttr> {
        &mut self.dirty
    }

    fn handles(&self) -> &HandleMap<MapKind> {
        &self.handles
    }

    fn handles_mut(&mut self) -> &mut HandleMap<MapKind> {
        &mut self.handles
    }

    fn push_create(&self, ndi: &dyn QosNdi, npu: NpuId) -> QosResult<MapNdiId> {
        ndi.create_map(npu, self.map_type)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.id, npu, e))
    }

    fn push_leaf_attr(&self, ndi: &dyn QosNdi, _attr: MapAttr, npu: NpuId) -> QosResult<()> {
        // the only attribute is the entry set; re-push every entry
        for entry in self.entries.values() {
            self.push_entry(ndi, npu, entry)?;
        }
        Ok(())
    }

    fn push_delete(&self, ndi: &dyn QosNdi, npu: NpuId) -> QosResult<()> {
        let handle = self.handle(npu)?;
        ndi.delete_map(npu, handle)
            .map_err(|e| QosError::hardware(Self::OBJECT_TYPE, self.id, npu, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: u16, tc: u8) -> MapEntry {
        MapEntry {
            key: MapEntryKey::new(key),
            tc,
            ..MapEntry::default()
        }
    }

    #[test]
    fn test_entry_bookkeeping() {
        let mut map = QosMap::new(1, NpuSet::single(0), MapType::DscpToTc);
        map.put_entry(entry(0, 0));
        map.put_entry(entry(8, 1));
        assert_eq!(map.entry_count(), 2);
        assert!(map.dirty().contains(MapAttr::Entries));

        map.remove_entry(MapEntryKey::new(0));
        assert_eq!(map.entry_count(), 1);
        assert!(map.entry(MapEntryKey::new(8)).is_some());
    }

    #[test]
    fn test_entry_key_diff() {
        let mut a = QosMap::new(1, NpuSet::single(0), MapType::DscpToTc);
        let mut b = QosMap::new(1, NpuSet::single(0), MapType::DscpToTc);
        a.put_entry(entry(0, 0));
        a.put_entry(entry(8, 1));
        b.put_entry(entry(8, 1));

        assert_eq!(a.entry_keys_not_in(&b), vec![MapEntryKey::new(0)]);
        assert!(b.entry_keys_not_in(&a).is_empty());
    }
}
