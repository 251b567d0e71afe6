//! Map transaction handler.
//!
//! Entries are a sub-resource: `set_entry`/`del_entry` operate under the
//! owning map's id and fail with `KeyNotFound` before any hardware call if
//! that map does not exist.

use std::sync::{Arc, Mutex};

use log::warn;
use nas_ndi::{MapEntry, MapEntryKey, SwitchId};

use super::types::{validate_entry, MapReq, QosMap};
use crate::audit::{AuditCategory, AuditRecord};
use crate::audit_log;
use crate::base::{commit_create, commit_delete, ObjId, OrchStats, QosObject, Snapshot};
use crate::error::{QosError, QosResult};
use crate::switch::QosContext;

/// Previous-state record for map writes (entry edits included).
pub type MapSnapshot = Snapshot<ObjId, QosMap>;

/// Serialized create/delete/entry-edit/rollback for classification maps.
pub struct MapOrch {
    ctx: Arc<QosContext>,
    stats: Mutex<OrchStats>,
}

impl MapOrch {
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
        let mut record = AuditRecord::new(category, "MapOrch", action)
            .with_object_type("map")
            .with_object_id(key.to_string());
        if let Some(err) = err {
            record = record.with_error(err);
        }
        audit_log!(record);
    }

    /// Creates a map, pushing any entries carried by the request after the
    /// map object itself.
    pub fn create(&self, switch_id: SwitchId, req: &MapReq) -> QosResult<ObjId> {
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

    fn do_create(&self, switch_id: SwitchId, req: &MapReq) -> QosResult<ObjId> {
        let map_type = req
            .map_type
            .ok_or_else(|| QosError::missing_attribute("map", "map-type"))?;
        for entry in &req.entries {
            validate_entry(map_type, entry)?;
        }

        let switch = self.ctx.get_switch(switch_id)?;
        let mut maps = switch.maps();

        let id = maps.alloc_id()?;
        let mut map = QosMap::new(id, switch.npus().clone(), map_type);

        if let Err(err) = commit_create(&mut map, self.ctx.ndi()) {
            maps.release_id(id);
            return Err(err);
        }

        // install initial entries; unwind the whole create if any push fails
        for entry in &req.entries {
            map.put_entry(entry.clone());
        }
        let npus: Vec<_> = map.npu_list().iter().collect();
        for entry in &req.entries {
            for &npu in &npus {
                if let Err(err) = map.push_entry(self.ctx.ndi(), npu, entry) {
                    if let Err(cleanup_err) = commit_delete(&map, self.ctx.ndi()) {
                        warn!("map {}: cleanup delete failed while unwinding create: {}", id, cleanup_err);
                    }
                    maps.release_id(id);
                    return Err(err);
                }
            }
        }
        map.dirty_mut().clear();

        maps.insert(id, map)?;
        Ok(id)
    }

    /// Installs or overwrites one entry of an existing map.
    pub fn set_entry(
        &self,
        switch_id: SwitchId,
        map_id: ObjId,
        entry: MapEntry,
    ) -> QosResult<MapSnapshot> {
        let result = self.do_set_entry(switch_id, map_id, entry);
        match &result {
            Ok(_) => {
                self.count(|s| s.modified += 1);
                self.audit(AuditCategory::ResourceModify, "set-entry", map_id, None);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                self.audit(AuditCategory::ResourceModify, "set-entry", map_id, Some(err));
            }
        }
        result
    }

    fn do_set_entry(
        &self,
        switch_id: SwitchId,
        map_id: ObjId,
        entry: MapEntry,
    ) -> QosResult<MapSnapshot> {
        let switch = self.ctx.get_switch(switch_id)?;
        let mut maps = switch.maps();

        let current = maps
            .get(map_id)
            .ok_or_else(|| QosError::not_found("map", map_id))?;
        validate_entry(current.map_type(), &entry)?;
        let previous = current.clone();

        let mut scratch = current.clone();
        scratch.put_entry(entry.clone());
        for npu in scratch.npu_list().iter().collect::<Vec<_>>() {
            scratch.push_entry(self.ctx.ndi(), npu, &entry)?;
        }
        scratch.dirty_mut().clear();

        if let Some(stored) = maps.get_mut(map_id) {
            *stored = scratch;
        }
        Ok(Snapshot::Modified { previous })
    }

    /// Removes one entry of an existing map.
    pub fn del_entry(
        &self,
        switch_id: SwitchId,
        map_id: ObjId,
        key: MapEntryKey,
    ) -> QosResult<MapSnapshot> {
        let result = self.do_del_entry(switch_id, map_id, key);
        match &result {
            Ok(_) => {
                self.count(|s| s.modified += 1);
                self.audit(AuditCategory::ResourceModify, "del-entry", map_id, None);
            }
            Err(err) => {
                self.count(|s| s.errors += 1);
                self.audit(AuditCategory::ResourceModify, "del-entry", map_id, Some(err));
            }
        }
        result
    }

    fn do_del_entry(
        &self,
        switch_id: SwitchId,
        map_id: ObjId,
        key: MapEntryKey,
    ) -> QosResult<MapSnapshot> {
        let switch = self.ctx.get_switch(switch_id)?;
        let mut maps = switch.maps();

        let current = maps
            .get(map_id)
            .ok_or_else(|| QosError::not_found("map", map_id))?;
        if current.entry(key).is_none() {
            return Err(QosError::not_found("map-entry", key.as_raw()));
        }
        let previous = current.clone();

        let mut scratch = current.clone();
        scratch.remove_entry(key);
        for npu in scratch.npu_list().iter().collect::<Vec<_>>() {
            scratch.push_entry_delete(self.ctx.ndi(), npu, key)?;
        }
        scratch.dirty_mut().clear();

        if let Some(stored) = maps.get_mut(map_id) {
            *stored = scratch;
        }
        Ok(Snapshot::Modified { previous })
    }

    /// Deletes a map. A map still holding entries is refused.
    pub fn delete(&self, switch_id: SwitchId, id: ObjId) -> QosResult<MapSnapshot> {
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

    fn do_delete(&self, switch_id: SwitchId, id: ObjId) -> QosResult<MapSnapshot> {
        let switch = self.ctx.get_switch(switch_id)?;

        {
            let ingress = switch.port_ingress();
            let referenced = ingress.values().any(|p| {
                p.dot1p_to_tc_map == Some(id)
                    || p.dscp_to_tc_map == Some(id)
                    || p.tc_to_priority_group_map == Some(id)
            });
            if referenced {
                return Err(QosError::inconsistent(
                    "map",
                    id,
                    "still referenced by a port ingress profile",
                ));
            }
        }
        {
            let egress = switch.port_egress();
            let referenced = egress.values().any(|p| {
                p.tc_to_queue_map == Some(id)
                    || p.tc_to_dot1p_map == Some(id)
                    || p.tc_to_dscp_map == Some(id)
            });
            if referenced {
                return Err(QosError::inconsistent(
                    "map",
                    id,
                    "still referenced by a port egress profile",
                ));
            }
        }

        let mut maps = switch.maps();

        let map = maps
            .get(id)
            .ok_or_else(|| QosError::not_found("map", id))?;
        if map.entry_count() > 0 {
            return Err(QosError::inconsistent(
                "map",
                id,
                format!("still holds {} entries", map.entry_count()),
            ));
        }
        commit_delete(map, self.ctx.ndi())?;

        let previous = maps
            .remove(id)
            .ok_or_else(|| QosError::not_found("map", id))?;
        Ok(Snapshot::Deleted { previous })
    }

    pub fn get(&self, switch_id: SwitchId, id: ObjId) -> QosResult<QosMap> {
        let switch = self.ctx.get_switch(switch_id)?;
        let maps = switch.maps();
        maps.get(id)
            .cloned()
            .ok_or_else(|| QosError::not_found("map", id))
    }

    /// Replays the inverse of a previously-applied write. For entry edits
    /// the previous entry set is reconciled against the current one
    /// (removed keys re-added, added keys removed).
    pub fn rollback(&self, switch_id: SwitchId, snapshot: MapSnapshot) -> QosResult<()> {
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

    fn do_rollback(&self, switch_id: SwitchId, snapshot: MapSnapshot) -> QosResult<()> {
        match snapshot {
            Snapshot::Created { key } => {
                let switch = self.ctx.get_switch(switch_id)?;
                let mut maps = switch.maps();
                let map = match maps.get(key) {
                    Some(map) => map,
                    None => {
                        warn!("map {}: rollback of create found no entry", key);
                        return Ok(());
                    }
                };
                // entries go with the map object on the NPU
                commit_delete(map, self.ctx.ndi())?;
                maps.remove(key);
                Ok(())
            }
            Snapshot::Modified { previous } => {
                let switch = self.ctx.get_switch(switch_id)?;
                let mut maps = switch.maps();
                let id = previous.id();
                let current = maps
                    .get(id)
                    .ok_or_else(|| QosError::not_found("map", id))?;

                let added = current.entry_keys_not_in(&previous);
                let npus: Vec<_> = previous.npu_list().iter().collect();
                let mut restored = previous;
                for &npu in &npus {
                    for key in &added {
                        restored.push_entry_delete(self.ctx.ndi(), npu, *key)?;
                    }
                    for entry in restored.entries().cloned().collect::<Vec<_>>() {
                        restored.push_entry(self.ctx.ndi(), npu, &entry)?;
                    }
                }
                restored.dirty_mut().clear();
                if let Some(stored) = maps.get_mut(id) {
                    *stored = restored;
                }
                Ok(())
            }
            Snapshot::Deleted { previous } => {
                let switch = self.ctx.get_switch(switch_id)?;
                let mut maps = switch.maps();
                let id = previous.id();
                maps.reserve_id(id)?;
                let mut map = previous;
                if let Err(err) = commit_create(&mut map, self.ctx.ndi()) {
                    maps.release_id(id);
                    return Err(err);
                }
                if let Err(err) = maps.insert(id, map) {
                    maps.release_id(id);
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
    use nas_ndi::MapType;

    fn entry(key: u16, tc: u8) -> MapEntry {
        MapEntry {
            key: MapEntryKey::new(key),
            tc,
            ..MapEntry::default()
        }
    }

    #[test]
    fn test_create_with_entries() {
        let (ctx, _mock) = test_context();
        let orch = MapOrch::new(ctx);

        let id = orch
            .create(
                SWITCH,
                &MapReq {
                    map_type: Some(MapType::DscpToTc),
                    entries: vec![entry(0, 0), entry(8, 1)],
                },
            )
            .unwrap();

        let map = orch.get(SWITCH, id).unwrap();
        assert_eq!(map.map_type(), MapType::DscpToTc);
        assert_eq!(map.entry_count(), 2);
    }

    #[test]
    fn test_entry_on_missing_map_fails_before_hardware() {
        let (ctx, mock) = test_context();
        let orch = MapOrch::new(ctx);

        let err = orch.set_entry(SWITCH, 42, entry(0, 0)).unwrap_err();
        assert!(matches!(err, QosError::KeyNotFound { .. }));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_delete_with_entries_rejected() {
        let (ctx, _mock) = test_context();
        let orch = MapOrch::new(ctx);

        let id = orch
            .create(
                SWITCH,
                &MapReq {
                    map_type: Some(MapType::TcToQueue),
                    entries: vec![entry(1, 1)],
                },
            )
            .unwrap();

        assert!(matches!(
            orch.delete(SWITCH, id),
            Err(QosError::Inconsistent { .. })
        ));

        orch.del_entry(SWITCH, id, MapEntryKey::new(1)).unwrap();
        orch.delete(SWITCH, id).unwrap();
    }

    #[test]
    fn test_entry_value_range() {
        let (ctx, _mock) = test_context();
        let orch = MapOrch::new(ctx);

        let id = orch
            .create(
                SWITCH,
                &MapReq {
                    map_type: Some(MapType::DscpToTc),
                    entries: vec![],
                },
            )
            .unwrap();

        // dscp keys are 0..=63
        let err = orch.set_entry(SWITCH, id, entry(64, 0)).unwrap_err();
        assert!(matches!(err, QosError::AttributeValue { .. }));
        assert_eq!(orch.get(SWITCH, id).unwrap().entry_count(), 0);
    }

    #[test]
    fn test_entry_edit_rollback_reconciles() {
        let (ctx, _mock) = test_context();
        let orch = MapOrch::new(ctx);

        let id = orch
            .create(
                SWITCH,
                &MapReq {
                    map_type: Some(MapType::DscpToTc),
                    entries: vec![entry(0, 0)],
                },
            )
            .unwrap();

        let snapshot = orch.set_entry(SWITCH, id, entry(8, 1)).unwrap();
        assert_eq!(orch.get(SWITCH, id).unwrap().entry_count(), 2);

        orch.rollback(SWITCH, snapshot).unwrap();
        let map = orch.get(SWITCH, id).unwrap();
        assert_eq!(map.entry_count(), 1);
        assert!(map.entry(MapEntryKey::new(8)).is_none());
    }
}
