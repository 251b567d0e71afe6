//! The generic commit protocol shared by every object type.
//!
//! Transaction handlers build (or clone) an object, mutate it, then drive
//! one of the routines below. The routines never touch the registry — on
//! failure the caller's stored copy stays authoritative and the scratch
//! copy is discarded.

use log::warn;
use nas_ndi::{NpuId, QosNdi};

use super::object::QosObject;
use crate::error::QosResult;

/// Previous-state record produced by a successful write, consumed by the
/// companion rollback operation to replay the inverse action.
#[derive(Debug, Clone)]
pub enum Snapshot<K, T> {
    /// A create succeeded; the inverse is deleting `key`.
    Created { key: K },
    /// A modify succeeded; the inverse restores `previous`.
    Modified { previous: T },
    /// A delete succeeded; the inverse re-creates `previous`.
    Deleted { previous: T },
}

/// Pushes a new object to every NPU that owns it, in fixed NPU order.
///
/// A failure on NPU `k` unwinds NPUs `1..k-1` before the error is
/// surfaced; unwind failures are logged and swallowed since we are already
/// propagating the original error. On success the returned handles are in
/// the object's handle map and its dirty set is cleared.
pub fn commit_create<T: QosObject>(obj: &mut T, ndi: &dyn QosNdi) -> QosResult<()> {
    let npus: Vec<NpuId> = obj.npu_list().iter().collect();
    let mut programmed: Vec<NpuId> = Vec::with_capacity(npus.len());

    for npu in npus {
        match obj.push_create(ndi, npu) {
            Ok(handle) => {
                obj.handles_mut().insert(npu, handle);
                programmed.push(npu);
            }
            Err(err) => {
                for done in programmed {
                    if let Err(cleanup_err) = obj.push_delete(ndi, done) {
                        warn!(
                            "{} {}: cleanup delete failed on npu {} while unwinding create: {}",
                            T::OBJECT_TYPE,
                            obj.key_string(),
                            done,
                            cleanup_err
                        );
                    }
                    obj.handles_mut().remove(done);
                }
                return Err(err);
            }
        }
    }

    obj.dirty_mut().clear();
    Ok(())
}

/// Pushes every dirty leaf attribute to every NPU that owns the object.
///
/// Non-leaf attributes are skipped; the type's own handler coordinates
/// those before calling this routine. Any push failure propagates
/// immediately — the caller discards the scratch copy, so the previously
/// committed state stays authoritative.
pub fn commit_modify<T: QosObject>(obj: &mut T, ndi: &dyn QosNdi) -> QosResult<()> {
    let attrs: Vec<T::Attr> = obj.dirty().iter().collect();
    let npus: Vec<NpuId> = obj.npu_list().iter().collect();

    for attr in attrs {
        if !obj.is_leaf_attr(attr) {
            continue;
        }
        for &npu in &npus {
            obj.push_leaf_attr(ndi, attr, npu)?;
        }
    }

    obj.dirty_mut().clear();
    Ok(())
}

/// Removes the object from every NPU that owns it.
///
/// A failure leaves NPUs processed so far deleted and the object in the
/// registry; the caller decides whether to retry or roll back.
pub fn commit_delete<T: QosObject>(obj: &T, ndi: &dyn QosNdi) -> QosResult<()> {
    for npu in obj.npu_list().iter() {
        obj.push_delete(ndi, npu)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::object::{DirtySet, HandleMap, NpuSet};
    use crate::error::QosError;
    use nas_ndi::types::PolicerKind;
    use nas_ndi::mock::MockNdi;
    use nas_ndi::{NdiError, NdiStatus, PolicerNdiId};
    use std::cell::RefCell;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    enum TestAttr {
        A,
        B,
        NonLeaf,
    }

    struct TestObj {
        npus: NpuSet,
        dirty: DirtySet<TestAttr>,
        handles: HandleMap<PolicerKind>,
        fail_create_on: Option<NpuId>,
        log: RefCell<Vec<String>>,
    }

    impl TestObj {
        fn new(npus: &[NpuId]) -> Self {
            Self {
                npus: npus.iter().copied().collect(),
                dirty: DirtySet::new(),
                handles: HandleMap::new(),
                fail_create_on: None,
                log: RefCell::new(vec![]),
            }
        }
    }

    impl QosObject for TestObj {
        type Attr = TestAttr;
        type NdiKind = PolicerKind;

        const OBJECT_TYPE: &'static str = "test";

        fn key_string(&self) -> String {
            "k".to_string()
        }

        fn npu_list(&self) -> &NpuSet {
            &self.npus
        }

        fn dirty(&self) -> &DirtySet<TestAttr> {
            &self.dirty
        }

        fn dirty_mut(&mut self) -> &mut DirtySet<TestAttr> {
            &mut self.dirty
        }

        fn handles(&self) -> &HandleMap<PolicerKind> {
            &self.handles
        }

        fn handles_mut(&mut self) -> &mut HandleMap<PolicerKind> {
            &mut self.handles
        }

        fn is_leaf_attr(&self, attr: TestAttr) -> bool {
            attr != TestAttr::NonLeaf
        }

        fn push_create(&self, _ndi: &dyn QosNdi, npu: NpuId) -> QosResult<PolicerNdiId> {
            if self.fail_create_on == Some(npu) {
                return Err(QosError::hardware(
                    "test",
                    "k",
                    npu,
                    NdiError::from_status(NdiStatus::TableFull),
                ));
            }
            self.log.borrow_mut().push(format!("create:{}", npu));
            Ok(PolicerNdiId::from_raw_unchecked(0x1000 + npu as u64))
        }

        fn push_leaf_attr(&self, _ndi: &dyn QosNdi, attr: TestAttr, npu: NpuId) -> QosResult<()> {
            self.log.borrow_mut().push(format!("set:{:?}:{}", attr, npu));
            Ok(())
        }

        fn push_delete(&self, _ndi: &dyn QosNdi, npu: NpuId) -> QosResult<()> {
            self.log.borrow_mut().push(format!("delete:{}", npu));
            Ok(())
        }
    }

    #[test]
    fn test_create_pushes_all_npus_in_order() {
        let mut obj = TestObj::new(&[2, 0, 1]);
        commit_create(&mut obj, &MockNdi::new()).unwrap();

        assert_eq!(
            *obj.log.borrow(),
            vec!["create:0", "create:1", "create:2"]
        );
        assert!(obj.handles.contains(0));
        assert!(obj.handles.contains(2));
    }

    #[test]
    fn test_create_failure_unwinds_programmed_npus() {
        let mut obj = TestObj::new(&[0, 1, 2]);
        obj.fail_create_on = Some(2);

        let err = commit_create(&mut obj, &MockNdi::new()).unwrap_err();
        assert!(matches!(err, QosError::Hardware { npu: 2, .. }));

        // NPUs 0 and 1 were programmed and must have been deleted again.
        let log = obj.log.borrow();
        assert!(log.contains(&"delete:0".to_string()));
        assert!(log.contains(&"delete:1".to_string()));
        assert!(obj.handles.is_empty());
    }

    #[test]
    fn test_modify_pushes_only_dirty_leaf_attrs() {
        let mut obj = TestObj::new(&[0, 1]);
        obj.dirty.mark(TestAttr::B);
        obj.dirty.mark(TestAttr::A);
        obj.dirty.mark(TestAttr::NonLeaf);

        commit_modify(&mut obj, &MockNdi::new()).unwrap();

        // attrs in dirty-set order, each fanned out across NPUs
        let log = obj.log.borrow().clone();
        assert_eq!(log, vec!["set:A:0", "set:A:1", "set:B:0", "set:B:1"]);
        assert!(obj.dirty.is_empty());
    }

    #[test]
    fn test_delete_pushes_all_npus() {
        let mut obj = TestObj::new(&[0, 1]);
        commit_create(&mut obj, &MockNdi::new()).unwrap();
        obj.log.borrow_mut().clear();

        commit_delete(&obj, &MockNdi::new()).unwrap();
        assert_eq!(*obj.log.borrow(), vec!["delete:0", "delete:1"]);
    }
}
