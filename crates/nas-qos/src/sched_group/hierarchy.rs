//! Child-list reconciliation for the scheduler-group tree.
//!
//! A child-list edit is the one non-leaf operation in the QoS model: it is
//! validated completely before any hardware call, pushed as bulk add/del
//! calls per NPU, and only then reflected into the affected objects'
//! parent pointers. Rolling an edit back is the same procedure run toward
//! the old list.

use std::collections::BTreeSet;

use log::{debug, warn};
use nas_ndi::{NpuId, QosNdi, RawNdiObjectId, SchedGroupNdiId};

use super::types::SchedGroup;
use crate::base::{ObjId, QosObject};
use crate::error::{QosError, QosResult};
use crate::queue::{Queue, QueueKey};
use crate::switch::{IdTable, PortTable};

const OBJECT_TYPE: &str = "sched-group";

/// Set difference between two child lists; order within either input is
/// irrelevant, outputs are ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChildDiff {
    pub add: Vec<ObjId>,
    pub del: Vec<ObjId>,
}

pub(crate) fn diff_child_lists(old: &[ObjId], new: &[ObjId]) -> ChildDiff {
    let old_set: BTreeSet<ObjId> = old.iter().copied().collect();
    let new_set: BTreeSet<ObjId> = new.iter().copied().collect();
    ChildDiff {
        add: new_set.difference(&old_set).copied().collect(),
        del: old_set.difference(&new_set).copied().collect(),
    }
}

/// What the validation pass collected about the parent node.
struct ParentInfo {
    port_id: u32,
    level: u32,
    max_child: u32,
    attached: bool,
    next_is_queue: bool,
    old_list: Vec<ObjId>,
    npus: Vec<NpuId>,
    handles: Vec<(NpuId, SchedGroupNdiId)>,
}

/// Reconciles a parent's child list against `new_list`.
///
/// All validation happens before the first driver call (all-or-nothing at
/// that stage). The bulk add/del pushes then run per NPU in fixed order;
/// a failure on NPU `k` reverse-applies the edit on NPUs already done
/// before the `HardwareError` is surfaced, leaving memory untouched.
pub(crate) fn apply_child_list(
    ndi: &dyn QosNdi,
    sched_groups: &mut IdTable<SchedGroup>,
    queues: &mut PortTable<QueueKey, Queue>,
    parent_id: ObjId,
    new_list: &[ObjId],
) -> QosResult<()> {
    let parent = collect_parent(sched_groups, parent_id)?;
    let diff = diff_child_lists(&parent.old_list, new_list);

    if diff.add.is_empty() && diff.del.is_empty() {
        if let Some(node) = sched_groups.get_mut(parent_id) {
            node.set_child_list(new_list.to_vec());
        }
        return Ok(());
    }

    if !diff.add.is_empty() && !parent.attached {
        return Err(QosError::inconsistent(
            OBJECT_TYPE,
            parent_id,
            "cannot adopt children while unattached",
        ));
    }

    let resulting = parent.old_list.len() - diff.del.len() + diff.add.len();
    if parent.max_child > 0 && resulting > parent.max_child as usize {
        return Err(QosError::exhausted(
            OBJECT_TYPE,
            format!(
                "fan-out {} exceeds hardware limit {}",
                resulting, parent.max_child
            ),
        ));
    }

    // validate both lists completely before any hardware call
    let add_handles = validate_add_list(sched_groups, queues, &parent, parent_id, &diff.add)?;
    let del_handles = validate_del_list(sched_groups, queues, &parent, parent_id, &diff.del)?;

    // removals first so a reparenting edit never transiently exceeds the
    // fan-out ceiling on the NPU
    let mut done: Vec<NpuId> = Vec::with_capacity(parent.npus.len());
    for &(npu, handle) in &parent.handles {
        let result = push_edit(
            ndi,
            npu,
            handle,
            &raw_for(&del_handles, npu),
            &raw_for(&add_handles, npu),
        );
        if let Err(err) = result {
            for &prev in done.iter().rev() {
                let prev_handle = parent
                    .handles
                    .iter()
                    .find(|(n, _)| *n == prev)
                    .map(|(_, h)| *h);
                if let Some(prev_handle) = prev_handle {
                    if let Err(undo_err) = push_edit(
                        ndi,
                        prev,
                        prev_handle,
                        &raw_for(&add_handles, prev),
                        &raw_for(&del_handles, prev),
                    ) {
                        warn!(
                            "sched-group {}: reverse edit failed on npu {} while unwinding: {}",
                            parent_id, prev, undo_err
                        );
                    }
                }
            }
            return Err(QosError::hardware(OBJECT_TYPE, parent_id, npu, err));
        }
        done.push(npu);
    }

    // hardware accepted the edit everywhere; sync the derived state
    for &child in &diff.add {
        if parent.next_is_queue {
            if let Some(queue) = queues.get_mut_by_obj_id(child) {
                queue.attach(parent_id);
            }
        } else if let Some(node) = sched_groups.get_mut(child) {
            node.set_parent(parent_id);
        }
    }
    for &child in &diff.del {
        if parent.next_is_queue {
            if let Some(queue) = queues.get_mut_by_obj_id(child) {
                queue.detach();
            }
        } else if let Some(node) = sched_groups.get_mut(child) {
            node.clear_parent();
        }
    }
    if let Some(node) = sched_groups.get_mut(parent_id) {
        node.set_child_list(new_list.to_vec());
    }

    debug!(
        "sched-group {}: child list now {} entries (+{} -{})",
        parent_id,
        new_list.len(),
        diff.add.len(),
        diff.del.len()
    );
    Ok(())
}

fn collect_parent(sched_groups: &IdTable<SchedGroup>, parent_id: ObjId) -> QosResult<ParentInfo> {
    let parent = sched_groups
        .get(parent_id)
        .ok_or_else(|| QosError::not_found(OBJECT_TYPE, parent_id))?;
    let npus: Vec<NpuId> = parent.npu_list().iter().collect();
    let mut handles = Vec::with_capacity(npus.len());
    for &npu in &npus {
        let handle = parent.handles().get(npu).ok_or_else(|| {
            QosError::inconsistent(
                OBJECT_TYPE,
                parent_id,
                format!("no hardware handle for npu {}", npu),
            )
        })?;
        handles.push((npu, handle));
    }
    Ok(ParentInfo {
        port_id: parent.port_id(),
        level: parent.level(),
        max_child: parent.max_child(),
        attached: parent.is_attached(),
        next_is_queue: parent.next_level_is_queue(),
        old_list: parent.child_list().to_vec(),
        npus,
        handles,
    })
}

/// Per-child raw handles, one entry per (npu, raw id).
type ChildHandles = Vec<(NpuId, RawNdiObjectId)>;

fn validate_add_list(
    sched_groups: &IdTable<SchedGroup>,
    queues: &PortTable<QueueKey, Queue>,
    parent: &ParentInfo,
    parent_id: ObjId,
    add: &[ObjId],
) -> QosResult<ChildHandles> {
    let mut raw = Vec::new();
    for &child in add {
        if parent.next_is_queue {
            let queue = queues.get_by_obj_id(child).ok_or_else(|| {
                QosError::inconsistent(
                    OBJECT_TYPE,
                    parent_id,
                    format!("child queue 0x{:x} does not exist", child),
                )
            })?;
            if queue.key().port_id != parent.port_id {
                return Err(QosError::inconsistent(
                    OBJECT_TYPE,
                    parent_id,
                    format!("child queue 0x{:x} belongs to another port", child),
                ));
            }
            if let Some(other) = queue.parent_id() {
                return Err(QosError::inconsistent(
                    OBJECT_TYPE,
                    parent_id,
                    format!("child queue 0x{:x} already attached to 0x{:x}", child, other),
                ));
            }
            for &npu in &parent.npus {
                let handle = queue.handles().get(npu).ok_or_else(|| {
                    QosError::inconsistent(
                        OBJECT_TYPE,
                        parent_id,
                        format!("child queue 0x{:x} has no handle on npu {}", child, npu),
                    )
                })?;
                raw.push((npu, handle.as_raw()));
            }
        } else {
            let node = sched_groups.get(child).ok_or_else(|| {
                QosError::inconsistent(
                    OBJECT_TYPE,
                    parent_id,
                    format!("child sched-group 0x{:x} does not exist", child),
                )
            })?;
            if node.port_id() != parent.port_id {
                return Err(QosError::inconsistent(
                    OBJECT_TYPE,
                    parent_id,
                    format!("child sched-group 0x{:x} belongs to another port", child),
                ));
            }
            if node.level() != parent.level + 1 {
                return Err(QosError::inconsistent(
                    OBJECT_TYPE,
                    parent_id,
                    format!(
                        "child sched-group 0x{:x} is level {}, expected {}",
                        child,
                        node.level(),
                        parent.level + 1
                    ),
                ));
            }
            if let Some(other) = node.parent_id() {
                return Err(QosError::inconsistent(
                    OBJECT_TYPE,
                    parent_id,
                    format!(
                        "child sched-group 0x{:x} already attached to 0x{:x}",
                        child, other
                    ),
                ));
            }
            for &npu in &parent.npus {
                let handle = node.handles().get(npu).ok_or_else(|| {
                    QosError::inconsistent(
                        OBJECT_TYPE,
                        parent_id,
                        format!("child sched-group 0x{:x} has no handle on npu {}", child, npu),
                    )
                })?;
                raw.push((npu, handle.as_raw()));
            }
        }
    }
    Ok(raw)
}

fn validate_del_list(
    sched_groups: &IdTable<SchedGroup>,
    queues: &PortTable<QueueKey, Queue>,
    parent: &ParentInfo,
    parent_id: ObjId,
    del: &[ObjId],
) -> QosResult<ChildHandles> {
    let mut raw = Vec::new();
    for &child in del {
        if parent.next_is_queue {
            let queue = queues.get_by_obj_id(child).ok_or_else(|| {
                QosError::inconsistent(
                    OBJECT_TYPE,
                    parent_id,
                    format!("child queue 0x{:x} does not exist", child),
                )
            })?;
            if queue.parent_id() != Some(parent_id) {
                return Err(QosError::inconsistent(
                    OBJECT_TYPE,
                    parent_id,
                    format!("child queue 0x{:x} is not attached to this parent", child),
                ));
            }
            for &npu in &parent.npus {
                let handle = queue.handles().get(npu).ok_or_else(|| {
                    QosError::inconsistent(
                        OBJECT_TYPE,
                        parent_id,
                        format!("child queue 0x{:x} has no handle on npu {}", child, npu),
                    )
                })?;
                raw.push((npu, handle.as_raw()));
            }
        } else {
            let node = sched_groups.get(child).ok_or_else(|| {
                QosError::inconsistent(
                    OBJECT_TYPE,
                    parent_id,
                    format!("child sched-group 0x{:x} does not exist", child),
                )
            })?;
            if node.parent_id() != Some(parent_id) {
                return Err(QosError::inconsistent(
                    OBJECT_TYPE,
                    parent_id,
                    format!(
                        "child sched-group 0x{:x} is not attached to this parent",
                        child
                    ),
                ));
            }
            if node.child_count() > 0 {
                return Err(QosError::inconsistent(
                    OBJECT_TYPE,
                    parent_id,
                    format!(
                        "child sched-group 0x{:x} still has {} children",
                        child,
                        node.child_count()
                    ),
                ));
            }
            for &npu in &parent.npus {
                let handle = node.handles().get(npu).ok_or_else(|| {
                    QosError::inconsistent(
                        OBJECT_TYPE,
                        parent_id,
                        format!("child sched-group 0x{:x} has no handle on npu {}", child, npu),
                    )
                })?;
                raw.push((npu, handle.as_raw()));
            }
        }
    }
    Ok(raw)
}

fn raw_for(handles: &ChildHandles, npu: NpuId) -> Vec<RawNdiObjectId> {
    handles
        .iter()
        .filter(|(n, _)| *n == npu)
        .map(|(_, raw)| *raw)
        .collect()
}

/// One NPU's worth of a child-list edit: del-list first, then add-list.
fn push_edit(
    ndi: &dyn QosNdi,
    npu: NpuId,
    parent: SchedGroupNdiId,
    del: &[RawNdiObjectId],
    add: &[RawNdiObjectId],
) -> Result<(), nas_ndi::NdiError> {
    if !del.is_empty() {
        ndi.sched_group_remove_children(npu, parent, del)?;
    }
    if !add.is_empty() {
        ndi.sched_group_add_children(npu, parent, add)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_is_set_difference() {
        let diff = diff_child_lists(&[1, 2, 3], &[2, 3, 4]);
        assert_eq!(diff.add, vec![4]);
        assert_eq!(diff.del, vec![1]);

        // order-independent
        let diff = diff_child_lists(&[3, 1, 2], &[4, 3, 2]);
        assert_eq!(diff.add, vec![4]);
        assert_eq!(diff.del, vec![1]);
    }

    #[test]
    fn test_diff_empty_on_reorder() {
        let diff = diff_child_lists(&[1, 2, 3], &[3, 2, 1]);
        assert!(diff.add.is_empty());
        assert!(diff.del.is_empty());
    }
}
