//! Integration tests driving the QoS object model end to end against the
//! mock NDI driver.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use nas_ndi::mock::MockNdi;
use nas_ndi::{
    BufferPoolType, IfIndex, MapEntry, MapEntryKey, MapType, NdiPort, NpuId, SwitchId,
};
use nas_qos::buffer::{BufferOrch, BufferPoolReq};
use nas_qos::map::MapOrch;
use nas_qos::sched_group::{SchedGroupOrch, SchedGroupReq};
use nas_qos::{QosConfig, QosContext, QosError, TopologyInventory};

const SWITCH: SwitchId = 0;

/// One switch with two NPUs; ports 1..=32 on NPU 0, 33..=64 on NPU 1.
struct Topology;

impl TopologyInventory for Topology {
    fn switch_npus(&self, switch_id: SwitchId) -> Option<Vec<NpuId>> {
        (switch_id == SWITCH).then(|| vec![0, 1])
    }

    fn npu_switch(&self, npu: NpuId) -> Option<SwitchId> {
        (npu < 2).then_some(SWITCH)
    }

    fn port_owner(&self, port: IfIndex) -> Option<NdiPort> {
        match port {
            1..=32 => Some(NdiPort { npu: 0, port }),
            33..=64 => Some(NdiPort {
                npu: 1,
                port: port - 32,
            }),
            _ => None,
        }
    }
}

fn setup() -> (Arc<QosContext>, Arc<MockNdi>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mock = Arc::new(MockNdi::new());
    let ctx = Arc::new(QosContext::new(
        QosConfig::default(),
        mock.clone(),
        Arc::new(Topology),
    ));
    (ctx, mock)
}

/// Scenario A: buffer pool create round trip — a fresh id in range, the
/// requested size visible on read-back, both NPUs programmed.
#[test]
fn test_buffer_pool_create_round_trip() {
    let (ctx, mock) = setup();
    let orch = BufferOrch::new(ctx);

    let id = orch
        .create_pool(
            SWITCH,
            &BufferPoolReq {
                pool_type: Some(BufferPoolType::Egress),
                size: Some(12 << 20),
                ..BufferPoolReq::default()
            },
        )
        .unwrap();
    assert!(id >= 1 && id < 32);

    let pool = orch.get_pool(SWITCH, id).unwrap();
    assert_eq!(pool.cfg().size, 12 << 20);
    assert_eq!(mock.object_count(0), 1);
    assert_eq!(mock.object_count(1), 1);

    // delete restores the registry and the pool state
    orch.delete_pool(SWITCH, id).unwrap();
    assert_eq!(mock.object_count(0), 0);
    let id_again = orch
        .create_pool(
            SWITCH,
            &BufferPoolReq {
                pool_type: Some(BufferPoolType::Egress),
                size: Some(1 << 20),
                ..BufferPoolReq::default()
            },
        )
        .unwrap();
    assert_eq!(id_again, id);
}

/// Scenario B: a level-1 scheduler group is adopted through the attached
/// root's child-list edit and ends up pointing back at the root.
#[test]
fn test_sched_group_attach_through_parent() {
    let (ctx, _mock) = setup();
    let orch = SchedGroupOrch::new(ctx);

    let root = orch
        .create(
            SWITCH,
            &SchedGroupReq {
                port_id: Some(1),
                level: Some(0),
                ..SchedGroupReq::default()
            },
        )
        .unwrap();
    assert!(orch.get(SWITCH, root).unwrap().is_attached());

    let child = orch
        .create(
            SWITCH,
            &SchedGroupReq {
                port_id: Some(1),
                level: Some(1),
                ..SchedGroupReq::default()
            },
        )
        .unwrap();

    orch.modify(
        SWITCH,
        root,
        &SchedGroupReq {
            child_list: Some(vec![child]),
            ..SchedGroupReq::default()
        },
    )
    .unwrap();

    assert_eq!(orch.get(SWITCH, child).unwrap().parent_id(), Some(root));
}

/// Scenario C: a map entry referencing a nonexistent map fails before any
/// hardware call and leaves the registry unchanged.
#[test]
fn test_map_entry_with_dangling_map_id() {
    let (ctx, mock) = setup();
    let orch = MapOrch::new(ctx);

    let err = orch
        .set_entry(
            SWITCH,
            77,
            MapEntry {
                key: MapEntryKey::new(0),
                tc: 1,
                ..MapEntry::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, QosError::KeyNotFound { .. }));
    assert!(mock.calls().is_empty());
    assert!(matches!(
        orch.get(SWITCH, 77),
        Err(QosError::KeyNotFound { .. })
    ));
}

/// A multi-NPU create that fails on the second NPU leaves no residue on
/// the first: the partially-applied object is unwound before the error
/// surfaces, and the allocated id goes back to the pool.
#[test]
fn test_partial_create_unwinds_across_npus() {
    let (ctx, mock) = setup();
    let orch = MapOrch::new(ctx);

    mock.fail_nth("create_map", 1, 1);
    let err = orch
        .create(
            SWITCH,
            &nas_qos::map::MapReq {
                map_type: Some(MapType::DscpToTc),
                entries: vec![],
            },
        )
        .unwrap_err();
    assert!(matches!(err, QosError::Hardware { npu: 1, .. }));
    assert_eq!(mock.object_count(0), 0);
    assert_eq!(mock.object_count(1), 0);

    let id = orch
        .create(
            SWITCH,
            &nas_qos::map::MapReq {
                map_type: Some(MapType::DscpToTc),
                entries: vec![],
            },
        )
        .unwrap();
    assert_eq!(id, 1); // released id reused
}

/// Lazy discovery of a port's default tree: queues, scheduler groups, and
/// both directions of every parent/child relationship.
#[test]
fn test_port_tree_discovery() {
    let (ctx, mock) = setup();
    let port = NdiPort { npu: 0, port: 2 };

    // hardware boots with queues and a three-level default tree
    let queues = mock.provision_port_queues(port);
    let leaf_a = mock.provision_sched_group(port, 2, 0, &queues[0..4]);
    let leaf_b = mock.provision_sched_group(port, 2, 0, &queues[4..8]);
    let root = mock.provision_sched_group(port, 0, 0, &[]);
    let _mid = mock.provision_sched_group(port, 1, root, &[leaf_a, leaf_b]);

    let orch = SchedGroupOrch::new(ctx.clone());
    let added = orch.init_port(2).unwrap();
    assert_eq!(added, 4);

    // the discovered leaf groups adopted their hardware child queues
    let level2 = orch.get_port_sched_groups(2, Some(2)).unwrap();
    assert_eq!(level2.len(), 2);
    let total_children: usize = level2.iter().map(|sg| sg.child_count()).sum();
    assert_eq!(total_children, 8);

    let queue_orch = nas_qos::QueueOrch::new(ctx);
    let attached = queue_orch
        .get_port_queues(2)
        .unwrap()
        .iter()
        .filter(|q| q.is_attached())
        .count();
    assert_eq!(attached, 8);
}
