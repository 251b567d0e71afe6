//! Shared fixtures for the unit-test suites.

use std::sync::Arc;

use nas_ndi::mock::MockNdi;
use nas_ndi::{IfIndex, NdiPort, NpuId, SwitchId};

use crate::config::QosConfig;
use crate::switch::{QosContext, TopologyInventory};

/// The switch id every fixture uses.
pub(crate) const SWITCH: SwitchId = 0;

/// Fixed-shape topology: one switch 0 with NPUs 0 and 1; ports 1..=32 on
/// NPU 0, 33..=64 on NPU 1.
pub(crate) struct TestTopology;

impl TopologyInventory for TestTopology {
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

/// A context over the mock driver and the fixed topology.
pub(crate) fn test_context() -> (Arc<QosContext>, Arc<MockNdi>) {
    let mock = Arc::new(MockNdi::new());
    let ctx = Arc::new(QosContext::new(
        QosConfig::default(),
        mock.clone(),
        Arc::new(TestTopology),
    ));
    (ctx, mock)
}
