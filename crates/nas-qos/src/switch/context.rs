//! The process-wide QoS context: injected collaborators plus the lazily
//! populated switch directory.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{info, warn};
use nas_ndi::{IfIndex, NdiPort, NpuId, QosNdi, QueuePartition, SwitchId};

use super::registry::QosSwitch;
use crate::config::QosConfig;
use crate::error::{QosError, QosResult};

/// The topology inventory collaborator: which NPUs exist, which switch
/// owns them, and which NPU owns a front-panel port.
pub trait TopologyInventory: Send + Sync {
    /// Member NPUs of a switch, or `None` if the switch id is unknown.
    fn switch_npus(&self, switch_id: SwitchId) -> Option<Vec<NpuId>>;

    /// Owning switch of an NPU.
    fn npu_switch(&self, npu: NpuId) -> Option<SwitchId>;

    /// The NPU-local addressing of a front-panel port.
    fn port_owner(&self, port: IfIndex) -> Option<NdiPort>;
}

/// Explicitly owned root of the QoS subsystem.
///
/// Holds the configuration, the injected driver and topology collaborators,
/// and the switch-id → registry cache. Registries are constructed on first
/// access from the topology inventory; switch-wide queue-partition
/// constants are fetched from the hardware layer once at that point.
pub struct QosContext {
    config: QosConfig,
    ndi: Arc<dyn QosNdi>,
    topology: Arc<dyn TopologyInventory>,
    switches: Mutex<HashMap<SwitchId, Arc<QosSwitch>>>,
}

impl QosContext {
    pub fn new(
        config: QosConfig,
        ndi: Arc<dyn QosNdi>,
        topology: Arc<dyn TopologyInventory>,
    ) -> Self {
        Self {
            config,
            ndi,
            topology,
            switches: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &QosConfig {
        &self.config
    }

    pub fn ndi(&self) -> &dyn QosNdi {
        self.ndi.as_ref()
    }

    pub fn topology(&self) -> &dyn TopologyInventory {
        self.topology.as_ref()
    }

    /// The registry for a switch, constructing it on first access.
    pub fn get_switch(&self, switch_id: SwitchId) -> QosResult<Arc<QosSwitch>> {
        let mut switches = self.switches.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = switches.get(&switch_id) {
            return Ok(existing.clone());
        }

        let npus = self
            .topology
            .switch_npus(switch_id)
            .ok_or_else(|| QosError::not_found("switch", switch_id))?;

        let partition = match npus.first() {
            Some(&npu) => self.ndi.queue_partition(npu).map_err(|e| {
                QosError::hardware("switch", switch_id, npu, e)
            })?,
            None => {
                warn!("switch {}: no member NPUs, using empty queue partition", switch_id);
                QueuePartition::default()
            }
        };

        info!(
            "switch {}: initializing QoS registry with {} NPU(s)",
            switch_id,
            npus.len()
        );
        let switch = Arc::new(QosSwitch::new(
            switch_id,
            npus.into_iter().collect(),
            partition,
            &self.config,
        ));
        switches.insert(switch_id, switch.clone());
        Ok(switch)
    }

    /// The registry of the switch owning an NPU.
    pub fn switch_for_npu(&self, npu: NpuId) -> QosResult<Arc<QosSwitch>> {
        let switch_id = self
            .topology
            .npu_switch(npu)
            .ok_or_else(|| QosError::not_found("npu", npu))?;
        self.get_switch(switch_id)
    }

    /// The registry owning a front-panel port, plus the port's NPU-local
    /// addressing.
    pub fn switch_for_port(&self, port: IfIndex) -> QosResult<(Arc<QosSwitch>, NdiPort)> {
        let ndi_port = self
            .topology
            .port_owner(port)
            .ok_or_else(|| QosError::not_found("port", port))?;
        let switch = self.switch_for_npu(ndi_port.npu)?;
        Ok((switch, ndi_port))
    }

    /// Drops a switch registry. Returns true if it existed.
    pub fn remove_switch(&self, switch_id: SwitchId) -> bool {
        let mut switches = self.switches.lock().unwrap_or_else(|e| e.into_inner());
        switches.remove(&switch_id).is_some()
    }

    /// Number of materialized switch registries.
    pub fn switch_count(&self) -> usize {
        self.switches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestTopology;
    use nas_ndi::mock::MockNdi;

    fn test_ctx() -> QosContext {
        QosContext::new(
            QosConfig::default(),
            Arc::new(MockNdi::new()),
            Arc::new(TestTopology),
        )
    }

    #[test]
    fn test_lazy_switch_construction() {
        let ctx = test_ctx();
        assert_eq!(ctx.switch_count(), 0);

        let switch = ctx.get_switch(0).unwrap();
        assert_eq!(ctx.switch_count(), 1);
        assert_eq!(switch.npus().len(), 2);
        assert_eq!(switch.partition().ucast_per_port, 8);

        // second access is a cache hit
        let again = ctx.get_switch(0).unwrap();
        assert!(Arc::ptr_eq(&switch, &again));
    }

    #[test]
    fn test_unknown_switch_rejected() {
        let ctx = test_ctx();
        assert!(matches!(
            ctx.get_switch(9),
            Err(QosError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn test_switch_for_npu_and_port() {
        let ctx = test_ctx();
        let switch = ctx.switch_for_npu(1).unwrap();
        assert_eq!(switch.id(), 0);

        let (switch, ndi_port) = ctx.switch_for_port(40).unwrap();
        assert_eq!(switch.id(), 0);
        assert_eq!(ndi_port, NdiPort { npu: 1, port: 8 });

        assert!(ctx.switch_for_port(99).is_err());
    }

    #[test]
    fn test_remove_switch() {
        let ctx = test_ctx();
        ctx.get_switch(0).unwrap();
        assert!(ctx.remove_switch(0));
        assert!(!ctx.remove_switch(0));
        assert_eq!(ctx.switch_count(), 0);
    }
}
