//! QoS engine configuration.

use serde::Deserialize;

/// Per-type id-pool maxima and hierarchy limits.
///
/// Defaults match the shipping platform limits; platforms with different
/// silicon capacities override individual fields through whatever
/// configuration source hosts this subsystem.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QosConfig {
    pub policer_id_max: u64,
    pub wred_id_max: u64,
    pub queue_id_max: u64,
    pub scheduler_id_max: u64,
    pub sched_group_id_max: u64,
    pub map_id_max: u64,
    pub buffer_pool_id_max: u64,
    pub buffer_profile_id_max: u64,
    pub priority_group_id_max: u64,
    /// Depth of the port scheduling tree, root (level 0) included.
    pub max_sched_levels: u32,
}

impl Default for QosConfig {
    fn default() -> Self {
        Self {
            policer_id_max: 500,
            wred_id_max: 500,
            queue_id_max: 0xFFFF,
            scheduler_id_max: 0xFFFF,
            sched_group_id_max: 0xFFFF,
            map_id_max: 1000,
            buffer_pool_id_max: 32,
            buffer_profile_id_max: 256,
            priority_group_id_max: 0x7FFF,
            max_sched_levels: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = QosConfig::default();
        assert_eq!(cfg.buffer_pool_id_max, 32);
        assert_eq!(cfg.max_sched_levels, 4);
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let cfg: QosConfig = serde_json::from_str(r#"{"buffer_pool_id_max": 8}"#).unwrap();
        assert_eq!(cfg.buffer_pool_id_max, 8);
        assert_eq!(cfg.policer_id_max, 500);
    }
}
