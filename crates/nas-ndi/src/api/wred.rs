//! WRED profile attribute definitions for the driver surface.

/// WRED profile configuration, one threshold set per packet color.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WredCfg {
    pub green_enable: bool,
    pub green_min_threshold: Option<u32>,
    pub green_max_threshold: Option<u32>,
    pub green_drop_probability: Option<u8>,
    pub yellow_enable: bool,
    pub yellow_min_threshold: Option<u32>,
    pub yellow_max_threshold: Option<u32>,
    pub yellow_drop_probability: Option<u8>,
    pub red_enable: bool,
    pub red_min_threshold: Option<u32>,
    pub red_max_threshold: Option<u32>,
    pub red_drop_probability: Option<u8>,
    /// Queue-average weighting factor.
    pub weight: u8,
    /// Mark with ECN instead of dropping.
    pub ecn_enable: bool,
}

/// WRED attribute ids, shared with the dirty-tracking layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WredAttr {
    GreenEnable,
    GreenMinThreshold,
    GreenMaxThreshold,
    GreenDropProbability,
    YellowEnable,
    YellowMinThreshold,
    YellowMaxThreshold,
    YellowDropProbability,
    RedEnable,
    RedMinThreshold,
    RedMaxThreshold,
    RedDropProbability,
    Weight,
    EcnEnable,
}
