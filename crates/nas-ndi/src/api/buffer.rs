//! Buffer pool and buffer profile definitions for the driver surface.

use crate::types::RawNdiObjectId;

/// Direction a buffer pool serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BufferPoolType {
    Ingress,
    Egress,
}

impl BufferPoolType {
    /// Parses a pool type string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "INGRESS" => Some(Self::Ingress),
            "EGRESS" => Some(Self::Egress),
            _ => None,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingress => "INGRESS",
            Self::Egress => "EGRESS",
        }
    }
}

/// How shared-buffer headroom is accounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ThresholdMode {
    Static,
    Dynamic,
}

/// Buffer pool configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferPoolCfg {
    pub pool_type: BufferPoolType,
    /// Total pool size in bytes.
    pub size: u64,
    pub threshold_mode: ThresholdMode,
}

impl Default for BufferPoolCfg {
    fn default() -> Self {
        Self {
            pool_type: BufferPoolType::Ingress,
            size: 0,
            threshold_mode: ThresholdMode::Dynamic,
        }
    }
}

/// Buffer pool attribute ids, shared with the dirty-tracking layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BufferPoolAttr {
    PoolType,
    Size,
    ThresholdMode,
}

/// Buffer profile configuration as the driver consumes it.
///
/// `pool_id` is the NDI handle of the owning pool on the target NPU; the
/// object-model layer resolves its own pool id to this handle at push time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferProfileCfg {
    pub pool_id: RawNdiObjectId,
    /// Reserved buffer size in bytes.
    pub buffer_size: u64,
    /// Dynamic threshold for shared usage (1/2^n of the available pool).
    pub shared_dynamic_th: Option<u8>,
    /// Static threshold for shared usage in bytes.
    pub shared_static_th: Option<u64>,
    /// XOFF threshold in bytes.
    pub xoff_th: u64,
    /// XON threshold in bytes.
    pub xon_th: u64,
}

/// Buffer profile attribute ids, shared with the dirty-tracking layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BufferProfileAttr {
    PoolId,
    BufferSize,
    SharedDynamicTh,
    SharedStaticTh,
    XoffTh,
    XonTh,
}
