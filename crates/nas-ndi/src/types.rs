//! Type-safe NDI object id wrappers.
//!
//! Drivers hand back opaque 64-bit handles for every object they create on
//! an NPU. This module wraps those handles in a phantom-typed id so that
//! handles of different object types cannot be mixed up at compile time.

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Raw NDI object id as the driver reports it.
pub type RawNdiObjectId = u64;

/// One forwarding engine (NPU) within a switch.
pub type NpuId = u32;

/// Logical switch identifier from the topology inventory.
pub type SwitchId = u32;

/// Interface index of a front-panel port.
pub type IfIndex = u32;

/// A port addressed the way the driver sees it: NPU plus NPU-local port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NdiPort {
    pub npu: NpuId,
    pub port: u32,
}

/// Marker trait for NDI object kinds.
pub trait NdiObjectKind: Send + Sync + 'static {
    /// Returns the object type name for diagnostics.
    fn type_name() -> &'static str;
}

/// A type-safe NDI object id.
///
/// The phantom parameter `K` records what kind of object the handle refers
/// to, so a `QueueNdiId` is a different type from a `SchedGroupNdiId` even
/// though both are 64-bit handles on the wire.
pub struct NdiObjectId<K: NdiObjectKind> {
    raw: RawNdiObjectId,
    _marker: PhantomData<K>,
}

impl<K: NdiObjectKind> Clone for NdiObjectId<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: NdiObjectKind> Copy for NdiObjectId<K> {}

impl<K: NdiObjectKind> NdiObjectId<K> {
    /// The null object id.
    pub const NULL: Self = Self {
        raw: 0,
        _marker: PhantomData,
    };

    /// Creates an object id from a raw value; `None` if the value is null.
    pub fn from_raw(raw: RawNdiObjectId) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self {
                raw,
                _marker: PhantomData,
            })
        }
    }

    /// Creates an object id from a raw value, null included.
    pub const fn from_raw_unchecked(raw: RawNdiObjectId) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Returns the raw handle value.
    pub const fn as_raw(&self) -> RawNdiObjectId {
        self.raw
    }

    /// Returns true if this is the null handle.
    pub const fn is_null(&self) -> bool {
        self.raw == 0
    }
}

impl<K: NdiObjectKind> fmt::Debug for NdiObjectId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:016x})", K::type_name(), self.raw)
    }
}

impl<K: NdiObjectKind> fmt::Display for NdiObjectId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.raw)
    }
}

impl<K: NdiObjectKind> PartialEq for NdiObjectId<K> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<K: NdiObjectKind> Eq for NdiObjectId<K> {}

impl<K: NdiObjectKind> PartialOrd for NdiObjectId<K> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: NdiObjectKind> Ord for NdiObjectId<K> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<K: NdiObjectKind> Hash for NdiObjectId<K> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<K: NdiObjectKind> Default for NdiObjectId<K> {
    fn default() -> Self {
        Self::NULL
    }
}

macro_rules! define_object_kind {
    ($name:ident, $type_name:literal, $id_alias:ident) => {
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl NdiObjectKind for $name {
            fn type_name() -> &'static str {
                $type_name
            }
        }

        pub type $id_alias = NdiObjectId<$name>;
    };
}

define_object_kind!(PolicerKind, "Policer", PolicerNdiId);
define_object_kind!(WredKind, "Wred", WredNdiId);
define_object_kind!(QueueKind, "Queue", QueueNdiId);
define_object_kind!(SchedulerKind, "Scheduler", SchedulerNdiId);
define_object_kind!(SchedGroupKind, "SchedGroup", SchedGroupNdiId);
define_object_kind!(MapKind, "Map", MapNdiId);
define_object_kind!(BufferPoolKind, "BufferPool", BufferPoolNdiId);
define_object_kind!(BufferProfileKind, "BufferProfile", BufferProfileNdiId);
define_object_kind!(PriorityGroupKind, "PriorityGroup", PriorityGroupNdiId);
define_object_kind!(PortKind, "Port", PortNdiId);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_id_creation() {
        let q = QueueNdiId::from_raw(0x10).unwrap();
        assert_eq!(q.as_raw(), 0x10);
        assert!(!q.is_null());
    }

    #[test]
    fn test_null_id() {
        assert!(QueueNdiId::from_raw(0).is_none());
        assert!(QueueNdiId::NULL.is_null());
        assert_eq!(QueueNdiId::default(), QueueNdiId::NULL);
    }

    #[test]
    fn test_id_debug() {
        let sg = SchedGroupNdiId::from_raw(0x2a).unwrap();
        let s = format!("{:?}", sg);
        assert!(s.contains("SchedGroup"));
        assert!(s.contains("0x000000000000002a"));
    }

    #[test]
    fn test_id_ordering() {
        let a = PolicerNdiId::from_raw_unchecked(1);
        let b = PolicerNdiId::from_raw_unchecked(2);
        assert!(a < b);
        assert_ne!(a, b);
    }
}
