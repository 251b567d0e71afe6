//! QoS map and map-entry definitions for the driver surface.

/// Packet color assigned by classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PacketColor {
    #[default]
    Green,
    Yellow,
    Red,
}

/// Kind of classification map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapType {
    DscpToTc,
    DscpToColor,
    Dot1pToTc,
    Dot1pToColor,
    TcToQueue,
    TcToDscp,
    TcToDot1p,
    TcToPriorityGroup,
    PriorityGroupToPfcPriority,
    PfcPriorityToQueue,
}

impl MapType {
    /// Parses a map type string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DSCP_TO_TC" => Some(Self::DscpToTc),
            "DSCP_TO_COLOR" => Some(Self::DscpToColor),
            "DOT1P_TO_TC" => Some(Self::Dot1pToTc),
            "DOT1P_TO_COLOR" => Some(Self::Dot1pToColor),
            "TC_TO_QUEUE" => Some(Self::TcToQueue),
            "TC_TO_DSCP" => Some(Self::TcToDscp),
            "TC_TO_DOT1P" => Some(Self::TcToDot1p),
            "TC_TO_PRIORITY_GROUP" => Some(Self::TcToPriorityGroup),
            "PRIORITY_GROUP_TO_PFC_PRIORITY" => Some(Self::PriorityGroupToPfcPriority),
            "PFC_PRIORITY_TO_QUEUE" => Some(Self::PfcPriorityToQueue),
            _ => None,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DscpToTc => "DSCP_TO_TC",
            Self::DscpToColor => "DSCP_TO_COLOR",
            Self::Dot1pToTc => "DOT1P_TO_TC",
            Self::Dot1pToColor => "DOT1P_TO_COLOR",
            Self::TcToQueue => "TC_TO_QUEUE",
            Self::TcToDscp => "TC_TO_DSCP",
            Self::TcToDot1p => "TC_TO_DOT1P",
            Self::TcToPriorityGroup => "TC_TO_PRIORITY_GROUP",
            Self::PriorityGroupToPfcPriority => "PRIORITY_GROUP_TO_PFC_PRIORITY",
            Self::PfcPriorityToQueue => "PFC_PRIORITY_TO_QUEUE",
        }
    }
}

/// Map entry key.
///
/// Single-field keys (dscp, dot1p, tc) use only the primary half; combination
/// keys (tc+color, pfc-priority+queue-type) pack a secondary discriminator
/// into the upper half.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MapEntryKey(u32);

impl MapEntryKey {
    /// Builds a single-field key.
    pub fn new(key: u16) -> Self {
        Self(key as u32)
    }

    /// Builds a combination key from two 16-bit halves.
    pub fn combined(key1: u16, key2: u16) -> Self {
        Self(((key2 as u32) << 16) | key1 as u32)
    }

    /// Primary half of the key.
    pub fn key1(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Secondary half of the key.
    pub fn key2(&self) -> u16 {
        ((self.0 >> 16) & 0xFFFF) as u16
    }

    /// Raw packed value.
    pub fn as_raw(&self) -> u32 {
        self.0
    }
}

/// One map entry: a key plus the value fields relevant to the map type.
///
/// Fields not used by the owning map's type are left at their defaults and
/// ignored by the driver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapEntry {
    pub key: MapEntryKey,
    pub tc: u8,
    pub color: PacketColor,
    pub dscp: u8,
    pub dot1p: u8,
    pub queue_num: u32,
    pub pg: u8,
}

/// Map attribute ids, shared with the dirty-tracking layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapAttr {
    /// The entry set changed.
    Entries,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_key_packing() {
        let key = MapEntryKey::combined(7, 3);
        assert_eq!(key.key1(), 7);
        assert_eq!(key.key2(), 3);
        assert_eq!(key.as_raw(), (3 << 16) | 7);
    }

    #[test]
    fn test_single_key() {
        let key = MapEntryKey::new(46);
        assert_eq!(key.key1(), 46);
        assert_eq!(key.key2(), 0);
    }

    #[test]
    fn test_map_type_roundtrip() {
        assert_eq!(MapType::parse("TC_TO_QUEUE"), Some(MapType::TcToQueue));
        assert_eq!(MapType::TcToQueue.as_str(), "TC_TO_QUEUE");
        assert_eq!(MapType::parse("bogus"), None);
    }
}
