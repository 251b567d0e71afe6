//! Policer attribute definitions for the driver surface.

/// Policer meter type (what to measure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MeterType {
    /// Meter based on packet count.
    Packets,
    /// Meter based on byte count.
    Bytes,
}

impl MeterType {
    /// Parses a meter type string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PACKETS" => Some(Self::Packets),
            "BYTES" => Some(Self::Bytes),
            _ => None,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Packets => "PACKETS",
            Self::Bytes => "BYTES",
        }
    }
}

/// Policer mode (algorithm).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PolicerMode {
    /// Single Rate Three Color Marker.
    SrTcm,
    /// Two Rate Three Color Marker.
    TrTcm,
    /// Storm control mode.
    StormControl,
}

impl PolicerMode {
    /// Parses a policer mode string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "SR_TCM" => Some(Self::SrTcm),
            "TR_TCM" => Some(Self::TrTcm),
            "STORM_CONTROL" => Some(Self::StormControl),
            _ => None,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SrTcm => "SR_TCM",
            Self::TrTcm => "TR_TCM",
            Self::StormControl => "STORM_CONTROL",
        }
    }
}

/// Color source (color awareness).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColorSource {
    /// Color-aware (considers incoming packet color).
    Aware,
    /// Color-blind (ignores incoming packet color).
    Blind,
}

/// Packet action for colored packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PacketAction {
    /// Drop the packet.
    Drop,
    /// Forward the packet normally.
    Forward,
    /// Copy to CPU.
    Copy,
    /// Trap to CPU.
    Trap,
}

/// Policer configuration as the driver consumes it.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicerCfg {
    pub meter_type: MeterType,
    pub mode: PolicerMode,
    pub color_source: ColorSource,
    /// Committed information rate (bytes/packets per second).
    pub cir: u64,
    /// Committed burst size (bytes/packets).
    pub cbs: u64,
    /// Peak information rate (bytes/packets per second).
    pub pir: u64,
    /// Peak burst size (bytes/packets).
    pub pbs: u64,
    pub green_action: PacketAction,
    pub yellow_action: PacketAction,
    pub red_action: PacketAction,
}

impl Default for PolicerCfg {
    fn default() -> Self {
        Self {
            meter_type: MeterType::Bytes,
            mode: PolicerMode::SrTcm,
            color_source: ColorSource::Blind,
            cir: 0,
            cbs: 0,
            pir: 0,
            pbs: 0,
            green_action: PacketAction::Forward,
            yellow_action: PacketAction::Forward,
            red_action: PacketAction::Drop,
        }
    }
}

/// Policer attribute ids, shared with the dirty-tracking layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PolicerAttr {
    MeterType,
    Mode,
    ColorSource,
    Cir,
    Cbs,
    Pir,
    Pbs,
    GreenAction,
    YellowAction,
    RedAction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meter_type_parse() {
        assert_eq!(MeterType::parse("PACKETS"), Some(MeterType::Packets));
        assert_eq!(MeterType::parse("bytes"), Some(MeterType::Bytes));
        assert_eq!(MeterType::parse("invalid"), None);
    }

    #[test]
    fn test_policer_mode_parse() {
        assert_eq!(PolicerMode::parse("SR_TCM"), Some(PolicerMode::SrTcm));
        assert_eq!(
            PolicerMode::parse("STORM_CONTROL"),
            Some(PolicerMode::StormControl)
        );
        assert_eq!(PolicerMode::parse("invalid"), None);
    }

    #[test]
    fn test_cfg_defaults() {
        let cfg = PolicerCfg::default();
        assert_eq!(cfg.red_action, PacketAction::Drop);
        assert_eq!(cfg.mode, PolicerMode::SrTcm);
    }
}
