//! Shared types: drive modes, panel command bytes, frequency-step tables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// DCS opcode freezing the panel on its internal frame memory.
pub const DCS_STILL_ON: u8 = 0x1B;
/// DCS opcode releasing the panel from still mode.
pub const DCS_STILL_OFF: u8 = 0x1C;
/// DCS opcode arming still entry at the next frame boundary.
pub const DCS_STILL_ON_FLY: u8 = 0x1D;

/// How the display pipe drives the panel. Re-derived on every committed
/// mode change; `Undefined` stands for "no mode committed yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshMode {
    Undefined,
    /// Video-mode hybrid: the timing engine emits frames from retained
    /// content while the host sleeps.
    Vhm,
    Video,
    Command,
}

impl Default for RefreshMode {
    fn default() -> Self {
        Self::Undefined
    }
}

impl RefreshMode {
    /// True for the modes the self-refresh machinery operates in.
    pub fn self_refresh_capable(self) -> bool {
        matches!(self, Self::Vhm | Self::Command)
    }
}

impl FromStr for RefreshMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "undefined" => Ok(Self::Undefined),
            "vhm" => Ok(Self::Vhm),
            "video" => Ok(Self::Video),
            "command" | "cmd" => Ok(Self::Command),
            _ => Err(format!("unknown refresh mode: {}", s)),
        }
    }
}

impl fmt::Display for RefreshMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Vhm => write!(f, "vhm"),
            Self::Video => write!(f, "video"),
            Self::Command => write!(f, "command"),
        }
    }
}

/// One entry of a panel frequency-step table: how many pulses each dimming
/// step lasts at a given frame interval, and how often each step repeats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreqStep {
    pub frame_interval_ns: u32,
    /// Pulse count per step. The first entry also sets the still trigger
    /// budget for this interval.
    pub durations: Vec<u32>,
    pub repeats: Vec<u32>,
}

/// Per-panel table of frequency steps, keyed by frame interval.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreqStepTable {
    pub steps: Vec<FreqStep>,
}

impl FreqStepTable {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Entry for an exact frame interval, if the panel defines one.
    pub fn lookup(&self, frame_interval_ns: u32) -> Option<&FreqStep> {
        self.steps
            .iter()
            .find(|s| s.frame_interval_ns == frame_interval_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_round_trip() {
        for mode in [
            RefreshMode::Undefined,
            RefreshMode::Vhm,
            RefreshMode::Video,
            RefreshMode::Command,
        ] {
            let parsed: RefreshMode = mode.to_string().parse().unwrap();
            assert_eq!(parsed, mode);
        }
    }

    #[test]
    fn test_mode_parse_rejects_unknown() {
        assert!("hybrid".parse::<RefreshMode>().is_err());
    }

    #[test]
    fn test_self_refresh_capable() {
        assert!(RefreshMode::Vhm.self_refresh_capable());
        assert!(RefreshMode::Command.self_refresh_capable());
        assert!(!RefreshMode::Video.self_refresh_capable());
        assert!(!RefreshMode::Undefined.self_refresh_capable());
    }

    #[test]
    fn test_freq_step_lookup() {
        let table = FreqStepTable {
            steps: vec![
                FreqStep {
                    frame_interval_ns: 16_666_664,
                    durations: vec![4, 2],
                    repeats: vec![1, 1],
                },
                FreqStep {
                    frame_interval_ns: 33_333_328,
                    durations: vec![8],
                    repeats: vec![1],
                },
            ],
        };

        assert_eq!(
            table.lookup(16_666_664).map(|s| s.durations[0]),
            Some(4)
        );
        assert!(table.lookup(12_345).is_none());
    }
}
