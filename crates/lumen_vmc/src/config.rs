//! Emission schedule derivation and debug overrides.

use lumen_core::{RefreshMode, DCS_STILL_ON};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const NSEC_PER_SEC: u64 = 1_000_000_000;

/// Board description errors caught before the controller is built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmcConfigError {
    #[error("esync rate must be nonzero")]
    ZeroEsync,

    #[error("minimum frame rate must be nonzero")]
    ZeroFrameRate,

    #[error("esync rate {esync_hz} Hz is not a multiple of the minimum frame rate {min_frame_interval_hz} Hz")]
    NotDivisible {
        esync_hz: u32,
        min_frame_interval_hz: u32,
    },
}

/// Emission schedule of the timing block: how many sync pulses the hardware
/// emits per longest-allowed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VmcConfig {
    pub esync_hz: u32,
    pub min_frame_interval_hz: u32,
    pub emission_num: u32,
}

impl VmcConfig {
    /// Derive the schedule for a committed drive mode. Modes the emission
    /// controller does not drive yield `None`; an invalid board description
    /// is an error.
    pub fn derive(
        esync_hz: u32,
        min_frame_interval_hz: u32,
        mode: RefreshMode,
    ) -> Result<Option<Self>, VmcConfigError> {
        if mode != RefreshMode::Vhm {
            return Ok(None);
        }
        if esync_hz == 0 {
            return Err(VmcConfigError::ZeroEsync);
        }
        if min_frame_interval_hz == 0 {
            return Err(VmcConfigError::ZeroFrameRate);
        }
        if esync_hz % min_frame_interval_hz != 0 {
            return Err(VmcConfigError::NotDivisible {
                esync_hz,
                min_frame_interval_hz,
            });
        }

        Ok(Some(Self {
            esync_hz,
            min_frame_interval_hz,
            emission_num: esync_hz / min_frame_interval_hz,
        }))
    }

    /// Longest frame period the board allows.
    pub fn min_frame_interval_ns(&self) -> u64 {
        NSEC_PER_SEC / u64::from(self.min_frame_interval_hz)
    }
}

/// Instance-scoped debug knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct VmcDebug {
    /// Suppress still insertion entirely.
    pub sr_disable: bool,
    /// When nonzero, overrides the panel frequency-step table as the still
    /// trigger budget.
    pub sr_frame_count_override: u32,
    /// The DCS byte the worker sends to enter still mode.
    pub still_on_cmd: u8,
    /// Send still commands through the generic write path even when a
    /// low-latency path exists.
    pub force_generic_path: bool,
}

impl Default for VmcDebug {
    fn default() -> Self {
        Self {
            sr_disable: false,
            sr_frame_count_override: 0,
            still_on_cmd: DCS_STILL_ON,
            force_generic_path: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_splits_esync_into_emissions() {
        let config = VmcConfig::derive(240, 10, RefreshMode::Vhm)
            .unwrap()
            .unwrap();
        assert_eq!(config.emission_num, 24);
        assert_eq!(config.min_frame_interval_ns(), 100_000_000);
    }

    #[test]
    fn test_derive_rejects_non_multiple() {
        let err = VmcConfig::derive(240, 70, RefreshMode::Vhm).unwrap_err();
        assert_eq!(
            err,
            VmcConfigError::NotDivisible {
                esync_hz: 240,
                min_frame_interval_hz: 70,
            }
        );
    }

    #[test]
    fn test_derive_rejects_zero_rates() {
        assert_eq!(
            VmcConfig::derive(0, 10, RefreshMode::Vhm).unwrap_err(),
            VmcConfigError::ZeroEsync
        );
        assert_eq!(
            VmcConfig::derive(240, 0, RefreshMode::Vhm).unwrap_err(),
            VmcConfigError::ZeroFrameRate
        );
    }

    #[test]
    fn test_derive_skips_non_emission_modes() {
        for mode in [
            RefreshMode::Undefined,
            RefreshMode::Video,
            RefreshMode::Command,
        ] {
            // Invalid numbers pass through untouched; the mode never
            // reaches the emission hardware.
            assert_eq!(VmcConfig::derive(240, 70, mode), Ok(None));
        }
    }

    #[test]
    fn test_debug_defaults() {
        let debug = VmcDebug::default();
        assert!(!debug.sr_disable);
        assert_eq!(debug.sr_frame_count_override, 0);
        assert_eq!(debug.still_on_cmd, DCS_STILL_ON);
        assert!(!debug.force_generic_path);
    }
}
