//! Board description.
//!
//! A board file fixes what real hardware would: the esync clock, the frame
//! interval band commits must land in, the panel's frequency-step table and
//! the debug knobs both controllers expose. Every field has a default, so
//! the simulator runs without one.
//!
//! # Example
//!
//! ```toml
//! esync_hz = 240
//! min_frame_rate_hz = 10
//! mode = "vhm"
//!
//! [[freq_steps]]
//! frame_interval_ns = 16666664
//! durations = [4, 2]
//! repeats = [1, 1]
//!
//! [vmc]
//! sr_frame_count_override = 4
//!
//! [refresh]
//! esync_duration_check = true
//! ```

use std::path::Path;

use lumen_core::{FreqStep, FreqStepTable, RefreshMode};
use lumen_refresh::timing::{MAX_FRAME_INTERVAL_NS, MIN_FRAME_INTERVAL_NS};
use lumen_refresh::RefreshDebug;
use lumen_vmc::VmcDebug;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("failed to read board file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse board file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid board timing: {0}")]
    Timing(#[from] lumen_vmc::VmcConfigError),
}

/// One simulated display board.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Emission sync pulse frequency.
    pub esync_hz: u32,
    /// Slowest rate the emission schedule divides down to.
    pub min_frame_rate_hz: u32,
    /// Commit-boundary validation band for requested frame intervals.
    pub min_frame_interval_ns: u32,
    pub max_frame_interval_ns: u32,
    /// Clock value at session start. Nonzero so the first pulse runs the
    /// bootstrap path instead of looking like a mid-stream sample.
    pub start_ns: u64,
    /// Drive mode the pipe boots in. The still-insertion block only exists
    /// on boards that boot in vhm.
    pub mode: RefreshMode,
    /// Make the pipe's frame-start wait time out instead of signaling.
    pub frame_start_timeout: bool,
    /// Per-interval dimming step table the fake panel reports.
    pub freq_steps: Vec<FreqStep>,
    pub vmc: VmcDebug,
    pub refresh: RefreshDebug,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            esync_hz: 240,
            min_frame_rate_hz: 10,
            min_frame_interval_ns: MIN_FRAME_INTERVAL_NS as u32,
            max_frame_interval_ns: MAX_FRAME_INTERVAL_NS as u32,
            start_ns: 1_000_000_000,
            mode: RefreshMode::Vhm,
            frame_start_timeout: false,
            freq_steps: Vec::new(),
            vmc: VmcDebug::default(),
            refresh: RefreshDebug::default(),
        }
    }
}

impl BoardConfig {
    pub fn load(path: &Path) -> Result<Self, BoardError> {
        let raw = std::fs::read_to_string(path)?;
        let board = toml::from_str(&raw)?;
        log::info!("loaded board from {}", path.display());
        Ok(board)
    }

    pub fn freq_step_table(&self) -> FreqStepTable {
        FreqStepTable {
            steps: self.freq_steps.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_board_is_vhm_at_240() {
        let board = BoardConfig::default();
        assert_eq!(board.esync_hz, 240);
        assert_eq!(board.mode, RefreshMode::Vhm);
        assert!(board.min_frame_interval_ns < board.max_frame_interval_ns);
        assert!(board.freq_step_table().is_empty());
    }

    #[test]
    fn test_partial_board_keeps_defaults() {
        let board: BoardConfig = toml::from_str(
            r#"
            mode = "command"

            [[freq_steps]]
            frame_interval_ns = 16666664
            durations = [4, 2]
            repeats = [1, 1]

            [vmc]
            sr_frame_count_override = 4
            "#,
        )
        .unwrap();

        assert_eq!(board.mode, RefreshMode::Command);
        assert_eq!(board.esync_hz, 240);
        assert_eq!(board.vmc.sr_frame_count_override, 4);
        assert!(!board.vmc.sr_disable);
        assert_eq!(
            board.freq_step_table().lookup(16_666_664).map(|s| s.durations[0]),
            Some(4)
        );
    }

    #[test]
    fn test_malformed_board_reports_parse_error() {
        let err = toml::from_str::<BoardConfig>("esync_hz = \"fast\"").unwrap_err();
        assert!(err.to_string().contains("esync_hz"));
    }
}
