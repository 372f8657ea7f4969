//! Hardware seams.
//!
//! The timing controllers are written against these traits; register
//! programming, DSI transport and frame plumbing live behind them. The
//! simulator and the test suites substitute recording fakes.

use crate::error::LinkResult;
use crate::types::{FreqStepTable, RefreshMode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Power state of a display pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipePower {
    Off,
    /// Powered, first frame not yet on the wire.
    Initializing,
    Active,
    /// Content retained, clocks gated.
    Hibernating,
}

/// Panel command transport plus the panel-side hooks the deferred works
/// drive.
pub trait PanelLink: Send + Sync {
    /// Send a one-byte DCS command. `low_latency` selects the dedicated
    /// sync-command path when the transport has one; implementations fall
    /// back to the generic write otherwise.
    fn send_command(&self, cmd: u8, low_latency: bool) -> LinkResult<()>;

    /// Whether a dedicated low-latency command path exists.
    fn has_low_latency_path(&self) -> bool;

    /// Apply one brightness dimming step; returns the remaining step count.
    fn step_brightness(&self) -> u32;

    /// Redraw panel-side state without a new frame from the host.
    fn refresh_panel(&self);

    /// Per-interval dimming step table. Empty when the panel has none.
    fn freq_step_table(&self) -> FreqStepTable;
}

/// Register surface of the variable-emission timing block.
///
/// The still-insertion controller drives this during enable, disable and
/// idle transitions. Implementations program hardware and must not sleep
/// longer than a register write takes.
pub trait VmcHal: Send + Sync {
    fn set_power(&self, on: bool);

    /// Program the emission schedule for the derived pulses-per-frame count.
    fn configure(&self, emission_num: u32);

    /// Start emission scanning.
    fn start(&self);

    /// Stop emission scanning.
    fn stop(&self);

    /// Arm or disarm the frame-boundary and update interrupts.
    fn set_irqs(&self, enabled: bool);

    /// Route the emission sync signal to the panel link.
    fn set_esync_signal(&self, enabled: bool);
}

/// The display pipe the timing controllers coordinate with.
pub trait DisplayPipe: Send + Sync {
    fn power_state(&self) -> PipePower;

    fn drive_mode(&self) -> RefreshMode;

    /// Kick the pipe's pending update out to the hardware.
    fn request_frame_update(&self);

    /// Block until the next frame-start signal; false on timeout.
    fn wait_for_frame_start(&self, timeout: Duration) -> bool;

    /// Restart the idle-entry countdown.
    fn reset_hibernation(&self);

    /// Mirror the dimming state into the pipe.
    fn set_dimming(&self, en: bool);

    /// Hold the transfer trigger mask so panel commands land between
    /// frame transfers.
    fn get_trigger_mask(&self);

    /// Release the transfer trigger mask.
    fn put_trigger_mask(&self);
}
