//! Recording stand-ins for the hardware seams.
//!
//! Each fake answers the trait calls the controllers make and keeps a
//! serializable trace, so scripts can assert on what would have hit the
//! wire.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::time::Duration;

use lumen_core::{
    DisplayPipe, FreqStepTable, LinkResult, PanelLink, PipePower, RefreshMode, VmcHal,
    DCS_STILL_OFF,
};
use parking_lot::Mutex;
use serde::Serialize;

/// One DCS transfer as the panel saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PanelCommand {
    pub cmd: u8,
    pub low_latency: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PanelSnapshot {
    pub commands: Vec<PanelCommand>,
    pub still_on_count: usize,
    pub still_off_count: usize,
    pub remaining_steps: u32,
    pub steps_applied: u32,
    pub refreshes: u32,
}

/// Panel that records every command byte with the path it took.
pub struct SimPanel {
    table: FreqStepTable,
    commands: Mutex<Vec<PanelCommand>>,
    remaining_steps: AtomicU32,
    steps_applied: AtomicU32,
    refreshes: AtomicU32,
}

impl SimPanel {
    pub fn new(table: FreqStepTable) -> Self {
        Self {
            table,
            commands: Mutex::new(Vec::new()),
            remaining_steps: AtomicU32::new(0),
            steps_applied: AtomicU32::new(0),
            refreshes: AtomicU32::new(0),
        }
    }

    /// Load the dimming sequencer with `remaining` pending steps.
    pub fn set_remaining_steps(&self, remaining: u32) {
        self.remaining_steps.store(remaining, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> PanelSnapshot {
        let commands = self.commands.lock().clone();
        let still_off_count = commands.iter().filter(|c| c.cmd == DCS_STILL_OFF).count();
        PanelSnapshot {
            still_on_count: commands.len() - still_off_count,
            still_off_count,
            commands,
            remaining_steps: self.remaining_steps.load(Ordering::SeqCst),
            steps_applied: self.steps_applied.load(Ordering::SeqCst),
            refreshes: self.refreshes.load(Ordering::SeqCst),
        }
    }
}

impl PanelLink for SimPanel {
    fn send_command(&self, cmd: u8, low_latency: bool) -> LinkResult<()> {
        log::debug!("panel <- 0x{:02X} (low latency {})", cmd, low_latency);
        self.commands.lock().push(PanelCommand { cmd, low_latency });
        Ok(())
    }

    fn has_low_latency_path(&self) -> bool {
        true
    }

    fn step_brightness(&self) -> u32 {
        self.steps_applied.fetch_add(1, Ordering::SeqCst);
        let next = self
            .remaining_steps
            .load(Ordering::SeqCst)
            .saturating_sub(1);
        self.remaining_steps.store(next, Ordering::SeqCst);
        next
    }

    fn refresh_panel(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }

    fn freq_step_table(&self) -> FreqStepTable {
        self.table.clone()
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PipeSnapshot {
    pub power: PipePower,
    pub mode: RefreshMode,
    pub frame_updates: u32,
    pub hibernation_resets: u32,
    pub dimming: bool,
    pub trigger_depth: i32,
}

/// Pipe whose power and mode the script can flip. Frame-start always
/// signals unless told to time out.
pub struct SimPipe {
    power: Mutex<PipePower>,
    mode: Mutex<RefreshMode>,
    frame_start_ok: AtomicBool,
    frame_updates: AtomicU32,
    hibernation_resets: AtomicU32,
    dimming: AtomicBool,
    trigger_depth: AtomicI32,
}

impl SimPipe {
    pub fn new(mode: RefreshMode) -> Self {
        Self {
            power: Mutex::new(PipePower::Active),
            mode: Mutex::new(mode),
            frame_start_ok: AtomicBool::new(true),
            frame_updates: AtomicU32::new(0),
            hibernation_resets: AtomicU32::new(0),
            dimming: AtomicBool::new(false),
            trigger_depth: AtomicI32::new(0),
        }
    }

    pub fn set_power(&self, power: PipePower) {
        *self.power.lock() = power;
    }

    pub fn set_mode(&self, mode: RefreshMode) {
        *self.mode.lock() = mode;
    }

    /// Make `wait_for_frame_start` report a timeout.
    pub fn set_frame_start_ok(&self, ok: bool) {
        self.frame_start_ok.store(ok, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> PipeSnapshot {
        PipeSnapshot {
            power: *self.power.lock(),
            mode: *self.mode.lock(),
            frame_updates: self.frame_updates.load(Ordering::SeqCst),
            hibernation_resets: self.hibernation_resets.load(Ordering::SeqCst),
            dimming: self.dimming.load(Ordering::SeqCst),
            trigger_depth: self.trigger_depth.load(Ordering::SeqCst),
        }
    }
}

impl DisplayPipe for SimPipe {
    fn power_state(&self) -> PipePower {
        *self.power.lock()
    }

    fn drive_mode(&self) -> RefreshMode {
        *self.mode.lock()
    }

    fn request_frame_update(&self) {
        self.frame_updates.fetch_add(1, Ordering::SeqCst);
    }

    fn wait_for_frame_start(&self, _timeout: Duration) -> bool {
        self.frame_start_ok.load(Ordering::SeqCst)
    }

    fn reset_hibernation(&self) {
        self.hibernation_resets.fetch_add(1, Ordering::SeqCst);
    }

    fn set_dimming(&self, en: bool) {
        self.dimming.store(en, Ordering::SeqCst);
    }

    fn get_trigger_mask(&self) {
        self.trigger_depth.fetch_add(1, Ordering::SeqCst);
    }

    fn put_trigger_mask(&self) {
        self.trigger_depth.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct HalSnapshot {
    pub powered: bool,
    pub emission_num: u32,
    pub scanning: bool,
    pub irqs: bool,
    pub esync_signal: bool,
}

/// Register block mirror: remembers the last written value of each control.
#[derive(Default)]
pub struct SimHal {
    powered: AtomicBool,
    emission_num: AtomicU32,
    scanning: AtomicBool,
    irqs: AtomicBool,
    esync_signal: AtomicBool,
}

impl SimHal {
    pub fn snapshot(&self) -> HalSnapshot {
        HalSnapshot {
            powered: self.powered.load(Ordering::SeqCst),
            emission_num: self.emission_num.load(Ordering::SeqCst),
            scanning: self.scanning.load(Ordering::SeqCst),
            irqs: self.irqs.load(Ordering::SeqCst),
            esync_signal: self.esync_signal.load(Ordering::SeqCst),
        }
    }
}

impl VmcHal for SimHal {
    fn set_power(&self, on: bool) {
        self.powered.store(on, Ordering::SeqCst);
    }

    fn configure(&self, emission_num: u32) {
        self.emission_num.store(emission_num, Ordering::SeqCst);
    }

    fn start(&self) {
        self.scanning.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.scanning.store(false, Ordering::SeqCst);
    }

    fn set_irqs(&self, enabled: bool) {
        self.irqs.store(enabled, Ordering::SeqCst);
    }

    fn set_esync_signal(&self, enabled: bool) {
        self.esync_signal.store(enabled, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::DCS_STILL_ON;

    #[test]
    fn test_panel_splits_command_counts() {
        let panel = SimPanel::new(FreqStepTable::default());
        panel.send_command(DCS_STILL_ON, true).unwrap();
        panel.send_command(DCS_STILL_OFF, false).unwrap();
        panel.send_command(DCS_STILL_ON, true).unwrap();

        let snap = panel.snapshot();
        assert_eq!(snap.still_on_count, 2);
        assert_eq!(snap.still_off_count, 1);
        assert_eq!(snap.commands[1], PanelCommand { cmd: DCS_STILL_OFF, low_latency: false });
    }

    #[test]
    fn test_panel_steps_count_down() {
        let panel = SimPanel::new(FreqStepTable::default());
        panel.set_remaining_steps(2);
        assert_eq!(panel.step_brightness(), 1);
        assert_eq!(panel.step_brightness(), 0);
        assert_eq!(panel.step_brightness(), 0);
        assert_eq!(panel.snapshot().steps_applied, 3);
    }

    #[test]
    fn test_pipe_trigger_depth_balances() {
        let pipe = SimPipe::new(RefreshMode::Command);
        pipe.get_trigger_mask();
        pipe.get_trigger_mask();
        pipe.put_trigger_mask();
        assert_eq!(pipe.snapshot().trigger_depth, 1);
    }
}
