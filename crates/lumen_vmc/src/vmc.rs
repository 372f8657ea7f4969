//! The emission controller state machine.
//!
//! One instance per timing block. The pulse interrupt lands in
//! [`Vmc::on_pulse`], which is lock-free: it decrements the trigger budget
//! and enqueues the still-insertion worker when the budget runs out. Every
//! transition and every panel transfer happens under one mutex, so a late
//! worker run always observes the commit that preempted it.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lumen_core::{
    DisplayPipe, JobId, PanelLink, PipePower, RefreshMode, StillGate, VmcHal, WorkQueue,
    WorkQueueBuilder, DCS_STILL_OFF,
};
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::{VmcConfig, VmcDebug};

/// Controller states.
///
/// `Init` is powered with no frame pushed yet; `On` is armed for still
/// insertion; `Still` means the panel is frozen on its own frame memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum VmcState {
    Off = 0,
    Init = 1,
    On = 2,
    Still = 3,
}

impl VmcState {
    /// Every powered state.
    pub fn is_running(self) -> bool {
        !matches!(self, Self::Off)
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Init,
            2 => Self::On,
            3 => Self::Still,
            _ => Self::Off,
        }
    }
}

impl fmt::Display for VmcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Init => write!(f, "init"),
            Self::On => write!(f, "on"),
            Self::Still => write!(f, "still"),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    pulses: AtomicU64,
    enqueues: AtomicU64,
    stills_entered: AtomicU64,
    stills_exited: AtomicU64,
    commits: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> VmcCounters {
        VmcCounters {
            pulses: self.pulses.load(Ordering::Relaxed),
            enqueues: self.enqueues.load(Ordering::Relaxed),
            stills_entered: self.stills_entered.load(Ordering::Relaxed),
            stills_exited: self.stills_exited.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
        }
    }
}

/// Still-insertion activity since construction.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct VmcCounters {
    pub pulses: u64,
    pub enqueues: u64,
    pub stills_entered: u64,
    pub stills_exited: u64,
    pub commits: u64,
}

/// Point-in-time view of the controller, serialized by the simulator.
#[derive(Debug, Clone, Serialize)]
pub struct VmcSnapshot {
    pub state: VmcState,
    pub config: VmcConfig,
    pub trig_cnt: i64,
    pub reset_cnt: i64,
    pub block_cnt: u64,
    pub irqs_enabled: bool,
    pub frame_interval_ns: u32,
    pub counters: VmcCounters,
}

struct VmcShared {
    irqs_enabled: bool,
}

struct VmcInner {
    /// Serializes transitions and panel transfers. The pulse path never
    /// takes it.
    shared: Mutex<VmcShared>,
    /// State mirror for lock-free reads; stores happen with `shared` held.
    state: AtomicU8,
    trig_cnt: AtomicI64,
    reset_cnt: AtomicI64,
    /// Last committed frame interval, bounding the worker's frame-start
    /// wait.
    frame_interval_ns: AtomicU32,
    config: VmcConfig,
    debug: VmcDebug,
    hal: Arc<dyn VmcHal>,
    panel: Arc<dyn PanelLink>,
    pipe: Arc<dyn DisplayPipe>,
    gate: Arc<StillGate>,
    counters: Counters,
}

impl VmcInner {
    fn state(&self) -> VmcState {
        VmcState::from_raw(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: VmcState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn enable_irqs(&self, shared: &mut VmcShared) {
        if shared.irqs_enabled {
            return;
        }
        self.hal.set_irqs(true);
        shared.irqs_enabled = true;
    }

    fn disable_irqs(&self, shared: &mut VmcShared) {
        if !shared.irqs_enabled {
            return;
        }
        self.hal.set_irqs(false);
        shared.irqs_enabled = false;
    }

    fn frame_period(&self) -> Duration {
        let interval = self.frame_interval_ns.load(Ordering::Acquire);
        let ns = if interval != 0 {
            u64::from(interval)
        } else {
            self.config.min_frame_interval_ns()
        };
        Duration::from_nanos(ns)
    }

    /// Still-insertion worker body. Preconditions are checked here at run
    /// time, under the lock: an enqueue that raced a commit or a power
    /// transition aborts silently.
    fn run_still(&self) {
        let _shared = self.shared.lock();

        match self.pipe.power_state() {
            PipePower::Off | PipePower::Hibernating => return,
            PipePower::Initializing | PipePower::Active => {}
        }
        if self.pipe.drive_mode() == RefreshMode::Command {
            return;
        }
        if self.state() != VmcState::On {
            return;
        }

        log::debug!(
            "still insertion fires (trig_cnt {})",
            self.trig_cnt.load(Ordering::Acquire)
        );

        let low_latency = !self.debug.force_generic_path && self.panel.has_low_latency_path();
        if let Err(err) = self.panel.send_command(self.debug.still_on_cmd, low_latency) {
            log::error!("still command failed: {}", err);
        }
        self.pipe.request_frame_update();

        self.set_state(VmcState::Still);
        self.counters.stills_entered.fetch_add(1, Ordering::Relaxed);

        let timeout = self.frame_period();
        if !self.pipe.wait_for_frame_start(timeout) {
            log::warn!("no frame start within {:?} after still entry", timeout);
        }
    }
}

/// Still-insertion controller for one emission timing block.
pub struct Vmc {
    inner: Arc<VmcInner>,
    works: WorkQueue,
    still_work: JobId,
}

impl Vmc {
    pub fn new(
        config: VmcConfig,
        hal: Arc<dyn VmcHal>,
        panel: Arc<dyn PanelLink>,
        pipe: Arc<dyn DisplayPipe>,
        gate: Arc<StillGate>,
        debug: VmcDebug,
    ) -> Self {
        let inner = Arc::new(VmcInner {
            shared: Mutex::new(VmcShared {
                irqs_enabled: false,
            }),
            state: AtomicU8::new(VmcState::Off as u8),
            trig_cnt: AtomicI64::new(0),
            reset_cnt: AtomicI64::new(0),
            frame_interval_ns: AtomicU32::new(0),
            config,
            debug,
            hal,
            panel,
            pipe,
            gate,
            counters: Counters::default(),
        });

        let mut builder = WorkQueueBuilder::new("lumen-vmc");
        let w = Arc::clone(&inner);
        let still_work = builder.job("still-insertion", move || w.run_still());

        Self {
            inner,
            works: builder.start(),
            still_work,
        }
    }

    pub fn state(&self) -> VmcState {
        self.inner.state()
    }

    /// Power the block up and arm it. Idempotent while running.
    pub fn enable(&self) {
        let mut shared = self.inner.shared.lock();
        let state = self.inner.state();
        if state.is_running() {
            log::info!("vmc already enabled (state {})", state);
            return;
        }

        self.inner.hal.set_power(true);
        self.inner.hal.configure(self.inner.config.emission_num);
        self.inner.enable_irqs(&mut shared);
        self.inner.hal.start();
        self.inner.hal.set_esync_signal(true);

        self.rearm();

        // A pipe that has not pushed its first frame yet holds the panel
        // still until the commit path releases it.
        let next = if self.inner.pipe.power_state() == PipePower::Initializing {
            VmcState::Still
        } else {
            VmcState::Init
        };
        self.inner.set_state(next);
        log::info!("vmc enabled (state {})", next);
    }

    /// Tear the block down. Idempotent while off.
    pub fn disable(&self) {
        let mut shared = self.inner.shared.lock();
        if self.inner.state() == VmcState::Off {
            log::info!("vmc already disabled");
            return;
        }

        self.inner.hal.set_esync_signal(false);
        self.inner.hal.stop();
        self.inner.disable_irqs(&mut shared);
        self.inner.hal.set_power(false);

        self.inner.set_state(VmcState::Off);
        log::info!("vmc disabled");
    }

    /// Disarm the frame IRQs for display hibernation without a full
    /// disable cycle.
    pub fn enter_idle(&self) {
        let mut shared = self.inner.shared.lock();
        self.inner.disable_irqs(&mut shared);
    }

    /// Re-arm the frame IRQs on hibernation exit.
    pub fn exit_idle(&self) {
        let mut shared = self.inner.shared.lock();
        self.inner.enable_irqs(&mut shared);
    }

    /// Atomic-commit hook. Recomputes the still trigger budget for the
    /// committed frame interval; a commit that actually pushes planes also
    /// cancels pending still insertion, releases a held still frame and
    /// arms the controller.
    pub fn on_commit(&self, plane_mask: u32, frame_interval_ns: u32) {
        self.inner.counters.commits.fetch_add(1, Ordering::Relaxed);
        self.update_reset_cnt(frame_interval_ns);
        if frame_interval_ns != 0 {
            self.inner
                .frame_interval_ns
                .store(frame_interval_ns, Ordering::Release);
        }

        if plane_mask == 0 {
            return;
        }

        // A stale "enter still" must never land after this frame.
        self.works.cancel_sync(self.still_work);
        self.still_off(true);

        let _shared = self.inner.shared.lock();
        if self.inner.state() == VmcState::Init {
            self.inner.set_state(VmcState::On);
            log::debug!("first frame pushed, still insertion armed");
        }
    }

    /// Pulse hook, safe for interrupt-like contexts: no locks, no I/O.
    pub fn on_pulse(&self) {
        self.inner.counters.pulses.fetch_add(1, Ordering::Relaxed);
        if !self.need_still() {
            return;
        }
        if self.works.schedule(self.still_work) {
            self.inner.counters.enqueues.fetch_add(1, Ordering::Relaxed);
            log::debug!("still insertion enqueued");
        }
    }

    /// Reload the trigger budget. Driven by the hardware frame-boundary
    /// event.
    pub fn rearm(&self) {
        self.inner
            .trig_cnt
            .store(self.inner.reset_cnt.load(Ordering::Acquire), Ordering::Release);
    }

    /// Release a held still frame. No-op unless the panel is actually
    /// frozen.
    pub fn still_off(&self, sync_cmd: bool) {
        let _shared = self.inner.shared.lock();
        if self.inner.state() != VmcState::Still {
            return;
        }

        let low_latency = sync_cmd
            && !self.inner.debug.force_generic_path
            && self.inner.panel.has_low_latency_path();
        if let Err(err) = self.inner.panel.send_command(DCS_STILL_OFF, low_latency) {
            log::error!("still off command failed: {}", err);
        }

        self.inner.set_state(VmcState::Init);
        self.inner.counters.stills_exited.fetch_add(1, Ordering::Relaxed);
        log::debug!("still exit");
    }

    /// Veto still insertion for the caller's session. `cancel` additionally
    /// cancels an enqueued worker run and waits out an executing one.
    pub fn block(&self, cancel: bool) {
        self.inner.gate.block();
        if cancel {
            self.works.cancel_sync(self.still_work);
        }
    }

    /// Release one veto.
    pub fn unblock(&self) {
        self.inner.gate.unblock();
    }

    /// Block until every enqueued worker run has finished.
    pub fn flush_works(&self) {
        self.works.flush();
    }

    pub fn snapshot(&self) -> VmcSnapshot {
        VmcSnapshot {
            state: self.inner.state(),
            config: self.inner.config,
            trig_cnt: self.inner.trig_cnt.load(Ordering::Acquire),
            reset_cnt: self.inner.reset_cnt.load(Ordering::Acquire),
            block_cnt: self.inner.gate.count(),
            irqs_enabled: self.inner.shared.lock().irqs_enabled,
            frame_interval_ns: self.inner.frame_interval_ns.load(Ordering::Acquire),
            counters: self.inner.counters.snapshot(),
        }
    }

    /// The predicate order is load-bearing: a disabled, blocked or
    /// non-armed pulse must not consume trigger budget.
    fn need_still(&self) -> bool {
        !self.inner.debug.sr_disable
            && !self.inner.gate.is_blocked()
            && self.inner.state() == VmcState::On
            && self.inner.trig_cnt.fetch_sub(1, Ordering::AcqRel) - 1 == 0
    }

    fn update_reset_cnt(&self, frame_interval_ns: u32) {
        let override_cnt = self.inner.debug.sr_frame_count_override;
        if override_cnt != 0 {
            self.inner
                .reset_cnt
                .store(i64::from(override_cnt) - 1, Ordering::Release);
            return;
        }

        let table = self.inner.panel.freq_step_table();
        if let Some(first) = table
            .lookup(frame_interval_ns)
            .and_then(|step| step.durations.first())
        {
            self.inner
                .reset_cnt
                .store(i64::from(*first) - 1, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_raw_round_trip() {
        for state in [VmcState::Off, VmcState::Init, VmcState::On, VmcState::Still] {
            assert_eq!(VmcState::from_raw(state as u8), state);
        }
        assert_eq!(VmcState::from_raw(0xFF), VmcState::Off);
    }

    #[test]
    fn test_only_off_is_not_running() {
        assert!(!VmcState::Off.is_running());
        assert!(VmcState::Init.is_running());
        assert!(VmcState::On.is_running());
        assert!(VmcState::Still.is_running());
    }
}
