//! The self-refresh scheduler.
//!
//! One instance per display pipe. The pulse interrupt lands in
//! [`SelfRefresh::on_pulse`], which classifies the pulse, promotes queued
//! frame-timing configs and decides which deferred panel works must run
//! before the next real frame boundary. Everything that touches hardware
//! runs on the work queue; the pulse path itself only takes the context
//! lock, updates bookkeeping and enqueues.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use lumen_core::{
    Clock, DisplayPipe, JobId, PanelLink, RefreshMode, StillGate, WorkQueue, WorkQueueBuilder,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::classify::{classify, SyncMask};
use crate::config::{ConfigStore, DvrrConfig};
use crate::parity;
use crate::timing::{esync_count_closest, is_odd_interval, ESYNC_NS, HALF_ESYNC_NS, WAIT_COMMIT_US};

/// Instance-scoped debug knobs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshDebug {
    /// Log per-pulse timing and flag out-of-band gaps.
    pub esync_duration_check: bool,
}

/// Sources that can request transient dimming. The parity scheduling stays
/// active while any source holds its bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimmingSource(u8);

impl DimmingSource {
    /// Brightness-curve transitions driven by the panel.
    pub const BRIGHTNESS: Self = Self(1 << 0);

    /// High-brightness mode entry and exit.
    pub const HBM: Self = Self(1 << 1);

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl std::str::FromStr for DimmingSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "brightness" => Ok(Self::BRIGHTNESS),
            "hbm" => Ok(Self::HBM),
            _ => Err(format!("unknown dimming source: {}", s)),
        }
    }
}

/// Scheduling decisions taken since construction.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RefreshCounters {
    pub pulses: u64,
    pub esync: u64,
    pub gramscan: u64,
    pub frame_intervals: u64,
    pub promotions: u64,
    pub panel_refresh_scheduled: u64,
    pub brightness_scheduled: u64,
    pub refresh_scheduled: u64,
}

/// Point-in-time view of the scheduler, serialized by the simulator.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshSnapshot {
    pub mode: RefreshMode,
    pub current: DvrrConfig,
    pub pended: DvrrConfig,
    pub last_esync_ns: u64,
    pub last_vsync_ns: u64,
    pub last_gramscan_ns: u64,
    pub next_vsync_ns: u64,
    pub next_vsync_ecnt: i64,
    pub remain_bq_cnt: u32,
    pub full_bq_cnt: u32,
    pub trans_dimming: u8,
    pub trigger_held: bool,
    pub counters: RefreshCounters,
}

struct RefreshContext {
    mode: RefreshMode,
    store: ConfigStore,
    last_esync_ns: u64,
    last_vsync_ns: u64,
    last_gramscan_ns: u64,
    next_vsync_ns: u64,
    next_vsync_ecnt: i64,
    remain_bq_cnt: u32,
    full_bq_cnt: u32,
    trans_dimming: u8,
    trigger_held: bool,
    counters: RefreshCounters,
}

impl RefreshContext {
    fn new() -> Self {
        Self {
            mode: RefreshMode::Undefined,
            store: ConfigStore::new(),
            last_esync_ns: 0,
            last_vsync_ns: 0,
            last_gramscan_ns: 0,
            next_vsync_ns: 0,
            next_vsync_ecnt: 0,
            remain_bq_cnt: 0,
            full_bq_cnt: 0,
            trans_dimming: 0,
            trigger_held: false,
            counters: RefreshCounters::default(),
        }
    }

    fn set_mode(&mut self, mode: RefreshMode) {
        if self.mode != mode {
            log::info!("drive mode {} -> {}", self.mode, mode);
            self.mode = mode;
        }
    }

    /// Timestamp bookkeeping. Every pulse stamps the esync time; the frame
    /// and gramscan stamps follow the mask. Recomputes the next frame
    /// deadline and its remaining pulse count.
    fn stamp(&mut self, mask: SyncMask, now_ns: u64) {
        self.last_esync_ns = now_ns;
        if mask.contains(SyncMask::FRAME_INTERVAL) {
            self.last_vsync_ns = now_ns;
        }
        if mask.contains(SyncMask::GRAMSCAN) {
            self.last_gramscan_ns = now_ns;
        }

        self.next_vsync_ns = self.last_vsync_ns + u64::from(self.store.current.frame_interval_ns);
        self.next_vsync_ecnt = esync_count_closest(self.next_vsync_ns, now_ns);
    }

    /// Per-pulse timing report behind the duration-check knob. Uses the
    /// pre-stamp timestamps.
    fn log_pulse_timing(&self, mask: SyncMask, now_ns: u64) {
        let esync_gap = now_ns as i64 - self.last_esync_ns as i64;
        if mask.contains(SyncMask::ESYNC) {
            log::info!("esync +{}us", esync_gap / 1_000);
        } else {
            log::info!(
                "gramscan +{}us, esync gap {}us",
                (now_ns as i64 - self.last_gramscan_ns as i64) / 1_000,
                esync_gap / 1_000
            );
            if esync_gap > ESYNC_NS * 2 + HALF_ESYNC_NS {
                log::warn!("gramscan gap {}us outside tolerance", esync_gap / 1_000);
            }
        }
        if mask.contains(SyncMask::FRAME_INTERVAL) {
            log::info!("vsync +{}us", (now_ns as i64 - self.last_vsync_ns as i64) / 1_000);
        }
    }
}

struct RefreshInner {
    ctx: Mutex<RefreshContext>,
    panel: Arc<dyn PanelLink>,
    pipe: Arc<dyn DisplayPipe>,
    gate: Arc<StillGate>,
    clock: Arc<dyn Clock>,
    debug: RefreshDebug,
}

/// Settle time for a panel command to be reflected in the next pulse.
const SETTLE: Duration = Duration::from_millis(1);

impl RefreshInner {
    /// Redraw the panel from its own memory ahead of the expected present
    /// time.
    fn run_panel_refresh(&self) {
        thread::sleep(SETTLE);
        self.panel.refresh_panel();
    }

    /// Apply one brightness dimming step and pull the remaining budget
    /// back from the panel.
    fn run_brightness_step(&self) {
        let mode = self.ctx.lock().mode;
        if mode == RefreshMode::Command {
            self.pipe.reset_hibernation();
            thread::sleep(SETTLE);
        }

        let remain = self.panel.step_brightness();
        self.ctx.lock().remain_bq_cnt = remain;
        log::debug!("brightness step applied, {} remaining", remain);
    }

    /// Push a refresh through the pipe, unless a user commit claims the
    /// first half of the pulse window or still insertion is blocked.
    fn run_dpu_refresh(&self) {
        thread::sleep(Duration::from_micros(WAIT_COMMIT_US as u64));

        let _ctx = self.ctx.lock();
        if self.gate.is_blocked() {
            return;
        }
        self.pipe.reset_hibernation();
        self.pipe.request_frame_update();
    }

    fn run_trigger_get(&self) {
        let mut ctx = self.ctx.lock();
        if ctx.trigger_held {
            log::debug!("trigger mask already held");
            return;
        }
        self.pipe.get_trigger_mask();
        ctx.trigger_held = true;
    }

    fn run_trigger_put(&self) {
        let mut ctx = self.ctx.lock();
        if !ctx.trigger_held {
            log::debug!("trigger mask not held");
            return;
        }
        self.pipe.put_trigger_mask();
        ctx.trigger_held = false;
    }
}

/// Pulse-driven self-refresh scheduler for one display pipe.
pub struct SelfRefresh {
    inner: Arc<RefreshInner>,
    works: WorkQueue,
    panel_refresh_work: JobId,
    brightness_work: JobId,
    refresh_work: JobId,
    trigger_get_work: JobId,
    trigger_put_work: JobId,
}

impl SelfRefresh {
    pub fn new(
        panel: Arc<dyn PanelLink>,
        pipe: Arc<dyn DisplayPipe>,
        clock: Arc<dyn Clock>,
        gate: Arc<StillGate>,
        debug: RefreshDebug,
    ) -> Self {
        let inner = Arc::new(RefreshInner {
            ctx: Mutex::new(RefreshContext::new()),
            panel,
            pipe,
            gate,
            clock,
            debug,
        });

        let mut builder = WorkQueueBuilder::new("lumen-refresh");
        let w = Arc::clone(&inner);
        let panel_refresh_work = builder.job("panel-refresh", move || w.run_panel_refresh());
        let w = Arc::clone(&inner);
        let brightness_work = builder.job("brightness-dimming", move || w.run_brightness_step());
        let w = Arc::clone(&inner);
        let refresh_work = builder.job("dpu-refresh", move || w.run_dpu_refresh());
        let w = Arc::clone(&inner);
        let trigger_get_work = builder.job("trigger-get", move || w.run_trigger_get());
        let w = Arc::clone(&inner);
        let trigger_put_work = builder.job("trigger-put", move || w.run_trigger_put());

        Self {
            inner,
            works: builder.start(),
            panel_refresh_work,
            brightness_work,
            refresh_work,
            trigger_get_work,
            trigger_put_work,
        }
    }

    /// Pulse entry point, one call per emission sync interrupt.
    ///
    /// Classification, promotion and the scheduling decisions run under the
    /// context lock; hardware effects are deferred to the work queue, so
    /// this never performs I/O or blocks beyond the lock. Returns the
    /// classification so the caller can fan the frame boundary out to other
    /// pulse consumers.
    pub fn on_pulse(&self) -> SyncMask {
        let now_ns = self.inner.clock.now_ns();
        let mut guard = self.inner.ctx.lock();
        let ctx = &mut *guard;
        ctx.counters.pulses += 1;

        if !ctx.mode.self_refresh_capable() {
            return SyncMask::NONE;
        }

        if ctx.last_vsync_ns == 0 {
            // Bootstrap: no history to classify against.
            ctx.stamp(SyncMask::ALL, now_ns);
            return SyncMask::ALL;
        }

        let (mask, promoted) = classify(&mut ctx.store, ctx.last_esync_ns, ctx.last_vsync_ns, now_ns);
        if promoted {
            ctx.counters.promotions += 1;
        }
        if mask.contains(SyncMask::ESYNC) {
            ctx.counters.esync += 1;
        } else {
            ctx.counters.gramscan += 1;
        }
        if mask.contains(SyncMask::FRAME_INTERVAL) {
            ctx.counters.frame_intervals += 1;
        }

        if self.inner.debug.esync_duration_check {
            ctx.log_pulse_timing(mask, now_ns);
        }
        ctx.stamp(mask, now_ns);

        self.schedule_panel_refresh(ctx, now_ns);
        let mut refresh = self.schedule_brightness(ctx);
        refresh |= trans_dimming_due(ctx);
        if refresh && ctx.mode == RefreshMode::Vhm && self.works.schedule(self.refresh_work) {
            ctx.counters.refresh_scheduled += 1;
        }

        log::debug!(
            "pulse at {}ns, next vsync {}ns in {} pulses",
            now_ns,
            ctx.next_vsync_ns,
            ctx.next_vsync_ecnt
        );
        mask
    }

    /// Latch the committed drive mode without touching the config queue.
    pub fn set_mode(&self, mode: RefreshMode) {
        self.inner.ctx.lock().set_mode(mode);
    }

    /// Queue a frame-timing config. Called once per atomic commit, with the
    /// drive mode the commit derived.
    pub fn queue_config(&self, mode: RefreshMode, config: DvrrConfig) {
        let mut ctx = self.inner.ctx.lock();
        ctx.set_mode(mode);
        ctx.store.queue(config);
        log::debug!("queued {}ns interval, mode {}", config.frame_interval_ns, mode);
    }

    /// Drop timing history and configs; the pipe is leaving self-refresh.
    /// The next pulse bootstraps from scratch.
    pub fn clear_sync(&self) {
        let mut ctx = self.inner.ctx.lock();
        if !ctx.mode.self_refresh_capable() {
            return;
        }
        ctx.last_esync_ns = 0;
        ctx.last_vsync_ns = 0;
        ctx.last_gramscan_ns = 0;
        ctx.next_vsync_ns = 0;
        ctx.next_vsync_ecnt = 0;
        ctx.store.clear();
    }

    /// Set the brightness dimming step budget. A zero `remaining` and
    /// non-self-refresh modes are ignored.
    pub fn set_dimming_budget(&self, remaining: u32, full: u32) {
        let mut ctx = self.inner.ctx.lock();
        if !ctx.mode.self_refresh_capable() || remaining == 0 {
            return;
        }
        ctx.remain_bq_cnt = remaining;
        ctx.full_bq_cnt = full;
        log::debug!("dimming budget {}/{}", remaining, full);
    }

    /// Raise or drop a transient-dimming source.
    ///
    /// The aggregate enable state mirrors into the pipe on transitions.
    /// Command mode additionally holds the transfer trigger mask while any
    /// source is active, so the dimming commands land between frame
    /// transfers.
    pub fn set_trans_dimming(&self, source: DimmingSource, en: bool) {
        let mut ctx = self.inner.ctx.lock();
        if !ctx.mode.self_refresh_capable() || ctx.store.current.frame_interval_ns == 0 {
            return;
        }

        let was_active = ctx.trans_dimming != 0;
        if en {
            ctx.trans_dimming |= source.bits();
        } else {
            ctx.trans_dimming &= !source.bits();
        }
        let active = ctx.trans_dimming != 0;
        if was_active == active {
            return;
        }

        self.inner.pipe.set_dimming(active);
        if ctx.mode == RefreshMode::Command {
            let work = if active {
                self.trigger_get_work
            } else {
                self.trigger_put_work
            };
            self.works.schedule(work);
        }
        log::debug!("trans dimming sources 0x{:x}", ctx.trans_dimming);
    }

    /// Block until every scheduled work has run. The simulator and tests
    /// use this to observe deterministic state.
    pub fn flush_works(&self) {
        self.works.flush();
    }

    pub fn snapshot(&self) -> RefreshSnapshot {
        let ctx = self.inner.ctx.lock();
        RefreshSnapshot {
            mode: ctx.mode,
            current: ctx.store.current,
            pended: ctx.store.pended,
            last_esync_ns: ctx.last_esync_ns,
            last_vsync_ns: ctx.last_vsync_ns,
            last_gramscan_ns: ctx.last_gramscan_ns,
            next_vsync_ns: ctx.next_vsync_ns,
            next_vsync_ecnt: ctx.next_vsync_ecnt,
            remain_bq_cnt: ctx.remain_bq_cnt,
            full_bq_cnt: ctx.full_bq_cnt,
            trans_dimming: ctx.trans_dimming,
            trigger_held: ctx.trigger_held,
            counters: ctx.counters,
        }
    }

    /// Command mode only: refresh the panel when the queued config's
    /// expected present time is 4, 2 or 1 pulses out.
    fn schedule_panel_refresh(&self, ctx: &mut RefreshContext, now_ns: u64) {
        if ctx.mode != RefreshMode::Command {
            return;
        }

        let pended = &ctx.store.pended;
        if pended.expected_present_time_ns == 0 || !pended.need_panel_refresh {
            return;
        }

        let remain = esync_count_closest(pended.expected_present_time_ns, now_ns);
        if parity::panel_refresh_window(remain) {
            if self.works.schedule(self.panel_refresh_work) {
                ctx.counters.panel_refresh_scheduled += 1;
            }
            log::debug!("panel refresh due in {} pulses", remain);
        }
    }

    /// Brightness dimming: always fire on the last pulse before the frame
    /// boundary; fire early per the parity table once the first step has
    /// run. Returns whether a step was due this pulse.
    fn schedule_brightness(&self, ctx: &mut RefreshContext) -> bool {
        let interval = ctx.store.current.frame_interval_ns;
        if interval == 0 || ctx.remain_bq_cnt == 0 {
            return false;
        }

        let due = if ctx.next_vsync_ecnt == 1 {
            true
        } else if ctx.full_bq_cnt == ctx.remain_bq_cnt {
            // The sequence has not started; the frame boundary starts it.
            false
        } else {
            parity::brightness_early_fire(
                ctx.mode,
                is_odd_interval(i64::from(interval)),
                ctx.next_vsync_ecnt,
            )
        };

        if due && self.works.schedule(self.brightness_work) {
            ctx.counters.brightness_scheduled += 1;
        }
        due
    }
}

/// Whether an active transient-dimming source wants this pulse.
fn trans_dimming_due(ctx: &RefreshContext) -> bool {
    let interval = ctx.store.current.frame_interval_ns;
    if interval == 0 || ctx.trans_dimming == 0 {
        return false;
    }
    if ctx.next_vsync_ecnt == 1 {
        return true;
    }
    parity::trans_early_fire(is_odd_interval(i64::from(interval)), ctx.next_vsync_ecnt)
}
