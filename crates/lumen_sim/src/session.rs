//! Command execution against a live controller pair.
//!
//! A session owns both controllers wired over the recording fakes, a
//! hand-driven clock and the shared still gate. Pulses fan out the way the
//! interrupt lines do on hardware: the scheduler classifies first, a frame
//! boundary reloads the still trigger budget, then the still countdown
//! runs. Work queues are drained after every pulse so scripts observe one
//! deterministic state per command.

use std::sync::Arc;

use lumen_core::{Clock, DisplayPipe, ManualClock, PanelLink, RefreshMode, StillGate, VmcHal};
use lumen_refresh::{snap_frame_interval, RefreshSnapshot, SelfRefresh, SyncMask};
use lumen_vmc::{Vmc, VmcConfig, VmcSnapshot};
use serde::Serialize;
use serde_json::Value;

use crate::board::{BoardConfig, BoardError};
use crate::command::Command;
use crate::fakes::{HalSnapshot, PanelSnapshot, PipeSnapshot, SimHal, SimPanel, SimPipe};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("assert {path}: expected {expected}, got {actual}")]
    AssertFailed {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("assert path not found: {0}")]
    UnknownField(String),

    #[error("snapshot serialization failed: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// What the caller should do after a command.
#[derive(Debug)]
pub enum Step {
    Continue,
    /// Text for the caller to print.
    Output(String),
    Quit,
}

/// Combined machine state, one JSON document per `dump-state`.
#[derive(Debug, Serialize)]
pub struct SimSnapshot {
    pub now_ns: u64,
    pub blocked: bool,
    pub refresh: RefreshSnapshot,
    /// Absent on boards without the still-insertion block.
    pub vmc: Option<VmcSnapshot>,
    pub panel: PanelSnapshot,
    pub pipe: PipeSnapshot,
    pub hal: HalSnapshot,
}

pub struct Session {
    board: BoardConfig,
    mode: RefreshMode,
    /// Interval of the last accepted queue, handed to the commit hook the
    /// way committed state carries it on hardware.
    last_interval_ns: u32,
    clock: Arc<ManualClock>,
    gate: Arc<StillGate>,
    panel: Arc<SimPanel>,
    pipe: Arc<SimPipe>,
    hal: Arc<SimHal>,
    refresh: SelfRefresh,
    vmc: Option<Vmc>,
}

impl Session {
    pub fn new(board: BoardConfig) -> Result<Self, BoardError> {
        let clock = Arc::new(ManualClock::new(board.start_ns));
        let gate = Arc::new(StillGate::new());
        let panel = Arc::new(SimPanel::new(board.freq_step_table()));
        let pipe = Arc::new(SimPipe::new(board.mode));
        if board.frame_start_timeout {
            pipe.set_frame_start_ok(false);
        }
        let hal = Arc::new(SimHal::default());

        let refresh = SelfRefresh::new(
            Arc::clone(&panel) as Arc<dyn PanelLink>,
            Arc::clone(&pipe) as Arc<dyn DisplayPipe>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            Arc::clone(&gate),
            board.refresh,
        );
        refresh.set_mode(board.mode);

        let vmc = VmcConfig::derive(board.esync_hz, board.min_frame_rate_hz, board.mode)?
            .map(|config| {
                Vmc::new(
                    config,
                    Arc::clone(&hal) as Arc<dyn VmcHal>,
                    Arc::clone(&panel) as Arc<dyn PanelLink>,
                    Arc::clone(&pipe) as Arc<dyn DisplayPipe>,
                    Arc::clone(&gate),
                    board.vmc,
                )
            });
        if vmc.is_none() {
            log::info!(
                "board boots in {} mode, still insertion not instantiated",
                board.mode
            );
        }

        Ok(Self {
            mode: board.mode,
            last_interval_ns: 0,
            board,
            clock,
            gate,
            panel,
            pipe,
            hal,
            refresh,
            vmc,
        })
    }

    pub fn run(&mut self, command: Command) -> Result<Step, SessionError> {
        match command {
            Command::Tick(ns) => {
                self.clock.advance(ns);
                self.pulse();
            }
            Command::Pulse => self.pulse(),
            Command::Commit(plane_mask) => {
                if let Some(vmc) = &self.vmc {
                    vmc.on_commit(plane_mask, self.last_interval_ns);
                    vmc.flush_works();
                }
            }
            Command::Queue(request) => {
                let mut config = request;
                config.frame_interval_ns = snap_frame_interval(
                    request.frame_interval_ns,
                    self.board.min_frame_interval_ns,
                    self.board.max_frame_interval_ns,
                );
                self.last_interval_ns = config.frame_interval_ns;
                self.refresh.queue_config(self.mode, config);
            }
            Command::Mode(mode) => {
                self.mode = mode;
                self.pipe.set_mode(mode);
                self.refresh.set_mode(mode);
            }
            Command::Enable => match &self.vmc {
                Some(vmc) => vmc.enable(),
                None => log::warn!("enable ignored, no still-insertion block"),
            },
            Command::Disable => match &self.vmc {
                Some(vmc) => vmc.disable(),
                None => log::warn!("disable ignored, no still-insertion block"),
            },
            Command::Block => match &self.vmc {
                Some(vmc) => vmc.block(true),
                None => {
                    self.gate.block();
                }
            },
            Command::Unblock => match &self.vmc {
                Some(vmc) => vmc.unblock(),
                None => {
                    self.gate.unblock();
                }
            },
            Command::Dim { remaining, full } => {
                self.panel.set_remaining_steps(remaining);
                self.refresh.set_dimming_budget(remaining, full);
            }
            Command::DumpState => {
                let rendered = serde_json::to_string_pretty(&self.snapshot())?;
                return Ok(Step::Output(rendered));
            }
            Command::Assert { path, value } => self.check(&path, &value)?,
            Command::Quit => return Ok(Step::Quit),
        }
        Ok(Step::Continue)
    }

    pub fn snapshot(&self) -> SimSnapshot {
        SimSnapshot {
            now_ns: self.clock.now_ns(),
            blocked: self.gate.is_blocked(),
            refresh: self.refresh.snapshot(),
            vmc: self.vmc.as_ref().map(|vmc| vmc.snapshot()),
            panel: self.panel.snapshot(),
            pipe: self.pipe.snapshot(),
            hal: self.hal.snapshot(),
        }
    }

    /// One emission sync pulse, fanned out like the interrupt lines: the
    /// scheduler classifies, a frame boundary reloads the still budget,
    /// then the countdown sees the pulse.
    fn pulse(&self) {
        let mask = self.refresh.on_pulse();
        if let Some(vmc) = &self.vmc {
            if mask.contains(SyncMask::FRAME_INTERVAL) {
                vmc.rearm();
            }
            vmc.on_pulse();
            vmc.flush_works();
        }
        self.refresh.flush_works();
    }

    fn check(&self, path: &str, expected: &str) -> Result<(), SessionError> {
        let snapshot = serde_json::to_value(self.snapshot())?;
        let Some(actual) = lookup(&snapshot, path) else {
            return Err(SessionError::UnknownField(path.to_string()));
        };
        let actual = render(actual);
        if actual != expected {
            return Err(SessionError::AssertFailed {
                path: path.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(())
    }
}

/// Walk a dotted path through objects and array indices.
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |v, key| match v {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|idx| items.get(idx)),
        _ => None,
    })
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
