//! # Lumen Core
//!
//! Shared primitives for the lumen display timing engine.
//!
//! The timing controllers split their work across two execution contexts:
//! a pulse-arrival fast path that may only read clocks, flip atomics and
//! enqueue work, and deferred contexts that talk to the panel and may sleep.
//! This crate provides the pieces both sides agree on:
//!
//! - [`Clock`]: monotonic nanosecond time, with a hand-driven implementation
//!   for tests and simulation
//! - [`WorkQueue`]: a single-thread deferred-work executor with
//!   enqueue-if-absent and synchronous cancellation semantics
//! - [`StillGate`]: the saturating refcount that vetoes still insertion
//! - hardware seams ([`PanelLink`], [`DisplayPipe`], [`VmcHal`]) the
//!   controllers are written against

pub mod clock;
pub mod error;
pub mod gate;
pub mod link;
pub mod types;
pub mod work;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::{LinkError, LinkResult};
pub use gate::StillGate;
pub use link::{DisplayPipe, PanelLink, PipePower, VmcHal};
pub use types::{FreqStep, FreqStepTable, RefreshMode, DCS_STILL_OFF, DCS_STILL_ON, DCS_STILL_ON_FLY};
pub use work::{JobId, WorkQueue, WorkQueueBuilder};
