//! Still insertion for self-refresh capable panels.
//!
//! The emission timing block (VMC) keeps the panel scanning from its own
//! memory between real frames. This crate decides *when* to freeze the
//! panel: after a commit, the controller counts sync pulses down from the
//! panel's dimming budget and, if no new frame arrives first, defers a
//! "still" DCS command to a worker. A real commit cancels the worker,
//! releases the frozen frame and starts the count over.

pub mod config;
pub mod vmc;

pub use config::{VmcConfig, VmcConfigError, VmcDebug};
pub use vmc::{Vmc, VmcCounters, VmcSnapshot, VmcState};
