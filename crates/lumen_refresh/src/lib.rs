//! Pulse classification and self-refresh scheduling.
//!
//! A self-refresh capable pipe keeps the panel lit from its own memory and
//! only transfers when content changes. The cost is that frame pacing,
//! brightness dimming and panel refreshes can no longer ride on a steady
//! vsync; they have to be rebuilt from the emission sync pulse train. This
//! crate owns that rebuild: [`classify`] names each pulse,
//! [`config::ConfigStore`] holds the frame-timing config handed over by
//! atomic commits, and [`SelfRefresh`] turns both into scheduled panel and
//! pipe work.

pub mod classify;
pub mod config;
pub mod parity;
pub mod scheduler;
pub mod timing;

pub use classify::SyncMask;
pub use config::{snap_frame_interval, ConfigStore, DvrrConfig};
pub use scheduler::{
    DimmingSource, RefreshCounters, RefreshDebug, RefreshSnapshot, SelfRefresh,
};
