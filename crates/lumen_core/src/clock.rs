//! Time sources.
//!
//! All timing arithmetic runs on unsigned monotonic nanoseconds. Production
//! code reads a [`MonotonicClock`]; tests and the simulator drive a
//! [`ManualClock`] so pulse scenarios land on exact instants.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic nanosecond time source with an arbitrary epoch.
pub trait Clock: Send + Sync {
    /// Current time in nanoseconds. Never goes backwards.
    fn now_ns(&self) -> u64;
}

/// Wall clock backed by `Instant`. Epoch is the moment of construction.
#[derive(Debug)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

/// Hand-driven clock. Time moves only when the test or script says so.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ns: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ns),
        }
    }

    /// Move time forward by `delta_ns`; returns the new now.
    pub fn advance(&self, delta_ns: u64) -> u64 {
        self.now.fetch_add(delta_ns, Ordering::AcqRel) + delta_ns
    }

    /// Jump to an absolute instant. Callers keep this monotonic.
    pub fn set(&self, now_ns: u64) {
        self.now.store(now_ns, Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_ns(), 1_000);
        assert_eq!(clock.advance(500), 1_500);
        assert_eq!(clock.now_ns(), 1_500);
    }

    #[test]
    fn test_manual_clock_set() {
        let clock = ManualClock::new(0);
        clock.set(42);
        assert_eq!(clock.now_ns(), 42);
    }

    #[test]
    fn test_monotonic_clock_moves_forward() {
        let clock = MonotonicClock::new();
        let a = clock.now_ns();
        let b = clock.now_ns();
        assert!(b >= a);
    }
}
