//! Frame-timing configuration: the applied/queued pair and the
//! commit-boundary validator.

use crate::timing::{div_round_closest, in_range, ESYNC_NS};
use serde::{Deserialize, Serialize};

/// One frame-timing request from the compositor.
///
/// `frame_interval_ns == 0` stands for "no config"; a queued instance in
/// that state is never promoted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DvrrConfig {
    pub frame_interval_ns: u32,
    /// Earliest instant the config may take effect; zero applies it at the
    /// next pulse.
    pub adjusted_present_time_ns: u64,
    /// Instant the compositor expects the change on glass.
    pub expected_present_time_ns: u64,
    /// The panel must redraw itself around the expected present time.
    pub need_panel_refresh: bool,
}

/// Applied and queued config pair.
///
/// The compositor queues, the pulse path promotes. A freshly registered
/// pipe runs at the nominal pulse period until the first commit lands.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    pub current: DvrrConfig,
    pub pended: DvrrConfig,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    pub fn new() -> Self {
        Self {
            current: DvrrConfig {
                frame_interval_ns: ESYNC_NS as u32,
                ..DvrrConfig::default()
            },
            pended: DvrrConfig::default(),
        }
    }

    /// Queue a config for promotion. Last writer wins; there is no merge.
    pub fn queue(&mut self, config: DvrrConfig) {
        self.pended = config;
    }

    /// Promote the queued config once its activation time has passed.
    ///
    /// No-op without a queued config or while the activation time is still
    /// ahead; idempotent because promotion consumes the queued slot.
    pub fn promote(&mut self, now_ns: u64) -> bool {
        if self.pended.frame_interval_ns == 0 {
            return false;
        }

        let adj = self.pended.adjusted_present_time_ns;
        if adj != 0 && adj > now_ns {
            log::debug!("config held, activation {}ns > now {}ns", adj, now_ns);
            return false;
        }

        self.current = self.pended;
        self.pended = DvrrConfig::default();
        log::debug!(
            "applied frame interval {}ns at {}ns",
            self.current.frame_interval_ns,
            now_ns
        );
        true
    }

    /// Drop both configs and fall back to the nominal pulse period.
    pub fn clear(&mut self) {
        self.current = DvrrConfig {
            frame_interval_ns: ESYNC_NS as u32,
            ..DvrrConfig::default()
        };
        self.pended = DvrrConfig::default();
    }
}

/// Commit-boundary validation for a requested frame interval.
///
/// Zero passes through (self-refresh stays idle), out-of-band requests are
/// rejected to zero, accepted ones snap to a whole pulse count so downstream
/// parity arithmetic sees exact multiples.
pub fn snap_frame_interval(frame_interval_ns: u32, min_ns: u32, max_ns: u32) -> u32 {
    if frame_interval_ns == 0 {
        return 0;
    }

    let ns = i64::from(frame_interval_ns);
    if !in_range(ns, i64::from(min_ns), i64::from(max_ns)) {
        log::error!(
            "rejected frame interval {}ns, accepted range {}..{}ns",
            frame_interval_ns,
            min_ns,
            max_ns
        );
        return 0;
    }

    (div_round_closest(ns, ESYNC_NS) * ESYNC_NS) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::{MAX_FRAME_INTERVAL_NS, MIN_FRAME_INTERVAL_NS};

    fn pending(interval: u32, adj: u64) -> DvrrConfig {
        DvrrConfig {
            frame_interval_ns: interval,
            adjusted_present_time_ns: adj,
            ..DvrrConfig::default()
        }
    }

    #[test]
    fn test_new_store_runs_at_nominal_period() {
        let store = ConfigStore::new();
        assert_eq!(store.current.frame_interval_ns, ESYNC_NS as u32);
        assert_eq!(store.pended.frame_interval_ns, 0);
    }

    #[test]
    fn test_promote_without_pending_is_noop() {
        let mut store = ConfigStore::new();
        assert!(!store.promote(1_000_000_000));
        assert_eq!(store.current.frame_interval_ns, ESYNC_NS as u32);
    }

    #[test]
    fn test_promote_boundary() {
        let mut store = ConfigStore::new();
        store.queue(pending(16_666_667, 5_000_000_000));

        // One nanosecond early: held.
        assert!(!store.promote(4_999_999_999));
        assert_eq!(store.current.frame_interval_ns, ESYNC_NS as u32);

        // Exactly at the activation time: applied.
        assert!(store.promote(5_000_000_000));
        assert_eq!(store.current.frame_interval_ns, 16_666_667);
        assert_eq!(store.pended, DvrrConfig::default());
    }

    #[test]
    fn test_promote_is_idempotent() {
        let mut store = ConfigStore::new();
        store.queue(pending(16_666_667, 0));

        assert!(store.promote(1_000));
        let applied = store.current;
        assert!(!store.promote(2_000));
        assert_eq!(store.current, applied);
    }

    #[test]
    fn test_zero_activation_promotes_immediately() {
        let mut store = ConfigStore::new();
        store.queue(pending(33_333_328, 0));
        assert!(store.promote(1));
        assert_eq!(store.current.frame_interval_ns, 33_333_328);
    }

    #[test]
    fn test_queue_last_writer_wins() {
        let mut store = ConfigStore::new();
        store.queue(pending(16_666_667, 9_000));
        store.queue(pending(33_333_328, 0));

        assert!(store.promote(1_000));
        assert_eq!(store.current.frame_interval_ns, 33_333_328);
    }

    #[test]
    fn test_clear_resets_to_nominal() {
        let mut store = ConfigStore::new();
        store.queue(pending(16_666_667, 0));
        store.promote(1_000);

        store.clear();
        assert_eq!(store.current.frame_interval_ns, ESYNC_NS as u32);
        assert_eq!(store.pended, DvrrConfig::default());
    }

    #[test]
    fn test_snap_zero_passes_through() {
        assert_eq!(
            snap_frame_interval(0, MIN_FRAME_INTERVAL_NS as u32, MAX_FRAME_INTERVAL_NS as u32),
            0
        );
    }

    #[test]
    fn test_snap_rejects_out_of_band() {
        let (min, max) = (MIN_FRAME_INTERVAL_NS as u32, MAX_FRAME_INTERVAL_NS as u32);
        assert_eq!(snap_frame_interval(min - 1, min, max), 0);
        assert_eq!(snap_frame_interval(max + 1, min, max), 0);
        assert_eq!(snap_frame_interval(1_000_000, min, max), 0);
    }

    #[test]
    fn test_snap_rounds_to_pulse_multiple() {
        let (min, max) = (MIN_FRAME_INTERVAL_NS as u32, MAX_FRAME_INTERVAL_NS as u32);
        // Raw 60Hz requests land on 4 pulses.
        assert_eq!(snap_frame_interval(16_666_667, min, max), 16_666_664);
        // An accepted boundary value still snaps to a whole pulse count.
        assert_eq!(snap_frame_interval(min, min, max), 8_333_332);
        assert_eq!(snap_frame_interval(100_000_000, min, max), 99_999_984);
    }
}
