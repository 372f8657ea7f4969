//! Pulse classification.
//!
//! Every pulse is either in-band (ESYNC) or out-of-band (GRAMSCAN), judged
//! by the gap since the previous pulse. Independently, the pulse marks a
//! real frame boundary (FRAME_INTERVAL) when the active frame interval has
//! elapsed or a queued config just took effect, so FRAME_INTERVAL combines
//! with either of the other two.

use crate::config::ConfigStore;
use crate::timing::{in_range, HALF_ESYNC_NS, MAX_ESYNC_NS, MIN_ESYNC_NS};
use serde::{Deserialize, Serialize};

/// Classification of one timing pulse.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMask(u8);

impl SyncMask {
    pub const NONE: Self = Self(0);

    /// In-band pulse: landed within half a period of the previous one.
    pub const ESYNC: Self = Self(1 << 0);

    /// The frame interval elapsed; this pulse is the real vsync.
    pub const FRAME_INTERVAL: Self = Self(1 << 1);

    /// Out-of-band pulse, typically the panel RAM scan-out boundary.
    pub const GRAMSCAN: Self = Self(1 << 2);

    pub const ALL: Self = Self(0b111);

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for SyncMask {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for SyncMask {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Classify the pulse at `now_ns` and attempt config promotion.
///
/// Returns the mask and whether a queued config was promoted. Promotion
/// makes the pulse a FRAME_INTERVAL regardless of elapsed time: the new
/// interval starts counting from this pulse.
pub(crate) fn classify(
    store: &mut ConfigStore,
    last_esync_ns: u64,
    last_vsync_ns: u64,
    now_ns: u64,
) -> (SyncMask, bool) {
    let esync_gap = now_ns as i64 - last_esync_ns as i64;
    let mut mask = if in_range(esync_gap, MIN_ESYNC_NS, MAX_ESYNC_NS) {
        SyncMask::ESYNC
    } else {
        SyncMask::GRAMSCAN
    };

    let (frame, promoted) = frame_interval_check(store, last_vsync_ns, now_ns);
    if frame {
        mask.insert(SyncMask::FRAME_INTERVAL);
    }

    (mask, promoted)
}

fn frame_interval_check(store: &mut ConfigStore, last_vsync_ns: u64, now_ns: u64) -> (bool, bool) {
    let interval = i64::from(store.current.frame_interval_ns);
    let vsync_gap = now_ns as i64 - last_vsync_ns as i64;

    if store.promote(now_ns) {
        return (true, true);
    }

    if in_range(vsync_gap, interval - HALF_ESYNC_NS, interval + HALF_ESYNC_NS) {
        return (true, false);
    }

    if vsync_gap > interval {
        log::debug!("vsync gap {}ns over frame interval {}ns", vsync_gap, interval);
        return (true, false);
    }

    (false, false)
}
