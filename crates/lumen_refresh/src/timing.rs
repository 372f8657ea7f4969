//! Pulse-period constants and rounding rules.
//!
//! All timing arithmetic runs on signed 64-bit nanoseconds with truncating
//! integer division, so every derived count lands exactly where the hardware
//! counters land. Pulse counts divide out of elapsed time round-to-nearest.

pub const NSEC_PER_SEC: i64 = 1_000_000_000;

/// Nominal period of the fixed 240Hz emission sync pulse.
pub const ESYNC_NS: i64 = hz_to_ns(240);

/// Half a pulse period, the tolerance band for classification.
pub const HALF_ESYNC_NS: i64 = ESYNC_NS / 2;

/// Lower edge of the in-band pulse acceptance window.
pub const MIN_ESYNC_NS: i64 = ESYNC_NS - HALF_ESYNC_NS;

/// Upper edge of the in-band pulse acceptance window.
pub const MAX_ESYNC_NS: i64 = ESYNC_NS + HALF_ESYNC_NS;

/// Shortest frame interval a commit may carry: 120Hz minus the band.
pub const MIN_FRAME_INTERVAL_NS: i64 = hz_to_ns(120) - HALF_ESYNC_NS;

/// Longest frame interval a commit may carry: 10Hz plus the band.
pub const MAX_FRAME_INTERVAL_NS: i64 = hz_to_ns(10) + HALF_ESYNC_NS;

/// How long the generic refresh worker yields to a possible user commit:
/// half a pulse period, rounded to 100us.
pub const WAIT_COMMIT_US: i64 = div_round_closest(HALF_ESYNC_NS / 1_000, 100) * 100;

/// Period of a refresh rate in nanoseconds.
pub const fn hz_to_ns(hz: u32) -> i64 {
    NSEC_PER_SEC / hz as i64
}

/// Inclusive range check. A non-positive or inverted range never matches.
pub const fn in_range(val: i64, min: i64, max: i64) -> bool {
    min > 0 && min < max && val >= min && val <= max
}

/// Round-to-nearest division, ties away from zero.
pub const fn div_round_closest(x: i64, d: i64) -> i64 {
    if (x > 0) == (d > 0) {
        (x + d / 2) / d
    } else {
        (x - d / 2) / d
    }
}

/// Whether a frame interval spans an odd number of pulses.
pub fn is_odd_interval(frame_interval_ns: i64) -> bool {
    div_round_closest(frame_interval_ns, ESYNC_NS) & 1 == 1
}

/// Pulse count between an instant and a later deadline, round-to-nearest.
pub fn esync_count_closest(later_ns: u64, now_ns: u64) -> i64 {
    div_round_closest(later_ns as i64 - now_ns as i64, ESYNC_NS)
}
