//! Early-fire parity tables for the dimming works.
//!
//! `ecnt` is the remaining pulse count to the next real frame boundary.
//! The thresholds pick the latest pulse from which a deferred panel command
//! still lands strictly before that boundary, given the hardware's odd/even
//! sub-pulse alignment. The Command-mode brightness threshold of 5 against
//! the trans-dimming 4 in the odd case is an alignment offset; the tables
//! stay distinct.
//!
//! The unconditional fire at `ecnt == 1` is the callers' business; these
//! predicates only answer whether an early pulse qualifies.

use lumen_core::RefreshMode;

/// Early-fire test for a brightness dimming step.
pub fn brightness_early_fire(mode: RefreshMode, odd_interval: bool, ecnt: i64) -> bool {
    match mode {
        RefreshMode::Vhm if odd_interval => ecnt & 1 == 0 && ecnt >= 4,
        RefreshMode::Vhm => ecnt & 1 == 1 && ecnt >= 3,
        RefreshMode::Command if odd_interval => ecnt & 1 == 1 && ecnt >= 5,
        RefreshMode::Command => ecnt & 1 == 0 && ecnt >= 2,
        _ => false,
    }
}

/// Early-fire test for transient dimming. Mode independent.
pub fn trans_early_fire(odd_interval: bool, ecnt: i64) -> bool {
    if odd_interval {
        ecnt & 1 == 0 && ecnt >= 4
    } else {
        ecnt & 1 == 1 && ecnt >= 3
    }
}

/// Pulse counts at which a queued panel refresh must run so it cannot
/// collide with a frame update around the expected present time.
pub fn panel_refresh_window(remain_ecnt: i64) -> bool {
    matches!(remain_ecnt, 1 | 2 | 4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::RefreshMode;

    fn fires(mode: RefreshMode, odd: bool) -> Vec<i64> {
        (1..=8)
            .filter(|&ecnt| brightness_early_fire(mode, odd, ecnt))
            .collect()
    }

    #[test]
    fn test_brightness_table_enumeration() {
        assert_eq!(fires(RefreshMode::Vhm, true), vec![4, 6, 8]);
        assert_eq!(fires(RefreshMode::Vhm, false), vec![3, 5, 7]);
        assert_eq!(fires(RefreshMode::Command, true), vec![5, 7]);
        assert_eq!(fires(RefreshMode::Command, false), vec![2, 4, 6, 8]);
    }

    #[test]
    fn test_brightness_other_modes_never_fire() {
        for mode in [RefreshMode::Video, RefreshMode::Undefined] {
            for odd in [true, false] {
                assert!(fires(mode, odd).is_empty());
            }
        }
    }

    #[test]
    fn test_trans_table_enumeration() {
        let odd: Vec<i64> = (1..=8).filter(|&e| trans_early_fire(true, e)).collect();
        let even: Vec<i64> = (1..=8).filter(|&e| trans_early_fire(false, e)).collect();
        assert_eq!(odd, vec![4, 6, 8]);
        assert_eq!(even, vec![3, 5, 7]);
    }

    #[test]
    fn test_command_odd_offset_stays_distinct() {
        // ecnt == 4 is a trans-dimming pulse but not a brightness pulse in
        // odd Command mode; 5 is the other way around.
        assert!(trans_early_fire(true, 4));
        assert!(!brightness_early_fire(RefreshMode::Command, true, 4));
        assert!(brightness_early_fire(RefreshMode::Command, true, 5));
        assert!(!trans_early_fire(true, 5));
    }

    #[test]
    fn test_panel_refresh_window() {
        for remain in 0..=8 {
            assert_eq!(
                panel_refresh_window(remain),
                matches!(remain, 1 | 2 | 4),
                "remain {}",
                remain
            );
        }
        assert!(!panel_refresh_window(-1));
    }
}
