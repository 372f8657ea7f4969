//! Still-insertion admission control.

use std::sync::atomic::{AtomicU64, Ordering};

/// Saturating block refcount.
///
/// External sessions (TUI, secure content) take the gate to veto still
/// insertion; the pulse path checks it lock-free. Unblocking more times
/// than blocking is a caller bug; the count pins at zero instead of
/// wrapping.
#[derive(Debug, Default)]
pub struct StillGate {
    count: AtomicU64,
}

impl StillGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the gate; returns the new count.
    pub fn block(&self) -> u64 {
        self.count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Release the gate; returns the new count. Saturates at zero.
    pub fn unblock(&self) -> u64 {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1))
            .map(|prev| prev - 1)
            .unwrap_or(0)
    }

    pub fn is_blocked(&self) -> bool {
        self.count.load(Ordering::Acquire) > 0
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_unblock() {
        let gate = StillGate::new();
        assert!(!gate.is_blocked());

        assert_eq!(gate.block(), 1);
        assert_eq!(gate.block(), 2);
        assert!(gate.is_blocked());

        assert_eq!(gate.unblock(), 1);
        assert!(gate.is_blocked());
        assert_eq!(gate.unblock(), 0);
        assert!(!gate.is_blocked());
    }

    #[test]
    fn test_unblock_never_goes_below_zero() {
        let gate = StillGate::new();

        assert_eq!(gate.unblock(), 0);
        assert_eq!(gate.unblock(), 0);
        assert_eq!(gate.count(), 0);

        // A later block still counts from zero, not from a wrapped value.
        assert_eq!(gate.block(), 1);
        assert_eq!(gate.unblock(), 0);
        assert_eq!(gate.unblock(), 0);
    }

    #[test]
    fn test_concurrent_block_unblock() {
        use std::sync::Arc;

        let gate = Arc::new(StillGate::new());
        let mut handles = Vec::new();

        for _ in 0..4 {
            let g = Arc::clone(&gate);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1_000 {
                    g.block();
                    g.unblock();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(gate.count(), 0);
    }
}
