//! Atomic helpers shared by mining workers: nonce distribution and stop signals.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Hands out disjoint nonce batches to concurrent workers.
#[derive(Debug)]
pub struct NonceSource {
    next: AtomicU64,
}

impl NonceSource {
    pub const fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    #[inline]
    pub fn fetch(&self) -> u64 {
        self.reserve(1)
    }

    /// Reserve `count` consecutive nonces and return the first one.
    /// Nonces wrap around at `u64::MAX`.
    #[inline]
    pub fn reserve(&self, count: u64) -> u64 {
        self.next.fetch_add(count, Ordering::Relaxed)
    }
}

/// Cooperative stop signal, used both for external aborts and for a found seal.
#[derive(Debug)]
pub struct StopFlag {
    stop: AtomicBool,
}

impl StopFlag {
    pub const fn new() -> Self {
        Self {
            stop: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    pub fn force_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

impl Default for StopFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_source_hands_out_disjoint_batches() {
        let ns = NonceSource::new(5);
        assert_eq!(ns.fetch(), 5);
        assert_eq!(ns.reserve(10), 6);
        assert_eq!(ns.fetch(), 16);
    }

    #[test]
    fn nonce_source_wraps() {
        let ns = NonceSource::new(u64::MAX);
        assert_eq!(ns.fetch(), u64::MAX);
        assert_eq!(ns.fetch(), 0);
    }

    #[test]
    fn stop_flag_latches() {
        let flag = StopFlag::default();
        assert!(!flag.should_stop());
        flag.force_stop();
        assert!(flag.should_stop());
    }
}
