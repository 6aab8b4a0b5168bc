//! Bounded set of backend resource headers

use crossbeam_channel::{bounded, Receiver, Sender};
use std::time::Duration;
use tracing::warn;

/// Fixed number of hardware buffer headers shared by a pool
///
/// Each outstanding buffer holds one header. Acquiring blocks for at most the
/// given timeout, so an exhausted pool degrades into dropped frames instead
/// of a stalled producer.
pub struct HeaderSlots {
    tx: Sender<()>,
    rx: Receiver<()>,
    capacity: usize,
}

impl HeaderSlots {
    /// Create `capacity` free headers
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        for _ in 0..capacity {
            // Cannot fail, the channel was sized for exactly this many
            let _ = tx.try_send(());
        }
        Self { tx, rx, capacity }
    }

    /// Wait up to `timeout` for a free header
    pub fn acquire(&self, timeout: Duration) -> bool {
        if timeout.is_zero() {
            return self.rx.try_recv().is_ok();
        }
        self.rx.recv_timeout(timeout).is_ok()
    }

    /// Give a header back
    pub fn release(&self) {
        if self.tx.try_send(()).is_err() {
            warn!("Header released with all {} headers free", self.capacity);
        }
    }

    /// Number of free headers
    pub fn available(&self) -> usize {
        self.rx.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_acquire_until_exhausted() {
        let slots = HeaderSlots::new(2);
        assert!(slots.acquire(Duration::ZERO));
        assert!(slots.acquire(Duration::ZERO));
        assert!(!slots.acquire(Duration::ZERO));
        assert_eq!(slots.available(), 0);

        slots.release();
        assert_eq!(slots.available(), 1);
        assert!(slots.acquire(Duration::from_millis(1)));
    }

    #[test]
    fn test_timeout_is_bounded() {
        let slots = HeaderSlots::new(1);
        assert!(slots.acquire(Duration::ZERO));

        let start = Instant::now();
        assert!(!slots.acquire(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_over_release_is_ignored() {
        let slots = HeaderSlots::new(1);
        slots.release();
        assert_eq!(slots.available(), 1);
    }
}
