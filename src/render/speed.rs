//! Playback speed shared between the game and GUI threads

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic playback speed stored as u64 bits of an f64
///
/// 1.0 is normal playback, 0.0 is paused. Negative values rewind.
pub struct PlaybackSpeed(AtomicU64);

impl PlaybackSpeed {
    /// Create with normal speed
    pub fn new() -> Self {
        Self(AtomicU64::new(1.0f64.to_bits()))
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    /// Set the speed; NaN is treated as paused
    pub fn set(&self, speed: f64) {
        let speed = if speed.is_nan() { 0.0 } else { speed };
        self.0.store(speed.to_bits(), Ordering::Release);
    }

    /// Check for exactly zero speed
    pub fn is_paused(&self) -> bool {
        self.get() == 0.0
    }
}

impl Default for PlaybackSpeed {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PlaybackSpeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PlaybackSpeed").field(&self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_normal_speed() {
        let speed = PlaybackSpeed::default();
        assert_eq!(speed.get(), 1.0);
        assert!(!speed.is_paused());
    }

    #[test]
    fn test_pause_and_rewind() {
        let speed = PlaybackSpeed::new();
        speed.set(0.0);
        assert!(speed.is_paused());

        speed.set(-2.0);
        assert_eq!(speed.get(), -2.0);
        assert!(!speed.is_paused());

        speed.set(f64::NAN);
        assert!(speed.is_paused());
    }
}
