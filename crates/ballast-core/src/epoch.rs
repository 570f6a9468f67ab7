//! Fixed-duration epoch arithmetic.
//!
//! Epoch `n` spans `[n * Δ, (n + 1) * Δ)`. Lock expiries and
//! synchronization boundaries always sit on an epoch start.

use serde::{Deserialize, Serialize};

use crate::constants::EPOCH_DURATION;
use crate::error::LedgerError;

/// Epoch conversions for a fixed period length `Δ`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct EpochClock {
    duration: u64,
}

impl Default for EpochClock {
    fn default() -> Self {
        Self { duration: EPOCH_DURATION }
    }
}

impl EpochClock {
    /// Clock with period `duration` seconds. `duration` must be non-zero;
    /// [`LedgerConfig::validate`](crate::config::LedgerConfig::validate)
    /// enforces this before a clock is built from configuration.
    pub fn new(duration: u64) -> Self {
        debug_assert!(duration > 0, "epoch duration must be non-zero");
        Self { duration }
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    /// `floor(t / Δ)`.
    ///
    /// # Examples
    ///
    /// ```
    /// use ballast_core::epoch::EpochClock;
    /// let clock = EpochClock::new(100);
    /// assert_eq!(clock.epoch_number(0), 0);
    /// assert_eq!(clock.epoch_number(99), 0);
    /// assert_eq!(clock.epoch_number(100), 1);
    /// ```
    pub fn epoch_number(&self, t: u64) -> u64 {
        t / self.duration
    }

    /// `n * Δ`, saturating.
    pub fn epoch_start(&self, n: u64) -> u64 {
        n.saturating_mul(self.duration)
    }

    /// `(n + 1) * Δ`, saturating.
    pub fn epoch_end(&self, n: u64) -> u64 {
        n.saturating_add(1).saturating_mul(self.duration)
    }

    pub fn is_epoch_aligned(&self, t: u64) -> bool {
        t % self.duration == 0
    }

    /// Fail with [`LedgerError::InvalidEpochTime`] unless `t` is an epoch start.
    pub fn ensure_aligned(&self, t: u64) -> Result<(), LedgerError> {
        if self.is_epoch_aligned(t) {
            Ok(())
        } else {
            Err(LedgerError::InvalidEpochTime(t))
        }
    }

    /// Start of the epoch containing `t`.
    pub fn current_epoch_start(&self, t: u64) -> u64 {
        self.epoch_start(self.epoch_number(t))
    }

    /// Start of the epoch after the one containing `t`.
    pub fn next_epoch_start(&self, t: u64) -> u64 {
        self.epoch_end(self.epoch_number(t))
    }

    /// Whole epochs between the next epoch start and `expiry`.
    ///
    /// Zero once `expiry` is within (or before) the next epoch. Used by the
    /// "too soon" guards on amount, duration and delegation changes.
    ///
    /// # Examples
    ///
    /// ```
    /// use ballast_core::epoch::EpochClock;
    /// let clock = EpochClock::new(100);
    /// // now is in epoch 0, next epoch starts at 100
    /// assert_eq!(clock.epochs_remaining(400, 50), 3);
    /// assert_eq!(clock.epochs_remaining(100, 50), 0);
    /// assert_eq!(clock.epochs_remaining(100, 150), 0);
    /// ```
    pub fn epochs_remaining(&self, expiry: u64, now: u64) -> u64 {
        expiry.saturating_sub(self.next_epoch_start(now)) / self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn week() -> EpochClock {
        EpochClock::default()
    }

    #[test]
    fn default_uses_week_epochs() {
        assert_eq!(week().duration(), EPOCH_DURATION);
    }

    #[test]
    fn start_end_bracket_epoch() {
        let c = week();
        assert_eq!(c.epoch_start(3), 3 * EPOCH_DURATION);
        assert_eq!(c.epoch_end(3), 4 * EPOCH_DURATION);
    }

    #[test]
    fn alignment() {
        let c = week();
        assert!(c.is_epoch_aligned(0));
        assert!(c.is_epoch_aligned(5 * EPOCH_DURATION));
        assert!(!c.is_epoch_aligned(5 * EPOCH_DURATION + 1));
        assert_eq!(
            c.ensure_aligned(EPOCH_DURATION + 1),
            Err(LedgerError::InvalidEpochTime(EPOCH_DURATION + 1))
        );
        assert!(c.ensure_aligned(EPOCH_DURATION).is_ok());
    }

    #[test]
    fn next_epoch_start_on_boundary_moves_forward() {
        let c = week();
        assert_eq!(c.next_epoch_start(2 * EPOCH_DURATION), 3 * EPOCH_DURATION);
        assert_eq!(c.current_epoch_start(2 * EPOCH_DURATION), 2 * EPOCH_DURATION);
    }

    #[test]
    fn epoch_end_saturates() {
        let c = week();
        assert_eq!(c.epoch_end(u64::MAX), u64::MAX);
        assert_eq!(c.epoch_start(u64::MAX), u64::MAX);
    }

    #[test]
    fn epochs_remaining_counts_whole_epochs_after_current() {
        let c = week();
        let now = 10 * EPOCH_DURATION + 123;
        assert_eq!(c.epochs_remaining(13 * EPOCH_DURATION, now), 2);
        assert_eq!(c.epochs_remaining(12 * EPOCH_DURATION, now), 1);
        assert_eq!(c.epochs_remaining(11 * EPOCH_DURATION, now), 0);
        assert_eq!(c.epochs_remaining(5 * EPOCH_DURATION, now), 0);
    }

    proptest! {
        #[test]
        fn t_lies_within_its_epoch(t in 0u64..u64::MAX / 2) {
            let c = week();
            let n = c.epoch_number(t);
            prop_assert!(c.epoch_start(n) <= t);
            prop_assert!(t < c.epoch_end(n));
        }

        #[test]
        fn epoch_starts_are_aligned(n in 0u64..1_000_000) {
            let c = week();
            prop_assert!(c.is_epoch_aligned(c.epoch_start(n)));
        }
    }
}
