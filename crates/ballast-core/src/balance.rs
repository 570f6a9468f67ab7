//! Linear-decay balance primitive.
//!
//! A [`DecayBalance`] is an absolute `(bias, slope)` pair: its value at time
//! `t` is `bias - slope * t`, saturating at zero. Because the representation
//! is absolute (not relative to a checkpoint time), balances of different
//! locks can be summed and subtracted component-wise without re-basing, and
//! an aggregate is exactly the component-wise sum of its members.

use serde::{Deserialize, Serialize};

/// A linearly decaying quantity.
///
/// For a single lock, `slope = floor(total / max_term)` and
/// `bias = slope * expiry`, so the value reaches exactly zero at `expiry`.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct DecayBalance {
    pub bias: u128,
    pub slope: u128,
}

impl DecayBalance {
    pub const ZERO: Self = Self { bias: 0, slope: 0 };

    pub fn new(bias: u128, slope: u128) -> Self {
        Self { bias, slope }
    }

    /// Balance of a lock with `total` principal expiring at `expiry`.
    ///
    /// Returns `None` if `max_term` is zero or `slope * expiry` overflows.
    ///
    /// # Examples
    ///
    /// ```
    /// use ballast_core::balance::DecayBalance;
    ///
    /// let b = DecayBalance::for_lock(1_000, 500, 100).unwrap();
    /// assert_eq!(b.slope, 10);
    /// assert_eq!(b.bias, 5_000);
    /// assert_eq!(b.value_at(400), 1_000);
    /// assert_eq!(b.value_at(500), 0);
    /// ```
    pub fn for_lock(total: u128, expiry: u64, max_term: u64) -> Option<Self> {
        if max_term == 0 {
            return None;
        }
        let slope = total / max_term as u128;
        let bias = slope.checked_mul(expiry as u128)?;
        Some(Self { bias, slope })
    }

    /// The whole contribution of `slope` expiring at `expiry`.
    ///
    /// Subtracting this from an aggregate at `expiry` removes an expired
    /// lock without changing the aggregate's value at that instant.
    pub fn expiring(slope: u128, expiry: u64) -> Option<Self> {
        Some(Self {
            bias: slope.checked_mul(expiry as u128)?,
            slope,
        })
    }

    /// Value at time `t`: `bias - slope * t`, or zero once decayed.
    pub fn value_at(&self, t: u64) -> u128 {
        let decayed = self.slope.saturating_mul(t as u128);
        self.bias.saturating_sub(decayed)
    }

    pub fn is_zero(&self) -> bool {
        self.bias == 0 && self.slope == 0
    }

    /// Component-wise addition, `None` on overflow.
    pub fn checked_add(&self, other: &DecayBalance) -> Option<DecayBalance> {
        Some(DecayBalance {
            bias: self.bias.checked_add(other.bias)?,
            slope: self.slope.checked_add(other.slope)?,
        })
    }

    /// Component-wise subtraction, `None` if either component would go negative.
    pub fn checked_sub(&self, other: &DecayBalance) -> Option<DecayBalance> {
        Some(DecayBalance {
            bias: self.bias.checked_sub(other.bias)?,
            slope: self.slope.checked_sub(other.slope)?,
        })
    }

    /// Component-wise addition clamped at `u128::MAX`.
    pub fn saturating_add(&self, other: &DecayBalance) -> DecayBalance {
        DecayBalance {
            bias: self.bias.saturating_add(other.bias),
            slope: self.slope.saturating_add(other.slope),
        }
    }

    /// Component-wise subtraction clamped at zero.
    pub fn saturating_sub(&self, other: &DecayBalance) -> DecayBalance {
        DecayBalance {
            bias: self.bias.saturating_sub(other.bias),
            slope: self.slope.saturating_sub(other.slope),
        }
    }
}
