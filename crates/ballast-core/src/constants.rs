//! Protocol constants. All durations are in seconds, all amounts in base units
//! (1 token = 10^18 units).

pub const UNIT: u128 = 1_000_000_000_000_000_000;

/// Length of one accounting period.
pub const EPOCH_DURATION: u64 = 7 * 24 * 60 * 60;

/// Number of epochs in the longest allowed lock.
pub const MAX_TERM_EPOCHS: u64 = 208;

/// Longest allowed lock, in seconds (≈ 4 years).
///
/// # Examples
///
/// ```
/// use ballast_core::constants::{EPOCH_DURATION, MAX_TERM, MAX_TERM_EPOCHS};
/// assert_eq!(MAX_TERM, EPOCH_DURATION * MAX_TERM_EPOCHS);
/// assert_eq!(MAX_TERM % EPOCH_DURATION, 0);
/// ```
pub const MAX_TERM: u64 = EPOCH_DURATION * MAX_TERM_EPOCHS;

/// Shortest allowed lock, in epochs.
pub const MIN_TERM_EPOCHS: u64 = 3;

/// Shortest allowed lock, in seconds.
pub const MIN_LOCK_DURATION: u64 = EPOCH_DURATION * MIN_TERM_EPOCHS;

/// Dust floor for a lock's total principal.
///
/// Equal to [`MAX_TERM`] so that `floor(total / MAX_TERM) >= 1`: every
/// accepted lock has a non-zero slope.
pub const MIN_LOCK_AMOUNT: u128 = MAX_TERM as u128;

/// Whole epochs that must remain before expiry to change amount or duration.
pub const MIN_CHANGE_EPOCHS: u64 = 1;

/// Whole epochs that must remain before expiry to change delegation.
///
/// A delegation booked now activates at the next epoch start; the last two
/// epochs before expiry are frozen.
pub const DELEGATION_FREEZE_EPOCHS: u64 = 2;

/// Prefix for environment overrides read by
/// [`LedgerConfig::load`](crate::config::LedgerConfig::load).
pub const ENV_PREFIX: &str = "BALLAST";

/// Domain separator mixed into lock id derivation.
pub const LOCK_ID_DOMAIN: &[u8] = b"ballast.lock.v1";
