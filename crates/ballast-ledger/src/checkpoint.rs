//! Epoch-granular balance history.
//!
//! Locks and aggregates keep a list of [`Checkpoint`]s with at most one entry
//! per epoch: a mutation in the same epoch as the latest entry overwrites it,
//! a mutation in a later epoch appends. Entries are therefore strictly
//! increasing in epoch, which lets lookups binary-search.

use ballast_core::balance::DecayBalance;
use ballast_core::epoch::EpochClock;
use serde::{Deserialize, Serialize};

/// A balance as recorded at `timestamp`.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Checkpoint {
    pub balance: DecayBalance,
    pub timestamp: u64,
}

/// Append `balance` at `now`, overwriting the latest entry if it is in the
/// same epoch.
pub fn record(history: &mut Vec<Checkpoint>, balance: DecayBalance, now: u64, clock: &EpochClock) {
    let entry = Checkpoint { balance, timestamp: now };
    match history.last_mut() {
        Some(last) if clock.epoch_number(last.timestamp) == clock.epoch_number(now) => *last = entry,
        _ => history.push(entry),
    }
}

/// Latest checkpoint whose epoch is at or before the epoch of `t`.
pub fn lookup<'a>(history: &'a [Checkpoint], t: u64, clock: &EpochClock) -> Option<&'a Checkpoint> {
    let epoch = clock.epoch_number(t);
    let idx = history.partition_point(|cp| clock.epoch_number(cp.timestamp) <= epoch);
    idx.checked_sub(1).map(|i| &history[i])
}
