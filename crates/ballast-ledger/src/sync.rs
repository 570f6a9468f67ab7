//! Lazy synchronization engine.
//!
//! An aggregate is only brought forward when something touches it. Advancing
//! walks the due boundaries between `last_updated` and the target epoch
//! start, not every epoch: the only boundaries where an aggregate changes are
//! the expiries registered in `slope_adjustments` and the epoch of its
//! pending delta. At each boundary, in order:
//!
//! 1. the slope of locks expiring there is removed, leaving the value at the
//!    boundary unchanged,
//! 2. the pending delta keyed to the boundary is applied (additions, then
//!    subtractions),
//! 3. a checkpoint is recorded.
//!
//! [`AggregateAccount::project`] runs the same walk without mutating and is
//! what reads use for epochs past `last_updated`.

use ballast_core::balance::DecayBalance;
use ballast_core::epoch::EpochClock;
use ballast_core::events::AggregateKind;
use tracing::debug;

use crate::aggregate::{AccountStore, AggregateAccount};
use crate::checkpoint;

/// Outcome of advancing one aggregate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncReport {
    pub from: u64,
    pub to: u64,
    /// Boundaries at which something changed.
    pub boundaries: usize,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.boundaries == 0 && self.from == self.to
    }
}

/// Balance whose subtraction removes `slope` from an aggregate at `at`
/// without changing its value there.
fn expiry_removal(slope: u128, at: u64) -> DecayBalance {
    DecayBalance::new(slope.saturating_mul(at as u128), slope)
}

impl AggregateAccount {
    /// Earliest due boundary at or before `target`.
    fn next_boundary(&self, target: u64) -> Option<u64> {
        let expiry = self.slope_adjustments.keys().next().copied();
        let pending = self.pending.map(|p| p.epoch);
        let next = match (expiry, pending) {
            (Some(e), Some(p)) => e.min(p),
            (Some(e), None) => e,
            (None, Some(p)) => p,
            (None, None) => return None,
        };
        (next <= target).then_some(next)
    }

    /// Advance to `target` (an epoch start), calling `on_step` with each
    /// boundary and the balance right after it.
    pub fn advance<F>(&mut self, target: u64, clock: &EpochClock, mut on_step: F) -> SyncReport
    where
        F: FnMut(u64, &DecayBalance),
    {
        let from = self.last_updated;
        let mut boundaries = 0;
        while let Some(boundary) = self.next_boundary(target) {
            if self.slope_adjustments.first_key_value().is_some_and(|(e, _)| *e == boundary) {
                if let Some((at, slope)) = self.slope_adjustments.pop_first() {
                    self.history = self.history.saturating_sub(&expiry_removal(slope, at));
                }
            }
            if self.pending.is_some_and(|p| p.epoch == boundary) {
                if let Some(delta) = self.pending.take() {
                    self.history = delta.apply_to(self.history);
                }
            }
            checkpoint::record(&mut self.checkpoints, self.history, boundary, clock);
            on_step(boundary, &self.history);
            boundaries += 1;
        }
        self.last_updated = self.last_updated.max(target);
        SyncReport { from, to: self.last_updated, boundaries }
    }

    /// Balance the aggregate would hold after `advance(target)`.
    pub fn project(&self, target: u64) -> DecayBalance {
        let mut balance = self.history;
        let mut pending = self.pending.filter(|p| p.epoch <= target);
        for (&at, &slope) in self.slope_adjustments.range(..=target) {
            if let Some(p) = pending.filter(|p| p.epoch < at) {
                balance = p.apply_to(balance);
                pending = None;
            }
            balance = balance.saturating_sub(&expiry_removal(slope, at));
        }
        if let Some(p) = pending {
            balance = p.apply_to(balance);
        }
        balance
    }
}

impl AccountStore {
    /// Bring one aggregate up to the start of `now`'s epoch. Returns `None`
    /// if the aggregate does not exist yet.
    pub fn sync(&mut self, key: &AggregateKind, now: u64, clock: &EpochClock) -> Option<SyncReport> {
        if *key == AggregateKind::Global {
            return Some(self.sync_global(now, clock));
        }
        let target = clock.current_epoch_start(now);
        let report = self.get_mut(key)?.advance(target, clock, |_, _| {});
        if report.boundaries > 0 {
            debug!(aggregate = ?key, from = report.from, to = report.to, boundaries = report.boundaries, "sync: advanced");
        }
        Some(report)
    }

    /// Bring the global aggregate forward, memoizing the supply at the start
    /// of every crossed epoch that changed.
    pub fn sync_global(&mut self, now: u64, clock: &EpochClock) -> SyncReport {
        let target = clock.current_epoch_start(now);
        let from = self.global.last_updated;
        if target <= from {
            return SyncReport { from, to: from, boundaries: 0 };
        }
        let snapshots = &mut self.supply_snapshots;
        snapshots.insert(clock.epoch_number(from) + 1, self.global.history);
        let report = self.global.advance(target, clock, |boundary, balance| {
            snapshots.insert(clock.epoch_number(boundary), *balance);
        });
        snapshots.insert(clock.epoch_number(target), self.global.history);
        debug!(from, to = target, boundaries = report.boundaries, "sync: global supply advanced");
        report
    }

    /// Total supply at the start of epoch number `epoch`.
    ///
    /// Epochs up to the last global sync come from the snapshot table, later
    /// ones are projected. Nothing was locked before the first snapshot.
    pub fn historical_supply(&self, epoch: u64, clock: &EpochClock) -> u128 {
        let start = clock.epoch_start(epoch);
        if start > self.global.last_updated {
            return self.global.project(start).value_at(start);
        }
        self.supply_snapshots
            .range(..=epoch)
            .next_back()
            .map(|(_, balance)| balance.value_at(start))
            .unwrap_or(0)
    }
}
