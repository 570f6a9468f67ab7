//! Aggregate accounts: global, per-owner, per-delegate and per-pair ledgers.
//!
//! Each [`AggregateAccount`] holds:
//! - `history`: the component-wise sum of the balances it is credited with,
//!   valid as of `last_updated` (an epoch start) plus any mutations since,
//! - `slope_adjustments`: expiry → total slope of credited locks expiring
//!   there, removed by the sync engine when it crosses that boundary,
//! - `pending`: at most one [`PendingDelta`] keyed to the next epoch start,
//! - `checkpoints`: epoch-granular history for point-in-time queries.
//!
//! # Invariants
//!
//! * After synchronization, every non-global aggregate's `history` is a
//!   subset-sum of the global `history`, so a global `checked_add` that
//!   succeeds bounds every other aggregate's addition.
//! * `pending.epoch > last_updated` whenever `pending` is set.

use std::collections::BTreeMap;

use ballast_core::balance::DecayBalance;
use ballast_core::epoch::EpochClock;
use ballast_core::events::AggregateKind;
use ballast_core::types::AccountId;

use crate::checkpoint::{self, Checkpoint};

/// A balance transfer booked now and applied at the start of `epoch`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct PendingDelta {
    /// Epoch-start timestamp at which the delta applies.
    pub epoch: u64,
    pub additions: Option<DecayBalance>,
    pub subtractions: Option<DecayBalance>,
}

impl PendingDelta {
    fn new(epoch: u64) -> Self {
        Self { epoch, additions: None, subtractions: None }
    }

    pub fn has_addition(&self) -> bool {
        self.additions.is_some()
    }

    pub fn has_subtraction(&self) -> bool {
        self.subtractions.is_some()
    }

    /// `balance + additions - subtractions`. Additions go first so a
    /// transfer that nets to zero never clamps.
    pub fn apply_to(&self, balance: DecayBalance) -> DecayBalance {
        let mut out = balance;
        if let Some(add) = &self.additions {
            out = out.saturating_add(add);
        }
        if let Some(sub) = &self.subtractions {
            out = out.saturating_sub(sub);
        }
        out
    }
}

/// One aggregate ledger.
#[derive(Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct AggregateAccount {
    pub history: DecayBalance,
    pub slope_adjustments: BTreeMap<u64, u128>,
    pub last_updated: u64,
    pub pending: Option<PendingDelta>,
    pub checkpoints: Vec<Checkpoint>,
}

impl AggregateAccount {
    /// Empty aggregate considered synchronized up to `epoch_start`.
    pub fn new(epoch_start: u64) -> Self {
        Self {
            history: DecayBalance::ZERO,
            slope_adjustments: BTreeMap::new(),
            last_updated: epoch_start,
            pending: None,
            checkpoints: Vec::new(),
        }
    }

    /// Live value at `t`, without applying anything due after `last_updated`.
    pub fn value_at(&self, t: u64) -> u128 {
        self.history.value_at(t)
    }

    /// Slope registered to expire at `expiry`.
    pub fn scheduled_slope(&self, expiry: u64) -> u128 {
        self.slope_adjustments.get(&expiry).copied().unwrap_or(0)
    }

    pub fn credit(&mut self, delta: &DecayBalance, now: u64, clock: &EpochClock) {
        self.history = self.history.saturating_add(delta);
        checkpoint::record(&mut self.checkpoints, self.history, now, clock);
    }

    pub fn debit(&mut self, delta: &DecayBalance, now: u64, clock: &EpochClock) {
        self.history = self.history.saturating_sub(delta);
        checkpoint::record(&mut self.checkpoints, self.history, now, clock);
    }

    /// Register `slope` for removal when the sync engine crosses `expiry`.
    pub fn schedule_expiry(&mut self, expiry: u64, slope: u128) {
        if slope == 0 {
            return;
        }
        let entry = self.slope_adjustments.entry(expiry).or_insert(0);
        *entry = entry.saturating_add(slope);
    }

    /// Withdraw a previous registration (the lock moved or changed expiry).
    pub fn unschedule_expiry(&mut self, expiry: u64, slope: u128) {
        if let Some(entry) = self.slope_adjustments.get_mut(&expiry) {
            *entry = entry.saturating_sub(slope);
            if *entry == 0 {
                self.slope_adjustments.remove(&expiry);
            }
        }
    }

    fn pending_for(&mut self, epoch: u64) -> &mut PendingDelta {
        debug_assert!(
            self.pending.is_none_or(|p| p.epoch == epoch),
            "pending delta for another epoch must be applied before booking"
        );
        self.pending.get_or_insert_with(|| PendingDelta::new(epoch))
    }

    /// Book `balance` to be added at `epoch`.
    pub fn book_addition(&mut self, epoch: u64, balance: &DecayBalance) {
        let pending = self.pending_for(epoch);
        let merged = pending.additions.unwrap_or_default().saturating_add(balance);
        pending.additions = Some(merged);
    }

    /// Book `balance` to be subtracted at `epoch`.
    pub fn book_subtraction(&mut self, epoch: u64, balance: &DecayBalance) {
        let pending = self.pending_for(epoch);
        let merged = pending.subtractions.unwrap_or_default().saturating_add(balance);
        pending.subtractions = Some(merged);
    }

    /// Power at `t`.
    ///
    /// For `t` in an epoch after `last_updated` the sync engine is projected
    /// read-only; otherwise the epoch-granular checkpoint history answers.
    pub fn power_at(&self, t: u64, clock: &EpochClock) -> u128 {
        let start = clock.current_epoch_start(t);
        if start > self.last_updated {
            return self.project(start).value_at(t);
        }
        checkpoint::lookup(&self.checkpoints, t, clock)
            .map(|cp| cp.balance.value_at(t))
            .unwrap_or(0)
    }
}

/// All aggregates plus the memoized global supply snapshots.
#[derive(Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct AccountStore {
    pub(crate) global: AggregateAccount,
    pub(crate) owners: BTreeMap<AccountId, AggregateAccount>,
    pub(crate) delegates: BTreeMap<AccountId, AggregateAccount>,
    pub(crate) pairs: BTreeMap<(AccountId, AccountId), AggregateAccount>,
    /// Epoch number → global balance at that epoch's start. Sparse: an epoch
    /// without an entry equals the latest earlier entry.
    pub(crate) supply_snapshots: BTreeMap<u64, DecayBalance>,
}

impl AccountStore {
    /// Empty store whose global aggregate starts at `genesis_epoch_start`.
    pub fn new(genesis_epoch_start: u64) -> Self {
        Self {
            global: AggregateAccount::new(genesis_epoch_start),
            owners: BTreeMap::new(),
            delegates: BTreeMap::new(),
            pairs: BTreeMap::new(),
            supply_snapshots: BTreeMap::new(),
        }
    }

    pub fn global(&self) -> &AggregateAccount {
        &self.global
    }

    pub fn get(&self, key: &AggregateKind) -> Option<&AggregateAccount> {
        match key {
            AggregateKind::Global => Some(&self.global),
            AggregateKind::Owner(a) => self.owners.get(a),
            AggregateKind::Delegate(a) => self.delegates.get(a),
            AggregateKind::Pair { owner, delegate } => self.pairs.get(&(*owner, *delegate)),
        }
    }

    pub(crate) fn get_mut(&mut self, key: &AggregateKind) -> Option<&mut AggregateAccount> {
        match key {
            AggregateKind::Global => Some(&mut self.global),
            AggregateKind::Owner(a) => self.owners.get_mut(a),
            AggregateKind::Delegate(a) => self.delegates.get_mut(a),
            AggregateKind::Pair { owner, delegate } => self.pairs.get_mut(&(*owner, *delegate)),
        }
    }

    /// Fetch or create an aggregate. A new aggregate starts synchronized at
    /// `epoch_start`: nothing can be due before it was first credited.
    pub(crate) fn entry(&mut self, key: &AggregateKind, epoch_start: u64) -> &mut AggregateAccount {
        match key {
            AggregateKind::Global => &mut self.global,
            AggregateKind::Owner(a) => self.owners.entry(*a).or_insert_with(|| AggregateAccount::new(epoch_start)),
            AggregateKind::Delegate(a) => {
                self.delegates.entry(*a).or_insert_with(|| AggregateAccount::new(epoch_start))
            }
            AggregateKind::Pair { owner, delegate } => self
                .pairs
                .entry((*owner, *delegate))
                .or_insert_with(|| AggregateAccount::new(epoch_start)),
        }
    }

    /// Pair aggregates of `owner`, keyed by delegate.
    pub fn pairs_of<'a>(&'a self, owner: &AccountId) -> impl Iterator<Item = (AccountId, &'a AggregateAccount)> + 'a {
        let lo = (*owner, AccountId([0x00; 32]));
        let hi = (*owner, AccountId([0xff; 32]));
        self.pairs.range(lo..=hi).map(|((_, d), acc)| (*d, acc))
    }

    pub fn owner_count(&self) -> usize {
        self.owners.len()
    }

    pub fn delegate_count(&self) -> usize {
        self.delegates.len()
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn snapshot_count(&self) -> usize {
        self.supply_snapshots.len()
    }
}
