//! Lock records and the lock ledger.
//!
//! A [`Lock`] owns its checkpoint history. The [`LockBook`] validates lock
//! mutations in a read-only `check_*` step that returns a plan, and applies
//! the plan in an infallible `commit_*` step, so callers can interleave
//! custody transfers and aggregate synchronization between the two without
//! risking a half-applied mutation.

use std::collections::BTreeMap;

use ballast_core::balance::DecayBalance;
use ballast_core::config::LedgerConfig;
use ballast_core::epoch::EpochClock;
use ballast_core::error::LedgerError;
use ballast_core::types::{AccountId, Amounts, LockId};
use serde::{Deserialize, Serialize};

use crate::checkpoint::{self, Checkpoint};

/// Number of delegation transitions a lock has gone through.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct DelegationCounters {
    pub delegations: u32,
    pub switches: u32,
    pub undelegations: u32,
}

/// A single time-locked principal position.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct Lock {
    pub id: LockId,
    /// Immutable custody owner.
    pub owner: AccountId,
    /// Delegation target from `delegation_epoch` on, or `None` for the owner.
    pub delegate: Option<AccountId>,
    pub amounts: Amounts,
    /// Epoch-aligned expiry timestamp.
    pub expiry: u64,
    /// Account credited with the lock's power before `delegation_epoch`.
    pub current_holder: AccountId,
    /// Timestamp at which the latest delegation transition activates.
    pub delegation_epoch: u64,
    pub counters: DelegationCounters,
    pub created_at: u64,
    /// Set once the principal has been released. Terminal.
    pub unlocked_at: Option<u64>,
    pub checkpoints: Vec<Checkpoint>,
}

impl Lock {
    pub fn is_unlocked(&self) -> bool {
        self.unlocked_at.is_some()
    }

    /// The lock's live decay balance. Zero once unlocked.
    pub fn balance(&self) -> DecayBalance {
        if self.is_unlocked() {
            return DecayBalance::ZERO;
        }
        self.checkpoints.last().map(|cp| cp.balance).unwrap_or_default()
    }

    /// Account credited once the latest delegation transition is active.
    pub fn future_holder(&self) -> AccountId {
        self.delegate.unwrap_or(self.owner)
    }

    /// Account credited with the lock's power at `now`.
    pub fn holder_at(&self, now: u64) -> AccountId {
        if now >= self.delegation_epoch {
            self.future_holder()
        } else {
            self.current_holder
        }
    }

    /// Roll `current_holder` forward if the pending transition has activated.
    pub fn refresh_holder(&mut self, now: u64) {
        self.current_holder = self.holder_at(now);
    }

    /// Voting power at `t`, from the latest checkpoint at or before `t`'s epoch.
    pub fn power_at(&self, t: u64, clock: &EpochClock) -> u128 {
        if self.unlocked_at.is_some_and(|u| t >= u) {
            return 0;
        }
        checkpoint::lookup(&self.checkpoints, t, clock)
            .map(|cp| cp.balance.value_at(t))
            .unwrap_or(0)
    }

    fn ensure_owner(&self, caller: &AccountId) -> Result<(), LedgerError> {
        if self.owner != *caller {
            return Err(LedgerError::NotOwner { lock: self.id, caller: *caller });
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), LedgerError> {
        if self.is_unlocked() {
            return Err(LedgerError::AlreadyUnlocked(self.id));
        }
        Ok(())
    }

    fn ensure_remaining(&self, required: u64, now: u64, clock: &EpochClock) -> Result<(), LedgerError> {
        let remaining = clock.epochs_remaining(self.expiry, now);
        if remaining < required {
            return Err(LedgerError::LockExpiresTooSoon { remaining, required });
        }
        Ok(())
    }

    /// Ownership, liveness and remaining-term checks shared by every
    /// owner-initiated change to a live lock.
    pub(crate) fn ensure_mutable(
        &self,
        caller: &AccountId,
        required_epochs: u64,
        now: u64,
        clock: &EpochClock,
    ) -> Result<(), LedgerError> {
        self.ensure_owner(caller)?;
        self.ensure_active()?;
        self.ensure_remaining(required_epochs, now, clock)
    }
}

/// Validated amount increase, ready to commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AmountIncrease {
    pub lock: LockId,
    pub added: Amounts,
    pub amounts: Amounts,
    pub old: DecayBalance,
    pub new: DecayBalance,
    /// `new - old`; both components are non-negative.
    pub delta: DecayBalance,
}

/// Validated duration increase, ready to commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DurationIncrease {
    pub lock: LockId,
    pub old_expiry: u64,
    pub new_expiry: u64,
    pub old: DecayBalance,
    pub new: DecayBalance,
    /// `(Δbias, 0)`: a duration change never alters slope.
    pub delta: DecayBalance,
}

/// All locks, indexed by id and by owner.
#[derive(Clone, Debug, Default, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct LockBook {
    locks: BTreeMap<LockId, Lock>,
    by_owner: BTreeMap<AccountId, Vec<LockId>>,
    nonce: u64,
}

impl LockBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub fn get(&self, id: &LockId) -> Option<&Lock> {
        self.locks.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &LockId) -> Option<&mut Lock> {
        self.locks.get_mut(id)
    }

    /// Look up a lock or fail with [`LedgerError::LockNotFound`].
    pub fn require(&self, id: &LockId) -> Result<&Lock, LedgerError> {
        self.locks.get(id).ok_or(LedgerError::LockNotFound(*id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Lock> {
        self.locks.values()
    }

    /// Locks created by `owner`, oldest first.
    pub fn locks_of<'a>(&'a self, owner: &AccountId) -> impl Iterator<Item = &'a Lock> + 'a {
        self.by_owner
            .get(owner)
            .into_iter()
            .flatten()
            .filter_map(|id| self.locks.get(id))
    }

    /// Id the next inserted lock of `owner` at `now` will receive.
    pub fn next_id(&self, owner: &AccountId, now: u64) -> LockId {
        LockId::derive(owner, now, self.nonce)
    }

    /// Validate a new lock and compute its balance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AmountBelowMinimum`] if the total is below the dust floor
    /// - [`LedgerError::InvalidEpochTime`] if `expiry` is not an epoch start
    /// - [`LedgerError::ZeroDuration`] if `expiry <= now`
    /// - [`LedgerError::DurationTooShort`] / [`LedgerError::DurationTooLong`]
    ///   if the term is outside the configured bounds
    pub fn check_create(
        config: &LedgerConfig,
        amounts: &Amounts,
        expiry: u64,
        now: u64,
    ) -> Result<DecayBalance, LedgerError> {
        let total = amounts.total().ok_or(LedgerError::ArithmeticOverflow)?;
        let min = config.min_lock_amount as u128;
        if total < min {
            return Err(LedgerError::AmountBelowMinimum { amount: total, min });
        }
        config.clock().ensure_aligned(expiry)?;
        if expiry <= now {
            return Err(LedgerError::ZeroDuration { expiry, now });
        }
        let duration = expiry - now;
        if duration < config.min_lock_duration {
            return Err(LedgerError::DurationTooShort { duration, min: config.min_lock_duration });
        }
        if duration > config.max_term {
            return Err(LedgerError::DurationTooLong { duration, max: config.max_term });
        }
        DecayBalance::for_lock(total, expiry, config.max_term).ok_or(LedgerError::ArithmeticOverflow)
    }

    /// Insert a validated lock and record its first checkpoint.
    pub fn insert(
        &mut self,
        owner: AccountId,
        amounts: Amounts,
        expiry: u64,
        balance: DecayBalance,
        now: u64,
        clock: &EpochClock,
    ) -> LockId {
        let id = self.next_id(&owner, now);
        self.nonce += 1;
        let mut checkpoints = Vec::with_capacity(1);
        checkpoint::record(&mut checkpoints, balance, now, clock);
        let lock = Lock {
            id,
            owner,
            delegate: None,
            amounts,
            expiry,
            current_holder: owner,
            delegation_epoch: 0,
            counters: DelegationCounters::default(),
            created_at: now,
            unlocked_at: None,
            checkpoints,
        };
        self.locks.insert(id, lock);
        self.by_owner.entry(owner).or_default().push(id);
        id
    }

    pub fn check_increase_amount(
        &self,
        config: &LedgerConfig,
        id: &LockId,
        caller: &AccountId,
        added: &Amounts,
        now: u64,
    ) -> Result<AmountIncrease, LedgerError> {
        let lock = self.require(id)?;
        lock.ensure_mutable(caller, config.min_change_epochs, now, &config.clock())?;
        if added.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        let amounts = lock.amounts.checked_add(added).ok_or(LedgerError::ArithmeticOverflow)?;
        let total = amounts.total().ok_or(LedgerError::ArithmeticOverflow)?;
        let old = lock.balance();
        let new = DecayBalance::for_lock(total, lock.expiry, config.max_term)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let delta = new.checked_sub(&old).ok_or(LedgerError::ArithmeticOverflow)?;
        Ok(AmountIncrease { lock: *id, added: *added, amounts, old, new, delta })
    }

    pub fn commit_increase_amount(&mut self, plan: &AmountIncrease, now: u64, clock: &EpochClock) {
        if let Some(lock) = self.locks.get_mut(&plan.lock) {
            lock.amounts = plan.amounts;
            checkpoint::record(&mut lock.checkpoints, plan.new, now, clock);
        }
    }

    pub fn check_increase_duration(
        &self,
        config: &LedgerConfig,
        id: &LockId,
        caller: &AccountId,
        new_expiry: u64,
        now: u64,
    ) -> Result<DurationIncrease, LedgerError> {
        let clock = config.clock();
        let lock = self.require(id)?;
        lock.ensure_mutable(caller, config.min_change_epochs, now, &clock)?;
        clock.ensure_aligned(new_expiry)?;
        if new_expiry <= lock.expiry {
            return Err(LedgerError::ExpiryNotExtended { current: lock.expiry, new: new_expiry });
        }
        let duration = new_expiry - now;
        if duration > config.max_term {
            return Err(LedgerError::DurationTooLong { duration, max: config.max_term });
        }
        let old = lock.balance();
        let new = DecayBalance::expiring(old.slope, new_expiry).ok_or(LedgerError::ArithmeticOverflow)?;
        let delta = new.checked_sub(&old).ok_or(LedgerError::ArithmeticOverflow)?;
        Ok(DurationIncrease {
            lock: *id,
            old_expiry: lock.expiry,
            new_expiry,
            old,
            new,
            delta,
        })
    }

    pub fn commit_increase_duration(&mut self, plan: &DurationIncrease, now: u64, clock: &EpochClock) {
        if let Some(lock) = self.locks.get_mut(&plan.lock) {
            lock.expiry = plan.new_expiry;
            checkpoint::record(&mut lock.checkpoints, plan.new, now, clock);
        }
    }

    /// Validate an owner unlock: lock exists, caller owns it, not yet
    /// unlocked, and expired.
    pub fn check_unlock(&self, id: &LockId, caller: &AccountId, now: u64) -> Result<&Lock, LedgerError> {
        let lock = self.require(id)?;
        lock.ensure_owner(caller)?;
        lock.ensure_active()?;
        if lock.expiry > now {
            return Err(LedgerError::LockNotExpired { expiry: lock.expiry, now });
        }
        Ok(lock)
    }

    /// Zero the principal and mark the lock terminal. Records a final
    /// checkpoint with the pre-zero balance. Returns the released amounts.
    pub fn commit_unlock(&mut self, id: &LockId, now: u64, clock: &EpochClock) -> Amounts {
        let Some(lock) = self.locks.get_mut(id) else {
            return Amounts::ZERO;
        };
        if lock.is_unlocked() {
            return Amounts::ZERO;
        }
        let released = lock.amounts;
        let last = lock.balance();
        checkpoint::record(&mut lock.checkpoints, last, now, clock);
        lock.amounts = Amounts::ZERO;
        lock.unlocked_at = Some(now);
        released
    }
}
