//! Per-lock delegation state machine.
//!
//! A transition never moves credit immediately. It sets the lock's future
//! holder, stamps `delegation_epoch` with the next epoch start, and books a
//! pending transfer of the lock's balance from the outgoing future holder to
//! the incoming one. Until the boundary the lock keeps crediting
//! `current_holder`.
//!
//! The slope registration for the lock's expiry lives with the future holder
//! and moves at booking time. A transition requires at least
//! `delegation_freeze_epochs` whole epochs after the current one, so the
//! transfer always lands before the expiry it is registered for.

use ballast_core::balance::DecayBalance;
use ballast_core::config::LedgerConfig;
use ballast_core::epoch::EpochClock;
use ballast_core::error::LedgerError;
use ballast_core::events::AggregateKind;
use ballast_core::traits::Authority;
use ballast_core::types::{AccountId, LockId};
use serde::{Deserialize, Serialize};

use crate::aggregate::AccountStore;
use crate::lock::{Lock, LockBook};

/// Delegation phase of a lock at a given instant.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DelegationState {
    Undelegated,
    /// Delegated, but credit moves to `delegate` only at `activates_at`.
    Pending { delegate: AccountId, activates_at: u64 },
    Active { delegate: AccountId },
}

impl DelegationState {
    pub fn delegate(&self) -> Option<AccountId> {
        match self {
            Self::Undelegated => None,
            Self::Pending { delegate, .. } | Self::Active { delegate } => Some(*delegate),
        }
    }
}

impl Lock {
    pub fn delegation_state(&self, now: u64) -> DelegationState {
        match self.delegate {
            None => DelegationState::Undelegated,
            Some(delegate) if self.delegation_epoch > now => DelegationState::Pending {
                delegate,
                activates_at: self.delegation_epoch,
            },
            Some(delegate) => DelegationState::Active { delegate },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionKind {
    Delegate,
    Switch,
    Undelegate,
}

/// Validated delegation transition, ready to commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub lock: LockId,
    pub kind: TransitionKind,
    pub owner: AccountId,
    /// Future holder before the transition.
    pub outgoing: AccountId,
    /// Future holder after the transition.
    pub incoming: AccountId,
    pub previous_delegate: Option<AccountId>,
    pub new_delegate: Option<AccountId>,
    /// Lock balance transferred at `activates_at`.
    pub balance: DecayBalance,
    pub expiry: u64,
    pub activates_at: u64,
}

impl LockBook {
    fn check_transition_base<'a>(
        &'a self,
        config: &LedgerConfig,
        id: &LockId,
        caller: &AccountId,
        now: u64,
    ) -> Result<&'a Lock, LedgerError> {
        let lock = self.require(id)?;
        lock.ensure_mutable(caller, config.delegation_freeze_epochs, now, &config.clock())?;
        Ok(lock)
    }

    fn check_target(
        authority: &dyn Authority,
        lock: &Lock,
        target: &AccountId,
    ) -> Result<(), LedgerError> {
        if *target == lock.owner {
            return Err(LedgerError::SelfDelegation);
        }
        if !authority.is_registered_delegate(target) {
            return Err(LedgerError::UnregisteredDelegate(*target));
        }
        Ok(())
    }

    fn plan_transition(
        lock: &Lock,
        kind: TransitionKind,
        new_delegate: Option<AccountId>,
        clock: &EpochClock,
        now: u64,
    ) -> Transition {
        Transition {
            lock: lock.id,
            kind,
            owner: lock.owner,
            outgoing: lock.future_holder(),
            incoming: new_delegate.unwrap_or(lock.owner),
            previous_delegate: lock.delegate,
            new_delegate,
            balance: lock.balance(),
            expiry: lock.expiry,
            activates_at: clock.next_epoch_start(now),
        }
    }

    /// Delegate an undelegated lock to `target`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::LockNotFound`], [`LedgerError::NotOwner`],
    ///   [`LedgerError::AlreadyUnlocked`]
    /// - [`LedgerError::LockExpiresTooSoon`] inside the delegation freeze
    /// - [`LedgerError::AlreadyDelegated`] if a delegate is set
    /// - [`LedgerError::SelfDelegation`] / [`LedgerError::UnregisteredDelegate`]
    pub fn check_delegate(
        &self,
        config: &LedgerConfig,
        authority: &dyn Authority,
        id: &LockId,
        caller: &AccountId,
        target: &AccountId,
        now: u64,
    ) -> Result<Transition, LedgerError> {
        let lock = self.check_transition_base(config, id, caller, now)?;
        if lock.delegate.is_some() {
            return Err(LedgerError::AlreadyDelegated(*id));
        }
        Self::check_target(authority, lock, target)?;
        Ok(Self::plan_transition(lock, TransitionKind::Delegate, Some(*target), &config.clock(), now))
    }

    /// Move a pending or active delegation to `target`.
    pub fn check_switch(
        &self,
        config: &LedgerConfig,
        authority: &dyn Authority,
        id: &LockId,
        caller: &AccountId,
        target: &AccountId,
        now: u64,
    ) -> Result<Transition, LedgerError> {
        let lock = self.check_transition_base(config, id, caller, now)?;
        match lock.delegate {
            None => return Err(LedgerError::NotDelegated(*id)),
            Some(current) if current == *target => return Err(LedgerError::SameDelegate(*id)),
            Some(_) => {}
        }
        Self::check_target(authority, lock, target)?;
        Ok(Self::plan_transition(lock, TransitionKind::Switch, Some(*target), &config.clock(), now))
    }

    /// Return a pending or active delegation to the owner.
    pub fn check_undelegate(
        &self,
        config: &LedgerConfig,
        id: &LockId,
        caller: &AccountId,
        now: u64,
    ) -> Result<Transition, LedgerError> {
        let lock = self.check_transition_base(config, id, caller, now)?;
        if lock.delegate.is_none() {
            return Err(LedgerError::NotDelegated(*id));
        }
        Ok(Self::plan_transition(lock, TransitionKind::Undelegate, None, &config.clock(), now))
    }

    pub fn commit_transition(&mut self, plan: &Transition, now: u64) {
        let Some(lock) = self.get_mut(&plan.lock) else {
            return;
        };
        lock.refresh_holder(now);
        lock.delegate = plan.new_delegate;
        lock.delegation_epoch = plan.activates_at;
        let counters = &mut lock.counters;
        match plan.kind {
            TransitionKind::Delegate => counters.delegations = counters.delegations.saturating_add(1),
            TransitionKind::Switch => counters.switches = counters.switches.saturating_add(1),
            TransitionKind::Undelegate => counters.undelegations = counters.undelegations.saturating_add(1),
        }
    }
}

/// Role aggregate plus, for a delegate, the owner/delegate pair aggregate.
pub(crate) fn credit_keys(holder: AccountId, owner: AccountId) -> impl Iterator<Item = AggregateKind> {
    std::iter::once(AggregateKind::role(holder, owner)).chain(AggregateKind::pair(holder, owner))
}

/// A balance transfer between two future holders of one owner's lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PendingTransfer {
    pub owner: AccountId,
    pub from: AccountId,
    pub to: AccountId,
    pub balance: DecayBalance,
    /// Expiry whose slope registration moves along with the balance, if any.
    pub expiry: Option<u64>,
    /// Epoch start at which the transfer applies.
    pub epoch: u64,
}

impl Transition {
    pub(crate) fn transfer(&self) -> PendingTransfer {
        PendingTransfer {
            owner: self.owner,
            from: self.outgoing,
            to: self.incoming,
            balance: self.balance,
            expiry: Some(self.expiry),
            epoch: self.activates_at,
        }
    }
}

impl AccountStore {
    /// Book `transfer` as pending deltas on both sides.
    ///
    /// Every aggregate involved must already be synchronized to
    /// `epoch_start`, which is also the start used for new aggregates.
    pub(crate) fn book_transfer(&mut self, transfer: &PendingTransfer, epoch_start: u64) {
        let PendingTransfer { owner, from, to, balance, expiry, epoch } = *transfer;
        if from == to {
            return;
        }
        for key in credit_keys(from, owner) {
            let acc = self.entry(&key, epoch_start);
            acc.book_subtraction(epoch, &balance);
            if let Some(expiry) = expiry {
                acc.unschedule_expiry(expiry, balance.slope);
            }
        }
        for key in credit_keys(to, owner) {
            let acc = self.entry(&key, epoch_start);
            acc.book_addition(epoch, &balance);
            if let Some(expiry) = expiry {
                acc.schedule_expiry(expiry, balance.slope);
            }
        }
    }
}
