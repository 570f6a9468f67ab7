//! Lock lifecycle orchestration.
//!
//! [`Escrow`] wires the lock book, the aggregate store and the external
//! collaborators together. Every mutating operation follows the same shape:
//!
//! 1. consult the lifecycle gate and any required role,
//! 2. validate and compute everything with checked arithmetic (`check_*`),
//! 3. move principal through custody,
//! 4. synchronize every aggregate the operation touches,
//! 5. commit, then emit events.
//!
//! A failure in steps 1-3 leaves no trace. Step 4 is value-preserving, and
//! step 5 cannot fail.

use std::collections::BTreeSet;

use ballast_core::balance::DecayBalance;
use ballast_core::config::LedgerConfig;
use ballast_core::epoch::EpochClock;
use ballast_core::error::{ConfigError, LedgerError};
use ballast_core::events::{AggregateKind, LedgerEvent};
use ballast_core::traits::{Authority, Custody, EventSink, LifecycleGate};
use ballast_core::types::{AccountId, Amounts, LockId, Role, SystemState};
use tracing::{debug, info, warn};

use crate::aggregate::AccountStore;
use crate::delegation::{PendingTransfer, Transition, credit_keys};
use crate::lock::{Lock, LockBook};
use crate::sync::SyncReport;

/// The four external collaborators.
pub struct Collaborators {
    pub authority: Box<dyn Authority>,
    pub custody: Box<dyn Custody>,
    pub gate: Box<dyn LifecycleGate>,
    pub sink: Box<dyn EventSink>,
}

/// Everything the ledger persists.
#[derive(Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct LedgerState {
    pub genesis: u64,
    pub locks: LockBook,
    pub accounts: AccountStore,
    /// Epoch start of the latest timestamp any operation has accepted.
    /// Earlier timestamps are refused.
    pub high_water: u64,
}

impl LedgerState {
    pub fn new(genesis: u64, clock: &EpochClock) -> Self {
        let start = clock.current_epoch_start(genesis);
        Self { genesis, locks: LockBook::new(), accounts: AccountStore::new(start), high_water: start }
    }
}

/// One entry of a create-on-behalf batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NewLock {
    pub owner: AccountId,
    pub amounts: Amounts,
    pub expiry: u64,
}

/// Result of a forced unlock batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ForcedUnlockSummary {
    pub unlocked: usize,
    pub skipped: usize,
    pub released: Amounts,
}

/// Who a lock credits at a given instant.
#[derive(Clone, Copy, Debug)]
struct Credit {
    owner: AccountId,
    holder: AccountId,
    future: AccountId,
    activates_at: u64,
    expiry: u64,
}

impl Credit {
    fn of(lock: &Lock, now: u64) -> Self {
        Self {
            owner: lock.owner,
            holder: lock.holder_at(now),
            future: lock.future_holder(),
            activates_at: lock.delegation_epoch,
            expiry: lock.expiry,
        }
    }

    /// Global plus every holder aggregate, current and future.
    fn keys(&self) -> BTreeSet<AggregateKind> {
        let mut keys: BTreeSet<_> = credit_keys(self.holder, self.owner).collect();
        keys.extend(credit_keys(self.future, self.owner));
        keys.insert(AggregateKind::Global);
        keys
    }
}

/// The voting-power escrow.
pub struct Escrow {
    config: LedgerConfig,
    clock: EpochClock,
    state: LedgerState,
    deps: Collaborators,
}

impl Escrow {
    /// Fresh ledger starting at `genesis`.
    pub fn new(config: LedgerConfig, genesis: u64, deps: Collaborators) -> Result<Self, ConfigError> {
        config.validate()?;
        let clock = config.clock();
        let state = LedgerState::new(genesis, &clock);
        info!(epoch = clock.duration(), max_term = config.max_term, genesis, "escrow: initialized");
        Ok(Self { config, clock, state, deps })
    }

    /// Resume from previously persisted state.
    pub fn from_state(config: LedgerConfig, state: LedgerState, deps: Collaborators) -> Result<Self, ConfigError> {
        config.validate()?;
        let clock = config.clock();
        debug!(locks = state.locks.len(), "escrow: restored state");
        Ok(Self { config, clock, state, deps })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn clock(&self) -> &EpochClock {
        &self.clock
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn into_state(self) -> LedgerState {
        self.state
    }

    pub fn locks(&self) -> &LockBook {
        &self.state.locks
    }

    pub fn accounts(&self) -> &AccountStore {
        &self.state.accounts
    }

    // ------------------------------------------------------------------
    // Guards
    // ------------------------------------------------------------------

    fn ensure_live(&self, now: u64) -> Result<(), LedgerError> {
        let state = self.deps.gate.state();
        if state != SystemState::Live {
            return Err(LedgerError::SystemNotLive(state));
        }
        self.ensure_fresh(now)
    }

    /// Refuse `now` if any aggregate or lock has already moved past its
    /// epoch.
    fn ensure_fresh(&self, now: u64) -> Result<(), LedgerError> {
        let last = self.state.high_water;
        if now < last {
            return Err(LedgerError::StaleTimestamp { now, last });
        }
        Ok(())
    }

    /// Record that state has been written as of `now`.
    fn advance(&mut self, now: u64) {
        let start = self.epoch_start(now);
        self.state.high_water = self.state.high_water.max(start);
    }

    fn ensure_role(&self, caller: &AccountId, role: Role) -> Result<(), LedgerError> {
        if !self.deps.authority.has_role(caller, role) {
            return Err(LedgerError::Unauthorized { caller: *caller, role });
        }
        Ok(())
    }

    /// Reject deltas that would overflow the global aggregate. Every other
    /// aggregate is a subset-sum of global, so this bounds them too.
    fn ensure_global_room(&self, delta: &DecayBalance) -> Result<(), LedgerError> {
        self.state
            .accounts
            .global()
            .history
            .checked_add(delta)
            .map(|_| ())
            .ok_or(LedgerError::ArithmeticOverflow)
    }

    // ------------------------------------------------------------------
    // Aggregate plumbing
    // ------------------------------------------------------------------

    fn epoch_start(&self, now: u64) -> u64 {
        self.clock.current_epoch_start(now)
    }

    fn sync_keys<'a>(
        &mut self,
        keys: impl IntoIterator<Item = &'a AggregateKind>,
        now: u64,
        events: &mut Vec<LedgerEvent>,
    ) {
        for key in keys {
            if let Some(report) = self.state.accounts.sync(key, now, &self.clock) {
                push_synced(events, *key, &report);
            }
        }
    }

    /// Credit `delta` to global and the holder's aggregates now. If the lock
    /// is mid-transition, forward the delta to the future holder as well.
    fn apply_delta(&mut self, credit: &Credit, delta: &DecayBalance, now: u64) {
        let epoch_start = self.epoch_start(now);
        let accounts = &mut self.state.accounts;
        accounts.global.credit(delta, now, &self.clock);
        for key in credit_keys(credit.holder, credit.owner) {
            accounts.entry(&key, epoch_start).credit(delta, now, &self.clock);
        }
        if credit.holder != credit.future {
            let transfer = PendingTransfer {
                owner: credit.owner,
                from: credit.holder,
                to: credit.future,
                balance: *delta,
                expiry: None,
                epoch: credit.activates_at,
            };
            accounts.book_transfer(&transfer, epoch_start);
        }
    }

    /// Register `slope` to leave global and the future holder's aggregates
    /// at `expiry`.
    fn register_expiry(&mut self, credit: &Credit, expiry: u64, slope: u128, now: u64) {
        let epoch_start = self.epoch_start(now);
        let accounts = &mut self.state.accounts;
        accounts.global.schedule_expiry(expiry, slope);
        for key in credit_keys(credit.future, credit.owner) {
            accounts.entry(&key, epoch_start).schedule_expiry(expiry, slope);
        }
    }

    fn unregister_expiry(&mut self, credit: &Credit, expiry: u64, slope: u128) {
        let accounts = &mut self.state.accounts;
        accounts.global.unschedule_expiry(expiry, slope);
        for key in credit_keys(credit.future, credit.owner) {
            if let Some(acc) = accounts.get_mut(&key) {
                acc.unschedule_expiry(expiry, slope);
            }
        }
    }

    fn balance_events(&self, keys: &BTreeSet<AggregateKind>, now: u64, events: &mut Vec<LedgerEvent>) {
        for key in keys {
            if let Some(acc) = self.state.accounts.get(key) {
                events.push(LedgerEvent::BalanceUpdated { aggregate: *key, balance: acc.history, at: now });
            }
        }
    }

    /// Roll the lock's holder forward and return its credit.
    fn refresh(&mut self, id: &LockId, now: u64) -> Result<Credit, LedgerError> {
        let lock = self.state.locks.get_mut(id).ok_or(LedgerError::LockNotFound(*id))?;
        lock.refresh_holder(now);
        Ok(Credit::of(lock, now))
    }

    fn emit(&mut self, events: Vec<LedgerEvent>) {
        self.deps.sink.emit_all(events);
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Insert a validated lock and credit its owner. Caller has already
    /// moved the principal.
    fn open(&mut self, new: &NewLock, balance: DecayBalance, now: u64, events: &mut Vec<LedgerEvent>) -> LockId {
        let owner_key = AggregateKind::Owner(new.owner);
        self.sync_keys(&[AggregateKind::Global, owner_key], now, events);
        let id = self.state.locks.insert(new.owner, new.amounts, new.expiry, balance, now, &self.clock);
        let credit = Credit {
            owner: new.owner,
            holder: new.owner,
            future: new.owner,
            activates_at: 0,
            expiry: new.expiry,
        };
        self.apply_delta(&credit, &balance, now);
        self.register_expiry(&credit, new.expiry, balance.slope, now);
        events.push(LedgerEvent::LockCreated {
            lock: id,
            owner: new.owner,
            amounts: new.amounts,
            expiry: new.expiry,
            balance,
            at: now,
        });
        self.balance_events(&credit.keys(), now, events);
        self.advance(now);
        info!(lock = %id.short(), owner = %new.owner, expiry = new.expiry, "escrow: lock created");
        id
    }

    /// Lock `amounts` of the caller's principal until `expiry`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::SystemNotLive`] unless the gate is live
    /// - any validation error from [`LockBook::check_create`]
    /// - [`LedgerError::ArithmeticOverflow`] if global supply would overflow
    /// - [`LedgerError::Custody`] if the deposit fails
    pub fn create_lock(
        &mut self,
        caller: &AccountId,
        amounts: Amounts,
        expiry: u64,
        now: u64,
    ) -> Result<LockId, LedgerError> {
        self.ensure_live(now)?;
        let balance = LockBook::check_create(&self.config, &amounts, expiry, now)?;
        self.ensure_global_room(&balance)?;
        self.deps.custody.deposit(caller, &amounts)?;

        let mut events = Vec::new();
        let new = NewLock { owner: *caller, amounts, expiry };
        let id = self.open(&new, balance, now, &mut events);
        self.emit(events);
        Ok(id)
    }

    /// Create one lock per entry, funded by `operator` in a single deposit.
    /// Either every lock is created or none is.
    pub fn create_locks_for(
        &mut self,
        operator: &AccountId,
        batch: &[NewLock],
        now: u64,
    ) -> Result<Vec<LockId>, LedgerError> {
        self.ensure_live(now)?;
        self.ensure_role(operator, Role::Operator)?;
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let mut balances = Vec::with_capacity(batch.len());
        let mut total = Amounts::ZERO;
        let mut added = DecayBalance::ZERO;
        for new in batch {
            let balance = LockBook::check_create(&self.config, &new.amounts, new.expiry, now)?;
            total = total.checked_add(&new.amounts).ok_or(LedgerError::ArithmeticOverflow)?;
            added = added.checked_add(&balance).ok_or(LedgerError::ArithmeticOverflow)?;
            balances.push(balance);
        }
        self.ensure_global_room(&added)?;
        self.deps.custody.deposit(operator, &total)?;

        let mut events = Vec::new();
        let ids = batch
            .iter()
            .zip(balances)
            .map(|(new, balance)| self.open(new, balance, now, &mut events))
            .collect::<Vec<_>>();
        info!(operator = %operator, count = ids.len(), "escrow: batch created");
        self.emit(events);
        Ok(ids)
    }

    // ------------------------------------------------------------------
    // Increases
    // ------------------------------------------------------------------

    /// Add principal to a live lock. Returns the balance delta credited.
    pub fn increase_amount(
        &mut self,
        caller: &AccountId,
        id: &LockId,
        added: Amounts,
        now: u64,
    ) -> Result<DecayBalance, LedgerError> {
        self.ensure_live(now)?;
        let plan = self.state.locks.check_increase_amount(&self.config, id, caller, &added, now)?;
        self.ensure_global_room(&plan.delta)?;
        self.deps.custody.deposit(caller, &added)?;

        let mut events = Vec::new();
        let credit = self.refresh(id, now)?;
        let keys = credit.keys();
        self.sync_keys(&keys, now, &mut events);
        self.state.locks.commit_increase_amount(&plan, now, &self.clock);
        self.apply_delta(&credit, &plan.delta, now);
        self.register_expiry(&credit, credit.expiry, plan.delta.slope, now);

        events.push(LedgerEvent::AmountIncreased { lock: *id, added, delta: plan.delta, at: now });
        self.balance_events(&keys, now, &mut events);
        self.advance(now);
        info!(lock = %id.short(), slope = %plan.new.slope, "escrow: amount increased");
        self.emit(events);
        Ok(plan.delta)
    }

    /// Push a live lock's expiry out to `new_expiry`. Returns the balance
    /// delta credited; its slope is always zero.
    pub fn increase_duration(
        &mut self,
        caller: &AccountId,
        id: &LockId,
        new_expiry: u64,
        now: u64,
    ) -> Result<DecayBalance, LedgerError> {
        self.ensure_live(now)?;
        let plan = self.state.locks.check_increase_duration(&self.config, id, caller, new_expiry, now)?;
        self.ensure_global_room(&plan.delta)?;

        let mut events = Vec::new();
        let credit = self.refresh(id, now)?;
        let keys = credit.keys();
        self.sync_keys(&keys, now, &mut events);
        self.state.locks.commit_increase_duration(&plan, now, &self.clock);
        self.apply_delta(&credit, &plan.delta, now);
        self.unregister_expiry(&credit, plan.old_expiry, plan.old.slope);
        self.register_expiry(&credit, plan.new_expiry, plan.new.slope, now);

        events.push(LedgerEvent::DurationIncreased {
            lock: *id,
            old_expiry: plan.old_expiry,
            new_expiry: plan.new_expiry,
            delta: plan.delta,
            at: now,
        });
        self.balance_events(&keys, now, &mut events);
        self.advance(now);
        info!(lock = %id.short(), new_expiry, "escrow: duration increased");
        self.emit(events);
        Ok(plan.delta)
    }

    // ------------------------------------------------------------------
    // Delegation
    // ------------------------------------------------------------------

    /// Delegate an undelegated lock. Returns the activation timestamp.
    pub fn delegate(&mut self, caller: &AccountId, id: &LockId, target: &AccountId, now: u64) -> Result<u64, LedgerError> {
        self.ensure_live(now)?;
        let plan = self.state.locks.check_delegate(&self.config, self.deps.authority.as_ref(), id, caller, target, now)?;
        self.apply_transition(&plan, now)
    }

    /// Move a pending or active delegation to `target`.
    pub fn switch_delegate(
        &mut self,
        caller: &AccountId,
        id: &LockId,
        target: &AccountId,
        now: u64,
    ) -> Result<u64, LedgerError> {
        self.ensure_live(now)?;
        let plan = self.state.locks.check_switch(&self.config, self.deps.authority.as_ref(), id, caller, target, now)?;
        self.apply_transition(&plan, now)
    }

    /// Return a pending or active delegation to the owner.
    pub fn undelegate(&mut self, caller: &AccountId, id: &LockId, now: u64) -> Result<u64, LedgerError> {
        self.ensure_live(now)?;
        let plan = self.state.locks.check_undelegate(&self.config, id, caller, now)?;
        self.apply_transition(&plan, now)
    }

    fn apply_transition(&mut self, plan: &Transition, now: u64) -> Result<u64, LedgerError> {
        let mut events = Vec::new();
        let credit = self.refresh(&plan.lock, now)?;
        let mut keys = credit.keys();
        keys.extend(credit_keys(plan.incoming, plan.owner));
        self.sync_keys(&keys, now, &mut events);
        self.state.locks.commit_transition(plan, now);
        self.state.accounts.book_transfer(&plan.transfer(), self.epoch_start(now));
        self.advance(now);

        events.push(LedgerEvent::DelegationChanged {
            lock: plan.lock,
            from: plan.previous_delegate,
            to: plan.new_delegate,
            activates_at: plan.activates_at,
            at: now,
        });
        info!(
            lock = %plan.lock.short(),
            kind = ?plan.kind,
            to = %plan.incoming,
            activates_at = plan.activates_at,
            "escrow: delegation changed"
        );
        self.emit(events);
        Ok(plan.activates_at)
    }

    // ------------------------------------------------------------------
    // Exit
    // ------------------------------------------------------------------

    /// Release an expired lock's principal to its owner. Aggregates are not
    /// touched: the lock's slope already leaves them at expiry.
    pub fn unlock(&mut self, caller: &AccountId, id: &LockId, now: u64) -> Result<Amounts, LedgerError> {
        self.ensure_live(now)?;
        let amounts = self.state.locks.check_unlock(id, caller, now)?.amounts;
        self.deps.custody.withdraw(caller, &amounts)?;
        let released = self.state.locks.commit_unlock(id, now, &self.clock);
        self.advance(now);
        info!(lock = %id.short(), owner = %caller, "escrow: unlocked");
        self.emit(vec![LedgerEvent::Unlocked { lock: *id, owner: *caller, amounts: released, at: now }]);
        Ok(released)
    }

    /// Release every listed lock to its owner regardless of expiry. Only
    /// available once the system is terminated, to the emergency role.
    ///
    /// Unknown ids fail the call before anything moves. Already unlocked
    /// locks are skipped. Each lock is released atomically; if custody fails
    /// part way, locks released so far stay released and their events are
    /// still emitted.
    pub fn forced_unlock(
        &mut self,
        caller: &AccountId,
        ids: &[LockId],
        now: u64,
    ) -> Result<ForcedUnlockSummary, LedgerError> {
        let state = self.deps.gate.state();
        if state != SystemState::Terminated {
            return Err(LedgerError::SystemNotTerminated(state));
        }
        self.ensure_role(caller, Role::Emergency)?;
        self.ensure_fresh(now)?;
        for id in ids {
            self.state.locks.require(id)?;
        }

        let mut summary = ForcedUnlockSummary::default();
        let mut events = Vec::new();
        let mut outcome: Result<(), LedgerError> = Ok(());
        for id in ids {
            let Some(lock) = self.state.locks.get(id) else { continue };
            if lock.is_unlocked() {
                summary.skipped += 1;
                continue;
            }
            let (owner, amounts) = (lock.owner, lock.amounts);
            if let Err(err) = self.deps.custody.withdraw(&owner, &amounts) {
                outcome = Err(err.into());
                break;
            }
            let released = self.state.locks.commit_unlock(id, now, &self.clock);
            summary.unlocked += 1;
            summary.released = summary.released.saturating_add(&released);
            events.push(LedgerEvent::Unlocked { lock: *id, owner, amounts: released, at: now });
        }
        if summary.unlocked > 0 {
            self.advance(now);
        }
        events.push(LedgerEvent::ForcedUnlock {
            unlocked: summary.unlocked,
            skipped: summary.skipped,
            released: summary.released,
            at: now,
        });
        warn!(unlocked = summary.unlocked, skipped = summary.skipped, "escrow: forced unlock");
        self.emit(events);
        outcome.map(|()| summary)
    }

    // ------------------------------------------------------------------
    // Synchronization entry points
    // ------------------------------------------------------------------

    fn sync_one(&mut self, key: AggregateKind, now: u64) -> Option<SyncReport> {
        let mut events = Vec::new();
        let report = self.state.accounts.sync(&key, now, &self.clock);
        if let Some(report) = &report {
            push_synced(&mut events, key, report);
            self.advance(now);
        }
        self.emit(events);
        report
    }

    /// Bring the global aggregate and its supply snapshots up to date.
    pub fn sync_global(&mut self, now: u64) -> Result<SyncReport, LedgerError> {
        self.ensure_live(now)?;
        let mut events = Vec::new();
        let report = self.state.accounts.sync_global(now, &self.clock);
        self.advance(now);
        push_synced(&mut events, AggregateKind::Global, &report);
        self.emit(events);
        Ok(report)
    }

    /// Bring one owner (or, with `as_delegate`, delegate) aggregate up to
    /// date. `None` if the account has never been credited in that role.
    pub fn sync_account(
        &mut self,
        account: &AccountId,
        as_delegate: bool,
        now: u64,
    ) -> Result<Option<SyncReport>, LedgerError> {
        self.ensure_live(now)?;
        let key = if as_delegate { AggregateKind::Delegate(*account) } else { AggregateKind::Owner(*account) };
        Ok(self.sync_one(key, now))
    }

    pub fn sync_pair(
        &mut self,
        owner: &AccountId,
        delegate: &AccountId,
        now: u64,
    ) -> Result<Option<SyncReport>, LedgerError> {
        self.ensure_live(now)?;
        Ok(self.sync_one(AggregateKind::Pair { owner: *owner, delegate: *delegate }, now))
    }

    /// Batch [`sync_account`](Self::sync_account) for external schedulers.
    /// Returns how many aggregates existed and were visited.
    pub fn sync_accounts(
        &mut self,
        caller: &AccountId,
        accounts: &[(AccountId, bool)],
        now: u64,
    ) -> Result<usize, LedgerError> {
        self.ensure_live(now)?;
        self.ensure_role(caller, Role::Syncer)?;
        let keys = accounts
            .iter()
            .map(|(a, as_delegate)| if *as_delegate { AggregateKind::Delegate(*a) } else { AggregateKind::Owner(*a) })
            .collect::<Vec<_>>();
        Ok(self.sync_batch(&keys, now))
    }

    /// Batch [`sync_pair`](Self::sync_pair) for external schedulers.
    pub fn sync_pairs(
        &mut self,
        caller: &AccountId,
        pairs: &[(AccountId, AccountId)],
        now: u64,
    ) -> Result<usize, LedgerError> {
        self.ensure_live(now)?;
        self.ensure_role(caller, Role::Syncer)?;
        let keys = pairs
            .iter()
            .map(|(owner, delegate)| AggregateKind::Pair { owner: *owner, delegate: *delegate })
            .collect::<Vec<_>>();
        Ok(self.sync_batch(&keys, now))
    }

    fn sync_batch(&mut self, keys: &[AggregateKind], now: u64) -> usize {
        let mut events = Vec::new();
        let mut visited = 0;
        for key in keys {
            if let Some(report) = self.state.accounts.sync(key, now, &self.clock) {
                visited += 1;
                push_synced(&mut events, *key, &report);
            }
        }
        if visited > 0 {
            self.advance(now);
        }
        debug!(requested = keys.len(), visited, "escrow: batch sync");
        self.emit(events);
        visited
    }
}

fn push_synced(events: &mut Vec<LedgerEvent>, aggregate: AggregateKind, report: &SyncReport) {
    if report.boundaries > 0 {
        events.push(LedgerEvent::Synced {
            aggregate,
            from: report.from,
            to: report.to,
            boundaries: report.boundaries,
        });
    }
}
