//! Shared helpers for scenario, property and adversarial tests.

use ballast_core::balance::DecayBalance;
use ballast_core::config::LedgerConfig;
use ballast_core::constants::UNIT;
use ballast_core::error::LedgerError;
use ballast_core::events::AggregateKind;
use ballast_core::types::{AccountId, Amounts, LockId};
use ballast_ledger::{Escrow, Lock, MemoryCollaborators};

/// Simple account id from a seed byte.
pub fn acct(seed: u8) -> AccountId {
    AccountId([seed; 32])
}

/// `units` whole tokens of the first principal component.
pub fn units(units: u128) -> Amounts {
    Amounts::new(units * UNIT, 0)
}

/// Escrow over in-memory collaborators, plus a clock the test advances.
pub struct Harness {
    pub escrow: Escrow,
    pub mem: MemoryCollaborators,
    pub now: u64,
}

impl Harness {
    /// Testing config (one-day epochs), genesis at 0.
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::testing())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        let mem = MemoryCollaborators::new();
        let escrow = Escrow::new(config, 0, mem.collaborators()).expect("valid config");
        Self { escrow, mem, now: 0 }
    }

    pub fn epoch(&self) -> u64 {
        self.escrow.config().epoch_duration
    }

    /// Start of epoch `n`.
    pub fn epoch_start(&self, n: u64) -> u64 {
        n * self.epoch()
    }

    /// Move the clock to `t`.
    pub fn at(&mut self, t: u64) -> &mut Self {
        self.now = t;
        self
    }

    /// Give every listed account plenty of both principal components.
    pub fn fund(&self, seeds: &[u8]) {
        for seed in seeds {
            self.mem.custody.fund(acct(*seed), Amounts::new(1_000_000 * UNIT, 1_000_000 * UNIT));
        }
    }

    pub fn register(&self, seeds: &[u8]) {
        for seed in seeds {
            self.mem.authority.register_delegate(acct(*seed));
        }
    }

    /// Lock `amount` tokens of `owner` until the start of epoch `expiry_epoch`.
    pub fn create(&mut self, owner: u8, amount: u128, expiry_epoch: u64) -> Result<LockId, LedgerError> {
        let expiry = self.epoch_start(expiry_epoch);
        self.escrow.create_lock(&acct(owner), units(amount), expiry, self.now)
    }

    pub fn lock(&self, id: &LockId) -> &Lock {
        self.escrow.locks().get(id).expect("lock exists")
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `lock` credits `key` at `t`.
fn credits(lock: &Lock, key: &AggregateKind, t: u64) -> bool {
    let holder = lock.holder_at(t);
    match key {
        AggregateKind::Global => true,
        _ => AggregateKind::role(holder, lock.owner) == *key || AggregateKind::pair(holder, lock.owner) == Some(*key),
    }
}

/// Sum of the powers at `t` of every live lock crediting `key` at `t`.
pub fn credited_power(escrow: &Escrow, key: &AggregateKind, t: u64) -> u128 {
    escrow
        .locks()
        .iter()
        .filter(|lock| !lock.is_unlocked() && credits(lock, key, t))
        .map(|lock| lock.balance().value_at(t))
        .sum()
}

/// Component-wise sum of the balances of every lock crediting `key` at `t`
/// that has not expired by `t`.
pub fn credited_balance(escrow: &Escrow, key: &AggregateKind, t: u64) -> DecayBalance {
    escrow
        .locks()
        .iter()
        .filter(|lock| !lock.is_unlocked() && lock.expiry > t && credits(lock, key, t))
        .fold(DecayBalance::ZERO, |acc, lock| acc.saturating_add(&lock.balance()))
}

/// Every aggregate key some lock could credit.
pub fn all_keys(escrow: &Escrow) -> Vec<AggregateKind> {
    let mut keys = vec![AggregateKind::Global];
    for lock in escrow.locks().iter() {
        keys.push(AggregateKind::Owner(lock.owner));
        if let Some(d) = lock.delegate {
            keys.push(AggregateKind::Delegate(d));
            keys.push(AggregateKind::Pair { owner: lock.owner, delegate: d });
        }
        let holder = lock.current_holder;
        if holder != lock.owner {
            keys.push(AggregateKind::Delegate(holder));
            keys.push(AggregateKind::Pair { owner: lock.owner, delegate: holder });
        }
    }
    keys.sort();
    keys.dedup();
    keys
}

/// Power the query surface reports for `key` at `t`.
pub fn reported_power(escrow: &Escrow, key: &AggregateKind, t: u64) -> u128 {
    match key {
        AggregateKind::Global => escrow.total_supply(t),
        AggregateKind::Owner(a) => escrow.owner_power(a, t),
        AggregateKind::Delegate(a) => escrow.delegate_power(a, t),
        AggregateKind::Pair { owner, delegate } => escrow.pair_power(owner, delegate, t),
    }
}
