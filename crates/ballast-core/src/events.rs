//! Structured change records emitted by the ledger.
//!
//! Events are handed to an [`EventSink`](crate::traits::EventSink) after the
//! operation that produced them has fully committed.

use serde::{Deserialize, Serialize};

use crate::balance::DecayBalance;
use crate::types::{AccountId, Amounts, LockId};

/// Which aggregate a [`LedgerEvent::BalanceUpdated`] or
/// [`LedgerEvent::Synced`] refers to.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AggregateKind {
    Global,
    Owner(AccountId),
    Delegate(AccountId),
    Pair { owner: AccountId, delegate: AccountId },
}

impl AggregateKind {
    /// Role aggregate crediting `holder` for a lock owned by `owner`.
    pub fn role(holder: AccountId, owner: AccountId) -> Self {
        if holder == owner {
            Self::Owner(owner)
        } else {
            Self::Delegate(holder)
        }
    }

    /// Pair aggregate for `holder` if it is a delegate of `owner`.
    pub fn pair(holder: AccountId, owner: AccountId) -> Option<Self> {
        (holder != owner).then_some(Self::Pair { owner, delegate: holder })
    }
}

/// One change record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEvent {
    LockCreated {
        lock: LockId,
        owner: AccountId,
        amounts: Amounts,
        expiry: u64,
        balance: DecayBalance,
        at: u64,
    },
    AmountIncreased {
        lock: LockId,
        added: Amounts,
        delta: DecayBalance,
        at: u64,
    },
    DurationIncreased {
        lock: LockId,
        old_expiry: u64,
        new_expiry: u64,
        delta: DecayBalance,
        at: u64,
    },
    /// An aggregate's live balance changed through a lock mutation.
    BalanceUpdated {
        aggregate: AggregateKind,
        balance: DecayBalance,
        at: u64,
    },
    DelegationChanged {
        lock: LockId,
        from: Option<AccountId>,
        to: Option<AccountId>,
        activates_at: u64,
        at: u64,
    },
    Unlocked {
        lock: LockId,
        owner: AccountId,
        amounts: Amounts,
        at: u64,
    },
    ForcedUnlock {
        unlocked: usize,
        skipped: usize,
        released: Amounts,
        at: u64,
    },
    /// A synchronization pass crossed at least one boundary.
    Synced {
        aggregate: AggregateKind,
        from: u64,
        to: u64,
        boundaries: usize,
    },
}

impl LedgerEvent {
    /// The lock this event concerns, if any.
    pub fn lock(&self) -> Option<&LockId> {
        match self {
            Self::LockCreated { lock, .. }
            | Self::AmountIncreased { lock, .. }
            | Self::DurationIncreased { lock, .. }
            | Self::DelegationChanged { lock, .. }
            | Self::Unlocked { lock, .. } => Some(lock),
            Self::BalanceUpdated { .. } | Self::ForcedUnlock { .. } | Self::Synced { .. } => None,
        }
    }
}
