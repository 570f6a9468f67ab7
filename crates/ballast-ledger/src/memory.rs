//! In-memory collaborators.
//!
//! Each type is a cheap `Clone` handle over shared state, so a test or
//! simulation can hand one clone to the [`Escrow`](crate::escrow::Escrow)
//! and keep another to grant roles, fund accounts, flip the lifecycle state
//! or read emitted events.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ballast_core::error::CustodyError;
use ballast_core::events::LedgerEvent;
use ballast_core::traits::{Authority, Custody, EventSink, LifecycleGate};
use ballast_core::types::{AccountId, Amounts, Role, SystemState};
use parking_lot::RwLock;

use crate::escrow::Collaborators;

#[derive(Default)]
struct AuthorityInner {
    roles: HashMap<AccountId, HashSet<Role>>,
    delegates: HashSet<AccountId>,
}

/// Role table and delegate registry.
#[derive(Clone, Default)]
pub struct MemoryAuthority {
    inner: Arc<RwLock<AuthorityInner>>,
}

impl MemoryAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, account: AccountId, role: Role) {
        self.inner.write().roles.entry(account).or_default().insert(role);
    }

    pub fn revoke(&self, account: &AccountId, role: Role) {
        if let Some(roles) = self.inner.write().roles.get_mut(account) {
            roles.remove(&role);
        }
    }

    pub fn register_delegate(&self, account: AccountId) {
        self.inner.write().delegates.insert(account);
    }

    pub fn deregister_delegate(&self, account: &AccountId) {
        self.inner.write().delegates.remove(account);
    }
}

impl Authority for MemoryAuthority {
    fn has_role(&self, account: &AccountId, role: Role) -> bool {
        self.inner.read().roles.get(account).is_some_and(|r| r.contains(&role))
    }

    fn is_registered_delegate(&self, account: &AccountId) -> bool {
        self.inner.read().delegates.contains(account)
    }
}

#[derive(Default)]
struct CustodyInner {
    balances: HashMap<AccountId, Amounts>,
    held: Amounts,
    reject_withdrawals: bool,
}

/// Wallet balances plus the amount held in escrow.
#[derive(Clone, Default)]
pub struct MemoryCustody {
    inner: Arc<RwLock<CustodyInner>>,
}

impl MemoryCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `account`'s wallet.
    pub fn fund(&self, account: AccountId, amounts: Amounts) {
        let mut inner = self.inner.write();
        let balance = inner.balances.entry(account).or_default();
        *balance = balance.checked_add(&amounts).unwrap_or(Amounts::new(u128::MAX, u128::MAX));
    }

    pub fn balance_of(&self, account: &AccountId) -> Amounts {
        self.inner.read().balances.get(account).copied().unwrap_or_default()
    }

    /// Total principal currently in custody.
    pub fn held(&self) -> Amounts {
        self.inner.read().held
    }

    /// Make every subsequent withdrawal fail, as a broken transport would.
    pub fn reject_withdrawals(&self, reject: bool) {
        self.inner.write().reject_withdrawals = reject;
    }
}

fn shortfall(account: &AccountId, have: &Amounts, need: &Amounts) -> Option<CustodyError> {
    let short = |have: u128, need: u128| {
        (have < need).then(|| CustodyError::InsufficientBalance { account: account.to_string(), have, need })
    };
    short(have.principal_a, need.principal_a).or_else(|| short(have.principal_b, need.principal_b))
}

fn subtract(from: &Amounts, amounts: &Amounts) -> Amounts {
    Amounts::new(from.principal_a - amounts.principal_a, from.principal_b - amounts.principal_b)
}

impl Custody for MemoryCustody {
    fn deposit(&mut self, from: &AccountId, amounts: &Amounts) -> Result<(), CustodyError> {
        let mut inner = self.inner.write();
        let balance = inner.balances.get(from).copied().unwrap_or_default();
        if let Some(err) = shortfall(from, &balance, amounts) {
            return Err(err);
        }
        let held = inner.held.checked_add(amounts).ok_or(CustodyError::Overflow)?;
        inner.balances.insert(*from, subtract(&balance, amounts));
        inner.held = held;
        Ok(())
    }

    fn withdraw(&mut self, to: &AccountId, amounts: &Amounts) -> Result<(), CustodyError> {
        let mut inner = self.inner.write();
        if inner.reject_withdrawals {
            return Err(CustodyError::Rejected("withdrawals disabled".into()));
        }
        let escrow = AccountId::ZERO;
        if let Some(err) = shortfall(&escrow, &inner.held, amounts) {
            return Err(err);
        }
        let balance = inner.balances.get(to).copied().unwrap_or_default();
        let credited = balance.checked_add(amounts).ok_or(CustodyError::Overflow)?;
        inner.held = subtract(&inner.held, amounts);
        inner.balances.insert(*to, credited);
        Ok(())
    }
}

/// Administrative lifecycle switch. Starts [`SystemState::Live`].
#[derive(Clone, Default)]
pub struct MemoryGate {
    state: Arc<RwLock<SystemState>>,
}

impl MemoryGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, state: SystemState) {
        *self.state.write() = state;
    }
}

impl LifecycleGate for MemoryGate {
    fn state(&self) -> SystemState {
        *self.state.read()
    }
}

/// Append-only event log.
#[derive(Clone, Default)]
pub struct MemoryEventLog {
    events: Arc<RwLock<Vec<LedgerEvent>>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events.read().clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Remove and return everything logged so far.
    pub fn drain(&self) -> Vec<LedgerEvent> {
        std::mem::take(&mut *self.events.write())
    }
}

impl EventSink for MemoryEventLog {
    fn emit(&mut self, event: LedgerEvent) {
        self.events.write().push(event);
    }
}

/// One handle to each in-memory collaborator.
#[derive(Clone, Default)]
pub struct MemoryCollaborators {
    pub authority: MemoryAuthority,
    pub custody: MemoryCustody,
    pub gate: MemoryGate,
    pub events: MemoryEventLog,
}

impl MemoryCollaborators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Boxed clones for [`Escrow::new`](crate::escrow::Escrow::new).
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            authority: Box::new(self.authority.clone()),
            custody: Box::new(self.custody.clone()),
            gate: Box::new(self.gate.clone()),
            sink: Box::new(self.events.clone()),
        }
    }
}
