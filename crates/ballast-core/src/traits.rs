//! Trait interfaces for the ledger's external collaborators.
//!
//! The accounting engine owns no policy about who may do what, where the
//! principal physically lives, whether the system is paused, or how change
//! records are published. These traits define those seams:
//! - [`Authority`]: role checks and the delegate registry
//! - [`Custody`]: moves principal in and out
//! - [`LifecycleGate`]: pause / freeze / terminate state
//! - [`EventSink`]: receives [`LedgerEvent`]s
//!
//! `ballast-ledger` ships in-memory implementations of all four.

use crate::error::CustodyError;
use crate::events::LedgerEvent;
use crate::types::{AccountId, Amounts, Role, SystemState};

/// Role checks and delegate eligibility.
pub trait Authority: Send + Sync {
    /// Whether `account` holds `role`.
    fn has_role(&self, account: &AccountId, role: Role) -> bool;

    /// Whether `account` may receive delegated voting power.
    fn is_registered_delegate(&self, account: &AccountId) -> bool;
}

/// Principal custody.
///
/// Both calls are all-or-nothing: on `Err` no principal has moved. Any
/// fallback transport (for example a wrapped-asset path) is the
/// implementation's concern.
pub trait Custody: Send + Sync {
    /// Pull `amounts` from `from` into custody.
    fn deposit(&mut self, from: &AccountId, amounts: &Amounts) -> Result<(), CustodyError>;

    /// Release `amounts` from custody to `to`.
    fn withdraw(&mut self, to: &AccountId, amounts: &Amounts) -> Result<(), CustodyError>;
}

/// Administrative lifecycle gate consulted before every mutation.
pub trait LifecycleGate: Send + Sync {
    fn state(&self) -> SystemState;

    /// Default implementation: `state() == SystemState::Live`.
    fn is_live(&self) -> bool {
        self.state() == SystemState::Live
    }
}

/// Consumer of structured change records.
pub trait EventSink: Send + Sync {
    fn emit(&mut self, event: LedgerEvent);

    /// Emit a batch in order.
    ///
    /// Default implementation calls [`emit`](Self::emit) for each event.
    fn emit_all(&mut self, events: Vec<LedgerEvent>) {
        for event in events {
            self.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct StaticAuthority {
        delegates: HashSet<AccountId>,
    }

    impl Authority for StaticAuthority {
        fn has_role(&self, _account: &AccountId, _role: Role) -> bool {
            false
        }

        fn is_registered_delegate(&self, account: &AccountId) -> bool {
            self.delegates.contains(account)
        }
    }

    struct FixedGate(SystemState);

    impl LifecycleGate for FixedGate {
        fn state(&self) -> SystemState {
            self.0
        }
    }

    struct CountingSink(usize);

    impl EventSink for CountingSink {
        fn emit(&mut self, _event: LedgerEvent) {
            self.0 += 1;
        }
    }

    #[test]
    fn gate_default_is_live_only_for_live() {
        assert!(FixedGate(SystemState::Live).is_live());
        assert!(!FixedGate(SystemState::Paused).is_live());
        assert!(!FixedGate(SystemState::Frozen).is_live());
        assert!(!FixedGate(SystemState::Terminated).is_live());
    }

    #[test]
    fn authority_registry_lookup() {
        let d = AccountId([9; 32]);
        let auth = StaticAuthority { delegates: [d].into_iter().collect() };
        assert!(auth.is_registered_delegate(&d));
        assert!(!auth.is_registered_delegate(&AccountId([1; 32])));
        assert!(!auth.has_role(&d, Role::Syncer));
    }

    #[test]
    fn emit_all_forwards_each_event() {
        let mut sink = CountingSink(0);
        let ev = LedgerEvent::ForcedUnlock { unlocked: 0, skipped: 0, released: Amounts::ZERO, at: 0 };
        sink.emit_all(vec![ev.clone(), ev]);
        assert_eq!(sink.0, 2);
    }
}
