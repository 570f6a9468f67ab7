//! # ballast-ledger: decay-balance accounting engine.
//!
//! All calculations use integer arithmetic only.
//!
//! The engine keeps four classes of aggregate consistent under lazy,
//! caller-triggered updates:
//! - **Global**: live on every mutation, with per-epoch supply snapshots
//!   memoized as synchronization crosses epoch boundaries.
//! - **Owner / Delegate**: power credited to an account as lock owner or as
//!   delegation target.
//! - **Pair**: power an owner has delegated to one particular delegate.
//!
//! Delegation changes never move power immediately: they book a pending
//! delta keyed to the next epoch start, which the sync engine applies when
//! the affected aggregate is next advanced.

pub mod aggregate;
pub mod checkpoint;
pub mod delegation;
pub mod escrow;
pub mod lock;
pub mod memory;
pub mod persist;
pub mod query;
pub mod sync;

pub use aggregate::{AccountStore, AggregateAccount, PendingDelta};
pub use ballast_core::events::AggregateKind;
pub use checkpoint::Checkpoint;
pub use delegation::DelegationState;
pub use escrow::{Collaborators, Escrow, ForcedUnlockSummary, LedgerState, NewLock};
pub use lock::{Lock, LockBook};
pub use memory::{MemoryAuthority, MemoryCollaborators, MemoryCustody, MemoryEventLog, MemoryGate};
pub use sync::SyncReport;
