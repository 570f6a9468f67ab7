//! Error types for the Ballast ledger.
use thiserror::Error;

use crate::types::{AccountId, LockId, Role, SystemState};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CustodyError {
    #[error("insufficient balance for {account}: have {have}, need {need}")] InsufficientBalance { account: String, have: u128, need: u128 },
    #[error("transfer rejected: {0}")] Rejected(String),
    #[error("custody overflow")] Overflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // input validation
    #[error("timestamp {0} is not an epoch boundary")] InvalidEpochTime(u64),
    #[error("amount {amount} below minimum {min}")] AmountBelowMinimum { amount: u128, min: u128 },
    #[error("zero amount")] ZeroAmount,
    #[error("expiry {expiry} is not in the future (now {now})")] ZeroDuration { expiry: u64, now: u64 },
    #[error("duration {duration}s below minimum {min}s")] DurationTooShort { duration: u64, min: u64 },
    #[error("duration {duration}s exceeds maximum {max}s")] DurationTooLong { duration: u64, max: u64 },
    #[error("new expiry {new} does not extend current expiry {current}")] ExpiryNotExtended { current: u64, new: u64 },
    // authorization
    #[error("{caller} is not the owner of lock {lock}")] NotOwner { lock: LockId, caller: AccountId },
    #[error("{caller} lacks role {role}")] Unauthorized { caller: AccountId, role: Role },
    #[error("{0} is not a registered delegate")] UnregisteredDelegate(AccountId),
    #[error("owner cannot delegate to itself")] SelfDelegation,
    // lifecycle state
    #[error("lock not found: {0}")] LockNotFound(LockId),
    #[error("lock already unlocked: {0}")] AlreadyUnlocked(LockId),
    #[error("lock not expired: expiry {expiry}, now {now}")] LockNotExpired { expiry: u64, now: u64 },
    #[error("lock not delegated: {0}")] NotDelegated(LockId),
    #[error("lock already delegated: {0}")] AlreadyDelegated(LockId),
    #[error("lock {0} is already delegated to that account")] SameDelegate(LockId),
    #[error("system is {0}, operation requires live")] SystemNotLive(SystemState),
    #[error("system is {0}, operation requires terminated")] SystemNotTerminated(SystemState),
    #[error("timestamp {now} precedes last synchronization at {last}")] StaleTimestamp { now: u64, last: u64 },
    // timing eligibility
    #[error("lock expires too soon: {remaining} epochs remaining, need {required}")] LockExpiresTooSoon { remaining: u64, required: u64 },
    // arithmetic / collaborators
    #[error("arithmetic overflow")] ArithmeticOverflow,
    #[error("custody: {0}")] Custody(#[from] CustodyError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid config: {0}")] Invalid(String),
    #[error("config source: {0}")] Source(#[from] config::ConfigError),
}

#[derive(Error, Debug)]
pub enum BallastError {
    #[error(transparent)] Ledger(#[from] LedgerError),
    #[error(transparent)] Config(#[from] ConfigError),
    #[error("state encoding: {0}")] Encoding(String),
    #[error("io: {0}")] Io(#[from] std::io::Error),
}
