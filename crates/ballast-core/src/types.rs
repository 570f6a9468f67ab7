//! Core identifier and value types: accounts, lock ids, principal amounts.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::LOCK_ID_DOMAIN;

/// A 32-byte account identifier.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    /// The zero account. Never a valid owner or delegate.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero account.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for AccountId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Identifier of a lock, derived from the owner and its creation context.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
pub struct LockId(pub [u8; 32]);

impl LockId {
    /// Derive a lock id as `BLAKE3(domain || owner || created_at || nonce)`.
    ///
    /// The nonce is a per-ledger counter, so two locks created by the same
    /// owner in the same second still get distinct ids.
    pub fn derive(owner: &AccountId, created_at: u64, nonce: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(LOCK_ID_DOMAIN);
        hasher.update(owner.as_bytes());
        hasher.update(&created_at.to_le_bytes());
        hasher.update(&nonce.to_le_bytes());
        Self(hasher.finalize().into())
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First 8 hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// The two fungible principal components of a lock. Both count toward slope.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Amounts {
    pub principal_a: u128,
    pub principal_b: u128,
}

impl Amounts {
    pub const ZERO: Self = Self { principal_a: 0, principal_b: 0 };

    pub fn new(principal_a: u128, principal_b: u128) -> Self {
        Self { principal_a, principal_b }
    }

    /// Sum of both components, `None` on overflow.
    pub fn total(&self) -> Option<u128> {
        self.principal_a.checked_add(self.principal_b)
    }

    pub fn is_zero(&self) -> bool {
        self.principal_a == 0 && self.principal_b == 0
    }

    /// Component-wise checked addition.
    pub fn checked_add(&self, other: &Amounts) -> Option<Amounts> {
        Some(Amounts {
            principal_a: self.principal_a.checked_add(other.principal_a)?,
            principal_b: self.principal_b.checked_add(other.principal_b)?,
        })
    }

    /// Component-wise addition clamped at `u128::MAX`.
    pub fn saturating_add(&self, other: &Amounts) -> Amounts {
        Amounts {
            principal_a: self.principal_a.saturating_add(other.principal_a),
            principal_b: self.principal_b.saturating_add(other.principal_b),
        }
    }
}

/// Privileged roles answered by the [`Authority`](crate::traits::Authority).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// May create locks on behalf of other owners.
    Operator,
    /// May run batch synchronization.
    Syncer,
    /// May force-unlock locks once the system is terminated.
    Emergency,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operator => write!(f, "operator"),
            Self::Syncer => write!(f, "syncer"),
            Self::Emergency => write!(f, "emergency"),
        }
    }
}

/// Administrative lifecycle reported by the
/// [`LifecycleGate`](crate::traits::LifecycleGate).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SystemState {
    /// Normal operation.
    #[default]
    Live,
    /// Temporarily halted; every mutating operation fails.
    Paused,
    /// Halted pending migration; every mutating operation fails.
    Frozen,
    /// Terminal. Only forced unlocks are accepted.
    Terminated,
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Paused => write!(f, "paused"),
            Self::Frozen => write!(f, "frozen"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}
