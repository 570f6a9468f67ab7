//! # ballast-core
//! Foundation types, decay math and collaborator traits for the Ballast
//! voting-power ledger.
//!
//! All balance arithmetic is integer-only. Voting power is represented as a
//! [`DecayBalance`](balance::DecayBalance) `(bias, slope)` pair whose value at
//! time `t` is `bias - slope * t`, saturating at zero.

pub mod balance;
pub mod config;
pub mod constants;
pub mod epoch;
pub mod error;
pub mod events;
pub mod traits;
pub mod types;
