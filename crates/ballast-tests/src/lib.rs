//! Integration test suite for the Ballast ledger.
//!
//! Scenario tests walk concrete lock and delegation histories; property
//! tests drive random operation sequences and check that every aggregate
//! stays equal to the locks it is credited with; adversarial tests attack
//! the gates, the arithmetic and the atomicity of each operation.

pub mod helpers;
