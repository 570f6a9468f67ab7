//! Ledger configuration.
//!
//! Provides [`LedgerConfig`] with protocol defaults from
//! [`constants`](crate::constants), presets for tests, and file loading
//! through the `config` crate (TOML, JSON or YAML, picked by extension)
//! layered with `BALLAST_*` environment overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DELEGATION_FREEZE_EPOCHS, ENV_PREFIX, EPOCH_DURATION, MAX_TERM, MIN_CHANGE_EPOCHS,
    MIN_LOCK_DURATION,
};
use crate::epoch::EpochClock;
use crate::error::ConfigError;

/// Tunable parameters of a ledger instance. All durations in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Length of one epoch.
    pub epoch_duration: u64,
    /// Longest allowed lock term; also the divisor of a lock's slope.
    pub max_term: u64,
    /// Shortest allowed lock term at creation.
    pub min_lock_duration: u64,
    /// Dust floor for a lock's total principal. Must be at least `max_term`.
    pub min_lock_amount: u64,
    /// Whole epochs that must remain to increase amount or duration.
    pub min_change_epochs: u64,
    /// Whole epochs that must remain to delegate, switch or undelegate.
    pub delegation_freeze_epochs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            epoch_duration: EPOCH_DURATION,
            max_term: MAX_TERM,
            min_lock_duration: MIN_LOCK_DURATION,
            min_lock_amount: MAX_TERM,
            min_change_epochs: MIN_CHANGE_EPOCHS,
            delegation_freeze_epochs: DELEGATION_FREEZE_EPOCHS,
        }
    }
}

impl LedgerConfig {
    /// Production preset: weekly epochs, four-year maximum term.
    pub fn mainnet() -> Self {
        Self::default()
    }

    /// Fast preset for tests and simulations: one-day epochs, 52-epoch term.
    pub fn testing() -> Self {
        let day = 24 * 60 * 60;
        Self {
            epoch_duration: day,
            max_term: 52 * day,
            min_lock_duration: 3 * day,
            min_lock_amount: 52 * day,
            ..Self::default()
        }
    }

    /// Epoch clock for this configuration.
    pub fn clock(&self) -> EpochClock {
        EpochClock::new(self.epoch_duration)
    }

    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if the epoch is zero, the maximum term is zero
    /// or not a whole number of epochs, the dust floor would allow a zero
    /// slope, or the minimum duration exceeds the maximum term.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.epoch_duration == 0 {
            return Err(ConfigError::Invalid("epoch_duration must be non-zero".into()));
        }
        if self.max_term == 0 || self.max_term % self.epoch_duration != 0 {
            return Err(ConfigError::Invalid(format!(
                "max_term {} must be a non-zero multiple of epoch_duration {}",
                self.max_term, self.epoch_duration
            )));
        }
        if self.min_lock_amount < self.max_term {
            return Err(ConfigError::Invalid(format!(
                "min_lock_amount {} below max_term {} allows zero-slope locks",
                self.min_lock_amount, self.max_term
            )));
        }
        if self.min_lock_duration > self.max_term {
            return Err(ConfigError::Invalid(format!(
                "min_lock_duration {} exceeds max_term {}",
                self.min_lock_duration, self.max_term
            )));
        }
        Ok(())
    }

    /// Load from a file, apply `BALLAST_*` environment overrides, validate.
    ///
    /// Missing keys fall back to [`LedgerConfig::default`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        let cfg: LedgerConfig = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_is_valid() {
        LedgerConfig::default().validate().unwrap();
        LedgerConfig::mainnet().validate().unwrap();
        LedgerConfig::testing().validate().unwrap();
    }

    #[test]
    fn default_matches_constants() {
        let cfg = LedgerConfig::default();
        assert_eq!(cfg.epoch_duration, EPOCH_DURATION);
        assert_eq!(cfg.max_term, MAX_TERM);
        assert_eq!(cfg.delegation_freeze_epochs, 2);
        assert_eq!(cfg.min_change_epochs, 1);
    }

    #[test]
    fn rejects_zero_epoch() {
        let cfg = LedgerConfig { epoch_duration: 0, ..LedgerConfig::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_misaligned_max_term() {
        let cfg = LedgerConfig { max_term: MAX_TERM + 1, min_lock_amount: MAX_TERM + 1, ..LedgerConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_dust_floor_below_max_term() {
        let cfg = LedgerConfig { min_lock_amount: MAX_TERM - 1, ..LedgerConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_min_duration_above_max() {
        let cfg = LedgerConfig { min_lock_duration: MAX_TERM + EPOCH_DURATION, ..LedgerConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn clock_uses_epoch_duration() {
        assert_eq!(LedgerConfig::testing().clock().duration(), 86_400);
    }

    #[test]
    fn load_toml_with_partial_keys() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "epoch_duration = 86400").unwrap();
        writeln!(file, "max_term = 4492800").unwrap();
        writeln!(file, "min_lock_amount = 4492800").unwrap();
        writeln!(file, "min_lock_duration = 259200").unwrap();
        let cfg = LedgerConfig::load(file.path()).unwrap();
        assert_eq!(cfg.epoch_duration, 86_400);
        assert_eq!(cfg.max_term, 52 * 86_400);
        assert_eq!(cfg.delegation_freeze_epochs, DELEGATION_FREEZE_EPOCHS);
    }

    #[test]
    fn load_rejects_invalid_values() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "epoch_duration = 86400").unwrap();
        writeln!(file, "max_term = 100000").unwrap();
        let err = LedgerConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = LedgerConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Source(_)));
    }

    #[test]
    fn config_serializes_to_json() {
        let json = serde_json::to_string(&LedgerConfig::testing()).unwrap();
        let back: LedgerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, LedgerConfig::testing());
    }
}
