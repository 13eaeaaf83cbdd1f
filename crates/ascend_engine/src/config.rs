//! # Engine Configuration
//!
//! Balance and storage tuning, loaded once at session start from TOML.
//! Every field has a default, so an empty file is a valid config.
//!
//! ```toml
//! [ledger]
//! invitation_ttl_secs = 86400
//!
//! [rewards]
//! battle_win_experience = 50
//! seed = 42                  # omit for an entropy-seeded session
//!
//! [notifications]
//! cap = 100
//! motivation_interval_secs = 3600
//!
//! [storage]
//! quota_bytes = 10485760
//! warn_total_bytes = 8388608
//! cases_budget_bytes = 4194304
//! user_cases_budget_bytes = 2097152
//! default_budget_bytes = 1048576
//! trim_steps = [100, 50, 20]
//! flush_interval_secs = 30
//! ```

use std::path::Path;

use ascend_shared::constants::{
    BATTLE_WIN_EXPERIENCE, CASES_BUDGET_BYTES, DEFAULT_BUDGET_BYTES, DEFAULT_STORE_QUOTA_BYTES,
    INVITATION_TTL_SECS, NOTIFICATION_CAP, STORE_WARN_BYTES, TRIM_STEPS, USER_CASES_BUDGET_BYTES,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Longest accepted TTL or interval: ten years.
pub const MAX_INTERVAL_SECS: i64 = 10 * 365 * 86_400;

/// Ledger tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Lifetime of a pending invitation.
    pub invitation_ttl_secs: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            invitation_ttl_secs: INVITATION_TTL_SECS,
        }
    }
}

/// Reward tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Experience granted for winning a battle.
    pub battle_win_experience: u64,
    /// Fixed seed for the session generator.
    pub seed: Option<u64>,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            battle_win_experience: BATTLE_WIN_EXPERIENCE,
            seed: None,
        }
    }
}

/// Notification tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Retention cap.
    pub cap: usize,
    /// Interval between motivational messages; 0 disables them.
    pub motivation_interval_secs: i64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            cap: NOTIFICATION_CAP,
            motivation_interval_secs: 3600,
        }
    }
}

/// Storage tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Capacity of the store created by the engine when none is supplied.
    pub quota_bytes: usize,
    /// Total size above which a warning is logged.
    pub warn_total_bytes: usize,
    /// Single-write budget for `cases`.
    pub cases_budget_bytes: usize,
    /// Single-write budget for `userCases`.
    pub user_cases_budget_bytes: usize,
    /// Single-write budget for every other key.
    pub default_budget_bytes: usize,
    /// Keep-most-recent trims, in escalation order.
    pub trim_steps: Vec<usize>,
    /// Interval between automatic flushes; 0 flushes on every tick.
    pub flush_interval_secs: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            quota_bytes: DEFAULT_STORE_QUOTA_BYTES,
            warn_total_bytes: STORE_WARN_BYTES,
            cases_budget_bytes: CASES_BUDGET_BYTES,
            user_cases_budget_bytes: USER_CASES_BUDGET_BYTES,
            default_budget_bytes: DEFAULT_BUDGET_BYTES,
            trim_steps: TRIM_STEPS.to_vec(),
            flush_interval_secs: 30,
        }
    }
}

/// Complete engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `[ledger]`
    pub ledger: LedgerConfig,
    /// `[rewards]`
    pub rewards: RewardConfig,
    /// `[notifications]`
    pub notifications: NotificationConfig,
    /// `[storage]`
    pub storage: StorageConfig,
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed TOML and
    /// `ConfigError::Invalid` for out-of-range values.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`EngineConfig::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.invitation_ttl_secs <= 0 || self.ledger.invitation_ttl_secs > MAX_INTERVAL_SECS {
            return Err(ConfigError::Invalid(format!(
                "ledger.invitation_ttl_secs must be in 1..={MAX_INTERVAL_SECS}"
            )));
        }
        if self.notifications.cap == 0 {
            return Err(ConfigError::Invalid(
                "notifications.cap must be at least 1".to_string(),
            ));
        }
        for (name, secs) in [
            ("notifications.motivation_interval_secs", self.notifications.motivation_interval_secs),
            ("storage.flush_interval_secs", self.storage.flush_interval_secs),
        ] {
            if !(0..=MAX_INTERVAL_SECS).contains(&secs) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be in 0..={MAX_INTERVAL_SECS}"
                )));
            }
        }
        let storage = &self.storage;
        if storage.cases_budget_bytes == 0
            || storage.user_cases_budget_bytes == 0
            || storage.default_budget_bytes == 0
        {
            return Err(ConfigError::Invalid("storage budgets must be non-zero".to_string()));
        }
        if storage.trim_steps.is_empty()
            || storage.trim_steps.contains(&0)
            || storage.trim_steps.windows(2).any(|w| w[0] <= w[1])
        {
            return Err(ConfigError::Invalid(
                "storage.trim_steps must be non-empty, non-zero and strictly decreasing".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.storage.trim_steps, vec![100, 50, 20]);
        assert_eq!(config.storage.user_cases_budget_bytes, 2 * 1024 * 1024);
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [ledger]
            invitation_ttl_secs = 60

            [rewards]
            seed = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.ledger.invitation_ttl_secs, 60);
        assert_eq!(config.rewards.seed, Some(7));
        assert_eq!(config.rewards.battle_win_experience, BATTLE_WIN_EXPERIENCE);
        assert_eq!(config.notifications.cap, NOTIFICATION_CAP);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_toml_str("[ledger]\ninvitation_ttl_secs = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("[storage]\ntrim_steps = [20, 50]"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("[ledger\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_rejects_unbounded_intervals() {
        for source in [
            "[ledger]\ninvitation_ttl_secs = 9223372036854775807",
            "[storage]\nflush_interval_secs = 9223372036854775807",
            "[notifications]\nmotivation_interval_secs = 9223372036854775807",
            "[storage]\nflush_interval_secs = -1",
        ] {
            assert!(
                matches!(EngineConfig::from_toml_str(source), Err(ConfigError::Invalid(_))),
                "accepted {source}"
            );
        }

        let edge = format!("[ledger]\ninvitation_ttl_secs = {MAX_INTERVAL_SECS}");
        assert!(EngineConfig::from_toml_str(&edge).is_ok());
    }

    #[test]
    fn test_from_file() {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("ascend_config_{id}.toml"));
        std::fs::write(&path, "[notifications]\ncap = 5\n").unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.notifications.cap, 5);

        std::fs::remove_file(&path).ok();
        assert!(matches!(EngineConfig::from_file(&path), Err(ConfigError::Io(_))));
    }
}
