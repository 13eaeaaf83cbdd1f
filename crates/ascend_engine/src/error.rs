//! # Engine Error Types
//!
//! Store errors stay inside the synchronizer; config errors surface at
//! session start; engine errors wrap ledger and spin failures for the UI.

use ascend_economy::EconomyError;
use thiserror::Error;

/// Failures of the underlying key/value store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The write would push the store past its capacity.
    #[error("storage quota exceeded writing {key}: {attempted} bytes, {available} available")]
    QuotaExceeded {
        /// Key being written.
        key: String,
        /// Size of the rejected value.
        attempted: usize,
        /// Bytes still free before the write.
        available: usize,
    },

    /// Persisted data could not be parsed.
    #[error("corrupt persisted data under {key}: {reason}")]
    Corrupt {
        /// Key holding the bad value.
        key: String,
        /// Parser message.
        reason: String,
    },

    /// Filesystem failure in a file-backed store.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Value could not be serialised.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures loading the engine configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for `EngineConfig`.
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Failures of engine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Ledger, spin or catalog failure.
    #[error(transparent)]
    Economy(#[from] EconomyError),

    /// Achievement or task id unknown.
    #[error("progress entry not found: {0}")]
    ProgressNotFound(u64),
}

impl EngineError {
    /// Coins missing for an insufficient-funds failure, zero otherwise.
    #[must_use]
    pub const fn shortfall(&self) -> u64 {
        match self {
            Self::Economy(err) => err.shortfall(),
            Self::ProgressNotFound(_) => 0,
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
