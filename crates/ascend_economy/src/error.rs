//! # Economy Error Types
//!
//! All errors that can occur in the economy system.

use ascend_shared::{BattleId, ContainerId, InvitationId, UserId};
use thiserror::Error;

/// Errors that can occur in the economy system.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EconomyError {
    /// A balance gate failed.
    #[error("insufficient funds: user {user_id} needs {required}, has {available}")]
    InsufficientFunds {
        /// The participant whose balance was short.
        user_id: UserId,
        /// The amount required.
        required: u64,
        /// The amount available.
        available: u64,
    },

    /// User not registered with the ledger.
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    /// Invitation absent or already terminal.
    #[error("invitation not found or no longer pending: {0}")]
    InvitationNotFound(InvitationId),

    /// Battle absent.
    #[error("battle not found: {0}")]
    BattleNotFound(BattleId),

    /// Container absent from the catalog or owned set.
    #[error("container not found: {0}")]
    ContainerNotFound(ContainerId),

    /// Entity exists but is in the wrong state for the operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Stakes must be positive.
    #[error("invalid stake: {0}")]
    InvalidStake(u64),

    /// Invalid reward configuration (empty candidate set, bad weight).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EconomyError {
    /// Coins missing for an `InsufficientFunds` failure, zero otherwise.
    #[must_use]
    pub const fn shortfall(&self) -> u64 {
        match self {
            Self::InsufficientFunds { required, available, .. } => {
                required.saturating_sub(*available)
            }
            _ => 0,
        }
    }
}

/// Result type for economy operations.
pub type EconomyResult<T> = Result<T, EconomyError>;
