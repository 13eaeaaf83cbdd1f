//! User-facing notification records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BattleId, InvitationId, NotificationId, ProgressId, UserId};

/// What a notification is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    /// An achievement flipped to unlocked.
    AchievementUnlocked,
    /// A task flipped to completed.
    TaskCompleted,
    /// Someone challenged the self user.
    ChallengeReceived,
    /// The self user challenged someone.
    ChallengeSent,
    /// An invitation involving the self user was accepted.
    ChallengeAccepted,
    /// An invitation involving the self user was declined.
    ChallengeDeclined,
    /// An invitation involving the self user expired.
    ChallengeExpired,
    /// The self user won a battle.
    BattleWon,
    /// The self user lost a battle.
    BattleLost,
    /// The self user gained one or more levels.
    LevelUp,
    /// A balance check failed.
    InsufficientFunds,
    /// Periodic encouragement.
    Motivation,
}

/// Display priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Informational.
    Low,
    /// Default.
    Normal,
    /// Needs attention.
    High,
}

/// Structured data attached to a notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NotificationPayload {
    /// Reward paid for an achievement or task.
    Reward {
        /// Achievement or task id.
        source_id: ProgressId,
        /// Coins credited.
        coins: u64,
        /// Experience granted.
        experience: u64,
    },
    /// Invitation details.
    Invitation {
        /// Invitation id.
        invitation_id: InvitationId,
        /// The other participant.
        counterpart_id: UserId,
        /// Stake.
        stake: u64,
    },
    /// Battle result.
    Battle {
        /// Battle id.
        battle_id: BattleId,
        /// The other participant.
        counterpart_id: UserId,
        /// Stake transferred.
        stake: u64,
    },
    /// Level change.
    Level {
        /// Level before.
        old_level: u32,
        /// Level after.
        new_level: u32,
        /// Coins credited.
        bonus_coins: u64,
    },
    /// Failed balance check.
    Shortfall {
        /// Participant whose balance was short.
        user_id: UserId,
        /// Coins required.
        required: u64,
        /// Coins available.
        available: u64,
    },
}

/// A notification in the feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Stable identifier.
    pub id: NotificationId,
    /// Kind.
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Title line.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Priority.
    pub priority: Priority,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Read flag.
    #[serde(default)]
    pub read: bool,
    /// Optional structured data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<NotificationPayload>,
}
