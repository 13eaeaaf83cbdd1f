//! Participants, invitations and battles.
//!
//! These records are owned by the escrow ledger at runtime and written to
//! the `users` / `personalBattles` keys by the store synchronizer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{EXPERIENCE_PER_LEVEL_STEP, STARTING_RATING};
use crate::{BattleId, InvitationId, UserId};

/// A session participant.
///
/// `balance` is unsigned: the ledger floors every debit at zero, so a
/// negative balance is unrepresentable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Stable identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Current level (>= 1).
    pub level: u32,
    /// Progress within the current level.
    pub experience: u64,
    /// Experience needed to leave the current level (> 0).
    pub experience_to_next_level: u64,
    /// Coin balance.
    pub balance: u64,
    /// Matchmaking rating.
    pub rating: i64,
    /// Presence flag supplied by the host application.
    #[serde(default)]
    pub online: bool,
}

impl User {
    /// Creates a level 1 user with the given balance.
    #[must_use]
    pub fn new(id: UserId, name: impl Into<String>, balance: u64) -> Self {
        Self {
            id,
            name: name.into(),
            level: 1,
            experience: 0,
            experience_to_next_level: EXPERIENCE_PER_LEVEL_STEP,
            balance,
            rating: STARTING_RATING,
            online: false,
        }
    }

    /// Sets the rating.
    #[must_use]
    pub const fn with_rating(mut self, rating: i64) -> Self {
        self.rating = rating;
        self
    }

    /// Marks the user online.
    #[must_use]
    pub const fn online(mut self) -> Self {
        self.online = true;
        self
    }
}

/// Lifecycle of a battle invitation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    /// Waiting for the opponent.
    Pending,
    /// Opponent accepted, battle created.
    Accepted,
    /// Opponent declined, or funds failed the accept-time check.
    Declined,
    /// TTL elapsed before an answer.
    Expired,
}

impl InvitationStatus {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Expired => "expired",
        }
    }

    /// True for every status except `Pending`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A wager offered by one participant to another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleInvitation {
    /// Stable identifier.
    pub id: InvitationId,
    /// Participant issuing the challenge.
    pub challenger_id: UserId,
    /// Challenger display name.
    pub challenger_name: String,
    /// Participant being challenged.
    pub opponent_id: UserId,
    /// Opponent display name.
    pub opponent_name: String,
    /// Coins wagered by each side.
    pub stake: u64,
    /// Current status.
    pub status: InvitationStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// `created_at + ttl`.
    pub expires_at: DateTime<Utc>,
}

impl BattleInvitation {
    /// Returns true when the invitation is pending and its TTL has elapsed.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == InvitationStatus::Pending && now >= self.expires_at
    }

    /// Returns true when `user_id` is either side of the invitation.
    #[must_use]
    pub fn involves(&self, user_id: UserId) -> bool {
        self.challenger_id == user_id || self.opponent_id == user_id
    }

    /// Computes the expiry for an invitation created at `created_at`.
    #[must_use]
    pub fn expiry_for(created_at: DateTime<Utc>, ttl_secs: i64) -> DateTime<Utc> {
        created_at + Duration::seconds(ttl_secs)
    }
}

/// Lifecycle of a battle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BattleStatus {
    /// Stake agreed, waiting for a result.
    Active,
    /// Stake transferred.
    Completed,
}

impl BattleStatus {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

/// A battle created from an accepted invitation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Battle {
    /// Stable identifier.
    pub id: BattleId,
    /// Invitation this battle was created from.
    pub invitation_id: InvitationId,
    /// Challenger id.
    pub challenger_id: UserId,
    /// Challenger display name.
    pub challenger_name: String,
    /// Opponent id.
    pub opponent_id: UserId,
    /// Opponent display name.
    pub opponent_name: String,
    /// Coins transferred on completion.
    pub stake: u64,
    /// Current status.
    pub status: BattleStatus,
    /// Time the invitation was accepted.
    pub started_at: DateTime<Utc>,
    /// Time the result was recorded.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Winner id once completed.
    #[serde(default)]
    pub winner_id: Option<UserId>,
    /// Loser id once completed.
    #[serde(default)]
    pub loser_id: Option<UserId>,
    /// Winner display name once completed.
    #[serde(default)]
    pub winner_name: Option<String>,
    /// Loser display name once completed.
    #[serde(default)]
    pub loser_name: Option<String>,
}

impl Battle {
    /// Returns true when `user_id` fought in this battle.
    #[must_use]
    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.challenger_id == user_id || self.opponent_id == user_id
    }

    /// Returns the other side of the battle, if `user_id` is a participant.
    #[must_use]
    pub fn other_participant(&self, user_id: UserId) -> Option<UserId> {
        if user_id == self.challenger_id {
            Some(self.opponent_id)
        } else if user_id == self.opponent_id {
            Some(self.challenger_id)
        } else {
            None
        }
    }

    /// Display name of a participant.
    #[must_use]
    pub fn name_of(&self, user_id: UserId) -> Option<&str> {
        if user_id == self.challenger_id {
            Some(&self.challenger_name)
        } else if user_id == self.opponent_id {
            Some(&self.opponent_name)
        } else {
            None
        }
    }
}
