//! Events recorded by the escrow ledger.
//!
//! The ledger appends these to its outbox as part of the mutation that
//! caused them. The engine drains the outbox once per tick and hands the
//! events to the notification deriver.

use serde::{Deserialize, Serialize};

use crate::{BattleId, InvitationId, UserId};

/// Why an invitation ended up declined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeclineReason {
    /// The opponent said no.
    Refused,
    /// A participant no longer had the stake at accept time.
    InsufficientFunds,
}

/// Ledger events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LedgerEvent {
    /// A pending invitation was created.
    InvitationCreated {
        /// Invitation id.
        invitation_id: InvitationId,
        /// Challenger.
        challenger_id: UserId,
        /// Opponent.
        opponent_id: UserId,
        /// Stake.
        stake: u64,
    },
    /// An invitation was accepted and a battle started.
    InvitationAccepted {
        /// Invitation id.
        invitation_id: InvitationId,
        /// Battle created from it.
        battle_id: BattleId,
    },
    /// An invitation was declined.
    InvitationDeclined {
        /// Invitation id.
        invitation_id: InvitationId,
        /// Cause.
        reason: DeclineReason,
    },
    /// An invitation passed its TTL.
    InvitationExpired {
        /// Invitation id.
        invitation_id: InvitationId,
    },
    /// A battle settled and the stake moved.
    BattleCompleted {
        /// Battle id.
        battle_id: BattleId,
        /// Winner.
        winner_id: UserId,
        /// Loser.
        loser_id: UserId,
        /// Coins credited to the winner.
        stake: u64,
        /// Coins actually removed from the loser (floored at their balance).
        debited: u64,
    },
    /// A balance gate rejected an operation.
    FundsRejected {
        /// Participant whose balance was short.
        user_id: UserId,
        /// Challenger of the rejected wager.
        challenger_id: UserId,
        /// Opponent of the rejected wager.
        opponent_id: UserId,
        /// Coins required.
        required: u64,
        /// Coins available.
        available: u64,
    },
    /// A participant gained levels; the bonus is already credited.
    LevelUp {
        /// Participant.
        user_id: UserId,
        /// Level before.
        old_level: u32,
        /// Level after.
        new_level: u32,
        /// Coins credited with the level change.
        bonus_coins: u64,
    },
    /// Coins were credited outside a battle.
    Credited {
        /// Participant.
        user_id: UserId,
        /// Coins.
        amount: u64,
    },
}

impl LedgerEvent {
    /// Returns true when `user_id` is a party to the event.
    #[must_use]
    pub fn involves(&self, user_id: UserId) -> bool {
        match self {
            Self::InvitationCreated { challenger_id, opponent_id, .. }
            | Self::FundsRejected { challenger_id, opponent_id, .. } => {
                *challenger_id == user_id || *opponent_id == user_id
            }
            Self::BattleCompleted { winner_id, loser_id, .. } => {
                *winner_id == user_id || *loser_id == user_id
            }
            Self::LevelUp { user_id: id, .. } | Self::Credited { user_id: id, .. } => {
                *id == user_id
            }
            Self::InvitationAccepted { .. }
            | Self::InvitationDeclined { .. }
            | Self::InvitationExpired { .. } => false,
        }
    }
}
