//! # Escrow Ledger
//!
//! **THE LEDGER** - No coin moves without it.
//!
//! Owns every participant balance plus the invitation and battle state
//! machines. Nothing else in the workspace writes a balance.
//!
//! ## Battle Lifecycle
//!
//! ```text
//! create_invitation ──► Pending ──accept──► Accepted ──► Battle::Active
//!                          │                                  │
//!                          ├──decline──► Declined             │ complete_battle
//!                          ├──accept, funds short──► Declined ▼
//!                          └──ttl elapsed──► Expired    Battle::Completed
//!                                                       (+stake winner, −stake loser)
//! ```
//!
//! ## Balance Gates
//!
//! Funds are checked, not reserved. `create_invitation` checks both sides
//! against the current balance; `accept_invitation` checks again, and an
//! invitation whose participants can no longer cover the stake is declined
//! rather than left pending. A debit never takes a balance below zero.
//!
//! ## Expiry
//!
//! There is no timer. Every operation that reads invitations first runs
//! [`EscrowLedger::expire_stale`] with the caller's `now`.

use std::collections::BTreeMap;

use ascend_shared::{
    Battle, BattleId, BattleInvitation, BattleStatus, DeclineReason, InvitationId,
    InvitationStatus, LedgerEvent, User, UserId,
};
use chrono::{DateTime, Utc};

use crate::error::{EconomyError, EconomyResult};
use crate::leveling::{apply_experience_delta, LevelUp};

/// The escrow ledger.
#[derive(Clone, Debug)]
pub struct EscrowLedger {
    /// Participants by id.
    users: BTreeMap<UserId, User>,
    /// Invitations in creation order.
    invitations: Vec<BattleInvitation>,
    /// Battles in creation order.
    battles: Vec<Battle>,
    /// Invitation lifetime.
    invitation_ttl_secs: i64,
    /// Next invitation id.
    next_invitation_id: InvitationId,
    /// Next battle id.
    next_battle_id: BattleId,
    /// Outbox drained by the engine every tick.
    events: Vec<LedgerEvent>,
}

impl EscrowLedger {
    /// Creates a ledger for a fresh session.
    #[must_use]
    pub fn new(users: impl IntoIterator<Item = User>, invitation_ttl_secs: i64) -> Self {
        Self::restore(users, Vec::new(), Vec::new(), invitation_ttl_secs)
    }

    /// Rebuilds a ledger from persisted records.
    ///
    /// Id counters resume after the highest persisted id.
    #[must_use]
    pub fn restore(
        users: impl IntoIterator<Item = User>,
        invitations: Vec<BattleInvitation>,
        battles: Vec<Battle>,
        invitation_ttl_secs: i64,
    ) -> Self {
        let next_invitation_id = invitations.iter().map(|i| i.id).max().map_or(1, |id| id + 1);
        let next_battle_id = battles.iter().map(|b| b.id).max().map_or(1, |id| id + 1);

        Self {
            users: users.into_iter().map(|u| (u.id, u)).collect(),
            invitations,
            battles,
            invitation_ttl_secs,
            next_invitation_id,
            next_battle_id,
            events: Vec::with_capacity(64),
        }
    }

    // ========================================================================
    // Participants
    // ========================================================================

    /// Registers a participant. Returns false if the id is already taken.
    pub fn register_user(&mut self, user: User) -> bool {
        if self.users.contains_key(&user.id) {
            return false;
        }
        self.users.insert(user.id, user);
        true
    }

    /// Looks up a participant.
    #[must_use]
    pub fn user(&self, user_id: UserId) -> Option<&User> {
        self.users.get(&user_id)
    }

    /// All participants ordered by id.
    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    /// Current balance of a participant.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::UserNotFound` for unknown ids.
    pub fn balance(&self, user_id: UserId) -> EconomyResult<u64> {
        self.users
            .get(&user_id)
            .map(|u| u.balance)
            .ok_or(EconomyError::UserNotFound(user_id))
    }

    /// Sum of all balances.
    #[must_use]
    pub fn total_balance(&self) -> u64 {
        self.users.values().map(|u| u.balance).sum()
    }

    /// Sets the presence flag. Not a balance mutation.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::UserNotFound` for unknown ids.
    pub fn set_online(&mut self, user_id: UserId, online: bool) -> EconomyResult<()> {
        self.user_mut(user_id)?.online = online;
        Ok(())
    }

    fn user_mut(&mut self, user_id: UserId) -> EconomyResult<&mut User> {
        self.users
            .get_mut(&user_id)
            .ok_or(EconomyError::UserNotFound(user_id))
    }

    // ========================================================================
    // Credits & Experience
    // ========================================================================

    /// Credits coins (rewards, claimed prizes). Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::UserNotFound` for unknown ids.
    pub fn credit(&mut self, user_id: UserId, amount: u64) -> EconomyResult<u64> {
        let user = self.user_mut(user_id)?;
        user.balance = user.balance.saturating_add(amount);
        let balance = user.balance;
        if amount > 0 {
            self.events.push(LedgerEvent::Credited { user_id, amount });
        }
        tracing::debug!(user_id, amount, balance, "credited");
        Ok(balance)
    }

    /// Debits coins, flooring at zero. Returns the amount actually removed.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::UserNotFound` for unknown ids.
    pub fn debit(&mut self, user_id: UserId, amount: u64) -> EconomyResult<u64> {
        let user = self.user_mut(user_id)?;
        let removed = amount.min(user.balance);
        user.balance -= removed;
        tracing::debug!(user_id, amount, removed, balance = user.balance, "debited");
        Ok(removed)
    }

    /// Applies an experience change and credits any level-up bonus in the
    /// same step.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::UserNotFound` for unknown ids.
    pub fn grant_experience(&mut self, user_id: UserId, delta: i64) -> EconomyResult<Option<LevelUp>> {
        let user = self.user_mut(user_id)?;
        let level_up = apply_experience_delta(user, delta);

        if let Some(up) = level_up {
            user.balance = user.balance.saturating_add(up.bonus_coins);
            tracing::info!(
                user_id,
                old_level = up.old_level,
                new_level = up.new_level,
                bonus = up.bonus_coins,
                "level up"
            );
            self.events.push(LedgerEvent::LevelUp {
                user_id,
                old_level: up.old_level,
                new_level: up.new_level,
                bonus_coins: up.bonus_coins,
            });
        }

        Ok(level_up)
    }

    // ========================================================================
    // Invitations
    // ========================================================================

    /// All invitations in creation order.
    #[must_use]
    pub fn invitations(&self) -> &[BattleInvitation] {
        &self.invitations
    }

    /// Looks up an invitation.
    #[must_use]
    pub fn invitation(&self, invitation_id: InvitationId) -> Option<&BattleInvitation> {
        self.invitations.iter().find(|i| i.id == invitation_id)
    }

    /// Expires every pending invitation whose TTL has elapsed.
    ///
    /// Returns the number of invitations expired.
    pub fn expire_stale(&mut self, now: DateTime<Utc>) -> usize {
        let mut expired = 0;
        for invitation in &mut self.invitations {
            if invitation.is_overdue(now) {
                invitation.status = InvitationStatus::Expired;
                self.events.push(LedgerEvent::InvitationExpired {
                    invitation_id: invitation.id,
                });
                tracing::debug!(invitation_id = invitation.id, "invitation expired");
                expired += 1;
            }
        }
        expired
    }

    /// Offers a wager from `challenger_id` to `opponent_id`.
    ///
    /// # Errors
    ///
    /// - `InvalidStake` for a zero stake
    /// - `InvalidState` when both sides are the same participant
    /// - `UserNotFound` for unknown participants
    /// - `InsufficientFunds` when either balance is below the stake
    pub fn create_invitation(
        &mut self,
        challenger_id: UserId,
        opponent_id: UserId,
        stake: u64,
        now: DateTime<Utc>,
    ) -> EconomyResult<InvitationId> {
        if stake == 0 {
            return Err(EconomyError::InvalidStake(stake));
        }
        if challenger_id == opponent_id {
            return Err(EconomyError::InvalidState(
                "a participant cannot challenge themselves".to_string(),
            ));
        }
        self.expire_stale(now);

        let challenger_name = self.user_mut(challenger_id)?.name.clone();
        let opponent_name = self.user_mut(opponent_id)?.name.clone();
        self.require_funds(challenger_id, opponent_id, stake)?;

        let id = self.next_invitation_id;
        self.next_invitation_id += 1;

        self.invitations.push(BattleInvitation {
            id,
            challenger_id,
            challenger_name,
            opponent_id,
            opponent_name,
            stake,
            status: InvitationStatus::Pending,
            created_at: now,
            expires_at: BattleInvitation::expiry_for(now, self.invitation_ttl_secs),
        });
        self.events.push(LedgerEvent::InvitationCreated {
            invitation_id: id,
            challenger_id,
            opponent_id,
            stake,
        });
        tracing::info!(invitation_id = id, challenger_id, opponent_id, stake, "invitation created");

        Ok(id)
    }

    /// Accepts a pending invitation and starts the battle.
    ///
    /// # Errors
    ///
    /// - `InvitationNotFound` when absent, expired, or already answered
    /// - `InsufficientFunds` when a side can no longer cover the stake; the
    ///   invitation is declined in that case
    pub fn accept_invitation(&mut self, invitation_id: InvitationId, now: DateTime<Utc>) -> EconomyResult<BattleId> {
        self.expire_stale(now);
        let index = self.pending_index(invitation_id)?;
        let invitation = self.invitations[index].clone();

        if let Err(err) = self.require_funds(invitation.challenger_id, invitation.opponent_id, invitation.stake) {
            self.invitations[index].status = InvitationStatus::Declined;
            self.events.push(LedgerEvent::InvitationDeclined {
                invitation_id,
                reason: DeclineReason::InsufficientFunds,
            });
            tracing::warn!(invitation_id, shortfall = err.shortfall(), "accept failed balance check, declined");
            return Err(err);
        }

        let battle_id = self.next_battle_id;
        self.next_battle_id += 1;

        self.battles.push(Battle {
            id: battle_id,
            invitation_id,
            challenger_id: invitation.challenger_id,
            challenger_name: invitation.challenger_name,
            opponent_id: invitation.opponent_id,
            opponent_name: invitation.opponent_name,
            stake: invitation.stake,
            status: BattleStatus::Active,
            started_at: now,
            completed_at: None,
            winner_id: None,
            loser_id: None,
            winner_name: None,
            loser_name: None,
        });
        self.invitations[index].status = InvitationStatus::Accepted;
        self.events.push(LedgerEvent::InvitationAccepted {
            invitation_id,
            battle_id,
        });
        tracing::info!(invitation_id, battle_id, "invitation accepted");

        Ok(battle_id)
    }

    /// Declines a pending invitation. No balance effect.
    ///
    /// # Errors
    ///
    /// Returns `InvitationNotFound` when absent, expired, or already answered.
    pub fn decline_invitation(&mut self, invitation_id: InvitationId, now: DateTime<Utc>) -> EconomyResult<()> {
        self.expire_stale(now);
        let index = self.pending_index(invitation_id)?;
        self.invitations[index].status = InvitationStatus::Declined;
        self.events.push(LedgerEvent::InvitationDeclined {
            invitation_id,
            reason: DeclineReason::Refused,
        });
        tracing::info!(invitation_id, "invitation declined");
        Ok(())
    }

    fn pending_index(&self, invitation_id: InvitationId) -> EconomyResult<usize> {
        self.invitations
            .iter()
            .position(|i| i.id == invitation_id && i.status == InvitationStatus::Pending)
            .ok_or(EconomyError::InvitationNotFound(invitation_id))
    }

    /// Checks both sides of a wager. Records `FundsRejected` on failure.
    fn require_funds(&mut self, challenger_id: UserId, opponent_id: UserId, stake: u64) -> EconomyResult<()> {
        for user_id in [challenger_id, opponent_id] {
            let available = self.balance(user_id)?;
            if available < stake {
                self.events.push(LedgerEvent::FundsRejected {
                    user_id,
                    challenger_id,
                    opponent_id,
                    required: stake,
                    available,
                });
                return Err(EconomyError::InsufficientFunds {
                    user_id,
                    required: stake,
                    available,
                });
            }
        }
        Ok(())
    }

    // ========================================================================
    // Battles
    // ========================================================================

    /// All battles in creation order.
    #[must_use]
    pub fn battles(&self) -> &[Battle] {
        &self.battles
    }

    /// Looks up a battle.
    #[must_use]
    pub fn battle(&self, battle_id: BattleId) -> Option<&Battle> {
        self.battles.iter().find(|b| b.id == battle_id)
    }

    /// Settles an active battle: `+stake` to the winner, `−stake` (floored at
    /// zero) from the loser.
    ///
    /// Returns the amount actually debited from the loser.
    ///
    /// # Errors
    ///
    /// - `BattleNotFound` for unknown ids
    /// - `InvalidState` when the battle is not active or `winner_id` did not
    ///   fight in it
    /// - `UserNotFound` when a participant is no longer registered
    pub fn complete_battle(&mut self, battle_id: BattleId, winner_id: UserId, now: DateTime<Utc>) -> EconomyResult<u64> {
        let index = self
            .battles
            .iter()
            .position(|b| b.id == battle_id)
            .ok_or(EconomyError::BattleNotFound(battle_id))?;

        let battle = &self.battles[index];
        if battle.status != BattleStatus::Active {
            return Err(EconomyError::InvalidState(format!(
                "battle {battle_id} is {}",
                battle.status.as_str()
            )));
        }
        let loser_id = battle.other_participant(winner_id).ok_or_else(|| {
            EconomyError::InvalidState(format!("user {winner_id} did not fight in battle {battle_id}"))
        })?;
        let stake = battle.stake;

        // Validate both sides before touching either balance.
        self.balance(winner_id)?;
        self.balance(loser_id)?;

        self.credit_unlogged(winner_id, stake)?;
        let debited = self.debit(loser_id, stake)?;

        let battle = &mut self.battles[index];
        battle.status = BattleStatus::Completed;
        battle.completed_at = Some(now);
        battle.winner_id = Some(winner_id);
        battle.loser_id = Some(loser_id);
        battle.winner_name = battle.name_of(winner_id).map(str::to_owned);
        battle.loser_name = battle.name_of(loser_id).map(str::to_owned);

        self.events.push(LedgerEvent::BattleCompleted {
            battle_id,
            winner_id,
            loser_id,
            stake,
            debited,
        });
        tracing::info!(battle_id, winner_id, loser_id, stake, debited, "battle completed");

        Ok(debited)
    }

    fn credit_unlogged(&mut self, user_id: UserId, amount: u64) -> EconomyResult<()> {
        let user = self.user_mut(user_id)?;
        user.balance = user.balance.saturating_add(amount);
        Ok(())
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Drains the outbox.
    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Events waiting in the outbox.
    #[must_use]
    pub fn pending_event_count(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const SELF_ID: UserId = 1;
    const RIVAL_ID: UserId = 2;

    fn t0() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn ledger(self_balance: u64, rival_balance: u64) -> EscrowLedger {
        EscrowLedger::new(
            [
                User::new(SELF_ID, "me", self_balance),
                User::new(RIVAL_ID, "rival", rival_balance),
            ],
            3600,
        )
    }

    #[test]
    fn test_invitation_rejected_when_stake_exceeds_balance() {
        let mut ledger = ledger(1000, 5000);
        let err = ledger.create_invitation(SELF_ID, RIVAL_ID, 1500, t0()).unwrap_err();

        assert_eq!(
            err,
            EconomyError::InsufficientFunds {
                user_id: SELF_ID,
                required: 1500,
                available: 1000
            }
        );
        assert!(ledger.invitations().is_empty());
        assert_eq!(ledger.balance(SELF_ID).unwrap(), 1000);
        assert!(matches!(
            ledger.drain_events().as_slice(),
            [LedgerEvent::FundsRejected { required: 1500, available: 1000, .. }]
        ));
    }

    #[test]
    fn test_opponent_balance_is_checked_too() {
        let mut ledger = ledger(1000, 10);
        let err = ledger.create_invitation(SELF_ID, RIVAL_ID, 100, t0()).unwrap_err();
        assert_eq!(err.shortfall(), 90);
    }

    #[test]
    fn test_invalid_invitations() {
        let mut ledger = ledger(1000, 1000);
        assert_eq!(
            ledger.create_invitation(SELF_ID, RIVAL_ID, 0, t0()),
            Err(EconomyError::InvalidStake(0))
        );
        assert!(matches!(
            ledger.create_invitation(SELF_ID, SELF_ID, 10, t0()),
            Err(EconomyError::InvalidState(_))
        ));
        assert_eq!(
            ledger.create_invitation(SELF_ID, 99, 10, t0()),
            Err(EconomyError::UserNotFound(99))
        );
    }

    #[test]
    fn test_full_battle_transfers_stake() {
        let mut ledger = ledger(500, 500);
        let invitation = ledger.create_invitation(SELF_ID, RIVAL_ID, 150, t0()).unwrap();
        let battle = ledger.accept_invitation(invitation, t0()).unwrap();
        let debited = ledger.complete_battle(battle, RIVAL_ID, t0()).unwrap();

        assert_eq!(debited, 150);
        assert_eq!(ledger.balance(RIVAL_ID).unwrap(), 650);
        assert_eq!(ledger.balance(SELF_ID).unwrap(), 350);

        let battle = ledger.battle(battle).unwrap();
        assert_eq!(battle.status, BattleStatus::Completed);
        assert_eq!(battle.winner_name.as_deref(), Some("rival"));
        assert_eq!(battle.loser_name.as_deref(), Some("me"));
        assert_eq!(battle.completed_at, Some(t0()));
        assert_eq!(
            ledger.invitation(invitation).unwrap().status,
            InvitationStatus::Accepted
        );
    }

    #[test]
    fn test_battle_completes_once() {
        let mut ledger = ledger(500, 500);
        let invitation = ledger.create_invitation(SELF_ID, RIVAL_ID, 100, t0()).unwrap();
        let battle = ledger.accept_invitation(invitation, t0()).unwrap();
        ledger.complete_battle(battle, SELF_ID, t0()).unwrap();

        assert!(matches!(
            ledger.complete_battle(battle, SELF_ID, t0()),
            Err(EconomyError::InvalidState(_))
        ));
        assert_eq!(ledger.balance(SELF_ID).unwrap(), 600);
        assert_eq!(ledger.balance(RIVAL_ID).unwrap(), 400);
    }

    #[test]
    fn test_winner_must_be_participant() {
        let mut ledger = ledger(500, 500);
        ledger.register_user(User::new(3, "bystander", 0));
        let invitation = ledger.create_invitation(SELF_ID, RIVAL_ID, 100, t0()).unwrap();
        let battle = ledger.accept_invitation(invitation, t0()).unwrap();

        assert!(matches!(
            ledger.complete_battle(battle, 3, t0()),
            Err(EconomyError::InvalidState(_))
        ));
        assert_eq!(ledger.complete_battle(42, SELF_ID, t0()), Err(EconomyError::BattleNotFound(42)));
        assert_eq!(ledger.total_balance(), 1000);
    }

    #[test]
    fn test_accept_rechecks_funds_and_declines() {
        let mut ledger = ledger(500, 500);
        let invitation = ledger.create_invitation(SELF_ID, RIVAL_ID, 300, t0()).unwrap();

        // Challenger spends the stake before the opponent answers.
        ledger.debit(SELF_ID, 400).unwrap();
        ledger.drain_events();

        let err = ledger.accept_invitation(invitation, t0()).unwrap_err();
        assert_eq!(err.shortfall(), 200);
        assert_eq!(
            ledger.invitation(invitation).unwrap().status,
            InvitationStatus::Declined
        );
        assert!(ledger.battles().is_empty());
        assert_eq!(ledger.balance(SELF_ID).unwrap(), 100);

        let events = ledger.drain_events();
        assert!(events.contains(&LedgerEvent::InvitationDeclined {
            invitation_id: invitation,
            reason: DeclineReason::InsufficientFunds,
        }));

        // Terminal: cannot be accepted again.
        assert_eq!(
            ledger.accept_invitation(invitation, t0()),
            Err(EconomyError::InvitationNotFound(invitation))
        );
    }

    #[test]
    fn test_invitation_expires_lazily() {
        let mut ledger = ledger(500, 500);
        let invitation = ledger.create_invitation(SELF_ID, RIVAL_ID, 100, t0()).unwrap();
        let later = t0() + Duration::seconds(3600);

        assert_eq!(
            ledger.invitation(invitation).unwrap().status,
            InvitationStatus::Pending,
            "expiry is applied on the next operation, not by a timer"
        );
        assert_eq!(
            ledger.accept_invitation(invitation, later),
            Err(EconomyError::InvitationNotFound(invitation))
        );
        assert_eq!(
            ledger.invitation(invitation).unwrap().status,
            InvitationStatus::Expired
        );
        assert_eq!(ledger.expire_stale(later + Duration::seconds(1)), 0);
    }

    #[test]
    fn test_decline_has_no_balance_effect() {
        let mut ledger = ledger(500, 500);
        let invitation = ledger.create_invitation(SELF_ID, RIVAL_ID, 100, t0()).unwrap();
        ledger.decline_invitation(invitation, t0()).unwrap();

        assert_eq!(ledger.total_balance(), 1000);
        assert_eq!(
            ledger.decline_invitation(invitation, t0()),
            Err(EconomyError::InvitationNotFound(invitation))
        );
    }

    #[test]
    fn test_loser_debit_is_floored() {
        let mut ledger = ledger(500, 500);
        let invitation = ledger.create_invitation(SELF_ID, RIVAL_ID, 300, t0()).unwrap();
        let battle = ledger.accept_invitation(invitation, t0()).unwrap();
        ledger.debit(SELF_ID, 450).unwrap();

        let debited = ledger.complete_battle(battle, RIVAL_ID, t0()).unwrap();
        assert_eq!(debited, 50);
        assert_eq!(ledger.balance(SELF_ID).unwrap(), 0);
        assert_eq!(ledger.balance(RIVAL_ID).unwrap(), 800);
    }

    #[test]
    fn test_grant_experience_credits_bonus_atomically() {
        let mut ledger = ledger(0, 0);
        let level_up = ledger.grant_experience(SELF_ID, 250).unwrap().unwrap();

        assert_eq!(level_up.bonus_coins, 100);
        let user = ledger.user(SELF_ID).unwrap();
        assert_eq!(user.level, 2);
        assert_eq!(user.balance, 100);
        assert_eq!(
            ledger.drain_events(),
            vec![LedgerEvent::LevelUp {
                user_id: SELF_ID,
                old_level: 1,
                new_level: 2,
                bonus_coins: 100
            }]
        );
    }

    #[test]
    fn test_restore_resumes_ids() {
        let mut first = ledger(500, 500);
        let invitation = first.create_invitation(SELF_ID, RIVAL_ID, 100, t0()).unwrap();
        let battle = first.accept_invitation(invitation, t0()).unwrap();

        let users: Vec<User> = first.users().cloned().collect();
        let mut restored = EscrowLedger::restore(
            users,
            first.invitations().to_vec(),
            first.battles().to_vec(),
            3600,
        );
        let next = restored.create_invitation(SELF_ID, RIVAL_ID, 100, t0()).unwrap();
        assert!(next > invitation);
        assert!(restored.battle(battle).is_some());
    }
}
