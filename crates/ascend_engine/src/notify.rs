//! # Notification Deriver
//!
//! Turns snapshot diffs and ledger events into user-facing notifications,
//! always from the self user's point of view.
//!
//! ## Exactly-Once Rewards
//!
//! The differ reports a transition on one tick only, and this module is the
//! only place that pays for one:
//!
//! | trigger                         | notification         | ledger effect                          |
//! |---------------------------------|----------------------|----------------------------------------|
//! | achievement `unlocked` → true   | `AchievementUnlocked`| credit coins, grant experience         |
//! | task `completed` → true         | `TaskCompleted`      | credit coins, grant experience         |
//! | either, created already done    | as above             | as above                               |
//! | battle `status` → completed     | `BattleWon`/`Lost`   | winner: grant `battle_win_experience`  |
//! | battle created already complete | as above             | as above                               |
//! | invitation created / answered   | `Challenge*`         | none                                   |
//! | `LedgerEvent::LevelUp` (self)   | `LevelUp`            | none (bonus already credited)          |
//! | `LedgerEvent::FundsRejected`    | `InsufficientFunds`  | none                                   |

use ascend_economy::EscrowLedger;
use ascend_shared::{
    Achievement, BattleStatus, InvitationStatus, LedgerEvent, Notification, NotificationId,
    NotificationKind, NotificationPayload, Priority, ProgressId, Task, UserId,
};
use chrono::{DateTime, Utc};
use rand::Rng;

use crate::differ::{DeltaKind, DiffEvent, ACHIEVEMENTS, BATTLES, INVITATIONS, TASKS};

const MOTIVATION_MESSAGES: [&str; 5] = [
    "Small steps every day add up. Pick one task and finish it.",
    "Your next level is closer than it looks.",
    "A challenge sent is a challenge half won.",
    "Streaks are built one day at a time.",
    "Check your cases, something may be waiting to be opened.",
];

/// Title and priority for each kind.
#[must_use]
pub const fn presentation(kind: NotificationKind) -> (&'static str, Priority) {
    match kind {
        NotificationKind::AchievementUnlocked => ("Achievement unlocked", Priority::High),
        NotificationKind::TaskCompleted => ("Task completed", Priority::Normal),
        NotificationKind::ChallengeReceived => ("New challenge", Priority::High),
        NotificationKind::ChallengeSent => ("Challenge sent", Priority::Low),
        NotificationKind::ChallengeAccepted => ("Challenge accepted", Priority::Normal),
        NotificationKind::ChallengeDeclined => ("Challenge declined", Priority::Normal),
        NotificationKind::ChallengeExpired => ("Challenge expired", Priority::Low),
        NotificationKind::BattleWon => ("Victory", Priority::High),
        NotificationKind::BattleLost => ("Defeat", Priority::Normal),
        NotificationKind::LevelUp => ("Level up", Priority::High),
        NotificationKind::InsufficientFunds => ("Insufficient funds", Priority::High),
        NotificationKind::Motivation => ("Keep going", Priority::Low),
    }
}

/// Read-only state the deriver needs to describe diff events.
#[derive(Clone, Copy, Debug)]
pub struct DeriveContext<'a> {
    /// Current achievements.
    pub achievements: &'a [Achievement],
    /// Current tasks.
    pub tasks: &'a [Task],
}

/// Maps diffs and ledger events to notifications.
#[derive(Debug)]
pub struct NotificationDeriver {
    self_id: UserId,
    battle_win_experience: u64,
    next_id: NotificationId,
}

impl NotificationDeriver {
    /// Creates a deriver for `self_id`. Ids start at `next_id`.
    #[must_use]
    pub const fn new(self_id: UserId, battle_win_experience: u64, next_id: NotificationId) -> Self {
        Self {
            self_id,
            battle_win_experience,
            next_id,
        }
    }

    fn build(
        &mut self,
        kind: NotificationKind,
        message: String,
        payload: Option<NotificationPayload>,
        now: DateTime<Utc>,
    ) -> Notification {
        let (title, priority) = presentation(kind);
        let id = self.next_id;
        self.next_id += 1;
        Notification {
            id,
            kind,
            title: title.to_string(),
            message,
            priority,
            timestamp: now,
            read: false,
            payload,
        }
    }

    // ========================================================================
    // Diff Events
    // ========================================================================

    /// Maps diff events, paying rewards through `ledger`.
    pub fn derive_from_diff(
        &mut self,
        events: &[DiffEvent],
        context: DeriveContext<'_>,
        ledger: &mut EscrowLedger,
        now: DateTime<Utc>,
    ) -> Vec<Notification> {
        let mut out = Vec::new();
        for event in events {
            let derived = match event.collection {
                ACHIEVEMENTS => context
                    .achievements
                    .iter()
                    .find(|a| a.id == event.id && a.unlocked && event.is_completion("unlocked"))
                    .map(|a| {
                        self.reward(
                            NotificationKind::AchievementUnlocked,
                            a.id,
                            &a.title,
                            a.reward_coins,
                            a.reward_experience,
                            ledger,
                            now,
                        )
                    }),
                TASKS => context
                    .tasks
                    .iter()
                    .find(|t| t.id == event.id && t.completed && event.is_completion("completed"))
                    .map(|t| {
                        self.reward(
                            NotificationKind::TaskCompleted,
                            t.id,
                            &t.title,
                            t.reward_coins,
                            t.reward_experience,
                            ledger,
                            now,
                        )
                    }),
                INVITATIONS => {
                    out.extend(self.invitation(event, ledger, now));
                    None
                }
                BATTLES if event.reaches("status", "completed") => self.battle(event.id, ledger, now),
                _ => None,
            };
            out.extend(derived);
        }
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn reward(
        &mut self,
        kind: NotificationKind,
        source_id: ProgressId,
        title: &str,
        coins: u64,
        experience: u64,
        ledger: &mut EscrowLedger,
        now: DateTime<Utc>,
    ) -> Notification {
        self.pay(coins, experience, ledger);

        let mut message = format!("\"{title}\"");
        if coins > 0 {
            message.push_str(&format!(" +{coins} coins"));
        }
        if experience > 0 {
            message.push_str(&format!(" +{experience} XP"));
        }
        tracing::info!(?kind, source_id, coins, experience, "reward paid");

        self.build(
            kind,
            message,
            Some(NotificationPayload::Reward {
                source_id,
                coins,
                experience,
            }),
            now,
        )
    }

    fn pay(&self, coins: u64, experience: u64, ledger: &mut EscrowLedger) {
        if coins > 0 {
            if let Err(err) = ledger.credit(self.self_id, coins) {
                tracing::warn!(error = %err, coins, "reward credit failed");
            }
        }
        if experience > 0 {
            let delta = i64::try_from(experience).unwrap_or(i64::MAX);
            if let Err(err) = ledger.grant_experience(self.self_id, delta) {
                tracing::warn!(error = %err, experience, "experience grant failed");
            }
        }
    }

    /// An invitation first seen already answered yields its creation and
    /// its outcome together.
    fn invitation(&mut self, event: &DiffEvent, ledger: &EscrowLedger, now: DateTime<Utc>) -> Vec<Notification> {
        let Some(invitation) = ledger.invitation(event.id) else {
            return Vec::new();
        };
        if !invitation.involves(self.self_id) {
            return Vec::new();
        }
        let incoming = invitation.opponent_id == self.self_id;
        let (counterpart_id, counterpart) = if incoming {
            (invitation.challenger_id, invitation.challenger_name.as_str())
        } else {
            (invitation.opponent_id, invitation.opponent_name.as_str())
        };
        let stake = invitation.stake;

        let mut derived = Vec::with_capacity(2);
        if event.kind == DeltaKind::Created {
            derived.push(if incoming {
                (
                    NotificationKind::ChallengeReceived,
                    format!("{counterpart} challenged you for {stake} coins"),
                )
            } else {
                (
                    NotificationKind::ChallengeSent,
                    format!("You challenged {counterpart} for {stake} coins"),
                )
            });
        }
        match invitation.status {
            InvitationStatus::Accepted => derived.push((
                NotificationKind::ChallengeAccepted,
                format!("Battle with {counterpart} for {stake} coins has started"),
            )),
            InvitationStatus::Declined => derived.push((
                NotificationKind::ChallengeDeclined,
                format!("Challenge with {counterpart} for {stake} coins was declined"),
            )),
            InvitationStatus::Expired => derived.push((
                NotificationKind::ChallengeExpired,
                format!("Challenge with {counterpart} expired"),
            )),
            InvitationStatus::Pending => {}
        }

        let payload = NotificationPayload::Invitation {
            invitation_id: invitation.id,
            counterpart_id,
            stake,
        };
        derived
            .into_iter()
            .map(|(kind, message)| self.build(kind, message, Some(payload.clone()), now))
            .collect()
    }

    fn battle(&mut self, battle_id: u64, ledger: &mut EscrowLedger, now: DateTime<Utc>) -> Option<Notification> {
        let battle = ledger.battle(battle_id)?.clone();
        if battle.status != BattleStatus::Completed {
            return None;
        }
        let won = battle.winner_id == Some(self.self_id);
        let lost = battle.loser_id == Some(self.self_id);
        if !won && !lost {
            return None;
        }
        let counterpart_id = battle.other_participant(self.self_id)?;
        let counterpart = battle.name_of(counterpart_id).unwrap_or_default();
        let stake = battle.stake;

        let (kind, message) = if won {
            self.pay(0, self.battle_win_experience, ledger);
            (
                NotificationKind::BattleWon,
                format!(
                    "You beat {counterpart}: +{stake} coins, +{} XP",
                    self.battle_win_experience
                ),
            )
        } else {
            (
                NotificationKind::BattleLost,
                format!("{counterpart} won the battle: -{stake} coins"),
            )
        };

        Some(self.build(
            kind,
            message,
            Some(NotificationPayload::Battle {
                battle_id,
                counterpart_id,
                stake,
            }),
            now,
        ))
    }

    // ========================================================================
    // Ledger Events
    // ========================================================================

    /// Maps drained ledger events.
    pub fn derive_from_ledger(&mut self, events: &[LedgerEvent], now: DateTime<Utc>) -> Vec<Notification> {
        let mut out = Vec::new();
        for event in events {
            match *event {
                LedgerEvent::LevelUp {
                    user_id,
                    old_level,
                    new_level,
                    bonus_coins,
                } if user_id == self.self_id => {
                    out.push(self.build(
                        NotificationKind::LevelUp,
                        format!("You reached level {new_level}! +{bonus_coins} coins"),
                        Some(NotificationPayload::Level {
                            old_level,
                            new_level,
                            bonus_coins,
                        }),
                        now,
                    ));
                }
                LedgerEvent::FundsRejected {
                    user_id,
                    challenger_id,
                    opponent_id,
                    required,
                    available,
                } if challenger_id == self.self_id || opponent_id == self.self_id => {
                    let whose = if user_id == self.self_id { "You need" } else { "Your opponent needs" };
                    out.push(self.build(
                        NotificationKind::InsufficientFunds,
                        format!(
                            "{whose} {required} coins, {available} available ({} short)",
                            required - available
                        ),
                        Some(NotificationPayload::Shortfall {
                            user_id,
                            required,
                            available,
                        }),
                        now,
                    ));
                }
                _ => {}
            }
        }
        out
    }

    /// A motivational message picked with `rng`.
    pub fn motivation<R: Rng + ?Sized>(&mut self, rng: &mut R, now: DateTime<Utc>) -> Notification {
        let message = MOTIVATION_MESSAGES[rng.gen_range(0..MOTIVATION_MESSAGES.len())];
        self.build(NotificationKind::Motivation, message.to_string(), None, now)
    }
}

// ============================================================================
// Feed
// ============================================================================

/// Most-recent-first notification list with a retention cap.
#[derive(Clone, Debug)]
pub struct NotificationFeed {
    items: Vec<Notification>,
    cap: usize,
}

impl NotificationFeed {
    /// Creates an empty feed.
    #[must_use]
    pub const fn new(cap: usize) -> Self {
        Self {
            items: Vec::new(),
            cap,
        }
    }

    /// Rebuilds a feed from persisted records, newest first.
    #[must_use]
    pub fn restore(mut items: Vec<Notification>, cap: usize) -> Self {
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        items.truncate(cap);
        Self { items, cap }
    }

    /// Adds notifications produced in one step. Within the batch the last
    /// one ends up first.
    pub fn push_all(&mut self, batch: impl IntoIterator<Item = Notification>) -> usize {
        let mut added = 0;
        for notification in batch {
            self.items.insert(0, notification);
            added += 1;
        }
        self.items.truncate(self.cap);
        added
    }

    /// Notifications, newest first.
    #[must_use]
    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    pub(crate) fn records_mut(&mut self) -> &mut Vec<Notification> {
        &mut self.items
    }

    /// Marks one notification read. Returns false if unknown or already read.
    pub fn mark_read(&mut self, id: NotificationId) -> bool {
        match self.items.iter_mut().find(|n| n.id == id) {
            Some(n) if !n.read => {
                n.read = true;
                true
            }
            _ => false,
        }
    }

    /// Marks everything read. Returns the number changed.
    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for n in self.items.iter_mut().filter(|n| !n.read) {
            n.read = true;
            changed += 1;
        }
        changed
    }

    /// Unread notifications.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.read).count()
    }

    /// Number of notifications held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Id after the highest held id.
    #[must_use]
    pub fn next_id(&self) -> NotificationId {
        self.items.iter().map(|n| n.id).max().map_or(1, |id| id + 1)
    }
}
