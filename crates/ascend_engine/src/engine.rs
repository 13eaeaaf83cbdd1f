//! # Session Engine
//!
//! **One owned value per session.** The engine holds the ledger, catalog,
//! progress lists, notification feed and persistence, and advances them in
//! synchronous `&mut self` steps. There are no globals and no timers.
//!
//! ## Tick Order
//!
//! ```text
//! tick(now)
//!   1. ledger.expire_stale(now)
//!   2. differ.diff(achievements | tasks | invitations | battles)
//!   3. deriver.derive_from_diff   ──► rewards credited through the ledger
//!   4. ledger.drain_events        ──► LevelUp / FundsRejected notifications
//!   5. scheduler.due(now)         ──► Flush, Motivation
//! ```
//!
//! User actions (completing a task, accepting a challenge, claiming a prize)
//! only change state. Their notifications and rewards appear on the next
//! tick, exactly once.

use std::collections::HashSet;

use ascend_economy::{
    cumulative_experience, level_of, EconomyError, EscrowLedger, LevelProgress, LevelUp, Spin,
    SpinState, WeightedTable,
};
use ascend_shared::constants::{FLAG_DATA_RESET, FLAG_PRIZE_TAGS};
use ascend_shared::{
    Achievement, Battle, BattleId, BattleInvitation, ClaimedItem, ContainerId, InvitationId,
    Notification, NotificationId, OwnedContainer, OwnedContainerId, Prize, PrizeKind, ProgressId,
    RewardContainer, Task, User, UserId,
};
use chrono::Duration;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::differ::{SnapshotDiffer, ACHIEVEMENTS, BATTLES, INVITATIONS, TASKS};
use crate::error::{EngineError, EngineResult};
use crate::migration::{migrate_legacy_prizes, reset_user_data};
use crate::notify::{DeriveContext, NotificationDeriver, NotificationFeed};
use crate::scheduler::{DelayQueue, ScheduledTask};
use crate::store::{KeyValueStore, MemoryStore};
use crate::sync::{catalog_values, SaveOutcome, StorageLayout, StoreSynchronizer, NO_CATALOG};

// ============================================================================
// Session Types
// ============================================================================

/// Initial state used when the store holds nothing.
#[derive(Clone, Debug)]
pub struct SessionSeed {
    /// The user this session belongs to.
    pub self_user: User,
    /// Everyone else who can be challenged.
    pub opponents: Vec<User>,
    /// Canonical container catalog.
    pub catalog: Vec<RewardContainer>,
    /// Achievement definitions.
    pub achievements: Vec<Achievement>,
    /// Starting tasks.
    pub tasks: Vec<Task>,
}

/// Persisted shape of `personalBattles`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalBattles {
    /// Invitations in creation order.
    #[serde(default)]
    pub invitations: Vec<BattleInvitation>,
    /// Battles in creation order.
    #[serde(default)]
    pub battles: Vec<Battle>,
}

/// State slices tracked for flushing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Slice {
    /// `cases`
    Cases,
    /// `userCases`
    UserCases,
    /// `notifications`
    Notifications,
    /// `users`
    Users,
    /// `personalBattles`
    PersonalBattles,
    /// `achievements`
    Achievements,
    /// `tasks`
    Tasks,
    /// `items`
    Items,
}

/// What one tick did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Invitations expired in step 1.
    pub expired: usize,
    /// Notifications added to the feed.
    pub notifications: usize,
    /// Flush results, if a flush ran.
    pub flushed: Vec<(&'static str, SaveOutcome)>,
}

/// A claimed prize.
#[derive(Clone, Debug, PartialEq)]
pub struct OpenedPrize {
    /// Owned container that was opened and removed.
    pub owned_id: OwnedContainerId,
    /// Catalog entry it came from.
    pub container_id: ContainerId,
    /// The prize applied.
    pub prize: Prize,
    /// Level change caused by an experience prize.
    pub level_up: Option<LevelUp>,
}

// ============================================================================
// Engine
// ============================================================================

/// The session engine.
pub struct Engine<S, C> {
    config: EngineConfig,
    clock: C,
    rng: ChaCha8Rng,
    layout: StorageLayout,
    sync: StoreSynchronizer<S>,
    ledger: EscrowLedger,
    self_id: UserId,
    catalog: Vec<RewardContainer>,
    container_table: Option<WeightedTable<ContainerId>>,
    owned: Vec<OwnedContainer>,
    next_owned_id: OwnedContainerId,
    items: Vec<ClaimedItem>,
    achievements: Vec<Achievement>,
    tasks: Vec<Task>,
    differ: SnapshotDiffer,
    deriver: NotificationDeriver,
    feed: NotificationFeed,
    scheduler: DelayQueue<ScheduledTask>,
    dirty: HashSet<Slice>,
    container_spin: Spin<ContainerId>,
    open_spin: Spin<(OwnedContainerId, Prize)>,
    opening: Option<OwnedContainerId>,
}

impl<C: Clock> Engine<MemoryStore, C> {
    /// Opens a session over a fresh in-memory store sized by
    /// `config.storage.quota_bytes`.
    ///
    /// # Errors
    ///
    /// As [`Engine::open`].
    pub fn in_memory(config: EngineConfig, clock: C, seed: SessionSeed) -> EngineResult<Self> {
        let store = MemoryStore::new(config.storage.quota_bytes);
        Self::open(config, store, clock, seed)
    }
}

impl<S: KeyValueStore, C: Clock> Engine<S, C> {
    /// Opens a session, loading whatever `store` holds and falling back to
    /// `seed` for anything missing or unreadable.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::InvalidConfig` (wrapped) for an invalid config
    /// or a catalog with non-positive weights.
    pub fn open(config: EngineConfig, store: S, clock: C, seed: SessionSeed) -> EngineResult<Self> {
        config
            .validate()
            .map_err(|err| EconomyError::InvalidConfig(err.to_string()))?;

        let now = clock.now();
        let layout = StorageLayout::from_config(&config.storage);
        let mut sync = StoreSynchronizer::new(store, &config.storage);
        let mut dirty = HashSet::new();

        sync.run_once(FLAG_DATA_RESET, |sync| reset_user_data(sync, &layout));

        let canonical = catalog_values(&seed.catalog).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "catalog cannot be serialised, skipping reconciliation");
            Vec::new()
        });
        let migrate = !sync.flag(FLAG_PRIZE_TAGS);
        let tag = |value: &mut serde_json::Value| if migrate { migrate_legacy_prizes(value) } else { 0 };

        let mut catalog: Vec<RewardContainer> =
            sync.load_list_with(&layout.cases, &canonical, seed.catalog.clone(), tag);
        if catalog.is_empty() {
            catalog = seed.catalog;
        }
        let owned: Vec<OwnedContainer> = sync.load_list_with(&layout.user_cases, &canonical, Vec::new(), tag);
        if migrate {
            sync.set_flag(FLAG_PRIZE_TAGS);
            dirty.extend([Slice::Cases, Slice::UserCases]);
        }

        let mut default_users = vec![seed.self_user.clone()];
        default_users.extend(seed.opponents.iter().cloned());
        let users: Vec<User> = sync.load_list(&layout.users, NO_CATALOG, default_users);
        let personal: PersonalBattles = sync.load_value(&layout.personal_battles, PersonalBattles::default());

        let mut ledger = EscrowLedger::restore(
            users,
            personal.invitations,
            personal.battles,
            config.ledger.invitation_ttl_secs,
        );
        for user in std::iter::once(seed.self_user.clone()).chain(seed.opponents) {
            if ledger.register_user(user) {
                dirty.insert(Slice::Users);
            }
        }

        let mut achievements: Vec<Achievement> = sync.load_list(&layout.achievements, NO_CATALOG, Vec::new());
        if merge_definitions(&mut achievements, seed.achievements, |a| a.id) {
            dirty.insert(Slice::Achievements);
        }
        let mut tasks: Vec<Task> = sync.load_list(&layout.tasks, NO_CATALOG, Vec::new());
        if merge_definitions(&mut tasks, seed.tasks, |t| t.id) {
            dirty.insert(Slice::Tasks);
        }
        let items: Vec<ClaimedItem> = sync.load_list(&layout.items, NO_CATALOG, Vec::new());
        let notifications: Vec<Notification> = sync.load_list(&layout.notifications, NO_CATALOG, Vec::new());

        let container_table = container_table(&catalog)?;
        let feed = NotificationFeed::restore(notifications, config.notifications.cap);
        let deriver = NotificationDeriver::new(
            seed.self_user.id,
            config.rewards.battle_win_experience,
            feed.next_id(),
        );

        let mut differ = SnapshotDiffer::new();
        differ.diff(ACHIEVEMENTS, &achievements);
        differ.diff(TASKS, &tasks);
        differ.diff(INVITATIONS, ledger.invitations());
        differ.diff(BATTLES, ledger.battles());

        let mut scheduler = DelayQueue::new();
        scheduler.schedule(now + Duration::seconds(config.storage.flush_interval_secs), ScheduledTask::Flush);
        if config.notifications.motivation_interval_secs > 0 {
            scheduler.schedule(
                now + Duration::seconds(config.notifications.motivation_interval_secs),
                ScheduledTask::Motivation,
            );
        }

        let rng = ChaCha8Rng::seed_from_u64(config.rewards.seed.unwrap_or_else(rand::random));
        let next_owned_id = owned.iter().map(|o| o.id).max().map_or(1, |id| id + 1);

        tracing::info!(
            self_id = seed.self_user.id,
            containers = catalog.len(),
            owned = owned.len(),
            achievements = achievements.len(),
            tasks = tasks.len(),
            "session opened"
        );

        Ok(Self {
            config,
            clock,
            rng,
            layout,
            sync,
            ledger,
            self_id: seed.self_user.id,
            catalog,
            container_table,
            owned,
            next_owned_id,
            items,
            achievements,
            tasks,
            differ,
            deriver,
            feed,
            scheduler,
            dirty,
            container_spin: Spin::new(),
            open_spin: Spin::new(),
            opening: None,
        })
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Advances the session to the clock's current time.
    pub fn tick(&mut self) -> TickReport {
        let now = self.clock.now();
        let mut report = TickReport {
            expired: self.ledger.expire_stale(now),
            ..TickReport::default()
        };

        let mut events = self.differ.diff(ACHIEVEMENTS, &self.achievements);
        events.extend(self.differ.diff(TASKS, &self.tasks));
        let battle_events = {
            let mut e = self.differ.diff(INVITATIONS, self.ledger.invitations());
            e.extend(self.differ.diff(BATTLES, self.ledger.battles()));
            e
        };
        if !battle_events.is_empty() {
            self.dirty.insert(Slice::PersonalBattles);
        }
        events.extend(battle_events);

        let context = DeriveContext {
            achievements: &self.achievements,
            tasks: &self.tasks,
        };
        let mut notes = self.deriver.derive_from_diff(&events, context, &mut self.ledger, now);

        let ledger_events = self.ledger.drain_events();
        if !ledger_events.is_empty() {
            self.dirty.insert(Slice::Users);
        }
        notes.extend(self.deriver.derive_from_ledger(&ledger_events, now));
        report.notifications += self.push_notifications(notes);

        for task in self.scheduler.due(now) {
            match task {
                ScheduledTask::Flush => {
                    report.flushed = self.flush();
                    self.scheduler.schedule(
                        now + Duration::seconds(self.config.storage.flush_interval_secs),
                        ScheduledTask::Flush,
                    );
                }
                ScheduledTask::Motivation => {
                    let note = self.deriver.motivation(&mut self.rng, now);
                    report.notifications += self.push_notifications([note]);
                    self.scheduler.schedule(
                        now + Duration::seconds(self.config.notifications.motivation_interval_secs),
                        ScheduledTask::Motivation,
                    );
                }
            }
        }

        report
    }

    fn push_notifications(&mut self, notes: impl IntoIterator<Item = Notification>) -> usize {
        let added = self.feed.push_all(notes);
        if added > 0 {
            self.dirty.insert(Slice::Notifications);
        }
        added
    }

    /// Writes every slice changed since the last flush.
    ///
    /// Slices whose save failed outright stay dirty for the next flush.
    pub fn flush(&mut self) -> Vec<(&'static str, SaveOutcome)> {
        let mut dirty: Vec<Slice> = self.dirty.drain().collect();
        dirty.sort_unstable();

        let mut results = Vec::with_capacity(dirty.len());
        for slice in dirty {
            let (name, outcome) = self.save_slice(slice);
            if outcome == SaveOutcome::Failed {
                self.dirty.insert(slice);
            }
            results.push((name, outcome));
        }

        if !results.is_empty() {
            tracing::debug!(slices = results.len(), total_bytes = self.sync.estimated_total_bytes(), "flushed");
        }
        results
    }

    fn save_slice(&mut self, slice: Slice) -> (&'static str, SaveOutcome) {
        let layout = self.layout;
        match slice {
            Slice::Cases => {
                let mut cases = self.catalog.clone();
                (layout.cases.name, self.sync.save_list(&layout.cases, &mut cases))
            }
            Slice::UserCases => (layout.user_cases.name, self.sync.save_list(&layout.user_cases, &mut self.owned)),
            Slice::Notifications => (
                layout.notifications.name,
                self.sync.save_list(&layout.notifications, self.feed.records_mut()),
            ),
            Slice::Users => {
                let mut users: Vec<User> = self.ledger.users().cloned().collect();
                (layout.users.name, self.sync.save_list(&layout.users, &mut users))
            }
            Slice::PersonalBattles => {
                let personal = PersonalBattles {
                    invitations: self.ledger.invitations().to_vec(),
                    battles: self.ledger.battles().to_vec(),
                };
                (
                    layout.personal_battles.name,
                    self.sync.save_value(&layout.personal_battles, &personal),
                )
            }
            Slice::Achievements => (
                layout.achievements.name,
                self.sync.save_list(&layout.achievements, &mut self.achievements),
            ),
            Slice::Tasks => (layout.tasks.name, self.sync.save_list(&layout.tasks, &mut self.tasks)),
            Slice::Items => (layout.items.name, self.sync.save_list(&layout.items, &mut self.items)),
        }
    }

    // ========================================================================
    // Battles
    // ========================================================================

    /// Offers a wager between two participants.
    ///
    /// # Errors
    ///
    /// See [`EscrowLedger::create_invitation`]. A failed balance check is
    /// also reported as an `InsufficientFunds` notification on the next tick.
    pub fn create_invitation(&mut self, challenger_id: UserId, opponent_id: UserId, stake: u64) -> EngineResult<InvitationId> {
        let now = self.clock.now();
        let id = self.ledger.create_invitation(challenger_id, opponent_id, stake, now)?;
        self.dirty.insert(Slice::PersonalBattles);
        Ok(id)
    }

    /// Accepts a pending invitation and starts the battle.
    ///
    /// # Errors
    ///
    /// See [`EscrowLedger::accept_invitation`].
    pub fn accept_invitation(&mut self, invitation_id: InvitationId) -> EngineResult<BattleId> {
        let now = self.clock.now();
        self.dirty.insert(Slice::PersonalBattles);
        Ok(self.ledger.accept_invitation(invitation_id, now)?)
    }

    /// Declines a pending invitation.
    ///
    /// # Errors
    ///
    /// See [`EscrowLedger::decline_invitation`].
    pub fn decline_invitation(&mut self, invitation_id: InvitationId) -> EngineResult<()> {
        let now = self.clock.now();
        self.ledger.decline_invitation(invitation_id, now)?;
        self.dirty.insert(Slice::PersonalBattles);
        Ok(())
    }

    /// Settles an active battle. Returns the amount debited from the loser.
    ///
    /// # Errors
    ///
    /// See [`EscrowLedger::complete_battle`].
    pub fn complete_battle(&mut self, battle_id: BattleId, winner_id: UserId) -> EngineResult<u64> {
        let now = self.clock.now();
        let debited = self.ledger.complete_battle(battle_id, winner_id, now)?;
        self.dirty.extend([Slice::PersonalBattles, Slice::Users]);
        Ok(debited)
    }

    /// Sets a participant's presence flag.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` for unknown ids.
    pub fn set_online(&mut self, user_id: UserId, online: bool) -> EngineResult<()> {
        self.ledger.set_online(user_id, online)?;
        self.dirty.insert(Slice::Users);
        Ok(())
    }

    // ========================================================================
    // Achievements & Tasks
    // ========================================================================

    /// Adds a task. Returns its id.
    pub fn add_task(&mut self, title: impl Into<String>, reward_coins: u64, reward_experience: u64) -> ProgressId {
        let id = self.tasks.iter().map(|t| t.id).max().map_or(1, |id| id + 1);
        self.tasks
            .push(Task::new(id, title).with_reward(reward_coins, reward_experience));
        self.dirty.insert(Slice::Tasks);
        id
    }

    /// Marks a task completed. Returns false if it already was.
    ///
    /// # Errors
    ///
    /// Returns `ProgressNotFound` for unknown ids.
    pub fn complete_task(&mut self, task_id: ProgressId) -> EngineResult<bool> {
        let now = self.clock.now();
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or(EngineError::ProgressNotFound(task_id))?;
        let changed = task.complete(now);
        if changed {
            self.dirty.insert(Slice::Tasks);
        }
        Ok(changed)
    }

    /// Adds an achievement definition. Returns false if the id exists.
    pub fn add_achievement(&mut self, achievement: Achievement) -> bool {
        if self.achievements.iter().any(|a| a.id == achievement.id) {
            return false;
        }
        self.achievements.push(achievement);
        self.dirty.insert(Slice::Achievements);
        true
    }

    /// Adds progress to an achievement. Returns true if it unlocked.
    ///
    /// # Errors
    ///
    /// Returns `ProgressNotFound` for unknown ids.
    pub fn record_progress(&mut self, achievement_id: ProgressId, amount: u32) -> EngineResult<bool> {
        let now = self.clock.now();
        let achievement = self.achievement_mut(achievement_id)?;
        let unlocked = achievement.record_progress(amount, now);
        self.dirty.insert(Slice::Achievements);
        Ok(unlocked)
    }

    /// Unlocks an achievement outright. Returns false if already unlocked.
    ///
    /// # Errors
    ///
    /// Returns `ProgressNotFound` for unknown ids.
    pub fn unlock_achievement(&mut self, achievement_id: ProgressId) -> EngineResult<bool> {
        let now = self.clock.now();
        let unlocked = self.achievement_mut(achievement_id)?.unlock(now);
        if unlocked {
            self.dirty.insert(Slice::Achievements);
        }
        Ok(unlocked)
    }

    fn achievement_mut(&mut self, achievement_id: ProgressId) -> EngineResult<&mut Achievement> {
        self.achievements
            .iter_mut()
            .find(|a| a.id == achievement_id)
            .ok_or(EngineError::ProgressNotFound(achievement_id))
    }

    // ========================================================================
    // Container Draws
    // ========================================================================

    /// Starts drawing a container from the catalog.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when the catalog is empty; `InvalidState` when a draw
    /// is already in progress.
    pub fn begin_container_spin(&mut self) -> EngineResult<()> {
        if self.container_table.is_none() {
            return Err(EconomyError::InvalidConfig("container catalog is empty".to_string()).into());
        }
        Ok(self.container_spin.begin()?)
    }

    /// Draws the container.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless a draw was begun.
    pub fn resolve_container_spin(&mut self) -> EngineResult<ContainerId> {
        let table = self
            .container_table
            .as_ref()
            .ok_or_else(|| EconomyError::InvalidConfig("container catalog is empty".to_string()))?;
        let picked = *self.container_spin.resolve(table, &mut self.rng)?;
        tracing::debug!(container_id = picked, "container drawn");
        Ok(picked)
    }

    /// Adds the drawn container to the owned set. Returns its instance id.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless a result is ready.
    pub fn claim_container_spin(&mut self) -> EngineResult<OwnedContainerId> {
        let container_id = self.container_spin.claim()?;
        let container = self
            .catalog
            .iter()
            .find(|c| c.id == container_id)
            .ok_or(EconomyError::ContainerNotFound(container_id))?;

        let id = self.next_owned_id;
        self.next_owned_id += 1;
        self.owned
            .push(OwnedContainer::from_catalog(id, container, self.clock.now()));
        self.dirty.insert(Slice::UserCases);
        tracing::info!(owned_id = id, container_id, "container claimed");
        Ok(id)
    }

    /// Abandons the container draw. Nothing is added.
    pub fn discard_container_spin(&mut self) -> Option<ContainerId> {
        self.container_spin.discard()
    }

    /// State of the container draw.
    #[must_use]
    pub const fn container_spin_state(&self) -> SpinState {
        self.container_spin.state()
    }

    /// Starts opening an owned container.
    ///
    /// # Errors
    ///
    /// `ContainerNotFound` for unknown instances; `InvalidState` when an open
    /// is already in progress.
    pub fn begin_open(&mut self, owned_id: OwnedContainerId) -> EngineResult<()> {
        if !self.owned.iter().any(|o| o.id == owned_id) {
            return Err(EconomyError::ContainerNotFound(owned_id).into());
        }
        self.open_spin.begin()?;
        self.opening = Some(owned_id);
        Ok(())
    }

    /// Draws the prize for the container being opened.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless an open was begun; `ContainerNotFound` if the
    /// catalog entry is gone; `InvalidConfig` for a container without
    /// drawable prizes.
    pub fn resolve_open(&mut self) -> EngineResult<Prize> {
        if self.open_spin.state() != SpinState::Spinning {
            return Err(EconomyError::InvalidState(format!(
                "cannot resolve an open in state {:?}",
                self.open_spin.state()
            ))
            .into());
        }
        let owned_id = self
            .opening
            .ok_or_else(|| EconomyError::InvalidState("no container is being opened".to_string()))?;
        let container_id = self
            .owned
            .iter()
            .find(|o| o.id == owned_id)
            .map(|o| o.container_id)
            .ok_or(EconomyError::ContainerNotFound(owned_id))?;
        let container = self
            .catalog
            .iter()
            .find(|c| c.id == container_id)
            .ok_or(EconomyError::ContainerNotFound(container_id))?;

        let table = WeightedTable::new(container.prizes.iter().map(|p| (p, p.drop_chance)).collect())?;
        let prize = (*table.draw(&mut self.rng)).clone();
        tracing::debug!(owned_id, prize_id = prize.id, "prize drawn");

        let (_, drawn) = self.open_spin.resolve_with((owned_id, prize))?;
        Ok(drawn.clone())
    }

    /// Applies the drawn prize once and removes the opened container.
    ///
    /// The container is only removed once the prize has been applied; if the
    /// ledger rejects it the container stays owned and can be opened again.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless a result is ready; `UserNotFound` if the ledger
    /// no longer knows the self user.
    pub fn claim_open(&mut self) -> EngineResult<OpenedPrize> {
        let (owned_id, prize) = self.open_spin.claim()?;
        self.opening = None;

        let container_id = self
            .owned
            .iter()
            .find(|o| o.id == owned_id)
            .map(|o| o.container_id)
            .ok_or(EconomyError::ContainerNotFound(owned_id))?;

        let mut level_up = None;
        match prize.kind {
            PrizeKind::Coins => {
                self.ledger.credit(self.self_id, prize.value)?;
            }
            PrizeKind::Experience => {
                let delta = i64::try_from(prize.value).unwrap_or(i64::MAX);
                level_up = self.ledger.grant_experience(self.self_id, delta)?;
            }
            PrizeKind::Item => {
                self.items.push(ClaimedItem {
                    prize_id: prize.id,
                    name: prize.name.clone(),
                    value: prize.value,
                    container_id,
                    claimed_at: self.clock.now(),
                });
                self.dirty.insert(Slice::Items);
            }
        }
        self.owned.retain(|o| o.id != owned_id);
        self.dirty.extend([Slice::UserCases, Slice::Users]);
        tracing::info!(owned_id, container_id, prize_id = prize.id, kind = ?prize.kind, value = prize.value, "prize claimed");

        Ok(OpenedPrize {
            owned_id,
            container_id,
            prize,
            level_up,
        })
    }

    /// Abandons the open. The container stays owned and unopened.
    pub fn discard_open(&mut self) -> Option<Prize> {
        self.opening = None;
        self.open_spin.discard().map(|(_, prize)| prize)
    }

    /// State of the open draw.
    #[must_use]
    pub const fn open_state(&self) -> SpinState {
        self.open_spin.state()
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Notifications, newest first.
    #[must_use]
    pub fn notifications(&self) -> &[Notification] {
        self.feed.items()
    }

    /// Unread notifications.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.feed.unread_count()
    }

    /// Marks one notification read.
    pub fn mark_read(&mut self, id: NotificationId) -> bool {
        let changed = self.feed.mark_read(id);
        if changed {
            self.dirty.insert(Slice::Notifications);
        }
        changed
    }

    /// Marks every notification read.
    pub fn mark_all_read(&mut self) -> usize {
        let changed = self.feed.mark_all_read();
        if changed > 0 {
            self.dirty.insert(Slice::Notifications);
        }
        changed
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// The ledger, read-only.
    #[must_use]
    pub const fn ledger(&self) -> &EscrowLedger {
        &self.ledger
    }

    /// The self user.
    #[must_use]
    pub fn self_user(&self) -> Option<&User> {
        self.ledger.user(self.self_id)
    }

    /// Id of the self user.
    #[must_use]
    pub const fn self_id(&self) -> UserId {
        self.self_id
    }

    /// Level breakdown of the self user.
    #[must_use]
    pub fn level_progress(&self) -> Option<LevelProgress> {
        self.self_user().map(|user| level_of(cumulative_experience(user)))
    }

    /// Container catalog.
    #[must_use]
    pub fn catalog(&self) -> &[RewardContainer] {
        &self.catalog
    }

    /// Owned containers.
    #[must_use]
    pub fn owned_containers(&self) -> &[OwnedContainer] {
        &self.owned
    }

    /// Claimed items.
    #[must_use]
    pub fn items(&self) -> &[ClaimedItem] {
        &self.items
    }

    /// Achievements.
    #[must_use]
    pub fn achievements(&self) -> &[Achievement] {
        &self.achievements
    }

    /// Tasks.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Persistence layer.
    #[must_use]
    pub const fn synchronizer(&self) -> &StoreSynchronizer<S> {
        &self.sync
    }

    /// True if `slice` changed since the last flush.
    #[must_use]
    pub fn is_dirty(&self, slice: Slice) -> bool {
        self.dirty.contains(&slice)
    }
}

fn container_table(catalog: &[RewardContainer]) -> EngineResult<Option<WeightedTable<ContainerId>>> {
    if catalog.is_empty() {
        return Ok(None);
    }
    let table = WeightedTable::new(catalog.iter().map(|c| (c.id, c.weight)).collect())?;
    Ok(Some(table))
}

/// Appends definitions whose id is not already present. Returns true if any
/// were added.
fn merge_definitions<T>(loaded: &mut Vec<T>, definitions: Vec<T>, id: impl Fn(&T) -> u64) -> bool {
    let before = loaded.len();
    for definition in definitions {
        let definition_id = id(&definition);
        if !loaded.iter().any(|existing| id(existing) == definition_id) {
            loaded.push(definition);
        }
    }
    loaded.len() != before
}
