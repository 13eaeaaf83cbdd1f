//! Achievements and tasks.
//!
//! Flipping `unlocked` / `completed` is all these types do. The reward is
//! paid by the notification deriver when the snapshot differ observes the
//! flip, which is what makes it exactly-once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ProgressId;

/// A progress-tracked achievement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    /// Stable identifier.
    pub id: ProgressId,
    /// Display title.
    pub title: String,
    /// Progress towards `target`.
    #[serde(default)]
    pub progress: u32,
    /// Progress needed to unlock (>= 1).
    pub target: u32,
    /// Coins credited on unlock.
    #[serde(default)]
    pub reward_coins: u64,
    /// Experience granted on unlock.
    #[serde(default)]
    pub reward_experience: u64,
    /// Unlock flag.
    #[serde(default)]
    pub unlocked: bool,
    /// Unlock time.
    #[serde(default)]
    pub unlocked_at: Option<DateTime<Utc>>,
}

impl Achievement {
    /// Creates a locked achievement.
    #[must_use]
    pub fn new(id: ProgressId, title: impl Into<String>, target: u32) -> Self {
        Self {
            id,
            title: title.into(),
            progress: 0,
            target: target.max(1),
            reward_coins: 0,
            reward_experience: 0,
            unlocked: false,
            unlocked_at: None,
        }
    }

    /// Sets the unlock reward.
    #[must_use]
    pub const fn with_reward(mut self, coins: u64, experience: u64) -> Self {
        self.reward_coins = coins;
        self.reward_experience = experience;
        self
    }

    /// Adds progress and unlocks when the target is reached.
    ///
    /// Returns true only for the call that unlocked it.
    pub fn record_progress(&mut self, amount: u32, now: DateTime<Utc>) -> bool {
        if self.unlocked {
            return false;
        }
        self.progress = self.progress.saturating_add(amount).min(self.target);
        if self.progress >= self.target {
            return self.unlock(now);
        }
        false
    }

    /// Unlocks immediately. Returns false if already unlocked.
    pub fn unlock(&mut self, now: DateTime<Utc>) -> bool {
        if self.unlocked {
            return false;
        }
        self.progress = self.target;
        self.unlocked = true;
        self.unlocked_at = Some(now);
        true
    }
}

/// A one-off task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Stable identifier.
    pub id: ProgressId,
    /// Display title.
    pub title: String,
    /// Coins credited on completion.
    #[serde(default)]
    pub reward_coins: u64,
    /// Experience granted on completion.
    #[serde(default)]
    pub reward_experience: u64,
    /// Completion flag.
    #[serde(default)]
    pub completed: bool,
    /// Completion time.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Creates an open task.
    #[must_use]
    pub fn new(id: ProgressId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            reward_coins: 0,
            reward_experience: 0,
            completed: false,
            completed_at: None,
        }
    }

    /// Sets the completion reward.
    #[must_use]
    pub const fn with_reward(mut self, coins: u64, experience: u64) -> Self {
        self.reward_coins = coins;
        self.reward_experience = experience;
        self
    }

    /// Marks the task complete. Returns false if it already was.
    pub fn complete(&mut self, now: DateTime<Utc>) -> bool {
        if self.completed {
            return false;
        }
        self.completed = true;
        self.completed_at = Some(now);
        true
    }
}
