//! # Leveling Calculator
//!
//! **Deterministic Experience → Level Mapping**
//!
//! Advancing from level `n` to `n + 1` costs `n × 100` experience, so the
//! cumulative experience needed to *reach* level `n` is
//! `100 × (1 + 2 + … + (n − 1))`:
//!
//! ```text
//! level   cost to leave   cumulative to reach
//!   1          100                  0
//!   2          200                100
//!   3          300                300
//!   4          400                600
//! ```
//!
//! ## Guarantees
//!
//! - [`level_of`] is pure, total and monotonic in its input
//! - At most [`MAX_LEVEL_STEPS`] iterations per call
//! - `experience_in_level < experience_to_next_level` for every input

use ascend_shared::constants::{EXPERIENCE_PER_LEVEL_STEP, LEVEL_UP_BONUS_COINS, MAX_LEVEL_STEPS};
use ascend_shared::User;

/// Position on the leveling curve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelProgress {
    /// Level (>= 1).
    pub level: u32,
    /// Progress within the level.
    pub experience_in_level: u64,
    /// Cost of leaving the level (> 0).
    pub experience_to_next_level: u64,
}

/// A level increase caused by an experience change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelUp {
    /// Level before the change.
    pub old_level: u32,
    /// Level after the change.
    pub new_level: u32,
    /// Coins owed for the increase: `(new - old) × 100`.
    pub bonus_coins: u64,
}

/// Cost of leaving `level`.
#[inline]
#[must_use]
pub const fn cost_of_level(level: u32) -> u64 {
    level as u64 * EXPERIENCE_PER_LEVEL_STEP
}

/// Cumulative experience needed to reach `level`.
///
/// Saturates at `u64::MAX` for levels no real progression reaches, such as
/// a corrupt stored record.
#[must_use]
pub const fn experience_to_reach(level: u32) -> u64 {
    let n = level.saturating_sub(1) as u64;
    (n * (n + 1) / 2).saturating_mul(EXPERIENCE_PER_LEVEL_STEP)
}

/// Maps cumulative experience to a level.
///
/// Bounded to [`MAX_LEVEL_STEPS`] iterations. Experience beyond the last
/// reachable level is clamped just under its threshold.
#[must_use]
pub fn level_of(cumulative: u64) -> LevelProgress {
    let mut level = 1u32;
    let mut remaining = cumulative;

    for _ in 0..MAX_LEVEL_STEPS {
        let cost = cost_of_level(level);
        if remaining < cost {
            return LevelProgress {
                level,
                experience_in_level: remaining,
                experience_to_next_level: cost,
            };
        }
        remaining -= cost;
        level += 1;
    }

    let cost = cost_of_level(level);
    LevelProgress {
        level,
        experience_in_level: remaining.min(cost - 1),
        experience_to_next_level: cost,
    }
}

/// Recovers cumulative experience from a user's stored level and progress.
#[must_use]
pub fn cumulative_experience(user: &User) -> u64 {
    experience_to_reach(user.level).saturating_add(user.experience)
}

/// Applies an experience change and re-derives the user's level.
///
/// Negative deltas are floored so cumulative experience never drops below
/// zero. Only the experience fields are touched; the caller owns crediting
/// [`LevelUp::bonus_coins`] in the same step.
pub fn apply_experience_delta(user: &mut User, delta: i64) -> Option<LevelUp> {
    let current = cumulative_experience(user);
    let updated = if delta >= 0 {
        current.saturating_add(delta.unsigned_abs())
    } else {
        current.saturating_sub(delta.unsigned_abs())
    };

    let old_level = user.level;
    let progress = level_of(updated);
    user.level = progress.level;
    user.experience = progress.experience_in_level;
    user.experience_to_next_level = progress.experience_to_next_level;

    (progress.level > old_level).then(|| LevelUp {
        old_level,
        new_level: progress.level,
        bonus_coins: u64::from(progress.level - old_level) * LEVEL_UP_BONUS_COINS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_boundaries() {
        assert_eq!(level_of(0).level, 1);
        assert_eq!(level_of(99).level, 1);
        assert_eq!(level_of(100).level, 2);
        assert_eq!(level_of(299).level, 2);
        assert_eq!(level_of(300).level, 3);
        assert_eq!(level_of(600).level, 4);
    }

    #[test]
    fn test_level_of_250() {
        let progress = level_of(250);
        assert_eq!(
            progress,
            LevelProgress {
                level: 2,
                experience_in_level: 150,
                experience_to_next_level: 200,
            }
        );
    }

    #[test]
    fn test_monotonic_and_bounded_progress() {
        let mut previous = level_of(0);
        for x in (0..600_000u64).step_by(37) {
            let progress = level_of(x);
            assert!(progress.level >= previous.level, "level dropped at {x}");
            assert!(
                progress.experience_in_level < progress.experience_to_next_level,
                "progress overflowed threshold at {x}"
            );
            previous = progress;
        }
    }

    #[test]
    fn test_iteration_cap_clamps_progress() {
        let progress = level_of(u64::MAX);
        assert_eq!(progress.level, MAX_LEVEL_STEPS + 1);
        assert!(progress.experience_in_level < progress.experience_to_next_level);
    }

    #[test]
    fn test_absurd_stored_level_saturates() {
        assert_eq!(experience_to_reach(u32::MAX), u64::MAX);

        let mut user = User::new(1, "corrupt", 0);
        user.level = 4_000_000_000;
        assert_eq!(cumulative_experience(&user), u64::MAX);

        assert_eq!(apply_experience_delta(&mut user, 10), None);
        assert_eq!(user.level, MAX_LEVEL_STEPS + 1);
        assert!(user.experience < user.experience_to_next_level);
    }

    #[test]
    fn test_experience_to_reach_inverts_level_of() {
        for level in 1..50 {
            let progress = level_of(experience_to_reach(level));
            assert_eq!(progress.level, level);
            assert_eq!(progress.experience_in_level, 0);
        }
    }

    #[test]
    fn test_apply_delta_levels_up_with_bonus() {
        let mut user = User::new(1, "self", 0);
        let level_up = apply_experience_delta(&mut user, 250).unwrap();

        assert_eq!(level_up.old_level, 1);
        assert_eq!(level_up.new_level, 2);
        assert_eq!(level_up.bonus_coins, 100);
        assert_eq!(user.level, 2);
        assert_eq!(user.experience, 150);
        assert_eq!(user.experience_to_next_level, 200);
    }

    #[test]
    fn test_apply_delta_multiple_levels() {
        let mut user = User::new(1, "self", 0);
        let level_up = apply_experience_delta(&mut user, 600).unwrap();
        assert_eq!(level_up.new_level, 4);
        assert_eq!(level_up.bonus_coins, 300);
    }

    #[test]
    fn test_negative_delta_is_floored() {
        let mut user = User::new(1, "self", 0);
        apply_experience_delta(&mut user, 120);
        assert!(apply_experience_delta(&mut user, -10_000).is_none());
        assert_eq!(user.level, 1);
        assert_eq!(user.experience, 0);
        assert_eq!(cumulative_experience(&user), 0);
    }

    #[test]
    fn test_small_delta_no_level_up() {
        let mut user = User::new(1, "self", 0);
        assert!(apply_experience_delta(&mut user, 40).is_none());
        assert_eq!(user.experience, 40);
    }
}
