//! # Economy & Storage Constants
//!
//! Defaults for the ledger, the leveling curve and the persisted layout.
//! Runtime overrides come from `EngineConfig` in `ascend_engine`; these values
//! are what a missing config section falls back to.

// =============================================================================
// LEVELING
// =============================================================================

/// Experience cost multiplier: advancing from level `n` costs `n * 100`.
pub const EXPERIENCE_PER_LEVEL_STEP: u64 = 100;

/// Coins credited per level gained.
pub const LEVEL_UP_BONUS_COINS: u64 = 100;

/// Upper bound on leveling iterations (levels are small in practice).
pub const MAX_LEVEL_STEPS: u32 = 100;

// =============================================================================
// BATTLES
// =============================================================================

/// Lifetime of a pending invitation in seconds (24 hours).
pub const INVITATION_TTL_SECS: i64 = 86_400;

/// Experience granted to the self user for winning a battle.
pub const BATTLE_WIN_EXPERIENCE: u64 = 50;

/// Rating assigned to freshly bootstrapped users.
pub const STARTING_RATING: i64 = 1000;

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Maximum notifications kept in memory and on disk.
pub const NOTIFICATION_CAP: usize = 100;

// =============================================================================
// STORAGE - PERSISTED LAYOUT
// =============================================================================

/// Container catalog key.
pub const KEY_CASES: &str = "cases";

/// Owned containers key.
pub const KEY_USER_CASES: &str = "userCases";

/// Notification feed key.
pub const KEY_NOTIFICATIONS: &str = "notifications";

/// Participant records key.
pub const KEY_USERS: &str = "users";

/// Battle records key.
pub const KEY_PERSONAL_BATTLES: &str = "personalBattles";

/// Achievements key.
pub const KEY_ACHIEVEMENTS: &str = "achievements";

/// Tasks key.
pub const KEY_TASKS: &str = "tasks";

/// Claimed items key.
pub const KEY_ITEMS: &str = "items";

/// One-shot flag marking that the legacy data reset already ran.
pub const FLAG_DATA_RESET: &str = "migration.dataReset.v1";

/// One-shot flag marking that untagged prizes were migrated.
pub const FLAG_PRIZE_TAGS: &str = "migration.prizeTags.v1";

/// One mebibyte.
pub const MIB: usize = 1024 * 1024;

/// Single-write budget for the container catalog.
pub const CASES_BUDGET_BYTES: usize = 4 * MIB;

/// Single-write budget for owned containers.
pub const USER_CASES_BUDGET_BYTES: usize = 2 * MIB;

/// Single-write budget for every other key.
pub const DEFAULT_BUDGET_BYTES: usize = MIB;

/// Total store size above which a warning is logged.
pub const STORE_WARN_BYTES: usize = 8 * MIB;

/// Capacity of the default in-memory store (mirrors browser local storage).
pub const DEFAULT_STORE_QUOTA_BYTES: usize = 10 * MIB;

/// Keep-most-recent trims attempted on overflow, in escalation order.
pub const TRIM_STEPS: [usize; 3] = [100, 50, 20];

/// Prefix of inline binary payloads stripped before saving.
pub const INLINE_DATA_PREFIX: &str = "data:";

/// Field names that may carry inline binary payloads.
pub const BINARY_FIELDS: [&str; 1] = ["image"];
