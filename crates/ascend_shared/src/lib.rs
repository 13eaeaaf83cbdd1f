//! # Ascend Shared
//!
//! Data model used by the ledger, the engine and the persisted layout.
//!
//! ## CRITICAL RULE
//!
//! Types in this crate carry state, not policy. Balance changes, level
//! derivation and random draws live in `ascend_economy`; change detection
//! and persistence live in `ascend_engine`.
//!
//! All structs serialise with camelCase field names so the persisted JSON
//! keeps the layout the front-end reads.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod catalog;
pub mod constants;
pub mod events;
pub mod model;
pub mod notification;
pub mod progress;

pub use catalog::{ClaimedItem, OwnedContainer, Prize, PrizeKind, RewardContainer};
pub use events::{DeclineReason, LedgerEvent};
pub use model::{Battle, BattleInvitation, BattleStatus, InvitationStatus, User};
pub use notification::{Notification, NotificationKind, NotificationPayload, Priority};
pub use progress::{Achievement, Task};

/// Identifier of a participant.
pub type UserId = u64;

/// Identifier of a battle invitation.
pub type InvitationId = u64;

/// Identifier of a battle.
pub type BattleId = u64;

/// Identifier of a catalog container.
pub type ContainerId = u64;

/// Identifier of an owned container instance.
pub type OwnedContainerId = u64;

/// Identifier of a prize inside a container.
pub type PrizeId = u64;

/// Identifier of a notification.
pub type NotificationId = u64;

/// Identifier of an achievement or task.
pub type ProgressId = u64;
