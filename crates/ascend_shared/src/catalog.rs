//! Reward containers ("cases"), their prizes, and what a user owns.
//!
//! The catalog is static reference data. Every `Prize` carries a mandatory
//! `type` tag; untagged legacy records are handled by the migration step in
//! `ascend_engine`, never by guessing at runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContainerId, OwnedContainerId, PrizeId};

/// Effect a prize has when claimed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrizeKind {
    /// Credits `value` coins.
    Coins,
    /// Grants `value` experience.
    Experience,
    /// Adds a collectible item.
    Item,
}

/// One weighted outcome of opening a container.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prize {
    /// Identifier, unique within its container.
    pub id: PrizeId,
    /// Display name.
    pub name: String,
    /// Effect tag.
    #[serde(rename = "type")]
    pub kind: PrizeKind,
    /// Relative draw weight (> 0).
    pub drop_chance: f64,
    /// Coins, experience, or item value depending on `kind`.
    pub value: u64,
    /// Image reference or inline payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A container definition from the catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardContainer {
    /// Stable identifier.
    pub id: ContainerId,
    /// Display name.
    pub name: String,
    /// Image reference or inline payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Relative weight when the container itself is drawn.
    #[serde(default = "default_container_weight")]
    pub weight: f64,
    /// Weighted prizes.
    pub prizes: Vec<Prize>,
}

fn default_container_weight() -> f64 {
    1.0
}

impl RewardContainer {
    /// Looks up a prize by id.
    #[must_use]
    pub fn prize(&self, prize_id: PrizeId) -> Option<&Prize> {
        self.prizes.iter().find(|p| p.id == prize_id)
    }
}

/// A container instance the user holds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedContainer {
    /// Instance identifier.
    pub id: OwnedContainerId,
    /// Catalog entry this instance was drawn from.
    pub container_id: ContainerId,
    /// Catalog name, copied at draw time.
    #[serde(default)]
    pub name: String,
    /// Catalog image, copied at draw time and restored from the catalog on load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Time the instance was obtained.
    pub obtained_at: DateTime<Utc>,
    /// Opened marker carried by older stored records. Claiming a prize
    /// removes the instance instead, so live instances are always unopened.
    #[serde(default)]
    pub opened: bool,
    /// Prize carried by older stored records; migrated with the catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prize: Option<Prize>,
}

impl OwnedContainer {
    /// Creates an unopened instance of `container`.
    #[must_use]
    pub fn from_catalog(
        id: OwnedContainerId,
        container: &RewardContainer,
        obtained_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            container_id: container.id,
            name: container.name.clone(),
            image: container.image.clone(),
            obtained_at,
            opened: false,
            prize: None,
        }
    }
}

/// An item-kind prize that has been claimed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedItem {
    /// Prize identifier.
    pub prize_id: PrizeId,
    /// Prize name.
    pub name: String,
    /// Item value.
    pub value: u64,
    /// Container the prize came from.
    pub container_id: ContainerId,
    /// Claim time.
    pub claimed_at: DateTime<Utc>,
}
