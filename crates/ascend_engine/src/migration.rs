//! One-time fixes applied to persisted data at load.
//!
//! Prize kinds used to be guessed from prize names at claim time. Records
//! written back then carry no `type` tag. [`migrate_legacy_prizes`] tags
//! them once, and from then on the tag is mandatory.

use ascend_shared::PrizeKind;
use serde_json::Value;

use crate::store::KeyValueStore;
use crate::sync::{StorageLayout, StoreSynchronizer};

fn infer_prize_kind(name: &str) -> PrizeKind {
    let name = name.to_lowercase();
    if name.contains("coin") {
        PrizeKind::Coins
    } else if name.contains("xp") || name.contains("experience") {
        PrizeKind::Experience
    } else {
        PrizeKind::Item
    }
}

fn kind_tag(kind: PrizeKind) -> &'static str {
    match kind {
        PrizeKind::Coins => "coins",
        PrizeKind::Experience => "experience",
        PrizeKind::Item => "item",
    }
}

/// Adds a `type` tag to every untagged prize in a persisted container list.
///
/// Also tags the `prize` of persisted owned containers. Returns the number
/// of prizes tagged.
pub fn migrate_legacy_prizes(containers: &mut Value) -> usize {
    let Some(containers) = containers.as_array_mut() else {
        return 0;
    };

    let mut tagged = 0;
    for container in containers {
        if let Some(prizes) = container.get_mut("prizes").and_then(Value::as_array_mut) {
            tagged += prizes.iter_mut().map(tag_prize).sum::<usize>();
        }
        if let Some(prize) = container.get_mut("prize") {
            tagged += tag_prize(prize);
        }
    }
    if tagged > 0 {
        tracing::info!(tagged, "legacy prizes tagged");
    }
    tagged
}

fn tag_prize(prize: &mut Value) -> usize {
    let Some(fields) = prize.as_object_mut() else {
        return 0;
    };
    if !matches!(fields.get("type"), None | Some(Value::Null)) {
        return 0;
    }
    let name = fields.get("name").and_then(Value::as_str).unwrap_or_default();
    let kind = infer_prize_kind(name);
    tracing::debug!(name, kind = kind_tag(kind), "tagging legacy prize");
    fields.insert("type".to_string(), Value::from(kind_tag(kind)));
    1
}

/// Clears the per-user slices written by earlier releases.
///
/// The catalog and participants are kept.
pub fn reset_user_data<S: KeyValueStore>(sync: &mut StoreSynchronizer<S>, layout: &StorageLayout) {
    for key in [
        &layout.user_cases,
        &layout.notifications,
        &layout.personal_battles,
        &layout.items,
    ] {
        sync.clear(key);
    }
    tracing::info!("per-user data reset");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::store::MemoryStore;
    use ascend_shared::RewardContainer;
    use serde_json::json;

    #[test]
    fn test_untagged_prizes_are_tagged() {
        let mut cases = json!([{
            "id": 1,
            "name": "Starter",
            "prizes": [
                { "id": 1, "name": "50 Coins", "dropChance": 3.0, "value": 50 },
                { "id": 2, "name": "XP Boost", "dropChance": 2.0, "value": 100 },
                { "id": 3, "name": "Golden Badge", "dropChance": 1.0, "value": 1 },
                { "id": 4, "name": "Coin-shaped Item", "type": "item", "dropChance": 1.0, "value": 1 }
            ]
        }]);

        assert_eq!(migrate_legacy_prizes(&mut cases), 3);
        assert_eq!(migrate_legacy_prizes(&mut cases), 0);

        let parsed: Vec<RewardContainer> = serde_json::from_value(cases).unwrap();
        let kinds: Vec<PrizeKind> = parsed[0].prizes.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![PrizeKind::Coins, PrizeKind::Experience, PrizeKind::Item, PrizeKind::Item]
        );
    }

    #[test]
    fn test_owned_container_prize_is_tagged() {
        let mut owned = json!([{ "id": 1, "containerId": 1, "prize": { "id": 1, "name": "Experience" } }]);
        assert_eq!(migrate_legacy_prizes(&mut owned), 1);
        assert_eq!(owned[0]["prize"]["type"], "experience");
        assert_eq!(migrate_legacy_prizes(&mut json!({ "not": "a list" })), 0);
    }

    #[test]
    fn test_reset_keeps_catalog_and_users() {
        let config = StorageConfig::default();
        let layout = StorageLayout::from_config(&config);
        let mut store = MemoryStore::new(4096);
        for key in ["cases", "users", "userCases", "notifications", "personalBattles", "items"] {
            store.set(key, "[]").unwrap();
        }
        let mut sync = StoreSynchronizer::new(store.clone(), &config);

        reset_user_data(&mut sync, &layout);
        assert_eq!(store.keys(), vec!["cases".to_string(), "users".to_string()]);
    }
}
