//! Integration tests for the store synchronizer and session persistence.
//!
//! Run with: cargo test --package ascend_engine --test persistence_test

use ascend_engine::sync::{catalog_values, NO_CATALOG};
use ascend_engine::{
    Engine, EngineConfig, FileStore, KeyValueStore, ManualClock, MemoryStore, SaveOutcome,
    SessionSeed, StorageLayout, StoreSynchronizer,
};
use ascend_shared::constants::{FLAG_DATA_RESET, FLAG_PRIZE_TAGS, MIB};
use ascend_shared::{
    Achievement, NotificationKind, OwnedContainer, Prize, PrizeKind, RewardContainer, User,
};
use chrono::{DateTime, Duration, Utc};

const ME: u64 = 1;
const RIVAL: u64 = 2;

fn t0() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
}

fn temp_dir() -> std::path::PathBuf {
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("test_ascend_session_{id}"))
}

fn catalog() -> Vec<RewardContainer> {
    vec![RewardContainer {
        id: 1,
        name: "Gold Case".to_string(),
        image: Some("data:image/png;base64,R09MRA==".to_string()),
        weight: 1.0,
        prizes: vec![Prize {
            id: 1,
            name: "Coins".to_string(),
            kind: PrizeKind::Coins,
            drop_chance: 1.0,
            value: 25,
            image: Some("data:image/png;base64,Q09JTg==".to_string()),
        }],
    }]
}

fn seed() -> SessionSeed {
    SessionSeed {
        self_user: User::new(ME, "me", 500),
        opponents: vec![User::new(RIVAL, "rival", 500)],
        catalog: catalog(),
        achievements: vec![Achievement::new(1, "collector", 2).with_reward(10, 0)],
        tasks: Vec::new(),
    }
}

fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.rewards.seed = Some(5);
    config.notifications.motivation_interval_secs = 0;
    config
}

fn owned(id: u64, padding: usize) -> OwnedContainer {
    OwnedContainer {
        id,
        container_id: 1,
        name: "Gold Case".to_string(),
        image: Some(format!("https://cdn.example/cases/{id}?v={}", "p".repeat(padding))),
        obtained_at: t0() + Duration::seconds(i64::try_from(id).unwrap()),
        opened: false,
        prize: None,
    }
}

#[test]
fn test_user_cases_over_budget_keep_last_fifty() {
    let config = EngineConfig::default();
    let layout = StorageLayout::from_config(&config.storage);
    let mut sync = StoreSynchronizer::new(MemoryStore::new(config.storage.quota_bytes), &config.storage);

    // 120 records of ~25 KB: ~3 MB in total, ~2.5 MB for the last 100.
    let mut user_cases: Vec<OwnedContainer> = (1..=120).map(|id| owned(id, 25_000)).collect();
    let outcome = sync.save_list(&layout.user_cases, &mut user_cases);

    assert!(matches!(outcome, SaveOutcome::Trimmed { kept: 50, bytes } if bytes <= 2 * MIB));
    assert_eq!(user_cases.len(), 50);
    assert_eq!(user_cases.first().map(|c| c.id), Some(71));
    assert_eq!(user_cases.last().map(|c| c.id), Some(120));

    let canonical = catalog_values(&catalog()).unwrap();
    let loaded: Vec<OwnedContainer> = sync.load_list(&layout.user_cases, &canonical, Vec::new());
    assert_eq!(loaded, user_cases);
}

#[test]
fn test_inline_images_restored_from_catalog() {
    let config = EngineConfig::default();
    let layout = StorageLayout::from_config(&config.storage);
    let store = MemoryStore::new(config.storage.quota_bytes);
    let mut sync = StoreSynchronizer::new(store.clone(), &config.storage);

    let mut cases = catalog();
    let mut held = vec![OwnedContainer::from_catalog(9, &cases[0], t0())];
    assert!(sync.save_list(&layout.cases, &mut cases).is_stored());
    assert!(sync.save_list(&layout.user_cases, &mut held).is_stored());

    let raw = store.get("userCases").unwrap().unwrap();
    assert!(!raw.contains("data:"), "inline payloads are not persisted");
    assert!(!store.get("cases").unwrap().unwrap().contains("data:"));

    let canonical = catalog_values(&catalog()).unwrap();
    let loaded_cases: Vec<RewardContainer> = sync.load_list(&layout.cases, &canonical, Vec::new());
    assert_eq!(loaded_cases, catalog());

    let loaded_held: Vec<OwnedContainer> = sync.load_list(&layout.user_cases, &canonical, Vec::new());
    assert_eq!(loaded_held, held);
    assert_eq!(loaded_held[0].obtained_at, t0());
}

#[test]
fn test_quota_exhaustion_removes_key() {
    let config = EngineConfig::default();
    let layout = StorageLayout::from_config(&config.storage);
    let mut sync = StoreSynchronizer::new(MemoryStore::new(64 * 1024), &config.storage);

    let mut few = vec![owned(1, 10)];
    assert!(sync.save_list(&layout.user_cases, &mut few).is_stored());

    // Even the last 20 records (~80 KB) exceed the 64 KB store.
    let mut many: Vec<OwnedContainer> = (1..=120).map(|id| owned(id, 4_000)).collect();
    assert_eq!(sync.save_list(&layout.user_cases, &mut many), SaveOutcome::Evicted);
    assert_eq!(sync.store().get("userCases").unwrap(), None);

    let loaded: Vec<OwnedContainer> = sync.load_list(&layout.user_cases, NO_CATALOG, Vec::new());
    assert!(loaded.is_empty());
}

#[test]
fn test_corrupt_slices_fall_back_to_seed() {
    let mut store = MemoryStore::new(MIB);
    store.set(FLAG_DATA_RESET, "true").unwrap();
    store.set("users", "[{\"id\": \"not a number\"}]").unwrap();
    store.set("personalBattles", "{{{{").unwrap();

    let engine = Engine::open(config(), store.clone(), ManualClock::new(t0()), seed()).unwrap();

    assert_eq!(engine.self_user().unwrap().balance, 500);
    assert_eq!(engine.ledger().balance(RIVAL).unwrap(), 500);
    assert!(engine.ledger().invitations().is_empty());
    assert_eq!(store.get("users").unwrap(), None);
    assert_eq!(store.get("personalBattles").unwrap(), None);
}

#[test]
fn test_stored_user_with_absurd_level_stays_usable() {
    let mut store = MemoryStore::new(MIB);
    store.set(FLAG_DATA_RESET, "true").unwrap();
    store
        .set(
            "users",
            r#"[{"id":1,"name":"me","level":4000000000,"experience":0,"experienceToNextLevel":100,"balance":500,"rating":1000}]"#,
        )
        .unwrap();

    let mut engine = Engine::open(config(), store, ManualClock::new(t0()), seed()).unwrap();
    let progress = engine.level_progress().unwrap();
    assert!(progress.experience_in_level < progress.experience_to_next_level);

    let task = engine.add_task("recover", 5, 10);
    engine.complete_task(task).unwrap();
    engine.tick();

    let user = engine.self_user().unwrap();
    assert_eq!(user.balance, 505);
    assert!(user.experience < user.experience_to_next_level);
}

#[test]
fn test_session_restores_without_replaying_notifications() {
    let store = MemoryStore::new(MIB);
    let clock = ManualClock::new(t0());

    let mut first = Engine::open(config(), store.clone(), clock.clone(), seed()).unwrap();
    let task = first.add_task("inbox zero", 30, 0);
    first.tick();
    first.complete_task(task).unwrap();
    first.record_progress(1, 1).unwrap();
    let invitation = first.create_invitation(ME, RIVAL, 100).unwrap();
    let battle = first.accept_invitation(invitation).unwrap();
    first.complete_battle(battle, ME).unwrap();
    first.tick();
    first.flush();

    let balance = first.self_user().unwrap().balance;
    let notifications = first.notifications().to_vec();
    assert_eq!(balance, 500 + 30 + 100);
    assert_eq!(first.self_user().unwrap().experience, 50);
    let won = notifications.iter().filter(|n| n.kind == NotificationKind::BattleWon).count();
    assert_eq!(won, 1);
    drop(first);

    let mut second = Engine::open(config(), store, clock, seed()).unwrap();
    assert_eq!(second.self_user().unwrap().balance, balance);
    assert_eq!(second.notifications(), notifications.as_slice());
    assert!(second.tasks()[0].completed);
    assert_eq!(second.achievements()[0].progress, 1);

    let report = second.tick();
    assert_eq!(report.notifications, 0, "restored state is the new baseline");
    assert_eq!(second.self_user().unwrap().balance, balance);
    assert_eq!(second.self_user().unwrap().experience, 50);

    second.record_progress(1, 1).unwrap();
    second.tick();
    assert_eq!(second.self_user().unwrap().balance, balance + 10);
}

#[test]
fn test_legacy_prizes_migrated_once() {
    let mut store = MemoryStore::new(MIB);
    store
        .set(
            "cases",
            r#"[{"id":1,"name":"Gold Case","prizes":[{"id":1,"name":"25 coins","dropChance":1.0,"value":25}]}]"#,
        )
        .unwrap();

    let mut engine = Engine::open(config(), store.clone(), ManualClock::new(t0()), seed()).unwrap();
    assert_eq!(engine.catalog()[0].prizes[0].kind, PrizeKind::Coins);
    assert_eq!(store.get(FLAG_PRIZE_TAGS).unwrap().as_deref(), Some("true"));

    engine.flush();
    assert!(store.get("cases").unwrap().unwrap().contains("\"type\":\"coins\""));

    let reopened = Engine::open(config(), store, ManualClock::new(t0()), seed()).unwrap();
    assert_eq!(reopened.catalog()[0].prizes[0].kind, PrizeKind::Coins);
}

#[test]
fn test_data_reset_clears_user_slices_once() {
    let mut store = MemoryStore::new(MIB);
    store.set("notifications", "[]").unwrap();
    store.set("userCases", "[]").unwrap();

    let mut engine = Engine::open(config(), store.clone(), ManualClock::new(t0()), seed()).unwrap();
    assert_eq!(store.get("notifications").unwrap(), None);
    assert_eq!(store.get(FLAG_DATA_RESET).unwrap().as_deref(), Some("true"));

    engine.flush();
    assert!(store.get("userCases").unwrap().is_some());
    drop(engine);

    Engine::open(config(), store.clone(), ManualClock::new(t0()), seed()).unwrap();
    assert!(store.get("userCases").unwrap().is_some(), "reset runs once");
}

#[test]
fn test_file_store_session() {
    let dir = temp_dir();
    let clock = ManualClock::new(t0());
    {
        let store = FileStore::open(&dir, MIB).unwrap();
        let mut engine = Engine::open(config(), store, clock.clone(), seed()).unwrap();
        engine.begin_container_spin().unwrap();
        engine.resolve_container_spin().unwrap();
        engine.claim_container_spin().unwrap();
        engine.flush();
    }

    let store = FileStore::open(&dir, MIB).unwrap();
    let engine = Engine::open(config(), store, clock, seed()).unwrap();
    assert_eq!(engine.owned_containers().len(), 1);
    assert_eq!(
        engine.owned_containers()[0].image.as_deref(),
        Some("data:image/png;base64,R09MRA==")
    );

    std::fs::remove_dir_all(&dir).ok();
}
