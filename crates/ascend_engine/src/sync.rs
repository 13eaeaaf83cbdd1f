//! # Persistent Store Synchronizer
//!
//! **Best-effort persistence into a small, fallible store.**
//!
//! Writes never fail towards the caller. Every save reports a [`SaveOutcome`]
//! and the synchronizer decides locally how to degrade:
//!
//! ```text
//! serialize ─► strip inline images ─► fits budget? ──yes──► set ──ok──► Written
//!                                        │                  │
//!                                        no            QuotaExceeded
//!                                        ▼                  ▼
//!                         keep most recent 100 → 50 → 20 (same escalation)
//!                                        │
//!               first trim that fits and writes ──► Trimmed { kept } (Vec truncated)
//!               quota still hit at the last trim ──► Evicted (key removed)
//!               still over budget ─────────────────► Refused (previous value kept)
//! ```
//!
//! Loads never fail either. Unparseable data is discarded and the caller's
//! default is returned. Records that parse are reconciled against the
//! catalog: fields that are missing or null (including stripped images) are
//! filled from the canonical entry, user fields are kept.

use ascend_shared::constants::{
    BINARY_FIELDS, INLINE_DATA_PREFIX, KEY_ACHIEVEMENTS, KEY_CASES, KEY_ITEMS, KEY_NOTIFICATIONS,
    KEY_PERSONAL_BATTLES, KEY_TASKS, KEY_USERS, KEY_USER_CASES,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::StorageConfig;
use crate::error::{StoreError, StoreResult};
use crate::store::KeyValueStore;

/// Empty catalog for keys that do not reconcile.
pub const NO_CATALOG: &[Value] = &[];

// ============================================================================
// Key Descriptors
// ============================================================================

/// Which end of a persisted list holds the most recent entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListOrder {
    /// Appended over time; trimming keeps the tail.
    OldestFirst,
    /// Prepended over time; trimming keeps the head.
    NewestFirst,
}

/// Fields restored from the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Restore {
    /// Any missing field.
    All,
    /// Only the named fields.
    Only(&'static [&'static str]),
}

impl Restore {
    fn allows(self, field: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(fields) => fields.contains(&field),
        }
    }
}

/// How persisted records are matched to catalog entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reconcile {
    /// Field of the persisted record.
    pub join_field: &'static str,
    /// Field of the catalog entry it must equal.
    pub catalog_field: &'static str,
    /// Fields that may be restored.
    pub restore: Restore,
}

/// Descriptor of one persisted key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageKey {
    /// Store key.
    pub name: &'static str,
    /// Largest single write accepted.
    pub budget_bytes: usize,
    /// List orientation, used by trimming.
    pub order: ListOrder,
    /// Catalog join, if the key reconciles.
    pub reconcile: Option<Reconcile>,
}

impl StorageKey {
    /// A plain key with no reconciliation.
    #[must_use]
    pub const fn plain(name: &'static str, budget_bytes: usize, order: ListOrder) -> Self {
        Self {
            name,
            budget_bytes,
            order,
            reconcile: None,
        }
    }
}

/// Every key the engine persists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageLayout {
    /// `cases`: the container catalog, joined to itself by id.
    pub cases: StorageKey,
    /// `userCases`: owned containers, images and names restored from the catalog.
    pub user_cases: StorageKey,
    /// `notifications`: the feed, newest first.
    pub notifications: StorageKey,
    /// `users`: participants.
    pub users: StorageKey,
    /// `personalBattles`: invitations and battles.
    pub personal_battles: StorageKey,
    /// `achievements`
    pub achievements: StorageKey,
    /// `tasks`
    pub tasks: StorageKey,
    /// `items`: claimed item prizes.
    pub items: StorageKey,
}

impl StorageLayout {
    /// Builds the layout with budgets from `config`.
    #[must_use]
    pub fn from_config(config: &StorageConfig) -> Self {
        let default = config.default_budget_bytes;
        Self {
            cases: StorageKey {
                name: KEY_CASES,
                budget_bytes: config.cases_budget_bytes,
                order: ListOrder::OldestFirst,
                reconcile: Some(Reconcile {
                    join_field: "id",
                    catalog_field: "id",
                    restore: Restore::All,
                }),
            },
            user_cases: StorageKey {
                name: KEY_USER_CASES,
                budget_bytes: config.user_cases_budget_bytes,
                order: ListOrder::OldestFirst,
                reconcile: Some(Reconcile {
                    join_field: "containerId",
                    catalog_field: "id",
                    restore: Restore::Only(&["image", "name"]),
                }),
            },
            notifications: StorageKey::plain(KEY_NOTIFICATIONS, default, ListOrder::NewestFirst),
            users: StorageKey::plain(KEY_USERS, default, ListOrder::OldestFirst),
            personal_battles: StorageKey::plain(KEY_PERSONAL_BATTLES, default, ListOrder::OldestFirst),
            achievements: StorageKey::plain(KEY_ACHIEVEMENTS, default, ListOrder::OldestFirst),
            tasks: StorageKey::plain(KEY_TASKS, default, ListOrder::OldestFirst),
            items: StorageKey::plain(KEY_ITEMS, default, ListOrder::OldestFirst),
        }
    }
}

/// Result of a save.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Stored in full.
    Written {
        /// Bytes written.
        bytes: usize,
    },
    /// Stored after keeping only the most recent entries.
    Trimmed {
        /// Entries kept.
        kept: usize,
        /// Bytes written.
        bytes: usize,
    },
    /// Over budget at every trim; the previous value is untouched.
    Refused,
    /// Quota hit at every trim; the key was removed.
    Evicted,
    /// Serialisation or I/O failure; nothing was written.
    Failed,
}

impl SaveOutcome {
    /// True when something was written.
    #[must_use]
    pub const fn is_stored(self) -> bool {
        matches!(self, Self::Written { .. } | Self::Trimmed { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Rejection {
    OverBudget,
    Quota,
}

// ============================================================================
// Synchronizer
// ============================================================================

/// Saves and loads engine state through a [`KeyValueStore`].
#[derive(Debug)]
pub struct StoreSynchronizer<S> {
    store: S,
    trim_steps: Vec<usize>,
    warn_total_bytes: usize,
}

impl<S: KeyValueStore> StoreSynchronizer<S> {
    /// Wraps `store` with the trim and warning settings from `config`.
    #[must_use]
    pub fn new(store: S, config: &StorageConfig) -> Self {
        Self {
            store,
            trim_steps: config.trim_steps.clone(),
            warn_total_bytes: config.warn_total_bytes,
        }
    }

    /// Underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Estimated bytes in use across all keys.
    #[must_use]
    pub fn estimated_total_bytes(&self) -> usize {
        self.store.total_bytes()
    }

    // ------------------------------------------------------------------------
    // Save
    // ------------------------------------------------------------------------

    /// Saves a list, trimming it (in the store and in `items`) if needed.
    pub fn save_list<T: Serialize>(&mut self, key: &StorageKey, items: &mut Vec<T>) -> SaveOutcome {
        let records = match encode_records(items.as_slice()) {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(key = key.name, error = %err, "cannot serialise list");
                return SaveOutcome::Failed;
            }
        };

        let mut rejection = match self.try_write(key, &Value::Array(records.clone())) {
            Ok(bytes) => return SaveOutcome::Written { bytes },
            Err(Some(rejection)) => rejection,
            Err(None) => return SaveOutcome::Failed,
        };

        let len = records.len();
        let steps = self.trim_steps.clone();
        for keep in steps {
            if keep >= len {
                continue;
            }
            let window = match key.order {
                ListOrder::OldestFirst => &records[len - keep..],
                ListOrder::NewestFirst => &records[..keep],
            };
            match self.try_write(key, &Value::Array(window.to_vec())) {
                Ok(bytes) => {
                    match key.order {
                        ListOrder::OldestFirst => {
                            items.drain(..len - keep);
                        }
                        ListOrder::NewestFirst => items.truncate(keep),
                    }
                    tracing::warn!(key = key.name, from = len, kept = keep, bytes, "list trimmed to fit");
                    return SaveOutcome::Trimmed { kept: keep, bytes };
                }
                Err(Some(next)) => rejection = next,
                Err(None) => return SaveOutcome::Failed,
            }
        }

        self.give_up(key, rejection)
    }

    /// Saves a single value. No trimming.
    pub fn save_value<T: Serialize>(&mut self, key: &StorageKey, value: &T) -> SaveOutcome {
        let mut encoded = match serde_json::to_value(value) {
            Ok(encoded) => encoded,
            Err(err) => {
                tracing::warn!(key = key.name, error = %err, "cannot serialise value");
                return SaveOutcome::Failed;
            }
        };
        strip_binary(&mut encoded);

        match self.try_write(key, &encoded) {
            Ok(bytes) => SaveOutcome::Written { bytes },
            Err(Some(rejection)) => self.give_up(key, rejection),
            Err(None) => SaveOutcome::Failed,
        }
    }

    /// Serialises and writes. `Err(None)` is a hard failure.
    fn try_write(&mut self, key: &StorageKey, value: &Value) -> Result<usize, Option<Rejection>> {
        let json = serde_json::to_string(value).map_err(|err| {
            tracing::warn!(key = key.name, error = %err, "cannot encode value");
            None::<Rejection>
        })?;
        if json.len() > key.budget_bytes {
            tracing::debug!(key = key.name, bytes = json.len(), budget = key.budget_bytes, "over budget");
            return Err(Some(Rejection::OverBudget));
        }

        match self.store.set(key.name, &json) {
            Ok(()) => {
                self.check_total();
                Ok(json.len())
            }
            Err(StoreError::QuotaExceeded { attempted, available, .. }) => {
                tracing::debug!(key = key.name, attempted, available, "quota exceeded");
                Err(Some(Rejection::Quota))
            }
            Err(err) => {
                tracing::warn!(key = key.name, error = %err, "store write failed");
                Err(None)
            }
        }
    }

    fn give_up(&mut self, key: &StorageKey, rejection: Rejection) -> SaveOutcome {
        match rejection {
            Rejection::OverBudget => {
                tracing::warn!(key = key.name, budget = key.budget_bytes, "write refused, over budget");
                SaveOutcome::Refused
            }
            Rejection::Quota => {
                if let Err(err) = self.store.remove(key.name) {
                    tracing::warn!(key = key.name, error = %err, "cannot remove key after quota failure");
                    return SaveOutcome::Failed;
                }
                tracing::warn!(key = key.name, "quota exhausted, key removed");
                SaveOutcome::Evicted
            }
        }
    }

    fn check_total(&self) {
        let total = self.store.total_bytes();
        if total > self.warn_total_bytes {
            tracing::warn!(total, limit = self.warn_total_bytes, "store usage above warning threshold");
        }
    }

    // ------------------------------------------------------------------------
    // Load
    // ------------------------------------------------------------------------

    /// Loads a list, reconciled against `catalog`.
    ///
    /// Returns `default` when nothing is stored or the stored value is corrupt.
    pub fn load_list<T: DeserializeOwned>(&mut self, key: &StorageKey, catalog: &[Value], default: Vec<T>) -> Vec<T> {
        self.load_list_with(key, catalog, default, |_| 0)
    }

    /// Like [`StoreSynchronizer::load_list`], running `prepare` on the raw
    /// value before reconciliation. `prepare` returns the number of records
    /// it changed.
    pub fn load_list_with<T, F>(&mut self, key: &StorageKey, catalog: &[Value], default: Vec<T>, prepare: F) -> Vec<T>
    where
        T: DeserializeOwned,
        F: FnOnce(&mut Value) -> usize,
    {
        let mut value = match self.read_json(key) {
            Ok(Some(value)) => value,
            Ok(None) => return default,
            Err(err) => return self.discard(key, &err, default),
        };
        if !value.is_array() {
            let err = StoreError::Corrupt {
                key: key.name.to_string(),
                reason: "expected a list".to_string(),
            };
            return self.discard(key, &err, default);
        }

        let migrated = prepare(&mut value);
        if migrated > 0 {
            tracing::info!(key = key.name, migrated, "persisted records migrated");
        }
        if let (Some(reconcile), Some(records)) = (key.reconcile, value.as_array_mut()) {
            let restored = reconcile_records(records, catalog, reconcile);
            if restored > 0 {
                tracing::debug!(key = key.name, restored, "fields restored from catalog");
            }
        }

        match serde_json::from_value(value) {
            Ok(parsed) => parsed,
            Err(err) => {
                let err = StoreError::Corrupt {
                    key: key.name.to_string(),
                    reason: err.to_string(),
                };
                self.discard(key, &err, default)
            }
        }
    }

    /// Loads a single value.
    pub fn load_value<T: DeserializeOwned>(&mut self, key: &StorageKey, default: T) -> T {
        let value = match self.read_json(key) {
            Ok(Some(value)) => value,
            Ok(None) => return default,
            Err(err) => return self.discard(key, &err, default),
        };
        match serde_json::from_value(value) {
            Ok(parsed) => parsed,
            Err(err) => {
                let err = StoreError::Corrupt {
                    key: key.name.to_string(),
                    reason: err.to_string(),
                };
                self.discard(key, &err, default)
            }
        }
    }

    fn read_json(&self, key: &StorageKey) -> StoreResult<Option<Value>> {
        let Some(raw) = self.store.get(key.name)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw).map(Some).map_err(|err| StoreError::Corrupt {
            key: key.name.to_string(),
            reason: err.to_string(),
        })
    }

    fn discard<T>(&mut self, key: &StorageKey, err: &StoreError, default: T) -> T {
        tracing::warn!(key = key.name, error = %err, "discarding unreadable persisted data");
        if let Err(remove_err) = self.store.remove(key.name) {
            tracing::warn!(key = key.name, error = %remove_err, "cannot remove unreadable key");
        }
        default
    }

    /// Removes a key. Returns false if the store failed.
    pub fn clear(&mut self, key: &StorageKey) -> bool {
        match self.store.remove(key.name) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(key = key.name, error = %err, "cannot remove key");
                false
            }
        }
    }

    // ------------------------------------------------------------------------
    // Flags
    // ------------------------------------------------------------------------

    /// True once `flag` has been set.
    #[must_use]
    pub fn flag(&self, flag: &'static str) -> bool {
        matches!(self.store.get(flag), Ok(Some(value)) if value == "true")
    }

    /// Sets `flag`.
    pub fn set_flag(&mut self, flag: &'static str) -> SaveOutcome {
        self.save_value(&StorageKey::plain(flag, 16, ListOrder::OldestFirst), &true)
    }

    /// Runs `f` unless `flag` is set, then sets it. Returns true if `f` ran.
    pub fn run_once<F: FnOnce(&mut Self)>(&mut self, flag: &'static str, f: F) -> bool {
        if self.flag(flag) {
            return false;
        }
        f(self);
        self.set_flag(flag);
        tracing::info!(flag, "one-time migration applied");
        true
    }
}

// ============================================================================
// JSON Helpers
// ============================================================================

fn encode_records<T: Serialize>(items: &[T]) -> serde_json::Result<Vec<Value>> {
    items
        .iter()
        .map(|item| {
            let mut value = serde_json::to_value(item)?;
            strip_binary(&mut value);
            Ok(value)
        })
        .collect()
}

/// Removes inline binary payloads (`image: "data:..."`) at any depth.
///
/// Returns the number of fields removed.
pub fn strip_binary(value: &mut Value) -> usize {
    match value {
        Value::Object(map) => {
            let mut stripped = 0;
            for field in BINARY_FIELDS {
                let inline = map
                    .get(field)
                    .and_then(Value::as_str)
                    .is_some_and(|s| s.starts_with(INLINE_DATA_PREFIX));
                if inline {
                    map.remove(field);
                    stripped += 1;
                }
            }
            stripped + map.values_mut().map(strip_binary).sum::<usize>()
        }
        Value::Array(items) => items.iter_mut().map(strip_binary).sum(),
        _ => 0,
    }
}

/// Fills fields of `target` that are missing or null from `source`.
///
/// Nested objects are merged recursively and arrays of objects are matched
/// by `id`. Values already present in `target` are never replaced.
/// `restore` limits which top-level fields may be filled.
///
/// Returns the number of fields filled.
pub fn merge_missing(target: &mut Value, source: &Value, restore: Restore) -> usize {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => merge_objects(target, source, restore),
        _ => 0,
    }
}

fn merge_objects(target: &mut Map<String, Value>, source: &Map<String, Value>, restore: Restore) -> usize {
    let mut restored = 0;
    for (field, canonical) in source {
        if !restore.allows(field) {
            continue;
        }
        let missing = matches!(target.get(field), None | Some(Value::Null));
        if missing {
            target.insert(field.clone(), canonical.clone());
            restored += 1;
            continue;
        }
        match (target.get_mut(field), canonical) {
            (Some(Value::Object(nested)), Value::Object(canonical)) => {
                restored += merge_objects(nested, canonical, Restore::All);
            }
            (Some(Value::Array(items)), Value::Array(canonical)) => {
                restored += merge_by_id(items, canonical);
            }
            _ => {}
        }
    }
    restored
}

fn merge_by_id(items: &mut [Value], canonical: &[Value]) -> usize {
    let mut restored = 0;
    for item in items {
        let Some(id) = item.get("id").cloned() else {
            continue;
        };
        if let Some(source) = canonical.iter().find(|c| c.get("id") == Some(&id)) {
            restored += merge_missing(item, source, Restore::All);
        }
    }
    restored
}

fn reconcile_records(records: &mut [Value], catalog: &[Value], reconcile: Reconcile) -> usize {
    let mut restored = 0;
    for record in records {
        let Some(join) = record.get(reconcile.join_field).cloned() else {
            continue;
        };
        if let Some(entry) = catalog
            .iter()
            .find(|entry| entry.get(reconcile.catalog_field) == Some(&join))
        {
            restored += merge_missing(record, entry, reconcile.restore);
        }
    }
    restored
}

/// Converts catalog records into the form `load_list` reconciles against.
///
/// # Errors
///
/// Returns `StoreError::Serialize` if a record cannot be serialised.
pub fn catalog_values<T: Serialize>(catalog: &[T]) -> StoreResult<Vec<Value>> {
    catalog
        .iter()
        .map(|entry| serde_json::to_value(entry).map_err(StoreError::from))
        .collect()
}
