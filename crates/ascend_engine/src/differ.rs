//! # Snapshot Differ
//!
//! **Change detection by comparison** - a transition is whatever differs
//! from the previous tick.
//!
//! The differ keeps one private baseline per named collection: the watched
//! fields of every entity, keyed by id. Each `diff` call compares the current
//! slice against that baseline, reports what changed, then replaces the
//! baseline. A change is therefore reported on exactly one tick.
//!
//! ```text
//! tick N-1 baseline        tick N slice            events
//! { 7: unlocked=false } ─► { 7: unlocked=true }  ─► Transitioned(7, unlocked, false→true)
//!                          { 9: unlocked=false } ─► Created(9)
//! ```
//!
//! The first call for a collection establishes the baseline and reports
//! nothing, so restoring a session does not replay history. Removed ids are
//! not reported.

use std::collections::HashMap;

use ascend_shared::{Achievement, Battle, BattleInvitation, Task};

/// Collection name used for achievements.
pub const ACHIEVEMENTS: &str = "achievements";
/// Collection name used for tasks.
pub const TASKS: &str = "tasks";
/// Collection name used for invitations.
pub const INVITATIONS: &str = "invitations";
/// Collection name used for battles.
pub const BATTLES: &str = "battles";

/// An entity whose transitions are detected by snapshot comparison.
pub trait Diffable {
    /// Stable identifier within its collection.
    fn entity_id(&self) -> u64;

    /// Watched fields as `(name, rendered value)` pairs.
    fn watched_fields(&self) -> Vec<(&'static str, String)>;
}

impl Diffable for Achievement {
    fn entity_id(&self) -> u64 {
        self.id
    }

    fn watched_fields(&self) -> Vec<(&'static str, String)> {
        vec![("unlocked", self.unlocked.to_string())]
    }
}

impl Diffable for Task {
    fn entity_id(&self) -> u64 {
        self.id
    }

    fn watched_fields(&self) -> Vec<(&'static str, String)> {
        vec![("completed", self.completed.to_string())]
    }
}

impl Diffable for BattleInvitation {
    fn entity_id(&self) -> u64 {
        self.id
    }

    fn watched_fields(&self) -> Vec<(&'static str, String)> {
        vec![("status", self.status.as_str().to_string())]
    }
}

impl Diffable for Battle {
    fn entity_id(&self) -> u64 {
        self.id
    }

    fn watched_fields(&self) -> Vec<(&'static str, String)> {
        vec![("status", self.status.as_str().to_string())]
    }
}

/// What happened to an entity between two snapshots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeltaKind {
    /// The id was not in the baseline.
    Created,
    /// A watched field changed value.
    Transitioned {
        /// Field name.
        field: &'static str,
        /// Value in the baseline.
        from: String,
        /// Value now.
        to: String,
    },
}

/// One detected change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffEvent {
    /// Collection the entity belongs to.
    pub collection: &'static str,
    /// Entity id.
    pub id: u64,
    /// Change.
    pub kind: DeltaKind,
}

impl DiffEvent {
    /// True for a transition of `field` to `"true"`, or for a new entity.
    ///
    /// Callers check the entity's current flag; a new entity only counts
    /// when it arrived with the flag already set.
    #[must_use]
    pub fn is_completion(&self, field: &str) -> bool {
        self.reaches(field, "true")
    }

    /// True for a transition of `field` into `to`, or for a new entity.
    ///
    /// As with [`DiffEvent::is_completion`], a new entity only counts when
    /// its current value is already `to`.
    #[must_use]
    pub fn reaches(&self, field: &str, to: &str) -> bool {
        self.kind == DeltaKind::Created || self.is_transition_to(field, to)
    }

    /// True for a transition of `field` into `to`.
    #[must_use]
    pub fn is_transition_to(&self, field: &str, to: &str) -> bool {
        matches!(&self.kind, DeltaKind::Transitioned { field: f, to: t, .. } if *f == field && t == to)
    }
}

type Baseline = HashMap<u64, Vec<(&'static str, String)>>;

/// Per-collection baselines.
#[derive(Debug, Default)]
pub struct SnapshotDiffer {
    baselines: HashMap<&'static str, Baseline>,
}

impl SnapshotDiffer {
    /// Creates a differ with no baselines.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compares `current` with the baseline for `collection` and replaces
    /// the baseline.
    pub fn diff<T: Diffable>(&mut self, collection: &'static str, current: &[T]) -> Vec<DiffEvent> {
        let snapshot: Baseline = current
            .iter()
            .map(|entity| (entity.entity_id(), entity.watched_fields()))
            .collect();

        let Some(previous) = self.baselines.insert(collection, snapshot) else {
            tracing::debug!(collection, entities = current.len(), "baseline established");
            return Vec::new();
        };

        let mut events = Vec::new();
        for entity in current {
            let id = entity.entity_id();
            let Some(before) = previous.get(&id) else {
                events.push(DiffEvent {
                    collection,
                    id,
                    kind: DeltaKind::Created,
                });
                continue;
            };

            for (field, to) in entity.watched_fields() {
                let from = before
                    .iter()
                    .find(|(name, _)| *name == field)
                    .map(|(_, value)| value.as_str());
                if from != Some(to.as_str()) {
                    events.push(DiffEvent {
                        collection,
                        id,
                        kind: DeltaKind::Transitioned {
                            field,
                            from: from.unwrap_or_default().to_string(),
                            to,
                        },
                    });
                }
            }
        }

        if !events.is_empty() {
            tracing::debug!(collection, changes = events.len(), "snapshot diff");
        }
        events
    }

    /// True once `collection` has a baseline.
    #[must_use]
    pub fn has_baseline(&self, collection: &str) -> bool {
        self.baselines.contains_key(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn t0() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_first_call_is_silent() {
        let mut differ = SnapshotDiffer::new();
        let mut done = Task::new(1, "done");
        done.complete(t0());

        assert!(differ.diff(TASKS, &[done, Task::new(2, "open")]).is_empty());
        assert!(differ.has_baseline(TASKS));
        assert!(!differ.has_baseline(ACHIEVEMENTS));
    }

    #[test]
    fn test_transition_reported_exactly_once() {
        let mut differ = SnapshotDiffer::new();
        let mut achievements = vec![Achievement::new(7, "first steps", 3)];
        differ.diff(ACHIEVEMENTS, &achievements);

        achievements[0].record_progress(3, t0());
        let events = differ.diff(ACHIEVEMENTS, &achievements);
        assert_eq!(
            events,
            vec![DiffEvent {
                collection: ACHIEVEMENTS,
                id: 7,
                kind: DeltaKind::Transitioned {
                    field: "unlocked",
                    from: "false".to_string(),
                    to: "true".to_string(),
                },
            }]
        );
        assert!(events[0].is_transition_to("unlocked", "true"));

        for _ in 0..3 {
            assert!(differ.diff(ACHIEVEMENTS, &achievements).is_empty());
        }
    }

    #[test]
    fn test_new_ids_are_created_and_removals_ignored() {
        let mut differ = SnapshotDiffer::new();
        differ.diff(TASKS, &[Task::new(1, "a")]);

        let events = differ.diff(TASKS, &[Task::new(2, "b")]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, 2);
        assert_eq!(events[0].kind, DeltaKind::Created);
        assert!(events[0].reaches("completed", "true"));
        assert!(!events[0].is_transition_to("completed", "true"));
    }

    #[test]
    fn test_collections_are_independent() {
        let mut differ = SnapshotDiffer::new();
        differ.diff(TASKS, &[Task::new(1, "a")]);
        assert!(differ.diff(ACHIEVEMENTS, &[Achievement::new(1, "a", 1)]).is_empty());
    }
}
