//! # Ascend Engine
//!
//! Session layer of the Ascend progression engine.
//!
//! ## Architecture
//!
//! ```text
//!  user action ──► Engine ──► EscrowLedger / achievements / tasks / spins
//!                    │
//!                  tick()
//!                    ├─► SnapshotDiffer ──► NotificationDeriver ──► NotificationFeed
//!                    │                            │ (rewards)
//!                    │                            ▼
//!                    │                      EscrowLedger ──events──┘
//!                    └─► DelayQueue ──► Flush ──► StoreSynchronizer ──► KeyValueStore
//! ```
//!
//! ## Design Principles
//!
//! 1. **Owned session** - One `Engine` value, every step is `&mut self`
//! 2. **Exactly-once** - Rewards and notifications come only from diffs
//! 3. **Best-effort storage** - Save and load never return errors
//! 4. **Injected time** - The engine reads a [`Clock`], never the wall clock

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod clock;
pub mod config;
pub mod differ;
pub mod engine;
pub mod error;
pub mod migration;
pub mod notify;
pub mod scheduler;
pub mod store;
pub mod sync;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use differ::{DeltaKind, DiffEvent, Diffable, SnapshotDiffer};
pub use engine::{Engine, OpenedPrize, PersonalBattles, SessionSeed, Slice, TickReport};
pub use error::{ConfigError, EngineError, EngineResult, StoreError, StoreResult};
pub use notify::{NotificationDeriver, NotificationFeed};
pub use scheduler::{DelayQueue, ScheduledTask};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use sync::{SaveOutcome, StorageKey, StorageLayout, StoreSynchronizer};
