//! # Ascend Economy System
//!
//! Pure Rust economic logic for the Ascend progression engine.
//!
//! ## Design Principles
//!
//! 1. **Single writer** - Only [`EscrowLedger`] mutates balances
//! 2. **Deterministic leveling** - Level is a pure function of cumulative experience
//! 3. **Injected randomness** - Every draw takes a caller-supplied `rand::Rng`
//! 4. **Explicit outcomes** - Failures are `EconomyError` values, never panics
//!
//! ## Example
//!
//! ```rust,ignore
//! use ascend_economy::{EscrowLedger, WeightedTable};
//!
//! let mut ledger = EscrowLedger::new(users, 86_400);
//! let invitation = ledger.create_invitation(me, rival, 150, now)?;
//! let battle = ledger.accept_invitation(invitation, now)?;
//! ledger.complete_battle(battle, rival, now)?;
//!
//! let table = WeightedTable::new(vec![("common", 3.0), ("rare", 1.0)])?;
//! let prize = table.draw(&mut rng);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod ledger;
pub mod leveling;
pub mod reward;

pub use error::{EconomyError, EconomyResult};
pub use ledger::EscrowLedger;
pub use leveling::{apply_experience_delta, cumulative_experience, level_of, LevelProgress, LevelUp};
pub use reward::{Spin, SpinState, WeightedTable};
