//! # Weighted Reward Selector
//!
//! **Cumulative-Distribution Draws with a Two-Phase Spin**
//!
//! Drives both reward draws in the economy:
//!
//! - catalog → owned container (weighted by container weight)
//! - owned container → prize (weighted by prize drop chance)
//!
//! ## Algorithm
//!
//! Weights are accumulated once at construction. A draw takes a uniform
//! `u ∈ [0, total)` from the injected generator and returns the first
//! candidate whose cumulative weight exceeds `u`.
//!
//! ## Spin Protocol
//!
//! ```text
//!          begin()           resolve()            claim()
//!   Idle ──────────► Spinning ──────────► ResultReady ──────────► Idle
//!    ▲                  │                     │
//!    └──── discard() ───┴──── discard() ──────┘   (result dropped)
//! ```
//!
//! `claim()` moves the result out of the spin, so a drawn outcome can be
//! applied at most once. A discarded outcome is never applied.

use rand::Rng;
use std::collections::HashMap;
use std::hash::Hash;

use crate::error::{EconomyError, EconomyResult};

/// A validated set of weighted candidates.
#[derive(Clone, Debug)]
pub struct WeightedTable<T> {
    /// Candidates in declaration order.
    items: Vec<T>,
    /// Running sum of weights, parallel to `items`.
    cumulative: Vec<f64>,
    /// Sum of all weights.
    total: f64,
}

impl<T> WeightedTable<T> {
    /// Builds a table from `(candidate, weight)` pairs.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::InvalidConfig` for an empty set, for any
    /// weight that is not a finite number greater than zero, or when the
    /// weights do not sum to a finite total.
    pub fn new(candidates: Vec<(T, f64)>) -> EconomyResult<Self> {
        if candidates.is_empty() {
            return Err(EconomyError::InvalidConfig(
                "weighted draw needs at least one candidate".to_string(),
            ));
        }

        let mut items = Vec::with_capacity(candidates.len());
        let mut cumulative = Vec::with_capacity(candidates.len());
        let mut total = 0.0;

        for (index, (item, weight)) in candidates.into_iter().enumerate() {
            if !weight.is_finite() || weight <= 0.0 {
                return Err(EconomyError::InvalidConfig(format!(
                    "candidate {index} has non-positive weight {weight}"
                )));
            }
            total += weight;
            items.push(item);
            cumulative.push(total);
        }
        if !total.is_finite() {
            return Err(EconomyError::InvalidConfig(format!(
                "weights of {} candidates sum past the representable range",
                items.len()
            )));
        }

        Ok(Self {
            items,
            cumulative,
            total,
        })
    }

    /// Number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always false; construction rejects empty sets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of weights.
    #[must_use]
    pub const fn total_weight(&self) -> f64 {
        self.total
    }

    /// Probability of the candidate at `index`.
    #[must_use]
    pub fn probability(&self, index: usize) -> Option<f64> {
        let upper = *self.cumulative.get(index)?;
        let lower = if index == 0 { 0.0 } else { self.cumulative[index - 1] };
        Some((upper - lower) / self.total)
    }

    /// Draws the index of one candidate.
    pub fn draw_index<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let roll = rng.gen_range(0.0..self.total);
        // Float accumulation can leave `roll` at the very top edge.
        self.cumulative
            .iter()
            .position(|&upper| roll < upper)
            .unwrap_or(self.items.len() - 1)
    }

    /// Draws one candidate.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> &T {
        &self.items[self.draw_index(rng)]
    }
}

impl<T: Clone + Eq + Hash> WeightedTable<T> {
    /// Runs `iterations` draws and counts how often each candidate came up.
    ///
    /// Used to verify distributions in tests and benchmarks.
    pub fn run_statistics<R: Rng + ?Sized>(&self, rng: &mut R, iterations: u32) -> DrawStatistics<T> {
        let mut stats = DrawStatistics {
            total_draws: 0,
            counts: HashMap::with_capacity(self.items.len()),
        };
        for _ in 0..iterations {
            let item = self.draw(rng).clone();
            *stats.counts.entry(item).or_insert(0) += 1;
            stats.total_draws += 1;
        }
        stats
    }
}

/// Frequencies observed over repeated draws.
#[derive(Clone, Debug)]
pub struct DrawStatistics<T: Eq + Hash> {
    /// Total number of draws performed.
    pub total_draws: u64,
    /// Draw counts per candidate.
    pub counts: HashMap<T, u64>,
}

impl<T: Eq + Hash> DrawStatistics<T> {
    /// Observed frequency of `item` in `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn frequency(&self, item: &T) -> f64 {
        if self.total_draws == 0 {
            return 0.0;
        }
        self.counts.get(item).copied().unwrap_or(0) as f64 / self.total_draws as f64
    }
}

/// State of a [`Spin`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpinState {
    /// No draw in progress.
    Idle,
    /// Locked; waiting for `resolve()`.
    Spinning,
    /// A result is waiting for `claim()`.
    ResultReady,
}

/// Two-phase draw guard.
///
/// One `Spin` admits one draw at a time. The result is only handed out by
/// [`Spin::claim`], which consumes it.
#[derive(Clone, Debug)]
pub struct Spin<T> {
    state: SpinState,
    result: Option<T>,
}

impl<T> Spin<T> {
    /// Creates an idle spin.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SpinState::Idle,
            result: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SpinState {
        self.state
    }

    /// Result waiting to be claimed, if any.
    #[must_use]
    pub const fn pending(&self) -> Option<&T> {
        self.result.as_ref()
    }

    /// Locks the spin.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::InvalidState` unless the spin is idle.
    pub fn begin(&mut self) -> EconomyResult<()> {
        if self.state != SpinState::Idle {
            return Err(EconomyError::InvalidState(format!(
                "spin already in progress ({:?})",
                self.state
            )));
        }
        self.state = SpinState::Spinning;
        Ok(())
    }

    /// Stores a result produced outside the spin.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::InvalidState` unless the spin is spinning.
    pub fn resolve_with(&mut self, result: T) -> EconomyResult<&T> {
        if self.state != SpinState::Spinning {
            return Err(EconomyError::InvalidState(format!(
                "cannot resolve a spin in state {:?}",
                self.state
            )));
        }
        self.state = SpinState::ResultReady;
        let stored: &T = self.result.insert(result);
        Ok(stored)
    }

    /// Moves the result out and returns to idle.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::InvalidState` unless a result is ready.
    pub fn claim(&mut self) -> EconomyResult<T> {
        match (self.state, self.result.take()) {
            (SpinState::ResultReady, Some(result)) => {
                self.state = SpinState::Idle;
                Ok(result)
            }
            (state, result) => {
                self.result = result;
                Err(EconomyError::InvalidState(format!(
                    "nothing to claim in state {state:?}"
                )))
            }
        }
    }

    /// Drops any in-progress or ready result and returns to idle.
    ///
    /// Returns the discarded result, which must not be applied.
    pub fn discard(&mut self) -> Option<T> {
        self.state = SpinState::Idle;
        self.result.take()
    }
}

impl<T: Clone> Spin<T> {
    /// Performs the weighted pick for a spinning draw.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::InvalidState` unless the spin is spinning.
    pub fn resolve<R: Rng + ?Sized>(&mut self, table: &WeightedTable<T>, rng: &mut R) -> EconomyResult<&T> {
        if self.state != SpinState::Spinning {
            return Err(EconomyError::InvalidState(format!(
                "cannot resolve a spin in state {:?}",
                self.state
            )));
        }
        let picked = table.draw(rng).clone();
        self.resolve_with(picked)
    }
}

impl<T> Default for Spin<T> {
    fn default() -> Self {
        Self::new()
    }
}
