//! Loss distributions.
//!
//! A [`Distribution`] turns a supervised objective into the operations the
//! booster needs each round: an initial constant, a working response (the
//! negative loss gradient), loss-minimizing leaf constants for a freshly
//! grown tree, a weighted mean deviance, and an out-of-bag improvement
//! estimate for the shrunk step. Families are constructed by name through
//! [`DistributionRegistry`]; auxiliary parameters travel in [`DistConfig`].
//!
//! Numeric degeneracies inside a round are never errors: a zero-weight
//! deviance partition yields `NaN` or a signed infinity, and a singular
//! Newton step zeroes the affected leaves. Only construction fails.

mod adaboost;
mod bernoulli;
mod coxph;
mod gamma;
mod gaussian;
mod huberized;
mod pairwise;
mod poisson;
mod tdist;

pub use adaboost::AdaBoost;
pub use bernoulli::Bernoulli;
pub use coxph::{CoxPh, TieMethod};
pub use gamma::Gamma;
pub use gaussian::Gaussian;
pub use huberized::Huberized;
pub use pairwise::Pairwise;
pub use poisson::Poisson;
pub use tdist::TDist;

use std::collections::HashMap;

use crate::data::{Bag, DataView, Dataset};
use crate::error::ConfigError;
use crate::tree::Tree;
use crate::utils::DEFAULT_CHUNK_SIZE;

// ============================================================================
// Trait
// ============================================================================

/// One loss family, as seen by the booster.
///
/// `f` arrays hold the fitted model term only; every family adds the
/// dataset's fixed offset itself. `working_response`, `fit_leaf_constants`
/// and `bag_improvement` index `f` by training row; `deviance` receives a
/// partition-local slice matching its view.
pub trait Distribution: std::fmt::Debug {
    /// Registry name of the family.
    fn name(&self) -> &'static str;

    /// One-time setup against the dataset; validates that family-specific
    /// inputs (survival records, ranking groups) are present.
    fn init(&mut self, _data: &Dataset) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Closed-form constant minimizing the loss with zero tree contribution.
    fn init_estimate(&self, data: &Dataset) -> f64;

    /// Write the negative loss gradient for every training row into `z`.
    fn working_response(&self, data: &Dataset, bag: &Bag, f: &[f64], z: &mut [f64]);

    /// Overwrite the terminal-node predictions of `tree` with the
    /// loss-minimizing constant per leaf, computed from the in-bag rows.
    /// Leaves with fewer than `min_obs` in-bag rows keep the constant the
    /// growth phase gave them.
    fn fit_leaf_constants(
        &self,
        data: &Dataset,
        bag: &Bag,
        f: &[f64],
        z: &[f64],
        tree: &mut Tree,
        assignments: &[u32],
        min_obs: usize,
    );

    /// Weighted mean loss over one partition.
    fn deviance(&self, view: &DataView, f: &[f64]) -> f64;

    /// Weighted mean loss reduction on the out-of-bag rows for the step
    /// `f + shrinkage * delta`.
    fn bag_improvement(
        &self,
        data: &Dataset,
        bag: &Bag,
        f: &[f64],
        shrinkage: f64,
        delta: &[f64],
    ) -> f64;
}

// ============================================================================
// Configuration and registry
// ============================================================================

/// Family selection plus auxiliary parameters.
#[derive(Debug, Clone)]
pub struct DistConfig {
    /// Case-sensitive registry name.
    pub family: String,
    /// Degrees of freedom for the Student-t family.
    pub df: Option<f64>,
    /// Tie handling for the Cox family.
    pub ties: TieMethod,
    /// Rows per parallel reduction chunk.
    pub chunk_size: usize,
}

impl DistConfig {
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            df: None,
            ties: TieMethod::Efron,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_df(mut self, df: f64) -> Self {
        self.df = Some(df);
        self
    }

    pub fn with_ties(mut self, ties: TieMethod) -> Self {
        self.ties = ties;
        self
    }
}

type Factory = fn(&DistConfig) -> Result<Box<dyn Distribution>, ConfigError>;

/// Name-to-factory table for the loss families.
pub struct DistributionRegistry {
    factories: HashMap<&'static str, Factory>,
}

impl DistributionRegistry {
    /// Registry holding every built-in family.
    pub fn standard() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("gaussian", |c| Ok(Box::new(Gaussian::new(c.chunk_size))));
        registry.register("bernoulli", |c| Ok(Box::new(Bernoulli::new(c.chunk_size))));
        registry.register("poisson", |c| Ok(Box::new(Poisson::new(c.chunk_size))));
        registry.register("gamma", |c| Ok(Box::new(Gamma::new(c.chunk_size))));
        registry.register("adaboost", |c| Ok(Box::new(AdaBoost::new(c.chunk_size))));
        registry.register("huberized", |c| Ok(Box::new(Huberized::new(c.chunk_size))));
        registry.register("tdist", |c| {
            let df = c.df.ok_or(ConfigError::MissingParameter {
                family: "tdist",
                parameter: "df",
            })?;
            if !(df > 0.0) {
                return Err(ConfigError::InvalidParameter {
                    family: "tdist",
                    parameter: "df",
                    value: df,
                });
            }
            Ok(Box::new(TDist::new(df, c.chunk_size)))
        });
        registry.register("coxph", |c| Ok(Box::new(CoxPh::new(c.ties))));
        registry.register("pairwise", |_| Ok(Box::new(Pairwise::new())));
        registry
    }

    /// Add or replace a factory.
    pub fn register(&mut self, name: &'static str, factory: Factory) {
        self.factories.insert(name, factory);
    }

    /// Construct the family named in `config`.
    pub fn create(&self, config: &DistConfig) -> Result<Box<dyn Distribution>, ConfigError> {
        match self.factories.get(config.family.as_str()) {
            Some(factory) => factory(config),
            None => Err(ConfigError::UnknownDistribution(config.family.clone())),
        }
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Weighted mean loss with the degenerate-partition sentinels: zero weight
/// and zero loss is `NaN`, zero weight with nonzero loss is a signed
/// infinity carrying the sign of the loss.
pub(crate) fn deviance_ratio(loss: f64, weight: f64) -> f64 {
    if weight == 0.0 {
        if loss == 0.0 {
            f64::NAN
        } else {
            f64::INFINITY.copysign(loss)
        }
    } else {
        loss / weight
    }
}

/// Per-leaf numerator/denominator refit shared by the ratio families.
///
/// Folds `terms(row) = (num, den)` over the in-bag rows of each terminal
/// slot and writes `num/den` (optionally capped to `[-cap, cap]`) as the
/// leaf prediction. A zero denominator yields 0.0; slots with fewer than
/// `min_obs` in-bag rows keep their grown prediction.
pub(crate) fn fit_leaf_ratios<F>(
    data: &Dataset,
    bag: &Bag,
    tree: &mut Tree,
    assignments: &[u32],
    min_obs: usize,
    terms: F,
    cap: Option<f64>,
) where
    F: Fn(usize) -> (f64, f64),
{
    let n_slots = tree.n_terminals();
    let mut num = vec![0.0; n_slots];
    let mut den = vec![0.0; n_slots];
    let mut count = vec![0usize; n_slots];
    for row in 0..data.n_train() {
        if !bag.contains(row) {
            continue;
        }
        let slot = assignments[row] as usize;
        let (n, d) = terms(row);
        num[slot] += n;
        den[slot] += d;
        count[slot] += 1;
    }
    for slot in 0..n_slots {
        if count[slot] < min_obs {
            continue;
        }
        let mut value = if den[slot] != 0.0 {
            num[slot] / den[slot]
        } else {
            0.0
        };
        if let Some(cap) = cap {
            value = value.clamp(-cap, cap);
        }
        tree.terminal_node_mut(slot).prediction = value;
    }
}

/// Cap applied to the log-scale leaf constants of the count families.
pub(crate) const LEAF_CAP: f64 = 19.0;

// ============================================================================
// Tests
// ============================================================================
