//! The boosting loop.
//!
//! One round: redraw the bag, ask the distribution for the working
//! response, grow a tree on the in-bag rows, let the distribution refit the
//! leaf constants, estimate the out-of-bag improvement of the shrunk step,
//! then apply it to the train and validation predictions and record the
//! deviance of both partitions.

use crate::data::{Bag, Dataset};
use crate::dist::{DistConfig, Distribution, DistributionRegistry};
use crate::error::ConfigError;
use crate::training::{TrainingLogger, Verbosity};
use crate::tree::{Tree, TreeGrower};

/// Offset keeping the feature-shuffle seed stream apart from the bag draw's.
const FEATURE_SHUFFLE_STREAM: u64 = 0x9e37_79b9_7f4a_7c15;

/// Training hyperparameters.
#[derive(Debug, Clone)]
pub struct BoostParams {
    pub n_rounds: usize,
    pub shrinkage: f64,
    pub bag_fraction: f64,
    pub max_terminal_nodes: usize,
    pub min_node_obs: usize,
    /// Fraction of features scanned per tree level.
    pub col_fraction: f64,
    pub seed: u64,
    pub verbosity: Verbosity,
}

impl Default for BoostParams {
    fn default() -> Self {
        Self {
            n_rounds: 100,
            shrinkage: 0.1,
            bag_fraction: 0.5,
            max_terminal_nodes: 3,
            min_node_obs: 10,
            col_fraction: 1.0,
            seed: 42,
            verbosity: Verbosity::Silent,
        }
    }
}

/// A fitted ensemble plus its training history.
///
/// Predictions are the fitted model term only; callers add their own
/// offsets where the dataset carried any.
#[derive(Debug, Clone)]
pub struct FitResult {
    pub init_estimate: f64,
    pub shrinkage: f64,
    pub trees: Vec<Tree>,
    pub train_deviance: Vec<f64>,
    pub valid_deviance: Vec<f64>,
    pub oob_improvements: Vec<f64>,
    pub train_predictions: Vec<f64>,
    pub valid_predictions: Vec<f64>,
}

impl FitResult {
    /// Score one row given a feature accessor.
    pub fn predict_row<F>(&self, x: F) -> f64
    where
        F: Fn(usize) -> f64,
    {
        let mut value = self.init_estimate;
        for tree in &self.trees {
            value += self.shrinkage * tree.predict_row(&x);
        }
        value
    }

    /// Score a columnar feature matrix.
    pub fn predict(&self, features: &[Vec<f64>]) -> Vec<f64> {
        let n_rows = features.first().map_or(0, Vec::len);
        (0..n_rows)
            .map(|row| self.predict_row(|feature| features[feature][row]))
            .collect()
    }
}

/// Drives boosting rounds for one distribution.
#[derive(Debug)]
pub struct Booster {
    params: BoostParams,
    dist: Box<dyn Distribution>,
}

impl Booster {
    /// Build from the standard family registry.
    pub fn new(config: &DistConfig, params: BoostParams) -> Result<Self, ConfigError> {
        Self::with_registry(&DistributionRegistry::standard(), config, params)
    }

    pub fn with_registry(
        registry: &DistributionRegistry,
        config: &DistConfig,
        params: BoostParams,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            dist: registry.create(config)?,
            params,
        })
    }

    /// Run the full boosting loop over `data`.
    pub fn fit(&mut self, data: &Dataset) -> Result<FitResult, ConfigError> {
        self.dist.init(data)?;
        let params = &self.params;
        let n_train = data.n_train();
        let n_valid = data.n_valid();

        let init_estimate = self.dist.init_estimate(data);
        let mut f_train = vec![init_estimate; n_train];
        let mut f_valid = vec![init_estimate; n_valid];
        let mut residuals = vec![0.0; n_train];
        let mut bag = Bag::new(n_train);

        let grower = TreeGrower::new(params.max_terminal_nodes, params.min_node_obs)
            .with_col_fraction(params.col_fraction);
        let logger = TrainingLogger::new(params.verbosity, params.n_rounds);
        logger.start(self.dist.name(), init_estimate);

        let mut trees = Vec::with_capacity(params.n_rounds);
        let mut train_deviance = Vec::with_capacity(params.n_rounds);
        let mut valid_deviance = Vec::with_capacity(params.n_rounds);
        let mut oob_improvements = Vec::with_capacity(params.n_rounds);

        for round in 0..params.n_rounds {
            let round_seed = params.seed.wrapping_add(round as u64);
            bag.draw(data, params.bag_fraction, round_seed);

            self.dist.working_response(data, &bag, &f_train, &mut residuals);
            let grown = grower.grow(data, &bag, &residuals, round_seed ^ FEATURE_SHUFFLE_STREAM);
            let mut tree = grown.tree;
            self.dist.fit_leaf_constants(
                data,
                &bag,
                &f_train,
                &residuals,
                &mut tree,
                &grown.assignments,
                params.min_node_obs,
            );

            // unshrunk per-row step, read off the assignment array
            let delta: Vec<f64> = grown
                .assignments
                .iter()
                .map(|&slot| tree.terminal_node(slot as usize).prediction)
                .collect();
            let oob =
                self.dist
                    .bag_improvement(data, &bag, &f_train, params.shrinkage, &delta);

            for row in 0..n_train {
                f_train[row] += params.shrinkage * delta[row];
            }
            // validation rows were never assigned; replay the split rules
            for i in 0..n_valid {
                let row = n_train + i;
                f_valid[i] +=
                    params.shrinkage * tree.predict_row(|feature| data.x(row, feature));
            }

            let train = self.dist.deviance(&data.train_view(), &f_train);
            let valid = if n_valid > 0 {
                self.dist.deviance(&data.validation_view(), &f_valid)
            } else {
                f64::NAN
            };

            logger.round(round, train, valid, oob);
            trees.push(tree);
            train_deviance.push(train);
            valid_deviance.push(valid);
            oob_improvements.push(oob);
        }

        Ok(FitResult {
            init_estimate,
            shrinkage: params.shrinkage,
            trees,
            train_deviance,
            valid_deviance,
            oob_improvements,
            train_predictions: f_train,
            valid_predictions: f_valid,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
