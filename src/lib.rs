//! sgboost: stochastic gradient boosting with pluggable loss distributions.
//!
//! This crate trains additive ensembles of shallow ternary regression trees.
//! Each boosting round draws a stochastic bag, asks the configured loss
//! distribution for a working response (the negative loss gradient), grows a
//! tree by exact split search over precomputed per-feature sort orders, lets
//! the distribution fit the loss-minimizing constant in every leaf, and adds
//! a shrunk copy of the tree to the running prediction.

pub mod data;
pub mod dist;
pub mod error;
pub mod training;
pub mod tree;
pub mod utils;

pub use data::{Bag, DataView, Dataset, FeatureKind, Monotone};
pub use dist::{DistConfig, Distribution, DistributionRegistry, TieMethod};
pub use error::ConfigError;
pub use training::{BoostParams, Booster, FitResult};
