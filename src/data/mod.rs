//! Training data: columnar datasets, survival records, and the bag.

mod bag;
mod dataset;
mod survival;

pub use bag::Bag;
pub use dataset::{DataView, Dataset, DatasetError, FeatureKind, Monotone, Partition};
pub use survival::{PartitionOrders, SurvivalData, SurvivalRecords};
