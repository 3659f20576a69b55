//! Training loop: parameters, the booster, and progress logging.

mod logger;
mod trainer;

pub use logger::{TrainingLogger, Verbosity};
pub use trainer::{BoostParams, Booster, FitResult};
