//! Construction-time error types.
//!
//! Configuration and registry lookup failures abort booster construction.
//! Numeric degeneracies that occur inside a boosting round (zero-weight
//! deviance partitions, singular Newton steps) are deliberately *not*
//! errors; they are encoded as sentinel values by the distributions so a
//! long fit never unwinds mid-loop.

/// Errors raised while assembling a booster configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The registry has no factory for the requested family name.
    #[error("unknown distribution family `{0}`")]
    UnknownDistribution(String),

    /// A family-specific auxiliary parameter was not supplied.
    #[error("distribution `{family}` requires `{parameter}`")]
    MissingParameter {
        family: &'static str,
        parameter: &'static str,
    },

    /// A family-specific auxiliary parameter is outside its domain.
    #[error("parameter `{parameter}` of distribution `{family}` is out of domain: {value}")]
    InvalidParameter {
        family: &'static str,
        parameter: &'static str,
        value: f64,
    },
}
