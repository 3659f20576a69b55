//! Per-round progress reporting through the `log` facade.

/// How much the trainer reports while fitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// No per-round output.
    #[default]
    Silent,
    /// Every tenth round plus the last one.
    Progress,
    /// Every round.
    Detailed,
}

/// Emits training progress via `log::info!`; consumers install whatever
/// logger backend they like.
#[derive(Debug, Clone)]
pub struct TrainingLogger {
    verbosity: Verbosity,
    n_rounds: usize,
}

impl TrainingLogger {
    pub fn new(verbosity: Verbosity, n_rounds: usize) -> Self {
        Self {
            verbosity,
            n_rounds,
        }
    }

    /// Whether the given zero-based round should be reported.
    pub fn reports(&self, round: usize) -> bool {
        match self.verbosity {
            Verbosity::Silent => false,
            Verbosity::Progress => (round + 1) % 10 == 0 || round + 1 == self.n_rounds,
            Verbosity::Detailed => true,
        }
    }

    pub fn start(&self, family: &str, init_estimate: f64) {
        if self.verbosity != Verbosity::Silent {
            log::info!(
                "fitting {family} for {} rounds, initial estimate {init_estimate:.6}",
                self.n_rounds
            );
        }
    }

    pub fn round(&self, round: usize, train: f64, valid: f64, oob: f64) {
        if !self.reports(round) {
            return;
        }
        if valid.is_nan() {
            log::info!(
                "round {:>4}  train {train:.6}  oob improvement {oob:.6}",
                round + 1
            );
        } else {
            log::info!(
                "round {:>4}  train {train:.6}  valid {valid:.6}  oob improvement {oob:.6}",
                round + 1
            );
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
