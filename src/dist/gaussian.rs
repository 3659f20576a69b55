//! Squared-error loss.

use crate::data::{Bag, DataView, Dataset};
use crate::dist::{deviance_ratio, Distribution};
use crate::tree::Tree;
use crate::utils::{chunked_sum2, parallel_fill};

/// Gaussian regression: the working response is the raw residual and the
/// leaf constants fitted by the growth phase (weighted mean residuals) are
/// already loss-minimizing, so the leaf refit is a no-op.
#[derive(Debug, Clone)]
pub struct Gaussian {
    chunk_size: usize,
}

impl Gaussian {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }
}

impl Distribution for Gaussian {
    fn name(&self) -> &'static str {
        "gaussian"
    }

    fn init_estimate(&self, data: &Dataset) -> f64 {
        let (num, den) = chunked_sum2(data.n_train(), self.chunk_size, |row| {
            let w = data.weight(row);
            (w * (data.y(row) - data.offset(row)), w)
        });
        if den > 0.0 {
            num / den
        } else {
            0.0
        }
    }

    fn working_response(&self, data: &Dataset, _bag: &Bag, f: &[f64], z: &mut [f64]) {
        parallel_fill(z, self.chunk_size, |row| {
            data.y(row) - data.offset(row) - f[row]
        });
    }

    fn fit_leaf_constants(
        &self,
        _data: &Dataset,
        _bag: &Bag,
        _f: &[f64],
        _z: &[f64],
        _tree: &mut Tree,
        _assignments: &[u32],
        _min_obs: usize,
    ) {
    }

    fn deviance(&self, view: &DataView, f: &[f64]) -> f64 {
        let (loss, weight) = chunked_sum2(view.len(), self.chunk_size, |i| {
            let w = view.weight(i);
            let r = view.y(i) - view.offset(i) - f[i];
            (w * r * r, w)
        });
        deviance_ratio(loss, weight)
    }

    fn bag_improvement(
        &self,
        data: &Dataset,
        bag: &Bag,
        f: &[f64],
        shrinkage: f64,
        delta: &[f64],
    ) -> f64 {
        let (gain, weight) = chunked_sum2(data.n_train(), self.chunk_size, |row| {
            if bag.contains(row) {
                return (0.0, 0.0);
            }
            let w = data.weight(row);
            let step = shrinkage * delta[row];
            let r = data.y(row) - data.offset(row) - f[row];
            (w * step * (2.0 * r - step), w)
        });
        deviance_ratio(gain, weight)
    }
}

// ============================================================================
// Tests
// ============================================================================
