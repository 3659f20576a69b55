//! Poisson log-linear loss for count responses.

use crate::data::{Bag, DataView, Dataset};
use crate::dist::{deviance_ratio, Distribution, LEAF_CAP};
use crate::tree::Tree;
use crate::utils::{chunked_sum2, parallel_fill};

#[derive(Debug, Clone)]
pub struct Poisson {
    chunk_size: usize,
}

impl Poisson {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }
}

impl Distribution for Poisson {
    fn name(&self) -> &'static str {
        "poisson"
    }

    /// Log of the weighted count total over the weighted exposure.
    fn init_estimate(&self, data: &Dataset) -> f64 {
        let (num, den) = chunked_sum2(data.n_train(), self.chunk_size, |row| {
            let w = data.weight(row);
            (w * data.y(row), w * data.offset(row).exp())
        });
        (num / den).ln()
    }

    fn working_response(&self, data: &Dataset, _bag: &Bag, f: &[f64], z: &mut [f64]) {
        parallel_fill(z, self.chunk_size, |row| {
            data.y(row) - (data.offset(row) + f[row]).exp()
        });
    }

    /// Leaf constant is the log ratio of observed to expected counts,
    /// capped on the log scale; an all-zero count leaf takes the lower cap
    /// and a zero expectation leaves the leaf at 0.0.
    fn fit_leaf_constants(
        &self,
        data: &Dataset,
        bag: &Bag,
        f: &[f64],
        _z: &[f64],
        tree: &mut Tree,
        assignments: &[u32],
        min_obs: usize,
    ) {
        let n_slots = tree.n_terminals();
        let mut num = vec![0.0; n_slots];
        let mut den = vec![0.0; n_slots];
        let mut count = vec![0usize; n_slots];
        for row in 0..data.n_train() {
            if !bag.contains(row) {
                continue;
            }
            let slot = assignments[row] as usize;
            let w = data.weight(row);
            num[slot] += w * data.y(row);
            den[slot] += w * (data.offset(row) + f[row]).exp();
            count[slot] += 1;
        }
        for slot in 0..n_slots {
            if count[slot] < min_obs {
                continue;
            }
            let value = if num[slot] == 0.0 {
                -LEAF_CAP
            } else if den[slot] == 0.0 {
                0.0
            } else {
                (num[slot] / den[slot]).ln()
            };
            tree.terminal_node_mut(slot).prediction = value.clamp(-LEAF_CAP, LEAF_CAP);
        }
    }

    /// Full Poisson deviance, zero at a saturated fit.
    fn deviance(&self, view: &DataView, f: &[f64]) -> f64 {
        let (loss, weight) = chunked_sum2(view.len(), self.chunk_size, |i| {
            let w = view.weight(i);
            let y = view.y(i);
            let mu = (view.offset(i) + f[i]).exp();
            let ratio_term = if y > 0.0 { y * (y / mu).ln() } else { 0.0 };
            (2.0 * w * (ratio_term - (y - mu)), w)
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
            let eta = data.offset(row) + f[row];
            let step = shrinkage * delta[row];
            (
                2.0 * w * (data.y(row) * step - (eta + step).exp() + eta.exp()),
                w,
            )
        });
        deviance_ratio(gain, weight)
    }
}

// ============================================================================
// Tests
// ============================================================================
