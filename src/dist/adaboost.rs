//! Exponential (AdaBoost) loss for 0/1 responses.

use crate::data::{Bag, DataView, Dataset};
use crate::dist::{deviance_ratio, fit_leaf_ratios, Distribution};
use crate::tree::Tree;
use crate::utils::{chunked_sum2, parallel_fill};

#[derive(Debug, Clone)]
pub struct AdaBoost {
    chunk_size: usize,
}

impl AdaBoost {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }
}

/// Response recoded to the -1/+1 margin convention.
#[inline]
fn sign_of(y: f64) -> f64 {
    2.0 * y - 1.0
}

impl Distribution for AdaBoost {
    fn name(&self) -> &'static str {
        "adaboost"
    }

    /// Half log ratio of the offset-discounted class masses.
    fn init_estimate(&self, data: &Dataset) -> f64 {
        let (num, den) = chunked_sum2(data.n_train(), self.chunk_size, |row| {
            let w = data.weight(row);
            let y = data.y(row);
            (
                w * y * (-data.offset(row)).exp(),
                w * (1.0 - y) * data.offset(row).exp(),
            )
        });
        0.5 * (num / den).ln()
    }

    fn working_response(&self, data: &Dataset, _bag: &Bag, f: &[f64], z: &mut [f64]) {
        parallel_fill(z, self.chunk_size, |row| {
            let s = sign_of(data.y(row));
            -s * (-s * (data.offset(row) + f[row])).exp()
        });
    }

    /// Weighted sign ratio under the exponential reweighting.
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
        fit_leaf_ratios(data, bag, tree, assignments, min_obs, |row| {
            let s = sign_of(data.y(row));
            let rw = data.weight(row) * (-s * (data.offset(row) + f[row])).exp();
            (rw * s, rw)
        }, None);
    }

    fn deviance(&self, view: &DataView, f: &[f64]) -> f64 {
        let (loss, weight) = chunked_sum2(view.len(), self.chunk_size, |i| {
            let w = view.weight(i);
            let s = sign_of(view.y(i));
            (w * (-s * (view.offset(i) + f[i])).exp(), w)
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
            let s = sign_of(data.y(row));
            let eta = data.offset(row) + f[row];
            let step = shrinkage * delta[row];
            (
                w * ((-s * eta).exp() - (-s * (eta + step)).exp()),
                w,
            )
        });
        deviance_ratio(gain, weight)
    }
}

// ============================================================================
// Tests
// ============================================================================
