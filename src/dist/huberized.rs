//! Huberized hinge loss for 0/1 responses.
//!
//! Quadratic hinge `(1 - m)^2` on margins in `[-1, 1]`, linear `-4m` below,
//! zero above: a classification margin loss that stays differentiable at
//! the hinge and robust to far-side outliers.

use crate::data::{Bag, DataView, Dataset};
use crate::dist::{deviance_ratio, fit_leaf_ratios, Distribution};
use crate::tree::Tree;
use crate::utils::{chunked_sum2, parallel_fill};

#[derive(Debug, Clone)]
pub struct Huberized {
    chunk_size: usize,
}

impl Huberized {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }
}

#[inline]
fn margin_loss(m: f64) -> f64 {
    if m < -1.0 {
        -4.0 * m
    } else if m <= 1.0 {
        (1.0 - m) * (1.0 - m)
    } else {
        0.0
    }
}

/// Negative gradient of [`margin_loss`] with respect to the prediction.
#[inline]
fn margin_grad(s: f64, m: f64) -> f64 {
    if m < -1.0 {
        4.0 * s
    } else if m <= 1.0 {
        2.0 * s * (1.0 - m)
    } else {
        0.0
    }
}

impl Distribution for Huberized {
    fn name(&self) -> &'static str {
        "huberized"
    }

    fn init_estimate(&self, _data: &Dataset) -> f64 {
        0.0
    }

    fn working_response(&self, data: &Dataset, _bag: &Bag, f: &[f64], z: &mut [f64]) {
        parallel_fill(z, self.chunk_size, |row| {
            let s = 2.0 * data.y(row) - 1.0;
            margin_grad(s, s * (data.offset(row) + f[row]))
        });
    }

    /// Gradient mean per leaf; rows past the hinge contribute nothing.
    fn fit_leaf_constants(
        &self,
        data: &Dataset,
        bag: &Bag,
        _f: &[f64],
        z: &[f64],
        tree: &mut Tree,
        assignments: &[u32],
        min_obs: usize,
    ) {
        fit_leaf_ratios(data, bag, tree, assignments, min_obs, |row| {
            let w = data.weight(row);
            (w * z[row], w)
        }, None);
    }

    fn deviance(&self, view: &DataView, f: &[f64]) -> f64 {
        let (loss, weight) = chunked_sum2(view.len(), self.chunk_size, |i| {
            let w = view.weight(i);
            let s = 2.0 * view.y(i) - 1.0;
            (w * margin_loss(s * (view.offset(i) + f[i])), w)
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
            let s = 2.0 * data.y(row) - 1.0;
            let eta = data.offset(row) + f[row];
            let step = shrinkage * delta[row];
            (
                w * (margin_loss(s * eta) - margin_loss(s * (eta + step))),
                w,
            )
        });
        deviance_ratio(gain, weight)
    }
}

// ============================================================================
// Tests
// ============================================================================
