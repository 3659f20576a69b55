//! Logistic loss for 0/1 responses.

use crate::data::{Bag, DataView, Dataset};
use crate::dist::{deviance_ratio, fit_leaf_ratios, Distribution};
use crate::tree::Tree;
use crate::utils::{chunked_sum2, log_one_plus_exp, parallel_fill};

#[derive(Debug, Clone)]
pub struct Bernoulli {
    chunk_size: usize,
}

impl Bernoulli {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }
}

#[inline]
fn sigmoid(eta: f64) -> f64 {
    1.0 / (1.0 + (-eta).exp())
}

impl Distribution for Bernoulli {
    fn name(&self) -> &'static str {
        "bernoulli"
    }

    /// Log-odds of the weighted positive rate.
    fn init_estimate(&self, data: &Dataset) -> f64 {
        let (num, den) = chunked_sum2(data.n_train(), self.chunk_size, |row| {
            let w = data.weight(row);
            (w * data.y(row), w * (1.0 - data.y(row)))
        });
        (num / den).ln()
    }

    fn working_response(&self, data: &Dataset, _bag: &Bag, f: &[f64], z: &mut [f64]) {
        parallel_fill(z, self.chunk_size, |row| {
            data.y(row) - sigmoid(data.offset(row) + f[row])
        });
    }

    /// One Newton step per leaf: residual sum over `p(1-p)` curvature.
    fn fit_leaf_constants(
        &self,
        data: &Dataset,
        bag: &Bag,
        f: &[f64],
        z: &[f64],
        tree: &mut Tree,
        assignments: &[u32],
        min_obs: usize,
    ) {
        fit_leaf_ratios(data, bag, tree, assignments, min_obs, |row| {
            let w = data.weight(row);
            let p = sigmoid(data.offset(row) + f[row]);
            (w * z[row], w * p * (1.0 - p))
        }, None);
    }

    fn deviance(&self, view: &DataView, f: &[f64]) -> f64 {
        let (loss, weight) = chunked_sum2(view.len(), self.chunk_size, |i| {
            let w = view.weight(i);
            let eta = view.offset(i) + f[i];
            (
                -2.0 * w * (view.y(i) * eta - log_one_plus_exp(eta)),
                w,
            )
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
                w * (data.y(row) * step - log_one_plus_exp(eta + step)
                    + log_one_plus_exp(eta)),
                w,
            )
        });
        deviance_ratio(gain, weight)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FeatureKind;
    use approx::assert_abs_diff_eq;

    fn toy(y: Vec<f64>) -> Dataset {
        let n = y.len();
        Dataset::new(
            vec![(0..n).map(|i| i as f64).collect()],
            vec![FeatureKind::Continuous],
            y,
        )
        .unwrap()
    }

    #[test]
    fn init_estimate_is_log_odds() {
        let data = toy(vec![1.0, 1.0, 1.0, 0.0]);
        let dist = Bernoulli::new(16);
        assert_abs_diff_eq!(dist.init_estimate(&data), 3.0f64.ln());
    }

    #[test]
    fn working_response_at_zero_is_centered() {
        let data = toy(vec![1.0, 0.0]);
        let dist = Bernoulli::new(16);
        let mut z = vec![0.0; 2];
        dist.working_response(&data, &Bag::full(&data), &[0.0, 0.0], &mut z);
        assert_abs_diff_eq!(z[0], 0.5);
        assert_abs_diff_eq!(z[1], -0.5);
    }

    #[test]
    fn deviance_at_log_odds_matches_entropy() {
        let data = toy(vec![1.0, 0.0]);
        let dist = Bernoulli::new(16);
        let dev = dist.deviance(&data.train_view(), &[0.0, 0.0]);
        // -2 * mean(y*0 - ln 2) = 2 ln 2
        assert_abs_diff_eq!(dev, 2.0 * 2.0f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn deviance_decreases_toward_truth() {
        let data = toy(vec![1.0, 1.0, 0.0, 0.0]);
        let dist = Bernoulli::new(16);
        let flat = dist.deviance(&data.train_view(), &[0.0; 4]);
        let sharp = dist.deviance(&data.train_view(), &[3.0, 3.0, -3.0, -3.0]);
        assert!(sharp < flat);
    }

    #[test]
    fn improvement_positive_for_correct_step() {
        let data = toy(vec![1.0, 1.0, 0.0, 0.0]);
        let dist = Bernoulli::new(16);
        let mut bag = Bag::new(4);
        bag.draw(&data, 0.5, 1);
        let delta = vec![1.0, 1.0, -1.0, -1.0];
        let imp = dist.bag_improvement(&data, &bag, &[0.0; 4], 0.5, &delta);
        assert!(imp > 0.0);
    }
}
