//! Student-t robust regression loss.
//!
//! Minimizes `sum w * ln(df + u^2)` over residuals `u`, which bounds the
//! influence of outliers. Constants (the initial estimate and the leaf
//! refits) are robust location M-estimates computed by iteratively
//! reweighted least squares started at the weighted median.

use crate::data::{Bag, DataView, Dataset};
use crate::dist::{deviance_ratio, Distribution};
use crate::tree::Tree;
use crate::utils::{chunked_sum2, parallel_fill, weighted_quantile};

const MAX_IRLS_ITERATIONS: usize = 50;
const IRLS_TOLERANCE: f64 = 1e-8;

/// Location M-estimate for the t likelihood: reweight each observation by
/// `w / (df + u^2)` around the current center and take the weighted mean,
/// iterating to a fixed point.
fn location_m(values: &[f64], weights: &[f64], df: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut center = weighted_quantile(values, Some(weights), 0.5);
    for _ in 0..MAX_IRLS_ITERATIONS {
        let mut num = 0.0;
        let mut den = 0.0;
        for (&v, &w) in values.iter().zip(weights) {
            let u = v - center;
            let wi = w / (df + u * u);
            num += wi * v;
            den += wi;
        }
        if den <= 0.0 {
            break;
        }
        let next = num / den;
        let done = (next - center).abs() < IRLS_TOLERANCE;
        center = next;
        if done {
            break;
        }
    }
    center
}

#[derive(Debug, Clone)]
pub struct TDist {
    df: f64,
    chunk_size: usize,
}

impl TDist {
    /// `df` must be positive; the registry validates this before
    /// construction.
    pub fn new(df: f64, chunk_size: usize) -> Self {
        Self { df, chunk_size }
    }
}

impl Distribution for TDist {
    fn name(&self) -> &'static str {
        "tdist"
    }

    fn init_estimate(&self, data: &Dataset) -> f64 {
        let values: Vec<f64> = (0..data.n_train())
            .map(|row| data.y(row) - data.offset(row))
            .collect();
        let weights: Vec<f64> = (0..data.n_train()).map(|row| data.weight(row)).collect();
        location_m(&values, &weights, self.df)
    }

    fn working_response(&self, data: &Dataset, _bag: &Bag, f: &[f64], z: &mut [f64]) {
        parallel_fill(z, self.chunk_size, |row| {
            let u = data.y(row) - data.offset(row) - f[row];
            2.0 * u / (self.df + u * u)
        });
    }

    /// Per-leaf M-estimate of the in-bag residuals.
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
        let mut residuals: Vec<Vec<f64>> = vec![Vec::new(); n_slots];
        let mut weights: Vec<Vec<f64>> = vec![Vec::new(); n_slots];
        for row in 0..data.n_train() {
            if !bag.contains(row) {
                continue;
            }
            let slot = assignments[row] as usize;
            residuals[slot].push(data.y(row) - data.offset(row) - f[row]);
            weights[slot].push(data.weight(row));
        }
        for slot in 0..n_slots {
            if residuals[slot].len() < min_obs {
                continue;
            }
            tree.terminal_node_mut(slot).prediction =
                location_m(&residuals[slot], &weights[slot], self.df);
        }
    }

    fn deviance(&self, view: &DataView, f: &[f64]) -> f64 {
        let (loss, weight) = chunked_sum2(view.len(), self.chunk_size, |i| {
            let w = view.weight(i);
            let u = view.y(i) - view.offset(i) - f[i];
            (w * (self.df + u * u).ln(), w)
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
            let u = data.y(row) - data.offset(row) - f[row];
            let v = u - shrinkage * delta[row];
            (
                w * ((self.df + u * u).ln() - (self.df + v * v).ln()),
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

    // ---- location_m Tests ----

    #[test]
    fn location_of_symmetric_sample_is_center() {
        let values = vec![-2.0, -1.0, 0.0, 1.0, 2.0];
        let weights = vec![1.0; 5];
        assert_abs_diff_eq!(location_m(&values, &weights, 4.0), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn location_resists_an_outlier() {
        let mut values = vec![1.0; 9];
        values.push(1000.0);
        let weights = vec![1.0; 10];
        let center = location_m(&values, &weights, 4.0);
        assert!((center - 1.0).abs() < 0.5, "center {center} dragged away");
    }

    #[test]
    fn location_of_empty_sample_is_zero() {
        assert_abs_diff_eq!(location_m(&[], &[], 4.0), 0.0);
    }

    // ---- Distribution Tests ----

    #[test]
    fn working_response_is_bounded() {
        let data = toy(vec![0.0, 1e6]);
        let dist = TDist::new(4.0, 16);
        let mut z = vec![0.0; 2];
        dist.working_response(&data, &Bag::full(&data), &[0.0; 2], &mut z);
        // 2u/(df+u^2) peaks at 1/sqrt(df)
        for v in z {
            assert!(v.abs() <= 1.0 / 4.0f64.sqrt() + 1e-12);
        }
    }

    #[test]
    fn deviance_minimized_near_residual_center() {
        let data = toy(vec![1.0, 1.0, 1.0, 50.0]);
        let dist = TDist::new(4.0, 16);
        let at_center = dist.deviance(&data.train_view(), &[1.0; 4]);
        let at_mean = dist.deviance(&data.train_view(), &[13.25; 4]);
        assert!(at_center < at_mean);
    }

    #[test]
    fn improvement_matches_deviance_difference_on_full_oob() {
        let data = toy(vec![2.0, -3.0, 1.0]);
        let dist = TDist::new(4.0, 16);
        let bag = Bag::new(3); // everything out of bag
        let f = vec![0.5, 0.0, -0.5];
        let delta = vec![0.2, -0.1, 0.3];
        let imp = dist.bag_improvement(&data, &bag, &f, 0.7, &delta);
        let after: Vec<f64> = (0..3).map(|i| f[i] + 0.7 * delta[i]).collect();
        let expected = dist.deviance(&data.train_view(), &f)
            - dist.deviance(&data.train_view(), &after);
        assert_abs_diff_eq!(imp, expected, epsilon = 1e-12);
    }
}
