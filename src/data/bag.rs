//! Per-round stochastic training subsample.

use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::data::Dataset;

/// Boolean membership mask over the training rows, redrawn every boosting
/// round. Rows outside the bag form the out-of-bag evaluation set; rows
/// with zero weight are never placed in the bag.
#[derive(Debug, Clone)]
pub struct Bag {
    in_bag: Vec<bool>,
    n_in_bag: usize,
}

impl Bag {
    /// Empty bag over `n_train` rows.
    pub fn new(n_train: usize) -> Self {
        Self {
            in_bag: vec![false; n_train],
            n_in_bag: 0,
        }
    }

    /// Bag containing every positive-weight training row; used when the
    /// bag fraction is 1.0 and by tests that want deterministic fits.
    pub fn full(data: &Dataset) -> Self {
        let mut bag = Self::new(data.n_train());
        for row in 0..data.n_train() {
            if data.weight(row) > 0.0 {
                bag.in_bag[row] = true;
                bag.n_in_bag += 1;
            }
        }
        bag
    }

    /// Redraw the bag: a uniform sample without replacement of `fraction`
    /// of the positive-weight training rows, via a partial Fisher-Yates
    /// shuffle seeded from `seed`.
    pub fn draw(&mut self, data: &Dataset, fraction: f64, seed: u64) {
        self.in_bag.iter_mut().for_each(|b| *b = false);
        self.n_in_bag = 0;

        let mut eligible: Vec<u32> = (0..data.n_train() as u32)
            .filter(|&row| data.weight(row as usize) > 0.0)
            .collect();
        if eligible.is_empty() {
            return;
        }

        let sample_size = if fraction >= 1.0 {
            eligible.len()
        } else {
            (((eligible.len() as f64) * fraction).round() as usize).clamp(1, eligible.len())
        };

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        for i in 0..sample_size {
            let j = rng.gen_range(i..eligible.len());
            eligible.swap(i, j);
        }
        for &row in &eligible[..sample_size] {
            self.in_bag[row as usize] = true;
        }
        self.n_in_bag = sample_size;
    }

    #[inline]
    pub fn contains(&self, row: usize) -> bool {
        self.in_bag[row]
    }

    #[inline]
    pub fn n_in_bag(&self) -> usize {
        self.n_in_bag
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.in_bag.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.in_bag.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FeatureKind;

    fn toy(weights: Vec<f64>) -> Dataset {
        let n = weights.len();
        Dataset::new(
            vec![(0..n).map(|i| i as f64).collect()],
            vec![FeatureKind::Continuous],
            vec![0.0; n],
        )
        .unwrap()
        .with_weights(weights)
        .unwrap()
    }

    #[test]
    fn draw_respects_fraction() {
        let data = toy(vec![1.0; 100]);
        let mut bag = Bag::new(100);
        bag.draw(&data, 0.5, 7);
        assert_eq!(bag.n_in_bag(), 50);
    }

    #[test]
    fn zero_weight_rows_stay_out() {
        let mut weights = vec![1.0; 20];
        weights[3] = 0.0;
        weights[11] = 0.0;
        let data = toy(weights);

        let mut bag = Bag::new(20);
        for seed in 0..20 {
            bag.draw(&data, 1.0, seed);
            assert!(!bag.contains(3));
            assert!(!bag.contains(11));
            assert_eq!(bag.n_in_bag(), 18);
        }
    }

    #[test]
    fn draw_is_reproducible() {
        let data = toy(vec![1.0; 50]);
        let mut a = Bag::new(50);
        let mut b = Bag::new(50);
        a.draw(&data, 0.4, 42);
        b.draw(&data, 0.4, 42);
        assert_eq!(a.in_bag, b.in_bag);
    }

    #[test]
    fn different_seeds_differ() {
        let data = toy(vec![1.0; 50]);
        let mut a = Bag::new(50);
        let mut b = Bag::new(50);
        a.draw(&data, 0.4, 42);
        b.draw(&data, 0.4, 43);
        assert_ne!(a.in_bag, b.in_bag);
    }

    #[test]
    fn full_bag_covers_positive_weights() {
        let mut weights = vec![1.0; 10];
        weights[0] = 0.0;
        let data = toy(weights);
        let bag = Bag::full(&data);
        assert_eq!(bag.n_in_bag(), 9);
        assert!(!bag.contains(0));
    }
}
