//! Pairwise logistic ranking loss over query groups.
//!
//! Every ordered pair `(i, j)` inside one query group with `y_i > y_j`
//! contributes the logistic loss of the score difference. Groups are
//! independent, so the per-row gradients, the deviance, and the out-of-bag
//! improvement all fan out over groups in parallel.

use rayon::prelude::*;

use crate::data::{Bag, DataView, Dataset};
use crate::dist::{deviance_ratio, Distribution};
use crate::error::ConfigError;
use crate::tree::Tree;
use crate::utils::log_one_plus_exp;

#[derive(Debug, Clone, Default)]
pub struct Pairwise;

impl Pairwise {
    pub fn new() -> Self {
        Self
    }
}

/// Contiguous `[start, end)` runs of equal group id, local to a partition.
fn group_ranges(groups: &[u32], base: usize, len: usize) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start = 0usize;
    for i in 1..len {
        if groups[base + i] != groups[base + i - 1] {
            ranges.push((start, i));
            start = i;
        }
    }
    if len > 0 {
        ranges.push((start, len));
    }
    ranges
}

/// Fold `pair(high, low, pair_weight, score_diff)` over every in-group
/// pair with distinct responses, where `score_diff = eta(high) - eta(low)`
/// and `high` ranks above `low`. Returns `(loss_like, weight)` partials
/// combined in group order.
fn reduce_pairs<E, F>(
    view: &DataView,
    ranges: &[(usize, usize)],
    eta: E,
    pair: F,
) -> (f64, f64)
where
    E: Fn(usize) -> f64 + Sync,
    F: Fn(usize, usize, f64, f64) -> (f64, f64) + Sync,
{
    let partials: Vec<(f64, f64)> = ranges
        .par_iter()
        .map(|&(start, end)| {
            let mut acc = (0.0, 0.0);
            for i in start..end {
                for j in i + 1..end {
                    let (hi, lo) = if view.y(i) > view.y(j) {
                        (i, j)
                    } else if view.y(j) > view.y(i) {
                        (j, i)
                    } else {
                        continue;
                    };
                    let pw = view.weight(hi) * view.weight(lo);
                    if pw <= 0.0 {
                        continue;
                    }
                    let (a, b) = pair(hi, lo, pw, eta(hi) - eta(lo));
                    acc.0 += a;
                    acc.1 += b;
                }
            }
            acc
        })
        .collect();
    partials
        .iter()
        .fold((0.0, 0.0), |(a, b), &(x, y)| (a + x, b + y))
}

impl Distribution for Pairwise {
    fn name(&self) -> &'static str {
        "pairwise"
    }

    fn init(&mut self, data: &Dataset) -> Result<(), ConfigError> {
        if data.groups().is_none() {
            return Err(ConfigError::MissingParameter {
                family: "pairwise",
                parameter: "groups",
            });
        }
        Ok(())
    }

    /// Rank loss has no useful global intercept; a constant shift cancels
    /// in every score difference.
    fn init_estimate(&self, _data: &Dataset) -> f64 {
        0.0
    }

    fn working_response(&self, data: &Dataset, _bag: &Bag, f: &[f64], z: &mut [f64]) {
        let Some(groups) = data.groups() else {
            z.fill(0.0);
            return;
        };
        let ranges = group_ranges(groups, 0, data.n_train());

        // carve z into per-group slices so groups can run in parallel
        let mut slices: Vec<(usize, &mut [f64])> = Vec::with_capacity(ranges.len());
        let mut rest = z;
        for &(start, end) in &ranges {
            let (head, tail) = rest.split_at_mut(end - start);
            slices.push((start, head));
            rest = tail;
        }

        slices.par_iter_mut().for_each(|(start, slice)| {
            let start = *start;
            slice.fill(0.0);
            let end = start + slice.len();
            for i in start..end {
                for j in i + 1..end {
                    let (hi, lo) = if data.y(i) > data.y(j) {
                        (i, j)
                    } else if data.y(j) > data.y(i) {
                        (j, i)
                    } else {
                        continue;
                    };
                    let pw = data.weight(hi) * data.weight(lo);
                    if pw <= 0.0 {
                        continue;
                    }
                    let diff = data.offset(hi) + f[hi] - data.offset(lo) - f[lo];
                    let rho = 1.0 / (1.0 + diff.exp());
                    slice[hi - start] += pw * rho;
                    slice[lo - start] -= pw * rho;
                }
            }
        });
    }

    /// Newton-style ratio per leaf: summed pair gradients over summed pair
    /// curvatures of the in-bag rows.
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
        let Some(groups) = data.groups() else {
            return;
        };
        let ranges = group_ranges(groups, 0, data.n_train());

        let mut curvature = vec![0.0; data.n_train()];
        for &(start, end) in &ranges {
            for i in start..end {
                for j in i + 1..end {
                    let (hi, lo) = if data.y(i) > data.y(j) {
                        (i, j)
                    } else if data.y(j) > data.y(i) {
                        (j, i)
                    } else {
                        continue;
                    };
                    let pw = data.weight(hi) * data.weight(lo);
                    if pw <= 0.0 {
                        continue;
                    }
                    let diff = data.offset(hi) + f[hi] - data.offset(lo) - f[lo];
                    let rho = 1.0 / (1.0 + diff.exp());
                    let d = pw * rho * (1.0 - rho);
                    curvature[hi] += d;
                    curvature[lo] += d;
                }
            }
        }

        let n_slots = tree.n_terminals();
        let mut num = vec![0.0; n_slots];
        let mut den = vec![0.0; n_slots];
        let mut count = vec![0usize; n_slots];
        for row in 0..data.n_train() {
            if !bag.contains(row) {
                continue;
            }
            let slot = assignments[row] as usize;
            num[slot] += z[row];
            den[slot] += curvature[row];
            count[slot] += 1;
        }
        for slot in 0..n_slots {
            if count[slot] < min_obs {
                continue;
            }
            tree.terminal_node_mut(slot).prediction = if den[slot] != 0.0 {
                num[slot] / den[slot]
            } else {
                0.0
            };
        }
    }

    fn deviance(&self, view: &DataView, f: &[f64]) -> f64 {
        let Some(groups) = view.dataset().groups() else {
            return f64::NAN;
        };
        let ranges = group_ranges(groups, view.base(), view.len());
        let (loss, weight) = reduce_pairs(
            view,
            &ranges,
            |i| view.offset(i) + f[i],
            |_, _, pw, diff| (pw * log_one_plus_exp(-diff), pw),
        );
        deviance_ratio(loss, weight)
    }

    /// Loss reduction over the pairs whose rows are both out of bag.
    fn bag_improvement(
        &self,
        data: &Dataset,
        bag: &Bag,
        f: &[f64],
        shrinkage: f64,
        delta: &[f64],
    ) -> f64 {
        let Some(groups) = data.groups() else {
            return f64::NAN;
        };
        let ranges = group_ranges(groups, 0, data.n_train());
        let view = data.train_view();
        let (gain, weight) = reduce_pairs(
            &view,
            &ranges,
            |i| data.offset(i) + f[i],
            |hi, lo, pw, diff| {
                if bag.contains(hi) || bag.contains(lo) {
                    return (0.0, 0.0);
                }
                let step = shrinkage * (delta[hi] - delta[lo]);
                (
                    pw * (log_one_plus_exp(-diff) - log_one_plus_exp(-diff - step)),
                    pw,
                )
            },
        );
        deviance_ratio(gain, weight)
    }
}

// ============================================================================
// Tests
// ============================================================================
