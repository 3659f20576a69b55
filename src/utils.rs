//! Shared numeric helpers.

use rayon::prelude::*;

/// Default number of rows handled per parallel reduction chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Weighted quantile using step-function interpolation.
///
/// Returns the smallest value `v` such that the cumulative weight of all
/// values `<= v` reaches `alpha` of the total. `weights == None` means
/// uniform weights. Returns 0.0 for an empty input.
pub fn weighted_quantile(values: &[f64], weights: Option<&[f64]>, alpha: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let weight_at = |i: usize| weights.map_or(1.0, |w| w[i]);
    let total: f64 = (0..values.len()).map(weight_at).sum();
    if total <= 0.0 {
        return values[order[0]];
    }

    let target = alpha * total;
    let mut cum = 0.0;
    for &i in &order {
        cum += weight_at(i);
        if cum >= target {
            return values[i];
        }
    }
    values[order[order.len() - 1]]
}

/// Parallel sum of `f(row)` over `0..n_rows`.
///
/// Rows are partitioned into fixed-size chunks; each chunk reduces its own
/// partial sum and the partials are combined in chunk-index order, so the
/// result depends on the chunk size but not on the thread count.
pub fn chunked_sum<F>(n_rows: usize, chunk_size: usize, f: F) -> f64
where
    F: Fn(usize) -> f64 + Sync,
{
    let chunk = chunk_size.max(1);
    let n_chunks = n_rows.div_ceil(chunk);
    let partials: Vec<f64> = (0..n_chunks)
        .into_par_iter()
        .map(|c| {
            let start = c * chunk;
            let end = (start + chunk).min(n_rows);
            (start..end).map(&f).sum()
        })
        .collect();
    partials.iter().sum()
}

/// Parallel sum of a pair of accumulators, typically `(loss, weight)`.
///
/// Same fixed-order chunk combination as [`chunked_sum`].
pub fn chunked_sum2<F>(n_rows: usize, chunk_size: usize, f: F) -> (f64, f64)
where
    F: Fn(usize) -> (f64, f64) + Sync,
{
    let chunk = chunk_size.max(1);
    let n_chunks = n_rows.div_ceil(chunk);
    let partials: Vec<(f64, f64)> = (0..n_chunks)
        .into_par_iter()
        .map(|c| {
            let start = c * chunk;
            let end = (start + chunk).min(n_rows);
            let mut a = 0.0;
            let mut b = 0.0;
            for i in start..end {
                let (x, y) = f(i);
                a += x;
                b += y;
            }
            (a, b)
        })
        .collect();
    partials
        .iter()
        .fold((0.0, 0.0), |(a, b), &(x, y)| (a + x, b + y))
}

/// Fill `out[row] = f(row)` in parallel over fixed-size chunks.
pub fn parallel_fill<F>(out: &mut [f64], chunk_size: usize, f: F)
where
    F: Fn(usize) -> f64 + Sync,
{
    let chunk = chunk_size.max(1);
    out.par_chunks_mut(chunk)
        .enumerate()
        .for_each(|(c, slice)| {
            let base = c * chunk;
            for (i, v) in slice.iter_mut().enumerate() {
                *v = f(base + i);
            }
        });
}

/// Numerically stable `ln(1 + exp(x))`.
#[inline]
pub fn log_one_plus_exp(x: f64) -> f64 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

// ============================================================================
// Tests
// ============================================================================
