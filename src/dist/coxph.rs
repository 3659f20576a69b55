//! Cox proportional-hazards partial likelihood over counting-process data.
//!
//! The log partial likelihood, the martingale residuals, and the per-leaf
//! Newton statistics all come from the same single pass: walk each stratum
//! from the largest stop time downward, adding subjects to the risk set at
//! their stop time and dropping them once the walk passes their start time.
//! Linear predictors are exponentiated relative to a running center that is
//! re-set when the risk-weighted mean drifts too far, keeping the risk
//! total in floating-point range over long follow-up.

use ndarray::{Array1, Array2};

use crate::data::{Bag, DataView, Dataset, Partition, SurvivalData};
use crate::dist::{deviance_ratio, Distribution};
use crate::error::ConfigError;
use crate::tree::Tree;

/// Tie handling for tied event times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieMethod {
    /// Single hazard increment `deaths / risk` per event time.
    Breslow,
    /// Averaged increments discounting tied deaths.
    #[default]
    Efron,
}

/// Maximum drift of the risk-weighted mean predictor from the current
/// center before the accumulators are rescaled to a new center.
const RECENTER_TOLERANCE: f64 = 30.0;

#[derive(Debug, Clone)]
pub struct CoxPh {
    ties: TieMethod,
}

impl CoxPh {
    pub fn new(ties: TieMethod) -> Self {
        Self { ties }
    }

    /// One pass over a partition: returns the log partial likelihood and,
    /// when `residuals` is given, fills it with martingale residuals.
    /// Rows whose `weight_of` is zero are excluded from the risk sets and
    /// get a zero residual.
    fn walk<W, E>(
        &self,
        surv: &SurvivalData,
        partition: Partition,
        base: usize,
        len: usize,
        weight_of: W,
        eta_of: E,
        mut residuals: Option<&mut [f64]>,
    ) -> f64
    where
        W: Fn(usize) -> f64,
        E: Fn(usize) -> f64,
    {
        let orders = surv.orders(partition);
        if let Some(r) = residuals.as_deref_mut() {
            r.fill(0.0);
        }

        let mut loglik = 0.0;
        let mut mark = vec![0.0; len];
        let mut at_risk = vec![false; len];

        let mut seg_start = 0usize;
        for &seg_end in &orders.boundaries {
            let mut denom = 0.0;
            let mut esum = 0.0;
            let mut nrisk = 0usize;
            let mut center = 0.0;
            let mut cumhaz = 0.0;
            let mut indx2 = seg_start;
            let mut person = seg_start;

            while person < seg_end {
                let p = orders.end_order[person] as usize;
                if weight_of(p) <= 0.0 {
                    person += 1;
                    continue;
                }
                let dtime = surv.stop(base + p);

                // drop subjects whose interval begins at or after dtime
                while indx2 < seg_end {
                    let q = orders.start_order[indx2] as usize;
                    if surv.start(base + q) < dtime {
                        break;
                    }
                    if at_risk[q] {
                        let eta = eta_of(q);
                        denom -= weight_of(q) * (eta - center).exp();
                        esum -= eta;
                        nrisk -= 1;
                        at_risk[q] = false;
                        if let Some(r) = residuals.as_deref_mut() {
                            r[q] = surv.status(base + q)
                                - (eta - center).exp() * (cumhaz - mark[q]);
                        }
                    }
                    indx2 += 1;
                }

                // rows tied at this stop time
                let mut group_end = person;
                while group_end < seg_end {
                    let g = orders.end_order[group_end] as usize;
                    if surv.stop(base + g) != dtime {
                        break;
                    }
                    group_end += 1;
                }

                // count the entrants, then recenter once if the mean
                // predictor has drifted
                for idx in person..group_end {
                    let g = orders.end_order[idx] as usize;
                    if weight_of(g) > 0.0 {
                        esum += eta_of(g);
                        nrisk += 1;
                    }
                }
                if nrisk > 0 {
                    let target = esum / nrisk as f64;
                    if (target - center).abs() > RECENTER_TOLERANCE {
                        let shrink = (center - target).exp();
                        let grow = (target - center).exp();
                        denom *= shrink;
                        cumhaz *= grow;
                        for q in seg_start..seg_end {
                            if at_risk[q] {
                                mark[q] *= grow;
                            }
                        }
                        center = target;
                    }
                }

                // enter the risk set; deaths accumulate separately so the
                // tie rule decides when their mass joins the denominator
                let group_start = person;
                let mut deadwt = 0.0;
                let mut denom2 = 0.0;
                let mut ndead = 0usize;
                for idx in group_start..group_end {
                    let g = orders.end_order[idx] as usize;
                    let w = weight_of(g);
                    if w <= 0.0 {
                        continue;
                    }
                    let eta = eta_of(g);
                    let risk = w * (eta - center).exp();
                    at_risk[g] = true;
                    mark[g] = cumhaz;
                    if surv.status(base + g) == 1.0 {
                        ndead += 1;
                        deadwt += w;
                        denom2 += risk;
                        loglik += w * (eta - center);
                    } else {
                        denom += risk;
                    }
                }
                person = group_end;

                if ndead > 0 {
                    // `excess` is the part of this time's hazard increment a
                    // tied death is not exposed to: under Efron the k-th
                    // substep carries only k/d of the death mass, so a death
                    // is charged sum_k (k/d) * inc_k rather than the full
                    // increment. Breslow has a single substep and no excess.
                    let excess = match self.ties {
                        TieMethod::Breslow => {
                            denom += denom2;
                            loglik -= deadwt * denom.ln();
                            cumhaz += deadwt / denom;
                            0.0
                        }
                        TieMethod::Efron => {
                            let meanwt = deadwt / ndead as f64;
                            let share = denom2 / ndead as f64;
                            let mut hazard = 0.0;
                            let mut death_hazard = 0.0;
                            for sub in 1..=ndead {
                                denom += share;
                                loglik -= meanwt * denom.ln();
                                let inc = meanwt / denom;
                                hazard += inc;
                                death_hazard += sub as f64 / ndead as f64 * inc;
                            }
                            cumhaz += hazard;
                            hazard - death_hazard
                        }
                    };
                    if excess > 0.0 {
                        for idx in group_start..group_end {
                            let g = orders.end_order[idx] as usize;
                            if at_risk[g] && surv.status(base + g) == 1.0 {
                                mark[g] += excess;
                            }
                        }
                    }
                }
            }

            // stratum over: everyone still at risk exits here
            for q in seg_start..seg_end {
                if at_risk[q] {
                    if let Some(r) = residuals.as_deref_mut() {
                        let eta = eta_of(q);
                        r[q] = surv.status(base + q)
                            - (eta - center).exp() * (cumhaz - mark[q]);
                    }
                    at_risk[q] = false;
                }
            }
            seg_start = seg_end;
        }

        loglik
    }
}

/// Gauss-Jordan inverse with partial pivoting; `None` on a singular pivot.
fn invert(mut a: Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut inv = Array2::eye(n);
    for col in 0..n {
        let mut pivot = col;
        for row in col + 1..n {
            if a[[row, col]].abs() > a[[pivot, col]].abs() {
                pivot = row;
            }
        }
        if a[[pivot, col]].abs() < 1e-12 {
            return None;
        }
        if pivot != col {
            for j in 0..n {
                a.swap([pivot, j], [col, j]);
                inv.swap([pivot, j], [col, j]);
            }
        }
        let p = a[[col, col]];
        for j in 0..n {
            a[[col, j]] /= p;
            inv[[col, j]] /= p;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[[row, col]];
            if factor != 0.0 {
                for j in 0..n {
                    a[[row, j]] -= factor * a[[col, j]];
                    inv[[row, j]] -= factor * inv[[col, j]];
                }
            }
        }
    }
    Some(inv)
}

impl Distribution for CoxPh {
    fn name(&self) -> &'static str {
        "coxph"
    }

    fn init(&mut self, data: &Dataset) -> Result<(), ConfigError> {
        if data.survival().is_none() {
            return Err(ConfigError::MissingParameter {
                family: "coxph",
                parameter: "survival",
            });
        }
        Ok(())
    }

    /// The partial likelihood has no intercept.
    fn init_estimate(&self, _data: &Dataset) -> f64 {
        0.0
    }

    fn working_response(&self, data: &Dataset, _bag: &Bag, f: &[f64], z: &mut [f64]) {
        let Some(surv) = data.survival() else {
            z.fill(0.0);
            return;
        };
        self.walk(
            surv,
            Partition::Train,
            0,
            data.n_train(),
            |row| data.weight(row),
            |row| data.offset(row) + f[row],
            Some(z),
        );
    }

    /// One Newton step over the eligible leaves, with the last eligible
    /// leaf pinned at zero for identifiability. A singular Hessian or a
    /// non-finite solved adjustment leaves the affected leaves at zero.
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
        for slot in 0..n_slots {
            tree.terminal_node_mut(slot).prediction = 0.0;
        }
        let Some(surv) = data.survival() else {
            return;
        };

        let mut counts = vec![0usize; n_slots];
        for row in 0..data.n_train() {
            if bag.contains(row) {
                counts[assignments[row] as usize] += 1;
            }
        }
        // unknowns are the eligible slots minus the pinned last one
        let eligible: Vec<usize> = (0..n_slots)
            .filter(|&slot| counts[slot] >= min_obs.max(1))
            .collect();
        if eligible.len() < 2 {
            return;
        }
        let unknowns = &eligible[..eligible.len() - 1];
        let mut unknown_of = vec![usize::MAX; n_slots];
        for (u, &slot) in unknowns.iter().enumerate() {
            unknown_of[slot] = u;
        }
        let m = unknowns.len();

        let mut grad: Array1<f64> = Array1::zeros(m);
        let mut hess: Array2<f64> = Array2::zeros((m, m));

        let orders = surv.orders(Partition::Train);
        let weight_of =
            |row: usize| if bag.contains(row) { data.weight(row) } else { 0.0 };
        let eta_of = |row: usize| data.offset(row) + f[row];

        let mut denomk = vec![0.0; n_slots];
        let mut denom2k = vec![0.0; n_slots];

        let mut seg_start = 0usize;
        for &seg_end in &orders.boundaries {
            let mut denom = 0.0;
            let mut esum = 0.0;
            let mut nrisk = 0usize;
            let mut center = 0.0;
            denomk.fill(0.0);
            let mut indx2 = seg_start;
            let mut person = seg_start;

            while person < seg_end {
                let p = orders.end_order[person] as usize;
                if weight_of(p) <= 0.0 {
                    person += 1;
                    continue;
                }
                let dtime = surv.stop(p);

                while indx2 < seg_end {
                    let q = orders.start_order[indx2] as usize;
                    if surv.start(q) < dtime {
                        break;
                    }
                    let w = weight_of(q);
                    // an included row reaching its start has already been
                    // added at its stop time, so it is at risk right now
                    if w > 0.0 {
                        let eta = eta_of(q);
                        let risk = w * (eta - center).exp();
                        denom -= risk;
                        denomk[assignments[q] as usize] -= risk;
                        esum -= eta;
                        nrisk -= 1;
                    }
                    indx2 += 1;
                }

                let mut group_end = person;
                while group_end < seg_end {
                    let g = orders.end_order[group_end] as usize;
                    if surv.stop(g) != dtime {
                        break;
                    }
                    group_end += 1;
                }

                for idx in person..group_end {
                    let g = orders.end_order[idx] as usize;
                    if weight_of(g) > 0.0 {
                        esum += eta_of(g);
                        nrisk += 1;
                    }
                }
                if nrisk > 0 {
                    let target = esum / nrisk as f64;
                    if (target - center).abs() > RECENTER_TOLERANCE {
                        let shrink = (center - target).exp();
                        denom *= shrink;
                        for value in denomk.iter_mut() {
                            *value *= shrink;
                        }
                        center = target;
                    }
                }

                let mut deadwt = 0.0;
                let mut denom2 = 0.0;
                let mut ndead = 0usize;
                denom2k.fill(0.0);
                for idx in person..group_end {
                    let g = orders.end_order[idx] as usize;
                    let w = weight_of(g);
                    if w <= 0.0 {
                        continue;
                    }
                    let slot = assignments[g] as usize;
                    let risk = w * (eta_of(g) - center).exp();
                    if surv.status(g) == 1.0 {
                        ndead += 1;
                        deadwt += w;
                        denom2 += risk;
                        denom2k[slot] += risk;
                        if unknown_of[slot] != usize::MAX {
                            grad[unknown_of[slot]] += w;
                        }
                    } else {
                        denom += risk;
                        denomk[slot] += risk;
                    }
                }
                person = group_end;

                if ndead > 0 {
                    let steps = match self.ties {
                        TieMethod::Breslow => 1,
                        TieMethod::Efron => ndead,
                    };
                    let stepwt = deadwt / steps as f64;
                    for _ in 0..steps {
                        denom += denom2 / steps as f64;
                        for slot in 0..n_slots {
                            denomk[slot] += denom2k[slot] / steps as f64;
                        }
                        for (u, &slot_u) in unknowns.iter().enumerate() {
                            let frac_u = denomk[slot_u] / denom;
                            grad[u] -= stepwt * frac_u;
                            for (v, &slot_v) in unknowns.iter().enumerate() {
                                let frac_v = denomk[slot_v] / denom;
                                let same = if u == v { frac_u } else { 0.0 };
                                hess[[u, v]] += stepwt * (same - frac_u * frac_v);
                            }
                        }
                    }
                }
            }
            seg_start = seg_end;
        }

        let Some(inverse) = invert(hess) else {
            return;
        };
        let step = inverse.dot(&grad);
        for (u, &slot) in unknowns.iter().enumerate() {
            let value = step[u];
            tree.terminal_node_mut(slot).prediction =
                if value.is_finite() { value } else { 0.0 };
        }
    }

    /// Negative log partial likelihood per unit weight.
    fn deviance(&self, view: &DataView, f: &[f64]) -> f64 {
        let Some(surv) = view.dataset().survival() else {
            return f64::NAN;
        };
        let loglik = self.walk(
            surv,
            view.partition(),
            view.base(),
            view.len(),
            |i| view.weight(i),
            |i| view.offset(i) + f[i],
            None,
        );
        let weight: f64 = (0..view.len()).map(|i| view.weight(i)).sum();
        deviance_ratio(-loglik, weight)
    }

    fn bag_improvement(
        &self,
        data: &Dataset,
        bag: &Bag,
        f: &[f64],
        shrinkage: f64,
        delta: &[f64],
    ) -> f64 {
        let Some(surv) = data.survival() else {
            return f64::NAN;
        };
        let oob_weight =
            |row: usize| if bag.contains(row) { 0.0 } else { data.weight(row) };
        let before = self.walk(
            surv,
            Partition::Train,
            0,
            data.n_train(),
            oob_weight,
            |row| data.offset(row) + f[row],
            None,
        );
        let after = self.walk(
            surv,
            Partition::Train,
            0,
            data.n_train(),
            oob_weight,
            |row| data.offset(row) + f[row] + shrinkage * delta[row],
            None,
        );
        let weight: f64 = (0..data.n_train()).map(oob_weight).sum();
        deviance_ratio(after - before, weight)
    }
}

// ============================================================================
// Tests
// ============================================================================
