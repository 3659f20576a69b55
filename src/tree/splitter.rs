//! Per-node exact split finder.
//!
//! One [`VarSplitter`] serves one open terminal node. The growth engine
//! feeds it the node's in-bag rows feature by feature, in ascending sorted
//! order (missing values first), and the splitter keeps the best candidate
//! it has seen across all features scanned so far.
//!
//! Numeric features are evaluated at every distinct value using the
//! weighted least-squares gain over the left/right groups; the missing
//! group stays in its own branch and contributes no gain. Categorical
//! features are ranked by within-node mean residual and then scanned as an
//! ordered sequence of level prefixes.

use crate::data::{FeatureKind, Monotone};
use crate::tree::{NodeStats, Split, SplitRule};

/// Best split found for one node, with the sufficient statistics of the
/// three child groups it would create.
#[derive(Debug, Clone)]
pub struct SplitCandidate {
    pub feature: usize,
    pub rule: SplitRule,
    pub improvement: f64,
    pub left: NodeStats,
    pub right: NodeStats,
    pub missing: NodeStats,
}

impl SplitCandidate {
    pub fn to_split(&self) -> Split {
        Split {
            feature: self.feature,
            rule: self.rule.clone(),
            improvement: self.improvement,
        }
    }
}

/// Incremental split search state for a single open node.
#[derive(Debug, Clone)]
pub struct VarSplitter {
    total: NodeStats,
    min_obs: usize,
    best: Option<SplitCandidate>,

    // state of the current feature scan
    feature: usize,
    monotone_sign: f64,
    categorical: bool,
    left: NodeStats,
    missing: NodeStats,
    last_value: Option<f64>,
    level_stats: Vec<NodeStats>,
}

impl VarSplitter {
    /// Splitter for a node whose in-bag totals are `total`.
    pub fn new(total: NodeStats, min_obs: usize) -> Self {
        Self {
            total,
            min_obs,
            best: None,
            feature: 0,
            monotone_sign: 0.0,
            categorical: false,
            left: NodeStats::default(),
            missing: NodeStats::default(),
            last_value: None,
            level_stats: Vec::new(),
        }
    }

    #[inline]
    pub fn total(&self) -> NodeStats {
        self.total
    }

    /// Reset the scan state for the next feature.
    pub fn begin_feature(&mut self, feature: usize, kind: FeatureKind, monotone: Monotone) {
        self.feature = feature;
        self.monotone_sign = monotone.sign();
        self.categorical = kind.is_categorical();
        self.left = NodeStats::default();
        self.missing = NodeStats::default();
        self.last_value = None;
        self.level_stats.clear();
        if let FeatureKind::Categorical { n_levels } = kind {
            self.level_stats.resize(n_levels, NodeStats::default());
        }
    }

    /// Incorporate one in-bag observation; rows must arrive in the
    /// feature's sorted order.
    pub fn push(&mut self, value: f64, z: f64, w: f64) {
        if value.is_nan() {
            self.missing.add(z, w);
            return;
        }
        if self.categorical {
            self.level_stats[value as usize].add(z, w);
            return;
        }
        if let Some(last) = self.last_value {
            if value != last {
                self.consider(
                    SplitRule::Numeric {
                        threshold: 0.5 * (last + value),
                    },
                    self.left,
                );
            }
        }
        self.left.add(z, w);
        self.last_value = Some(value);
    }

    /// Finish the current feature; evaluates the derived-ordering splits
    /// for categorical features.
    pub fn end_feature(&mut self) {
        if !self.categorical {
            return;
        }
        let mut levels: Vec<(u32, NodeStats)> = self
            .level_stats
            .iter()
            .enumerate()
            .filter(|(_, s)| s.count > 0)
            .map(|(level, s)| (level as u32, *s))
            .collect();
        // rank levels by mean residual; ties break on the level id so the
        // derived ordering is deterministic
        levels.sort_by(|a, b| {
            a.1.mean()
                .partial_cmp(&b.1.mean())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let mut left = NodeStats::default();
        let mut left_levels: Vec<u32> = Vec::new();
        for (level, stats) in levels.iter().take(levels.len().saturating_sub(1)) {
            left = left.plus(stats);
            left_levels.push(*level);
            let mut sorted_levels = left_levels.clone();
            sorted_levels.sort_unstable();
            self.consider(
                SplitRule::Categorical {
                    left_levels: sorted_levels,
                },
                left,
            );
        }
    }

    /// Best candidate across every feature scanned so far.
    pub fn best(&self) -> Option<&SplitCandidate> {
        self.best.as_ref()
    }

    #[inline]
    pub fn best_improvement(&self) -> f64 {
        self.best.as_ref().map_or(0.0, |c| c.improvement)
    }

    fn consider(&mut self, rule: SplitRule, left: NodeStats) {
        let right = self.total.minus(&left).minus(&self.missing);
        if left.count < self.min_obs || right.count < self.min_obs {
            return;
        }
        if left.weight <= 0.0 || right.weight <= 0.0 {
            return;
        }
        let mean_left = left.mean();
        let mean_right = right.mean();
        if self.monotone_sign != 0.0 && self.monotone_sign * (mean_right - mean_left) <= 0.0 {
            return;
        }
        let diff = mean_left - mean_right;
        let improvement = left.weight * right.weight * diff * diff / (left.weight + right.weight);
        if improvement > self.best_improvement() {
            self.best = Some(SplitCandidate {
                feature: self.feature,
                rule,
                improvement,
                left,
                right,
                missing: self.missing,
            });
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn totals(rows: &[(f64, f64, f64)]) -> NodeStats {
        let mut t = NodeStats::default();
        for &(_, z, w) in rows {
            t.add(z, w);
        }
        t
    }

    fn scan(splitter: &mut VarSplitter, rows: &[(f64, f64, f64)]) {
        // sort like the dataset order: missing first, then ascending
        let mut sorted = rows.to_vec();
        sorted.sort_by(|a, b| match (a.0.is_nan(), b.0.is_nan()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            (false, false) => a.0.partial_cmp(&b.0).unwrap(),
        });
        for &(x, z, w) in &sorted {
            splitter.push(x, z, w);
        }
        splitter.end_feature();
    }

    // ---- Numeric scan Tests ----

    #[test]
    fn finds_clear_numeric_split() {
        let rows: Vec<(f64, f64, f64)> = (0..10)
            .map(|i| {
                let x = i as f64;
                let z = if x < 5.0 { 0.0 } else { 1.0 };
                (x, z, 1.0)
            })
            .collect();
        let mut sp = VarSplitter::new(totals(&rows), 1);
        sp.begin_feature(0, FeatureKind::Continuous, Monotone::None);
        scan(&mut sp, &rows);

        let best = sp.best().unwrap();
        match &best.rule {
            SplitRule::Numeric { threshold } => assert_abs_diff_eq!(*threshold, 4.5),
            other => panic!("expected numeric rule, got {:?}", other),
        }
        assert_eq!(best.left.count, 5);
        assert_eq!(best.right.count, 5);
        // gain = wl*wr*(ml-mr)^2/(wl+wr) = 5*5*1/10
        assert_abs_diff_eq!(best.improvement, 2.5);
    }

    #[test]
    fn respects_min_obs() {
        let rows: Vec<(f64, f64, f64)> = (0..10)
            .map(|i| {
                let x = i as f64;
                // only the extreme row differs, so the best unrestricted
                // split would isolate a single observation
                let z = if i == 9 { 10.0 } else { 0.0 };
                (x, z, 1.0)
            })
            .collect();
        let mut sp = VarSplitter::new(totals(&rows), 3);
        sp.begin_feature(0, FeatureKind::Continuous, Monotone::None);
        scan(&mut sp, &rows);

        let best = sp.best().unwrap();
        assert!(best.left.count >= 3);
        assert!(best.right.count >= 3);
    }

    #[test]
    fn no_candidate_on_constant_feature() {
        let rows: Vec<(f64, f64, f64)> = (0..6).map(|i| (2.0, i as f64, 1.0)).collect();
        let mut sp = VarSplitter::new(totals(&rows), 1);
        sp.begin_feature(0, FeatureKind::Continuous, Monotone::None);
        scan(&mut sp, &rows);
        assert!(sp.best().is_none());
    }

    #[test]
    fn missing_rows_excluded_from_gain() {
        let mut rows: Vec<(f64, f64, f64)> = (0..8)
            .map(|i| {
                let x = i as f64;
                let z = if x < 4.0 { -1.0 } else { 1.0 };
                (x, z, 1.0)
            })
            .collect();
        rows.push((f64::NAN, 50.0, 1.0));
        let mut sp = VarSplitter::new(totals(&rows), 1);
        sp.begin_feature(0, FeatureKind::Continuous, Monotone::None);
        scan(&mut sp, &rows);

        let best = sp.best().unwrap();
        assert_eq!(best.missing.count, 1);
        assert_abs_diff_eq!(best.missing.sum, 50.0);
        // improvement over left/right only: 4*4*4/8
        assert_abs_diff_eq!(best.improvement, 8.0);
    }

    // ---- Monotone Tests ----

    #[test]
    fn increasing_constraint_rejects_decreasing_split() {
        let rows: Vec<(f64, f64, f64)> = (0..10)
            .map(|i| {
                let x = i as f64;
                let z = if x < 5.0 { 1.0 } else { 0.0 };
                (x, z, 1.0)
            })
            .collect();
        let mut sp = VarSplitter::new(totals(&rows), 1);
        sp.begin_feature(0, FeatureKind::Continuous, Monotone::Increasing);
        scan(&mut sp, &rows);
        assert!(sp.best().is_none());

        let mut sp = VarSplitter::new(totals(&rows), 1);
        sp.begin_feature(0, FeatureKind::Continuous, Monotone::Decreasing);
        scan(&mut sp, &rows);
        assert!(sp.best().is_some());
    }

    // ---- Categorical Tests ----

    #[test]
    fn categorical_split_recovers_level_partition() {
        // levels 0 and 2 carry low residuals, levels 1 and 3 high ones
        let mut rows = Vec::new();
        for _ in 0..4 {
            rows.push((0.0, -1.0, 1.0));
            rows.push((2.0, -0.9, 1.0));
            rows.push((1.0, 1.0, 1.0));
            rows.push((3.0, 0.9, 1.0));
        }
        let mut sp = VarSplitter::new(totals(&rows), 1);
        sp.begin_feature(0, FeatureKind::Categorical { n_levels: 4 }, Monotone::None);
        for &(x, z, w) in &rows {
            sp.push(x, z, w);
        }
        sp.end_feature();

        let best = sp.best().unwrap();
        match &best.rule {
            SplitRule::Categorical { left_levels } => {
                assert_eq!(left_levels, &vec![0, 2]);
            }
            other => panic!("expected categorical rule, got {:?}", other),
        }
    }

    #[test]
    fn best_persists_across_features() {
        let rows: Vec<(f64, f64, f64)> = (0..10)
            .map(|i| {
                let x = i as f64;
                let z = if x < 5.0 { 0.0 } else { 1.0 };
                (x, z, 1.0)
            })
            .collect();
        let mut sp = VarSplitter::new(totals(&rows), 1);
        sp.begin_feature(0, FeatureKind::Continuous, Monotone::None);
        scan(&mut sp, &rows);
        let first = sp.best_improvement();

        // a pure-noise second feature must not displace the first best
        let noise: Vec<(f64, f64, f64)> = rows
            .iter()
            .enumerate()
            .map(|(i, &(_, z, w))| (((i * 7) % 10) as f64, z, w))
            .collect();
        sp.begin_feature(1, FeatureKind::Continuous, Monotone::None);
        scan(&mut sp, &noise);

        let best = sp.best().unwrap();
        assert_eq!(best.feature, 0);
        assert_abs_diff_eq!(best.improvement, first);
    }
}
