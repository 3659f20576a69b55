//! Columnar training data with precomputed per-feature sort orders.
//!
//! A [`Dataset`] stores predictors column-major in `f64`, with `NaN` marking
//! a missing value. Rows are laid out training partition first, then the
//! validation partition. For every feature an ascending permutation of the
//! training rows is computed once at construction (stable under ties,
//! missing values first so the split finder sees the whole missing group
//! before any ordered value); the split engine walks these permutations
//! instead of re-sorting on every search.

use std::cmp::Ordering;

use crate::data::survival::{SurvivalData, SurvivalRecords};

// ============================================================================
// Feature metadata
// ============================================================================

/// Storage class of a predictor column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    /// Real-valued predictor.
    Continuous,
    /// Ordinal predictor; treated like a continuous one during splitting.
    Ordered,
    /// Nominal predictor with levels `0..n_levels`, stored as whole numbers.
    Categorical { n_levels: usize },
}

impl FeatureKind {
    /// Returns true for nominal predictors.
    #[inline]
    pub fn is_categorical(&self) -> bool {
        matches!(self, Self::Categorical { .. })
    }
}

/// Monotonicity requirement for a single feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Monotone {
    /// No constraint (default).
    #[default]
    None,
    /// Predictions must not decrease as the feature increases.
    Increasing,
    /// Predictions must not increase as the feature increases.
    Decreasing,
}

impl Monotone {
    /// Convert from the conventional integer encoding (-1, 0, 1).
    pub fn from_int(value: i8) -> Self {
        match value {
            0 => Self::None,
            v if v > 0 => Self::Increasing,
            _ => Self::Decreasing,
        }
    }

    /// Required sign of `right_mean - left_mean`, 0.0 when unconstrained.
    #[inline]
    pub fn sign(&self) -> f64 {
        match self {
            Self::None => 0.0,
            Self::Increasing => 1.0,
            Self::Decreasing => -1.0,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while assembling a [`Dataset`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum DatasetError {
    #[error("feature column {index} has {len} rows, expected {expected}")]
    ColumnLength {
        index: usize,
        len: usize,
        expected: usize,
    },

    #[error("{name} has {len} entries, expected {expected}")]
    VectorLength {
        name: &'static str,
        len: usize,
        expected: usize,
    },

    #[error("negative weight {value} at row {row}")]
    NegativeWeight { row: usize, value: f64 },

    #[error("validation rows ({n_valid}) must be fewer than total rows ({n_rows})")]
    BadPartition { n_valid: usize, n_rows: usize },

    #[error("categorical feature {index} holds {value} at row {row}, outside 0..{n_levels}")]
    BadCategory {
        index: usize,
        row: usize,
        value: f64,
        n_levels: usize,
    },

    #[error("survival row {row} has start {start} >= stop {stop}")]
    BadInterval { row: usize, start: f64, stop: f64 },

    #[error("survival row {row} has status {status}, expected 0 or 1")]
    BadStatus { row: usize, status: f64 },

    #[error("stratum ids must be grouped contiguously within each partition (row {row})")]
    BadStrata { row: usize },

    #[error("group ids must be grouped contiguously within each partition (row {row})")]
    BadGroups { row: usize },
}

// ============================================================================
// Dataset
// ============================================================================

/// Columnar observation set shared by the booster, the split engine, and the
/// loss distributions.
#[derive(Debug, Clone)]
pub struct Dataset {
    features: Vec<Vec<f64>>,
    kinds: Vec<FeatureKind>,
    monotone: Vec<Monotone>,
    response: Vec<f64>,
    weights: Vec<f64>,
    offsets: Vec<f64>,
    n_train: usize,
    n_valid: usize,
    sort_order: Vec<Vec<u32>>,
    survival: Option<SurvivalData>,
    groups: Option<Vec<u32>>,
}

impl Dataset {
    /// Build a dataset where every row belongs to the training partition,
    /// with unit weights and zero offsets.
    pub fn new(
        features: Vec<Vec<f64>>,
        kinds: Vec<FeatureKind>,
        response: Vec<f64>,
    ) -> Result<Self, DatasetError> {
        let n_rows = response.len();
        if features.len() != kinds.len() {
            return Err(DatasetError::VectorLength {
                name: "kinds",
                len: kinds.len(),
                expected: features.len(),
            });
        }
        for (index, col) in features.iter().enumerate() {
            if col.len() != n_rows {
                return Err(DatasetError::ColumnLength {
                    index,
                    len: col.len(),
                    expected: n_rows,
                });
            }
            if let FeatureKind::Categorical { n_levels } = kinds[index] {
                for (row, &value) in col.iter().enumerate() {
                    let ok = value.is_nan()
                        || (value >= 0.0 && value < n_levels as f64 && value.fract() == 0.0);
                    if !ok {
                        return Err(DatasetError::BadCategory {
                            index,
                            row,
                            value,
                            n_levels,
                        });
                    }
                }
            }
        }

        let n_features = features.len();
        let mut data = Self {
            features,
            monotone: vec![Monotone::None; n_features],
            kinds,
            weights: vec![1.0; n_rows],
            offsets: vec![0.0; n_rows],
            response,
            n_train: n_rows,
            n_valid: 0,
            sort_order: Vec::new(),
            survival: None,
            groups: None,
        };
        data.compute_sort_orders();
        Ok(data)
    }

    /// Replace the unit observation weights. Weights must be non-negative.
    pub fn with_weights(mut self, weights: Vec<f64>) -> Result<Self, DatasetError> {
        if weights.len() != self.n_rows() {
            return Err(DatasetError::VectorLength {
                name: "weights",
                len: weights.len(),
                expected: self.n_rows(),
            });
        }
        if let Some(row) = weights.iter().position(|&w| w < 0.0) {
            return Err(DatasetError::NegativeWeight {
                row,
                value: weights[row],
            });
        }
        self.weights = weights;
        Ok(self)
    }

    /// Replace the zero offsets with a fixed, unfitted term added to every
    /// prediction.
    pub fn with_offsets(mut self, offsets: Vec<f64>) -> Result<Self, DatasetError> {
        if offsets.len() != self.n_rows() {
            return Err(DatasetError::VectorLength {
                name: "offsets",
                len: offsets.len(),
                expected: self.n_rows(),
            });
        }
        self.offsets = offsets;
        Ok(self)
    }

    /// Set per-feature monotonicity signs using the -1/0/1 convention.
    pub fn with_monotone(mut self, signs: Vec<i8>) -> Result<Self, DatasetError> {
        if signs.len() != self.n_features() {
            return Err(DatasetError::VectorLength {
                name: "monotone",
                len: signs.len(),
                expected: self.n_features(),
            });
        }
        self.monotone = signs.into_iter().map(Monotone::from_int).collect();
        Ok(self)
    }

    /// Mark the trailing `n_valid` rows as the validation partition and
    /// rebuild the training sort orders accordingly.
    pub fn with_validation_rows(mut self, n_valid: usize) -> Result<Self, DatasetError> {
        if n_valid >= self.n_rows() {
            return Err(DatasetError::BadPartition {
                n_valid,
                n_rows: self.n_rows(),
            });
        }
        self.n_train = self.n_rows() - n_valid;
        self.n_valid = n_valid;
        self.compute_sort_orders();
        if let Some(surv) = self.survival.take() {
            self.survival = Some(SurvivalData::new(
                surv.into_records(),
                self.n_train,
                self.n_valid,
            )?);
        }
        Ok(self)
    }

    /// Attach counting-process survival records (required by the Cox family).
    pub fn with_survival(mut self, records: SurvivalRecords) -> Result<Self, DatasetError> {
        if records.start.len() != self.n_rows() {
            return Err(DatasetError::VectorLength {
                name: "survival",
                len: records.start.len(),
                expected: self.n_rows(),
            });
        }
        self.survival = Some(SurvivalData::new(records, self.n_train, self.n_valid)?);
        Ok(self)
    }

    /// Attach per-row query group ids (required by the pairwise family).
    /// Rows of one group must be contiguous within each partition.
    pub fn with_groups(mut self, groups: Vec<u32>) -> Result<Self, DatasetError> {
        if groups.len() != self.n_rows() {
            return Err(DatasetError::VectorLength {
                name: "groups",
                len: groups.len(),
                expected: self.n_rows(),
            });
        }
        for range in [0..self.n_train, self.n_train..self.n_rows()] {
            let mut seen: Vec<u32> = Vec::new();
            for row in range {
                let id = groups[row];
                match seen.last() {
                    Some(&last) if last == id => {}
                    _ => {
                        if seen.contains(&id) {
                            return Err(DatasetError::BadGroups { row });
                        }
                        seen.push(id);
                    }
                }
            }
        }
        self.groups = Some(groups);
        Ok(self)
    }

    fn compute_sort_orders(&mut self) {
        let n_train = self.n_train;
        self.sort_order = self
            .features
            .iter()
            .map(|col| {
                let mut order: Vec<u32> = (0..n_train as u32).collect();
                // Stable sort keeps tied rows in row order; NaN sorts first.
                order.sort_by(|&a, &b| {
                    let xa = col[a as usize];
                    let xb = col[b as usize];
                    match (xa.is_nan(), xb.is_nan()) {
                        (true, true) => Ordering::Equal,
                        (true, false) => Ordering::Less,
                        (false, true) => Ordering::Greater,
                        (false, false) => xa.partial_cmp(&xb).unwrap_or(Ordering::Equal),
                    }
                });
                order
            })
            .collect();
    }

    // ---- accessors ----

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.response.len()
    }

    #[inline]
    pub fn n_train(&self) -> usize {
        self.n_train
    }

    #[inline]
    pub fn n_valid(&self) -> usize {
        self.n_valid
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    /// Feature value for a global row index; `NaN` means missing.
    #[inline]
    pub fn x(&self, row: usize, feature: usize) -> f64 {
        self.features[feature][row]
    }

    #[inline]
    pub fn y(&self, row: usize) -> f64 {
        self.response[row]
    }

    #[inline]
    pub fn weight(&self, row: usize) -> f64 {
        self.weights[row]
    }

    #[inline]
    pub fn offset(&self, row: usize) -> f64 {
        self.offsets[row]
    }

    #[inline]
    pub fn kind(&self, feature: usize) -> FeatureKind {
        self.kinds[feature]
    }

    #[inline]
    pub fn monotone(&self, feature: usize) -> Monotone {
        self.monotone[feature]
    }

    /// Ascending training-row permutation for one feature.
    #[inline]
    pub fn order(&self, feature: usize) -> &[u32] {
        &self.sort_order[feature]
    }

    pub fn survival(&self) -> Option<&SurvivalData> {
        self.survival.as_ref()
    }

    pub fn groups(&self) -> Option<&[u32]> {
        self.groups.as_deref()
    }

    /// Read-only view of the training partition.
    pub fn train_view(&self) -> DataView<'_> {
        DataView {
            data: self,
            partition: Partition::Train,
        }
    }

    /// Read-only view of the validation partition.
    pub fn validation_view(&self) -> DataView<'_> {
        DataView {
            data: self,
            partition: Partition::Validation,
        }
    }
}

// ============================================================================
// DataView
// ============================================================================

/// Which partition a [`DataView`] exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Train,
    Validation,
}

/// Borrowed, partition-local view over a [`Dataset`].
///
/// Indices passed to the accessors are local to the partition; the view
/// translates them to global rows. Because the view borrows rather than
/// shifting shared pointers, the training view stays valid on every exit
/// path, including panics inside a deviance computation.
#[derive(Debug, Clone, Copy)]
pub struct DataView<'a> {
    data: &'a Dataset,
    partition: Partition,
}

impl<'a> DataView<'a> {
    #[inline]
    pub fn partition(&self) -> Partition {
        self.partition
    }

    #[inline]
    pub fn dataset(&self) -> &'a Dataset {
        self.data
    }

    /// First global row of this partition.
    #[inline]
    pub fn base(&self) -> usize {
        match self.partition {
            Partition::Train => 0,
            Partition::Validation => self.data.n_train,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        match self.partition {
            Partition::Train => self.data.n_train,
            Partition::Validation => self.data.n_valid,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn y(&self, i: usize) -> f64 {
        self.data.y(self.base() + i)
    }

    #[inline]
    pub fn weight(&self, i: usize) -> f64 {
        self.data.weight(self.base() + i)
    }

    #[inline]
    pub fn offset(&self, i: usize) -> f64 {
        self.data.offset(self.base() + i)
    }

    #[inline]
    pub fn x(&self, i: usize, feature: usize) -> f64 {
        self.data.x(self.base() + i, feature)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Dataset {
        Dataset::new(
            vec![vec![3.0, 1.0, 2.0, f64::NAN, 1.0]],
            vec![FeatureKind::Continuous],
            vec![0.0, 1.0, 2.0, 3.0, 4.0],
        )
        .unwrap()
    }

    // ---- Construction Tests ----

    #[test]
    fn rejects_mismatched_column() {
        let err = Dataset::new(
            vec![vec![1.0, 2.0]],
            vec![FeatureKind::Continuous],
            vec![0.0, 1.0, 2.0],
        )
        .unwrap_err();
        assert!(matches!(err, DatasetError::ColumnLength { index: 0, .. }));
    }

    #[test]
    fn rejects_negative_weight() {
        let err = small().with_weights(vec![1.0, 1.0, -0.5, 1.0, 1.0]).unwrap_err();
        assert!(matches!(err, DatasetError::NegativeWeight { row: 2, .. }));
    }

    #[test]
    fn rejects_out_of_range_category() {
        let err = Dataset::new(
            vec![vec![0.0, 3.0]],
            vec![FeatureKind::Categorical { n_levels: 3 }],
            vec![0.0, 1.0],
        )
        .unwrap_err();
        assert!(matches!(err, DatasetError::BadCategory { row: 1, .. }));
    }

    #[test]
    fn rejects_all_validation_partition() {
        let err = small().with_validation_rows(5).unwrap_err();
        assert!(matches!(err, DatasetError::BadPartition { .. }));
    }

    #[test]
    fn rejects_interleaved_groups() {
        let err = small()
            .with_groups(vec![0, 0, 1, 1, 0])
            .unwrap_err();
        assert!(matches!(err, DatasetError::BadGroups { row: 4 }));
    }

    // ---- Sort order Tests ----

    #[test]
    fn sort_order_is_ascending_with_missing_first() {
        let data = small();
        // values: [3, 1, 2, NaN, 1]; ties keep row order (1 before 4)
        assert_eq!(data.order(0), &[3, 1, 4, 2, 0]);
    }

    #[test]
    fn sort_order_covers_training_rows_only() {
        let data = small().with_validation_rows(2).unwrap();
        assert_eq!(data.n_train(), 3);
        // training values: [3, 1, 2]
        assert_eq!(data.order(0), &[1, 2, 0]);
    }

    #[test]
    fn sort_order_stable_under_ties() {
        let data = Dataset::new(
            vec![vec![7.0, 7.0, 7.0, 1.0]],
            vec![FeatureKind::Continuous],
            vec![0.0; 4],
        )
        .unwrap();
        assert_eq!(data.order(0), &[3, 0, 1, 2]);
    }

    // ---- View Tests ----

    #[test]
    fn views_translate_indices() {
        let data = small()
            .with_validation_rows(2)
            .unwrap()
            .with_offsets(vec![0.1, 0.2, 0.3, 0.4, 0.5])
            .unwrap();

        let train = data.train_view();
        assert_eq!(train.len(), 3);
        assert_eq!(train.y(2), 2.0);

        let valid = data.validation_view();
        assert_eq!(valid.len(), 2);
        assert_eq!(valid.y(0), 3.0);
        assert_eq!(valid.offset(1), 0.5);
        assert!(valid.x(0, 0).is_nan());
    }
}
