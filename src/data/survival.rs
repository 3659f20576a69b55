//! Counting-process survival records for the Cox family.
//!
//! Each observation carries an interval `(start, stop]` and an event status
//! (1 = event at `stop`, 0 = censored). The partial-likelihood walk consumes
//! rows from the largest stop time downward, so both partitions precompute
//! descending stop-time and start-time permutations, grouped by stratum.

use crate::data::dataset::DatasetError;
use crate::data::Partition;

/// Raw per-row survival input.
#[derive(Debug, Clone)]
pub struct SurvivalRecords {
    pub start: Vec<f64>,
    pub stop: Vec<f64>,
    /// 1.0 for an event at `stop`, 0.0 for censoring.
    pub status: Vec<f64>,
    /// Optional stratum id per row; rows of one stratum must be contiguous
    /// within each partition. `None` means a single stratum.
    pub strata: Option<Vec<u32>>,
}

/// Per-partition walk orders over the survival rows.
#[derive(Debug, Clone)]
pub struct PartitionOrders {
    /// Partition-local rows, stratum by stratum, descending by stop time.
    /// Tied censored rows come before tied events so a subject's interval
    /// closes before the hazard at its endpoint is charged.
    pub end_order: Vec<u32>,
    /// Partition-local rows, stratum by stratum, descending by start time.
    pub start_order: Vec<u32>,
    /// Cumulative end position of each stratum in the orders above; the
    /// last entry equals the partition length.
    pub boundaries: Vec<usize>,
}

/// Validated survival data with precomputed walk orders.
#[derive(Debug, Clone)]
pub struct SurvivalData {
    records: SurvivalRecords,
    train: PartitionOrders,
    valid: PartitionOrders,
}

impl SurvivalData {
    pub fn new(
        records: SurvivalRecords,
        n_train: usize,
        n_valid: usize,
    ) -> Result<Self, DatasetError> {
        let n_rows = n_train + n_valid;
        for name_check in [
            ("survival stop", records.stop.len()),
            ("survival status", records.status.len()),
        ] {
            if name_check.1 != records.start.len() {
                return Err(DatasetError::VectorLength {
                    name: name_check.0,
                    len: name_check.1,
                    expected: records.start.len(),
                });
            }
        }
        if records.start.len() != n_rows {
            return Err(DatasetError::VectorLength {
                name: "survival",
                len: records.start.len(),
                expected: n_rows,
            });
        }

        for row in 0..n_rows {
            if !(records.start[row] < records.stop[row]) {
                return Err(DatasetError::BadInterval {
                    row,
                    start: records.start[row],
                    stop: records.stop[row],
                });
            }
            let status = records.status[row];
            if status != 0.0 && status != 1.0 {
                return Err(DatasetError::BadStatus { row, status });
            }
        }

        if let Some(strata) = &records.strata {
            if strata.len() != n_rows {
                return Err(DatasetError::VectorLength {
                    name: "strata",
                    len: strata.len(),
                    expected: n_rows,
                });
            }
            for range in [0..n_train, n_train..n_rows] {
                let mut seen: Vec<u32> = Vec::new();
                for row in range {
                    let id = strata[row];
                    match seen.last() {
                        Some(&last) if last == id => {}
                        _ => {
                            if seen.contains(&id) {
                                return Err(DatasetError::BadStrata { row });
                            }
                            seen.push(id);
                        }
                    }
                }
            }
        }

        let train = Self::partition_orders(&records, 0, n_train);
        let valid = Self::partition_orders(&records, n_train, n_valid);
        Ok(Self {
            records,
            train,
            valid,
        })
    }

    fn partition_orders(records: &SurvivalRecords, base: usize, len: usize) -> PartitionOrders {
        // Stratum segment boundaries in local row space.
        let mut boundaries = Vec::new();
        if len > 0 {
            match &records.strata {
                Some(strata) => {
                    for i in 1..len {
                        if strata[base + i] != strata[base + i - 1] {
                            boundaries.push(i);
                        }
                    }
                    boundaries.push(len);
                }
                None => boundaries.push(len),
            }
        }

        let mut end_order: Vec<u32> = Vec::with_capacity(len);
        let mut start_order: Vec<u32> = Vec::with_capacity(len);
        let mut segment_start = 0usize;
        for &segment_end in &boundaries {
            let mut ends: Vec<u32> = (segment_start as u32..segment_end as u32).collect();
            ends.sort_by(|&a, &b| {
                let (ga, gb) = (base + a as usize, base + b as usize);
                records.stop[gb]
                    .partial_cmp(&records.stop[ga])
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        // censored before events at a tied stop time
                        records.status[ga]
                            .partial_cmp(&records.status[gb])
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
            });
            let mut starts: Vec<u32> = (segment_start as u32..segment_end as u32).collect();
            starts.sort_by(|&a, &b| {
                let (ga, gb) = (base + a as usize, base + b as usize);
                records.start[gb]
                    .partial_cmp(&records.start[ga])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            end_order.extend(ends);
            start_order.extend(starts);
            segment_start = segment_end;
        }

        PartitionOrders {
            end_order,
            start_order,
            boundaries,
        }
    }

    pub(crate) fn into_records(self) -> SurvivalRecords {
        self.records
    }

    /// Walk orders for one partition.
    pub fn orders(&self, partition: Partition) -> &PartitionOrders {
        match partition {
            Partition::Train => &self.train,
            Partition::Validation => &self.valid,
        }
    }

    #[inline]
    pub fn start(&self, row: usize) -> f64 {
        self.records.start[row]
    }

    #[inline]
    pub fn stop(&self, row: usize) -> f64 {
        self.records.stop[row]
    }

    #[inline]
    pub fn status(&self, row: usize) -> f64 {
        self.records.status[row]
    }
}

// ============================================================================
// Tests
// ============================================================================
