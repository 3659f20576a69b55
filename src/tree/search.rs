//! Tree growth engine.
//!
//! Grows one tree per boosting round by repeated levels of split search:
//! every feature's sorted order is walked once per level, routing each
//! in-bag row to the split finder of its current node; then the single
//! best split across all open nodes is applied, replacing one terminal by
//! three children. Nodes scanned in an earlier level keep their cached
//! candidate and are skipped until they are actually split.

use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::data::{Bag, Dataset};
use crate::tree::splitter::{SplitCandidate, VarSplitter};
use crate::tree::{Direction, NodeStats, Tree};

/// Result of one growth pass: the tree plus the row-to-slot assignment of
/// every training row (in-bag or not).
#[derive(Debug, Clone)]
pub struct GrownTree {
    pub tree: Tree,
    /// Terminal-slot index per training row.
    pub assignments: Vec<u32>,
}

/// Search state of one terminal slot.
#[derive(Debug)]
struct SlotState {
    splitter: VarSplitter,
    /// Candidate cached; skip rescanning until the node is split.
    assigned: bool,
    /// Nodes under the minimum leaf size are excluded from search.
    eligible: bool,
}

impl SlotState {
    fn new(stats: NodeStats, min_obs: usize) -> Self {
        Self {
            eligible: stats.count >= min_obs,
            splitter: VarSplitter::new(stats, min_obs),
            assigned: false,
        }
    }

    fn open(&self) -> bool {
        !self.assigned && self.eligible
    }
}

/// Grows one ternary regression tree from residuals.
#[derive(Debug, Clone)]
pub struct TreeGrower {
    pub max_terminal_nodes: usize,
    pub min_node_obs: usize,
    /// Fraction of features scanned per level, drawn as a random prefix of
    /// the shuffled feature order.
    pub col_fraction: f64,
}

impl TreeGrower {
    pub fn new(max_terminal_nodes: usize, min_node_obs: usize) -> Self {
        Self {
            max_terminal_nodes,
            min_node_obs,
            col_fraction: 1.0,
        }
    }

    pub fn with_col_fraction(mut self, col_fraction: f64) -> Self {
        self.col_fraction = col_fraction;
        self
    }

    /// Grow a tree over the in-bag rows of `data` against `residuals`.
    pub fn grow(&self, data: &Dataset, bag: &Bag, residuals: &[f64], seed: u64) -> GrownTree {
        let n_train = data.n_train();
        let mut root_stats = NodeStats::default();
        for row in 0..n_train {
            if bag.contains(row) {
                root_stats.add(residuals[row], data.weight(row));
            }
        }

        let mut tree = Tree::with_root(root_stats);
        let mut assignments = vec![0u32; n_train];
        let mut states = vec![SlotState::new(root_stats, self.min_node_obs)];
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);

        while tree.n_terminals() + 2 <= self.max_terminal_nodes {
            self.generate_all_splits(data, bag, residuals, &assignments, &mut states, &mut rng);
            let Some((slot, candidate)) = best_candidate(&mut states) else {
                break;
            };
            self.apply(data, &mut tree, &mut states, &mut assignments, slot, candidate);
        }

        GrownTree { tree, assignments }
    }

    /// One level of split search: walk each feature's sorted order once,
    /// feeding every open node's splitter.
    fn generate_all_splits(
        &self,
        data: &Dataset,
        bag: &Bag,
        residuals: &[f64],
        assignments: &[u32],
        states: &mut [SlotState],
        rng: &mut Xoshiro256PlusPlus,
    ) {
        let n_features = data.n_features();
        let mut feature_order: Vec<usize> = (0..n_features).collect();
        feature_order.shuffle(rng);
        let n_scan = ((n_features as f64 * self.col_fraction).ceil() as usize).clamp(1, n_features);

        for &feature in feature_order.iter().take(n_scan) {
            let kind = data.kind(feature);
            let monotone = data.monotone(feature);
            for state in states.iter_mut() {
                if state.open() {
                    state.splitter.begin_feature(feature, kind, monotone);
                }
            }

            for &row in data.order(feature) {
                let row = row as usize;
                if !bag.contains(row) {
                    continue;
                }
                let state = &mut states[assignments[row] as usize];
                if !state.open() {
                    continue;
                }
                state
                    .splitter
                    .push(data.x(row, feature), residuals[row], data.weight(row));
            }

            for state in states.iter_mut() {
                if state.open() {
                    state.splitter.end_feature();
                }
            }
        }
    }

    /// Apply the selected split: materialize children, reassign the rows of
    /// the split node by replaying the rule, and open the three new slots.
    fn apply(
        &self,
        data: &Dataset,
        tree: &mut Tree,
        states: &mut Vec<SlotState>,
        assignments: &mut [u32],
        slot: usize,
        candidate: SplitCandidate,
    ) {
        let split = candidate.to_split();
        tree.apply_split(
            slot,
            split.clone(),
            candidate.left,
            candidate.right,
            candidate.missing,
        );
        let right_slot = (tree.n_terminals() - 2) as u32;
        let missing_slot = (tree.n_terminals() - 1) as u32;

        for (row, assigned) in assignments.iter_mut().enumerate() {
            if *assigned == slot as u32 {
                match split.route(data.x(row, split.feature)) {
                    Direction::Left => {}
                    Direction::Right => *assigned = right_slot,
                    Direction::Missing => *assigned = missing_slot,
                }
            }
        }

        states[slot] = SlotState::new(candidate.left, self.min_node_obs);
        states.push(SlotState::new(candidate.right, self.min_node_obs));
        states.push(SlotState::new(candidate.missing, self.min_node_obs));
    }
}

/// Select the best cached candidate across all slots and mark every slot
/// split-assigned. Returns `None` when no candidate improves the loss.
fn best_candidate(states: &mut [SlotState]) -> Option<(usize, SplitCandidate)> {
    let mut best: Option<(usize, SplitCandidate)> = None;
    for (slot, state) in states.iter_mut().enumerate() {
        state.assigned = true;
        if let Some(candidate) = state.splitter.best() {
            let current = best.as_ref().map_or(0.0, |(_, b)| b.improvement);
            if candidate.improvement > current {
                best = Some((slot, candidate.clone()));
            }
        }
    }
    best
}

// ============================================================================
// Tests
// ============================================================================
