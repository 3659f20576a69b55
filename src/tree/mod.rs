//! Ternary regression trees stored as an index arena.
//!
//! Every split node owns exactly three children: left, right, and a
//! dedicated missing-value branch. Nodes are addressed by index into the
//! arena; the terminal nodes are additionally tracked in a slot list whose
//! positions double as the values of the row-to-node assignment array kept
//! by the growth engine.

mod search;
mod splitter;

pub use search::{GrownTree, TreeGrower};
pub use splitter::{SplitCandidate, VarSplitter};

// ============================================================================
// Sufficient statistics
// ============================================================================

/// Running weighted sufficient statistics of a row group: weighted residual
/// sum, weight sum, and observation count.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NodeStats {
    pub sum: f64,
    pub weight: f64,
    pub count: usize,
}

impl NodeStats {
    /// Fold one observation with residual `z` and weight `w` into the group.
    #[inline]
    pub fn add(&mut self, z: f64, w: f64) {
        self.sum += w * z;
        self.weight += w;
        self.count += 1;
    }

    /// Weighted mean residual; 0.0 for a weightless group.
    #[inline]
    pub fn mean(&self) -> f64 {
        if self.weight > 0.0 {
            self.sum / self.weight
        } else {
            0.0
        }
    }

    #[inline]
    pub fn plus(&self, other: &NodeStats) -> NodeStats {
        NodeStats {
            sum: self.sum + other.sum,
            weight: self.weight + other.weight,
            count: self.count + other.count,
        }
    }

    #[inline]
    pub fn minus(&self, other: &NodeStats) -> NodeStats {
        NodeStats {
            sum: self.sum - other.sum,
            weight: self.weight - other.weight,
            count: self.count.saturating_sub(other.count),
        }
    }
}

// ============================================================================
// Split rules
// ============================================================================

/// Routing outcome of a split rule for one feature value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Missing,
}

/// The decision half of a split.
#[derive(Debug, Clone, PartialEq)]
pub enum SplitRule {
    /// Route left when the value is below the threshold.
    Numeric { threshold: f64 },
    /// Route left when the level is in the set (kept sorted ascending).
    Categorical { left_levels: Vec<u32> },
}

/// A materialized split: feature, rule, and the improvement it achieved
/// when selected.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub feature: usize,
    pub rule: SplitRule,
    pub improvement: f64,
}

impl Split {
    /// Route a raw feature value; `NaN` always takes the missing branch.
    #[inline]
    pub fn route(&self, value: f64) -> Direction {
        if value.is_nan() {
            return Direction::Missing;
        }
        match &self.rule {
            SplitRule::Numeric { threshold } => {
                if value < *threshold {
                    Direction::Left
                } else {
                    Direction::Right
                }
            }
            SplitRule::Categorical { left_levels } => {
                if left_levels.binary_search(&(value as u32)).is_ok() {
                    Direction::Left
                } else {
                    Direction::Right
                }
            }
        }
    }
}

// ============================================================================
// Nodes and the tree arena
// ============================================================================

/// One node of the arena. Child indices are meaningful only when `split`
/// is present; a node without a split is terminal.
#[derive(Debug, Clone)]
pub struct Node {
    pub prediction: f64,
    /// In-bag weight sum at creation time.
    pub weight: f64,
    /// In-bag observation count at creation time.
    pub count: usize,
    pub split: Option<Split>,
    pub left: u32,
    pub right: u32,
    pub missing: u32,
}

impl Node {
    fn leaf(prediction: f64, weight: f64, count: usize) -> Self {
        Self {
            prediction,
            weight,
            count,
            split: None,
            left: 0,
            right: 0,
            missing: 0,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.split.is_none()
    }
}

/// Index arena holding one grown regression tree.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    terminals: Vec<u32>,
}

impl Tree {
    /// Single-leaf tree whose root carries the given in-bag statistics.
    pub fn with_root(stats: NodeStats) -> Self {
        Self {
            nodes: vec![Node::leaf(stats.mean(), stats.weight, stats.count)],
            terminals: vec![0],
        }
    }

    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn node(&self, id: usize) -> &Node {
        &self.nodes[id]
    }

    #[inline]
    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    #[inline]
    pub fn n_terminals(&self) -> usize {
        self.terminals.len()
    }

    /// Arena index of the terminal node occupying `slot`.
    #[inline]
    pub fn terminal(&self, slot: usize) -> u32 {
        self.terminals[slot]
    }

    #[inline]
    pub fn terminal_node(&self, slot: usize) -> &Node {
        &self.nodes[self.terminals[slot] as usize]
    }

    #[inline]
    pub fn terminal_node_mut(&mut self, slot: usize) -> &mut Node {
        &mut self.nodes[self.terminals[slot] as usize]
    }

    /// Replace the terminal in `slot` by a split node with three children.
    ///
    /// The left child takes over the parent's slot; the right and missing
    /// children are appended, in that order, to the terminal list. Children
    /// start at their group mean residual; an empty missing group inherits
    /// the mean of the whole parent group instead.
    pub(crate) fn apply_split(
        &mut self,
        slot: usize,
        split: Split,
        left: NodeStats,
        right: NodeStats,
        missing: NodeStats,
    ) {
        let parent_id = self.terminals[slot] as usize;
        let parent_mean = left.plus(&right).plus(&missing).mean();
        let missing_prediction = if missing.count > 0 {
            missing.mean()
        } else {
            parent_mean
        };

        let left_id = self.nodes.len() as u32;
        self.nodes.push(Node::leaf(left.mean(), left.weight, left.count));
        let right_id = self.nodes.len() as u32;
        self.nodes
            .push(Node::leaf(right.mean(), right.weight, right.count));
        let missing_id = self.nodes.len() as u32;
        self.nodes
            .push(Node::leaf(missing_prediction, missing.weight, missing.count));

        let parent = &mut self.nodes[parent_id];
        parent.split = Some(split);
        parent.left = left_id;
        parent.right = right_id;
        parent.missing = missing_id;

        self.terminals[slot] = left_id;
        self.terminals.push(right_id);
        self.terminals.push(missing_id);
    }

    /// Replay the split rules for one row of feature values and return the
    /// prediction of the terminal node it lands in.
    pub fn predict_row<F>(&self, x: F) -> f64
    where
        F: Fn(usize) -> f64,
    {
        let mut id = 0usize;
        loop {
            let node = &self.nodes[id];
            match &node.split {
                None => return node.prediction,
                Some(split) => {
                    id = match split.route(x(split.feature)) {
                        Direction::Left => node.left,
                        Direction::Right => node.right,
                        Direction::Missing => node.missing,
                    } as usize;
                }
            }
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

    fn stats(sum: f64, weight: f64, count: usize) -> NodeStats {
        NodeStats { sum, weight, count }
    }

    // ---- NodeStats Tests ----

    #[test]
    fn stats_accumulate_weighted() {
        let mut s = NodeStats::default();
        s.add(2.0, 1.0);
        s.add(4.0, 3.0);
        assert_abs_diff_eq!(s.sum, 14.0);
        assert_abs_diff_eq!(s.weight, 4.0);
        assert_eq!(s.count, 2);
        assert_abs_diff_eq!(s.mean(), 3.5);
    }

    #[test]
    fn weightless_mean_is_zero() {
        assert_abs_diff_eq!(NodeStats::default().mean(), 0.0);
    }

    // ---- Split routing Tests ----

    #[test]
    fn numeric_split_routes_below_threshold_left() {
        let split = Split {
            feature: 0,
            rule: SplitRule::Numeric { threshold: 5.0 },
            improvement: 1.0,
        };
        assert_eq!(split.route(4.9), Direction::Left);
        assert_eq!(split.route(5.0), Direction::Right);
        assert_eq!(split.route(f64::NAN), Direction::Missing);
    }

    #[test]
    fn categorical_split_routes_by_level_set() {
        let split = Split {
            feature: 2,
            rule: SplitRule::Categorical {
                left_levels: vec![0, 3],
            },
            improvement: 1.0,
        };
        assert_eq!(split.route(3.0), Direction::Left);
        assert_eq!(split.route(1.0), Direction::Right);
        assert_eq!(split.route(f64::NAN), Direction::Missing);
    }

    // ---- Tree arena Tests ----

    #[test]
    fn apply_split_slots_children() {
        let mut tree = Tree::with_root(stats(0.0, 10.0, 10));
        tree.apply_split(
            0,
            Split {
                feature: 0,
                rule: SplitRule::Numeric { threshold: 1.0 },
                improvement: 2.0,
            },
            stats(-4.0, 4.0, 4),
            stats(5.0, 5.0, 5),
            stats(1.0, 1.0, 1),
        );

        assert_eq!(tree.n_terminals(), 3);
        assert_eq!(tree.n_nodes(), 4);
        // left child takes the parent slot, right then missing are appended
        assert_abs_diff_eq!(tree.terminal_node(0).prediction, -1.0);
        assert_abs_diff_eq!(tree.terminal_node(1).prediction, 1.0);
        assert_abs_diff_eq!(tree.terminal_node(2).prediction, 1.0);
        assert!(!tree.root().is_terminal());
    }

    #[test]
    fn empty_missing_group_inherits_parent_mean() {
        let mut tree = Tree::with_root(stats(6.0, 6.0, 6));
        tree.apply_split(
            0,
            Split {
                feature: 0,
                rule: SplitRule::Numeric { threshold: 0.0 },
                improvement: 1.0,
            },
            stats(0.0, 3.0, 3),
            stats(6.0, 3.0, 3),
            NodeStats::default(),
        );
        assert_abs_diff_eq!(tree.terminal_node(2).prediction, 1.0);
    }

    #[test]
    fn predict_row_walks_to_leaf() {
        let mut tree = Tree::with_root(stats(0.0, 4.0, 4));
        tree.apply_split(
            0,
            Split {
                feature: 1,
                rule: SplitRule::Numeric { threshold: 2.0 },
                improvement: 1.0,
            },
            stats(-2.0, 2.0, 2),
            stats(2.0, 1.0, 1),
            stats(0.5, 1.0, 1),
        );

        assert_abs_diff_eq!(tree.predict_row(|_| 1.0), -1.0);
        assert_abs_diff_eq!(tree.predict_row(|_| 3.0), 2.0);
        assert_abs_diff_eq!(tree.predict_row(|_| f64::NAN), 0.5);
    }
}
