//! CART (Classification and Regression Tree) builder
//!
//! Implements deterministic exact-greedy decision tree construction over
//! fixed-point features, gradients and hessians. Feature columns are sorted
//! once per dataset; each tree filters those orders down to its sampled rows
//! and every split partitions them stably, so no node re-sorts.

use churn_core::gbdt::{Node, SCALE};

use crate::deterministic::SplitTieBreaker;

/// Training parameters for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Minimum hessian sum per child, fixed-point
    pub min_child_weight: i64,
    /// L2 regularisation on leaf values, fixed-point
    pub lambda: i64,
    /// Width of a threshold bucket, fixed-point
    pub quant_step: i64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 6,
            min_samples_leaf: 1,
            min_child_weight: SCALE,
            lambda: SCALE,
            quant_step: 1,
        }
    }
}

/// Row indices of a dataset sorted by each feature's value
#[derive(Clone, Debug)]
pub struct SortedColumns {
    order: Vec<Vec<usize>>,
}

impl SortedColumns {
    pub fn new(features: &[Vec<i64>], feature_count: usize) -> Self {
        let order = (0..feature_count)
            .map(|f| {
                let mut rows: Vec<usize> = (0..features.len()).collect();
                // Stable sort keeps row order within equal values
                rows.sort_by_key(|&r| features[r][f]);
                rows
            })
            .collect();
        Self { order }
    }
}

/// Split candidate with gain and tie-breaker
#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: i64,
    gain: i128,
    tie_breaker: SplitTieBreaker,
}

impl SplitCandidate {
    fn new(feature_idx: usize, threshold: i64, gain: i128) -> Self {
        Self {
            feature_idx,
            threshold,
            gain,
            tie_breaker: SplitTieBreaker::new(feature_idx, threshold),
        }
    }

    fn beats(&self, other: &SplitCandidate) -> bool {
        self.gain > other.gain || (self.gain == other.gain && self.tie_breaker < other.tie_breaker)
    }
}

/// Rows reaching a node, once per allowed feature in that feature's order
struct NodeRows {
    lists: Vec<Vec<usize>>,
    rows: Vec<usize>,
}

/// Build a regression tree on gradient statistics using exact-greedy CART
pub struct CartBuilder<'a> {
    config: TreeConfig,
    features: &'a [Vec<i64>],
    gradients: &'a [i64],
    hessians: &'a [i64],
}

impl<'a> CartBuilder<'a> {
    pub fn new(
        features: &'a [Vec<i64>],
        gradients: &'a [i64],
        hessians: &'a [i64],
        config: TreeConfig,
    ) -> Self {
        debug_assert_eq!(features.len(), gradients.len());
        debug_assert_eq!(features.len(), hessians.len());
        Self {
            config,
            features,
            gradients,
            hessians,
        }
    }

    /// Build tree nodes over the rows flagged in `in_sample`, considering
    /// only `allowed_features` (ascending global indices).
    pub fn build(&self, sorted: &SortedColumns, in_sample: &[bool], allowed_features: &[usize]) -> Vec<Node> {
        let lists: Vec<Vec<usize>> = allowed_features
            .iter()
            .map(|&f| {
                sorted.order[f]
                    .iter()
                    .copied()
                    .filter(|&r| in_sample[r])
                    .collect()
            })
            .collect();
        let rows: Vec<usize> = (0..in_sample.len()).filter(|&r| in_sample[r]).collect();

        let mut nodes = Vec::new();
        self.build_node(NodeRows { lists, rows }, allowed_features, 0, &mut nodes);
        nodes
    }

    /// Recursively build tree nodes; returns the index of the created node
    fn build_node(
        &self,
        node_rows: NodeRows,
        allowed_features: &[usize],
        depth: usize,
        nodes: &mut Vec<Node>,
    ) -> i32 {
        let current_idx = nodes.len();
        let (sum_g, sum_h) = self.sum_gradients_hessians(&node_rows.rows);

        let split = if depth >= self.config.max_depth
            || node_rows.rows.len() < 2 * self.config.min_samples_leaf.max(1)
        {
            None
        } else {
            self.find_best_split(&node_rows, allowed_features, sum_g, sum_h)
        };

        let Some(split) = split else {
            nodes.push(Node::leaf(current_idx as i32, self.leaf_value(sum_g, sum_h)));
            return current_idx as i32;
        };

        let (left, right) = self.partition(node_rows, &split);

        // Reserve space for current node
        nodes.push(Node::internal(
            current_idx as i32,
            split.feature_idx as i32,
            split.threshold,
            -1,
            -1,
        ));

        let left_idx = self.build_node(left, allowed_features, depth + 1, nodes);
        let right_idx = self.build_node(right, allowed_features, depth + 1, nodes);

        nodes[current_idx].left = left_idx;
        nodes[current_idx].right = right_idx;

        current_idx as i32
    }

    /// Scan every allowed feature in sorted order, evaluating a split at each
    /// boundary between threshold buckets.
    fn find_best_split(
        &self,
        node_rows: &NodeRows,
        allowed_features: &[usize],
        sum_g: i64,
        sum_h: i64,
    ) -> Option<SplitCandidate> {
        let n = node_rows.rows.len();
        let min_leaf = self.config.min_samples_leaf.max(1);
        let parent_score = self.score(i128::from(sum_g), i128::from(sum_h));
        let mut best: Option<SplitCandidate> = None;

        for (list, &feature_idx) in node_rows.lists.iter().zip(allowed_features) {
            let mut g_left = 0i128;
            let mut h_left = 0i128;

            for (pos, &row) in list.iter().enumerate() {
                g_left += i128::from(self.gradients[row]);
                h_left += i128::from(self.hessians[row]);

                let Some(&next) = list.get(pos + 1) else {
                    break;
                };
                let bucket = self.bucket(self.features[row][feature_idx]);
                if bucket == self.bucket(self.features[next][feature_idx]) {
                    continue;
                }

                let n_left = pos + 1;
                if n_left < min_leaf || n - n_left < min_leaf {
                    continue;
                }
                let g_right = i128::from(sum_g) - g_left;
                let h_right = i128::from(sum_h) - h_left;
                let min_weight = i128::from(self.config.min_child_weight);
                if h_left < min_weight || h_right < min_weight {
                    continue;
                }

                let gain = self.score(g_left, h_left) + self.score(g_right, h_right) - parent_score;
                if gain <= 0 {
                    continue;
                }

                let threshold = self.bucket_upper_bound(bucket);
                let candidate = SplitCandidate::new(feature_idx, threshold, gain);
                if best.as_ref().map_or(true, |current| candidate.beats(current)) {
                    best = Some(candidate);
                }
            }
        }

        best
    }

    /// Stable partition of every per-feature list on the chosen split
    fn partition(&self, node_rows: NodeRows, split: &SplitCandidate) -> (NodeRows, NodeRows) {
        let goes_left = |r: usize| self.features[r][split.feature_idx] <= split.threshold;
        let split_list = |list: Vec<usize>| -> (Vec<usize>, Vec<usize>) {
            list.into_iter().partition(|&r| goes_left(r))
        };

        let mut left_lists = Vec::with_capacity(node_rows.lists.len());
        let mut right_lists = Vec::with_capacity(node_rows.lists.len());
        for list in node_rows.lists {
            let (l, r) = split_list(list);
            left_lists.push(l);
            right_lists.push(r);
        }
        let (left_rows, right_rows) = split_list(node_rows.rows);

        (
            NodeRows {
                lists: left_lists,
                rows: left_rows,
            },
            NodeRows {
                lists: right_lists,
                rows: right_rows,
            },
        )
    }

    fn bucket(&self, value: i64) -> i64 {
        value.div_euclid(self.config.quant_step.max(1))
    }

    /// Largest value that still falls in `bucket`
    fn bucket_upper_bound(&self, bucket: i64) -> i64 {
        let step = self.config.quant_step.max(1);
        bucket.saturating_mul(step).saturating_add(step - 1)
    }

    /// Structure score G² / (H + λ)
    fn score(&self, g: i128, h: i128) -> i128 {
        let denom = h + i128::from(self.config.lambda);
        if denom <= 0 {
            return 0;
        }
        g * g / denom
    }

    /// Sum gradients and hessians for a set of samples
    fn sum_gradients_hessians(&self, rows: &[usize]) -> (i64, i64) {
        let mut sum_g = 0i64;
        let mut sum_h = 0i64;

        for &idx in rows {
            sum_g = sum_g.saturating_add(self.gradients[idx]);
            sum_h = sum_h.saturating_add(self.hessians[idx]);
        }

        (sum_g, sum_h)
    }

    /// Optimal leaf value -G / (H + λ), fixed-point
    fn leaf_value(&self, sum_g: i64, sum_h: i64) -> i64 {
        let denom = i128::from(sum_h) + i128::from(self.config.lambda);
        if denom <= 0 {
            return 0;
        }
        let value = -(i128::from(sum_g) * i128::from(SCALE)) / denom;
        value.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }
}
