//! CART (Classification and Regression Tree) builder
//!
//! Deterministic exact-greedy regression tree construction. Splits minimize
//! the summed squared error of the children; equal-gain candidates resolve
//! to the smallest (feature, position) pair.

use housing_core::deterministic::{LcgRng, SplitTieBreaker};
use housing_core::{Node, Tree};

/// Training parameters for a single tree
#[derive(Clone, Debug, PartialEq)]
pub struct TreeConfig {
    /// Maximum depth, unlimited when `None`
    pub max_depth: Option<usize>,
    /// Minimum samples required to split an internal node
    pub min_samples_split: usize,
    /// Minimum samples in each leaf
    pub min_samples_leaf: usize,
    /// Features considered at each split, sampled without replacement
    pub max_features: usize,
}

impl TreeConfig {
    /// Fully grown tree over `feature_count` features
    pub fn unbounded(feature_count: usize) -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: feature_count,
        }
    }
}

/// Split candidate with gain and tie-breaker
#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
    tie_breaker: SplitTieBreaker,
}

/// Build a regression tree from a row-major feature matrix
pub struct CartBuilder<'a> {
    config: TreeConfig,
    features: &'a [Vec<f64>],
    targets: &'a [f64],
    feature_count: usize,
}

impl<'a> CartBuilder<'a> {
    /// `features` and `targets` must have equal length; the estimator checks
    /// this before building.
    pub fn new(features: &'a [Vec<f64>], targets: &'a [f64], config: TreeConfig) -> Self {
        let feature_count = features.first().map_or(0, Vec::len);
        Self {
            config,
            features,
            targets,
            feature_count,
        }
    }

    /// Build a tree over the rows `sample` (duplicates allowed, as produced
    /// by bootstrapping). `rng` drives per-node feature subsampling.
    pub fn build(&self, sample: &[usize], rng: &mut LcgRng) -> Tree {
        let mut nodes = Vec::new();
        self.build_node(sample, 0, &mut nodes, rng);
        Tree::new(nodes)
    }

    /// Recursively build tree nodes, returning the index of the new node
    fn build_node(
        &self,
        indices: &[usize],
        depth: usize,
        nodes: &mut Vec<Node>,
        rng: &mut LcgRng,
    ) -> i32 {
        let current_idx = nodes.len();
        let leaf_value = self.mean_target(indices);

        let depth_reached = self.config.max_depth.is_some_and(|max| depth >= max);
        if depth_reached
            || indices.len() < self.config.min_samples_split
            || indices.len() < 2 * self.config.min_samples_leaf
            || self.is_pure(indices)
        {
            nodes.push(Node::leaf(current_idx as u32, leaf_value));
            return current_idx as i32;
        }

        let Some(split) = self.find_best_split(indices, rng) else {
            nodes.push(Node::leaf(current_idx as u32, leaf_value));
            return current_idx as i32;
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&idx| self.features[idx][split.feature_idx] <= split.threshold);

        // Reserve space for current node
        nodes.push(Node::internal(
            current_idx as u32,
            split.feature_idx as i32,
            split.threshold,
            -1,
            -1,
        ));

        let left_idx = self.build_node(&left_indices, depth + 1, nodes, rng);
        let right_idx = self.build_node(&right_indices, depth + 1, nodes, rng);

        nodes[current_idx].left = left_idx;
        nodes[current_idx].right = right_idx;

        current_idx as i32
    }

    /// Features to consider at one node, in ascending order
    fn candidate_features(&self, rng: &mut LcgRng) -> Vec<usize> {
        let mut all: Vec<usize> = (0..self.feature_count).collect();
        let k = self.config.max_features.clamp(1, self.feature_count.max(1));
        if k >= self.feature_count {
            return all;
        }
        rng.shuffle(&mut all);
        let mut chosen = all[..k].to_vec();
        chosen.sort_unstable();
        chosen
    }

    /// Find best split using the exact-greedy algorithm
    fn find_best_split(&self, indices: &[usize], rng: &mut LcgRng) -> Option<SplitCandidate> {
        let n = indices.len();
        let total_sum: f64 = indices.iter().map(|&i| self.targets[i]).sum();
        let parent_score = total_sum * total_sum / n as f64;
        let min_leaf = self.config.min_samples_leaf.max(1);

        let mut best_split: Option<SplitCandidate> = None;

        for feature_idx in self.candidate_features(rng) {
            let mut sorted: Vec<(f64, f64)> = indices
                .iter()
                .map(|&i| (self.features[i][feature_idx], self.targets[i]))
                .collect();
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_sum = 0.0;
            for position in 0..n - 1 {
                left_sum += sorted[position].1;
                let left_count = position + 1;
                let right_count = n - left_count;

                let (value, next) = (sorted[position].0, sorted[position + 1].0);
                if left_count < min_leaf || right_count < min_leaf || value == next {
                    continue;
                }

                let threshold = midpoint(value, next);
                if !threshold.is_finite() {
                    continue;
                }

                // Reduction in squared error relative to the parent
                let right_sum = total_sum - left_sum;
                let gain = left_sum * left_sum / left_count as f64
                    + right_sum * right_sum / right_count as f64
                    - parent_score;
                if gain <= f64::EPSILON * parent_score.abs().max(1.0) {
                    continue;
                }

                let candidate = SplitCandidate {
                    feature_idx,
                    threshold,
                    gain,
                    tie_breaker: SplitTieBreaker::new(feature_idx, position),
                };

                best_split = match best_split {
                    None => Some(candidate),
                    Some(current) => {
                        // Deterministic tie-breaking
                        if gain > current.gain
                            || (gain == current.gain && candidate.tie_breaker < current.tie_breaker)
                        {
                            Some(candidate)
                        } else {
                            Some(current)
                        }
                    }
                };
            }
        }

        best_split
    }

    fn mean_target(&self, indices: &[usize]) -> f64 {
        if indices.is_empty() {
            return 0.0;
        }
        indices.iter().map(|&i| self.targets[i]).sum::<f64>() / indices.len() as f64
    }

    fn is_pure(&self, indices: &[usize]) -> bool {
        match indices.first() {
            Some(&first) => indices.iter().all(|&i| self.targets[i] == self.targets[first]),
            None => true,
        }
    }
}

/// Threshold between two distinct sorted values. Falls back to the lower
/// value when the midpoint rounds up to the upper one.
fn midpoint(low: f64, high: f64) -> f64 {
    let mid = low + (high - low) / 2.0;
    if mid >= high {
        low
    } else {
        mid
    }
}
