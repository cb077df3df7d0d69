use rand::RngCore;
use tracing::{debug, instrument};

use crate::{
    ForestError,
    data::TrainingView,
    node::{Node, NodeIndex},
    split::{SplitContext, SplitCriterion, find_split, weighted_counts},
    strata::ClassWeights,
};

/// Configuration for growing a single decision tree over a [`TrainingView`].
///
/// # Defaults
///
/// | Parameter               | Default            |
/// |-------------------------|--------------------|
/// | `criterion`             | `Entropy`          |
/// | `max_depth`             | `None` (unlimited) |
/// | `min_error_rate`        | 0.0                |
/// | `max_features`          | `None` (all)       |
/// | `exclusive_split_limit` | 0 (disabled)       |
#[derive(Debug, Clone, Default)]
pub struct DecisionTreeConfig {
    pub(crate) criterion: SplitCriterion,
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_error_rate: f64,
    pub(crate) max_features: Option<usize>,
    pub(crate) exclusive_split_limit: usize,
}

impl DecisionTreeConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the split quality criterion.
    #[must_use]
    pub fn with_criterion(mut self, criterion: SplitCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set the maximum tree depth (root is depth 0).
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Stop splitting nodes whose misclassification rate is at or below `rate`.
    #[must_use]
    pub fn with_min_error_rate(mut self, rate: f64) -> Self {
        self.min_error_rate = rate;
        self
    }

    /// Set the number of predictors considered at each split.
    #[must_use]
    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    /// Score single-bin splits on predictors occupying at most `limit` bins
    /// in a node. Zero disables exclusive splits.
    #[must_use]
    pub fn with_exclusive_split_limit(mut self, limit: usize) -> Self {
        self.exclusive_split_limit = limit;
        self
    }

    /// Grow a tree on the given rows of `view`.
    ///
    /// `rng` drives predictor subsampling; the same generator state always
    /// grows the same tree.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`ForestError::EmptyDataset`] | `rows` is empty |
    /// | [`ForestError::InvalidMaxFeatures`] | `max_features` is outside [1, n_features] |
    #[instrument(skip_all, fields(n_rows = rows.len()))]
    pub fn grow(
        &self,
        view: &TrainingView,
        rows: &[usize],
        class_weights: Option<&ClassWeights>,
        rng: &mut impl RngCore,
    ) -> Result<DecisionTree, ForestError> {
        if rows.is_empty() {
            return Err(ForestError::EmptyDataset);
        }
        let n_features = view.n_features();
        let max_features = self.max_features.unwrap_or(n_features);
        if max_features == 0 || max_features > n_features {
            return Err(ForestError::InvalidMaxFeatures {
                max_features,
                n_features,
            });
        }

        let n_classes = view.n_classes();
        let dense_weights: Vec<f64> = (0..n_classes)
            .map(|c| class_weights.map_or(1.0, |w| w.weight_of(c)))
            .collect();

        let ctx = SplitContext {
            features: view.features(),
            labels: view.labels(),
            class_weights: &dense_weights,
            n_classes,
            criterion: self.criterion,
            bins: view.bins(),
            max_features,
            exclusive_split_limit: self.exclusive_split_limit,
        };

        let mut arena: Vec<Node> = Vec::new();
        let root = self.build_node(&ctx, rows, 0, rng, &mut arena);

        debug!(
            root_index = root.index(),
            n_nodes = arena.len(),
            "decision tree grown"
        );

        Ok(DecisionTree {
            nodes: arena,
            n_features,
        })
    }

    /// Recursively build the arena; returns the index of the node just created.
    fn build_node(
        &self,
        ctx: &SplitContext<'_>,
        rows: &[usize],
        depth: usize,
        rng: &mut impl RngCore,
        arena: &mut Vec<Node>,
    ) -> NodeIndex {
        let n_samples = rows.len();
        let counts = weighted_counts(ctx, rows);
        let impurity = self.criterion.impurity(&counts);

        let total: f64 = counts.iter().sum();
        let (prediction, majority) = majority_class(&counts);
        let error_rate = if total > 0.0 { 1.0 - majority / total } else { 0.0 };

        let depth_exceeded = self.max_depth.is_some_and(|max_d| depth >= max_d);
        let stop = n_samples < 2 || error_rate <= self.min_error_rate || depth_exceeded;

        let split = if stop { None } else { find_split(ctx, rows, rng) };
        let Some(split) = split else {
            let distribution = if total > 0.0 {
                counts.iter().map(|&c| c / total).collect()
            } else {
                vec![1.0 / ctx.n_classes as f64; ctx.n_classes]
            };
            arena.push(Node::Leaf {
                prediction,
                distribution,
                impurity,
                n_samples,
            });
            return NodeIndex::new(arena.len() - 1);
        };

        // Reserve this node's slot, recurse, then overwrite with the split.
        let node_idx = arena.len();
        arena.push(Node::Leaf {
            prediction,
            distribution: Vec::new(),
            impurity,
            n_samples,
        });

        let left = self.build_node(ctx, &split.left_rows, depth + 1, rng, arena);
        let right = self.build_node(ctx, &split.right_rows, depth + 1, rng, arena);

        arena[node_idx] = Node::Split {
            feature: split.feature,
            test: split.test,
            left,
            right,
            impurity,
            n_samples,
        };

        NodeIndex::new(node_idx)
    }
}

/// Argmax of weighted counts; ties resolve to the lowest class.
fn majority_class(counts: &[f64]) -> (usize, f64) {
    counts
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (class, &c)| {
            if c > best.1 { (class, c) } else { best }
        })
}

/// A grown decision tree.
///
/// Stored as an arena-based `Vec<Node>` with index references.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DecisionTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) n_features: usize,
}

impl DecisionTree {
    /// Predict the class label for one row of predictor values.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn predict(&self, sample: &[f64]) -> Result<usize, ForestError> {
        match self.leaf(sample)? {
            Node::Leaf { prediction, .. } => Ok(*prediction),
            Node::Split { .. } => unreachable!("traversal always ends at a leaf"),
        }
    }

    /// Return the total number of nodes.
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth of the tree; a lone root leaf has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut max_depth = 0usize;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, d)) = stack.pop() {
            match &self.nodes[idx] {
                Node::Leaf { .. } => max_depth = max_depth.max(d),
                Node::Split { left, right, .. } => {
                    stack.push((left.index(), d + 1));
                    stack.push((right.index(), d + 1));
                }
            }
        }
        max_depth
    }

    fn leaf(&self, sample: &[f64]) -> Result<&Node, ForestError> {
        if sample.len() != self.n_features {
            return Err(ForestError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                node @ Node::Leaf { .. } => return Ok(node),
                Node::Split {
                    feature,
                    test,
                    left,
                    right,
                    ..
                } => {
                    idx = if test.goes_left(sample[feature.index()]) {
                        left.index()
                    } else {
                        right.index()
                    };
                }
            }
        }
    }
}
