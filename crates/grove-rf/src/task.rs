//! Per-tree build tasks.

use std::sync::Arc;

use rand::{Rng, RngCore};
use tracing::{debug, info, instrument};

use crate::config::ForestConfig;
use crate::data::TrainingView;
use crate::error::ForestError;
use crate::model::GrownTree;
use crate::seed::RngKind;
use crate::store::{ForestStore, ModelKey};
use crate::strata::StratificationPlan;
use crate::tree::DecisionTreeConfig;

/// A unit of work that can be handed to a [`BatchExecutor`](crate::BatchExecutor).
///
/// A task is executed at most once. It owns everything it needs, so an
/// executor may run it on any worker.
pub trait BuildTask: Send + Sync {
    /// What a successful run reports back.
    type Output: Send;

    /// Position of the task within its job.
    fn index(&self) -> usize;

    /// Execute the task.
    ///
    /// # Errors
    ///
    /// Any [`ForestError`] the work produced.
    fn run(&self) -> Result<Self::Output, ForestError>;
}

/// State shared read-only by every tree task of one job.
#[derive(Debug)]
pub struct TreeContext {
    view: TrainingView,
    tree_config: DecisionTreeConfig,
    n_trees: usize,
    sample_fraction: f64,
    n_rows: usize,
    stratification: StratificationPlan,
    verbosity: u8,
    rng_kind: RngKind,
    store: Arc<ForestStore>,
}

impl TreeContext {
    /// Capture the training view and the per-tree settings of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidMaxFeatures`] if the max-features
    /// strategy does not fit the view's predictor count.
    pub fn new(
        view: TrainingView,
        config: &ForestConfig,
        store: Arc<ForestStore>,
    ) -> Result<Self, ForestError> {
        let max_features = config.max_features().resolve(view.n_features())?;
        let tree_config = DecisionTreeConfig::new()
            .with_criterion(config.criterion())
            .with_max_depth(config.max_depth())
            .with_min_error_rate(config.min_error_rate())
            .with_max_features(Some(max_features))
            .with_exclusive_split_limit(config.exclusive_split_limit());
        Ok(Self {
            n_rows: view.n_rows(),
            view,
            tree_config,
            n_trees: config.n_trees(),
            sample_fraction: config.sample_fraction(),
            stratification: config.stratification().clone(),
            verbosity: config.verbosity(),
            rng_kind: config.rng_kind(),
            store,
        })
    }

    /// Return the training view.
    #[must_use]
    pub fn view(&self) -> &TrainingView {
        &self.view
    }

    /// Return the number of trees in the job.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }
}

/// Short record of one finished tree, returned through the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TreeSummary {
    /// Tree index.
    pub index: usize,
    /// Task seed.
    pub seed: u64,
    /// Rows sampled into the tree.
    pub n_sampled: usize,
    /// Rows left out of the tree.
    pub n_oob: usize,
    /// Node count.
    pub n_nodes: usize,
    /// Leaf count.
    pub n_leaves: usize,
    /// Depth of the deepest leaf.
    pub depth: usize,
}

/// Grow tree `index` from `seed` and append it to the model under `model_key`.
#[derive(Debug, Clone)]
pub struct GrowTree {
    index: usize,
    seed: u64,
    model_key: ModelKey,
    context: Arc<TreeContext>,
}

impl GrowTree {
    /// Build one task per seed, in index order.
    #[must_use]
    pub fn plan(context: &Arc<TreeContext>, seeds: &[u64], model_key: &ModelKey) -> Vec<Self> {
        seeds
            .iter()
            .enumerate()
            .map(|(index, &seed)| Self {
                index,
                seed,
                model_key: model_key.clone(),
                context: Arc::clone(context),
            })
            .collect()
    }

    /// Return the task's seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Return the key of the model the tree is appended to.
    #[must_use]
    pub fn model_key(&self) -> &ModelKey {
        &self.model_key
    }

    /// Split rows into sampled and out-of-bag rows, in row order.
    fn sample(&self, rng: &mut impl RngCore) -> (Vec<usize>, Vec<usize>) {
        let ctx = &self.context;
        let labels = ctx.view.labels();
        let mut in_bag = Vec::with_capacity(ctx.n_rows);
        let mut out_of_bag = Vec::new();
        for (row, &label) in labels.iter().enumerate() {
            let p = ctx
                .stratification
                .sample_probability(label, ctx.sample_fraction);
            if rng.gen_bool(p.clamp(0.0, 1.0)) {
                in_bag.push(row);
            } else {
                out_of_bag.push(row);
            }
        }
        (in_bag, out_of_bag)
    }
}

impl BuildTask for GrowTree {
    type Output = TreeSummary;

    fn index(&self) -> usize {
        self.index
    }

    #[instrument(skip_all, fields(tree = self.index, seed = self.seed))]
    fn run(&self) -> Result<TreeSummary, ForestError> {
        let ctx = &self.context;
        let mut rng = ctx.rng_kind.generator(self.seed);
        let (in_bag, oob_rows) = self.sample(&mut rng);
        if in_bag.is_empty() {
            return Err(ForestError::EmptySample {
                tree: self.index,
                n_rows: ctx.n_rows,
            });
        }

        let mut tree_rng = ctx.rng_kind.generator(rng.next_u64());
        let tree = ctx.tree_config.grow(
            &ctx.view,
            &in_bag,
            ctx.stratification.class_weights(),
            &mut tree_rng,
        )?;

        let summary = TreeSummary {
            index: self.index,
            seed: self.seed,
            n_sampled: in_bag.len(),
            n_oob: oob_rows.len(),
            n_nodes: tree.n_nodes(),
            n_leaves: tree.n_leaves(),
            depth: tree.depth(),
        };
        let n_done = ctx.store.append_tree(
            &self.model_key,
            GrownTree {
                index: self.index,
                seed: self.seed,
                tree,
                oob_rows,
            },
        )?;

        if ctx.verbosity >= 1 {
            info!(
                n_done,
                n_trees = ctx.n_trees,
                n_nodes = summary.n_nodes,
                depth = summary.depth,
                n_oob = summary.n_oob,
                "tree grown"
            );
        } else {
            debug!(n_done, n_trees = ctx.n_trees, n_nodes = summary.n_nodes, "tree grown");
        }
        Ok(summary)
    }
}
