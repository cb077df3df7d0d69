//! The end-to-end forest growth job.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::columns::ColumnSet;
use crate::config::ForestConfig;
use crate::confusion::ConfusionResult;
use crate::data::TrainingView;
use crate::dispatch::{BatchExecutor, Dispatcher, RayonExecutor};
use crate::error::ForestError;
use crate::evaluate::Evaluator;
use crate::model::ForestModel;
use crate::seed::derive_tree_seeds;
use crate::store::{DatasetKey, ForestStore, ModelKey};
use crate::task::{GrowTree, TreeContext, TreeSummary};

/// Which evaluations run after the forest is grown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationPlan {
    out_of_bag: bool,
    validation: Option<DatasetKey>,
}

impl Default for EvaluationPlan {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluationPlan {
    /// Out-of-bag error on, no validation dataset.
    #[must_use]
    pub fn new() -> Self {
        Self {
            out_of_bag: true,
            validation: None,
        }
    }

    /// Enable or disable out-of-bag evaluation.
    #[must_use]
    pub fn with_out_of_bag(mut self, enabled: bool) -> Self {
        self.out_of_bag = enabled;
        self
    }

    /// Score the finished model against the dataset stored under `key`.
    #[must_use]
    pub fn with_validation(mut self, key: Option<DatasetKey>) -> Self {
        self.validation = key;
        self
    }

    /// Return `true` if out-of-bag evaluation was requested.
    #[must_use]
    pub fn out_of_bag(&self) -> bool {
        self.out_of_bag
    }

    /// Return the validation dataset key, if any.
    #[must_use]
    pub fn validation(&self) -> Option<&DatasetKey> {
        self.validation.as_ref()
    }
}

/// Everything a completed job produced.
#[derive(Debug, Clone)]
pub struct JobReport {
    /// Snapshot of the finished model.
    pub model: ForestModel,
    /// Seed the per-tree seeds were derived from.
    pub root_seed: u64,
    /// Per-tree seeds, by tree index.
    pub seeds: Vec<u64>,
    /// Per-tree summaries, by tree index.
    pub trees: Vec<TreeSummary>,
    /// Out-of-bag result, when computed.
    pub out_of_bag: Option<ConfusionResult>,
    /// `true` when out-of-bag was requested but skipped for a stratified model.
    pub out_of_bag_skipped: bool,
    /// Validation result, when a validation dataset was given.
    pub validation: Option<ConfusionResult>,
}

/// Result of [`GrowJob::run`].
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// The job asked for zero trees; the store was not touched.
    NothingToDo,
    /// Trees were grown and evaluated.
    Grown(Box<JobReport>),
}

/// Grows one forest on a stored dataset and evaluates it.
#[derive(Debug)]
pub struct GrowJob<E = RayonExecutor> {
    config: ForestConfig,
    columns: ColumnSet,
    evaluation: EvaluationPlan,
    executor: E,
}

impl GrowJob<RayonExecutor> {
    /// Create a job running on rayon's global pool.
    #[must_use]
    pub fn new(config: ForestConfig, columns: ColumnSet) -> Self {
        Self {
            config,
            columns,
            evaluation: EvaluationPlan::new(),
            executor: RayonExecutor::global(),
        }
    }
}

impl<E: BatchExecutor> GrowJob<E> {
    /// Set the post-growth evaluations.
    #[must_use]
    pub fn with_evaluation(mut self, evaluation: EvaluationPlan) -> Self {
        self.evaluation = evaluation;
        self
    }

    /// Run tree tasks on a different executor.
    #[must_use]
    pub fn with_executor<F: BatchExecutor>(self, executor: F) -> GrowJob<F> {
        GrowJob {
            config: self.config,
            columns: self.columns,
            evaluation: self.evaluation,
            executor,
        }
    }

    /// Return the job configuration.
    #[must_use]
    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Return the column set.
    #[must_use]
    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    /// Grow the forest on `dataset_key` into a new model under `model_key`,
    /// then run the requested evaluations.
    ///
    /// Configuration is validated before anything is dispatched. The model
    /// stays in the store whether or not evaluation succeeds.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | configuration variants | see [`ForestError::is_configuration`] |
    /// | [`ForestError::UnknownDataset`] | nothing stored under `dataset_key` |
    /// | [`ForestError::ModelExists`] | `model_key` is taken |
    /// | [`ForestError::TaskFailed`] | a tree task failed |
    /// | [`ForestError::IncompleteModel`] | the model is short of trees after dispatch |
    /// | evaluation variants | see [`Evaluator`] |
    #[instrument(skip_all, fields(dataset = %dataset_key, model = %model_key, n_trees = self.config.n_trees()))]
    pub fn run(
        &self,
        store: &Arc<ForestStore>,
        dataset_key: &DatasetKey,
        model_key: &ModelKey,
    ) -> Result<JobOutcome, ForestError> {
        self.config.validate()?;
        let n_trees = self.config.n_trees();
        if n_trees == 0 {
            info!("nothing to do");
            return Ok(JobOutcome::NothingToDo);
        }

        let dataset = store.dataset(dataset_key)?;
        let view = TrainingView::build(&dataset, &self.columns, self.config.bin_limit() as usize)?;
        let n_classes = view.n_classes();
        let stratified = self.config.stratification().is_stratified();

        let root_seed = self.config.seed().unwrap_or(dataset.seed());
        let seeds = derive_tree_seeds(root_seed, n_trees, self.config.rng_kind());
        let context = Arc::new(TreeContext::new(view, &self.config, Arc::clone(store))?);
        let tasks = GrowTree::plan(&context, &seeds, model_key);
        store.create_model(ForestModel::new(
            model_key.clone(),
            n_trees,
            self.columns.clone(),
            n_classes,
            stratified,
        ))?;

        info!(
            n_rows = dataset.n_rows(),
            n_predictors = self.columns.n_predictors(),
            n_classes,
            dispatch = ?self.config.dispatch(),
            rng = %self.config.rng_kind(),
            "growing forest"
        );
        let trees = Dispatcher::new(&self.executor, self.config.dispatch()).dispatch(&tasks)?;

        let model = store.model(model_key)?;
        if !model.is_complete() {
            return Err(ForestError::IncompleteModel {
                key: model_key.to_string(),
                expected: model.n_trees(),
                got: model.n_grown(),
            });
        }
        info!(n_trees = model.n_grown(), "forest complete");

        let class_column = self.columns.class_column();
        let mut out_of_bag = None;
        let mut out_of_bag_skipped = false;
        if self.evaluation.out_of_bag() {
            if stratified {
                warn!("out-of-bag error is undefined with stratified sampling; skipping");
                out_of_bag_skipped = true;
            } else {
                out_of_bag = Some(Evaluator::out_of_bag(
                    store,
                    model_key,
                    dataset_key,
                    class_column,
                )?);
            }
        }
        let validation = self
            .evaluation
            .validation()
            .map(|key| Evaluator::validate(store, model_key, key, class_column))
            .transpose()?;

        Ok(JobOutcome::Grown(Box::new(JobReport {
            model,
            root_seed,
            seeds,
            trees,
            out_of_bag,
            out_of_bag_skipped,
            validation,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Dataset;
    use crate::strata::StratificationPlan;

    fn store_with(rows: usize) -> (Arc<ForestStore>, DatasetKey) {
        let data: Vec<Vec<f64>> = (0..rows)
            .map(|i| {
                let x = i as f64;
                vec![x, (i % 5) as f64, if i % 10 < 5 { 0.0 } else { 1.0 }]
            })
            .collect();
        let store = Arc::new(ForestStore::new());
        let key = DatasetKey::new("train");
        store
            .put_dataset(key.clone(), Dataset::from_rows(&data, 11).unwrap())
            .unwrap();
        (store, key)
    }

    fn columns() -> ColumnSet {
        ColumnSet::select(3, None, None).unwrap()
    }

    #[test]
    fn zero_trees_touch_nothing() {
        let (store, d) = store_with(20);
        let job = GrowJob::new(ForestConfig::new(0).unwrap(), columns());
        let m = ModelKey::new("m");
        assert!(matches!(job.run(&store, &d, &m).unwrap(), JobOutcome::NothingToDo));
        assert!(matches!(store.model(&m), Err(ForestError::UnknownModel { .. })));
    }

    #[test]
    fn invalid_config_fails_before_dispatch() {
        let (store, d) = store_with(20);
        let config = ForestConfig::new(3).unwrap().with_bin_limit(0);
        let m = ModelKey::new("m");
        let err = GrowJob::new(config, columns()).run(&store, &d, &m).unwrap_err();
        assert!(err.is_configuration());
        assert!(store.model(&m).is_err());
    }

    #[test]
    fn grows_and_evaluates() {
        let (store, d) = store_with(60);
        let m = ModelKey::new("m");
        let outcome = GrowJob::new(ForestConfig::new(8).unwrap(), columns())
            .with_evaluation(EvaluationPlan::new().with_validation(Some(d.clone())))
            .run(&store, &d, &m)
            .unwrap();
        let JobOutcome::Grown(report) = outcome else {
            panic!("expected a grown forest");
        };
        assert_eq!(report.model.n_grown(), 8);
        assert_eq!(report.seeds.len(), 8);
        let indices: Vec<usize> = report.trees.iter().map(|t| t.index).collect();
        assert_eq!(indices, (0..8).collect::<Vec<_>>());
        assert!(report.out_of_bag.is_some());
        assert!(!report.out_of_bag_skipped);
        assert_eq!(report.validation.unwrap().rows_scored, 60);
        assert!(store.model(&m).unwrap().is_complete());
    }

    #[test]
    fn stratified_skips_out_of_bag() {
        let (store, d) = store_with(40);
        let plan = StratificationPlan::parse(true, Some("0:80,1:80"), None).unwrap();
        let config = ForestConfig::new(3).unwrap().with_stratification(plan);
        let JobOutcome::Grown(report) = GrowJob::new(config, columns())
            .run(&store, &d, &ModelKey::new("m"))
            .unwrap()
        else {
            panic!("expected a grown forest");
        };
        assert!(report.out_of_bag.is_none());
        assert!(report.out_of_bag_skipped);
        assert!(report.model.is_stratified());
    }

    #[test]
    fn full_sample_still_validates() {
        let (store, d) = store_with(40);
        let config = ForestConfig::new(3).unwrap().with_sample_fraction(1.0);
        let JobOutcome::Grown(report) = GrowJob::new(config, columns())
            .with_evaluation(EvaluationPlan::new().with_validation(Some(d.clone())))
            .run(&store, &d, &ModelKey::new("m"))
            .unwrap()
        else {
            panic!("expected a grown forest");
        };
        let oob = report.out_of_bag.unwrap();
        assert_eq!(oob.rows_scored, 0);
        assert_eq!(oob.rows_skipped, 40);
        assert_eq!(report.validation.unwrap().rows_scored, 40);
    }

    #[test]
    fn configured_seed_overrides_dataset_seed() {
        let (store, d) = store_with(20);
        let grow = |config: ForestConfig, key: &str| {
            let kind = config.rng_kind();
            match GrowJob::new(config, columns())
                .with_evaluation(EvaluationPlan::new().with_out_of_bag(false))
                .run(&store, &d, &ModelKey::new(key))
                .unwrap()
            {
                JobOutcome::Grown(report) => (report.root_seed, report.seeds, kind),
                JobOutcome::NothingToDo => panic!("expected a grown forest"),
            }
        };

        let (root, seeds, kind) = grow(ForestConfig::new(3).unwrap(), "a");
        assert_eq!(root, 11);
        assert_eq!(seeds, derive_tree_seeds(11, 3, kind));

        let (root, seeds, kind) = grow(ForestConfig::new(3).unwrap().with_seed(99), "b");
        assert_eq!(root, 99);
        assert_eq!(seeds, derive_tree_seeds(99, 3, kind));
    }

    #[test]
    fn model_key_reuse_rejected() {
        let (store, d) = store_with(20);
        let m = ModelKey::new("m");
        let job = GrowJob::new(ForestConfig::new(2).unwrap(), columns())
            .with_evaluation(EvaluationPlan::new().with_out_of_bag(false));
        job.run(&store, &d, &m).unwrap();
        assert!(matches!(
            job.run(&store, &d, &m),
            Err(ForestError::ModelExists { .. })
        ));
    }
}
