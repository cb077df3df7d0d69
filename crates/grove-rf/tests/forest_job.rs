//! End-to-end growth jobs: determinism, barriers, failures, evaluation gating.

use std::sync::{Arc, Mutex};

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use grove_rf::{
    BatchExecutor, BuildTask, ColumnSet, Dataset, DatasetKey, DispatchMode, EvaluationPlan,
    Evaluator, ForestConfig, ForestError, ForestModel, ForestStore, GrowJob, JobOutcome,
    JobReport, ModelKey, RngKind, StratificationPlan, derive_tree_seeds,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// 240 rows, 6 predictors, 3 classes; predictors 0-2 carry the class signal.
fn make_dataset(seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let rows: Vec<Vec<f64>> = (0..240)
        .map(|i| {
            let class = i % 3;
            let mut row: Vec<f64> = (0..6)
                .map(|f| {
                    let base = if f < 3 { class as f64 * 3.0 } else { 0.0 };
                    base + rng.r#gen::<f64>()
                })
                .collect();
            row.push(class as f64);
            row
        })
        .collect();
    Dataset::from_rows(&rows, seed).unwrap()
}

fn store_with(dataset: Dataset) -> (Arc<ForestStore>, DatasetKey) {
    let store = Arc::new(ForestStore::new());
    let key = DatasetKey::new("train");
    store.put_dataset(key.clone(), dataset).unwrap();
    (store, key)
}

fn grow(config: ForestConfig, store: &Arc<ForestStore>, data: &DatasetKey, model: &str) -> JobReport {
    let columns = ColumnSet::select(7, None, None).unwrap();
    match GrowJob::new(config, columns)
        .run(store, data, &ModelKey::new(model))
        .unwrap()
    {
        JobOutcome::Grown(report) => *report,
        JobOutcome::NothingToDo => panic!("expected trees to be grown"),
    }
}

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

#[test]
fn parallel_and_sequential_grow_identical_models() {
    let (store, data) = store_with(make_dataset(7));
    let parallel = grow(ForestConfig::new(12).unwrap(), &store, &data, "par");
    let sequential = grow(
        ForestConfig::new(12)
            .unwrap()
            .with_dispatch(DispatchMode::Sequential),
        &store,
        &data,
        "seq",
    );

    assert_eq!(parallel.seeds, sequential.seeds);
    assert_eq!(parallel.seeds, derive_tree_seeds(7, 12, RngKind::ChaCha8));
    let trees_a: Vec<_> = parallel.model.trees().cloned().collect();
    let trees_b: Vec<_> = sequential.model.trees().cloned().collect();
    assert_eq!(trees_a, trees_b);
    assert_eq!(parallel.out_of_bag, sequential.out_of_bag);
}

#[test]
fn worker_count_does_not_change_model() {
    let (store, data) = store_with(make_dataset(3));
    let columns = ColumnSet::select(7, None, None).unwrap();
    let mut models = Vec::new();
    for (threads, key) in [(1, "one"), (4, "four")] {
        let executor = grove_rf::RayonExecutor::with_threads(threads).unwrap();
        let outcome = GrowJob::new(ForestConfig::new(9).unwrap(), columns.clone())
            .with_executor(executor)
            .run(&store, &data, &ModelKey::new(key))
            .unwrap();
        let JobOutcome::Grown(report) = outcome else {
            panic!("expected trees to be grown");
        };
        models.push(report.model.trees().cloned().collect::<Vec<_>>());
    }
    assert_eq!(models[0], models[1]);
}

#[test]
fn rng_kind_changes_seeds() {
    let (store, data) = store_with(make_dataset(3));
    let a = grow(ForestConfig::new(3).unwrap(), &store, &data, "a");
    let b = grow(
        ForestConfig::new(3).unwrap().with_rng_kind(RngKind::ChaCha20),
        &store,
        &data,
        "b",
    );
    assert_ne!(a.seeds, b.seeds);
}

// ---------------------------------------------------------------------------
// Zero trees and barriers
// ---------------------------------------------------------------------------

#[test]
fn zero_trees_is_nothing_to_do() {
    let (store, data) = store_with(make_dataset(1));
    let columns = ColumnSet::select(7, None, None).unwrap();
    let model = ModelKey::new("m");
    let outcome = GrowJob::new(ForestConfig::new(0).unwrap(), columns)
        .run(&store, &data, &model)
        .unwrap();
    assert!(matches!(outcome, JobOutcome::NothingToDo));
    assert!(matches!(store.model(&model), Err(ForestError::UnknownModel { .. })));
}

/// Runs tasks one by one on the calling thread, snapshotting the model
/// between tasks.
struct ObservingExecutor {
    store: Arc<ForestStore>,
    model: ModelKey,
    seen: Mutex<Vec<usize>>,
}

impl BatchExecutor for ObservingExecutor {
    fn invoke_all<T: BuildTask>(&self, tasks: &[T]) -> Vec<Result<T::Output, ForestError>> {
        tasks
            .iter()
            .map(|task| {
                let result = task.run();
                let grown = self.store.model(&self.model).map_or(0, |m| m.n_grown());
                self.seen.lock().unwrap().push(grown);
                result
            })
            .collect()
    }
}

#[test]
fn model_is_partial_mid_batch_and_full_after_barrier() {
    let (store, data) = store_with(make_dataset(5));
    let model = ModelKey::new("observed");
    let executor = ObservingExecutor {
        store: Arc::clone(&store),
        model: model.clone(),
        seen: Mutex::new(Vec::new()),
    };
    let columns = ColumnSet::select(7, None, None).unwrap();
    let outcome = GrowJob::new(ForestConfig::new(5).unwrap(), columns)
        .with_executor(&executor)
        .run(&store, &data, &model)
        .unwrap();

    assert_eq!(*executor.seen.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    let JobOutcome::Grown(report) = outcome else {
        panic!("expected trees to be grown");
    };
    assert_eq!(report.model.n_grown(), 5);
    assert!(store.model(&model).unwrap().is_complete());
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn empty_samples_fail_the_job() {
    let (store, data) = store_with(make_dataset(5));
    // Every class has a zero ratio, so every sample is empty.
    let plan = StratificationPlan::parse(true, Some("0:0,1:0,2:0"), None).unwrap();
    let config = ForestConfig::new(4).unwrap().with_stratification(plan);
    let columns = ColumnSet::select(7, None, None).unwrap();
    let model = ModelKey::new("m");
    let err = GrowJob::new(config, columns)
        .run(&store, &data, &model)
        .unwrap_err();

    let ForestError::TaskFailed { tree, source } = err else {
        panic!("expected TaskFailed");
    };
    assert_eq!(tree, 0);
    assert!(matches!(*source, ForestError::EmptySample { tree: 0, .. }));
    assert_eq!(store.model(&model).unwrap().n_grown(), 0);
}

/// Runs a parallel batch but reports tree `failing` as failed without
/// running it.
struct OneFailureExecutor {
    failing: usize,
}

impl BatchExecutor for OneFailureExecutor {
    fn invoke_all<T: BuildTask>(&self, tasks: &[T]) -> Vec<Result<T::Output, ForestError>> {
        tasks
            .par_iter()
            .map(|task| {
                if task.index() == self.failing {
                    Err(ForestError::EmptySample {
                        tree: task.index(),
                        n_rows: 0,
                    })
                } else {
                    task.run()
                }
            })
            .collect()
    }
}

#[test]
fn one_failing_tree_reported_after_the_rest_are_appended() {
    let (store, data) = store_with(make_dataset(5));
    let columns = ColumnSet::select(7, None, None).unwrap();
    let model = ModelKey::new("m");
    let err = GrowJob::new(ForestConfig::new(6).unwrap(), columns)
        .with_executor(OneFailureExecutor { failing: 3 })
        .run(&store, &data, &model)
        .unwrap_err();

    let ForestError::TaskFailed { tree, source } = err else {
        panic!("expected TaskFailed");
    };
    assert_eq!(tree, 3);
    assert!(matches!(*source, ForestError::EmptySample { tree: 3, .. }));

    let partial = store.model(&model).unwrap();
    assert_eq!(partial.n_grown(), 5);
    assert!(!partial.is_complete());
    assert!(partial.tree(3).is_none());
    for index in [0, 1, 2, 4, 5] {
        assert!(partial.tree(index).is_some(), "tree {index} missing");
    }
}

#[test]
fn huge_class_labels_rejected_before_growth() {
    let rows: Vec<Vec<f64>> = (0..20)
        .map(|i| vec![i as f64, if i < 10 { 0.0 } else { 1e11 }])
        .collect();
    let (store, data) = store_with(Dataset::from_rows(&rows, 1).unwrap());
    let columns = ColumnSet::select(2, None, None).unwrap();
    let model = ModelKey::new("m");
    let err = GrowJob::new(ForestConfig::new(3).unwrap(), columns)
        .run(&store, &data, &model)
        .unwrap_err();
    assert!(matches!(err, ForestError::InvalidClassValue { row: 10, .. }));
    assert!(store.model(&model).is_err());
}

#[test]
fn configuration_errors_dispatch_nothing() {
    let (store, data) = store_with(make_dataset(5));
    let columns = ColumnSet::select(7, None, None).unwrap();
    let model = ModelKey::new("m");
    let config = ForestConfig::new(4).unwrap().with_sample_fraction(0.0);
    let err = GrowJob::new(config, columns)
        .run(&store, &data, &model)
        .unwrap_err();
    assert!(err.is_configuration());
    assert!(store.model(&model).is_err());
}

#[test]
fn unknown_dataset_rejected() {
    let store = Arc::new(ForestStore::new());
    let columns = ColumnSet::select(7, None, None).unwrap();
    let err = GrowJob::new(ForestConfig::new(2).unwrap(), columns)
        .run(&store, &DatasetKey::new("missing"), &ModelKey::new("m"))
        .unwrap_err();
    assert!(matches!(err, ForestError::UnknownDataset { .. }));
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

#[test]
fn out_of_bag_error_is_low_on_separable_data() {
    let (store, data) = store_with(make_dataset(11));
    let report = grow(ForestConfig::new(20).unwrap(), &store, &data, "m");
    let oob = report.out_of_bag.unwrap();
    assert!(oob.error_rate < 0.1, "oob error {} >= 0.1", oob.error_rate);
    assert_eq!(oob.rows_scored + oob.rows_skipped, 240);
    assert_eq!(oob.n_trees, 20);
}

#[test]
fn stratified_job_skips_out_of_bag_and_evaluator_refuses() {
    let (store, data) = store_with(make_dataset(11));
    let plan = StratificationPlan::parse(true, Some("0:50,1:50,2:50"), Some("0:1.0,1:2.0")).unwrap();
    let report = grow(
        ForestConfig::new(4).unwrap().with_stratification(plan),
        &store,
        &data,
        "strat",
    );
    assert!(report.out_of_bag.is_none());
    assert!(report.out_of_bag_skipped);
    let err = Evaluator::out_of_bag(&store, &ModelKey::new("strat"), &data, 6).unwrap_err();
    assert!(matches!(err, ForestError::OobUnavailable { .. }));
}

#[test]
fn validation_dataset_is_scored() {
    let (store, data) = store_with(make_dataset(11));
    let holdout = DatasetKey::new("holdout");
    store.put_dataset(holdout.clone(), make_dataset(99)).unwrap();
    let columns = ColumnSet::select(7, None, None).unwrap();
    let outcome = GrowJob::new(ForestConfig::new(10).unwrap(), columns)
        .with_evaluation(
            EvaluationPlan::new()
                .with_out_of_bag(false)
                .with_validation(Some(holdout)),
        )
        .run(&store, &data, &ModelKey::new("m"))
        .unwrap();
    let JobOutcome::Grown(report) = outcome else {
        panic!("expected trees to be grown");
    };
    assert!(report.out_of_bag.is_none());
    let validation = report.validation.unwrap();
    assert_eq!(validation.rows_scored, 240);
    assert!(validation.error_rate < 0.1);
}

#[test]
fn saved_model_predicts_like_the_grown_one() {
    let (store, data) = store_with(make_dataset(11));
    let report = grow(ForestConfig::new(6).unwrap(), &store, &data, "m");
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("forest.bin");
    report.model.save(&path).unwrap();
    let loaded = ForestModel::load(&path).unwrap();

    let dataset = store.dataset(&data).unwrap();
    for row in 0..dataset.n_rows() {
        assert_eq!(
            loaded.predict_row(&dataset, row).unwrap(),
            report.model.predict_row(&dataset, row).unwrap()
        );
    }
    let rescored = Evaluator::validate_model(&loaded, &dataset, 6).unwrap();
    let grown = Evaluator::validate_model(&report.model, &dataset, 6).unwrap();
    assert_eq!(rescored, grown);
}
