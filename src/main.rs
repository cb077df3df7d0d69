use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use grove_io::{DatasetReader, ExperimentName, ReportWriter};
use grove_rf::{
    ColumnSet, ConfusionResult, DEFAULT_DATASET_SEED, DatasetKey, DispatchMode, EvaluationPlan,
    Evaluator, ForestConfig, ForestModel, ForestStore, GrowJob, JobOutcome, MaxFeatures, ModelKey,
    RngKind, SplitCriterion, StratificationPlan,
};

#[derive(Parser)]
#[command(name = "grove")]
#[command(about = "Reproducible random forest growth with out-of-bag and held-out evaluation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of worker threads (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Grow a forest on a CSV file and evaluate it
    Grow {
        /// Training data CSV (header row, numeric cells)
        #[arg(long)]
        file: PathBuf,

        /// Held-out CSV scored by the finished forest
        #[arg(long)]
        validation_file: Option<PathBuf>,

        /// Number of trees
        #[arg(long, default_value_t = 10, allow_negative_numbers = true)]
        ntrees: i64,

        /// Maximum tree depth (unlimited if not set)
        #[arg(long)]
        depth: Option<usize>,

        /// Stop splitting nodes whose error rate is at or below this value
        #[arg(long, default_value_t = 0.0)]
        min_error_rate: f64,

        /// Split statistic: "entropy" or "gini"
        #[arg(long, default_value = "entropy")]
        stat: String,

        /// Percentage of rows sampled per tree
        #[arg(long, default_value_t = 67, value_parser = clap::value_parser!(u32).range(1..=100))]
        sample: u32,

        /// Maximum histogram bins per predictor (1..=32767)
        #[arg(long, default_value_t = 1024)]
        bin_limit: u32,

        /// Class column index (-1 = last column)
        #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
        class_col: i64,

        /// Predictors tried per split (-1 = square root of the predictor count)
        #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
        features: i64,

        /// Comma-separated column indices to leave out
        #[arg(long)]
        ignores: Option<String>,

        /// Grow one tree at a time instead of one concurrent batch
        #[arg(long, default_value_t = false)]
        sequential: bool,

        /// Skip out-of-bag error estimation
        #[arg(long, default_value_t = false)]
        no_oob: bool,

        /// Sample rows per class using --strata
        #[arg(long, default_value_t = false)]
        stratify: bool,

        /// Per-class sampling percentages, e.g. "0:10,1:90"
        #[arg(long)]
        strata: Option<String>,

        /// Per-class weights, e.g. "0:1.0,1:2.5"
        #[arg(long)]
        weights: Option<String>,

        /// Dataset seed (decimal or 0x-prefixed hex)
        #[arg(long, default_value_t = DEFAULT_DATASET_SEED, value_parser = parse_seed)]
        seed: u64,

        /// Score single-bin splits on predictors with at most this many occupied bins
        #[arg(long, default_value_t = 0)]
        exclusive: usize,

        /// 1 logs every finished tree, 2 and above enables debug logging
        #[arg(long, default_value_t = 0)]
        verbosity: u8,

        /// Generator: "chacha8", "chacha12", or "chacha20"
        #[arg(long, default_value = "chacha8")]
        rng: String,

        /// Experiment name for output files (must match [a-zA-Z0-9_-]+)
        #[arg(long, default_value = "grove")]
        experiment: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Score a saved forest against a CSV file
    Validate {
        /// Path to the saved model binary
        #[arg(long)]
        model: PathBuf,

        /// CSV file to score
        #[arg(long)]
        file: PathBuf,

        /// Class column index (-1 = the model's class column)
        #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
        class_col: i64,

        /// Experiment name for output files
        #[arg(long, default_value = "grove")]
        experiment: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct GrowOutput {
    experiment: String,
    status: &'static str,
    n_trees: usize,
    n_rows: Option<usize>,
    n_predictors: Option<usize>,
    n_classes: Option<usize>,
    oob_error: Option<f64>,
    oob_skipped: bool,
    validation_error: Option<f64>,
    model_path: Option<PathBuf>,
}

#[derive(Serialize)]
struct ValidateOutput {
    experiment: String,
    model_n_trees: usize,
    model_n_classes: usize,
    rows_scored: usize,
    error_rate: f64,
}

fn parse_seed(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid seed \"{s}\": {e}"))
}

/// `-1` selects the default; other negatives are rejected.
fn optional_index(value: i64, flag: &str) -> Result<Option<usize>> {
    match value {
        -1 => Ok(None),
        v if v < 0 => bail!("--{flag} must be -1 or a non-negative index, got {v}"),
        v => Ok(Some(usize::try_from(v)?)),
    }
}

fn log_result(result: &ConfusionResult) {
    info!(kind = %result.kind, error_rate = result.error_rate, "\n{result}");
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let verbosity = match &cli.command {
        Command::Grow { verbosity, .. } => *verbosity,
        Command::Validate { .. } => 0,
    };
    let filter = match (cli.quiet, verbosity) {
        (true, _) => "error",
        (_, v) if v >= 2 => "debug",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Grow {
            file,
            validation_file,
            ntrees,
            depth,
            min_error_rate,
            stat,
            sample,
            bin_limit,
            class_col,
            features,
            ignores,
            sequential,
            no_oob,
            stratify,
            strata,
            weights,
            seed,
            exclusive,
            verbosity,
            rng,
            experiment,
            output_dir,
        } => {
            let experiment_name = ExperimentName::new(experiment.clone())?;

            let stratification =
                StratificationPlan::parse(stratify, strata.as_deref(), weights.as_deref())
                    .context("invalid stratification")?;
            let max_features = match optional_index(features, "features")? {
                None => MaxFeatures::Sqrt,
                Some(n) => MaxFeatures::Fixed(n),
            };
            let config = ForestConfig::new(ntrees)?
                .with_max_depth(depth)
                .with_min_error_rate(min_error_rate)
                .with_criterion(stat.parse::<SplitCriterion>()?)
                .with_max_features(max_features)
                .with_sample_fraction(f64::from(sample) / 100.0)
                .with_bin_limit(bin_limit)
                .with_stratification(stratification)
                .with_exclusive_split_limit(exclusive)
                .with_verbosity(verbosity)
                .with_rng_kind(rng.parse::<RngKind>()?)
                .with_dispatch(if sequential {
                    DispatchMode::Sequential
                } else {
                    DispatchMode::Parallel
                });
            config.validate()?;

            if config.n_trees() == 0 {
                info!("nothing to do");
                let output = GrowOutput {
                    experiment,
                    status: "nothing_to_do",
                    n_trees: 0,
                    n_rows: None,
                    n_predictors: None,
                    n_classes: None,
                    oob_error: None,
                    oob_skipped: false,
                    validation_error: None,
                    model_path: None,
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
                return Ok(());
            }

            // Read datasets
            let store = Arc::new(ForestStore::new());
            let train_key = DatasetKey::new("train");
            let dataset = DatasetReader::new(&file)
                .with_seed(seed)
                .read()
                .context("failed to read training CSV")?;
            let n_rows = dataset.n_rows();
            let columns = ColumnSet::select(
                dataset.n_columns(),
                optional_index(class_col, "class-col")?,
                ignores.as_deref(),
            )?;
            info!(columns = %columns, "columns selected");
            store.put_dataset(train_key.clone(), dataset)?;

            let validation_key = match &validation_file {
                Some(path) => {
                    let key = DatasetKey::new("validation");
                    let holdout = DatasetReader::new(path)
                        .with_seed(seed)
                        .read()
                        .context("failed to read validation CSV")?;
                    store.put_dataset(key.clone(), holdout)?;
                    Some(key)
                }
                None => None,
            };

            // Grow and evaluate
            let writer = ReportWriter::new(&output_dir, experiment_name)?;
            let model_key = ModelKey::new(experiment.as_str());
            let job = GrowJob::new(config, columns).with_evaluation(
                EvaluationPlan::new()
                    .with_out_of_bag(!no_oob)
                    .with_validation(validation_key),
            );
            let report = match job.run(&store, &train_key, &model_key) {
                Ok(JobOutcome::Grown(report)) => report,
                Ok(JobOutcome::NothingToDo) => bail!("no trees were grown"),
                Err(e) => {
                    if let Ok(model) = store.model(&model_key)
                        && model.is_complete()
                    {
                        model.save(writer.model_path())?;
                        warn!(path = %writer.model_path().display(), "model saved despite evaluation failure");
                    }
                    return Err(e).context("forest growth failed");
                }
            };

            // Write artifacts
            for result in report.out_of_bag.iter().chain(report.validation.iter()) {
                log_result(result);
                writer.write_confusion(result)?;
            }
            writer.write_trees(report.root_seed, &report.trees)?;
            let model_path = writer.model_path();
            report.model.save(&model_path)?;

            let output = GrowOutput {
                experiment,
                status: "grown",
                n_trees: report.model.n_grown(),
                n_rows: Some(n_rows),
                n_predictors: Some(report.model.columns().n_predictors()),
                n_classes: Some(report.model.n_classes()),
                oob_error: report.out_of_bag.as_ref().map(|r| r.error_rate),
                oob_skipped: report.out_of_bag_skipped,
                validation_error: report.validation.as_ref().map(|r| r.error_rate),
                model_path: Some(model_path),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Validate {
            model,
            file,
            class_col,
            experiment,
            output_dir,
        } => {
            let experiment_name = ExperimentName::new(experiment.clone())?;
            let forest = ForestModel::load(&model).context("failed to load model")?;
            let dataset = DatasetReader::new(&file)
                .read()
                .context("failed to read CSV")?;
            let class_column = optional_index(class_col, "class-col")?
                .unwrap_or_else(|| forest.columns().class_column());

            let result = Evaluator::validate_model(&forest, &dataset, class_column)
                .context("validation failed")?;
            log_result(&result);

            let writer = ReportWriter::new(&output_dir, experiment_name)?;
            writer.write_confusion(&result)?;

            let output = ValidateOutput {
                experiment,
                model_n_trees: forest.n_grown(),
                model_n_classes: forest.n_classes(),
                rows_scored: result.rows_scored,
                error_rate: result.error_rate,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
