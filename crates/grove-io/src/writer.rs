//! JSON report writer for evaluation results and growth summaries.

use std::fs;
use std::path::{Path, PathBuf};

use grove_rf::{ConfusionResult, EvaluationKind, TreeSummary};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::ExperimentName;

/// Writes report artifacts into one output directory.
///
/// Creates the directory on construction if it does not exist. Files are
/// named `{experiment}_oob.json`, `{experiment}_validation.json`,
/// `{experiment}_trees.json`, and `{experiment}_model.bin`.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
    experiment: ExperimentName,
}

impl ReportWriter {
    /// Create a new writer targeting the given directory and experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %output_dir.display(), experiment = %experiment))]
    pub fn new(output_dir: &Path, experiment: ExperimentName) -> Result<Self, IoError> {
        fs::create_dir_all(output_dir).map_err(|e| IoError::OutputDirCreate {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            experiment,
        })
    }

    /// Write a confusion result to `{experiment}_{oob|validation}.json`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::SerializeReport`] | JSON encoding failed |
    /// | [`IoError::WriteFile`] | the file cannot be written |
    #[instrument(skip_all, fields(kind = %result.kind))]
    pub fn write_confusion(&self, result: &ConfusionResult) -> Result<PathBuf, IoError> {
        let path = self.report_path(result.kind.as_str());
        let matrix = &result.matrix;
        let artifact = ConfusionArtifact {
            experiment: self.experiment.as_str(),
            kind: result.kind,
            n_trees: result.n_trees,
            rows_scored: result.rows_scored,
            rows_skipped: result.rows_skipped,
            error_rate: result.error_rate,
            n_classes: matrix.n_classes(),
            confusion_matrix: matrix.as_rows(),
            class_errors: (0..matrix.n_classes())
                .map(|c| matrix.class_error(c))
                .collect(),
        };
        self.write_json(&path, &artifact)?;
        info!(path = %path.display(), error_rate = result.error_rate, "confusion result written");
        Ok(path)
    }

    /// Write per-tree seeds and summaries to `{experiment}_trees.json`.
    ///
    /// # Errors
    ///
    /// Same as [`ReportWriter::write_confusion`].
    #[instrument(skip_all, fields(n_trees = trees.len()))]
    pub fn write_trees(&self, dataset_seed: u64, trees: &[TreeSummary]) -> Result<PathBuf, IoError> {
        let path = self.report_path("trees");
        let artifact = TreesArtifact {
            experiment: self.experiment.as_str(),
            dataset_seed,
            n_trees: trees.len(),
            trees,
        };
        self.write_json(&path, &artifact)?;
        info!(path = %path.display(), "tree summaries written");
        Ok(path)
    }

    /// Return the path where the model binary should be saved.
    ///
    /// Does not write anything: just computes `{output_dir}/{experiment}_model.bin`.
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_model.bin", self.experiment.as_str()))
    }

    fn report_path(&self, suffix: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{suffix}.json", self.experiment.as_str()))
    }

    fn write_json(&self, path: &Path, artifact: &impl Serialize) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(artifact).map_err(|e| IoError::SerializeReport {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, json).map_err(|e| IoError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

// --- Shadow structs for JSON serialization ---

#[derive(Serialize)]
struct ConfusionArtifact<'a> {
    experiment: &'a str,
    kind: EvaluationKind,
    n_trees: usize,
    rows_scored: usize,
    rows_skipped: usize,
    error_rate: f64,
    n_classes: usize,
    confusion_matrix: &'a [Vec<usize>],
    class_errors: Vec<f64>,
}

#[derive(Serialize)]
struct TreesArtifact<'a> {
    experiment: &'a str,
    dataset_seed: u64,
    n_trees: usize,
    trees: &'a [TreeSummary],
}
