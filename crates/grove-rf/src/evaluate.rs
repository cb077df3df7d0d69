//! Post-growth evaluation: out-of-bag error and held-out validation.

use rayon::prelude::*;
use tracing::{info, instrument, warn};

use crate::confusion::{ConfusionMatrix, ConfusionResult, EvaluationKind};
use crate::data::Dataset;
use crate::error::ForestError;
use crate::model::{ForestModel, majority_vote};
use crate::store::{DatasetKey, ForestStore, ModelKey};

/// Scores stored models against stored datasets.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator;

impl Evaluator {
    /// Out-of-bag error of a finished model on its training dataset.
    ///
    /// Each row is predicted by majority vote of the trees that did not sample
    /// it. Rows no tree left out are skipped and counted; when every row is
    /// skipped the result scores zero rows.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::OobUnavailable`] | the model used stratified sampling |
    /// | [`ForestError::IncompleteModel`] | not every tree has been appended |
    /// | [`ForestError::ColumnCountMismatch`] | dataset width differs from training |
    #[instrument(skip(store), fields(model = %model_key, dataset = %dataset_key))]
    pub fn out_of_bag(
        store: &ForestStore,
        model_key: &ModelKey,
        dataset_key: &DatasetKey,
        class_column: usize,
    ) -> Result<ConfusionResult, ForestError> {
        let model = store.model(model_key)?;
        if model.is_stratified() {
            return Err(ForestError::OobUnavailable {
                key: model_key.to_string(),
            });
        }
        require_complete(&model)?;
        let dataset = store.dataset(dataset_key)?;
        let labels = labels_for(&model, &dataset, class_column)?;
        let n_classes = class_count(&model, &labels);
        let rows = predictor_rows(&model, &dataset);

        let mut votes = vec![vec![0usize; n_classes]; dataset.n_rows()];
        for grown in model.trees() {
            for &row in grown.oob_rows.iter().filter(|&&r| r < rows.len()) {
                let class = grown.tree.predict(&rows[row])?;
                votes[row][class] += 1;
            }
        }

        let mut actual = Vec::with_capacity(rows.len());
        let mut predicted = Vec::with_capacity(rows.len());
        for (row, row_votes) in votes.iter().enumerate() {
            if row_votes.iter().any(|&v| v > 0) {
                actual.push(labels[row]);
                predicted.push(majority_vote(row_votes));
            }
        }
        let skipped = rows.len() - actual.len();
        let matrix = if actual.is_empty() {
            warn!(n_rows = rows.len(), "every tree sampled every row; nothing to score out-of-bag");
            ConfusionMatrix::empty(n_classes)
        } else {
            ConfusionMatrix::from_labels(&actual, &predicted, n_classes)?
        };
        let result =
            ConfusionResult::new(EvaluationKind::OutOfBag, matrix, model.n_grown(), skipped);
        info!(
            error_rate = result.error_rate,
            rows_scored = result.rows_scored,
            rows_skipped = skipped,
            "out-of-bag evaluation complete"
        );
        Ok(result)
    }

    /// Error of a finished model on a separate dataset, scored by every tree.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::IncompleteModel`] | not every tree has been appended |
    /// | [`ForestError::ColumnCountMismatch`] | dataset width differs from training |
    /// | [`ForestError::InvalidClassValue`] | a class value is not a label |
    #[instrument(skip(store), fields(model = %model_key, dataset = %dataset_key))]
    pub fn validate(
        store: &ForestStore,
        model_key: &ModelKey,
        dataset_key: &DatasetKey,
        class_column: usize,
    ) -> Result<ConfusionResult, ForestError> {
        let model = store.model(model_key)?;
        let dataset = store.dataset(dataset_key)?;
        Self::validate_model(&model, &dataset, class_column)
    }

    /// Score `model` on `dataset` without going through a store.
    ///
    /// # Errors
    ///
    /// Same as [`Evaluator::validate`].
    pub fn validate_model(
        model: &ForestModel,
        dataset: &Dataset,
        class_column: usize,
    ) -> Result<ConfusionResult, ForestError> {
        require_complete(model)?;
        let labels = labels_for(model, dataset, class_column)?;
        let n_classes = class_count(model, &labels);
        let predicted = predictor_rows(model, dataset)
            .par_iter()
            .map(|row| model.predict(row))
            .collect::<Result<Vec<_>, _>>()?;

        let matrix = ConfusionMatrix::from_labels(&labels, &predicted, n_classes)?;
        let result = ConfusionResult::new(EvaluationKind::Validation, matrix, model.n_grown(), 0);
        info!(
            error_rate = result.error_rate,
            rows_scored = result.rows_scored,
            "validation complete"
        );
        Ok(result)
    }
}

fn require_complete(model: &ForestModel) -> Result<(), ForestError> {
    if model.is_complete() {
        Ok(())
    } else {
        Err(ForestError::IncompleteModel {
            key: model.key().to_string(),
            expected: model.n_trees(),
            got: model.n_grown(),
        })
    }
}

fn labels_for(
    model: &ForestModel,
    dataset: &Dataset,
    class_column: usize,
) -> Result<Vec<usize>, ForestError> {
    let expected = model.columns().n_columns();
    if dataset.n_columns() != expected {
        return Err(ForestError::ColumnCountMismatch {
            expected,
            got: dataset.n_columns(),
        });
    }
    if class_column >= expected {
        return Err(ForestError::ClassColumnOutOfRange {
            class_column,
            n_columns: expected,
        });
    }
    dataset.class_labels(class_column)
}

/// Classes seen in training or in the scored labels, whichever is larger.
fn class_count(model: &ForestModel, labels: &[usize]) -> usize {
    let seen = labels.iter().max().map_or(0, |&m| m + 1);
    model.n_classes().max(seen)
}

fn predictor_rows(model: &ForestModel, dataset: &Dataset) -> Vec<Vec<f64>> {
    (0..dataset.n_rows())
        .map(|row| dataset.predictor_row(model.columns(), row))
        .collect()
}
