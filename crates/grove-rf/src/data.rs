//! Immutable datasets and the training view trees are grown on.

use tracing::debug;

use crate::columns::ColumnSet;
use crate::error::ForestError;
use crate::split::FeatureBins;

/// Seed given to datasets when the caller does not pick one.
pub const DEFAULT_DATASET_SEED: u64 = 0x0ae4_4a87_f9ed_f1cb;

/// Class labels are integers in `0..MAX_CLASSES`.
///
/// Trees keep one count per class at every node and confusion matrices are
/// square in the class count, so labels are bounded.
pub const MAX_CLASSES: usize = 1024;

/// An immutable, column-major table of numeric columns.
///
/// The `seed` is the dataset's reproducibility anchor: every forest grown on
/// the dataset derives its tree seeds from it.
#[derive(Debug, Clone)]
pub struct Dataset {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    n_rows: usize,
    seed: u64,
}

impl Dataset {
    /// Build a dataset from named columns.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::NoColumns`] | `columns` is empty |
    /// | [`ForestError::EmptyDataset`] | the first column has zero rows |
    /// | [`ForestError::RaggedColumn`] | columns differ in length |
    pub fn new(names: Vec<String>, columns: Vec<Vec<f64>>, seed: u64) -> Result<Self, ForestError> {
        let Some(first) = columns.first() else {
            return Err(ForestError::NoColumns);
        };
        let n_rows = first.len();
        if n_rows == 0 {
            return Err(ForestError::EmptyDataset);
        }
        for (column, values) in columns.iter().enumerate() {
            if values.len() != n_rows {
                return Err(ForestError::RaggedColumn {
                    column,
                    expected: n_rows,
                    got: values.len(),
                });
            }
        }
        debug_assert_eq!(names.len(), columns.len(), "one name per column");
        Ok(Self {
            names,
            columns,
            n_rows,
            seed,
        })
    }

    /// Build a dataset from row-major records, naming columns `c0, c1, ...`.
    ///
    /// # Errors
    ///
    /// Same as [`Dataset::new`]; a short or long row reports the column it breaks.
    pub fn from_rows(rows: &[Vec<f64>], seed: u64) -> Result<Self, ForestError> {
        let n_columns = rows.first().map_or(0, Vec::len);
        let mut columns = vec![Vec::with_capacity(rows.len()); n_columns];
        for row in rows {
            if row.len() != n_columns {
                return Err(ForestError::RaggedColumn {
                    column: row.len().min(n_columns),
                    expected: n_columns,
                    got: row.len(),
                });
            }
            for (column, &value) in columns.iter_mut().zip(row) {
                column.push(value);
            }
        }
        let names = (0..n_columns).map(|c| format!("c{c}")).collect();
        Self::new(names, columns, seed)
    }

    /// Return the column names.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Return one column's values.
    #[must_use]
    pub fn column(&self, index: usize) -> &[f64] {
        &self.columns[index]
    }

    /// Return the number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Return the number of columns.
    #[must_use]
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Return the dataset's reproducibility seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Collect the predictor values of `row` in column-set order.
    #[must_use]
    pub fn predictor_row(&self, columns: &ColumnSet, row: usize) -> Vec<f64> {
        columns
            .predictors()
            .iter()
            .map(|&c| self.columns[c][row])
            .collect()
    }

    /// Read the class column as zero-based class labels.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidClassValue`] for a class value that is
    /// negative, fractional, non-finite, or not below [`MAX_CLASSES`].
    pub fn class_labels(&self, class_column: usize) -> Result<Vec<usize>, ForestError> {
        self.columns[class_column]
            .iter()
            .enumerate()
            .map(|(row, &value)| {
                if value.is_finite()
                    && value >= 0.0
                    && value.fract() == 0.0
                    && value < MAX_CLASSES as f64
                {
                    Ok(value as usize)
                } else {
                    Err(ForestError::InvalidClassValue { row, value })
                }
            })
            .collect()
    }
}

/// Predictor columns, labels, and histogram bins extracted once per job and
/// shared read-only by every tree task.
#[derive(Debug)]
pub struct TrainingView {
    features: Vec<Vec<f64>>,
    labels: Vec<usize>,
    n_classes: usize,
    bins: FeatureBins,
}

impl TrainingView {
    /// Extract the columns named by `columns` and bin every predictor.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::ColumnCountMismatch`] | column set was selected for another width |
    /// | [`ForestError::ZeroFeatures`] | the column set has no predictors |
    /// | [`ForestError::NonFiniteValue`] | a predictor value is NaN or infinite |
    /// | [`ForestError::InvalidClassValue`] | a class value is not a label |
    pub fn build(
        dataset: &Dataset,
        columns: &ColumnSet,
        bin_limit: usize,
    ) -> Result<Self, ForestError> {
        if columns.n_columns() != dataset.n_columns() {
            return Err(ForestError::ColumnCountMismatch {
                expected: columns.n_columns(),
                got: dataset.n_columns(),
            });
        }
        if columns.n_predictors() == 0 {
            return Err(ForestError::ZeroFeatures);
        }

        let mut features = Vec::with_capacity(columns.n_predictors());
        for &column in columns.predictors() {
            let values = dataset.column(column);
            if let Some(row) = values.iter().position(|v| !v.is_finite()) {
                return Err(ForestError::NonFiniteValue { row, column });
            }
            features.push(values.to_vec());
        }

        let labels = dataset.class_labels(columns.class_column())?;
        let n_classes = labels.iter().max().copied().unwrap_or(0) + 1;
        let bins = FeatureBins::build(&features, bin_limit);

        debug!(
            n_rows = dataset.n_rows(),
            n_features = features.len(),
            n_classes,
            bin_limit,
            "training view built"
        );

        Ok(Self {
            features,
            labels,
            n_classes,
            bins,
        })
    }

    /// Column-major predictor values: `features()[feature][row]`.
    #[must_use]
    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    /// Class label per row.
    #[must_use]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Number of classes (largest label + 1).
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Number of predictor columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    /// Number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.labels.len()
    }

    pub(crate) fn bins(&self) -> &FeatureBins {
        &self.bins
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        Dataset::from_rows(
            &[
                vec![1.0, 10.0, 0.0],
                vec![2.0, 20.0, 1.0],
                vec![3.0, 30.0, 2.0],
            ],
            7,
        )
        .unwrap()
    }

    #[test]
    fn from_rows_transposes() {
        let ds = sample();
        assert_eq!(ds.n_rows(), 3);
        assert_eq!(ds.n_columns(), 3);
        assert_eq!(ds.column(1), &[10.0, 20.0, 30.0]);
        assert_eq!(ds.names(), &["c0", "c1", "c2"]);
        assert_eq!(ds.seed(), 7);
    }

    #[test]
    fn ragged_rows_rejected() {
        let err = Dataset::from_rows(&[vec![1.0, 2.0], vec![1.0]], 0).unwrap_err();
        assert!(matches!(err, ForestError::RaggedColumn { expected: 2, got: 1, .. }));
    }

    #[test]
    fn empty_rejected() {
        assert!(matches!(Dataset::from_rows(&[], 0), Err(ForestError::NoColumns)));
        let err = Dataset::new(vec!["a".into()], vec![vec![]], 0).unwrap_err();
        assert!(matches!(err, ForestError::EmptyDataset));
    }

    #[test]
    fn class_labels_must_be_integral() {
        let ds = Dataset::from_rows(&[vec![0.0, 1.5]], 0).unwrap();
        let err = ds.class_labels(1).unwrap_err();
        assert!(matches!(err, ForestError::InvalidClassValue { row: 0, .. }));
        let ds = Dataset::from_rows(&[vec![0.0, -1.0]], 0).unwrap();
        assert!(ds.class_labels(1).is_err());
    }

    #[test]
    fn huge_class_labels_rejected() {
        let ds = Dataset::from_rows(&[vec![0.0, 0.0], vec![1.0, 1e12]], 0).unwrap();
        let err = ds.class_labels(1).unwrap_err();
        assert!(matches!(err, ForestError::InvalidClassValue { row: 1, .. }));

        let columns = ColumnSet::select(2, None, None).unwrap();
        let err = TrainingView::build(&ds, &columns, 8).unwrap_err();
        assert!(matches!(err, ForestError::InvalidClassValue { row: 1, .. }));

        let top = (MAX_CLASSES - 1) as f64;
        let ds = Dataset::from_rows(&[vec![0.0, top]], 0).unwrap();
        assert_eq!(ds.class_labels(1).unwrap(), vec![MAX_CLASSES - 1]);
    }

    #[test]
    fn training_view_uses_column_set() {
        let ds = sample();
        let columns = ColumnSet::select(3, Some(2), Some("0")).unwrap();
        let view = TrainingView::build(&ds, &columns, 16).unwrap();
        assert_eq!(view.n_features(), 1);
        assert_eq!(view.features()[0], vec![10.0, 20.0, 30.0]);
        assert_eq!(view.labels(), &[0, 1, 2]);
        assert_eq!(view.n_classes(), 3);
        assert_eq!(ds.predictor_row(&columns, 2), vec![30.0]);
    }

    #[test]
    fn training_view_rejects_non_finite_predictor() {
        let ds = Dataset::from_rows(&[vec![f64::NAN, 0.0], vec![1.0, 1.0]], 0).unwrap();
        let columns = ColumnSet::select(2, None, None).unwrap();
        let err = TrainingView::build(&ds, &columns, 8).unwrap_err();
        assert!(matches!(err, ForestError::NonFiniteValue { row: 0, column: 0 }));
    }

    #[test]
    fn training_view_rejects_width_mismatch() {
        let ds = sample();
        let columns = ColumnSet::select(4, None, None).unwrap();
        let err = TrainingView::build(&ds, &columns, 8).unwrap_err();
        assert!(matches!(err, ForestError::ColumnCountMismatch { expected: 4, got: 3 }));
    }
}
