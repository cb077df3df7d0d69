//! Confusion matrices and evaluation results.

use std::fmt;

use crate::error::ForestError;

/// Counts of actual versus predicted classes.
///
/// Entry `as_rows()[actual][predicted]` counts the rows with true class
/// `actual` that the forest assigned to `predicted`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ConfusionMatrix {
    matrix: Vec<Vec<usize>>,
    n_classes: usize,
}

impl ConfusionMatrix {
    /// Build a confusion matrix from paired true and predicted labels.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::EmptyDataset`] | zero labels provided |
    /// | [`ForestError::InvalidClassValue`] | a label is `>= n_classes` |
    pub fn from_labels(
        actual: &[usize],
        predicted: &[usize],
        n_classes: usize,
    ) -> Result<Self, ForestError> {
        if actual.is_empty() {
            return Err(ForestError::EmptyDataset);
        }
        let mut matrix = vec![vec![0usize; n_classes]; n_classes];
        for (row, (&a, &p)) in actual.iter().zip(predicted).enumerate() {
            if a >= n_classes || p >= n_classes {
                return Err(ForestError::InvalidClassValue {
                    row,
                    value: a.max(p) as f64,
                });
            }
            matrix[a][p] += 1;
        }
        Ok(Self { matrix, n_classes })
    }

    /// A matrix with no scored rows.
    pub(crate) fn empty(n_classes: usize) -> Self {
        Self {
            matrix: vec![vec![0; n_classes]; n_classes],
            n_classes,
        }
    }

    /// Total number of scored rows.
    #[must_use]
    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }

    /// Number of rows on the diagonal.
    #[must_use]
    pub fn correct(&self) -> usize {
        (0..self.n_classes).map(|c| self.matrix[c][c]).sum()
    }

    /// Fraction of scored rows predicted correctly.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.correct() as f64 / total as f64
        }
    }

    /// Fraction of scored rows predicted wrongly.
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            1.0 - self.accuracy()
        }
    }

    /// Error rate among rows whose true class is `class`.
    #[must_use]
    pub fn class_error(&self, class: usize) -> f64 {
        let row = &self.matrix[class];
        let support: usize = row.iter().sum();
        if support == 0 {
            0.0
        } else {
            (support - row[class]) as f64 / support as f64
        }
    }

    /// Return the underlying matrix rows.
    #[must_use]
    pub fn as_rows(&self) -> &[Vec<usize>] {
        &self.matrix
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>12}", "actual\\pred")?;
        for c in 0..self.n_classes {
            write!(f, " {c:>8}")?;
        }
        writeln!(f, " {:>8}", "error")?;

        for (c, row) in self.matrix.iter().enumerate() {
            write!(f, "{c:>12}")?;
            for count in row {
                write!(f, " {count:>8}")?;
            }
            writeln!(f, " {:>8.4}", self.class_error(c))?;
        }

        write!(f, "{:>12}", "totals")?;
        for c in 0..self.n_classes {
            let column: usize = self.matrix.iter().map(|row| row[c]).sum();
            write!(f, " {column:>8}")?;
        }
        writeln!(f, " {:>8.4}", self.error_rate())
    }
}

/// Which rows an evaluation scored and which trees voted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationKind {
    /// Training rows, scored only by trees that did not sample them.
    OutOfBag,
    /// Rows of a separate dataset, scored by every tree.
    Validation,
}

impl EvaluationKind {
    /// Short name used in logs and artifact file names.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EvaluationKind::OutOfBag => "oob",
            EvaluationKind::Validation => "validation",
        }
    }
}

impl fmt::Display for EvaluationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ConfusionResult {
    /// Evaluation flavour.
    pub kind: EvaluationKind,
    /// The confusion matrix.
    pub matrix: ConfusionMatrix,
    /// Misclassification rate over scored rows.
    pub error_rate: f64,
    /// Trees in the evaluated model.
    pub n_trees: usize,
    /// Rows that received a prediction.
    pub rows_scored: usize,
    /// Rows without any voting tree.
    pub rows_skipped: usize,
}

impl ConfusionResult {
    pub(crate) fn new(
        kind: EvaluationKind,
        matrix: ConfusionMatrix,
        n_trees: usize,
        rows_skipped: usize,
    ) -> Self {
        Self {
            kind,
            error_rate: matrix.error_rate(),
            rows_scored: matrix.total(),
            matrix,
            n_trees,
            rows_skipped,
        }
    }
}

impl fmt::Display for ConfusionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} confusion matrix ({} trees, {} rows scored, {} skipped)",
            self.kind, self.n_trees, self.rows_scored, self.rows_skipped
        )?;
        write!(f, "{}", self.matrix)?;
        writeln!(f, "error rate: {:.4}", self.error_rate)
    }
}
