//! Predictor and class column selection.

use std::collections::BTreeSet;
use std::fmt;

use tracing::debug;

use crate::error::ForestError;

/// Ordered set of dataset columns a forest is grown on.
///
/// Predictor indices are ascending and the class column is always the final
/// element, so `indices()` reads `[p0, p1, ..., pk, class]`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ColumnSet {
    indices: Vec<usize>,
    n_columns: usize,
}

impl ColumnSet {
    /// Select predictor columns from a dataset of `n_columns` columns.
    ///
    /// `class_column` defaults to the last column. `ignores` is a
    /// comma-separated list of column indices to drop; an empty or
    /// whitespace-only string ignores nothing.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::NoColumns`] | `n_columns` is zero |
    /// | [`ForestError::ClassColumnOutOfRange`] | `class_column >= n_columns` |
    /// | [`ForestError::InvalidIgnoredColumn`] | an ignore entry is not an index |
    /// | [`ForestError::IgnoredColumnOutOfRange`] | an ignored index `>= n_columns` |
    /// | [`ForestError::IgnoredClassColumn`] | the class column is ignored |
    /// | [`ForestError::DuplicateIgnoredColumn`] | an index is ignored twice |
    /// | [`ForestError::ColumnSetInvariant`] | output length check failed |
    pub fn select(
        n_columns: usize,
        class_column: Option<usize>,
        ignores: Option<&str>,
    ) -> Result<Self, ForestError> {
        if n_columns == 0 {
            return Err(ForestError::NoColumns);
        }
        let class_column = class_column.unwrap_or(n_columns - 1);
        if class_column >= n_columns {
            return Err(ForestError::ClassColumnOutOfRange {
                class_column,
                n_columns,
            });
        }

        let ignored = parse_ignores(ignores.unwrap_or(""), n_columns, class_column)?;

        let mut indices: Vec<usize> = (0..n_columns)
            .filter(|&c| c != class_column && !ignored.contains(&c))
            .collect();
        indices.push(class_column);

        let expected = (n_columns - 1 - ignored.len()) + 1;
        if indices.len() != expected {
            return Err(ForestError::ColumnSetInvariant {
                expected,
                got: indices.len(),
            });
        }

        debug!(
            n_columns,
            class_column,
            n_ignored = ignored.len(),
            n_predictors = indices.len() - 1,
            "column set selected"
        );

        Ok(Self { indices, n_columns })
    }

    /// Return all selected indices, predictors first and the class column last.
    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Return the predictor column indices in ascending order.
    #[must_use]
    pub fn predictors(&self) -> &[usize] {
        &self.indices[..self.indices.len() - 1]
    }

    /// Return the class column index.
    #[must_use]
    pub fn class_column(&self) -> usize {
        self.indices[self.indices.len() - 1]
    }

    /// Return the number of predictor columns.
    #[must_use]
    pub fn n_predictors(&self) -> usize {
        self.indices.len() - 1
    }

    /// Return the width of the dataset the set was selected from.
    #[must_use]
    pub fn n_columns(&self) -> usize {
        self.n_columns
    }

    /// Return the number of selected indices, class column included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Always `false`: a column set holds at least the class column.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

impl fmt::Display for ColumnSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, c) in self.indices.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{c}")?;
        }
        write!(f, "]")
    }
}

fn parse_ignores(
    raw: &str,
    n_columns: usize,
    class_column: usize,
) -> Result<BTreeSet<usize>, ForestError> {
    let mut ignored = BTreeSet::new();
    if raw.trim().is_empty() {
        return Ok(ignored);
    }
    for entry in raw.split(',') {
        let entry = entry.trim();
        let column: usize = entry
            .parse()
            .map_err(|_| ForestError::InvalidIgnoredColumn {
                raw: entry.to_string(),
            })?;
        if column >= n_columns {
            return Err(ForestError::IgnoredColumnOutOfRange { column, n_columns });
        }
        if column == class_column {
            return Err(ForestError::IgnoredClassColumn { column });
        }
        if !ignored.insert(column) {
            return Err(ForestError::DuplicateIgnoredColumn { column });
        }
    }
    Ok(ignored)
}
