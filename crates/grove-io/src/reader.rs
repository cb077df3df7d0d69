//! CSV dataset reader.

use std::path::{Path, PathBuf};

use grove_rf::{DEFAULT_DATASET_SEED, Dataset};
use tracing::{debug, info, instrument};

use crate::IoError;

/// Reads an all-numeric CSV file into a [`Dataset`].
///
/// Expected format: a header row naming every column, then one row per
/// record with the same number of cells. Every cell must parse as a finite
/// `f64`; class labels are stored as numbers like any other column.
#[derive(Debug, Clone)]
pub struct DatasetReader {
    path: PathBuf,
    seed: u64,
}

impl DatasetReader {
    /// Create a reader for the given CSV file path.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            seed: DEFAULT_DATASET_SEED,
        }
    }

    /// Set the seed the loaded dataset carries.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the path being read.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and validate the file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::FileNotFound`] | file doesn't exist or is unreadable |
    /// | [`IoError::CsvParse`] | malformed CSV record |
    /// | [`IoError::NoColumns`] | header is empty |
    /// | [`IoError::EmptyDataset`] | zero data rows after header |
    /// | [`IoError::InconsistentRowLength`] | row width differs from header |
    /// | [`IoError::NonNumericValue`] | cell is not a finite number |
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<Dataset, IoError> {
        let file = std::fs::File::open(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // flexible(true) so that short rows report InconsistentRowLength.
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let header = rdr.headers().map_err(|e| self.parse_error(e))?;
        let names: Vec<String> = header.iter().map(String::from).collect();
        let n_columns = names.len();
        if n_columns == 0 || names.iter().all(String::is_empty) {
            return Err(IoError::NoColumns {
                path: self.path.clone(),
            });
        }
        debug!(n_columns, "read CSV header");

        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); n_columns];
        let mut n_rows = 0usize;
        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| self.parse_error(e))?;
            if record.len() != n_columns {
                return Err(IoError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index,
                    expected: n_columns,
                    got: record.len(),
                });
            }
            for (col_index, (raw, column)) in record.iter().zip(&mut columns).enumerate() {
                let value = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| IoError::NonNumericValue {
                        path: self.path.clone(),
                        row_index,
                        col_index,
                        raw: raw.to_string(),
                    })?;
                column.push(value);
            }
            n_rows += 1;
        }

        if n_rows == 0 {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        let dataset =
            Dataset::new(names, columns, self.seed).map_err(|e| IoError::InvalidDataset {
                path: self.path.clone(),
                source: e,
            })?;
        info!(n_rows, n_columns, seed = self.seed, "dataset loaded");
        Ok(dataset)
    }

    fn parse_error(&self, e: csv::Error) -> IoError {
        IoError::CsvParse {
            path: self.path.clone(),
            offset: e.position().map_or(0, csv::Position::byte),
            source: e,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn reads_numeric_columns() {
        let f = write_csv("a,b,class\n1.0,2.5,0\n3,4,1\n");
        let ds = DatasetReader::new(f.path()).with_seed(9).read().unwrap();
        assert_eq!(ds.n_rows(), 2);
        assert_eq!(ds.n_columns(), 3);
        assert_eq!(ds.names(), &["a", "b", "class"]);
        assert_eq!(ds.column(1), &[2.5, 4.0]);
        assert_eq!(ds.seed(), 9);
    }

    #[test]
    fn default_seed() {
        let f = write_csv("x\n1\n");
        let ds = DatasetReader::new(f.path()).read().unwrap();
        assert_eq!(ds.seed(), DEFAULT_DATASET_SEED);
    }

    #[test]
    fn trims_whitespace() {
        let f = write_csv("x, y\n 1 , 2\n");
        let ds = DatasetReader::new(f.path()).read().unwrap();
        assert_eq!(ds.names(), &["x", "y"]);
        assert_eq!(ds.column(0), &[1.0]);
    }

    #[test]
    fn missing_file() {
        let err = DatasetReader::new("/nonexistent/grove/data.csv")
            .read()
            .unwrap_err();
        assert!(matches!(err, IoError::FileNotFound { .. }));
    }

    #[test]
    fn empty_file() {
        let f = write_csv("");
        let err = DatasetReader::new(f.path()).read().unwrap_err();
        assert!(matches!(err, IoError::NoColumns { .. }));
    }

    #[test]
    fn header_only() {
        let f = write_csv("a,b\n");
        let err = DatasetReader::new(f.path()).read().unwrap_err();
        assert!(matches!(err, IoError::EmptyDataset { .. }));
    }

    #[test]
    fn ragged_row() {
        let f = write_csv("a,b\n1,2\n3\n");
        let err = DatasetReader::new(f.path()).read().unwrap_err();
        assert!(matches!(
            err,
            IoError::InconsistentRowLength {
                row_index: 1,
                expected: 2,
                got: 1,
                ..
            }
        ));
    }

    #[test]
    fn non_numeric_cell() {
        let f = write_csv("a,b\n1,setosa\n");
        let err = DatasetReader::new(f.path()).read().unwrap_err();
        assert!(matches!(
            err,
            IoError::NonNumericValue { row_index: 0, col_index: 1, .. }
        ));
    }

    #[test]
    fn non_finite_cell() {
        let f = write_csv("a\nNaN\n");
        let err = DatasetReader::new(f.path()).read().unwrap_err();
        assert!(matches!(err, IoError::NonNumericValue { .. }));
    }
}
