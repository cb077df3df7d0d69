use std::path::PathBuf;

/// Errors from forest configuration, growth, assembly, and evaluation.
#[derive(Debug, thiserror::Error)]
pub enum ForestError {
    /// Returned when a negative tree count is requested.
    #[error("tree count must not be negative, got {n_trees}")]
    NegativeTreeCount {
        /// The requested tree count.
        n_trees: i64,
    },

    /// Returned when max_depth is zero.
    #[error("max_depth must be at least 1, got {max_depth}")]
    InvalidMaxDepth {
        /// The invalid max_depth value provided.
        max_depth: usize,
    },

    /// Returned when the minimum error rate is outside [0.0, 1.0).
    #[error("min_error_rate must be in [0.0, 1.0), got {rate}")]
    InvalidMinErrorRate {
        /// The invalid rate.
        rate: f64,
    },

    /// Returned when the sample fraction is not in (0.0, 1.0].
    #[error("sample fraction must be in (0.0, 1.0], got {fraction}")]
    InvalidSampleFraction {
        /// The invalid fraction.
        fraction: f64,
    },

    /// Returned when the bin limit is outside [1, 32767].
    #[error("bin limit must be in [1, 32767], got {bin_limit}")]
    InvalidBinLimit {
        /// The invalid bin limit.
        bin_limit: u32,
    },

    /// Returned when max_features resolves to 0 or exceeds the predictor count.
    #[error("max_features resolved to {max_features}, but must be in [1, {n_features}]")]
    InvalidMaxFeatures {
        /// The resolved max_features value.
        max_features: usize,
        /// The number of predictor columns.
        n_features: usize,
    },

    /// Returned when an RNG kind name is not recognised.
    #[error("unknown RNG kind \"{name}\" (expected chacha8, chacha12, or chacha20)")]
    UnknownRngKind {
        /// The unrecognised name.
        name: String,
    },

    /// Returned when a split statistic name is not recognised.
    #[error("unknown split statistic \"{name}\" (expected entropy or gini)")]
    UnknownStatistic {
        /// The unrecognised name.
        name: String,
    },

    /// Returned when the dataset has no columns at all.
    #[error("dataset has no columns")]
    NoColumns,

    /// Returned when the class column index is outside the dataset.
    #[error("class column {class_column} is out of range for {n_columns} columns")]
    ClassColumnOutOfRange {
        /// The requested class column.
        class_column: usize,
        /// Total number of columns.
        n_columns: usize,
    },

    /// Returned when an entry of the ignore list is not a column index.
    #[error("cannot parse ignored column \"{raw}\"")]
    InvalidIgnoredColumn {
        /// The raw entry.
        raw: String,
    },

    /// Returned when an ignored column index is outside the dataset.
    #[error("ignored column {column} is out of range for {n_columns} columns")]
    IgnoredColumnOutOfRange {
        /// The ignored index.
        column: usize,
        /// Total number of columns.
        n_columns: usize,
    },

    /// Returned when the class column also appears in the ignore list.
    #[error("class column {column} cannot be ignored")]
    IgnoredClassColumn {
        /// The class column index.
        column: usize,
    },

    /// Returned when the ignore list names the same column twice.
    #[error("column {column} is ignored more than once")]
    DuplicateIgnoredColumn {
        /// The repeated index.
        column: usize,
    },

    /// Returned when the selected column set has an unexpected length.
    #[error("column set has {got} entries, expected {expected}")]
    ColumnSetInvariant {
        /// Expected length.
        expected: usize,
        /// Actual length.
        got: usize,
    },

    /// Returned when a `label:value` pair in strata or weights text is malformed.
    #[error("malformed {what} entry \"{raw}\": expected label:value")]
    MalformedPair {
        /// Which list was being parsed ("strata" or "weights").
        what: &'static str,
        /// The raw entry.
        raw: String,
    },

    /// Returned when a class label is not a non-negative integer.
    #[error("invalid class label \"{raw}\" in {what}")]
    InvalidLabel {
        /// Which list was being parsed.
        what: &'static str,
        /// The raw label.
        raw: String,
    },

    /// Returned when a value in strata or weights text cannot be parsed or is out of range.
    #[error("invalid {what} value \"{raw}\" for class {label}")]
    InvalidValue {
        /// Which list was being parsed.
        what: &'static str,
        /// The class label.
        label: usize,
        /// The raw value.
        raw: String,
    },

    /// Returned when strata or weights text names a class twice.
    #[error("class {label} appears more than once in {what}")]
    DuplicateLabel {
        /// Which list was being parsed.
        what: &'static str,
        /// The repeated label.
        label: usize,
    },

    /// Returned when a dataset has zero rows.
    #[error("dataset has zero rows")]
    EmptyDataset,

    /// Returned when the column set selects zero predictor columns.
    #[error("column set selects zero predictor columns")]
    ZeroFeatures,

    /// Returned when dataset columns have different lengths.
    #[error("column {column} has {got} rows, expected {expected}")]
    RaggedColumn {
        /// Offending column index.
        column: usize,
        /// Expected row count.
        expected: usize,
        /// Actual row count.
        got: usize,
    },

    /// Returned when a predictor value is NaN or infinite.
    #[error("non-finite value at row {row}, column {column}")]
    NonFiniteValue {
        /// Row index.
        row: usize,
        /// Column index in the dataset.
        column: usize,
    },

    /// Returned when a class column value is not an integer label below
    /// [`MAX_CLASSES`](crate::MAX_CLASSES).
    #[error(
        "row {row} has class value {value}, expected an integer label below {}",
        crate::data::MAX_CLASSES
    )]
    InvalidClassValue {
        /// Row index.
        row: usize,
        /// The offending value.
        value: f64,
    },

    /// Returned when a dataset's width differs from the model's training data.
    #[error("dataset has {got} columns, model was trained on {expected}")]
    ColumnCountMismatch {
        /// Column count the model expects.
        expected: usize,
        /// Column count of the dataset.
        got: usize,
    },

    /// Returned when a sample has a different number of features at prediction time.
    #[error("prediction input has {got} features, expected {expected}")]
    PredictionFeatureMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the prediction input.
        got: usize,
    },

    /// Returned when a tree's sampling step selected no rows.
    #[error("tree {tree} sampled zero of {n_rows} rows")]
    EmptySample {
        /// Tree index.
        tree: usize,
        /// Rows available.
        n_rows: usize,
    },

    /// Returned when a tree task fails; the batch it belonged to has fully run.
    #[error("tree {tree} failed to grow")]
    TaskFailed {
        /// Tree index.
        tree: usize,
        /// The underlying failure.
        #[source]
        source: Box<ForestError>,
    },

    /// Returned when an executor reports fewer results than it was given tasks.
    #[error("executor returned no result for tree {tree}")]
    MissingTaskResult {
        /// Tree index.
        tree: usize,
    },

    /// Returned when the executor's worker pool cannot be built.
    #[error("failed to build worker pool with {threads} threads")]
    WorkerPool {
        /// Requested worker count.
        threads: usize,
        /// The underlying rayon error.
        #[source]
        source: rayon::ThreadPoolBuildError,
    },

    /// Returned when a dataset key is not present in the store.
    #[error("no dataset stored under key \"{key}\"")]
    UnknownDataset {
        /// The missing key.
        key: String,
    },

    /// Returned when a model key is not present in the store.
    #[error("no model stored under key \"{key}\"")]
    UnknownModel {
        /// The missing key.
        key: String,
    },

    /// Returned when a model key is created twice.
    #[error("a model is already stored under key \"{key}\"")]
    ModelExists {
        /// The existing key.
        key: String,
    },

    /// Returned when a tree index is appended to a model twice.
    #[error("tree {tree} was already appended to model \"{key}\"")]
    DuplicateTree {
        /// Model key.
        key: String,
        /// Tree index.
        tree: usize,
    },

    /// Returned when a tree index lies outside the model's requested tree count.
    #[error("tree {tree} is out of range for model \"{key}\" with {n_trees} trees")]
    TreeOutOfRange {
        /// Model key.
        key: String,
        /// Tree index.
        tree: usize,
        /// Requested tree count.
        n_trees: usize,
    },

    /// Returned when a model is evaluated before all of its trees were appended.
    #[error("model \"{key}\" holds {got} of {expected} trees")]
    IncompleteModel {
        /// Model key.
        key: String,
        /// Requested tree count.
        expected: usize,
        /// Trees present.
        got: usize,
    },

    /// Returned when out-of-bag evaluation is requested for a stratified model.
    #[error("out-of-bag error is undefined for model \"{key}\" grown with stratified sampling")]
    OobUnavailable {
        /// Model key.
        key: String,
    },

    /// Returned when a store lock was poisoned by a panicking writer.
    #[error("store lock poisoned while {action}")]
    StorePoisoned {
        /// What the store was doing.
        action: &'static str,
    },

    /// Returned when model serialization fails.
    #[error("failed to serialize model")]
    SerializeModel {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when model deserialization fails.
    #[error("failed to deserialize model from {path}")]
    DeserializeModel {
        /// Path to the model file that could not be deserialized.
        path: PathBuf,
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when writing the model file fails.
    #[error("failed to write model to {path}")]
    WriteModel {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading the model file fails.
    #[error("failed to read model from {path}")]
    ReadModel {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when loading a model with an incompatible format version.
    #[error("incompatible model version in {path}: expected {expected}, found {found}")]
    IncompatibleModelVersion {
        /// The model format version this build expects.
        expected: u32,
        /// The model format version found in the file.
        found: u32,
        /// Path to the model file with the incompatible version.
        path: PathBuf,
    },
}

impl ForestError {
    /// Return `true` for errors detected while validating configuration,
    /// before any tree work is dispatched.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ForestError::NegativeTreeCount { .. }
                | ForestError::InvalidMaxDepth { .. }
                | ForestError::InvalidMinErrorRate { .. }
                | ForestError::InvalidSampleFraction { .. }
                | ForestError::InvalidBinLimit { .. }
                | ForestError::InvalidMaxFeatures { .. }
                | ForestError::UnknownRngKind { .. }
                | ForestError::UnknownStatistic { .. }
                | ForestError::NoColumns
                | ForestError::ClassColumnOutOfRange { .. }
                | ForestError::InvalidIgnoredColumn { .. }
                | ForestError::IgnoredColumnOutOfRange { .. }
                | ForestError::IgnoredClassColumn { .. }
                | ForestError::DuplicateIgnoredColumn { .. }
                | ForestError::ColumnSetInvariant { .. }
                | ForestError::MalformedPair { .. }
                | ForestError::InvalidLabel { .. }
                | ForestError::InvalidValue { .. }
                | ForestError::DuplicateLabel { .. }
        )
    }
}
