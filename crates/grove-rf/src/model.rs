//! The append-only forest model and its on-disk format.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info, instrument};

use crate::columns::ColumnSet;
use crate::data::Dataset;
use crate::error::ForestError;
use crate::store::ModelKey;
use crate::tree::DecisionTree;

/// Current binary format version.
const FORMAT_VERSION: u32 = 1;

/// One finished tree together with the randomness that produced it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GrownTree {
    /// Position of the tree in `[0, n_trees)`.
    pub index: usize,
    /// Seed the tree's task was started from.
    pub seed: u64,
    /// The fitted tree.
    pub tree: DecisionTree,
    /// Dataset rows the tree did not sample, ascending.
    pub oob_rows: Vec<usize>,
}

/// A forest under construction or finished.
///
/// Trees are keyed by index, so the model's content does not depend on the
/// order in which tasks finished. Trees are only ever added.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ForestModel {
    key: ModelKey,
    n_trees: usize,
    columns: ColumnSet,
    n_classes: usize,
    stratified: bool,
    trees: BTreeMap<usize, GrownTree>,
}

impl ForestModel {
    /// Create an empty model expecting `n_trees` trees.
    #[must_use]
    pub fn new(
        key: ModelKey,
        n_trees: usize,
        columns: ColumnSet,
        n_classes: usize,
        stratified: bool,
    ) -> Self {
        Self {
            key,
            n_trees,
            columns,
            n_classes,
            stratified,
            trees: BTreeMap::new(),
        }
    }

    /// Add a tree.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::TreeOutOfRange`] | `tree.index >= n_trees` |
    /// | [`ForestError::DuplicateTree`] | the index is already present; the first tree is kept |
    pub(crate) fn insert(&mut self, tree: GrownTree) -> Result<usize, ForestError> {
        if tree.index >= self.n_trees {
            return Err(ForestError::TreeOutOfRange {
                key: self.key.to_string(),
                tree: tree.index,
                n_trees: self.n_trees,
            });
        }
        if self.trees.contains_key(&tree.index) {
            return Err(ForestError::DuplicateTree {
                key: self.key.to_string(),
                tree: tree.index,
            });
        }
        self.trees.insert(tree.index, tree);
        Ok(self.trees.len())
    }

    /// Return the model's key.
    #[must_use]
    pub fn key(&self) -> &ModelKey {
        &self.key
    }

    /// Return the requested tree count.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    /// Return the number of trees appended so far.
    #[must_use]
    pub fn n_grown(&self) -> usize {
        self.trees.len()
    }

    /// Return `true` once every requested tree is present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.trees.len() == self.n_trees
    }

    /// Return the column set the model was trained on.
    #[must_use]
    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    /// Return the number of classes seen during training.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Return `true` if trees were grown with stratified sampling.
    #[must_use]
    pub fn is_stratified(&self) -> bool {
        self.stratified
    }

    /// Iterate over the trees in index order.
    pub fn trees(&self) -> impl Iterator<Item = &GrownTree> {
        self.trees.values()
    }

    /// Return the tree at `index`, if present.
    #[must_use]
    pub fn tree(&self, index: usize) -> Option<&GrownTree> {
        self.trees.get(&index)
    }

    /// Count each tree's prediction for one sample of predictor values.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::PredictionFeatureMismatch`] if the sample width
    /// differs from the model's predictor count.
    pub fn votes(&self, sample: &[f64]) -> Result<Vec<usize>, ForestError> {
        let mut votes = vec![0usize; self.n_classes];
        for grown in self.trees.values() {
            let class = grown.tree.predict(sample)?;
            votes[class] += 1;
        }
        Ok(votes)
    }

    /// Predict the class of one sample by majority vote.
    ///
    /// # Errors
    ///
    /// Same as [`ForestModel::votes`].
    pub fn predict(&self, sample: &[f64]) -> Result<usize, ForestError> {
        Ok(majority_vote(&self.votes(sample)?))
    }

    /// Predict the class of one dataset row.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::ColumnCountMismatch`] if the dataset is not as
    /// wide as the training data.
    pub fn predict_row(&self, dataset: &Dataset, row: usize) -> Result<usize, ForestError> {
        if dataset.n_columns() != self.columns.n_columns() {
            return Err(ForestError::ColumnCountMismatch {
                expected: self.columns.n_columns(),
                got: dataset.n_columns(),
            });
        }
        self.predict(&dataset.predictor_row(&self.columns, row))
    }

    /// Save the model to a binary file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::SerializeModel`] | bincode encoding failed |
    /// | [`ForestError::WriteModel`] | file write failed |
    #[instrument(skip(self), fields(key = %self.key, path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ForestError> {
        let path = path.as_ref();
        let envelope = ModelEnvelope {
            format_version: FORMAT_VERSION,
            model: self.clone(),
        };
        let bytes =
            bincode::serialize(&envelope).map_err(|e| ForestError::SerializeModel { source: e })?;
        std::fs::write(path, &bytes).map_err(|e| ForestError::WriteModel {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!(size_bytes = bytes.len(), n_trees = self.n_grown(), "model saved");
        Ok(())
    }

    /// Load a model saved by [`ForestModel::save`].
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::ReadModel`] | file read failed |
    /// | [`ForestError::DeserializeModel`] | bincode decoding failed |
    /// | [`ForestError::IncompatibleModelVersion`] | format version mismatch |
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ForestError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| ForestError::ReadModel {
            path: path.to_path_buf(),
            source: e,
        })?;
        let envelope: ModelEnvelope =
            bincode::deserialize(&bytes).map_err(|e| ForestError::DeserializeModel {
                path: path.to_path_buf(),
                source: e,
            })?;
        if envelope.format_version != FORMAT_VERSION {
            return Err(ForestError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found: envelope.format_version,
                path: path.to_path_buf(),
            });
        }
        debug!(
            key = %envelope.model.key,
            n_trees = envelope.model.n_grown(),
            n_classes = envelope.model.n_classes,
            "model loaded"
        );
        Ok(envelope.model)
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct ModelEnvelope {
    format_version: u32,
    model: ForestModel,
}

/// Index of the largest count; ties go to the lowest class.
pub(crate) fn majority_vote(votes: &[usize]) -> usize {
    let mut best = 0;
    for (class, &count) in votes.iter().enumerate() {
        if count > votes[best] {
            best = class;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use tempfile::TempDir;

    use super::*;
    use crate::data::TrainingView;
    use crate::tree::DecisionTreeConfig;

    fn separable() -> (Dataset, ColumnSet) {
        let rows: Vec<Vec<f64>> = (0..12)
            .map(|i| vec![i as f64, if i < 6 { 0.0 } else { 1.0 }])
            .collect();
        let ds = Dataset::from_rows(&rows, 1).unwrap();
        let columns = ColumnSet::select(2, None, None).unwrap();
        (ds, columns)
    }

    fn model_with(n_trees: usize, grown: usize) -> (ForestModel, Dataset) {
        let (ds, columns) = separable();
        let view = TrainingView::build(&ds, &columns, 32).unwrap();
        let mut model = ForestModel::new(ModelKey::new("m"), n_trees, columns, 2, false);
        let rows: Vec<usize> = (0..12).collect();
        for index in 0..grown {
            let mut rng = ChaCha8Rng::seed_from_u64(index as u64);
            let tree = DecisionTreeConfig::new()
                .grow(&view, &rows, None, &mut rng)
                .unwrap();
            model
                .insert(GrownTree {
                    index,
                    seed: index as u64,
                    tree,
                    oob_rows: Vec::new(),
                })
                .unwrap();
        }
        (model, ds)
    }

    #[test]
    fn majority_vote_breaks_ties_low() {
        assert_eq!(majority_vote(&[2, 2, 1]), 0);
        assert_eq!(majority_vote(&[1, 3, 3]), 1);
        assert_eq!(majority_vote(&[0, 0, 0]), 0);
        assert_eq!(majority_vote(&[]), 0);
    }

    #[test]
    fn complete_after_all_trees() {
        let (model, _) = model_with(3, 3);
        assert!(model.is_complete());
        let (partial, _) = model_with(3, 2);
        assert!(!partial.is_complete());
        assert_eq!(partial.n_grown(), 2);
    }

    #[test]
    fn duplicate_insert_keeps_first() {
        let (mut model, _) = model_with(3, 1);
        let first = model.tree(0).unwrap().clone();
        let mut other = first.clone();
        other.seed = 99;
        let err = model.insert(other).unwrap_err();
        assert!(matches!(err, ForestError::DuplicateTree { tree: 0, .. }));
        assert_eq!(model.tree(0).unwrap(), &first);
    }

    #[test]
    fn out_of_range_insert_rejected() {
        let (mut model, _) = model_with(1, 1);
        let mut extra = model.tree(0).unwrap().clone();
        extra.index = 1;
        assert!(matches!(
            model.insert(extra),
            Err(ForestError::TreeOutOfRange { tree: 1, n_trees: 1, .. })
        ));
    }

    #[test]
    fn predicts_rows() {
        let (model, ds) = model_with(3, 3);
        assert_eq!(model.predict_row(&ds, 0).unwrap(), 0);
        assert_eq!(model.predict_row(&ds, 11).unwrap(), 1);
        assert_eq!(model.votes(&[11.0]).unwrap(), vec![0, 3]);
    }

    #[test]
    fn predict_row_rejects_narrow_dataset() {
        let (model, _) = model_with(1, 1);
        let narrow = Dataset::from_rows(&[vec![1.0]], 0).unwrap();
        assert!(matches!(
            model.predict_row(&narrow, 0),
            Err(ForestError::ColumnCountMismatch { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.bin");
        let (model, ds) = model_with(4, 4);
        model.save(&path).unwrap();
        let loaded = ForestModel::load(&path).unwrap();
        assert_eq!(loaded, model);
        for row in 0..ds.n_rows() {
            assert_eq!(
                loaded.predict_row(&ds, row).unwrap(),
                model.predict_row(&ds, row).unwrap()
            );
        }
    }

    #[test]
    fn load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = ForestModel::load(dir.path().join("absent.bin")).unwrap_err();
        assert!(matches!(err, ForestError::ReadModel { .. }));
    }

    #[test]
    fn load_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corrupt.bin");
        std::fs::write(&path, b"grove").unwrap();
        let err = ForestModel::load(&path).unwrap_err();
        assert!(matches!(err, ForestError::DeserializeModel { .. }));
    }

    #[test]
    fn load_wrong_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old.bin");
        let (model, _) = model_with(1, 1);
        let bytes = bincode::serialize(&ModelEnvelope {
            format_version: FORMAT_VERSION + 1,
            model,
        })
        .unwrap();
        std::fs::write(&path, bytes).unwrap();
        let err = ForestModel::load(&path).unwrap_err();
        assert!(matches!(err, ForestError::IncompatibleModelVersion { .. }));
    }
}
