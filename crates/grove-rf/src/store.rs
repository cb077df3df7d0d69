//! Shared in-memory store for datasets and growing models.
//!
//! The key maps sit behind `RwLock`s; every model additionally has its own
//! `Mutex`, so appends to different models never contend.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use crate::data::Dataset;
use crate::error::ForestError;
use crate::model::{ForestModel, GrownTree};

macro_rules! string_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        pub struct $name(String);

        impl $name {
            /// Wrap a key string.
            pub fn new(key: impl Into<String>) -> Self {
                Self(key.into())
            }

            /// Return the key as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(key: &str) -> Self {
                Self::new(key)
            }
        }
    };
}

string_key! {
    /// Key under which a dataset is stored.
    DatasetKey
}

string_key! {
    /// Key under which a forest model is stored.
    ModelKey
}

type SharedModel = Arc<Mutex<ForestModel>>;

/// Thread-safe key/value store shared by a job and all of its tree tasks.
#[derive(Debug, Default)]
pub struct ForestStore {
    datasets: RwLock<HashMap<DatasetKey, Arc<Dataset>>>,
    models: RwLock<HashMap<ModelKey, SharedModel>>,
}

impl ForestStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a dataset, returning the one it replaced.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::StorePoisoned`] if a writer panicked.
    pub fn put_dataset(
        &self,
        key: DatasetKey,
        dataset: impl Into<Arc<Dataset>>,
    ) -> Result<Option<Arc<Dataset>>, ForestError> {
        let dataset = dataset.into();
        debug!(%key, n_rows = dataset.n_rows(), n_columns = dataset.n_columns(), "dataset stored");
        let mut datasets = self.datasets.write().map_err(|_| ForestError::StorePoisoned {
            action: "storing a dataset",
        })?;
        Ok(datasets.insert(key, dataset))
    }

    /// Fetch a dataset.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::UnknownDataset`] | nothing stored under `key` |
    /// | [`ForestError::StorePoisoned`] | a writer panicked |
    pub fn dataset(&self, key: &DatasetKey) -> Result<Arc<Dataset>, ForestError> {
        let datasets = self.datasets.read().map_err(|_| ForestError::StorePoisoned {
            action: "reading a dataset",
        })?;
        datasets
            .get(key)
            .cloned()
            .ok_or_else(|| ForestError::UnknownDataset {
                key: key.to_string(),
            })
    }

    /// Remove a dataset. Tasks already holding it keep their `Arc`.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::StorePoisoned`] if a writer panicked.
    pub fn remove_dataset(&self, key: &DatasetKey) -> Result<Option<Arc<Dataset>>, ForestError> {
        let mut datasets = self.datasets.write().map_err(|_| ForestError::StorePoisoned {
            action: "removing a dataset",
        })?;
        Ok(datasets.remove(key))
    }

    /// Register an empty model under its own key.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::ModelExists`] | the key is taken |
    /// | [`ForestError::StorePoisoned`] | a writer panicked |
    pub fn create_model(&self, model: ForestModel) -> Result<(), ForestError> {
        let mut models = self.models.write().map_err(|_| ForestError::StorePoisoned {
            action: "creating a model",
        })?;
        let key = model.key().clone();
        if models.contains_key(&key) {
            return Err(ForestError::ModelExists {
                key: key.to_string(),
            });
        }
        debug!(%key, n_trees = model.n_trees(), "model created");
        models.insert(key, Arc::new(Mutex::new(model)));
        Ok(())
    }

    /// Append one tree to a model; returns the model's tree count afterwards.
    ///
    /// Only the target model's lock is held while the tree is inserted.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::UnknownModel`] | nothing stored under `key` |
    /// | [`ForestError::DuplicateTree`] | the tree index was already appended |
    /// | [`ForestError::TreeOutOfRange`] | the index exceeds the requested count |
    /// | [`ForestError::StorePoisoned`] | a writer panicked |
    pub fn append_tree(&self, key: &ModelKey, tree: GrownTree) -> Result<usize, ForestError> {
        let shared = self.shared_model(key)?;
        let mut model = shared.lock().map_err(|_| ForestError::StorePoisoned {
            action: "appending a tree",
        })?;
        model.insert(tree)
    }

    /// Return a snapshot of a model, complete or not.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::UnknownModel`] | nothing stored under `key` |
    /// | [`ForestError::StorePoisoned`] | a writer panicked |
    pub fn model(&self, key: &ModelKey) -> Result<ForestModel, ForestError> {
        let shared = self.shared_model(key)?;
        let model = shared.lock().map_err(|_| ForestError::StorePoisoned {
            action: "reading a model",
        })?;
        Ok(model.clone())
    }

    /// Remove a model, returning its final snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::StorePoisoned`] if a writer panicked.
    pub fn remove_model(&self, key: &ModelKey) -> Result<Option<ForestModel>, ForestError> {
        let removed = {
            let mut models = self.models.write().map_err(|_| ForestError::StorePoisoned {
                action: "removing a model",
            })?;
            models.remove(key)
        };
        removed
            .map(|shared| {
                shared
                    .lock()
                    .map(|model| model.clone())
                    .map_err(|_| ForestError::StorePoisoned {
                        action: "removing a model",
                    })
            })
            .transpose()
    }

    fn shared_model(&self, key: &ModelKey) -> Result<SharedModel, ForestError> {
        let models = self.models.read().map_err(|_| ForestError::StorePoisoned {
            action: "looking up a model",
        })?;
        models
            .get(key)
            .cloned()
            .ok_or_else(|| ForestError::UnknownModel {
                key: key.to_string(),
            })
    }
}
