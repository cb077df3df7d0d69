//! Random-forest growth coordination: seeds, tasks, assembly, evaluation.
//!
//! A [`GrowJob`] selects columns, derives one seed per tree from the dataset
//! seed, dispatches one [`GrowTree`] task per tree through a
//! [`BatchExecutor`], assembles the trees into a [`ForestModel`] held in a
//! shared [`ForestStore`], and finally scores the model out-of-bag and/or
//! against a validation dataset.

mod columns;
mod config;
mod confusion;
mod data;
mod dispatch;
mod error;
mod evaluate;
mod job;
mod model;
mod node;
mod seed;
mod split;
mod store;
mod strata;
mod task;
mod tree;

pub use columns::ColumnSet;
pub use config::{DispatchMode, ForestConfig, MAX_BIN_LIMIT, MaxFeatures};
pub use confusion::{ConfusionMatrix, ConfusionResult, EvaluationKind};
pub use data::{DEFAULT_DATASET_SEED, Dataset, MAX_CLASSES, TrainingView};
pub use dispatch::{BatchExecutor, Dispatcher, RayonExecutor};
pub use error::ForestError;
pub use evaluate::Evaluator;
pub use job::{EvaluationPlan, GrowJob, JobOutcome, JobReport};
pub use model::{ForestModel, GrownTree};
pub use node::{FeatureIndex, Impurity, Node, NodeIndex, SplitTest};
pub use seed::{ROOT_SEED_ADD, RngKind, SeedSequence, SeededRng, TREE_SEED_INIT, derive_tree_seeds};
pub use split::SplitCriterion;
pub use store::{DatasetKey, ForestStore, ModelKey};
pub use strata::{ClassWeights, StratificationPlan};
pub use task::{BuildTask, GrowTree, TreeContext, TreeSummary};
pub use tree::{DecisionTree, DecisionTreeConfig};
