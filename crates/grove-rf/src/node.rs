use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! arena_index {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(usize);

        impl $name {
            pub(crate) fn new(index: usize) -> Self {
                Self(index)
            }

            /// Zero-based position.
            #[must_use]
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "#{}", self.0)
            }
        }
    };
}

arena_index! {
    /// Position among a forest's predictor columns, not a raw dataset column.
    ///
    /// See [`ColumnSet::predictors`](crate::ColumnSet::predictors).
    FeatureIndex
}

arena_index! {
    /// Slot of a node in its tree's arena.
    NodeIndex
}

/// Weighted class impurity of the rows reaching a node, under the forest's
/// [`SplitCriterion`](crate::SplitCriterion).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Impurity(f64);

impl Impurity {
    pub(crate) fn new(value: f64) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Impurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

/// The test a split node applies to one feature value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SplitTest {
    /// `value <= threshold` goes left.
    AtMost(f64),
    /// `lower < value <= upper` goes left; everything else goes right.
    ///
    /// Produced by exclusive splits, which isolate a single histogram bin.
    Within {
        /// Exclusive lower bound.
        lower: f64,
        /// Inclusive upper bound.
        upper: f64,
    },
}

impl SplitTest {
    /// Return `true` when `value` is routed to the left child.
    #[must_use]
    pub fn goes_left(self, value: f64) -> bool {
        match self {
            SplitTest::AtMost(threshold) => value <= threshold,
            SplitTest::Within { lower, upper } => value > lower && value <= upper,
        }
    }
}

/// A node in a decision tree arena.
///
/// Children are referenced by [`NodeIndex`] into the owning tree's node vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// An interior node that routes rows to one of two children.
    Split {
        /// Predictor the test reads.
        feature: FeatureIndex,
        /// Routing test.
        test: SplitTest,
        /// Left child.
        left: NodeIndex,
        /// Right child.
        right: NodeIndex,
        /// Impurity at this node before splitting.
        impurity: Impurity,
        /// Number of training rows that reached this node.
        n_samples: usize,
    },
    /// A terminal leaf node.
    Leaf {
        /// Predicted class (argmax of the weighted class distribution).
        prediction: usize,
        /// Normalized weighted class distribution.
        distribution: Vec<f64>,
        /// Impurity at this leaf.
        impurity: Impurity,
        /// Number of training rows in this leaf.
        n_samples: usize,
    },
}

impl Node {
    /// Return the impurity at this node (before splitting for interior nodes).
    #[must_use]
    pub fn impurity(&self) -> Impurity {
        match self {
            Node::Split { impurity, .. } | Node::Leaf { impurity, .. } => *impurity,
        }
    }

    /// Return the number of training rows that reached this node.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        match self {
            Node::Split { n_samples, .. } | Node::Leaf { n_samples, .. } => *n_samples,
        }
    }

    /// Return `true` if this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }
}
