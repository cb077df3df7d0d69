//! Configuration builder for forest growth jobs.

use crate::error::ForestError;
use crate::seed::RngKind;
use crate::split::SplitCriterion;
use crate::strata::StratificationPlan;

/// Largest accepted histogram bin limit.
pub const MAX_BIN_LIMIT: u32 = i16::MAX as u32;

/// Strategy for determining the number of predictors considered at each split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaxFeatures {
    /// Square root of the predictor count, rounded up.
    Sqrt,
    /// Log base 2 of the predictor count, rounded up.
    Log2,
    /// A fraction of the predictor count (must be in (0.0, 1.0]).
    Fraction(f64),
    /// A fixed count.
    Fixed(usize),
    /// All predictors.
    All,
}

impl MaxFeatures {
    /// Resolve to a concrete count for `n_features` predictors.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidMaxFeatures`] when the result is 0 or
    /// exceeds `n_features`.
    pub fn resolve(self, n_features: usize) -> Result<usize, ForestError> {
        let resolved = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil().max(1.0) as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
            MaxFeatures::Fixed(n) => n,
            MaxFeatures::All => n_features,
        };
        if resolved == 0 || resolved > n_features {
            return Err(ForestError::InvalidMaxFeatures {
                max_features: resolved,
                n_features,
            });
        }
        Ok(resolved)
    }
}

/// How tree tasks are submitted to the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// All trees in one concurrent batch.
    #[default]
    Parallel,
    /// One single-tree batch at a time, in tree-index order.
    Sequential,
}

/// Immutable configuration of one forest growth job.
///
/// Construct via [`ForestConfig::new`], chain `with_*` methods, and let the
/// job call [`ForestConfig::validate`] before any tree is dispatched.
///
/// # Defaults
///
/// | Parameter               | Default                 |
/// |-------------------------|-------------------------|
/// | `max_depth`             | `None`                  |
/// | `min_error_rate`        | 0.0                     |
/// | `criterion`             | `Entropy`               |
/// | `max_features`          | `Sqrt`                  |
/// | `sample_fraction`       | 0.67                    |
/// | `bin_limit`             | 1024                    |
/// | `stratification`        | none                    |
/// | `exclusive_split_limit` | 0 (disabled)            |
/// | `verbosity`             | 0                       |
/// | `seed`                  | `None` (dataset's seed) |
/// | `rng_kind`              | `ChaCha8`               |
/// | `dispatch`              | `Parallel`              |
#[derive(Debug, Clone)]
pub struct ForestConfig {
    pub(crate) n_trees: usize,
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_error_rate: f64,
    pub(crate) criterion: SplitCriterion,
    pub(crate) max_features: MaxFeatures,
    pub(crate) sample_fraction: f64,
    pub(crate) bin_limit: u32,
    pub(crate) stratification: StratificationPlan,
    pub(crate) exclusive_split_limit: usize,
    pub(crate) verbosity: u8,
    pub(crate) seed: Option<u64>,
    pub(crate) rng_kind: RngKind,
    pub(crate) dispatch: DispatchMode,
}

impl ForestConfig {
    /// Create a config for `n_trees` trees. Zero trees is a valid no-op job.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::NegativeTreeCount`] if `n_trees` is negative.
    pub fn new(n_trees: i64) -> Result<Self, ForestError> {
        let n_trees =
            usize::try_from(n_trees).map_err(|_| ForestError::NegativeTreeCount { n_trees })?;
        Ok(Self {
            n_trees,
            max_depth: None,
            min_error_rate: 0.0,
            criterion: SplitCriterion::Entropy,
            max_features: MaxFeatures::Sqrt,
            sample_fraction: 0.67,
            bin_limit: 1024,
            stratification: StratificationPlan::none(),
            exclusive_split_limit: 0,
            verbosity: 0,
            seed: None,
            rng_kind: RngKind::ChaCha8,
            dispatch: DispatchMode::Parallel,
        })
    }

    // --- Setters ---

    /// Set the maximum tree depth. `None` means unlimited.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the node error rate at or below which splitting stops.
    #[must_use]
    pub fn with_min_error_rate(mut self, rate: f64) -> Self {
        self.min_error_rate = rate;
        self
    }

    /// Set the split statistic.
    #[must_use]
    pub fn with_criterion(mut self, criterion: SplitCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set the number of predictors considered per split.
    #[must_use]
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the fraction of rows each tree samples, in (0.0, 1.0].
    #[must_use]
    pub fn with_sample_fraction(mut self, fraction: f64) -> Self {
        self.sample_fraction = fraction;
        self
    }

    /// Set the maximum number of histogram bins per predictor.
    #[must_use]
    pub fn with_bin_limit(mut self, bin_limit: u32) -> Self {
        self.bin_limit = bin_limit;
        self
    }

    /// Set the stratified sampling plan.
    #[must_use]
    pub fn with_stratification(mut self, plan: StratificationPlan) -> Self {
        self.stratification = plan;
        self
    }

    /// Set the exclusive split limit (0 disables exclusive splits).
    #[must_use]
    pub fn with_exclusive_split_limit(mut self, limit: usize) -> Self {
        self.exclusive_split_limit = limit;
        self
    }

    /// Set the verbosity level; 1 and above log every finished tree.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Derive tree seeds from `seed` instead of the training dataset's own
    /// seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the generator algorithm used for seeds and sampling.
    #[must_use]
    pub fn with_rng_kind(mut self, kind: RngKind) -> Self {
        self.rng_kind = kind;
        self
    }

    /// Set how tree tasks are dispatched.
    #[must_use]
    pub fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }

    // --- Getters ---

    /// Return the number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    /// Return the maximum depth limit, if any.
    #[must_use]
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Return the minimum error rate stopping criterion.
    #[must_use]
    pub fn min_error_rate(&self) -> f64 {
        self.min_error_rate
    }

    /// Return the split statistic.
    #[must_use]
    pub fn criterion(&self) -> SplitCriterion {
        self.criterion
    }

    /// Return the max features strategy.
    #[must_use]
    pub fn max_features(&self) -> MaxFeatures {
        self.max_features
    }

    /// Return the row sample fraction.
    #[must_use]
    pub fn sample_fraction(&self) -> f64 {
        self.sample_fraction
    }

    /// Return the histogram bin limit.
    #[must_use]
    pub fn bin_limit(&self) -> u32 {
        self.bin_limit
    }

    /// Return the stratified sampling plan.
    #[must_use]
    pub fn stratification(&self) -> &StratificationPlan {
        &self.stratification
    }

    /// Return the exclusive split limit.
    #[must_use]
    pub fn exclusive_split_limit(&self) -> usize {
        self.exclusive_split_limit
    }

    /// Return the verbosity level.
    #[must_use]
    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    /// Return the root seed override, if any.
    #[must_use]
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Return the generator algorithm.
    #[must_use]
    pub fn rng_kind(&self) -> RngKind {
        self.rng_kind
    }

    /// Return the dispatch mode.
    #[must_use]
    pub fn dispatch(&self) -> DispatchMode {
        self.dispatch
    }

    /// Check every range constraint that does not depend on the dataset.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::InvalidMaxDepth`] | `max_depth` is `Some(0)` |
    /// | [`ForestError::InvalidMinErrorRate`] | rate outside [0.0, 1.0) |
    /// | [`ForestError::InvalidSampleFraction`] | fraction outside (0.0, 1.0] |
    /// | [`ForestError::InvalidBinLimit`] | bin limit outside [1, 32767] |
    pub fn validate(&self) -> Result<(), ForestError> {
        if self.max_depth == Some(0) {
            return Err(ForestError::InvalidMaxDepth { max_depth: 0 });
        }
        if !(0.0..1.0).contains(&self.min_error_rate) {
            return Err(ForestError::InvalidMinErrorRate {
                rate: self.min_error_rate,
            });
        }
        if !(self.sample_fraction > 0.0 && self.sample_fraction <= 1.0) {
            return Err(ForestError::InvalidSampleFraction {
                fraction: self.sample_fraction,
            });
        }
        if self.bin_limit == 0 || self.bin_limit > MAX_BIN_LIMIT {
            return Err(ForestError::InvalidBinLimit {
                bin_limit: self.bin_limit,
            });
        }
        Ok(())
    }
}
