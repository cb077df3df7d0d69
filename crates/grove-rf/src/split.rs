//! Histogram split search over weighted class counts.
//!
//! Every predictor is binned once per job (at most `bin_limit` quantile bins).
//! A node scans the bins of `max_features` randomly chosen predictors and
//! keeps the split with the largest weighted impurity decrease. When a
//! predictor occupies few enough bins in the node, single-bin "exclusive"
//! splits are scored as well.

use std::str::FromStr;

use rand::Rng;

use crate::error::ForestError;
use crate::node::{FeatureIndex, Impurity, SplitTest};

/// Criterion for measuring the quality of a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum SplitCriterion {
    /// Gini impurity: 1 - Σ(p_i²)
    Gini,
    /// Information entropy: -Σ(p_i · ln(p_i))
    #[default]
    Entropy,
}

impl SplitCriterion {
    /// Compute the impurity of a node from its (possibly weighted) class counts.
    ///
    /// Returns zero impurity when the total weight is zero.
    #[must_use]
    pub fn impurity(&self, class_weights: &[f64]) -> Impurity {
        let total: f64 = class_weights.iter().sum();
        if total <= 0.0 {
            return Impurity::new(0.0);
        }
        let value = match self {
            SplitCriterion::Gini => {
                let sum_sq: f64 = class_weights
                    .iter()
                    .map(|&c| {
                        let p = c / total;
                        p * p
                    })
                    .sum();
                1.0 - sum_sq
            }
            SplitCriterion::Entropy => -class_weights
                .iter()
                .filter(|&&c| c > 0.0)
                .map(|&c| {
                    let p = c / total;
                    p * p.ln()
                })
                .sum::<f64>(),
        };
        Impurity::new(value.max(0.0))
    }
}

impl FromStr for SplitCriterion {
    type Err = ForestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gini" => Ok(SplitCriterion::Gini),
            "entropy" => Ok(SplitCriterion::Entropy),
            _ => Err(ForestError::UnknownStatistic {
                name: s.to_string(),
            }),
        }
    }
}

/// Pre-computed quantile bin edges for all predictors.
#[derive(Debug, Clone)]
pub(crate) struct FeatureBins {
    /// Bin edges per feature. Values <= edges[0] go into bin 0, values in
    /// (edges[i-1], edges[i]] go into bin i.
    edges: Vec<Vec<f64>>,
}

impl FeatureBins {
    /// Build quantile-based bin edges from column-major features.
    ///
    /// Features with all identical values get zero edges (treated as constant).
    pub(crate) fn build(col_features: &[Vec<f64>], n_bins: usize) -> Self {
        let n_bins = n_bins.max(1);
        let edges = col_features
            .iter()
            .map(|col| {
                if col.is_empty() {
                    return Vec::new();
                }

                let mut sorted = col.clone();
                sorted.sort_unstable_by(|a, b| a.total_cmp(b));
                let n = sorted.len();

                if sorted[0] == sorted[n - 1] {
                    return Vec::new();
                }

                let mut raw_edges: Vec<f64> = (1..n_bins)
                    .map(|k| {
                        let pos = (k as f64 / n_bins as f64) * (n - 1) as f64;
                        let lo = pos.floor() as usize;
                        let hi = (lo + 1).min(n - 1);
                        let frac = pos - lo as f64;
                        sorted[lo] + frac * (sorted[hi] - sorted[lo])
                    })
                    .collect();

                raw_edges.dedup_by(|a, b| *a == *b);
                // Edges at the extremes would leave one side empty.
                raw_edges.retain(|&e| e > sorted[0] && e < sorted[n - 1]);
                raw_edges
            })
            .collect();

        Self { edges }
    }

    /// Return the bin index of `value` for a feature, in `[0, edges.len()]`.
    pub(crate) fn bin_index(&self, feat_idx: usize, value: f64) -> usize {
        self.edges[feat_idx].partition_point(|&e| e < value)
    }

    /// Return the number of bins for a feature, or 0 if the feature is constant.
    pub(crate) fn n_bins_for_feature(&self, feat_idx: usize) -> usize {
        let n_edges = self.edges[feat_idx].len();
        if n_edges == 0 { 0 } else { n_edges + 1 }
    }

    /// Test sending bins `0..=bin` left.
    fn at_most(&self, feat_idx: usize, bin: usize) -> SplitTest {
        SplitTest::AtMost(self.edges[feat_idx][bin])
    }

    /// Test sending exactly `bin` left.
    fn within(&self, feat_idx: usize, bin: usize) -> SplitTest {
        let edges = &self.edges[feat_idx];
        let lower = if bin == 0 { f64::NEG_INFINITY } else { edges[bin - 1] };
        let upper = edges.get(bin).copied().unwrap_or(f64::INFINITY);
        SplitTest::Within { lower, upper }
    }
}

/// Inputs shared by every split search within one tree.
pub(crate) struct SplitContext<'a> {
    pub(crate) features: &'a [Vec<f64>],
    pub(crate) labels: &'a [usize],
    pub(crate) class_weights: &'a [f64],
    pub(crate) n_classes: usize,
    pub(crate) criterion: SplitCriterion,
    pub(crate) bins: &'a FeatureBins,
    pub(crate) max_features: usize,
    pub(crate) exclusive_split_limit: usize,
}

/// Result of finding the best split for a node.
#[derive(Debug, Clone)]
pub(crate) struct SplitResult {
    pub(crate) feature: FeatureIndex,
    pub(crate) test: SplitTest,
    pub(crate) left_rows: Vec<usize>,
    pub(crate) right_rows: Vec<usize>,
}

/// Weighted class counts of `rows`.
pub(crate) fn weighted_counts(ctx: &SplitContext<'_>, rows: &[usize]) -> Vec<f64> {
    let mut counts = vec![0.0f64; ctx.n_classes];
    for &row in rows {
        let class = ctx.labels[row];
        counts[class] += ctx.class_weights[class];
    }
    counts
}

/// Find the best split of `rows` among a random subset of predictors.
///
/// Returns `None` when no split separates the rows (all candidate
/// predictors constant within the node).
pub(crate) fn find_split(
    ctx: &SplitContext<'_>,
    rows: &[usize],
    rng: &mut impl Rng,
) -> Option<SplitResult> {
    let n_features = ctx.features.len();
    if rows.len() < 2 || n_features == 0 {
        return None;
    }

    let parent_counts = weighted_counts(ctx, rows);
    let parent_total: f64 = parent_counts.iter().sum();
    let parent_impurity = ctx.criterion.impurity(&parent_counts).value();

    // Partial Fisher-Yates: shuffle only the first `take` positions.
    let mut feature_order: Vec<usize> = (0..n_features).collect();
    let take = ctx.max_features.min(n_features);
    for i in 0..take {
        let j = rng.gen_range(i..n_features);
        feature_order.swap(i, j);
    }

    let mut best_decrease = f64::NEG_INFINITY;
    let mut best: Option<(usize, SplitTest)> = None;

    for &feat_idx in &feature_order[..take] {
        let n_bins = ctx.bins.n_bins_for_feature(feat_idx);
        if n_bins == 0 {
            continue;
        }

        // bin_counts[bin][class], plus raw row counts per bin.
        let mut bin_counts = vec![vec![0.0f64; ctx.n_classes]; n_bins];
        let mut bin_rows = vec![0usize; n_bins];
        let column = &ctx.features[feat_idx];
        for &row in rows {
            let bin = ctx.bins.bin_index(feat_idx, column[row]).min(n_bins - 1);
            let class = ctx.labels[row];
            bin_counts[bin][class] += ctx.class_weights[class];
            bin_rows[bin] += 1;
        }

        let score = |left: &[f64], n_left: usize| -> Option<f64> {
            let n_right = rows.len() - n_left;
            if n_left == 0 || n_right == 0 {
                return None;
            }
            let right: Vec<f64> = parent_counts
                .iter()
                .zip(left)
                .map(|(p, l)| (p - l).max(0.0))
                .collect();
            let left_total: f64 = left.iter().sum();
            let right_total: f64 = right.iter().sum();
            Some(
                parent_total * parent_impurity
                    - left_total * ctx.criterion.impurity(left).value()
                    - right_total * ctx.criterion.impurity(&right).value(),
            )
        };

        // Ordered splits: bins [0..=b] left.
        let mut left = vec![0.0f64; ctx.n_classes];
        let mut n_left = 0usize;
        for bin in 0..n_bins - 1 {
            n_left += bin_rows[bin];
            for (acc, &c) in left.iter_mut().zip(&bin_counts[bin]) {
                *acc += c;
            }
            if let Some(decrease) = score(&left, n_left)
                && decrease > best_decrease
            {
                best_decrease = decrease;
                best = Some((feat_idx, ctx.bins.at_most(feat_idx, bin)));
            }
        }

        // Exclusive splits: a single occupied bin against the rest.
        let occupied = bin_rows.iter().filter(|&&n| n > 0).count();
        if ctx.exclusive_split_limit > 0 && occupied > 1 && occupied <= ctx.exclusive_split_limit {
            for bin in (0..n_bins).filter(|&b| bin_rows[b] > 0) {
                if let Some(decrease) = score(&bin_counts[bin], bin_rows[bin])
                    && decrease > best_decrease
                {
                    best_decrease = decrease;
                    best = Some((feat_idx, ctx.bins.within(feat_idx, bin)));
                }
            }
        }
    }

    let (feat_idx, test) = best?;
    let column = &ctx.features[feat_idx];
    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
        rows.iter().copied().partition(|&row| test.goes_left(column[row]));
    if left_rows.is_empty() || right_rows.is_empty() {
        return None;
    }

    Some(SplitResult {
        feature: FeatureIndex::new(feat_idx),
        test,
        left_rows,
        right_rows,
    })
}
