//! Per-class sampling ratios and class weights.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::ForestError;

/// Class weights projected to a dense vector ordered by ascending label.
///
/// The label set is exactly the set named in the weights text; labels that
/// were not named weigh 1.0 when looked up through [`ClassWeights::weight_of`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClassWeights {
    labels: Vec<usize>,
    weights: Vec<f64>,
}

impl ClassWeights {
    fn from_map(map: &BTreeMap<usize, f64>) -> Self {
        Self {
            labels: map.keys().copied().collect(),
            weights: map.values().copied().collect(),
        }
    }

    /// Return the class labels in ascending order.
    #[must_use]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Return the dense weight vector, aligned with [`ClassWeights::labels`].
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.weights
    }

    /// Return the weight of `label`, or 1.0 when the label was not named.
    #[must_use]
    pub fn weight_of(&self, label: usize) -> f64 {
        match self.labels.binary_search(&label) {
            Ok(pos) => self.weights[pos],
            Err(_) => 1.0,
        }
    }
}

/// Stratified sampling plan: per-class sampling percentages plus optional
/// class weights.
///
/// Built with [`StratificationPlan::parse`]. [`StratificationPlan::none`] keeps
/// row sampling uniform.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StratificationPlan {
    strata: Option<BTreeMap<usize, u32>>,
    class_weights: Option<ClassWeights>,
}

impl StratificationPlan {
    /// A plan that leaves sampling uniform.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Build a plan from the stratify flag and `label:value,...` texts.
    ///
    /// Stratification is a no-op when `stratify` is false or `strata` is
    /// absent or blank; `weights` is only read when strata are in effect.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::MalformedPair`] | an entry is not `label:value` |
    /// | [`ForestError::InvalidLabel`] | a label is not a non-negative integer |
    /// | [`ForestError::InvalidValue`] | a ratio is not an integer in [0, 100], or a weight is not a finite non-negative number |
    /// | [`ForestError::DuplicateLabel`] | a label appears twice |
    pub fn parse(
        stratify: bool,
        strata: Option<&str>,
        weights: Option<&str>,
    ) -> Result<Self, ForestError> {
        let strata_text = match strata {
            Some(text) if stratify && !text.trim().is_empty() => text,
            _ => return Ok(Self::none()),
        };

        let strata = parse_label_map(strata_text, "strata", |raw| {
            raw.parse::<u32>().ok().filter(|&ratio| ratio <= 100)
        })?;

        let class_weights = match weights {
            Some(text) if !text.trim().is_empty() => {
                let map = parse_label_map(text, "weights", |raw| {
                    raw.parse::<f64>().ok().filter(|w| w.is_finite() && *w >= 0.0)
                })?;
                Some(ClassWeights::from_map(&map))
            }
            _ => None,
        };

        debug!(
            n_strata = strata.len(),
            n_weights = class_weights.as_ref().map(|w| w.labels().len()),
            "stratification plan parsed"
        );

        Ok(Self {
            strata: Some(strata),
            class_weights,
        })
    }

    /// Return `true` when rows are sampled per class.
    #[must_use]
    pub fn is_stratified(&self) -> bool {
        self.strata.is_some()
    }

    /// Return the label → sampling percentage map, if stratified.
    #[must_use]
    pub fn strata(&self) -> Option<&BTreeMap<usize, u32>> {
        self.strata.as_ref()
    }

    /// Return the class weights, if any were given.
    #[must_use]
    pub fn class_weights(&self) -> Option<&ClassWeights> {
        self.class_weights.as_ref()
    }

    /// Sampling probability for a row of class `label`.
    ///
    /// Classes missing from the strata map use `default_fraction`.
    #[must_use]
    pub fn sample_probability(&self, label: usize, default_fraction: f64) -> f64 {
        match self.strata.as_ref().and_then(|s| s.get(&label)) {
            Some(&ratio) => f64::from(ratio) / 100.0,
            None => default_fraction,
        }
    }
}

/// Parse `label:value,label:value,...` into an ordered map.
fn parse_label_map<T>(
    text: &str,
    what: &'static str,
    parse_value: impl Fn(&str) -> Option<T>,
) -> Result<BTreeMap<usize, T>, ForestError> {
    let mut map = BTreeMap::new();
    for entry in text.split(',') {
        let mut parts = entry.split(':');
        let (raw_label, raw_value) = match (parts.next(), parts.next(), parts.next()) {
            (Some(l), Some(v), None) => (l.trim(), v.trim()),
            _ => {
                return Err(ForestError::MalformedPair {
                    what,
                    raw: entry.to_string(),
                });
            }
        };
        let label: usize = raw_label.parse().map_err(|_| ForestError::InvalidLabel {
            what,
            raw: raw_label.to_string(),
        })?;
        let value = parse_value(raw_value).ok_or_else(|| ForestError::InvalidValue {
            what,
            label,
            raw: raw_value.to_string(),
        })?;
        if map.insert(label, value).is_some() {
            return Err(ForestError::DuplicateLabel { what, label });
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strata_text_parses_to_map() {
        let plan = StratificationPlan::parse(true, Some("0:10,1:20,2:70"), None).unwrap();
        let strata = plan.strata().unwrap();
        assert_eq!(strata.len(), 3);
        assert_eq!(strata[&0], 10);
        assert_eq!(strata[&1], 20);
        assert_eq!(strata[&2], 70);
        assert!(plan.class_weights().is_none());
    }

    #[test]
    fn weights_project_to_ascending_vector() {
        let plan = StratificationPlan::parse(true, Some("0:50,1:50"), Some("1:2.0, 0:1.0")).unwrap();
        let weights = plan.class_weights().unwrap();
        assert_eq!(weights.labels(), &[0, 1]);
        assert_eq!(weights.as_slice(), &[1.0, 2.0]);
    }

    #[test]
    fn sparse_weight_labels_keep_only_named_classes() {
        let plan = StratificationPlan::parse(true, Some("0:50"), Some("4:0.5,2:3")).unwrap();
        let weights = plan.class_weights().unwrap();
        assert_eq!(weights.labels(), &[2, 4]);
        assert_eq!(weights.as_slice(), &[3.0, 0.5]);
        assert!((weights.weight_of(4) - 0.5).abs() < f64::EPSILON);
        assert!((weights.weight_of(0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn disabled_stratification_is_noop() {
        let plan = StratificationPlan::parse(false, Some("0:10"), Some("0:1.0")).unwrap();
        assert_eq!(plan, StratificationPlan::none());
        assert!(!plan.is_stratified());
    }

    #[test]
    fn missing_or_blank_strata_is_noop() {
        assert!(!StratificationPlan::parse(true, None, Some("0:1")).unwrap().is_stratified());
        assert!(!StratificationPlan::parse(true, Some(" "), None).unwrap().is_stratified());
    }

    #[test]
    fn sample_probability_falls_back_to_fraction() {
        let plan = StratificationPlan::parse(true, Some("1:20"), None).unwrap();
        assert!((plan.sample_probability(1, 0.67) - 0.2).abs() < 1e-12);
        assert!((plan.sample_probability(0, 0.67) - 0.67).abs() < 1e-12);
    }

    #[test]
    fn malformed_pair_rejected() {
        let err = StratificationPlan::parse(true, Some("0:10,1"), None).unwrap_err();
        assert!(matches!(err, ForestError::MalformedPair { what: "strata", .. }));
        let err = StratificationPlan::parse(true, Some("0:1:2"), None).unwrap_err();
        assert!(matches!(err, ForestError::MalformedPair { .. }));
    }

    #[test]
    fn non_integer_label_rejected() {
        let err = StratificationPlan::parse(true, Some("a:10"), None).unwrap_err();
        assert!(matches!(err, ForestError::InvalidLabel { ref raw, .. } if raw == "a"));
    }

    #[test]
    fn non_numeric_value_rejected() {
        let err = StratificationPlan::parse(true, Some("0:ten"), None).unwrap_err();
        assert!(matches!(err, ForestError::InvalidValue { label: 0, .. }));
        let err = StratificationPlan::parse(true, Some("0:10"), Some("0:heavy")).unwrap_err();
        assert!(matches!(err, ForestError::InvalidValue { what: "weights", .. }));
    }

    #[test]
    fn ratio_above_hundred_rejected() {
        let err = StratificationPlan::parse(true, Some("0:101"), None).unwrap_err();
        assert!(matches!(err, ForestError::InvalidValue { .. }));
    }

    #[test]
    fn negative_weight_rejected() {
        let err = StratificationPlan::parse(true, Some("0:10"), Some("0:-1.0")).unwrap_err();
        assert!(matches!(err, ForestError::InvalidValue { .. }));
    }

    #[test]
    fn duplicate_label_rejected() {
        let err = StratificationPlan::parse(true, Some("0:10,0:20"), None).unwrap_err();
        assert!(matches!(err, ForestError::DuplicateLabel { label: 0, .. }));
        assert!(err.is_configuration());
    }
}
