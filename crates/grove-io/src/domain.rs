//! Domain types for grove-io.

use std::fmt;

use crate::IoError;

/// A validated experiment name used as the prefix of every output file.
///
/// Must match `[a-zA-Z0-9_-]+`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentName(String);

impl ExperimentName {
    /// Parse and validate an experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InvalidExperimentName`] if the name is empty or
    /// contains characters outside `[a-zA-Z0-9_-]`.
    pub fn new(name: impl Into<String>) -> Result<Self, IoError> {
        let name = name.into();
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(IoError::InvalidExperimentName { name });
        }
        Ok(Self(name))
    }

    /// Return the experiment name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExperimentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_word_characters() {
        let name = ExperimentName::new("iris-run_01").unwrap();
        assert_eq!(name.as_str(), "iris-run_01");
        assert_eq!(name.to_string(), "iris-run_01");
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(
            ExperimentName::new(""),
            Err(IoError::InvalidExperimentName { .. })
        ));
    }

    #[test]
    fn rejects_path_separators() {
        assert!(ExperimentName::new("../escape").is_err());
        assert!(ExperimentName::new("a b").is_err());
    }
}
