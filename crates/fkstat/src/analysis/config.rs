//! Analysis configuration.

use super::AnalysisError;
use fkstat_stats::{RegularizationConfig, ScaleVariation};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings of an [`Analysis`](super::Analysis)
///
/// ```yaml
/// prescription: 3pt
/// use_theory_covmat: true
/// regularization:
///   threshold: 500.0
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Scale variation prescription, fixing the number of theories per dataset
    pub prescription: ScaleVariation,

    /// Add the theory covariance to the experimental one in the χ²
    pub use_theory_covmat: bool,

    /// Eigenvalue clipping applied to every total covariance matrix
    pub regularization: Option<RegularizationConfig>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            prescription: ScaleVariation::ThreePoint,
            use_theory_covmat: true,
            regularization: None,
        }
    }
}

impl AnalysisConfig {
    /// Parse a YAML configuration
    pub fn from_yaml_str(text: &str) -> Result<Self, AnalysisError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Parse a JSON configuration
    pub fn from_json_str(text: &str) -> Result<Self, AnalysisError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a configuration file, JSON for `.json` files and YAML otherwise
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AnalysisError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| AnalysisError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_yaml_str(&text),
        }
    }

    /// Builder-style setter for the regularization
    pub const fn with_regularization(mut self, threshold: f64) -> Self {
        self.regularization = Some(RegularizationConfig { threshold });
        self
    }

    /// Builder-style setter for the prescription
    pub const fn with_prescription(mut self, prescription: ScaleVariation) -> Self {
        self.prescription = prescription;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default() {
        let config = AnalysisConfig::default();
        assert_eq!(config.prescription, ScaleVariation::ThreePoint);
        assert!(config.use_theory_covmat);
        assert!(config.regularization.is_none());
    }

    #[test]
    fn test_yaml() {
        let config = AnalysisConfig::from_yaml_str(
            "prescription: 7pt\nregularization:\n  threshold: 100.0\n",
        )
        .unwrap();
        assert_eq!(config.prescription, ScaleVariation::SevenPoint);
        assert_eq!(config.regularization.map(|r| r.threshold), Some(100.0));
        assert!(config.use_theory_covmat);
    }

    #[test]
    fn test_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.json");
        std::fs::write(&path, r#"{"use_theory_covmat": false}"#).unwrap();
        let config = AnalysisConfig::load(&path).unwrap();
        assert!(!config.use_theory_covmat);
        assert_eq!(config.prescription, ScaleVariation::ThreePoint);
    }

    #[rstest]
    #[case("prescription: 3pt\n", ScaleVariation::ThreePoint)]
    #[case("prescription: 7pt\n", ScaleVariation::SevenPoint)]
    #[case("use_theory_covmat: true\n", ScaleVariation::ThreePoint)]
    fn test_prescription(#[case] yaml: &str, #[case] expected: ScaleVariation) {
        let config = AnalysisConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.prescription, expected);
    }

    #[test]
    fn test_bad_prescription() {
        assert!(AnalysisConfig::from_yaml_str("prescription: 5pt\n").is_err());
    }
}
