//! Engine configuration
//!
//! Field weights, duplicate threshold and normalizer options. Every
//! configuration is validated before any scoring happens; invalid values
//! are rejected, never clamped.

use crate::constants::{
    DEFAULT_LIMITATIONS_WEIGHT, DEFAULT_RESULTS_WEIGHT, DEFAULT_SIMILARITY_THRESHOLD,
    DEFAULT_TACTIC_WEIGHT, WEIGHT_SUM_TOLERANCE,
};
use crate::error::DedupError;
use crate::models::FieldScores;
use crate::normalize::NormalizerOptions;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-field weights for the combined similarity score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldWeights {
    pub tactic: f64,
    pub results: f64,
    pub limitations: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            tactic: DEFAULT_TACTIC_WEIGHT,
            results: DEFAULT_RESULTS_WEIGHT,
            limitations: DEFAULT_LIMITATIONS_WEIGHT,
        }
    }
}

impl FieldWeights {
    /// Create validated weights
    pub fn new(tactic: f64, results: f64, limitations: f64) -> Result<Self, DedupError> {
        let weights = Self {
            tactic,
            results,
            limitations,
        };
        weights.validate()?;
        Ok(weights)
    }

    /// Sum of the three weights
    pub fn sum(&self) -> f64 {
        self.tactic + self.results + self.limitations
    }

    /// Each weight must be finite and non-negative, and the sum must be 1.0
    /// within [`WEIGHT_SUM_TOLERANCE`].
    pub fn validate(&self) -> Result<(), DedupError> {
        for (name, weight) in [
            ("tactic", self.tactic),
            ("results", self.results),
            ("limitations", self.limitations),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(DedupError::configuration(format!(
                    "{name} weight must be a finite non-negative number, got {weight}"
                )));
            }
        }

        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(DedupError::configuration(format!(
                "field weights must sum to 1.0, got {sum}"
            )));
        }

        Ok(())
    }

    /// Weighted sum of per-field cosine scores, clamped into [0.0, 1.0]
    pub fn combine(&self, scores: &FieldScores) -> f64 {
        let combined = self.tactic * scores.tactic
            + self.results * scores.results
            + self.limitations * scores.limitations;
        combined.clamp(0.0, 1.0)
    }
}

/// Validate a duplicate threshold
pub fn validate_threshold(threshold: f64) -> Result<(), DedupError> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(DedupError::configuration(format!(
            "threshold must be within [0.0, 1.0], got {threshold}"
        )))
    }
}

/// Complete similarity engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub weights: FieldWeights,

    /// Combined score at or above which a candidate counts as a duplicate
    pub threshold: f64,

    pub normalizer: NormalizerOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weights: FieldWeights::default(),
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            normalizer: NormalizerOptions::default(),
        }
    }
}

impl EngineConfig {
    /// Replace the threshold
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Replace the weights
    pub fn with_weights(mut self, weights: FieldWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Replace the normalizer options
    pub fn with_normalizer(mut self, normalizer: NormalizerOptions) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn validate(&self) -> Result<(), DedupError> {
        self.weights.validate()?;
        validate_threshold(self.threshold)
    }

    /// Load a configuration from a JSON file. Missing keys take their
    /// defaults; the result is validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.threshold, 0.8);
        assert_eq!(config.weights.tactic, 0.60);
        assert_eq!(config.weights.results, 0.25);
        assert_eq!(config.weights.limitations, 0.15);
        assert!(!config.normalizer.remove_stop_words);
    }

    #[test]
    fn test_weights_summing_to_point_nine_rejected() {
        let result = FieldWeights::new(0.5, 0.25, 0.15);
        assert!(matches!(result, Err(DedupError::Configuration { .. })));
    }

    #[test]
    fn test_weights_within_tolerance_accepted() {
        assert!(FieldWeights::new(0.6 + 1e-7, 0.25, 0.15).is_ok());
        assert!(FieldWeights::new(0.6 - 1e-7, 0.25, 0.15).is_ok());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let result = FieldWeights::new(1.2, -0.05, -0.15);
        assert!(matches!(result, Err(DedupError::Configuration { .. })));
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(validate_threshold(0.0).is_ok());
        assert!(validate_threshold(1.0).is_ok());
        assert!(validate_threshold(-0.01).is_err());
        assert!(validate_threshold(1.01).is_err());
        assert!(validate_threshold(f64::NAN).is_err());
    }

    #[test]
    fn test_combine() {
        let weights = FieldWeights::default();
        let scores = FieldScores {
            tactic: 1.0,
            results: 0.5,
            limitations: 0.0,
        };
        assert!((weights.combine(&scores) - 0.725).abs() < 1e-12);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"threshold": 0.9}"#).unwrap();
        assert_eq!(config.threshold, 0.9);
        assert_eq!(config.weights, FieldWeights::default());
    }

    #[test]
    fn test_from_file_rejects_bad_weights() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"weights": {"tactic": 0.5, "results": 0.25, "limitations": 0.15}}"#,
        )
        .unwrap();

        let err = EngineConfig::from_file(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DedupError>(),
            Some(DedupError::Configuration { .. })
        ));
    }
}
