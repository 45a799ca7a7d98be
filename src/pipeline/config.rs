//! Pipeline configuration for the curator.
//!
//! This module provides the per-deployment settings of the pipeline:
//! collaborator timeouts, registry persistence, the baseline reference
//! measurements, formulary weights and the gate's default thresholds.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::formulary::{
    CostFactor, CostWeights, EvidenceWeights, GainWeights, Measurements, ZeroCostPolicy,
};
use crate::gate::{DEFAULT_MIN_LINK_CONFIDENCE, DEFAULT_MIN_ROI};

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the curator.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Execution settings
    /// Upper bound on every external collaborator call.
    pub stage_timeout: Duration,

    // Storage settings
    /// Directory holding `registry.json`; in-memory only when unset.
    pub registry_path: Option<PathBuf>,

    // Formulary settings
    /// Pre-change reference measurements.
    pub baseline: Measurements,
    /// Weights of the cost factors.
    pub cost_weights: CostWeights,
    /// Estimated compute hours per training epoch.
    pub hours_per_epoch: f64,
    /// Signed weights of the measured dimensions.
    pub gain_weights: GainWeights,
    /// Credibility weights of the evidence kinds.
    pub evidence_weights: EvidenceWeights,
    /// Behaviour of ROI at zero cost.
    pub zero_cost: ZeroCostPolicy,

    // Gate settings
    /// `minRoi` used when a request omits it.
    pub default_min_roi: f64,
    /// `minLinkConfidence` used when a request omits it.
    pub default_min_link_confidence: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(1800), // 30 minutes

            registry_path: None,

            baseline: [("accuracy".to_string(), 0.90), ("tps".to_string(), 40.0)]
                .into_iter()
                .collect(),
            cost_weights: CostWeights::default(),
            hours_per_epoch: 2.0,
            gain_weights: GainWeights::default(),
            evidence_weights: EvidenceWeights::default(),
            zero_cost: ZeroCostPolicy::Reject,

            default_min_roi: DEFAULT_MIN_ROI,
            default_min_link_confidence: DEFAULT_MIN_LINK_CONFIDENCE,
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `CURATOR_STAGE_TIMEOUT_SECS`: Collaborator timeout in seconds (default: 1800)
    /// - `CURATOR_REGISTRY_PATH`: Registry directory (default: in-memory only)
    /// - `CURATOR_BASELINE`: Baseline as `dim=value,...` (default: accuracy=0.90,tps=40.0)
    /// - `CURATOR_COST_WEIGHTS`: `compute_hours=..,dataset_mb=..,model_params_b=..`
    /// - `CURATOR_HOURS_PER_EPOCH`: Compute hours per epoch (default: 2.0)
    /// - `CURATOR_ALLOW_UNBOUNDED_ROI`: Zero cost yields unbounded ROI (default: false)
    /// - `CURATOR_DEFAULT_MIN_ROI`: Default `minRoi` (default: 0.0)
    /// - `CURATOR_DEFAULT_MIN_LINK_CONFIDENCE`: Default `minLinkConfidence` (default: 0.75)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if variables have invalid values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("CURATOR_STAGE_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "CURATOR_STAGE_TIMEOUT_SECS")?;
            config.stage_timeout = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("CURATOR_REGISTRY_PATH") {
            if !val.trim().is_empty() {
                config.registry_path = Some(PathBuf::from(val));
            }
        }

        if let Some(val) = lookup("CURATOR_BASELINE") {
            config.baseline = parse_measurements(&val, "CURATOR_BASELINE")?;
        }

        if let Some(val) = lookup("CURATOR_COST_WEIGHTS") {
            config.cost_weights =
                parse_cost_weights(&val, config.cost_weights, "CURATOR_COST_WEIGHTS")?;
        }

        if let Some(val) = lookup("CURATOR_HOURS_PER_EPOCH") {
            config.hours_per_epoch = parse_env_value(&val, "CURATOR_HOURS_PER_EPOCH")?;
        }

        if let Some(val) = lookup("CURATOR_ALLOW_UNBOUNDED_ROI") {
            config.zero_cost = if parse_env_bool(&val, "CURATOR_ALLOW_UNBOUNDED_ROI")? {
                ZeroCostPolicy::Unbounded
            } else {
                ZeroCostPolicy::Reject
            };
        }

        if let Some(val) = lookup("CURATOR_DEFAULT_MIN_ROI") {
            config.default_min_roi = parse_env_value(&val, "CURATOR_DEFAULT_MIN_ROI")?;
        }

        if let Some(val) = lookup("CURATOR_DEFAULT_MIN_LINK_CONFIDENCE") {
            config.default_min_link_confidence =
                parse_env_value(&val, "CURATOR_DEFAULT_MIN_LINK_CONFIDENCE")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stage_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "stage_timeout must be greater than 0".to_string(),
            ));
        }

        if let Some((dim, value)) = self.baseline.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ConfigError::ValidationFailed(format!(
                "baseline value for '{}' must be finite, got {}",
                dim, value
            )));
        }

        for factor in [
            CostFactor::ComputeHours,
            CostFactor::DatasetMb,
            CostFactor::ModelParamsBillions,
        ] {
            let weight = self.cost_weights.weight(factor);
            if !(weight.is_finite() && weight >= 0.0) {
                return Err(ConfigError::ValidationFailed(format!(
                    "cost_weights.{} must be a non-negative number, got {}",
                    factor, weight
                )));
            }
        }

        if !(self.hours_per_epoch.is_finite() && self.hours_per_epoch > 0.0) {
            return Err(ConfigError::ValidationFailed(
                "hours_per_epoch must be greater than 0".to_string(),
            ));
        }

        if let Some((dim, weight)) = self.gain_weights.iter().find(|(_, w)| !w.is_finite()) {
            return Err(ConfigError::ValidationFailed(format!(
                "gain weight for '{}' must be finite, got {}",
                dim, weight
            )));
        }

        if self
            .evidence_weights
            .all_weights()
            .any(|w| !(0.0..=1.0).contains(&w))
        {
            return Err(ConfigError::ValidationFailed(
                "evidence_weights must be between 0.0 and 1.0".to_string(),
            ));
        }

        if !self.default_min_roi.is_finite() {
            return Err(ConfigError::ValidationFailed(
                "default_min_roi must be finite".to_string(),
            ));
        }

        if !self.default_min_link_confidence.is_finite() {
            return Err(ConfigError::ValidationFailed(
                "default_min_link_confidence must be finite".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the collaborator timeout.
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Builder method to set the registry directory.
    pub fn with_registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_path = Some(path.into());
        self
    }

    /// Builder method to set the baseline measurements.
    pub fn with_baseline(mut self, baseline: Measurements) -> Self {
        self.baseline = baseline;
        self
    }

    /// Builder method to set cost weights.
    pub fn with_cost_weights(mut self, weights: CostWeights) -> Self {
        self.cost_weights = weights;
        self
    }

    /// Builder method to set hours per epoch.
    pub fn with_hours_per_epoch(mut self, hours: f64) -> Self {
        self.hours_per_epoch = hours;
        self
    }

    /// Builder method to set gain weights.
    pub fn with_gain_weights(mut self, weights: GainWeights) -> Self {
        self.gain_weights = weights;
        self
    }

    /// Builder method to set evidence weights.
    pub fn with_evidence_weights(mut self, weights: EvidenceWeights) -> Self {
        self.evidence_weights = weights;
        self
    }

    /// Builder method to set the zero-cost ROI policy.
    pub fn with_zero_cost(mut self, policy: ZeroCostPolicy) -> Self {
        self.zero_cost = policy;
        self
    }

    /// Builder method to set the default `minRoi`.
    pub fn with_default_min_roi(mut self, threshold: f64) -> Self {
        self.default_min_roi = threshold;
        self
    }

    /// Builder method to set the default `minLinkConfidence`.
    pub fn with_default_min_link_confidence(mut self, threshold: f64) -> Self {
        self.default_min_link_confidence = threshold;
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

/// Parse `name=value,...` pairs.
fn parse_pairs(value: &str, key: &str) -> Result<Vec<(String, f64)>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| -> Result<(String, f64), ConfigError> {
            let (name, number) = pair.split_once('=').ok_or_else(|| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected name=value, got '{}'", pair),
            })?;
            Ok((name.trim().to_string(), parse_env_value(number, key)?))
        })
        .collect()
}

fn parse_measurements(value: &str, key: &str) -> Result<Measurements, ConfigError> {
    Ok(parse_pairs(value, key)?.into_iter().collect())
}

fn parse_cost_weights(
    value: &str,
    mut weights: CostWeights,
    key: &str,
) -> Result<CostWeights, ConfigError> {
    for (name, weight) in parse_pairs(value, key)? {
        let factor: CostFactor = name.parse().map_err(|message| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        })?;
        weights = weights.with_weight(factor, weight);
    }
    Ok(weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.stage_timeout, Duration::from_secs(1800));
        assert!(config.registry_path.is_none());
        assert_eq!(config.baseline.get("accuracy"), Some(&0.90));
        assert_eq!(config.baseline.get("tps"), Some(&40.0));
        assert!((config.hours_per_epoch - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.zero_cost, ZeroCostPolicy::Reject);
        assert!((config.default_min_link_confidence - 0.75).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::new()
            .with_stage_timeout(Duration::from_secs(5))
            .with_registry_path("/tmp/curator")
            .with_hours_per_epoch(0.5)
            .with_zero_cost(ZeroCostPolicy::Unbounded)
            .with_default_min_roi(0.2)
            .with_default_min_link_confidence(0.9);

        assert_eq!(config.stage_timeout, Duration::from_secs(5));
        assert_eq!(config.registry_path, Some(PathBuf::from("/tmp/curator")));
        assert!((config.hours_per_epoch - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.zero_cost, ZeroCostPolicy::Unbounded);
        assert!((config.default_min_roi - 0.2).abs() < f64::EPSILON);
        assert!((config.default_min_link_confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_lookup() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("CURATOR_STAGE_TIMEOUT_SECS", "60"),
            ("CURATOR_REGISTRY_PATH", "/var/lib/curator"),
            ("CURATOR_BASELINE", "accuracy=0.8, latency=120"),
            ("CURATOR_COST_WEIGHTS", "compute_hours=3.5"),
            ("CURATOR_ALLOW_UNBOUNDED_ROI", "yes"),
            ("CURATOR_DEFAULT_MIN_ROI", "0.15"),
        ]))
        .unwrap();

        assert_eq!(config.stage_timeout, Duration::from_secs(60));
        assert_eq!(config.registry_path, Some(PathBuf::from("/var/lib/curator")));
        assert_eq!(config.baseline.len(), 2);
        assert_eq!(config.baseline.get("latency"), Some(&120.0));
        assert_eq!(config.cost_weights.compute_hours, 3.5);
        assert_eq!(config.cost_weights.dataset_mb, 0.1);
        assert_eq!(config.zero_cost, ZeroCostPolicy::Unbounded);
        assert!((config.default_min_roi - 0.15).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_lookup_empty_is_default() {
        let config = PipelineConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.stage_timeout, PipelineConfig::default().stage_timeout);
    }

    #[test]
    fn test_from_lookup_invalid_values() {
        let err = PipelineConfig::from_lookup(lookup(&[("CURATOR_STAGE_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("CURATOR_STAGE_TIMEOUT_SECS"));

        let err = PipelineConfig::from_lookup(lookup(&[("CURATOR_BASELINE", "accuracy")]))
            .unwrap_err();
        assert!(err.to_string().contains("name=value"));

        let err = PipelineConfig::from_lookup(lookup(&[("CURATOR_COST_WEIGHTS", "gpu_watts=1")]))
            .unwrap_err();
        assert!(err.to_string().contains("gpu_watts"));
    }

    #[test]
    fn test_validation_invalid_timeout() {
        let config = PipelineConfig::default().with_stage_timeout(Duration::from_secs(0));
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("stage_timeout"));
    }

    #[test]
    fn test_validation_negative_cost_weight() {
        let config = PipelineConfig::default()
            .with_cost_weights(CostWeights::default().with_weight(CostFactor::DatasetMb, -0.1));
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("dataset_mb"));
    }

    #[test]
    fn test_validation_invalid_hours_per_epoch() {
        let config = PipelineConfig::default().with_hours_per_epoch(0.0);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("hours_per_epoch"));
    }

    #[test]
    fn test_validation_non_finite_baseline() {
        let mut baseline = Measurements::new();
        baseline.insert("accuracy".to_string(), f64::NAN);
        let result = PipelineConfig::default().with_baseline(baseline).validate();
        assert!(result.unwrap_err().to_string().contains("accuracy"));
    }

    #[test]
    fn test_validation_evidence_weight_out_of_range() {
        let weights = EvidenceWeights::default()
            .with_weight(crate::formulary::EvidenceKind::RegexMatch, 1.5);
        let result = PipelineConfig::default().with_evidence_weights(weights).validate();
        assert!(result.unwrap_err().to_string().contains("evidence_weights"));
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("true", "test").unwrap());
        assert!(parse_env_bool("1", "test").unwrap());
        assert!(parse_env_bool("TRUE", "test").unwrap());
        assert!(!parse_env_bool("off", "test").unwrap());
        assert!(parse_env_bool("invalid", "test").is_err());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            key: "KEY".to_string(),
            message: "bad value".to_string(),
        };
        assert!(err.to_string().contains("KEY"));
        assert!(err.to_string().contains("bad value"));

        let err = ConfigError::ValidationFailed("test failure".to_string());
        assert!(err.to_string().contains("test failure"));
    }
}
