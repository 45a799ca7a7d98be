//! Policy gate.
//!
//! A pure threshold predicate: a decision score passes when it is greater than
//! or equal to the named threshold in the request's policy block. When the
//! block does not carry the threshold, the gate's documented default applies.
//! The threshold actually used is kept on the [`GateDecision`] for audit.

use serde::{Deserialize, Serialize};

use crate::formulary::Score;
use crate::manifest::PolicyBlock;

/// Policy key for the fine-tune promotion threshold.
pub const MIN_ROI: &str = "minRoi";

/// Policy key for the link insertion threshold.
pub const MIN_LINK_CONFIDENCE: &str = "minLinkConfidence";

/// Default minimum ROI when the policy block omits it.
pub const DEFAULT_MIN_ROI: f64 = 0.0;

/// Default minimum link confidence when the policy block omits it.
pub const DEFAULT_MIN_LINK_CONFIDENCE: f64 = 0.75;

/// Threshold predicate bound to one named policy key.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyGate {
    threshold_name: String,
    default_threshold: f64,
}

impl PolicyGate {
    pub fn new(threshold_name: impl Into<String>, default_threshold: f64) -> Self {
        Self {
            threshold_name: threshold_name.into(),
            default_threshold,
        }
    }

    /// Gate reading [`MIN_ROI`].
    pub fn min_roi(default_threshold: f64) -> Self {
        Self::new(MIN_ROI, default_threshold)
    }

    /// Gate reading [`MIN_LINK_CONFIDENCE`].
    pub fn min_link_confidence(default_threshold: f64) -> Self {
        Self::new(MIN_LINK_CONFIDENCE, default_threshold)
    }

    pub fn threshold_name(&self) -> &str {
        &self.threshold_name
    }

    pub fn default_threshold(&self) -> f64 {
        self.default_threshold
    }

    /// Resolves the threshold, returning whether the default was used.
    pub fn resolve_threshold(&self, policy: &PolicyBlock) -> (f64, bool) {
        match policy.threshold(&self.threshold_name) {
            Some(value) => (value, false),
            None => (self.default_threshold, true),
        }
    }

    /// Evaluates `score >= threshold`.
    pub fn evaluate(&self, score: Score, policy: &PolicyBlock) -> GateDecision {
        let (threshold, defaulted) = self.resolve_threshold(policy);
        let passed = score.value() >= threshold;

        tracing::debug!(
            threshold_name = %self.threshold_name,
            threshold,
            defaulted,
            score = %score,
            passed,
            "Gate evaluated"
        );

        GateDecision {
            passed,
            score,
            threshold,
            threshold_name: self.threshold_name.clone(),
            defaulted,
        }
    }
}

/// Outcome of one gate evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateDecision {
    pub passed: bool,
    pub score: Score,
    pub threshold: f64,
    pub threshold_name: String,
    /// True when the policy block did not carry the threshold.
    pub defaulted: bool,
}
