//! Gain and return-on-investment scoring.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{round_score, Measurements};
use crate::error::FormularyError;

/// Signed weight per measured dimension.
///
/// Dimensions where lower is better carry a negative weight. Dimensions
/// without a weight contribute nothing to the gain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainWeights {
    weights: BTreeMap<String, f64>,
}

impl Default for GainWeights {
    fn default() -> Self {
        Self::empty()
            .with_weight("accuracy", 100.0)
            .with_weight("tps", 10.0)
            .with_weight("tokens_per_second", 10.0)
            .with_weight("latency", -5.0)
            .with_weight("inference_cost", -20.0)
    }
}

impl GainWeights {
    /// Creates a weight table with no dimensions.
    pub fn empty() -> Self {
        Self {
            weights: BTreeMap::new(),
        }
    }

    /// Sets the weight for a dimension.
    pub fn with_weight(mut self, dimension: impl Into<String>, weight: f64) -> Self {
        self.weights.insert(dimension.into(), weight);
        self
    }

    /// Weight for a dimension, zero if unweighted.
    pub fn weight(&self, dimension: &str) -> f64 {
        self.weights.get(dimension).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.weights.iter()
    }
}

/// A decision score.
///
/// `Unbounded` is only ever produced when ROI is requested for a zero cost
/// under [`ZeroCostPolicy::Unbounded`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Score {
    Finite(f64),
    Unbounded,
}

impl Score {
    /// Numeric value for comparisons; `Unbounded` is `+∞`.
    pub fn value(&self) -> f64 {
        match self {
            Score::Finite(v) => *v,
            Score::Unbounded => f64::INFINITY,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(self, Score::Unbounded)
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Score::Finite(v) => write!(f, "{:.4}", v),
            Score::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// What to do when ROI is requested for a zero cost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroCostPolicy {
    /// Fail with [`FormularyError::ZeroCost`].
    #[default]
    Reject,
    /// Return [`Score::Unbounded`].
    Unbounded,
}

/// Sums the weighted relative improvement of every candidate dimension.
///
/// Relative improvement is `(candidate - baseline) / baseline`, or the
/// candidate value itself when the baseline is zero or missing.
pub fn total_gain(
    baseline: &Measurements,
    candidate: &Measurements,
    weights: &GainWeights,
) -> Result<f64, FormularyError> {
    let mut gain = 0.0;

    for (dimension, &value) in candidate {
        ensure_finite(dimension, value)?;
        let base = baseline.get(dimension).copied().unwrap_or(0.0);
        ensure_finite(dimension, base)?;

        let improvement = if base == 0.0 {
            value
        } else {
            (value - base) / base
        };
        let weighted = improvement * weights.weight(dimension);

        tracing::debug!(
            dimension = %dimension,
            baseline = base,
            candidate = value,
            improvement,
            weighted,
            "Dimension gain"
        );

        gain += weighted;
    }

    Ok(gain)
}

/// Computes `(total_gain - cost) / cost`, rounded.
///
/// Fails with [`FormularyError::ZeroCost`] when `cost == 0`.
pub fn compute_gain_score(
    baseline: &Measurements,
    candidate: &Measurements,
    cost: f64,
    weights: &GainWeights,
) -> Result<f64, FormularyError> {
    match compute_gain_score_with(baseline, candidate, cost, weights, ZeroCostPolicy::Reject)? {
        Score::Finite(roi) => Ok(roi),
        Score::Unbounded => Err(FormularyError::ZeroCost),
    }
}

/// Same as [`compute_gain_score`], with an explicit zero-cost policy.
pub fn compute_gain_score_with(
    baseline: &Measurements,
    candidate: &Measurements,
    cost: f64,
    weights: &GainWeights,
    zero_cost: ZeroCostPolicy,
) -> Result<Score, FormularyError> {
    ensure_finite("cost", cost)?;
    if cost < 0.0 {
        return Err(FormularyError::NegativeCost(cost));
    }

    let gain = total_gain(baseline, candidate, weights)?;

    if cost == 0.0 {
        return match zero_cost {
            ZeroCostPolicy::Reject => Err(FormularyError::ZeroCost),
            ZeroCostPolicy::Unbounded => Ok(Score::Unbounded),
        };
    }

    let roi = (gain - cost) / cost;
    ensure_finite("roi", roi)?;

    let roi = round_score(roi);
    tracing::debug!(gain, cost, roi, "Computed ROI");
    Ok(Score::Finite(roi))
}

fn ensure_finite(quantity: &str, value: f64) -> Result<(), FormularyError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(FormularyError::NonFinite {
            quantity: quantity.to_string(),
            value,
        })
    }
}
