//! Scoring formulary.
//!
//! Pure, stateless functions that turn raw measurements into a cost figure
//! and a decision score:
//!
//! - [`compute_cost`]: weighted linear combination of effort factors
//! - [`compute_gain_score`]: weighted relative improvement over a baseline, net of cost (ROI)
//! - [`compute_confidence`]: weighted average of evidence strengths
//!
//! Every function is deterministic: identical inputs always produce identical
//! outputs, and results are rounded to [`SCORE_PRECISION`] decimal places so
//! fixtures compare exactly across runs.

pub mod confidence;
pub mod cost;
pub mod gain;

use std::collections::BTreeMap;

pub use confidence::{
    compute_confidence, Evidence, EvidenceKind, EvidenceWeights, DEFAULT_EVIDENCE_WEIGHT,
};
pub use cost::{compute_cost, CostFactor, CostWeights, EffortParameters, BYTES_PER_MB};
pub use gain::{
    compute_gain_score, compute_gain_score_with, total_gain, GainWeights, Score, ZeroCostPolicy,
};

/// Named dimension to measured value.
///
/// Ordered so that summations over dimensions happen in a fixed order.
pub type Measurements = BTreeMap<String, f64>;

/// Number of decimal places kept by every formulary result.
pub const SCORE_PRECISION: i32 = 4;

/// Rounds to [`SCORE_PRECISION`] decimal places.
pub(crate) fn round_score(value: f64) -> f64 {
    let factor = 10f64.powi(SCORE_PRECISION);
    (value * factor).round() / factor
}
