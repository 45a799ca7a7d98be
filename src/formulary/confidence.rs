//! Evidence-weighted confidence for candidate links.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::round_score;

/// Credibility weight for evidence kinds missing from the weight table.
pub const DEFAULT_EVIDENCE_WEIGHT: f64 = 0.3;

/// How a piece of evidence was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    RegexMatch,
    KeywordCoOccurrence,
    LlmInference,
}

impl std::fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvidenceKind::RegexMatch => write!(f, "regex_match"),
            EvidenceKind::KeywordCoOccurrence => write!(f, "keyword_co_occurrence"),
            EvidenceKind::LlmInference => write!(f, "llm_inference"),
        }
    }
}

/// A single (kind, strength) evidence item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub kind: EvidenceKind,
    pub strength: f64,
}

impl Evidence {
    pub fn new(kind: EvidenceKind, strength: f64) -> Self {
        Self { kind, strength }
    }

    pub fn regex(strength: f64) -> Self {
        Self::new(EvidenceKind::RegexMatch, strength)
    }

    pub fn keyword(strength: f64) -> Self {
        Self::new(EvidenceKind::KeywordCoOccurrence, strength)
    }
}

/// Credibility weight per evidence kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceWeights {
    weights: BTreeMap<EvidenceKind, f64>,
    fallback: f64,
}

impl Default for EvidenceWeights {
    fn default() -> Self {
        Self::empty()
            .with_weight(EvidenceKind::RegexMatch, 0.8)
            .with_weight(EvidenceKind::KeywordCoOccurrence, 0.5)
            .with_weight(EvidenceKind::LlmInference, 0.9)
    }
}

impl EvidenceWeights {
    /// Weight table where every kind uses [`DEFAULT_EVIDENCE_WEIGHT`].
    pub fn empty() -> Self {
        Self {
            weights: BTreeMap::new(),
            fallback: DEFAULT_EVIDENCE_WEIGHT,
        }
    }

    pub fn with_weight(mut self, kind: EvidenceKind, weight: f64) -> Self {
        self.weights.insert(kind, weight);
        self
    }

    pub fn weight(&self, kind: EvidenceKind) -> f64 {
        self.weights.get(&kind).copied().unwrap_or(self.fallback)
    }

    /// All explicit weights plus the fallback.
    pub fn all_weights(&self) -> impl Iterator<Item = f64> + '_ {
        self.weights.values().copied().chain(std::iter::once(self.fallback))
    }
}

/// Computes `Σ(strength × weight) / Σ(weight)`, rounded.
///
/// Strengths are clamped to `[0, 1]`. Returns 0 for no evidence or when every
/// supplied kind carries zero weight.
pub fn compute_confidence(evidence: &[Evidence], weights: &EvidenceWeights) -> f64 {
    if evidence.is_empty() {
        return 0.0;
    }

    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;

    for item in evidence {
        let weight = weights.weight(item.kind).max(0.0);
        weighted_sum += clamp_strength(item.strength) * weight;
        total_weight += weight;
    }

    if total_weight <= 0.0 {
        return 0.0;
    }

    let confidence = round_score(weighted_sum / total_weight);
    tracing::debug!(items = evidence.len(), confidence, "Computed link confidence");
    confidence
}

fn clamp_strength(strength: f64) -> f64 {
    if strength.is_nan() {
        0.0
    } else {
        strength.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_evidence_is_zero() {
        assert_eq!(compute_confidence(&[], &EvidenceWeights::default()), 0.0);
    }

    #[test]
    fn test_regex_and_keyword_evidence() {
        let evidence = [Evidence::regex(1.0), Evidence::keyword(0.8)];
        let confidence = compute_confidence(&evidence, &EvidenceWeights::default());
        assert!((confidence - 0.9231).abs() < 1e-9);
    }

    #[test]
    fn test_single_full_strength_item_is_one() {
        for kind in [
            EvidenceKind::RegexMatch,
            EvidenceKind::KeywordCoOccurrence,
            EvidenceKind::LlmInference,
        ] {
            let confidence = compute_confidence(&[Evidence::new(kind, 1.0)], &EvidenceWeights::default());
            assert_eq!(confidence, 1.0);
        }
    }

    #[test]
    fn test_confidence_stays_in_unit_interval() {
        let weights = EvidenceWeights::default();
        let samples = [
            vec![Evidence::regex(0.0)],
            vec![Evidence::regex(2.0), Evidence::keyword(-1.0)],
            vec![Evidence::keyword(f64::NAN), Evidence::regex(0.7)],
            vec![Evidence::new(EvidenceKind::LlmInference, 0.33); 5],
        ];

        for evidence in &samples {
            let confidence = compute_confidence(evidence, &weights);
            assert!((0.0..=1.0).contains(&confidence), "{:?} -> {}", evidence, confidence);
        }
    }

    #[test]
    fn test_missing_kind_uses_fallback_weight() {
        let weights = EvidenceWeights::empty().with_weight(EvidenceKind::RegexMatch, 0.9);
        assert_eq!(weights.weight(EvidenceKind::KeywordCoOccurrence), DEFAULT_EVIDENCE_WEIGHT);

        // (1.0 * 0.9 + 0.0 * 0.3) / 1.2
        let confidence = compute_confidence(&[Evidence::regex(1.0), Evidence::keyword(0.0)], &weights);
        assert_eq!(confidence, 0.75);
    }

    #[test]
    fn test_zero_weights_yield_zero() {
        let weights = EvidenceWeights::empty().with_weight(EvidenceKind::RegexMatch, 0.0);
        assert_eq!(compute_confidence(&[Evidence::regex(1.0)], &weights), 0.0);
    }

    #[test]
    fn test_evidence_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&EvidenceKind::KeywordCoOccurrence).unwrap(),
            r#""keyword_co_occurrence""#
        );
        assert_eq!(EvidenceKind::RegexMatch.to_string(), "regex_match");
    }
}
