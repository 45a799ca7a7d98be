//! Relation extraction.
//!
//! Scans a source document for identifiers of other entities and proposes one
//! [`CandidateLink`] per relation found, each carrying the evidence that
//! supports it. Extraction is synchronous pattern matching; confidence and
//! gating happen in the orchestrator.
//!
//! Rules:
//! - a code commit that mentions fixing, closing or resolving links `FIXES`
//!   to every vulnerability id it names
//! - a patch proposal links `BASED_ON` to every vulnerability id it names
//! - any document links `REFERENCES` to every id of a different entity type

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RegistryError;
use crate::formulary::{Evidence, Score};
use crate::gate::GateDecision;
use crate::manifest::{EntityType, SourceDocument};

/// Default identifier patterns and the entity type each one names.
const DEFAULT_ID_PATTERNS: &[(&str, EntityType)] = &[
    (r"(?i)\bvuln-[a-f0-9]{8}\b", EntityType::Vulnerability),
    (r"(?i)\bcommit-[a-f0-9]{7,12}\b", EntityType::CodeCommit),
    (r"(?i)\bpatch-[a-f0-9]{8}\b", EntityType::PatchProposal),
];

/// Words marking a commit as a fix, with their inflections and compounds.
/// "prefix" and similar words that merely end in "fix" do not count.
const FIX_KEYWORDS: &str =
    r"(?i)\b((hot|bug|quick)?fix(es|ed|ing)?|clos(e|es|ed|ing)|resolv(e|es|ed|ing))\b";

const FIX_REGEX_STRENGTH: f64 = 1.0;
const FIX_KEYWORD_STRENGTH: f64 = 0.8;
const BASED_ON_REGEX_STRENGTH: f64 = 1.0;
const REFERENCE_REGEX_STRENGTH: f64 = 0.7;

/// Kind of relation between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    Fixes,
    BasedOn,
    References,
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelationType::Fixes => write!(f, "FIXES"),
            RelationType::BasedOn => write!(f, "BASED_ON"),
            RelationType::References => write!(f, "REFERENCES"),
        }
    }
}

/// State of a candidate link: `Created -> Accepted | Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Created,
    Accepted,
    Rejected,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Created => write!(f, "created"),
            LinkState::Accepted => write!(f, "accepted"),
            LinkState::Rejected => write!(f, "rejected"),
        }
    }
}

/// A proposed relation awaiting the gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateLink {
    pub id: Uuid,
    /// Source document id.
    pub subject: String,
    pub subject_type: EntityType,
    pub relation: RelationType,
    pub object: String,
    pub object_type: EntityType,
    pub evidence: Vec<Evidence>,
    pub created_at: DateTime<Utc>,
    state: LinkState,
    confidence: Option<f64>,
    gate: Option<GateDecision>,
}

impl CandidateLink {
    pub fn new(
        document: &SourceDocument,
        relation: RelationType,
        object: impl Into<String>,
        object_type: EntityType,
        evidence: Vec<Evidence>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject: document.doc_id.clone(),
            subject_type: document.entity_type,
            relation,
            object: object.into(),
            object_type,
            evidence,
            created_at: Utc::now(),
            state: LinkState::Created,
            confidence: None,
            gate: None,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn confidence(&self) -> Option<f64> {
        self.confidence
    }

    pub fn gate(&self) -> Option<&GateDecision> {
        self.gate.as_ref()
    }

    /// Applies a gate decision: `Created -> Accepted | Rejected`.
    ///
    /// The decision score must be finite; it becomes the link's confidence.
    pub fn apply_gate(&mut self, decision: GateDecision) -> Result<LinkState, RegistryError> {
        let target = if decision.passed {
            LinkState::Accepted
        } else {
            LinkState::Rejected
        };

        if self.state != LinkState::Created {
            return Err(RegistryError::InvalidTransition {
                from: self.state.to_string(),
                to: target.to_string(),
                reason: "link has already been gated".to_string(),
            });
        }

        let confidence = match decision.score {
            Score::Finite(value) => value,
            Score::Unbounded => {
                return Err(RegistryError::RequirementsNotMet(
                    "link confidence must be finite".to_string(),
                ))
            }
        };

        self.confidence = Some(confidence);
        self.gate = Some(decision);
        self.state = target;
        Ok(target)
    }
}

/// Pattern-based relation extractor.
#[derive(Debug, Clone)]
pub struct RelationExtractor {
    id_patterns: Vec<(Regex, EntityType)>,
    fix_keywords: Option<Regex>,
}

impl Default for RelationExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl RelationExtractor {
    /// Extractor with the default identifier patterns.
    pub fn new() -> Self {
        let id_patterns = DEFAULT_ID_PATTERNS
            .iter()
            .filter_map(|(pattern, entity_type)| {
                Regex::new(pattern).ok().map(|regex| (regex, *entity_type))
            })
            .collect();

        Self {
            id_patterns,
            fix_keywords: Regex::new(FIX_KEYWORDS).ok(),
        }
    }

    /// Adds an identifier pattern for an entity type.
    pub fn with_pattern(mut self, pattern: &str, entity_type: EntityType) -> Result<Self, regex::Error> {
        self.id_patterns.push((Regex::new(pattern)?, entity_type));
        Ok(self)
    }

    /// Every identifier in `content`, with its entity type, in order of appearance.
    pub fn find_ids(&self, content: &str) -> Vec<(String, EntityType)> {
        let mut found: Vec<(usize, String, EntityType)> = Vec::new();
        let mut seen = HashSet::new();

        for (regex, entity_type) in &self.id_patterns {
            for m in regex.find_iter(content) {
                let id = m.as_str().to_ascii_lowercase();
                if seen.insert(id.clone()) {
                    found.push((m.start(), id, *entity_type));
                }
            }
        }

        found.sort_by_key(|(start, _, _)| *start);
        found.into_iter().map(|(_, id, t)| (id, t)).collect()
    }

    fn mentions_fix(&self, content: &str) -> bool {
        self.fix_keywords
            .as_ref()
            .map(|regex| regex.is_match(content))
            .unwrap_or(false)
    }

    /// Proposes candidate links for a document.
    pub fn extract(&self, document: &SourceDocument) -> Vec<CandidateLink> {
        let self_id = document.doc_id.to_ascii_lowercase();
        let ids: Vec<(String, EntityType)> = self
            .find_ids(&document.content)
            .into_iter()
            .filter(|(id, _)| *id != self_id)
            .collect();

        let vulnerabilities = ids
            .iter()
            .filter(|(_, entity_type)| *entity_type == EntityType::Vulnerability);

        let mut links = Vec::new();

        match document.entity_type {
            EntityType::CodeCommit if self.mentions_fix(&document.content) => {
                for (id, entity_type) in vulnerabilities {
                    links.push(CandidateLink::new(
                        document,
                        RelationType::Fixes,
                        id.clone(),
                        *entity_type,
                        vec![
                            Evidence::regex(FIX_REGEX_STRENGTH),
                            Evidence::keyword(FIX_KEYWORD_STRENGTH),
                        ],
                    ));
                }
            }
            EntityType::PatchProposal => {
                for (id, entity_type) in vulnerabilities {
                    links.push(CandidateLink::new(
                        document,
                        RelationType::BasedOn,
                        id.clone(),
                        *entity_type,
                        vec![Evidence::regex(BASED_ON_REGEX_STRENGTH)],
                    ));
                }
            }
            _ => {}
        }

        for (id, entity_type) in &ids {
            if *entity_type == document.entity_type {
                continue;
            }
            links.push(CandidateLink::new(
                document,
                RelationType::References,
                id.clone(),
                *entity_type,
                vec![Evidence::regex(REFERENCE_REGEX_STRENGTH)],
            ));
        }

        tracing::debug!(
            doc_id = %document.doc_id,
            ids = ids.len(),
            candidates = links.len(),
            "Extracted candidate links"
        );

        links
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{PolicyGate, MIN_LINK_CONFIDENCE};
    use crate::manifest::PolicyBlock;

    fn commit(content: &str) -> SourceDocument {
        SourceDocument::new("commit-f0e1d2c", EntityType::CodeCommit, content)
    }

    #[test]
    fn test_find_ids_in_order() {
        let extractor = RelationExtractor::new();
        let ids = extractor.find_ids("See PATCH-0a1b2c3d then vuln-a1b2c3d4 and vuln-a1b2c3d4 again");

        assert_eq!(
            ids,
            vec![
                ("patch-0a1b2c3d".to_string(), EntityType::PatchProposal),
                ("vuln-a1b2c3d4".to_string(), EntityType::Vulnerability),
            ]
        );
    }

    #[test]
    fn test_ids_must_be_word_bounded() {
        let extractor = RelationExtractor::new();
        assert!(extractor.find_ids("xvuln-a1b2c3d4").is_empty());
        assert!(extractor.find_ids("vuln-a1b2c3d4ff").is_empty());
        assert!(extractor.find_ids("vuln-zzzzzzzz").is_empty());
    }

    #[test]
    fn test_fixing_commit_links_vulnerability() {
        let extractor = RelationExtractor::new();
        let links = extractor.extract(&commit("Fixes vuln-a1b2c3d4 by bounding the buffer"));

        let fixes: Vec<_> = links
            .iter()
            .filter(|l| l.relation == RelationType::Fixes)
            .collect();
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].object, "vuln-a1b2c3d4");
        assert_eq!(fixes[0].subject, "commit-f0e1d2c");
        assert_eq!(
            fixes[0].evidence,
            vec![Evidence::regex(1.0), Evidence::keyword(0.8)]
        );
        assert_eq!(fixes[0].state(), LinkState::Created);

        let references: Vec<_> = links
            .iter()
            .filter(|l| l.relation == RelationType::References)
            .collect();
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].evidence, vec![Evidence::regex(0.7)]);
    }

    #[test]
    fn test_fix_keyword_inflections_and_compounds() {
        let extractor = RelationExtractor::new();
        for text in [
            "Fixing vuln-a1b2c3d4",
            "Fixed vuln-a1b2c3d4",
            "Closing vuln-a1b2c3d4",
            "Closes vuln-a1b2c3d4",
            "Resolving vuln-a1b2c3d4",
            "resolved vuln-a1b2c3d4",
            "Hotfix for vuln-a1b2c3d4",
            "bugfix: vuln-a1b2c3d4",
        ] {
            let links = extractor.extract(&commit(text));
            let fixes = links
                .iter()
                .filter(|l| l.relation == RelationType::Fixes)
                .count();
            assert_eq!(fixes, 1, "expected a FIXES link for {:?}", text);
        }

        for text in ["Update prefix for vuln-a1b2c3d4", "Enclosed vuln-a1b2c3d4"] {
            let links = extractor.extract(&commit(text));
            assert!(
                links.iter().all(|l| l.relation != RelationType::Fixes),
                "unexpected FIXES link for {:?}",
                text
            );
        }
    }

    #[test]
    fn test_commit_without_fix_keyword_only_references() {
        let extractor = RelationExtractor::new();
        let links = extractor.extract(&commit("Mentions vuln-a1b2c3d4 in passing; prefix is fine"));

        assert_eq!(links.len(), 1);
        assert_eq!(links[0].relation, RelationType::References);
    }

    #[test]
    fn test_patch_proposal_based_on() {
        let extractor = RelationExtractor::new();
        let doc = SourceDocument::new(
            "patch-00ff00ff",
            EntityType::PatchProposal,
            "Proposed for vuln-deadbeef, see commit-abcdef1",
        );
        let links = extractor.extract(&doc);

        assert!(links
            .iter()
            .any(|l| l.relation == RelationType::BasedOn && l.object == "vuln-deadbeef"));
        assert!(links
            .iter()
            .any(|l| l.relation == RelationType::References && l.object == "commit-abcdef1"));
    }

    #[test]
    fn test_same_type_and_self_ids_skipped() {
        let extractor = RelationExtractor::new();
        let doc = commit("Reverts commit-f0e1d2c and commit-1234567");
        assert!(extractor.extract(&doc).is_empty());
    }

    #[test]
    fn test_no_ids_no_candidates() {
        let extractor = RelationExtractor::new();
        assert!(extractor.extract(&commit("Fixes a typo")).is_empty());
    }

    #[test]
    fn test_custom_pattern() {
        let extractor = RelationExtractor::new()
            .with_pattern(r"(?i)\bCVE-\d{4}-\d{4,}\b", EntityType::Vulnerability)
            .unwrap();
        let links = extractor.extract(&commit("Resolves CVE-2024-12345"));
        assert!(links.iter().any(|l| l.relation == RelationType::Fixes && l.object == "cve-2024-12345"));

        assert!(RelationExtractor::new().with_pattern("(", EntityType::Document).is_err());
    }

    #[test]
    fn test_link_gate_is_one_shot() {
        let extractor = RelationExtractor::new();
        let mut link = extractor.extract(&commit("Fixes vuln-a1b2c3d4")).remove(0);
        let gate = PolicyGate::min_link_confidence(0.75);
        let policy = PolicyBlock::new().with_threshold(MIN_LINK_CONFIDENCE, 0.8);

        let state = link.apply_gate(gate.evaluate(Score::Finite(0.9231), &policy)).unwrap();
        assert_eq!(state, LinkState::Accepted);
        assert_eq!(link.confidence(), Some(0.9231));

        let again = link.apply_gate(gate.evaluate(Score::Finite(0.1), &policy));
        assert!(matches!(again, Err(RegistryError::InvalidTransition { .. })));
        assert_eq!(link.state(), LinkState::Accepted);
    }
}
