//! Pipeline reports.
//!
//! A [`Report`] is produced exactly once per request, whatever stage the run
//! reached. Failures are carried as a [`StageFailure`] naming the stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CollaboratorError, FormularyError, RegistryError};
use crate::extraction::{CandidateLink, LinkState, RelationType};
use crate::formulary::Score;
use crate::gate::GateDecision;
use crate::manifest::EntityType;
use crate::registry::LifecycleState;

/// A step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validation,
    PreparingInput,
    Running,
    Costing,
    Benchmarking,
    Scoring,
    Gating,
    Extraction,
    GraphInsert,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validation => "validation",
            Stage::PreparingInput => "preparing_input",
            Stage::Running => "running",
            Stage::Costing => "costing",
            Stage::Benchmarking => "benchmarking",
            Stage::Scoring => "scoring",
            Stage::Gating => "gating",
            Stage::Extraction => "extraction",
            Stage::GraphInsert => "graph_insert",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Category of a stage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A collaborator reported an error.
    Execution,
    /// The caller cancelled the run.
    Cancelled,
    /// A collaborator exceeded the stage timeout.
    TimedOut,
    /// A formulary invariant was violated.
    Domain,
    /// The registry or a state machine rejected an operation.
    Internal,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Execution => write!(f, "execution failure"),
            FailureKind::Cancelled => write!(f, "cancelled"),
            FailureKind::TimedOut => write!(f, "timed out"),
            FailureKind::Domain => write!(f, "domain error"),
            FailureKind::Internal => write!(f, "internal error"),
        }
    }
}

/// Why and where a run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub kind: FailureKind,
    pub message: String,
}

impl StageFailure {
    pub fn new(stage: Stage, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
        }
    }

    pub fn execution(stage: Stage, error: CollaboratorError) -> Self {
        Self::new(stage, FailureKind::Execution, error.to_string())
    }

    pub fn cancelled(stage: Stage) -> Self {
        Self::new(stage, FailureKind::Cancelled, "cancelled by caller")
    }

    pub fn timed_out(stage: Stage, timeout: std::time::Duration) -> Self {
        Self::new(
            stage,
            FailureKind::TimedOut,
            format!("no response within {:?}", timeout),
        )
    }

    pub fn domain(stage: Stage, error: FormularyError) -> Self {
        Self::new(stage, FailureKind::Domain, error.to_string())
    }

    pub fn internal(stage: Stage, error: RegistryError) -> Self {
        Self::new(stage, FailureKind::Internal, error.to_string())
    }
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stage {} {}: {}", self.stage, self.kind, self.message)
    }
}

/// What a report is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    Job(Uuid),
    Document(String),
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subject::Job(id) => write!(f, "job {}", id),
            Subject::Document(id) => write!(f, "document {}", id),
        }
    }
}

/// Final state of the gated subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FinalState {
    Lifecycle(LifecycleState),
    Link(LinkState),
}

impl std::fmt::Display for FinalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinalState::Lifecycle(state) => write!(f, "{}", state),
            FinalState::Link(state) => write!(f, "{}", state),
        }
    }
}

/// Outcome of one candidate link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkOutcome {
    pub link_id: Uuid,
    pub relation: RelationType,
    pub object: String,
    pub object_type: EntityType,
    pub confidence: Option<f64>,
    pub state: LinkState,
}

impl From<&CandidateLink> for LinkOutcome {
    fn from(link: &CandidateLink) -> Self {
        Self {
            link_id: link.id,
            relation: link.relation,
            object: link.object.clone(),
            object_type: link.object_type,
            confidence: link.confidence(),
            state: link.state(),
        }
    }
}

/// Immutable record of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub report_id: Uuid,
    pub correlation_id: String,
    pub subject: Subject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_state: Option<FinalState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_score: Option<Score>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateDecision>,
    pub gate_passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StageFailure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<LinkOutcome>,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

impl Report {
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }

    /// Number of links that ended in `state`.
    pub fn links_in_state(&self, state: LinkState) -> usize {
        self.links.iter().filter(|l| l.state == state).count()
    }
}

/// Assembles a [`Report`] as a run progresses.
#[derive(Debug)]
pub(crate) struct ReportBuilder {
    correlation_id: String,
    subject: Subject,
    artifact_id: Option<Uuid>,
    final_state: Option<FinalState>,
    decision_score: Option<Score>,
    gate: Option<GateDecision>,
    failure: Option<StageFailure>,
    links: Vec<LinkOutcome>,
}

impl ReportBuilder {
    pub(crate) fn new(correlation_id: impl Into<String>, subject: Subject) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            subject,
            artifact_id: None,
            final_state: None,
            decision_score: None,
            gate: None,
            failure: None,
            links: Vec::new(),
        }
    }

    pub(crate) fn artifact(&mut self, id: Uuid, state: LifecycleState) {
        self.artifact_id = Some(id);
        self.final_state = Some(FinalState::Lifecycle(state));
    }

    pub(crate) fn state(&mut self, state: FinalState) {
        self.final_state = Some(state);
    }

    pub(crate) fn decision(&mut self, decision: GateDecision) {
        self.decision_score = Some(decision.score);
        self.gate = Some(decision);
    }

    pub(crate) fn score(&mut self, score: Score) {
        self.decision_score = Some(score);
    }

    pub(crate) fn link(&mut self, link: &CandidateLink) {
        self.links.push(LinkOutcome::from(link));
    }

    pub(crate) fn failure(&mut self, failure: StageFailure) {
        self.failure = Some(failure);
    }

    pub(crate) fn build(self, summary: String) -> Report {
        // A failed run never reports a passed gate.
        let gate_passed = self.failure.is_none()
            && match &self.final_state {
                Some(FinalState::Lifecycle(state)) => *state == LifecycleState::Production,
                Some(FinalState::Link(state)) => *state == LinkState::Accepted,
                None => false,
            };

        Report {
            report_id: Uuid::new_v4(),
            correlation_id: self.correlation_id,
            subject: self.subject,
            artifact_id: self.artifact_id,
            final_state: self.final_state,
            decision_score: self.decision_score,
            gate: self.gate,
            gate_passed,
            failure: self.failure,
            links: self.links,
            summary,
            created_at: Utc::now(),
        }
    }

    pub(crate) fn subject(&self) -> &Subject {
        &self.subject
    }

    pub(crate) fn failure_ref(&self) -> Option<&StageFailure> {
        self.failure.as_ref()
    }

    pub(crate) fn final_state_ref(&self) -> Option<&FinalState> {
        self.final_state.as_ref()
    }

    pub(crate) fn gate_ref(&self) -> Option<&GateDecision> {
        self.gate.as_ref()
    }

    pub(crate) fn artifact_id_ref(&self) -> Option<&Uuid> {
        self.artifact_id.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_report_json() {
        let mut builder = ReportBuilder::new("corr-1", Subject::Job(Uuid::nil()));
        builder.failure(StageFailure::execution(
            Stage::PreparingInput,
            CollaboratorError::Unavailable("db".to_string()),
        ));
        let report = builder.build("Pipeline failed at stage preparing_input".to_string());

        assert!(!report.gate_passed);
        assert!(report.is_failure());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["correlationId"], "corr-1");
        assert_eq!(json["subject"]["job"], Uuid::nil().to_string());
        assert_eq!(json["failure"]["stage"], "preparing_input");
        assert_eq!(json["failure"]["kind"], "execution");
        assert!(json.get("decisionScore").is_none());
        assert!(json.get("artifactId").is_none());
        assert!(json.get("links").is_none());
    }

    #[test]
    fn test_final_state_serializes_flat() {
        assert_eq!(
            serde_json::to_string(&FinalState::Lifecycle(LifecycleState::Production)).unwrap(),
            r#""production""#
        );
        assert_eq!(
            serde_json::to_string(&FinalState::Link(LinkState::Rejected)).unwrap(),
            r#""rejected""#
        );
    }

    #[test]
    fn test_gate_passed_follows_final_state() {
        let mut builder = ReportBuilder::new("c", Subject::Document("doc".to_string()));
        builder.state(FinalState::Link(LinkState::Accepted));
        assert!(builder.build(String::new()).gate_passed);

        let mut builder = ReportBuilder::new("c", Subject::Job(Uuid::nil()));
        builder.artifact(Uuid::nil(), LifecycleState::Deprecated);
        assert!(!builder.build(String::new()).gate_passed);
    }

    #[test]
    fn test_stage_failure_display_names_stage() {
        let failure = StageFailure::timed_out(Stage::Running, std::time::Duration::from_secs(3));
        let text = failure.to_string();
        assert!(text.contains("running"));
        assert!(text.contains("timed out"));
    }
}
