//! Artifact records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::formulary::{Measurements, Score};
use crate::gate::GateDecision;

/// Trust level of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Experimental,
    Benchmarking,
    Staging,
    Production,
    Deprecated,
    Archived,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::Experimental => "experimental",
            LifecycleState::Benchmarking => "benchmarking",
            LifecycleState::Staging => "staging",
            LifecycleState::Production => "production",
            LifecycleState::Deprecated => "deprecated",
            LifecycleState::Archived => "archived",
        };
        write!(f, "{}", name)
    }
}

/// A model produced by a completed job.
///
/// Fields that drive the lifecycle are only writable through
/// [`LifecycleManager`](super::LifecycleManager).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    /// Originating job.
    pub job_id: Uuid,
    pub location: String,
    pub base_model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub(crate) state: LifecycleState,
    pub(crate) measurements: Option<Measurements>,
    pub(crate) decision_score: Option<Score>,
    pub(crate) gate: Option<GateDecision>,
}

impl Artifact {
    /// Creates an artifact in `Experimental`.
    pub fn new(job_id: Uuid, location: impl Into<String>, base_model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_id,
            location: location.into(),
            base_model: base_model.into(),
            created_at: now,
            updated_at: now,
            state: LifecycleState::Experimental,
            measurements: None,
            decision_score: None,
            gate: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn measurements(&self) -> Option<&Measurements> {
        self.measurements.as_ref()
    }

    pub fn decision_score(&self) -> Option<Score> {
        self.decision_score
    }

    pub fn gate(&self) -> Option<&GateDecision> {
        self.gate.as_ref()
    }
}
