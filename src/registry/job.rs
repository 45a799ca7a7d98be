//! Job records.
//!
//! A [`Job`] is a passive record of one execution attempt. It never advances
//! itself; the orchestrator drives every transition:
//!
//! ```text
//! Pending -> PreparingInput -> Running -> Completed
//!    \            \              \
//!     +------------+--------------+----> Failed
//! ```
//!
//! `Completed` and `Failed` are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RegistryError;
use crate::manifest::FineTuneConfig;

/// State of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    PreparingInput,
    Running,
    Completed,
    Failed,
}

impl JobState {
    /// Returns true if no further transitions are allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Returns true if `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        match (self, next) {
            (JobState::Pending, JobState::PreparingInput) => true,
            (JobState::PreparingInput, JobState::Running) => true,
            (JobState::Running, JobState::Completed) => true,
            (current, JobState::Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::PreparingInput => write!(f, "preparing_input"),
            JobState::Running => write!(f, "running"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

/// Size and identity of the input materialized for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedInput {
    /// Number of records in the prepared dataset.
    pub record_count: usize,
    /// Size of the prepared dataset in bytes.
    pub size_bytes: u64,
    /// SHA-256 hex digest of the prepared dataset.
    pub digest: String,
}

/// One execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub correlation_id: String,
    /// Fingerprint of the originating task configuration.
    pub fingerprint: String,
    state: JobState,
    config: FineTuneConfig,
    pub submitted_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    artifact_location: Option<String>,
    prepared_input: Option<PreparedInput>,
    cost: Option<f64>,
    log: Vec<String>,
}

impl Job {
    /// Creates a job in `Pending`.
    pub fn new(
        correlation_id: impl Into<String>,
        fingerprint: impl Into<String>,
        config: FineTuneConfig,
    ) -> Self {
        let mut job = Self {
            id: Uuid::new_v4(),
            correlation_id: correlation_id.into(),
            fingerprint: fingerprint.into(),
            state: JobState::Pending,
            config,
            submitted_at: Utc::now(),
            completed_at: None,
            artifact_location: None,
            prepared_input: None,
            cost: None,
            log: Vec::new(),
        };
        job.append_log(format!("Job submitted for base model {}", job.config.base_model));
        job
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn config(&self) -> &FineTuneConfig {
        &self.config
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn artifact_location(&self) -> Option<&str> {
        self.artifact_location.as_deref()
    }

    pub fn prepared_input(&self) -> Option<&PreparedInput> {
        self.prepared_input.as_ref()
    }

    pub fn cost(&self) -> Option<f64> {
        self.cost
    }

    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Appends a progress entry.
    pub fn append_log(&mut self, entry: impl Into<String>) {
        let entry = entry.into();
        tracing::debug!(job_id = %self.id, "{}", entry);
        self.log.push(entry);
    }

    /// `Pending -> PreparingInput`.
    pub fn begin_preparation(&mut self) -> Result<(), RegistryError> {
        self.transition(JobState::PreparingInput)?;
        self.append_log("Preparing input");
        Ok(())
    }

    /// Records the materialized input. Only valid while preparing.
    pub fn record_prepared_input(&mut self, input: PreparedInput) -> Result<(), RegistryError> {
        if self.state != JobState::PreparingInput {
            return Err(RegistryError::RequirementsNotMet(format!(
                "prepared input can only be recorded while preparing (job is {})",
                self.state
            )));
        }
        self.append_log(format!(
            "Prepared {} records ({} bytes)",
            input.record_count, input.size_bytes
        ));
        self.prepared_input = Some(input);
        Ok(())
    }

    /// `PreparingInput -> Running`.
    pub fn begin_running(&mut self) -> Result<(), RegistryError> {
        if self.prepared_input.is_none() {
            return Err(RegistryError::RequirementsNotMet(
                "job cannot run before its input is prepared".to_string(),
            ));
        }
        self.transition(JobState::Running)?;
        self.append_log(format!("Running {} epoch(s)", self.config.epochs));
        Ok(())
    }

    /// `Running -> Completed`, recording where the artifact was written.
    pub fn complete(&mut self, artifact_location: impl Into<String>) -> Result<(), RegistryError> {
        self.transition(JobState::Completed)?;
        let location = artifact_location.into();
        self.append_log(format!("Completed, artifact at {}", location));
        self.artifact_location = Some(location);
        Ok(())
    }

    /// Records the job cost. Only valid once, after completion.
    pub fn record_cost(&mut self, cost: f64) -> Result<(), RegistryError> {
        if self.state != JobState::Completed {
            return Err(RegistryError::RequirementsNotMet(format!(
                "cost can only be recorded on a completed job (job is {})",
                self.state
            )));
        }
        if self.cost.is_some() {
            return Err(RegistryError::RequirementsNotMet(
                "cost has already been recorded".to_string(),
            ));
        }
        if !(cost.is_finite() && cost >= 0.0) {
            return Err(RegistryError::RequirementsNotMet(format!(
                "cost must be a non-negative number, got {}",
                cost
            )));
        }
        self.append_log(format!("Cost computed: {:.4}", cost));
        self.cost = Some(cost);
        Ok(())
    }

    /// Moves any non-terminal job to `Failed`.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), RegistryError> {
        self.transition(JobState::Failed)?;
        self.append_log(format!("Failed: {}", reason.into()));
        Ok(())
    }

    fn transition(&mut self, next: JobState) -> Result<(), RegistryError> {
        if !self.state.can_transition_to(next) {
            return Err(RegistryError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
                reason: if self.state.is_terminal() {
                    "job is in a terminal state".to_string()
                } else {
                    "transition not allowed".to_string()
                },
            });
        }

        tracing::info!(job_id = %self.id, from = %self.state, to = %next, "Job transition");
        self.state = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}
