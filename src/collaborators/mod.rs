//! External collaborator interfaces.
//!
//! Every dependency the pipeline calls out to is an injected trait object:
//!
//! - [`InputSource`]: fetches the records a job trains on
//! - [`Executor`]: runs the job and reports where its artifact was written
//! - [`Scorer`]: benchmarks an artifact
//! - [`GraphSink`]: stores accepted links
//!
//! In-memory implementations for tests and the CLI live in [`memory`].

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CollaboratorError;
use crate::extraction::CandidateLink;
use crate::formulary::Measurements;
use crate::manifest::FineTuneConfig;
use crate::pipeline::dataset::PreparedDataset;

pub use memory::{FixedScorer, MemoryGraphSink, ScriptedExecutor, StaticSource};

/// A record returned by an input source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Free-text content.
    pub content: String,
    /// Optional prompt or label.
    #[serde(default)]
    pub prompt: Option<String>,
}

impl Record {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            prompt: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

/// Source of the records a job is prepared from.
#[async_trait]
pub trait InputSource: Send + Sync {
    /// Fetch records matching a query, in source order.
    async fn fetch(&self, query: &str) -> Result<Vec<Record>, CollaboratorError>;
}

/// What the executor is asked to run.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub job_id: Uuid,
    pub config: FineTuneConfig,
    pub dataset: PreparedDataset,
}

/// What the executor produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutput {
    /// Where the artifact was written.
    pub location: String,
    /// Progress lines to append to the job log.
    pub log_lines: Vec<String>,
}

/// Runs a job. May be slow; the orchestrator bounds it with a timeout.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutput, CollaboratorError>;
}

/// Benchmarks an artifact.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Measure the artifact at `location`, one value per named dimension.
    async fn score(&self, location: &str) -> Result<Measurements, CollaboratorError>;
}

/// Receives links that passed the gate.
#[async_trait]
pub trait GraphSink: Send + Sync {
    async fn insert(&self, link: &CandidateLink) -> Result<(), CollaboratorError>;
}
