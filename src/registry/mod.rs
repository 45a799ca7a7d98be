//! Job and artifact registry.
//!
//! This module provides:
//! - The job state machine ([`Job`])
//! - The artifact lifecycle ([`Artifact`], [`LifecycleManager`])
//! - A keyed store of both, safe for concurrent pipeline runs
//!
//! The registry is an explicitly owned value handed to the orchestrator; there
//! is no process-wide instance.

pub mod artifact;
pub mod job;
pub mod lifecycle;

pub use artifact::{Artifact, LifecycleState};
pub use job::{Job, JobState, PreparedInput};
pub use lifecycle::LifecycleManager;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::RegistryError;

/// Name of the registry JSON file.
const REGISTRY_FILENAME: &str = "registry.json";

/// Serialized form of the registry.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub jobs: Vec<Job>,
    pub artifacts: Vec<Artifact>,
}

/// Concurrent store of jobs and artifacts, keyed by id.
#[derive(Default)]
pub struct Registry {
    jobs: RwLock<HashMap<Uuid, Job>>,
    artifacts: RwLock<HashMap<Uuid, Artifact>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job.
    ///
    /// # Errors
    /// Returns `DuplicateJob` if a job with the same id already exists.
    pub async fn register_job(&self, job: Job) -> Result<Uuid, RegistryError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(RegistryError::DuplicateJob(job.id.to_string()));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    /// Replace the stored copy of an existing job.
    pub async fn update_job(&self, job: &Job) -> Result<(), RegistryError> {
        let mut jobs = self.jobs.write().await;
        let slot = jobs
            .get_mut(&job.id)
            .ok_or_else(|| RegistryError::JobNotFound(job.id.to_string()))?;
        *slot = job.clone();
        Ok(())
    }

    pub async fn get_job(&self, id: &Uuid) -> Option<Job> {
        self.jobs.read().await.get(id).cloned()
    }

    /// First job created from a task configuration with this fingerprint.
    pub async fn find_job_by_fingerprint(&self, fingerprint: &str) -> Option<Job> {
        self.jobs
            .read()
            .await
            .values()
            .filter(|job| job.fingerprint == fingerprint)
            .min_by_key(|job| job.submitted_at)
            .cloned()
    }

    pub async fn jobs_for_correlation(&self, correlation_id: &str) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.correlation_id == correlation_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.submitted_at);
        jobs
    }

    pub async fn jobs_in_state(&self, state: JobState) -> Vec<Job> {
        self.jobs
            .read()
            .await
            .values()
            .filter(|job| job.state() == state)
            .cloned()
            .collect()
    }

    /// Register a new artifact.
    ///
    /// # Errors
    /// Returns `DuplicateArtifact` if an artifact with the same id exists, or
    /// `JobNotFound` if its originating job is not registered.
    pub async fn register_artifact(&self, artifact: Artifact) -> Result<Uuid, RegistryError> {
        if !self.jobs.read().await.contains_key(&artifact.job_id) {
            return Err(RegistryError::JobNotFound(artifact.job_id.to_string()));
        }

        let mut artifacts = self.artifacts.write().await;
        if artifacts.contains_key(&artifact.id) {
            return Err(RegistryError::DuplicateArtifact(artifact.id.to_string()));
        }
        let id = artifact.id;
        artifacts.insert(id, artifact);
        Ok(id)
    }

    /// Replace the stored copy of an existing artifact.
    pub async fn update_artifact(&self, artifact: &Artifact) -> Result<(), RegistryError> {
        let mut artifacts = self.artifacts.write().await;
        let slot = artifacts
            .get_mut(&artifact.id)
            .ok_or_else(|| RegistryError::ArtifactNotFound(artifact.id.to_string()))?;
        *slot = artifact.clone();
        Ok(())
    }

    pub async fn get_artifact(&self, id: &Uuid) -> Option<Artifact> {
        self.artifacts.read().await.get(id).cloned()
    }

    pub async fn artifacts_for_job(&self, job_id: &Uuid) -> Vec<Artifact> {
        self.artifacts
            .read()
            .await
            .values()
            .filter(|artifact| artifact.job_id == *job_id)
            .cloned()
            .collect()
    }

    pub async fn artifacts_in_state(&self, state: LifecycleState) -> Vec<Artifact> {
        self.artifacts
            .read()
            .await
            .values()
            .filter(|artifact| artifact.state() == state)
            .cloned()
            .collect()
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn artifact_count(&self) -> usize {
        self.artifacts.read().await.len()
    }

    /// Copies every job and artifact, ordered by creation time.
    pub async fn snapshot(&self) -> RegistrySnapshot {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|job| job.submitted_at);

        let mut artifacts: Vec<Artifact> =
            self.artifacts.read().await.values().cloned().collect();
        artifacts.sort_by_key(|artifact| artifact.created_at);

        RegistrySnapshot { jobs, artifacts }
    }

    /// Save the registry to `<dir>/registry.json`.
    ///
    /// Creates the directory if it doesn't exist.
    pub async fn save(&self, dir: &Path) -> Result<PathBuf, RegistryError> {
        tokio::fs::create_dir_all(dir).await?;

        let snapshot = self.snapshot().await;
        let contents = serde_json::to_string_pretty(&snapshot)?;

        let file_path = dir.join(REGISTRY_FILENAME);
        tokio::fs::write(&file_path, contents).await?;

        tracing::debug!(
            path = %file_path.display(),
            jobs = snapshot.jobs.len(),
            artifacts = snapshot.artifacts.len(),
            "Registry saved"
        );
        Ok(file_path)
    }

    /// Load a registry from `<dir>/registry.json`.
    ///
    /// If the registry file doesn't exist, starts with an empty registry.
    pub async fn load(dir: &Path) -> Result<Self, RegistryError> {
        let file_path = dir.join(REGISTRY_FILENAME);

        if !tokio::fs::try_exists(&file_path).await? {
            return Ok(Self::new());
        }

        let contents = tokio::fs::read_to_string(&file_path).await?;
        let snapshot: RegistrySnapshot = serde_json::from_str(&contents)?;

        Ok(Self::from_snapshot(snapshot))
    }

    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        let jobs = snapshot.jobs.into_iter().map(|j| (j.id, j)).collect();
        let artifacts = snapshot.artifacts.into_iter().map(|a| (a.id, a)).collect();
        Self {
            jobs: RwLock::new(jobs),
            artifacts: RwLock::new(artifacts),
        }
    }
}
