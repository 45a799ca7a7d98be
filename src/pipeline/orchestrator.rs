//! Pipeline orchestrator.
//!
//! The [`Curator`] drives one request through the whole pipeline:
//! - Job creation and registration
//! - Input preparation and execution through the injected collaborators
//! - Artifact benchmarking
//! - Scoring with the formulary and gating against the request's policy
//! - Lifecycle mutation and reporting
//!
//! Every run produces a [`Report`]; only a malformed manifest is returned as an
//! error, since no job exists yet at that point.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::RwLock;

use super::config::{ConfigError, PipelineConfig};
use super::context::RunContext;
use super::dataset::PreparedDataset;
use super::report::{FailureKind, FinalState, Report, ReportBuilder, Stage, StageFailure, Subject};
use crate::collaborators::{ExecutionRequest, Executor, GraphSink, InputSource, Scorer};
use crate::error::{CollaboratorError, RegistryError, ValidationError};
use crate::extraction::{LinkState, RelationExtractor};
use crate::formulary::{compute_confidence, compute_cost, compute_gain_score_with, EffortParameters, Score};
use crate::gate::{GateDecision, PolicyGate};
use crate::manifest::{FineTuneConfig, Manifest, SourceDocument, TaskConfig};
use crate::metrics::MetricsCollector;
use crate::registry::{Artifact, Job, LifecycleManager, LifecycleState, Registry};

const FINE_TUNE: &str = "fine_tune";
const RELATION_EXTRACTION: &str = "relation_extraction";

/// Errors that can occur during pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The manifest was rejected before any job was created.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Registry error outside of a run.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// External services the curator calls.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn InputSource>,
    pub executor: Arc<dyn Executor>,
    pub scorer: Arc<dyn Scorer>,
    pub graph: Arc<dyn GraphSink>,
}

/// Statistics about pipeline runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CuratorStats {
    /// Total number of runs reported.
    pub total_runs: u64,
    /// Artifacts promoted to production.
    pub promoted: u64,
    /// Artifacts deprecated by the gate.
    pub deprecated: u64,
    /// Runs that stopped at a failed stage.
    pub failed: u64,
    /// Links accepted and stored.
    pub links_accepted: u64,
    /// Links rejected and discarded.
    pub links_rejected: u64,
    /// Documents in which no candidate link was found.
    pub documents_without_links: u64,
    /// Average run duration.
    pub average_duration: Duration,
}

impl CuratorStats {
    /// Creates new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    fn record_promoted(&mut self, duration: Duration) {
        self.promoted += 1;
        self.record_run(duration);
    }

    fn record_deprecated(&mut self, duration: Duration) {
        self.deprecated += 1;
        self.record_run(duration);
    }

    fn record_failure(&mut self, duration: Duration) {
        self.failed += 1;
        self.record_run(duration);
    }

    fn record_links(&mut self, accepted: u64, rejected: u64, duration: Duration) {
        self.links_accepted += accepted;
        self.links_rejected += rejected;
        if accepted + rejected == 0 {
            self.documents_without_links += 1;
        }
        self.record_run(duration);
    }

    fn record_run(&mut self, duration: Duration) {
        self.total_runs += 1;
        if self.total_runs == 1 {
            self.average_duration = duration;
        } else {
            // Incremental average: avg = avg + (new - avg) / n
            let n = self.total_runs as f64;
            let old_avg = self.average_duration.as_secs_f64();
            let new_avg = old_avg + (duration.as_secs_f64() - old_avg) / n;
            self.average_duration = Duration::from_secs_f64(new_avg.max(0.0));
        }
    }
}

/// Coordinates jobs, artifacts, the formulary and the gate.
pub struct Curator {
    config: PipelineConfig,
    registry: Arc<Registry>,
    lifecycle: LifecycleManager,
    extractor: RelationExtractor,
    collaborators: Collaborators,
    roi_gate: PolicyGate,
    link_gate: PolicyGate,
    metrics: MetricsCollector,
    stats: Arc<RwLock<CuratorStats>>,
}

impl Curator {
    /// Creates a curator over an explicitly owned registry.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Config` if the configuration is invalid.
    pub fn new(
        config: PipelineConfig,
        registry: Arc<Registry>,
        collaborators: Collaborators,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let roi_gate = PolicyGate::min_roi(config.default_min_roi);
        let link_gate = PolicyGate::min_link_confidence(config.default_min_link_confidence);

        Ok(Self {
            config,
            registry,
            lifecycle: LifecycleManager::new(),
            extractor: RelationExtractor::new(),
            collaborators,
            roi_gate,
            link_gate,
            metrics: MetricsCollector::disabled(),
            stats: Arc::new(RwLock::new(CuratorStats::new())),
        })
    }

    /// Records metrics through `metrics`.
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replaces the relation extractor.
    pub fn with_extractor(mut self, extractor: RelationExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub async fn stats(&self) -> CuratorStats {
        self.stats.read().await.clone()
    }

    /// Runs one request with the configured stage timeout.
    pub async fn run_pipeline(&self, manifest: &Manifest) -> Result<Report, PipelineError> {
        let ctx = RunContext::new(self.config.stage_timeout);
        self.run_pipeline_with(manifest, &ctx).await
    }

    /// Runs one request under a caller-supplied context.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Validation` if the manifest is malformed. Every
    /// other failure is reported inside the returned [`Report`].
    pub async fn run_pipeline_with(
        &self,
        manifest: &Manifest,
        ctx: &RunContext,
    ) -> Result<Report, PipelineError> {
        if let Err(e) = manifest.validate() {
            tracing::warn!(correlation_id = %manifest.correlation_id, error = %e, "Manifest rejected");
            return Err(e.into());
        }

        tracing::info!(
            correlation_id = %manifest.correlation_id,
            variant = manifest.variant(),
            "Pipeline started"
        );

        let report = match &manifest.task_config {
            TaskConfig::FineTune(config) => self.run_fine_tune(manifest, config, ctx).await,
            TaskConfig::RelationExtraction(config) => {
                self.run_extraction(manifest, &config.document, ctx).await
            }
        };

        tracing::info!(
            correlation_id = %report.correlation_id,
            gate_passed = report.gate_passed,
            summary = %report.summary,
            "Pipeline finished"
        );

        Ok(report)
    }

    /// Runs multiple requests concurrently.
    ///
    /// Results are in input order; runs may complete in any order.
    pub async fn run_batch(&self, manifests: Vec<Manifest>) -> Vec<Result<Report, PipelineError>> {
        if manifests.is_empty() {
            return Vec::new();
        }

        let futures: Vec<_> = manifests
            .iter()
            .map(|manifest| self.run_pipeline(manifest))
            .collect();

        futures::future::join_all(futures).await
    }

    /// Saves the registry when a registry path is configured.
    pub async fn persist(&self) -> Result<Option<PathBuf>, PipelineError> {
        match &self.config.registry_path {
            Some(dir) => Ok(Some(self.registry.save(dir).await?)),
            None => Ok(None),
        }
    }

    // ---------------------------------------------------------------------
    // Fine-tune promotion
    // ---------------------------------------------------------------------

    async fn run_fine_tune(
        &self,
        manifest: &Manifest,
        config: &FineTuneConfig,
        ctx: &RunContext,
    ) -> Report {
        let start_time = Instant::now();
        let mut job = Job::new(&manifest.correlation_id, manifest.fingerprint(), config.clone());
        let mut report = ReportBuilder::new(&manifest.correlation_id, Subject::Job(job.id));

        if let Err(e) = self.registry.register_job(job.clone()).await {
            report.failure(StageFailure::internal(Stage::PreparingInput, e));
            return self.finish_fine_tune(report, start_time).await;
        }

        self.metrics.job_started();
        let executed = self.execute_job(&mut job, ctx).await;
        self.metrics.job_finished();

        let cost = match executed {
            Ok(cost) => cost,
            Err(failure) => {
                self.fail_job(&mut job, &failure).await;
                report.failure(failure);
                return self.finish_fine_tune(report, start_time).await;
            }
        };

        if let Err(failure) = self
            .evaluate_artifact(&mut job, cost, manifest, ctx, &mut report)
            .await
        {
            report.failure(failure);
        }

        self.finish_fine_tune(report, start_time).await
    }

    /// Prepares input, runs the executor and costs the job.
    ///
    /// Returns the job cost on success.
    async fn execute_job(&self, job: &mut Job, ctx: &RunContext) -> Result<f64, StageFailure> {
        // Preparing input
        ctx.check(Stage::PreparingInput)?;
        job.begin_preparation()
            .map_err(|e| StageFailure::internal(Stage::PreparingInput, e))?;
        self.sync_job(job, Stage::PreparingInput).await?;

        let query = job.config().dataset_query.clone();
        let records = ctx
            .guard(Stage::PreparingInput, self.collaborators.source.fetch(&query))
            .await?;

        if records.is_empty() {
            return Err(StageFailure::new(
                Stage::PreparingInput,
                FailureKind::Execution,
                format!("input source returned no records for '{}'", query),
            ));
        }

        let dataset = PreparedDataset::from_records(&records).map_err(|e| {
            StageFailure::new(Stage::PreparingInput, FailureKind::Internal, e.to_string())
        })?;

        if let Some(dir) = &self.config.registry_path {
            let path = dir.join("datasets").join(format!("{}.jsonl", job.id));
            ctx.guard(Stage::PreparingInput, async {
                dataset.write_to(&path).await.map_err(|e| {
                    CollaboratorError::Failed(format!(
                        "could not write dataset {}: {}",
                        path.display(),
                        e
                    ))
                })
            })
            .await?;
            job.append_log(format!("Dataset written to {}", path.display()));
        }

        let prepared = dataset.summary();
        job.record_prepared_input(prepared.clone())
            .map_err(|e| StageFailure::internal(Stage::PreparingInput, e))?;
        self.sync_job(job, Stage::PreparingInput).await?;

        // Running
        ctx.check(Stage::Running)?;
        job.begin_running()
            .map_err(|e| StageFailure::internal(Stage::Running, e))?;
        self.sync_job(job, Stage::Running).await?;

        let request = ExecutionRequest {
            job_id: job.id,
            config: job.config().clone(),
            dataset,
        };
        let output = ctx
            .guard(Stage::Running, self.collaborators.executor.execute(&request))
            .await?;

        for line in output.log_lines {
            job.append_log(line);
        }
        job.complete(output.location)
            .map_err(|e| StageFailure::internal(Stage::Running, e))?;

        // Costing
        let effort = EffortParameters::from_epochs(
            job.config().epochs,
            self.config.hours_per_epoch,
            job.config().model_params_billions,
        );
        let cost = compute_cost(&effort, prepared.size_bytes, &self.config.cost_weights);
        job.record_cost(cost)
            .map_err(|e| StageFailure::internal(Stage::Costing, e))?;
        self.sync_job(job, Stage::Costing).await?;

        tracing::info!(job_id = %job.id, cost, "Job completed");
        Ok(cost)
    }

    /// Benchmarks, scores and gates the artifact of a completed job.
    async fn evaluate_artifact(
        &self,
        job: &mut Job,
        cost: f64,
        manifest: &Manifest,
        ctx: &RunContext,
        report: &mut ReportBuilder,
    ) -> Result<(), StageFailure> {
        let location = job.artifact_location().ok_or_else(|| {
            StageFailure::new(
                Stage::Benchmarking,
                FailureKind::Internal,
                "completed job has no artifact location",
            )
        })?;

        let mut artifact = Artifact::new(job.id, location, &job.config().base_model);
        self.registry
            .register_artifact(artifact.clone())
            .await
            .map_err(|e| StageFailure::internal(Stage::Benchmarking, e))?;
        report.artifact(artifact.id, artifact.state());

        // Benchmarking
        self.lifecycle
            .begin_benchmarking(&mut artifact)
            .map_err(|e| StageFailure::internal(Stage::Benchmarking, e))?;
        self.sync_artifact(&artifact, Stage::Benchmarking, report).await?;

        let measurements = ctx
            .guard(Stage::Benchmarking, self.collaborators.scorer.score(&artifact.location))
            .await?;

        self.lifecycle
            .record_measurements(&mut artifact, measurements)
            .map_err(|e| StageFailure::internal(Stage::Benchmarking, e))?;
        self.sync_artifact(&artifact, Stage::Benchmarking, report).await?;

        // Scoring
        let score = {
            let measurements = artifact.measurements().ok_or_else(|| {
                StageFailure::new(
                    Stage::Scoring,
                    FailureKind::Internal,
                    "staged artifact has no measurements",
                )
            })?;
            compute_gain_score_with(
                &self.config.baseline,
                measurements,
                cost,
                &self.config.gain_weights,
                self.config.zero_cost,
            )
            .map_err(|e| StageFailure::domain(Stage::Scoring, e))?
        };
        report.score(score);
        self.metrics.record_decision(FINE_TUNE, score.value());

        // Gating
        let decision = self.roi_gate.evaluate(score, &manifest.policy);
        self.log_decision(&decision, &artifact.id.to_string());

        let state = self
            .lifecycle
            .apply_gate(&mut artifact, decision.clone())
            .map_err(|e| StageFailure::internal(Stage::Gating, e))?;
        report.decision(decision);
        self.sync_artifact(&artifact, Stage::Gating, report).await?;

        if state == LifecycleState::Production {
            self.retire_superseded(&artifact, job).await?;
        }

        Ok(())
    }

    /// Archives every earlier production artifact of the same base model.
    ///
    /// Only artifacts promoted before `promoted` are retired, so two
    /// concurrent promotions never archive each other.
    async fn retire_superseded(
        &self,
        promoted: &Artifact,
        job: &mut Job,
    ) -> Result<(), StageFailure> {
        let superseded: Vec<Artifact> = self
            .registry
            .artifacts_in_state(LifecycleState::Production)
            .await
            .into_iter()
            .filter(|previous| {
                previous.base_model == promoted.base_model
                    && (previous.updated_at, previous.id) < (promoted.updated_at, promoted.id)
            })
            .collect();

        if superseded.is_empty() {
            return Ok(());
        }

        for mut previous in superseded {
            self.lifecycle
                .archive(&mut previous, &format!("superseded by {}", promoted.id))
                .map_err(|e| StageFailure::internal(Stage::Gating, e))?;
            self.registry
                .update_artifact(&previous)
                .await
                .map_err(|e| StageFailure::internal(Stage::Gating, e))?;
            job.append_log(format!(
                "Archived production artifact {} superseded by {}",
                previous.id, promoted.id
            ));
            tracing::info!(
                artifact_id = %previous.id,
                superseded_by = %promoted.id,
                base_model = %promoted.base_model,
                "Production artifact retired"
            );
        }

        self.sync_job(job, Stage::Gating).await
    }

    async fn finish_fine_tune(&self, report: ReportBuilder, start_time: Instant) -> Report {
        let duration = start_time.elapsed();
        let summary = self.fine_tune_summary(&report);

        let outcome = {
            let mut stats = self.stats.write().await;
            if let Some(failure) = report.failure_ref() {
                self.metrics.record_stage_failure(failure.stage.as_str());
                stats.record_failure(duration);
                "failed"
            } else if matches!(
                report.final_state_ref(),
                Some(FinalState::Lifecycle(LifecycleState::Production))
            ) {
                stats.record_promoted(duration);
                "promoted"
            } else {
                stats.record_deprecated(duration);
                "deprecated"
            }
        };
        self.metrics.record_run(FINE_TUNE, outcome);

        report.build(summary)
    }

    fn fine_tune_summary(&self, report: &ReportBuilder) -> String {
        if let Some(failure) = report.failure_ref() {
            return failure_summary(report.subject(), failure);
        }

        match (report.final_state_ref(), report.gate_ref(), report.artifact_id_ref()) {
            (Some(state), Some(gate), Some(artifact_id)) => {
                let verdict = if gate.passed {
                    format!("promoted to {}", state)
                } else {
                    state.to_string()
                };
                format!(
                    "Artifact {} {}: ROI {} {} {} {}{}",
                    artifact_id,
                    verdict,
                    gate.score,
                    if gate.passed { ">=" } else { "<" },
                    gate.threshold_name,
                    gate.threshold,
                    if gate.defaulted { " (default)" } else { "" }
                )
            }
            _ => format!("{} finished without a gate decision", report.subject()),
        }
    }

    // ---------------------------------------------------------------------
    // Relation extraction
    // ---------------------------------------------------------------------

    async fn run_extraction(
        &self,
        manifest: &Manifest,
        document: &SourceDocument,
        ctx: &RunContext,
    ) -> Report {
        let start_time = Instant::now();
        let mut report =
            ReportBuilder::new(&manifest.correlation_id, Subject::Document(document.doc_id.clone()));

        let mut accepted = 0u64;
        let mut rejected = 0u64;

        if let Err(failure) = self
            .gate_links(manifest, document, ctx, &mut report, &mut accepted, &mut rejected)
            .await
        {
            report.failure(failure);
        }

        let duration = start_time.elapsed();
        let summary = if let Some(failure) = report.failure_ref() {
            failure_summary(report.subject(), failure)
        } else if accepted + rejected == 0 {
            format!("No candidate links found in document {}", document.doc_id)
        } else {
            format!(
                "{} of {} candidate link(s) from document {} accepted ({} {})",
                accepted,
                accepted + rejected,
                document.doc_id,
                self.link_gate.threshold_name(),
                self.link_gate.resolve_threshold(&manifest.policy).0
            )
        };

        let outcome = {
            let mut stats = self.stats.write().await;
            if let Some(failure) = report.failure_ref() {
                self.metrics.record_stage_failure(failure.stage.as_str());
                stats.record_failure(duration);
                "failed"
            } else {
                stats.record_links(accepted, rejected, duration);
                match (accepted, rejected) {
                    (0, 0) => "no_candidates",
                    (0, _) => "rejected",
                    _ => "accepted",
                }
            }
        };
        self.metrics.record_run(RELATION_EXTRACTION, outcome);

        report.build(summary)
    }

    /// Gates every candidate link of a document; accepted links go to the graph sink.
    async fn gate_links(
        &self,
        manifest: &Manifest,
        document: &SourceDocument,
        ctx: &RunContext,
        report: &mut ReportBuilder,
        accepted: &mut u64,
        rejected: &mut u64,
    ) -> Result<(), StageFailure> {
        ctx.check(Stage::Extraction)?;
        let candidates = self.extractor.extract(document);

        let mut best: Option<GateDecision> = None;

        for mut link in candidates {
            let confidence = compute_confidence(&link.evidence, &self.config.evidence_weights);
            let decision = self.link_gate.evaluate(Score::Finite(confidence), &manifest.policy);
            self.metrics.record_decision(RELATION_EXTRACTION, confidence);

            if best
                .as_ref()
                .map(|b| confidence > b.score.value())
                .unwrap_or(true)
            {
                best = Some(decision.clone());
            }

            let state = link
                .apply_gate(decision)
                .map_err(|e| StageFailure::internal(Stage::Gating, e))?;

            match state {
                LinkState::Accepted => {
                    let inserted = ctx
                        .guard(Stage::GraphInsert, self.collaborators.graph.insert(&link))
                        .await;
                    if let Err(failure) = inserted {
                        tracing::error!(
                            doc_id = %document.doc_id,
                            object = %link.object,
                            error = %failure,
                            "Graph insert failed"
                        );
                        self.finish_links(report, best, *accepted);
                        return Err(failure);
                    }
                    report.link(&link);
                    *accepted += 1;
                    self.metrics.record_link(true);
                    tracing::info!(
                        subject = %link.subject,
                        relation = %link.relation,
                        object = %link.object,
                        confidence,
                        "Link accepted"
                    );
                }
                LinkState::Rejected | LinkState::Created => {
                    *rejected += 1;
                    self.metrics.record_link(false);
                    report.link(&link);
                    tracing::warn!(
                        subject = %link.subject,
                        relation = %link.relation,
                        object = %link.object,
                        confidence,
                        "Link rejected"
                    );
                }
            }
        }

        self.finish_links(report, best, *accepted);
        Ok(())
    }

    fn finish_links(&self, report: &mut ReportBuilder, best: Option<GateDecision>, accepted: u64) {
        if let Some(decision) = best {
            report.decision(decision);
            report.state(FinalState::Link(if accepted > 0 {
                LinkState::Accepted
            } else {
                LinkState::Rejected
            }));
        }
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    async fn sync_job(&self, job: &Job, stage: Stage) -> Result<(), StageFailure> {
        self.registry
            .update_job(job)
            .await
            .map_err(|e| StageFailure::internal(stage, e))
    }

    async fn sync_artifact(
        &self,
        artifact: &Artifact,
        stage: Stage,
        report: &mut ReportBuilder,
    ) -> Result<(), StageFailure> {
        report.artifact(artifact.id, artifact.state());
        self.registry
            .update_artifact(artifact)
            .await
            .map_err(|e| StageFailure::internal(stage, e))
    }

    /// Moves a non-terminal job to `Failed` with the failure as reason.
    async fn fail_job(&self, job: &mut Job, failure: &StageFailure) {
        tracing::error!(
            job_id = %job.id,
            stage = %failure.stage,
            kind = %failure.kind,
            error = %failure.message,
            "Job failed"
        );

        if job.state().is_terminal() {
            return;
        }
        if let Err(e) = job.fail(failure.to_string()) {
            tracing::warn!(job_id = %job.id, error = %e, "Could not mark job as failed");
            return;
        }
        if let Err(e) = self.registry.update_job(job).await {
            tracing::warn!(job_id = %job.id, error = %e, "Could not store failed job");
        }
    }

    fn log_decision(&self, decision: &GateDecision, subject: &str) {
        if decision.passed {
            tracing::info!(
                subject,
                score = %decision.score,
                threshold = decision.threshold,
                threshold_name = %decision.threshold_name,
                "Gate passed"
            );
        } else {
            tracing::warn!(
                subject,
                score = %decision.score,
                threshold = decision.threshold,
                threshold_name = %decision.threshold_name,
                "Gate failed"
            );
        }
    }
}

fn failure_summary(subject: &Subject, failure: &StageFailure) -> String {
    format!(
        "{} failed at stage '{}' ({}): {}",
        subject, failure.stage, failure.kind, failure.message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{FixedScorer, MemoryGraphSink, Record, ScriptedExecutor, StaticSource};
    use crate::formulary::Measurements;
    use crate::registry::JobState;

    fn measurements() -> Measurements {
        [("accuracy".to_string(), 0.95), ("tps".to_string(), 50.5)]
            .into_iter()
            .collect()
    }

    fn collaborators() -> Collaborators {
        Collaborators {
            source: Arc::new(StaticSource::new(vec![
                Record::new("OOMKilled in pod api-7").with_prompt("Why did the pod restart?"),
                Record::new("connection reset by peer"),
            ])),
            executor: Arc::new(ScriptedExecutor::new()),
            scorer: Arc::new(FixedScorer::new(measurements())),
            graph: Arc::new(MemoryGraphSink::new()),
        }
    }

    fn curator_with(collaborators: Collaborators) -> Curator {
        Curator::new(PipelineConfig::default(), Arc::new(Registry::new()), collaborators).unwrap()
    }

    fn fine_tune(min_roi: f64) -> Manifest {
        Manifest::fine_tune("LID-TEST-001", FineTuneConfig::default().with_epochs(1))
            .with_threshold("minRoi", min_roi)
    }

    #[test]
    fn test_stats_average_duration() {
        let mut stats = CuratorStats::new();
        stats.record_promoted(Duration::from_secs(2));
        stats.record_failure(Duration::from_secs(4));

        assert_eq!(stats.total_runs, 2);
        assert_eq!(stats.promoted, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.average_duration, Duration::from_secs(3));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig::default().with_stage_timeout(Duration::ZERO);
        let result = Curator::new(config, Arc::new(Registry::new()), collaborators());
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[tokio::test]
    async fn test_promotion_updates_registry() {
        let curator = curator_with(collaborators());
        let report = curator.run_pipeline(&fine_tune(0.10)).await.unwrap();

        assert!(report.gate_passed);
        assert_eq!(
            report.final_state,
            Some(FinalState::Lifecycle(LifecycleState::Production))
        );

        let job_id = match report.subject {
            Subject::Job(id) => id,
            ref other => panic!("unexpected subject {:?}", other),
        };
        let job = curator.registry().get_job(&job_id).await.unwrap();
        assert_eq!(job.state(), JobState::Completed);
        assert!(job.cost().unwrap() > 0.0);
        assert!(job.log().iter().any(|l| l.starts_with("Epoch 1/1")));

        let artifact = curator
            .registry()
            .get_artifact(&report.artifact_id.unwrap())
            .await
            .unwrap();
        assert_eq!(artifact.state(), LifecycleState::Production);
        assert_eq!(artifact.decision_score(), report.decision_score);

        let stats = curator.stats().await;
        assert_eq!(stats.promoted, 1);
        assert_eq!(stats.total_runs, 1);
    }

    #[tokio::test]
    async fn test_empty_input_fails_preparation() {
        let mut c = collaborators();
        c.source = Arc::new(StaticSource::new(Vec::new()));
        let curator = curator_with(c);

        let report = curator.run_pipeline(&fine_tune(0.1)).await.unwrap();
        let failure = report.failure.as_ref().unwrap();
        assert_eq!(failure.stage, Stage::PreparingInput);
        assert!(report.artifact_id.is_none());
        assert_eq!(curator.registry().artifact_count().await, 0);
    }

    #[tokio::test]
    async fn test_scorer_failure_leaves_artifact_benchmarking() {
        let mut c = collaborators();
        c.scorer = Arc::new(FixedScorer::failing(CollaboratorError::Failed(
            "benchmark crashed".to_string(),
        )));
        let curator = curator_with(c);

        let report = curator.run_pipeline(&fine_tune(0.1)).await.unwrap();
        assert!(!report.gate_passed);
        assert!(report.decision_score.is_none());
        assert_eq!(report.failure.as_ref().unwrap().stage, Stage::Benchmarking);
        assert_eq!(
            report.final_state,
            Some(FinalState::Lifecycle(LifecycleState::Benchmarking))
        );
        assert!(report.summary.contains("benchmarking"));
    }

    #[tokio::test]
    async fn test_graph_failure_stops_extraction() {
        let mut c = collaborators();
        c.graph = Arc::new(MemoryGraphSink::failing(CollaboratorError::Unavailable(
            "graph offline".to_string(),
        )));
        let curator = curator_with(c);

        let manifest = Manifest::relation_extraction(
            "weave-1",
            SourceDocument::new(
                "commit-f0e1d2c",
                crate::manifest::EntityType::CodeCommit,
                "Fixes vuln-a1b2c3d4",
            ),
        )
        .with_threshold("minLinkConfidence", 0.5);

        let report = curator.run_pipeline(&manifest).await.unwrap();
        assert!(!report.gate_passed);
        assert_eq!(report.failure.as_ref().unwrap().stage, Stage::GraphInsert);
        assert!(report.links.is_empty());
        assert_eq!(report.links_in_state(LinkState::Accepted), 0);
    }

    #[tokio::test]
    async fn test_persist_without_path_is_noop() {
        let curator = curator_with(collaborators());
        assert!(curator.persist().await.unwrap().is_none());
    }
}
