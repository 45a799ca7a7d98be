//! Metric recording for curator operations.
//!
//! The `MetricsCollector` wraps an optional [`CuratorMetrics`] instance and
//! provides one method per event the orchestrator reports. Without an
//! instance every method only traces.

use std::sync::Arc;

use super::prometheus::CuratorMetrics;

/// Records pipeline events.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    metrics: Option<Arc<CuratorMetrics>>,
}

impl MetricsCollector {
    /// Collector that records into `metrics`.
    pub fn new(metrics: Arc<CuratorMetrics>) -> Self {
        Self {
            metrics: Some(metrics),
        }
    }

    /// Collector that records nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> Option<&Arc<CuratorMetrics>> {
        self.metrics.as_ref()
    }

    /// Record a finished pipeline run.
    ///
    /// # Arguments
    ///
    /// * `variant` - Pipeline variant (e.g., "fine_tune", "relation_extraction")
    /// * `outcome` - Run outcome (e.g., "promoted", "deprecated", "failed")
    pub fn record_run(&self, variant: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.runs_total.with_label_values(&[variant, outcome]).inc();
        }
        tracing::trace!(variant, outcome, "Recorded run metric");
    }

    /// Record a run that failed at `stage`.
    pub fn record_stage_failure(&self, stage: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.stage_failures_total.with_label_values(&[stage]).inc();
        }
        tracing::trace!(stage, "Recorded stage failure metric");
    }

    /// Record a decision score. Non-finite scores are not observed.
    pub fn record_decision(&self, variant: &str, score: f64) {
        if !score.is_finite() {
            return;
        }
        if let Some(metrics) = &self.metrics {
            metrics.decision_score.with_label_values(&[variant]).observe(score);
        }
        tracing::trace!(variant, score, "Recorded decision metric");
    }

    /// Record a gated link.
    pub fn record_link(&self, accepted: bool) {
        let verdict = if accepted { "accepted" } else { "rejected" };
        if let Some(metrics) = &self.metrics {
            metrics.links_total.with_label_values(&[verdict]).inc();
        }
        tracing::trace!(verdict, "Recorded link metric");
    }

    pub fn job_started(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.jobs_in_progress.inc();
        }
    }

    pub fn job_finished(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.jobs_in_progress.dec();
        }
    }
}
