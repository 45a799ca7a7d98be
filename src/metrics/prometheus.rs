//! Prometheus metrics registration and export.
//!
//! Metrics live in a [`CuratorMetrics`] instance with its own registry, so
//! several curators (or tests) in one process never share counters.

use prometheus::{CounterVec, Encoder, Gauge, HistogramVec, Opts, Registry, TextEncoder};

/// Every metric the curator records, registered with a private registry.
#[derive(Clone)]
pub struct CuratorMetrics {
    registry: Registry,
    /// Pipeline runs, labeled by variant and outcome.
    pub runs_total: CounterVec,
    /// Stage failures, labeled by stage.
    pub stage_failures_total: CounterVec,
    /// Distribution of finite decision scores, labeled by variant.
    pub decision_score: HistogramVec,
    /// Gated links, labeled by verdict.
    pub links_total: CounterVec,
    /// Jobs between submission and a terminal state.
    pub jobs_in_progress: Gauge,
}

impl CuratorMetrics {
    /// Create all metrics and register them.
    ///
    /// # Errors
    ///
    /// Returns a `prometheus::Error` if metric registration fails, typically due to
    /// duplicate metric names or invalid metric configurations.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let runs_total = CounterVec::new(
            Opts::new("curator_runs_total", "Total number of pipeline runs"),
            &["variant", "outcome"],
        )?;

        let stage_failures_total = CounterVec::new(
            Opts::new(
                "curator_stage_failures_total",
                "Total number of pipeline runs that failed at a stage",
            ),
            &["stage"],
        )?;

        let decision_score = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "curator_decision_score",
                "Distribution of finite decision scores",
            )
            .buckets(vec![-1.0, -0.5, 0.0, 0.1, 0.25, 0.5, 0.75, 0.9, 1.0, 2.0, 5.0]),
            &["variant"],
        )?;

        let links_total = CounterVec::new(
            Opts::new("curator_links_total", "Total number of gated candidate links"),
            &["verdict"],
        )?;

        let jobs_in_progress = Gauge::new(
            "curator_jobs_in_progress",
            "Number of jobs currently being processed",
        )?;

        registry.register(Box::new(runs_total.clone()))?;
        registry.register(Box::new(stage_failures_total.clone()))?;
        registry.register(Box::new(decision_score.clone()))?;
        registry.register(Box::new(links_total.clone()))?;
        registry.register(Box::new(jobs_in_progress.clone()))?;

        tracing::debug!("Prometheus metrics initialized");

        Ok(Self {
            registry,
            runs_total,
            stage_failures_total,
            decision_score,
            links_total,
            jobs_in_progress,
        })
    }

    /// Export all registered metrics in Prometheus text format.
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            return format!("# Error encoding metrics: {}\n", e);
        }

        String::from_utf8(buffer)
            .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instances_are_independent() {
        let a = CuratorMetrics::new().unwrap();
        let b = CuratorMetrics::new().unwrap();

        a.runs_total.with_label_values(&["fine_tune", "promoted"]).inc();

        assert!(a.export().contains("curator_runs_total"));
        assert!(!b.export().contains("promoted"));
    }

    #[test]
    fn test_export_format() {
        let metrics = CuratorMetrics::new().unwrap();
        metrics.jobs_in_progress.set(2.0);

        let text = metrics.export();
        assert!(!text.starts_with("# Error"));
        assert!(text.contains("curator_jobs_in_progress 2"));
    }
}
