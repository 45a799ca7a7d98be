//! In-memory collaborators.
//!
//! Deterministic stand-ins for the external services, used by the CLI and the
//! test suites. Each can be told to fail or to stall for a fixed delay.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ExecutionOutput, ExecutionRequest, Executor, GraphSink, InputSource, Record, Scorer};
use crate::error::CollaboratorError;
use crate::extraction::CandidateLink;
use crate::formulary::Measurements;

async fn stall(delay: Option<Duration>) {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

/// Input source returning a fixed list of records.
pub struct StaticSource {
    records: Vec<Record>,
    failure: Option<CollaboratorError>,
    delay: Option<Duration>,
    queries: RwLock<Vec<String>>,
}

impl StaticSource {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            failure: None,
            delay: None,
            queries: RwLock::new(Vec::new()),
        }
    }

    /// Source whose every fetch fails with `error`.
    pub fn failing(error: CollaboratorError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new(Vec::new())
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queries received so far.
    pub async fn queries(&self) -> Vec<String> {
        self.queries.read().await.clone()
    }
}

#[async_trait]
impl InputSource for StaticSource {
    async fn fetch(&self, query: &str) -> Result<Vec<Record>, CollaboratorError> {
        self.queries.write().await.push(query.to_string());
        stall(self.delay).await;

        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(self.records.clone()),
        }
    }
}

/// Executor that pretends to train and writes nothing.
///
/// Artifacts are reported at `artifacts/<job_id>/adapter_model.safetensors`.
#[derive(Default)]
pub struct ScriptedExecutor {
    failure: Option<CollaboratorError>,
    delay: Option<Duration>,
    executed: RwLock<Vec<uuid::Uuid>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: CollaboratorError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Jobs executed so far.
    pub async fn executed(&self) -> Vec<uuid::Uuid> {
        self.executed.read().await.clone()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutput, CollaboratorError> {
        self.executed.write().await.push(request.job_id);
        stall(self.delay).await;

        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let config = &request.config;
        let mut log_lines = vec![format!(
            "Loading base model {} (LoRA r={}, alpha={}, lr={})",
            config.base_model, config.lora_r, config.lora_alpha, config.learning_rate
        )];
        log_lines.extend(
            (1..=config.epochs)
                .map(|epoch| format!("Epoch {}/{} complete", epoch, config.epochs)),
        );
        log_lines.push(format!(
            "Trained on {} examples",
            request.dataset.record_count()
        ));

        Ok(ExecutionOutput {
            location: format!("artifacts/{}/adapter_model.safetensors", request.job_id),
            log_lines,
        })
    }
}

/// Scorer returning the same measurements for every artifact.
pub struct FixedScorer {
    measurements: Measurements,
    failure: Option<CollaboratorError>,
    delay: Option<Duration>,
}

impl FixedScorer {
    pub fn new(measurements: Measurements) -> Self {
        Self {
            measurements,
            failure: None,
            delay: None,
        }
    }

    pub fn failing(error: CollaboratorError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new(Measurements::new())
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Scorer for FixedScorer {
    async fn score(&self, _location: &str) -> Result<Measurements, CollaboratorError> {
        stall(self.delay).await;
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(self.measurements.clone()),
        }
    }
}

/// Graph store held in memory.
#[derive(Default)]
pub struct MemoryGraphSink {
    links: RwLock<Vec<CandidateLink>>,
    failure: Option<CollaboratorError>,
}

impl MemoryGraphSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: CollaboratorError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    pub async fn links(&self) -> Vec<CandidateLink> {
        self.links.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.links.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.links.read().await.is_empty()
    }

    /// Links reachable from `node` within `depth` hops, in either direction.
    ///
    /// Breadth-first; each link is returned once.
    pub async fn neighborhood(&self, node: &str, depth: usize) -> Vec<CandidateLink> {
        let links = self.links.read().await;

        let mut visited: HashSet<&str> = HashSet::from([node]);
        let mut frontier: VecDeque<(&str, usize)> = VecDeque::from([(node, 0)]);
        let mut included: HashSet<uuid::Uuid> = HashSet::new();
        let mut result = Vec::new();

        while let Some((current, distance)) = frontier.pop_front() {
            if distance >= depth {
                continue;
            }

            for link in links.iter() {
                let neighbor = if link.subject == current {
                    link.object.as_str()
                } else if link.object == current {
                    link.subject.as_str()
                } else {
                    continue;
                };

                if included.insert(link.id) {
                    result.push(link.clone());
                }
                if visited.insert(neighbor) {
                    frontier.push_back((neighbor, distance + 1));
                }
            }
        }

        result
    }
}

#[async_trait]
impl GraphSink for MemoryGraphSink {
    async fn insert(&self, link: &CandidateLink) -> Result<(), CollaboratorError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        tracing::debug!(
            subject = %link.subject,
            relation = %link.relation,
            object = %link.object,
            "Link stored"
        );
        self.links.write().await.push(link.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::RelationType;
    use crate::formulary::Evidence;
    use crate::manifest::{EntityType, FineTuneConfig, SourceDocument};
    use crate::pipeline::dataset::PreparedDataset;

    fn link(subject: &str, object: &str) -> CandidateLink {
        let doc = SourceDocument::new(subject, EntityType::CodeCommit, "");
        CandidateLink::new(
            &doc,
            RelationType::References,
            object,
            EntityType::Vulnerability,
            vec![Evidence::regex(1.0)],
        )
    }

    #[tokio::test]
    async fn test_static_source_records_queries() {
        let source = StaticSource::new(vec![Record::new("a"), Record::new("b")]);
        let records = source.fetch("recent error logs").await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(source.queries().await, vec!["recent error logs".to_string()]);
    }

    #[tokio::test]
    async fn test_failing_source() {
        let source = StaticSource::failing(CollaboratorError::Unavailable("db down".to_string()));
        assert_eq!(
            source.fetch("q").await.unwrap_err(),
            CollaboratorError::Unavailable("db down".to_string())
        );
    }

    #[tokio::test]
    async fn test_scripted_executor_output() {
        let executor = ScriptedExecutor::new();
        let dataset = PreparedDataset::from_records(&[Record::new("x")]).unwrap();
        let request = ExecutionRequest {
            job_id: uuid::Uuid::new_v4(),
            config: FineTuneConfig::default().with_epochs(2),
            dataset,
        };

        let output = executor.execute(&request).await.unwrap();
        assert!(output.location.contains(&request.job_id.to_string()));
        assert!(output.location.ends_with("adapter_model.safetensors"));
        assert!(output.log_lines.iter().any(|l| l == "Epoch 2/2 complete"));
        assert_eq!(executor.executed().await, vec![request.job_id]);
    }

    #[tokio::test]
    async fn test_neighborhood_depths() {
        let sink = MemoryGraphSink::new();
        sink.insert(&link("commit-a", "vuln-1")).await.unwrap();
        sink.insert(&link("commit-b", "vuln-1")).await.unwrap();
        sink.insert(&link("commit-b", "vuln-2")).await.unwrap();
        sink.insert(&link("commit-c", "vuln-9")).await.unwrap();

        assert!(sink.neighborhood("commit-a", 0).await.is_empty());
        assert_eq!(sink.neighborhood("commit-a", 1).await.len(), 1);
        assert_eq!(sink.neighborhood("commit-a", 2).await.len(), 2);
        assert_eq!(sink.neighborhood("commit-a", 3).await.len(), 3);
        assert_eq!(sink.neighborhood("commit-a", 10).await.len(), 3);
        assert!(sink.neighborhood("unknown", 5).await.is_empty());
        assert_eq!(sink.len().await, 4);
    }

    #[tokio::test]
    async fn test_failing_sink_stores_nothing() {
        let sink = MemoryGraphSink::failing(CollaboratorError::Failed("write refused".to_string()));
        assert!(sink.insert(&link("a", "b")).await.is_err());
        assert!(sink.is_empty().await);
    }
}
