//! Request manifests.
//!
//! A manifest identifies one unit of work: an opaque correlation id, a typed
//! task configuration (one variant per pipeline kind) and a policy block of
//! named numeric thresholds. Manifests are immutable once accepted.
//!
//! # Format
//!
//! ```yaml
//! correlationId: LID-TEST-001
//! taskConfig:
//!   kind: fineTune
//!   epochs: 1
//! policy:
//!   minRoi: 0.10
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ValidationError;

/// Default base model for fine-tune jobs.
pub const DEFAULT_BASE_MODEL: &str = "Qwen/Qwen2.5-Coder-7B-Instruct-GGUF";

const DEFAULT_EPOCHS: u32 = 3;
const DEFAULT_LEARNING_RATE: f64 = 2e-5;
const DEFAULT_LORA_R: u32 = 8;
const DEFAULT_LORA_ALPHA: u32 = 16;
const DEFAULT_MODEL_PARAMS_BILLIONS: f64 = 7.0;
const DEFAULT_DATASET_QUERY: &str = "recent error logs";

/// A request to run one pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub correlation_id: String,
    pub task_config: TaskConfig,
    #[serde(default)]
    pub policy: PolicyBlock,
}

impl Manifest {
    /// Creates a fine-tune manifest with an empty policy block.
    pub fn fine_tune(correlation_id: impl Into<String>, config: FineTuneConfig) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            task_config: TaskConfig::FineTune(config),
            policy: PolicyBlock::new(),
        }
    }

    /// Creates a relation-extraction manifest with an empty policy block.
    pub fn relation_extraction(correlation_id: impl Into<String>, document: SourceDocument) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            task_config: TaskConfig::RelationExtraction(RelationExtractionConfig { document }),
            policy: PolicyBlock::new(),
        }
    }

    /// Sets one policy threshold.
    pub fn with_threshold(mut self, name: impl Into<String>, value: f64) -> Self {
        self.policy = self.policy.with_threshold(name, value);
        self
    }

    /// Parses and validates a JSON manifest.
    pub fn from_json(content: &str) -> Result<Self, ValidationError> {
        let manifest: Self = serde_json::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parses and validates a YAML manifest.
    pub fn from_yaml(content: &str) -> Result<Self, ValidationError> {
        let manifest: Self = serde_yaml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Loads a manifest file, choosing the parser from its extension.
    pub fn from_file(path: &Path) -> Result<Self, ValidationError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let content = std::fs::read_to_string(path)?;
        match extension.as_str() {
            "json" => Self::from_json(&content),
            "yaml" | "yml" => Self::from_yaml(&content),
            other => Err(ValidationError::UnsupportedFormat(format!(
                "{} (extension '{}')",
                path.display(),
                other
            ))),
        }
    }

    /// Checks every field the pipeline relies on.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.correlation_id.trim().is_empty() {
            return Err(ValidationError::MissingField("correlationId".to_string()));
        }

        match &self.task_config {
            TaskConfig::FineTune(config) => config.validate()?,
            TaskConfig::RelationExtraction(config) => config.validate()?,
        }

        self.policy.validate()
    }

    /// SHA-256 hex digest of the task configuration.
    pub fn fingerprint(&self) -> String {
        self.task_config.fingerprint()
    }

    /// Short name of the pipeline variant this manifest selects.
    pub fn variant(&self) -> &'static str {
        self.task_config.variant()
    }
}

/// Task-specific configuration, one variant per pipeline kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TaskConfig {
    FineTune(FineTuneConfig),
    RelationExtraction(RelationExtractionConfig),
}

impl TaskConfig {
    pub fn variant(&self) -> &'static str {
        match self {
            TaskConfig::FineTune(_) => "fine_tune",
            TaskConfig::RelationExtraction(_) => "relation_extraction",
        }
    }

    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        hex::encode(hasher.finalize())
    }
}

/// Parameters of a fine-tune job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FineTuneConfig {
    #[serde(default = "default_epochs")]
    pub epochs: u32,
    #[serde(default = "default_base_model")]
    pub base_model: String,
    #[serde(default = "default_dataset_query")]
    pub dataset_query: String,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_lora_r")]
    pub lora_r: u32,
    #[serde(default = "default_lora_alpha")]
    pub lora_alpha: u32,
    #[serde(default = "default_model_params_billions")]
    pub model_params_billions: f64,
}

impl Default for FineTuneConfig {
    fn default() -> Self {
        Self {
            epochs: DEFAULT_EPOCHS,
            base_model: DEFAULT_BASE_MODEL.to_string(),
            dataset_query: DEFAULT_DATASET_QUERY.to_string(),
            learning_rate: DEFAULT_LEARNING_RATE,
            lora_r: DEFAULT_LORA_R,
            lora_alpha: DEFAULT_LORA_ALPHA,
            model_params_billions: DEFAULT_MODEL_PARAMS_BILLIONS,
        }
    }
}

impl FineTuneConfig {
    pub fn with_epochs(mut self, epochs: u32) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_dataset_query(mut self, query: impl Into<String>) -> Self {
        self.dataset_query = query.into();
        self
    }

    pub fn with_base_model(mut self, model: impl Into<String>) -> Self {
        self.base_model = model.into();
        self
    }

    pub fn with_model_params_billions(mut self, params: f64) -> Self {
        self.model_params_billions = params;
        self
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.epochs == 0 {
            return Err(ValidationError::invalid("taskConfig.epochs", "must be at least 1"));
        }
        if self.base_model.trim().is_empty() {
            return Err(ValidationError::MissingField("taskConfig.baseModel".to_string()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ValidationError::invalid(
                "taskConfig.learningRate",
                format!("must be a positive number, got {}", self.learning_rate),
            ));
        }
        if self.lora_r == 0 {
            return Err(ValidationError::invalid("taskConfig.loraR", "must be at least 1"));
        }
        if !(self.model_params_billions.is_finite() && self.model_params_billions > 0.0) {
            return Err(ValidationError::invalid(
                "taskConfig.modelParamsBillions",
                format!("must be a positive number, got {}", self.model_params_billions),
            ));
        }
        Ok(())
    }
}

fn default_epochs() -> u32 {
    DEFAULT_EPOCHS
}

fn default_base_model() -> String {
    DEFAULT_BASE_MODEL.to_string()
}

fn default_dataset_query() -> String {
    DEFAULT_DATASET_QUERY.to_string()
}

fn default_learning_rate() -> f64 {
    DEFAULT_LEARNING_RATE
}

fn default_lora_r() -> u32 {
    DEFAULT_LORA_R
}

fn default_lora_alpha() -> u32 {
    DEFAULT_LORA_ALPHA
}

fn default_model_params_billions() -> f64 {
    DEFAULT_MODEL_PARAMS_BILLIONS
}

/// Parameters of a relation-extraction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationExtractionConfig {
    pub document: SourceDocument,
}

impl RelationExtractionConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.document.doc_id.trim().is_empty() {
            return Err(ValidationError::MissingField(
                "taskConfig.document.docId".to_string(),
            ));
        }
        Ok(())
    }
}

/// Category of a document or of an identifier found in one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    #[serde(alias = "VULNERABILITY_REPORT")]
    Vulnerability,
    CodeCommit,
    PatchProposal,
    #[serde(other)]
    Document,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityType::Vulnerability => write!(f, "VULNERABILITY"),
            EntityType::CodeCommit => write!(f, "CODE_COMMIT"),
            EntityType::PatchProposal => write!(f, "PATCH_PROPOSAL"),
            EntityType::Document => write!(f, "DOCUMENT"),
        }
    }
}

/// A source document scanned for relations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDocument {
    pub doc_id: String,
    #[serde(default = "default_entity_type")]
    pub entity_type: EntityType,
    #[serde(default)]
    pub content: String,
}

impl SourceDocument {
    pub fn new(doc_id: impl Into<String>, entity_type: EntityType, content: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            entity_type,
            content: content.into(),
        }
    }
}

fn default_entity_type() -> EntityType {
    EntityType::Document
}

/// Named numeric thresholds parameterizing the gate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyBlock {
    thresholds: BTreeMap<String, f64>,
}

impl PolicyBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(mut self, name: impl Into<String>, value: f64) -> Self {
        self.thresholds.insert(name.into(), value);
        self
    }

    pub fn threshold(&self, name: &str) -> Option<f64> {
        self.thresholds.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.thresholds.iter()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        for (name, value) in &self.thresholds {
            if !value.is_finite() {
                return Err(ValidationError::invalid(
                    &format!("policy.{}", name),
                    format!("threshold must be finite, got {}", value),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fine_tune_yaml_with_defaults() {
        let yaml = r#"
correlationId: LID-TEST-001
taskConfig:
  kind: fineTune
  epochs: 1
policy:
  minRoi: 0.10
"#;
        let manifest = Manifest::from_yaml(yaml).unwrap();
        assert_eq!(manifest.correlation_id, "LID-TEST-001");
        assert_eq!(manifest.policy.threshold("minRoi"), Some(0.10));
        assert_eq!(manifest.variant(), "fine_tune");

        match &manifest.task_config {
            TaskConfig::FineTune(config) => {
                assert_eq!(config.epochs, 1);
                assert_eq!(config.base_model, DEFAULT_BASE_MODEL);
                assert_eq!(config.lora_r, 8);
                assert_eq!(config.lora_alpha, 16);
                assert_eq!(config.model_params_billions, 7.0);
            }
            other => panic!("unexpected task config: {:?}", other),
        }
    }

    #[test]
    fn test_parse_relation_extraction_json() {
        let json = r#"{
            "correlationId": "weave-1",
            "taskConfig": {
                "kind": "relationExtraction",
                "document": {
                    "docId": "commit-f0e1d2c",
                    "entityType": "CODE_COMMIT",
                    "content": "Fixes vuln-a1b2c3d4"
                }
            },
            "policy": { "minLinkConfidence": 0.8 }
        }"#;
        let manifest = Manifest::from_json(json).unwrap();

        match &manifest.task_config {
            TaskConfig::RelationExtraction(config) => {
                assert_eq!(config.document.doc_id, "commit-f0e1d2c");
                assert_eq!(config.document.entity_type, EntityType::CodeCommit);
            }
            other => panic!("unexpected task config: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_entity_type_is_document() {
        let json = r#"{"docId": "x", "entityType": "RUNBOOK", "content": ""}"#;
        let doc: SourceDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.entity_type, EntityType::Document);
    }

    #[test]
    fn test_vulnerability_report_alias() {
        let json = r#"{"docId": "vuln-a1b2c3d4", "entityType": "VULNERABILITY_REPORT", "content": ""}"#;
        let doc: SourceDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.entity_type, EntityType::Vulnerability);
        assert_eq!(doc.entity_type.to_string(), "VULNERABILITY");
    }

    #[test]
    fn test_missing_correlation_id_rejected() {
        let json = r#"{"taskConfig": {"kind": "fineTune"}}"#;
        let err = Manifest::from_json(json).unwrap_err();
        assert!(matches!(err, ValidationError::MissingField(ref f) if f == "correlationId"));
    }

    #[test]
    fn test_zero_epochs_rejected() {
        let manifest = Manifest::fine_tune("c", FineTuneConfig::default().with_epochs(0));
        let err = manifest.validate().unwrap_err();
        assert!(err.to_string().contains("epochs"));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let json = r#"{"correlationId": "c", "taskConfig": {"kind": "distill"}}"#;
        assert!(matches!(Manifest::from_json(json), Err(ValidationError::Json(_))));
    }

    #[test]
    fn test_non_finite_threshold_rejected() {
        let yaml = "correlationId: c\ntaskConfig:\n  kind: fineTune\npolicy:\n  minRoi: .nan\n";
        let err = Manifest::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("policy.minRoi"));
    }

    #[test]
    fn test_empty_doc_id_rejected() {
        let manifest = Manifest::relation_extraction("c", SourceDocument::new(" ", EntityType::Document, "text"));
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_fingerprint_depends_only_on_task_config() {
        let a = Manifest::fine_tune("one", FineTuneConfig::default()).with_threshold("minRoi", 0.1);
        let b = Manifest::fine_tune("two", FineTuneConfig::default()).with_threshold("minRoi", 0.9);
        let c = Manifest::fine_tune("one", FineTuneConfig::default().with_epochs(5));

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_from_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let yaml_path = dir.path().join("manifest.yml");
        std::fs::write(&yaml_path, "correlationId: c\ntaskConfig:\n  kind: fineTune\n").unwrap();
        assert!(Manifest::from_file(&yaml_path).is_ok());

        let txt_path = dir.path().join("manifest.txt");
        std::fs::write(&txt_path, "whatever").unwrap();
        assert!(matches!(
            Manifest::from_file(&txt_path),
            Err(ValidationError::UnsupportedFormat(_))
        ));
    }
}
