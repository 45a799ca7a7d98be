//! Error types for curator operations.
//!
//! Defines the error kinds shared across subsystems:
//! - Manifest intake and validation
//! - Formulary domain violations
//! - External collaborator failures
//! - Registry and lifecycle operations

use thiserror::Error;

/// Errors raised while accepting a manifest. No job exists yet when these occur.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Unsupported manifest format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ValidationError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Formulary invariant violations (the domain error kind).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormularyError {
    #[error("ROI is undefined for a zero cost and the unbounded sentinel was not requested")]
    ZeroCost,

    #[error("Cost must be non-negative, got {0}")]
    NegativeCost(f64),

    #[error("Non-finite {quantity}: {value}")]
    NonFinite { quantity: String, value: f64 },
}

/// Errors reported by external collaborators (input source, executor, scorer, graph sink).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollaboratorError {
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("Collaborator call failed: {0}")]
    Failed(String),

    #[error("Invalid collaborator response: {0}")]
    InvalidResponse(String),
}

/// Errors that can occur during registry and lifecycle operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Job '{0}' not found in registry")]
    JobNotFound(String),

    #[error("Artifact '{0}' not found in registry")]
    ArtifactNotFound(String),

    #[error("Job '{0}' already exists in registry")]
    DuplicateJob(String),

    #[error("Artifact '{0}' already exists in registry")]
    DuplicateArtifact(String),

    #[error("Invalid state transition from '{from}' to '{to}': {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Transition requirements not met: {0}")]
    RequirementsNotMet(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
