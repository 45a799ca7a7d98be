//! curator: policy-gated artifact pipeline.
//!
//! This library decides whether machine-produced artifacts are promoted:
//! fine-tuned model adapters are promoted on return on investment, and
//! extracted knowledge-graph links are accepted on evidence confidence.

// Core modules
pub mod cli;
pub mod collaborators;
pub mod error;
pub mod extraction;
pub mod formulary;
pub mod gate;
pub mod manifest;
pub mod metrics;
pub mod pipeline;
pub mod registry;

// Re-export commonly used error types
pub use error::{CollaboratorError, FormularyError, RegistryError, ValidationError};
