//! Pipeline orchestration for gated artifact promotion.
//!
//! This module ties the formulary, the policy gate and the registry together
//! around the injected collaborators.
//!
//! # Architecture
//!
//! - **Orchestrator**: the [`Curator`], which drives one request end to end
//! - **Context**: per-run stage timeout and cancellation
//! - **Dataset**: conversion of input records into a JSONL training set
//! - **Report**: the immutable outcome of every run
//! - **Config**: formulary weights, baseline, default thresholds
//!
//! # Pipeline Flow
//!
//! For a fine-tune request:
//!
//! 1. **Validation**: the manifest is checked; malformed requests are rejected
//! 2. **Preparing input**: records are fetched and converted to a dataset
//! 3. **Running**: the executor trains and reports an artifact location
//! 4. **Costing**: the job's cost is derived from its effort parameters
//! 5. **Benchmarking**: the scorer measures the artifact
//! 6. **Scoring and gating**: ROI is compared against `minRoi`; the artifact
//!    is promoted to production or deprecated
//!
//! For a relation-extraction request, candidate links are extracted from the
//! source document, each is scored and gated against `minLinkConfidence`, and
//! accepted links are written to the graph sink.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use curator::manifest::{FineTuneConfig, Manifest};
//! use curator::pipeline::{Collaborators, Curator, PipelineConfig};
//! use curator::registry::Registry;
//!
//! let curator = Curator::new(PipelineConfig::from_env()?, Arc::new(Registry::new()), collaborators)?;
//!
//! let manifest = Manifest::fine_tune("LID-1", FineTuneConfig::default().with_epochs(1))
//!     .with_threshold("minRoi", 0.10);
//!
//! let report = curator.run_pipeline(&manifest).await?;
//! println!("{}", report.summary);
//! ```

pub mod config;
pub mod context;
pub mod dataset;
pub mod orchestrator;
pub mod report;

// Re-export main types for convenience
pub use config::{ConfigError, PipelineConfig};
pub use context::{CancelHandle, RunContext};
pub use dataset::{DatasetLine, PreparedDataset, DEFAULT_INSTRUCTION};
pub use orchestrator::{Collaborators, Curator, CuratorStats, PipelineError};
pub use report::{FailureKind, FinalState, LinkOutcome, Report, Stage, StageFailure, Subject};
