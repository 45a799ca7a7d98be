//! Metrics module for Prometheus-based monitoring.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use curator::metrics::{CuratorMetrics, MetricsCollector};
//!
//! let metrics = Arc::new(CuratorMetrics::new()?);
//! let collector = MetricsCollector::new(Arc::clone(&metrics));
//!
//! collector.record_run("fine_tune", "promoted");
//! println!("{}", metrics.export());
//! ```

pub mod collectors;
pub mod prometheus;

pub use self::collectors::MetricsCollector;
pub use self::prometheus::CuratorMetrics;
