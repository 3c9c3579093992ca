//! Health Lens - Analysis engine for personal wellness-data exports
//!
//! Health Lens turns a wellness export (archive, directory or single file)
//! into daily metrics and statistics through a deterministic pipeline:
//! source resolution → streaming ingestion → metric derivation → daily
//! aggregation → correlation.
//!
//! ## Modules
//!
//! - **Ingestion**: locate export files and stream their records into a store
//! - **Metrics**: steps, heart rate, resting heart rate, sleep and stress per day
//! - **ECG**: parse exported electrocardiogram signal files
//! - **Correlation**: Pearson, Spearman, regression and normality between two metrics

pub mod alias;
pub mod config;
pub mod correlation;
pub mod ecg;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod source;
pub mod stats;
pub mod store;
pub mod summary;
pub mod text;
pub mod timestamp;
pub mod types;

pub use config::LensConfig;
pub use error::LensError;
pub use metrics::MetricSelector;
pub use pipeline::{correlate_export, summarize_export, AnalysisSession};
pub use summary::HealthSummary;
pub use types::{CanonicalMetric, CorrelationResult, EcgRecord, RawRecord};

/// Health Lens version
pub const LENS_VERSION: &str = env!("CARGO_PKG_VERSION");
