//! Bioreactor sensor ingestion and aggregation.
//!
//! Readings arrive from a local file, an HTTP API or an S3-compatible object
//! store, are validated record by record, and are folded into per-sensor
//! statistics (mean pH, temperature anomaly count, latest timestamp) one
//! bounded chunk at a time.
//!
//! Module boundaries follow the Explicit Module Boundary Pattern (EMBP): each
//! module exposes a small surface, and everything callers need is re-exported
//! here so the binary and tests do not reach into submodules.

pub mod aggregation;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod models;
pub mod pipeline;
pub mod validation;

pub use aggregation::{Aggregator, SensorAggregate};
pub use config::{load_from_env, Config, DEFAULT_CHUNK_SIZE};
pub use error::{PipelineError, Result};
pub use ingestion::{
    detect_source_kind, IngestionSource, ObjectStorageConfig, Pagination, SourceKind,
};
pub use models::{Chunk, RawReading, ResultMap, SensorResult, ValidatedReading};
pub use pipeline::{
    process_data, process_pipeline, AggregationMode, Pipeline, PipelineState, ResultStream,
};
pub use validation::is_valid;
