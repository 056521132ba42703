//! Error taxonomy for the bioflow pipeline.
//!
//! Only source-level and configuration failures surface here. Per-record
//! problems (validation failures, malformed lines) are recovered by
//! exclusion inside the ingestion and validation layers and never become
//! a [`PipelineError`].
use thiserror::Error;

/// All errors produced by the pipeline library.
#[derive(Error, Debug)]
pub enum PipelineError {
    // ---
    /// A configuration value or source identifier was rejected before any
    /// ingestion was attempted.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A source could not be read. Fatal for the current invocation.
    #[error("Ingestion failed for '{source_id}' during {operation}: {detail}")]
    Ingestion {
        source_id: String,
        operation: String,
        detail: String,
    },
}

impl PipelineError {
    // ---
    pub(crate) fn ingestion(
        source_id: impl Into<String>,
        operation: impl Into<String>,
        detail: impl ToString,
    ) -> Self {
        // ---
        PipelineError::Ingestion {
            source_id: source_id.into(),
            operation: operation.into(),
            detail: detail.to_string(),
        }
    }

    pub(crate) fn config(detail: impl Into<String>) -> Self {
        PipelineError::Configuration(detail.into())
    }

    /// True for errors raised before ingestion started.
    pub fn is_configuration(&self) -> bool {
        matches!(self, PipelineError::Configuration(_))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_ingestion_display_names_source_and_operation() {
        // ---
        let err = PipelineError::ingestion("s3://bucket/readings.jsonl", "get_object", "timed out");
        let msg = err.to_string();
        assert_eq!(
            msg,
            "Ingestion failed for 's3://bucket/readings.jsonl' during get_object: timed out"
        );
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_configuration_display() {
        // ---
        let err = PipelineError::config("chunk_size must be greater than 0");
        assert_eq!(
            err.to_string(),
            "Configuration error: chunk_size must be greater than 0"
        );
        assert!(err.is_configuration());
    }
}
