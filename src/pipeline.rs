//! Pipeline orchestration.
//!
//! Two entry points:
//! - [`process_data`] aggregates an in-memory batch into one [`ResultMap`].
//! - [`Pipeline::process_pipeline`] resolves a source and returns a
//!   [`ResultStream`] that pulls one chunk at a time, validates it, and yields
//!   one chunk-scoped [`ResultMap`]. Aggregation state resets per chunk;
//!   [`ResultStream::merged`] folds the per-chunk aggregates into a single map
//!   for the whole source instead.
//!
//! Per invocation the pipeline moves `Start → SelectSource → Streaming →
//! Done`, or to `Failed` on an unrecoverable ingestion error. Maps already
//! yielded before a failure stay valid.

use std::str::FromStr;

use crate::aggregation::Aggregator;
use crate::config::Config;
use crate::error::Result;
use crate::ingestion::{IngestionSource, ObjectStorageConfig};
use crate::models::{RawReading, ResultMap};
use crate::validation::{filter_chunk, validate};

// ---

/// Whether results are emitted per chunk or merged across the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationMode {
    #[default]
    PerChunk,
    Cumulative,
}

impl FromStr for AggregationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        // ---
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "per_chunk" | "chunk" => Ok(AggregationMode::PerChunk),
            "cumulative" | "merged" => Ok(AggregationMode::Cumulative),
            other => Err(format!("unknown aggregation mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    SelectSource,
    Streaming,
    Done,
    Failed,
}

/// Validate and aggregate an already-materialized batch of readings.
pub fn process_data(readings: &[RawReading]) -> ResultMap {
    // ---
    let mut aggregator = Aggregator::new();
    for reading in readings {
        if let Some(valid) = validate(reading) {
            aggregator.fold(&valid);
        }
    }
    aggregator.results()
}

/// Stream per-chunk results from a file path or `http(s)://` URL using the
/// default configuration with the given chunk size.
pub fn process_pipeline(source: &str, chunk_size: usize) -> Result<ResultStream> {
    Pipeline::new(Config::default().with_chunk_size(chunk_size))?.process_pipeline(source)
}

/// Orchestrator bound to one configuration snapshot.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    // ---
    /// Fails fast on invalid configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Pipeline { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve `source` to a file or API ingestion variant and stream results.
    pub fn process_pipeline(&self, source: &str) -> Result<ResultStream> {
        self.open(|config| IngestionSource::from_identifier(source, config))
    }

    /// Stream results from an explicit bucket/key target.
    pub fn process_object_storage(&self, target: ObjectStorageConfig) -> Result<ResultStream> {
        self.open(|config| IngestionSource::object_storage(target, config))
    }

    /// Aggregate a whole file/API source into one map.
    pub async fn process_pipeline_merged(&self, source: &str) -> Result<ResultMap> {
        self.process_pipeline(source)?.merged().await
    }

    fn open<F>(&self, select: F) -> Result<ResultStream>
    where
        F: FnOnce(&Config) -> Result<IngestionSource>,
    {
        // ---
        log_transition(PipelineState::Start, PipelineState::SelectSource);
        match select(&self.config) {
            Ok(source) => {
                tracing::info!(
                    "Selected {:?} source {} (chunk_size={})",
                    source.kind(),
                    source.source_id(),
                    self.config.chunk_size
                );
                log_transition(PipelineState::SelectSource, PipelineState::Streaming);
                Ok(ResultStream::new(source))
            }
            Err(e) => {
                log_transition(PipelineState::SelectSource, PipelineState::Failed);
                tracing::error!("Source selection failed: {}", e);
                Err(e)
            }
        }
    }
}

/// Lazy, single-pass sequence of per-chunk results.
///
/// Nothing is read until the first pull, and each pull reads exactly one
/// chunk. After the end of the source or an error, further pulls return
/// `Ok(None)`.
pub struct ResultStream {
    // ---
    source: IngestionSource,
    state: PipelineState,
    chunks: usize,
    readings_total: usize,
    readings_valid: usize,
}

impl ResultStream {
    // ---
    pub fn new(source: IngestionSource) -> Self {
        ResultStream {
            source,
            state: PipelineState::Streaming,
            chunks: 0,
            readings_total: 0,
            readings_valid: 0,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn source_id(&self) -> String {
        self.source.source_id()
    }

    /// Number of chunks processed so far.
    pub fn chunks_processed(&self) -> usize {
        self.chunks
    }

    /// Pull one chunk and return its aggregate state.
    pub async fn next_aggregate(&mut self) -> Result<Option<Aggregator>> {
        // ---
        if self.state != PipelineState::Streaming {
            return Ok(None);
        }

        match self.source.next_chunk().await {
            Ok(Some(chunk)) => {
                let valid = filter_chunk(&chunk);
                let mut aggregator = Aggregator::new();
                aggregator.fold_all(&valid);

                self.chunks += 1;
                self.readings_total += chunk.len();
                self.readings_valid += valid.len();
                tracing::debug!(
                    "Chunk {} from {}: {} readings, {} valid, {} sensors",
                    self.chunks,
                    self.source.source_id(),
                    chunk.len(),
                    valid.len(),
                    aggregator.len()
                );
                Ok(Some(aggregator))
            }
            Ok(None) => {
                self.finish(PipelineState::Done);
                tracing::info!(
                    "Pipeline complete for {}: {} chunks, {} readings, {} valid",
                    self.source.source_id(),
                    self.chunks,
                    self.readings_total,
                    self.readings_valid
                );
                Ok(None)
            }
            Err(e) => {
                self.finish(PipelineState::Failed);
                tracing::error!(
                    "Pipeline failed after {} chunks: {}",
                    self.chunks,
                    e
                );
                Err(e)
            }
        }
    }

    /// Pull one chunk and return its finalized, chunk-scoped results.
    pub async fn next(&mut self) -> Result<Option<ResultMap>> {
        Ok(self.next_aggregate().await?.map(|aggregator| aggregator.results()))
    }

    /// Drain the stream into per-chunk maps.
    pub async fn collect_all(mut self) -> Result<Vec<ResultMap>> {
        // ---
        let mut maps = Vec::new();
        while let Some(map) = self.next().await? {
            maps.push(map);
        }
        Ok(maps)
    }

    /// Drain the stream, merging every chunk aggregate into one map.
    pub async fn merged(mut self) -> Result<ResultMap> {
        // ---
        let mut total = Aggregator::new();
        while let Some(aggregator) = self.next_aggregate().await? {
            total.merge(&aggregator);
        }
        Ok(total.results())
    }

    fn finish(&mut self, state: PipelineState) {
        log_transition(self.state, state);
        self.state = state;
    }
}

fn log_transition(from: PipelineState, to: PipelineState) {
    tracing::debug!("Pipeline state {:?} -> {:?}", from, to);
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    fn mock_input_readings() -> Vec<RawReading> {
        // ---
        [
            json!({"sensor_id": "BioR1", "timestamp": "2025-08-16 14:00", "ph_value": 7.2, "temperature": 37.5}),
            // Anomaly: high temp
            json!({"sensor_id": "BioR1", "timestamp": "2025-08-16 14:30", "ph_value": 7.1, "temperature": 45.0}),
            // Invalid: negative ph
            json!({"sensor_id": "BioR2", "timestamp": "2025-08-16 14:00", "ph_value": -1.0, "temperature": 25.0}),
            // Invalid: non-numeric ph
            json!({"sensor_id": "BioR3", "timestamp": "2025-08-16 14:00", "ph_value": "invalid", "temperature": 30.0}),
            // Invalid: empty sensor_id
            json!({"sensor_id": "", "timestamp": "2025-08-16 14:00", "ph_value": 7.0, "temperature": 35.0}),
        ]
        .into_iter()
        .map(|v| serde_json::from_value(v).unwrap())
        .collect()
    }

    #[test]
    fn test_process_data_mock_input() {
        // ---
        let results = process_data(&mock_input_readings());

        assert_eq!(results.len(), 1);
        let (avg_ph, anomaly_count, latest) = results["BioR1"].to_tuple();
        assert!((avg_ph - 7.15).abs() < 1e-9);
        assert_eq!(anomaly_count, 1);
        assert_eq!(latest, "2025-08-16 14:30");
    }

    #[test]
    fn test_process_data_anomaly_bounds() {
        // ---
        let readings: Vec<RawReading> = [19.9, 20.0, 40.0, 40.1]
            .iter()
            .map(|t| RawReading::new("BioR1", "2025-08-16 14:00", 7.0, *t))
            .collect();

        assert_eq!(process_data(&readings)["BioR1"].anomaly_count, 2);
    }

    #[test]
    fn test_process_data_excludes_only_reading_of_sensor() {
        // ---
        let readings = vec![
            RawReading::new("BioR1", "2025-08-16 14:00", 7.0, 30.0),
            RawReading::new("BioR2", "2025-08-16 14:00", -1.0, 30.0),
        ];
        let results = process_data(&readings);

        assert!(results.contains_key("BioR1"));
        assert!(!results.contains_key("BioR2"));
    }

    #[test]
    fn test_process_data_empty() {
        assert!(process_data(&[]).is_empty());
    }

    #[test]
    fn test_aggregation_mode_from_str() {
        // ---
        assert_eq!("per_chunk".parse::<AggregationMode>(), Ok(AggregationMode::PerChunk));
        assert_eq!("per-chunk".parse::<AggregationMode>(), Ok(AggregationMode::PerChunk));
        assert_eq!("Cumulative".parse::<AggregationMode>(), Ok(AggregationMode::Cumulative));
        assert!("rolling".parse::<AggregationMode>().is_err());
    }

    #[test]
    fn test_zero_chunk_size_fails_fast() {
        // ---
        let err = process_pipeline("readings.jsonl", 0).err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_unrecognized_source_fails_fast() {
        // ---
        let pipeline = Pipeline::new(Config::default()).unwrap();
        let err = pipeline.process_pipeline("ftp://example.com/readings").err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_stream_starts_lazily() {
        // ---
        // Nothing is opened until the first pull, so a missing file is not
        // an error yet.
        let stream = process_pipeline("/definitely/not/here.jsonl", 10).unwrap();
        assert_eq!(stream.state(), PipelineState::Streaming);
        assert_eq!(stream.chunks_processed(), 0);
    }

    #[test]
    fn test_empty_source_completes_with_no_maps() {
        // ---
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("empty.jsonl");
        std::fs::write(&path, "\n\n").unwrap();

        let stream = process_pipeline(path.to_str().unwrap(), 10).unwrap();
        let maps = tokio_test::assert_ok!(tokio_test::block_on(stream.collect_all()));
        assert!(maps.is_empty());
    }

    #[tokio::test]
    async fn test_stream_failure_is_terminal() {
        // ---
        let mut stream = process_pipeline("/definitely/not/here.jsonl", 10).unwrap();

        let err = stream.next().await.unwrap_err();
        assert!(!err.is_configuration());
        assert_eq!(stream.state(), PipelineState::Failed);
        assert!(stream.next().await.unwrap().is_none());
    }
}
