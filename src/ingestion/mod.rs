//! Ingestion gateway.
//!
//! Each source kind lives in its own sibling module; this gateway exposes
//! [`IngestionSource`], the tagged variant the pipeline pulls chunks from, and
//! the factory that picks a variant from a source identifier. Object storage
//! is never auto-detected: bucket/key addressing goes through
//! [`IngestionSource::object_storage`].

use std::path::PathBuf;

use reqwest::Url;

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::models::Chunk;

mod api;
mod file;
mod format;
mod object_storage;
mod retry;

pub use api::{ApiSettings, ApiSource, Pagination};
pub use file::FileSource;
pub use format::{parse_payload, ParsedRecords, RecordFormat};
pub use object_storage::{ObjectStorageConfig, ObjectStorageSource, EMULATOR_ENDPOINT};
pub use retry::{Exhausted, Failure, RetryPolicy};

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    File,
    Api,
    ObjectStorage,
}

/// A chunk producer for one source. Single pass: once a variant returns
/// `Ok(None)` or an error it stays exhausted.
pub enum IngestionSource {
    File(FileSource),
    Api(ApiSource),
    ObjectStorage(ObjectStorageSource),
}

impl IngestionSource {
    // ---
    /// Select the variant for a file path or `http(s)://` URL.
    pub fn from_identifier(identifier: &str, config: &Config) -> Result<Self> {
        // ---
        config.validate()?;
        match resolve_identifier(identifier)? {
            Resolved::Url(url) => Ok(IngestionSource::Api(ApiSource::new(
                url.as_str(),
                config.chunk_size,
                config.api_settings(),
            )?)),
            Resolved::Path(path) => Ok(IngestionSource::File(FileSource::new(
                path,
                config.chunk_size,
            ))),
        }
    }

    /// Build the object-storage variant from an explicit bucket/key target.
    pub fn object_storage(target: ObjectStorageConfig, config: &Config) -> Result<Self> {
        // ---
        config.validate()?;
        Ok(IngestionSource::ObjectStorage(ObjectStorageSource::new(
            target,
            config.chunk_size,
            config.api_timeout(),
            config.retry_policy(),
        )?))
    }

    pub fn kind(&self) -> SourceKind {
        // ---
        match self {
            IngestionSource::File(_) => SourceKind::File,
            IngestionSource::Api(_) => SourceKind::Api,
            IngestionSource::ObjectStorage(_) => SourceKind::ObjectStorage,
        }
    }

    pub fn source_id(&self) -> String {
        // ---
        match self {
            IngestionSource::File(source) => source.source_id(),
            IngestionSource::Api(source) => source.source_id(),
            IngestionSource::ObjectStorage(source) => source.source_id(),
        }
    }

    /// Pull the next chunk; `Ok(None)` at end of source.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        // ---
        match self {
            IngestionSource::File(source) => source.next_chunk().await,
            IngestionSource::Api(source) => source.next_chunk().await,
            IngestionSource::ObjectStorage(source) => source.next_chunk().await,
        }
    }
}

impl ObjectStorageConfig {
    /// Lazy chunk sequence over the target object. Nothing is downloaded
    /// until the first `next_chunk()`.
    pub fn ingest(self, config: &Config) -> Result<IngestionSource> {
        IngestionSource::object_storage(self, config)
    }
}

/// Classify an identifier without building a source.
pub fn detect_source_kind(identifier: &str) -> Result<SourceKind> {
    // ---
    match resolve_identifier(identifier)? {
        Resolved::Url(_) => Ok(SourceKind::Api),
        Resolved::Path(_) => Ok(SourceKind::File),
    }
}

enum Resolved {
    Url(Url),
    Path(PathBuf),
}

fn resolve_identifier(identifier: &str) -> Result<Resolved> {
    // ---
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::config("source identifier is empty"));
    }

    let lower = trimmed.to_ascii_lowercase();
    let looks_like_http = lower.starts_with("http://") || lower.starts_with("https://");

    match Url::parse(trimmed) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(Resolved::Url(url)),
            "file" => url
                .to_file_path()
                .map(Resolved::Path)
                .map_err(|_| PipelineError::config(format!("invalid file URL '{}'", trimmed))),
            // Single-letter schemes are Windows drive letters, e.g. `C:\data`.
            scheme if scheme.len() == 1 => Ok(Resolved::Path(PathBuf::from(trimmed))),
            scheme => Err(PipelineError::config(format!(
                "unrecognized source scheme '{}' in '{}'",
                scheme, trimmed
            ))),
        },
        Err(e) if looks_like_http => Err(PipelineError::config(format!(
            "malformed URL '{}': {}",
            trimmed, e
        ))),
        Err(_) => Ok(Resolved::Path(PathBuf::from(trimmed))),
    }
}

/// Take up to `size` items; `None` when the iterator is already empty.
pub(crate) fn take_chunk<T>(items: &mut impl Iterator<Item = T>, size: usize) -> Option<Vec<T>> {
    // ---
    let chunk: Vec<T> = items.by_ref().take(size).collect();
    (!chunk.is_empty()).then_some(chunk)
}
