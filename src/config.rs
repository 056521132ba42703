//! Configuration loader for the `bioflow` pipeline.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Values are threaded explicitly into the pipeline
//! and ingestion constructors; nothing here is process-wide mutable state.
//!
use std::env;
use std::time::Duration;

use crate::error::{PipelineError, Result};
use crate::ingestion::{ApiSettings, ObjectStorageConfig, Pagination, RetryPolicy, EMULATOR_ENDPOINT};
use crate::pipeline::AggregationMode;

/// Default number of readings per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Parse an optional environment variable into `$ty`, falling back to a default.
macro_rules! parse_var {
    ($lookup:expr, $var_name:expr, $ty:ty, $default:expr) => {
        $lookup($var_name)
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| PipelineError::config(format!("Invalid {}: {}", $var_name, e)))?
            .unwrap_or($default)
    };
}

/// Parse an optional boolean flag (`1|true|yes` / `0|false|no`).
macro_rules! parse_flag {
    ($lookup:expr, $var_name:expr) => {
        match $lookup($var_name).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            None | Some("0") | Some("false") | Some("no") => false,
            Some("1") | Some("true") | Some("yes") => true,
            Some(other) => {
                return Err(PipelineError::config(format!(
                    "Invalid {}: expected true/false, got '{}'",
                    $var_name, other
                )))
            }
        }
    };
}

/// Strongly typed pipeline configuration.
///
/// All fields are plain values so a snapshot can be cloned into each
/// pipeline invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    // ---
    /// Default source identifier (file path or `http(s)://` URL).
    pub source: Option<String>,

    /// Maximum readings per chunk. Must be greater than zero.
    pub chunk_size: usize,

    /// Per-chunk results or one merged result for the whole source.
    pub aggregation_mode: AggregationMode,

    /// How the API source requests successive pages.
    pub api_pagination: Pagination,

    /// Maximum number of API pages to fetch (safety limit).
    pub api_max_pages: u32,

    /// Per-request timeout for API and object-storage calls.
    pub api_timeout_secs: u64,

    /// Total attempts for transient network failures.
    pub retry_max_attempts: u32,

    /// First backoff delay; doubles on each further retry.
    pub retry_base_delay_ms: u64,

    /// Object-storage target, when configured.
    pub object_storage: Option<ObjectStorageConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            source: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            aggregation_mode: AggregationMode::default(),
            api_pagination: Pagination::default(),
            api_max_pages: 100,
            api_timeout_secs: 30,
            retry_max_attempts: 3,
            retry_base_delay_ms: 200,
            object_storage: None,
        }
    }
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `SENSOR_SOURCE` – default source identifier
/// - `CHUNK_SIZE` – readings per chunk (default: 1000)
/// - `AGGREGATION_MODE` – `per_chunk` or `cumulative` (default: per_chunk)
/// - `API_PAGINATION` – `none`, `page` or `cursor` (default: page)
/// - `API_MAX_PAGES` – max API pages to fetch (default: 100)
/// - `API_TIMEOUT_SECS` – request timeout (default: 30)
/// - `RETRY_MAX_ATTEMPTS` – attempts for transient failures (default: 3)
/// - `RETRY_BASE_DELAY_MS` – first backoff delay (default: 200)
/// - `S3_BUCKET`, `S3_OBJECT_KEY` – object-storage target (set both or neither)
/// - `S3_ENDPOINT_URL` – endpoint override for non-production targets
/// - `S3_USE_EMULATOR` – use the local emulator endpoint when no override is set
/// - `AWS_REGION`, `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`
///
/// Returns an error if any variable is present but invalid.
pub fn load_from_env() -> Result<Config> {
    load_with(|name| env::var(name).ok())
}

/// Load configuration through an arbitrary variable lookup. Empty values are
/// treated as unset.
pub fn load_with<F>(lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    // ---
    let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    let defaults = Config::default();

    let source = lookup("SENSOR_SOURCE");
    let chunk_size = parse_var!(lookup, "CHUNK_SIZE", usize, defaults.chunk_size);
    let aggregation_mode = parse_var!(
        lookup,
        "AGGREGATION_MODE",
        AggregationMode,
        defaults.aggregation_mode
    );
    let api_pagination = parse_var!(lookup, "API_PAGINATION", Pagination, defaults.api_pagination);
    let api_max_pages = parse_var!(lookup, "API_MAX_PAGES", u32, defaults.api_max_pages);
    let api_timeout_secs = parse_var!(lookup, "API_TIMEOUT_SECS", u64, defaults.api_timeout_secs);
    let retry_max_attempts =
        parse_var!(lookup, "RETRY_MAX_ATTEMPTS", u32, defaults.retry_max_attempts);
    let retry_base_delay_ms =
        parse_var!(lookup, "RETRY_BASE_DELAY_MS", u64, defaults.retry_base_delay_ms);

    let object_storage = match (lookup("S3_BUCKET"), lookup("S3_OBJECT_KEY")) {
        (None, None) => None,
        (Some(bucket_name), Some(object_key)) => {
            let use_emulator = parse_flag!(lookup, "S3_USE_EMULATOR");
            let endpoint_url = lookup("S3_ENDPOINT_URL")
                .or_else(|| use_emulator.then(|| EMULATOR_ENDPOINT.to_string()));

            let mut target = ObjectStorageConfig::new(bucket_name, object_key);
            target.endpoint_url = endpoint_url;
            if let Some(region) = lookup("AWS_REGION") {
                target.region = region;
            }
            if let Some(key_id) = lookup("AWS_ACCESS_KEY_ID") {
                target.access_key_id = key_id;
            }
            if let Some(secret) = lookup("AWS_SECRET_ACCESS_KEY") {
                target.secret_access_key = secret;
            }
            Some(target)
        }
        _ => {
            return Err(PipelineError::config(
                "S3_BUCKET and S3_OBJECT_KEY must be set together",
            ))
        }
    };

    let config = Config {
        source,
        chunk_size,
        aggregation_mode,
        api_pagination,
        api_max_pages,
        api_timeout_secs,
        retry_max_attempts,
        retry_base_delay_ms,
        object_storage,
    };
    config.validate()?;
    Ok(config)
}

impl Config {
    // ---
    /// Reject values that would make ingestion meaningless.
    pub fn validate(&self) -> Result<()> {
        // ---
        if self.chunk_size == 0 {
            return Err(PipelineError::config("chunk_size must be greater than 0"));
        }
        if self.retry_max_attempts == 0 {
            return Err(PipelineError::config(
                "retry_max_attempts must be at least 1",
            ));
        }
        if self.api_max_pages == 0 {
            return Err(PipelineError::config("api_max_pages must be at least 1"));
        }
        Ok(())
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    pub fn api_settings(&self) -> ApiSettings {
        // ---
        ApiSettings {
            pagination: self.api_pagination,
            max_pages: self.api_max_pages,
            timeout: self.api_timeout(),
            retry: self.retry_policy(),
        }
    }

    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks the object-storage secret while showing all other values.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  SENSOR_SOURCE       : {}", self.source.as_deref().unwrap_or("-"));
        tracing::info!("  CHUNK_SIZE          : {}", self.chunk_size);
        tracing::info!("  AGGREGATION_MODE    : {:?}", self.aggregation_mode);
        tracing::info!("  API_PAGINATION      : {:?}", self.api_pagination);
        tracing::info!("  API_MAX_PAGES       : {}", self.api_max_pages);
        tracing::info!("  API_TIMEOUT_SECS    : {}", self.api_timeout_secs);
        tracing::info!("  RETRY_MAX_ATTEMPTS  : {}", self.retry_max_attempts);
        tracing::info!("  RETRY_BASE_DELAY_MS : {}", self.retry_base_delay_ms);

        if let Some(ref target) = self.object_storage {
            tracing::info!("  S3 target           : {}", target.source_id());
            tracing::info!(
                "  S3_ENDPOINT_URL     : {}",
                target.endpoint_url.as_deref().unwrap_or("(default)")
            );
            tracing::info!("  AWS_REGION          : {}", target.region);
            tracing::info!("  AWS_SECRET_ACCESS_KEY : ****");
        }
    }
}
