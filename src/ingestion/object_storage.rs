//! Object-storage (S3-compatible) source.
//!
//! The object is fetched once on the first pull, parsed exactly like a local
//! file (JSON array or JSONL) and then handed out chunk by chunk. The only
//! difference between production and a local emulator is the endpoint the
//! client connects to.

use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};

use super::format::{parse_payload, RecordFormat};
use super::retry::{Failure, RetryPolicy};
use super::take_chunk;
use crate::error::{PipelineError, Result};
use crate::models::{Chunk, RawReading};

// ---

/// Endpoint used when the emulator flag is set without an explicit URL.
pub const EMULATOR_ENDPOINT: &str = "http://localhost:4566";

/// Target object and connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectStorageConfig {
    // ---
    pub bucket_name: String,
    pub object_key: String,
    /// Non-production endpoint override; `None` uses the provider default.
    pub endpoint_url: Option<String>,
    pub region: String,
    /// Static credentials for emulator targets; ignored without an override.
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl ObjectStorageConfig {
    // ---
    pub fn new(bucket_name: impl Into<String>, object_key: impl Into<String>) -> Self {
        ObjectStorageConfig {
            bucket_name: bucket_name.into(),
            object_key: object_key.into(),
            endpoint_url: None,
            region: "us-east-1".to_string(),
            access_key_id: "test".to_string(),
            secret_access_key: "test".to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }

    pub fn source_id(&self) -> String {
        format!("s3://{}/{}", self.bucket_name, self.object_key)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        // ---
        if self.bucket_name.trim().is_empty() {
            return Err(PipelineError::config("bucket_name must not be empty"));
        }
        if self.object_key.trim().is_empty() {
            return Err(PipelineError::config("object_key must not be empty"));
        }
        Ok(())
    }
}

pub struct ObjectStorageSource {
    // ---
    config: ObjectStorageConfig,
    chunk_size: usize,
    request_timeout: Duration,
    retry: RetryPolicy,
    state: ObjectState,
}

enum ObjectState {
    Pending,
    Buffered(std::vec::IntoIter<RawReading>),
    Finished,
}

impl ObjectStorageSource {
    // ---
    pub fn new(
        config: ObjectStorageConfig,
        chunk_size: usize,
        request_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        // ---
        config.validate()?;
        Ok(ObjectStorageSource {
            config,
            chunk_size,
            request_timeout,
            retry,
            state: ObjectState::Pending,
        })
    }

    pub fn source_id(&self) -> String {
        self.config.source_id()
    }

    /// Pull the next chunk, downloading the object on the first call.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        // ---
        if let ObjectState::Pending = self.state {
            match self.fetch().await {
                Ok(records) => self.state = ObjectState::Buffered(records.into_iter()),
                Err(e) => {
                    self.state = ObjectState::Finished;
                    return Err(e);
                }
            }
        }

        let chunk = match &mut self.state {
            ObjectState::Buffered(records) => take_chunk(records, self.chunk_size),
            ObjectState::Pending | ObjectState::Finished => None,
        };
        if chunk.is_none() {
            self.state = ObjectState::Finished;
        }
        Ok(chunk)
    }

    async fn client(&self) -> aws_sdk_s3::Client {
        // ---
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(self.config.region.clone()));
        if self.config.endpoint_url.is_some() {
            loader = loader.credentials_provider(Credentials::new(
                self.config.access_key_id.clone(),
                self.config.secret_access_key.clone(),
                None,
                None,
                "bioflow-static",
            ));
        }
        let shared = loader.load().await;

        // SDK retries off; RetryPolicy owns the attempt budget.
        let mut builder = aws_sdk_s3::config::Builder::from(&shared)
            .retry_config(RetryConfig::disabled())
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(self.request_timeout)
                    .build(),
            );
        if let Some(ref endpoint) = self.config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        aws_sdk_s3::Client::from_conf(builder.build())
    }

    async fn fetch(&self) -> Result<Vec<RawReading>> {
        // ---
        let source_id = self.source_id();
        tracing::info!(
            "Fetching {} from {}",
            source_id,
            self.config.endpoint_url.as_deref().unwrap_or("default endpoint")
        );

        let client = self.client().await;
        let bucket = self.config.bucket_name.as_str();
        let key = self.config.object_key.as_str();
        let label = format!("get_object {}", source_id);

        let bytes = self
            .retry
            .run(&label, || get_object_bytes(&client, bucket, key))
            .await
            .map_err(|e| {
                PipelineError::ingestion(
                    &source_id,
                    "get_object",
                    format!(
                        "bucket '{}', key '{}': {} (after {} attempts)",
                        bucket, key, e.last_error, e.attempts
                    ),
                )
            })?;

        let format = RecordFormat::detect(key, &bytes);
        let parsed = parse_payload(&bytes, format)
            .map_err(|detail| PipelineError::ingestion(&source_id, "parse", detail))?;
        tracing::info!(
            "Loaded {} records from {} ({} skipped)",
            parsed.records.len(),
            source_id,
            parsed.skipped
        );
        Ok(parsed.records)
    }
}

async fn get_object_bytes(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
) -> std::result::Result<Vec<u8>, Failure> {
    // ---
    let output = client
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(classify)?;

    let body = output
        .body
        .collect()
        .await
        .map_err(|e| Failure::Transient(format!("body read failed: {}", e)))?;
    Ok(body.into_bytes().to_vec())
}

fn classify<E>(err: SdkError<E, HttpResponse>) -> Failure
where
    E: std::error::Error + 'static,
{
    // ---
    let transient = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        SdkError::ServiceError(context) => context.raw().status().as_u16() >= 500,
        _ => false,
    };

    let message = DisplayErrorContext(&err).to_string();
    if transient {
        Failure::Transient(message)
    } else {
        Failure::Permanent(message)
    }
}
