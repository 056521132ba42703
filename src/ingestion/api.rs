//! HTTP API source.
//!
//! Pages are fetched on demand: a new page is requested only when the
//! buffered records cannot fill the next chunk. A response may be a bare JSON
//! array or an envelope `{"data": [...]}` / `{"results": [...]}`; cursor
//! pagination reads `next_cursor` from the envelope.

use std::collections::VecDeque;
use std::str::FromStr;
use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde_json::Value;

use super::format::records_from_values;
use super::retry::{Failure, RetryPolicy};
use crate::error::{PipelineError, Result};
use crate::models::{Chunk, RawReading};

// ---

/// How successive pages are requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pagination {
    /// One request, whatever it returns is the whole source.
    None,
    /// `?page=1`, `?page=2`, … until a page comes back empty.
    #[default]
    Page,
    /// `?cursor=<next_cursor>` until the response carries no cursor.
    Cursor,
}

impl FromStr for Pagination {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        // ---
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "single" => Ok(Pagination::None),
            "page" => Ok(Pagination::Page),
            "cursor" => Ok(Pagination::Cursor),
            other => Err(format!("unknown pagination mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    // ---
    pub pagination: Pagination,
    /// Safety limit on the number of pages requested, including the empty
    /// page that ends page mode. Running into it while the source still has
    /// pages is an ingestion error.
    pub max_pages: u32,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            pagination: Pagination::default(),
            max_pages: 100,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

pub struct ApiSource {
    // ---
    client: reqwest::Client,
    url: Url,
    chunk_size: usize,
    settings: ApiSettings,
    buffer: VecDeque<RawReading>,
    page_count: u32,
    cursor: Option<String>,
    exhausted: bool,
    records_fetched: usize,
}

impl ApiSource {
    // ---
    pub fn new(url: &str, chunk_size: usize, settings: ApiSettings) -> Result<Self> {
        // ---
        let url = Url::parse(url)
            .map_err(|e| PipelineError::config(format!("invalid API URL '{}': {}", url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| PipelineError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(ApiSource {
            client,
            url,
            chunk_size,
            settings,
            buffer: VecDeque::new(),
            page_count: 0,
            cursor: None,
            exhausted: false,
            records_fetched: 0,
        })
    }

    pub fn source_id(&self) -> String {
        self.url.to_string()
    }

    /// Pull the next chunk, fetching pages as needed.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        // ---
        while self.buffer.len() < self.chunk_size && !self.exhausted {
            if let Err(e) = self.fetch_next_page().await {
                self.exhausted = true;
                self.buffer.clear();
                return Err(e);
            }
        }

        if self.buffer.is_empty() {
            return Ok(None);
        }
        let take = self.chunk_size.min(self.buffer.len());
        Ok(Some(self.buffer.drain(..take).collect()))
    }

    fn page_url(&self) -> Url {
        // ---
        let mut url = self.url.clone();
        match self.settings.pagination {
            Pagination::None => {}
            Pagination::Page => {
                url.query_pairs_mut()
                    .append_pair("page", &(self.page_count + 1).to_string());
            }
            Pagination::Cursor => {
                if let Some(ref cursor) = self.cursor {
                    url.query_pairs_mut().append_pair("cursor", cursor);
                }
            }
        }
        url
    }

    async fn fetch_next_page(&mut self) -> Result<()> {
        // ---
        // Only reached while the previous page said there is more to read.
        if self.page_count >= self.settings.max_pages {
            tracing::warn!(
                "Hit page limit of {} for {} after {} records; source not fully read",
                self.settings.max_pages,
                self.url,
                self.records_fetched
            );
            return Err(PipelineError::ingestion(
                self.url.as_str(),
                format!("fetch page {}", self.page_count + 1),
                format!(
                    "page limit of {} reached after {} records",
                    self.settings.max_pages, self.records_fetched
                ),
            ));
        }

        let url = self.page_url();
        self.page_count += 1;
        let page = self.page_count;
        tracing::debug!("Fetching page {} from: {}", page, url);

        let client = &self.client;
        let label = format!("GET {}", url);
        let body = self
            .settings
            .retry
            .run(&label, || fetch_json(client, url.clone()))
            .await
            .map_err(|e| {
                PipelineError::ingestion(
                    self.url.as_str(),
                    format!("fetch page {}", page),
                    format!("{} (after {} attempts)", e.last_error, e.attempts),
                )
            })?;

        let (items, next_cursor) = split_page(body).map_err(|detail| {
            PipelineError::ingestion(self.url.as_str(), format!("parse page {}", page), detail)
        })?;
        let item_count = items.len();
        let parsed = records_from_values(items, &format!("page {}", page));
        tracing::debug!(
            "Page {} found {} items ({} skipped)",
            page,
            item_count,
            parsed.skipped
        );
        self.records_fetched += parsed.records.len();
        self.buffer.extend(parsed.records);

        match self.settings.pagination {
            Pagination::None => self.exhausted = true,
            Pagination::Page => self.exhausted = item_count == 0,
            Pagination::Cursor => {
                tracing::debug!("Page {} next_cursor: {:?}", page, next_cursor);
                self.exhausted = next_cursor.is_none();
                self.cursor = next_cursor;
            }
        }

        if self.exhausted {
            tracing::info!(
                "Finished fetching {} total records from {} pages",
                self.records_fetched,
                self.page_count
            );
        }
        Ok(())
    }
}

async fn fetch_json(client: &reqwest::Client, url: Url) -> std::result::Result<Value, Failure> {
    // ---
    let response = client.get(url).send().await.map_err(classify)?;

    let status = response.status();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(Failure::Transient(format!("HTTP {}", status)));
    }
    if !status.is_success() {
        return Err(Failure::Permanent(format!("HTTP {}", status)));
    }

    response.json::<Value>().await.map_err(|e| {
        if e.is_decode() {
            Failure::Permanent(format!("malformed JSON response: {}", e))
        } else {
            classify(e)
        }
    })
}

fn classify(e: reqwest::Error) -> Failure {
    // ---
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
        Failure::Transient(e.to_string())
    } else {
        Failure::Permanent(e.to_string())
    }
}

/// Split a response body into its records and optional `next_cursor`.
fn split_page(body: Value) -> std::result::Result<(Vec<Value>, Option<String>), String> {
    // ---
    match body {
        Value::Array(items) => Ok((items, None)),
        Value::Object(mut map) => {
            let next_cursor = map
                .get("next_cursor")
                .and_then(Value::as_str)
                .filter(|cursor| !cursor.is_empty())
                .map(String::from);
            ["data", "results"]
                .iter()
                .find_map(|key| match map.remove(*key) {
                    Some(Value::Array(items)) => Some(items),
                    _ => None,
                })
                .map(|items| (items, next_cursor))
                .ok_or_else(|| "response has no 'data' or 'results' array".to_string())
        }
        _ => Err("response is neither an array nor an object".to_string()),
    }
}
