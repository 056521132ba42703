//! Application entry point for the `bioflow` pipeline runner.
//!
//! This binary orchestrates a single pipeline run:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing (to stderr)
//! - Selecting the source: `argv[1]`, `SENSOR_SOURCE`, or the configured
//!   object-storage target (`S3_BUCKET` / `S3_OBJECT_KEY`)
//! - Printing results to stdout as JSON, one line per chunk in `per_chunk`
//!   mode or a single merged map in `cumulative` mode
//!
//! # Environment Variables
//! - `SENSOR_SOURCE` (optional) – file path or `http(s)://` URL
//! - `CHUNK_SIZE` (optional) – readings per chunk (default: 1000)
//! - `AGGREGATION_MODE` (optional) – `per_chunk` (default) or `cumulative`
//! - `BIOFLOW_LOG_LEVEL` (optional) – log verbosity (default: `info`)
//! - `BIOFLOW_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! See [`bioflow_pipeline::config`] for the full list.
use std::env;

use anyhow::{anyhow, Result};
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tracing::Level;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use bioflow_pipeline::{config, AggregationMode, Pipeline, ResultStream};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let source_arg = env::args().nth(1);
    let pipeline = Pipeline::new(cfg)?;
    let cfg = pipeline.config();

    let stream = match (source_arg.or(cfg.source.clone()), cfg.object_storage.clone()) {
        (Some(source), _) => pipeline.process_pipeline(&source)?,
        (None, Some(target)) => pipeline.process_object_storage(target)?,
        (None, None) => {
            return Err(anyhow!(
                "No source given: pass a path or URL, or set SENSOR_SOURCE or S3_BUCKET/S3_OBJECT_KEY"
            ))
        }
    };

    match cfg.aggregation_mode {
        AggregationMode::PerChunk => print_per_chunk(stream).await?,
        AggregationMode::Cumulative => {
            let results = stream.merged().await?;
            println!("{}", serde_json::to_string(&results)?);
        }
    }

    Ok(())
}

// ---

/// Print each chunk's results as soon as it is processed.
async fn print_per_chunk(mut stream: ResultStream) -> Result<()> {
    // ---
    while let Some(results) = stream.next().await? {
        println!("{}", serde_json::to_string(&results)?);
    }
    tracing::debug!(
        "Emitted {} chunk results from {}",
        stream.chunks_processed(),
        stream.source_id()
    );
    Ok(())
}

/// Crates whose chatter drowns out pipeline logs at `debug`.
const QUIET_TARGETS: &str = "aws_config=warn,aws_smithy_runtime=warn,hyper=warn";

/// Logging knobs read from the environment.
///
/// - `RUST_LOG` wins when set; otherwise `BIOFLOW_LOG_LEVEL` (default `info`)
///   with [`QUIET_TARGETS`] appended.
/// - `BIOFLOW_SPAN_EVENTS`: `full`, `enter_exit`, or close events only.
/// - `FORCE_COLOR`: `1|true|yes` / `0|false|no`; `None` means detect a TTY.
#[derive(Debug)]
struct LogSettings {
    filter: String,
    span_events: FmtSpan,
    force_color: Option<bool>,
}

impl LogSettings {
    // ---
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        // ---
        let filter = match lookup("RUST_LOG") {
            Some(directives) => directives,
            None => {
                let level = lookup("BIOFLOW_LOG_LEVEL")
                    .and_then(|v| v.parse::<Level>().ok())
                    .unwrap_or(Level::INFO);
                format!("{},{}", level.as_str().to_ascii_lowercase(), QUIET_TARGETS)
            }
        };

        let span_events = match lookup("BIOFLOW_SPAN_EVENTS").as_deref() {
            Some("full") => FmtSpan::FULL,
            Some("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
            _ => FmtSpan::CLOSE,
        };

        let force_color = match lookup("FORCE_COLOR").as_deref() {
            Some("1" | "true" | "yes") => Some(true),
            Some("0" | "false" | "no") => Some(false),
            _ => None,
        };

        LogSettings {
            filter,
            span_events,
            force_color,
        }
    }
}

/// Install the global subscriber. Logs go to stderr so stdout carries only
/// results. Call once, before anything logs.
fn init_tracing() {
    // ---
    let settings = LogSettings::from_lookup(|name| env::var(name).ok());
    let ansi = settings
        .force_color
        .unwrap_or_else(|| std::io::stderr().is_terminal());

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(settings.span_events)
        .with_env_filter(EnvFilter::new(settings.filter))
        .with_ansi(ansi)
        .compact()
        .init();
}
