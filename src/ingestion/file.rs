//! Local file source.
//!
//! JSONL files are streamed line by line so memory stays bounded by the chunk
//! size. JSON array files have to be decoded as a whole and are then handed
//! out chunk by chunk.

use std::path::PathBuf;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Split};

use super::format::{parse_line, parse_payload, RecordFormat};
use super::take_chunk;
use crate::error::{PipelineError, Result};
use crate::models::{Chunk, RawReading};

// ---

pub struct FileSource {
    // ---
    path: PathBuf,
    chunk_size: usize,
    state: FileState,
}

enum FileState {
    Unopened,
    Lines(LineReader),
    Buffered(std::vec::IntoIter<RawReading>),
    Finished,
}

struct LineReader {
    lines: Split<BufReader<File>>,
    line_no: usize,
    parsed: usize,
    skipped: usize,
}

impl FileSource {
    // ---
    pub fn new(path: impl Into<PathBuf>, chunk_size: usize) -> Self {
        FileSource {
            path: path.into(),
            chunk_size,
            state: FileState::Unopened,
        }
    }

    pub fn source_id(&self) -> String {
        self.path.display().to_string()
    }

    /// Pull the next chunk. `Ok(None)` once the file is exhausted; the source
    /// stays finished after the end or after an error.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        // ---
        let chunk_size = self.chunk_size;
        let source_id = self.source_id();

        if let FileState::Unopened = self.state {
            match self.open().await {
                Ok(state) => self.state = state,
                Err(e) => {
                    self.state = FileState::Finished;
                    return Err(e);
                }
            }
        }

        let outcome = match &mut self.state {
            FileState::Lines(reader) => next_line_chunk(reader, chunk_size, &source_id).await,
            FileState::Buffered(records) => Ok(take_chunk(records, chunk_size)),
            FileState::Unopened | FileState::Finished => return Ok(None),
        };

        if !matches!(outcome, Ok(Some(_))) {
            self.state = FileState::Finished;
        }
        outcome
    }

    async fn open(&self) -> Result<FileState> {
        // ---
        let source_id = self.source_id();
        let file = File::open(&self.path)
            .await
            .map_err(|e| PipelineError::ingestion(&source_id, "open", e))?;
        let mut reader = BufReader::new(file);

        let head = reader
            .fill_buf()
            .await
            .map_err(|e| PipelineError::ingestion(&source_id, "read", e))?;
        let format = RecordFormat::detect(&source_id, head);
        tracing::debug!("Reading {} as {:?}", source_id, format);

        match format {
            RecordFormat::JsonLines => Ok(FileState::Lines(LineReader {
                lines: reader.split(b'\n'),
                line_no: 0,
                parsed: 0,
                skipped: 0,
            })),
            RecordFormat::JsonArray => {
                let mut bytes = Vec::new();
                reader
                    .read_to_end(&mut bytes)
                    .await
                    .map_err(|e| PipelineError::ingestion(&source_id, "read", e))?;
                let parsed = parse_payload(&bytes, format)
                    .map_err(|detail| PipelineError::ingestion(&source_id, "parse", detail))?;
                tracing::info!(
                    "Loaded {} records from {} ({} skipped)",
                    parsed.records.len(),
                    source_id,
                    parsed.skipped
                );
                Ok(FileState::Buffered(parsed.records.into_iter()))
            }
        }
    }
}

async fn next_line_chunk(
    reader: &mut LineReader,
    chunk_size: usize,
    source_id: &str,
) -> Result<Option<Chunk>> {
    // ---
    let mut chunk = Vec::with_capacity(chunk_size.min(4096));

    while chunk.len() < chunk_size {
        let line = reader.lines.next_segment().await.map_err(|e| {
            PipelineError::ingestion(source_id, format!("read line {}", reader.line_no + 1), e)
        })?;
        let Some(line) = line else {
            break;
        };
        reader.line_no += 1;

        match parse_line(&line) {
            Ok(Some(record)) => {
                reader.parsed += 1;
                chunk.push(record);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    "Skipping invalid JSON in {} line {}: {}",
                    source_id,
                    reader.line_no,
                    e
                );
                reader.skipped += 1;
            }
        }
    }

    if chunk.is_empty() {
        if reader.parsed == 0 && reader.skipped > 0 {
            return Err(PipelineError::ingestion(
                source_id,
                "parse",
                format!("no parseable records ({} malformed lines)", reader.skipped),
            ));
        }
        tracing::info!(
            "Finished {}: {} records from {} lines ({} skipped)",
            source_id,
            reader.parsed,
            reader.line_no,
            reader.skipped
        );
        return Ok(None);
    }
    Ok(Some(chunk))
}
