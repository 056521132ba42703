//! Payload formats shared by the file and object-storage sources.
//!
//! Two layouts are accepted: a single JSON array of records, or one JSON
//! object per line (JSONL). Malformed lines or array elements are skipped and
//! counted; a payload that yields nothing parseable is reported as an error.

use serde_json::Value;

use crate::models::RawReading;

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// `[ {...}, {...} ]`
    JsonArray,
    /// One object per line.
    JsonLines,
}

/// Records recovered from a payload plus the number of entries dropped.
#[derive(Debug, Default)]
pub struct ParsedRecords {
    pub records: Vec<RawReading>,
    pub skipped: usize,
}

impl RecordFormat {
    // ---
    /// Decide the layout from the first non-whitespace byte of the content,
    /// falling back to the name's extension when the content is inconclusive.
    pub fn detect(name: &str, head: &[u8]) -> Self {
        // ---
        match head.iter().copied().find(|b| !b.is_ascii_whitespace()) {
            Some(b'[') => RecordFormat::JsonArray,
            Some(b'{') => RecordFormat::JsonLines,
            _ => Self::from_extension(name),
        }
    }

    pub fn from_extension(name: &str) -> Self {
        // ---
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".json") {
            RecordFormat::JsonArray
        } else {
            RecordFormat::JsonLines
        }
    }
}

/// Parse a single raw JSONL line. `Ok(None)` for blank lines.
///
/// Works on bytes so a line that is not valid UTF-8 fails on its own instead
/// of taking the rest of the payload with it.
pub fn parse_line(line: &[u8]) -> Result<Option<RawReading>, serde_json::Error> {
    // ---
    let trimmed = trim_ascii(line);
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(trimmed).map(Some)
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    // ---
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

/// Parse a whole payload in the given layout.
///
/// Returns `Err` with a description when nothing in the payload is usable.
pub fn parse_payload(bytes: &[u8], format: RecordFormat) -> Result<ParsedRecords, String> {
    // ---
    match format {
        RecordFormat::JsonArray => parse_array(bytes),
        RecordFormat::JsonLines => parse_lines(bytes),
    }
}

/// Convert the elements of an already-decoded JSON array, skipping elements
/// that are not reading objects.
pub fn records_from_values(values: Vec<Value>, origin: &str) -> ParsedRecords {
    // ---
    let mut parsed = ParsedRecords::default();
    for (i, item) in values.into_iter().enumerate() {
        match serde_json::from_value::<RawReading>(item) {
            Ok(record) => parsed.records.push(record),
            Err(e) => {
                tracing::warn!("Skipping record {} from {}: {}", i, origin, e);
                parsed.skipped += 1;
            }
        }
    }
    parsed
}

fn parse_array(bytes: &[u8]) -> Result<ParsedRecords, String> {
    // ---
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(ParsedRecords::default());
    }
    let values: Vec<Value> =
        serde_json::from_slice(bytes).map_err(|e| format!("payload is not a JSON array: {}", e))?;
    Ok(records_from_values(values, "array payload"))
}

fn parse_lines(bytes: &[u8]) -> Result<ParsedRecords, String> {
    // ---
    let mut parsed = ParsedRecords::default();

    for (i, line) in bytes.split(|b| *b == b'\n').enumerate() {
        match parse_line(line) {
            Ok(Some(record)) => parsed.records.push(record),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Skipping invalid JSON on line {}: {}", i + 1, e);
                parsed.skipped += 1;
            }
        }
    }

    if parsed.records.is_empty() && parsed.skipped > 0 {
        return Err(format!(
            "no parseable records ({} malformed lines)",
            parsed.skipped
        ));
    }
    Ok(parsed)
}
