//! Record validation.
//!
//! A raw reading is valid when all four predicates hold: non-empty string
//! `sensor_id`, `timestamp` in the fixed `YYYY-MM-DD HH:MM` layout naming a
//! real calendar date/time, and numeric non-negative `ph_value` and
//! `temperature`. Anything else (missing, wrong type, malformed) is simply
//! invalid; nothing here returns an error.

use chrono::NaiveDateTime;
use serde_json::Value;

use crate::models::{RawReading, ValidatedReading, TIMESTAMP_FORMAT};

// ---

/// Check a reading without producing the typed form.
pub fn is_valid(reading: &RawReading) -> bool {
    validate(reading).is_some()
}

/// Convert a raw reading into a [`ValidatedReading`] if every predicate holds.
pub fn validate(reading: &RawReading) -> Option<ValidatedReading> {
    // ---
    let sensor_id = match reading.sensor_id.as_ref()? {
        Value::String(s) if !s.is_empty() => s.clone(),
        _ => return None,
    };
    let timestamp = parse_timestamp(reading.timestamp.as_ref()?.as_str()?)?;
    let ph_value = non_negative_number(reading.ph_value.as_ref()?)?;
    let temperature = non_negative_number(reading.temperature.as_ref()?)?;

    Some(ValidatedReading {
        sensor_id,
        timestamp,
        ph_value,
        temperature,
    })
}

/// Keep only the valid readings of a chunk, preserving order.
pub fn filter_chunk(chunk: &[RawReading]) -> Vec<ValidatedReading> {
    chunk.iter().filter_map(validate).collect()
}

/// Parse a timestamp in the exact `YYYY-MM-DD HH:MM` layout.
///
/// The shape check runs first because chrono accepts unpadded fields, and
/// lexicographic ordering of timestamps relies on the fixed width.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    // ---
    let bytes = raw.as_bytes();
    if bytes.len() != 16 {
        return None;
    }
    let shape_ok = bytes.iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        10 => *b == b' ',
        13 => *b == b':',
        _ => b.is_ascii_digit(),
    });
    if !shape_ok {
        return None;
    }
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).ok()
}

fn non_negative_number(value: &Value) -> Option<f64> {
    // ---
    let number = value.as_f64()?;
    (number.is_finite() && number >= 0.0).then_some(number)
}
