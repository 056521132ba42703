//! Simple data models for the bioreactor pipeline.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---

/// Fixed timestamp layout used by every reading, e.g. `2025-08-16 14:30`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Temperatures strictly below this are anomalous (°C).
pub const TEMPERATURE_MIN_C: f64 = 20.0;

/// Temperatures strictly above this are anomalous (°C).
pub const TEMPERATURE_MAX_C: f64 = 40.0;

/// Raw sensor record as it arrives from a file, API or object store.
///
/// Every field is kept as an untyped JSON value so that a record with a
/// string pH or a missing timestamp still deserializes and can be rejected
/// by the validator instead of failing the whole chunk. Extra keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RawReading {
    // ---
    #[serde(default)]
    pub sensor_id: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub ph_value: Option<Value>,
    #[serde(default)]
    pub temperature: Option<Value>,
}

/// A reading that passed every validity predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedReading {
    // ---
    pub sensor_id: String,
    pub timestamp: NaiveDateTime,
    pub ph_value: f64,
    pub temperature: f64,
}

/// Finalized per-sensor statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorResult {
    // ---
    pub avg_ph: f64,
    pub anomaly_count: u64,
    pub latest_timestamp: String,
}

/// Per-sensor results keyed by `sensor_id`, ordered for stable output.
pub type ResultMap = BTreeMap<String, SensorResult>;

/// Ordered, bounded batch of raw readings produced by one ingestion pull.
pub type Chunk = Vec<RawReading>;

impl RawReading {
    // ---
    /// Build a well-typed raw reading; mostly useful for tests and fixtures.
    pub fn new(sensor_id: &str, timestamp: &str, ph_value: f64, temperature: f64) -> Self {
        // ---
        RawReading {
            sensor_id: Some(Value::from(sensor_id)),
            timestamp: Some(Value::from(timestamp)),
            ph_value: Some(Value::from(ph_value)),
            temperature: Some(Value::from(temperature)),
        }
    }
}

impl ValidatedReading {
    // ---
    /// Temperature outside the open interval bounds is an anomaly; the
    /// bounds themselves are normal.
    pub fn is_temperature_anomaly(&self) -> bool {
        self.temperature < TEMPERATURE_MIN_C || self.temperature > TEMPERATURE_MAX_C
    }

    pub fn timestamp_string(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

impl SensorResult {
    // ---
    pub fn to_tuple(&self) -> (f64, u64, &str) {
        (self.avg_ph, self.anomaly_count, &self.latest_timestamp)
    }
}
