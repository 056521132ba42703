//! Per-sensor running statistics.
//!
//! [`SensorAggregate`] keeps only order-independent state (sums, counts and a
//! max timestamp), so aggregates built from separate chunks can be merged and
//! give the same answer as one pass over all readings.

use std::collections::{btree_map::Entry, BTreeMap};

use chrono::NaiveDateTime;

use crate::models::{ResultMap, SensorResult, ValidatedReading, TIMESTAMP_FORMAT};

// ---

/// Running statistics for one sensor. Only created from a first reading, so
/// `count` is never zero.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorAggregate {
    // ---
    pub sum_ph: f64,
    pub count: u64,
    pub anomaly_count: u64,
    pub latest_timestamp: NaiveDateTime,
}

impl SensorAggregate {
    // ---
    pub fn from_reading(reading: &ValidatedReading) -> Self {
        // ---
        SensorAggregate {
            sum_ph: reading.ph_value,
            count: 1,
            anomaly_count: u64::from(reading.is_temperature_anomaly()),
            latest_timestamp: reading.timestamp,
        }
    }

    pub fn fold(&mut self, reading: &ValidatedReading) {
        // ---
        self.sum_ph += reading.ph_value;
        self.count += 1;
        self.anomaly_count += u64::from(reading.is_temperature_anomaly());
        self.latest_timestamp = self.latest_timestamp.max(reading.timestamp);
    }

    /// Combine with an aggregate of the same sensor built from other readings.
    pub fn merge(&mut self, other: &SensorAggregate) {
        // ---
        self.sum_ph += other.sum_ph;
        self.count += other.count;
        self.anomaly_count += other.anomaly_count;
        self.latest_timestamp = self.latest_timestamp.max(other.latest_timestamp);
    }

    pub fn avg_ph(&self) -> f64 {
        self.sum_ph / self.count as f64
    }

    pub fn to_result(&self) -> SensorResult {
        // ---
        SensorResult {
            avg_ph: self.avg_ph(),
            anomaly_count: self.anomaly_count,
            latest_timestamp: self.latest_timestamp.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

/// Aggregate state for a set of sensors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregator {
    sensors: BTreeMap<String, SensorAggregate>,
}

impl Aggregator {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fold(&mut self, reading: &ValidatedReading) {
        // ---
        match self.sensors.entry(reading.sensor_id.clone()) {
            Entry::Occupied(mut slot) => slot.get_mut().fold(reading),
            Entry::Vacant(slot) => {
                slot.insert(SensorAggregate::from_reading(reading));
            }
        }
    }

    pub fn fold_all<'a>(&mut self, readings: impl IntoIterator<Item = &'a ValidatedReading>) {
        for reading in readings {
            self.fold(reading);
        }
    }

    pub fn merge(&mut self, other: &Aggregator) {
        // ---
        for (sensor_id, aggregate) in &other.sensors {
            match self.sensors.get_mut(sensor_id) {
                Some(existing) => existing.merge(aggregate),
                None => {
                    self.sensors.insert(sensor_id.clone(), aggregate.clone());
                }
            }
        }
    }

    pub fn get(&self, sensor_id: &str) -> Option<&SensorAggregate> {
        self.sensors.get(sensor_id)
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Finalize into a [`ResultMap`]; sensors never seen have no entry.
    pub fn results(&self) -> ResultMap {
        self.sensors
            .iter()
            .map(|(id, aggregate)| (id.clone(), aggregate.to_result()))
            .collect()
    }
}
