// Thermovolt - Sensor status pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Raw records as delivered by a source, and cleaned readings.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use xxhash_rust::xxh64::Xxh64;

/// Column holding the temperature value.
pub const TEMPERATURE_FIELD: &str = "Temperature";
/// Column holding the voltage value.
pub const VOLTAGE_FIELD: &str = "Voltage";
/// Column holding the sample timestamp.
pub const TIMESTAMP_FIELD: &str = "Timestamp";

const FINGERPRINT_SEED: u64 = 0x7468_6572_6d6f_7674;

/// A single cell value from a source row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Bool(bool),
    Text(String),
    Empty,
    /// Any other JSON cell (object, array). Never a usable value.
    Other(serde_json::Value),
}

impl RawValue {
    /// True for `Empty` and blank text.
    pub fn is_missing(&self) -> bool {
        match self {
            RawValue::Empty => true,
            RawValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Coerce to a finite `f64`, if possible.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            RawValue::Number(n) => *n,
            RawValue::Text(s) => s.trim().parse::<f64>().ok()?,
            RawValue::Bool(_) | RawValue::Empty | RawValue::Other(_) => return None,
        };
        value.is_finite().then_some(value)
    }

    /// Text content, for timestamp parsing.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(s) => Some(s.trim()),
            _ => None,
        }
    }

    fn feed(&self, hasher: &mut Xxh64) {
        match self {
            RawValue::Number(n) => {
                hasher.update(&[0]);
                hasher.update(&n.to_bits().to_le_bytes());
            }
            RawValue::Bool(b) => hasher.update(&[1, *b as u8]),
            RawValue::Text(s) => {
                hasher.update(&[2]);
                hasher.update(&(s.len() as u64).to_le_bytes());
                hasher.update(s.as_bytes());
            }
            RawValue::Empty => hasher.update(&[3]),
            RawValue::Other(v) => {
                let text = v.to_string();
                hasher.update(&[4]);
                hasher.update(&(text.len() as u64).to_le_bytes());
                hasher.update(text.as_bytes());
            }
        }
    }
}

// Numbers compare by bit pattern so batches have a total equality.
impl PartialEq for RawValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RawValue::Number(a), RawValue::Number(b)) => a.to_bits() == b.to_bits(),
            (RawValue::Bool(a), RawValue::Bool(b)) => a == b,
            (RawValue::Text(a), RawValue::Text(b)) => a == b,
            (RawValue::Empty, RawValue::Empty) => true,
            (RawValue::Other(a), RawValue::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for RawValue {}

impl Hash for RawValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            RawValue::Number(n) => n.to_bits().hash(state),
            RawValue::Bool(b) => b.hash(state),
            RawValue::Text(s) => s.hash(state),
            RawValue::Empty => {}
            RawValue::Other(v) => v.to_string().hash(state),
        }
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

/// One source row: field name to cell value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    fields: BTreeMap<String, RawValue>,
}

impl RawRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field.
    pub fn with(mut self, name: &str, value: impl Into<RawValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set a field.
    pub fn insert(&mut self, name: &str, value: impl Into<RawValue>) {
        self.fields.insert(name.to_string(), value.into());
    }

    /// Look up a field, ignoring ASCII case of the name.
    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.fields.get(name).or_else(|| {
            self.fields
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
    }

    /// Iterate over fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A full pull from a data source, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawBatch {
    records: Vec<RawRecord>,
}

impl RawBatch {
    /// Wrap records.
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self { records }
    }

    /// Records in arrival order.
    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if the batch has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a record.
    pub fn push(&mut self, record: RawRecord) {
        self.records.push(record);
    }

    /// Order-sensitive xxh64 digest of every field of every record.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh64::new(FINGERPRINT_SEED);
        hasher.update(&(self.records.len() as u64).to_le_bytes());
        for record in &self.records {
            hasher.update(&(record.len() as u64).to_le_bytes());
            for (name, value) in record.iter() {
                hasher.update(name.as_bytes());
                hasher.update(&[0xff]);
                value.feed(&mut hasher);
            }
        }
        hasher.digest()
    }
}

impl From<Vec<RawRecord>> for RawBatch {
    fn from(records: Vec<RawRecord>) -> Self {
        Self::new(records)
    }
}

impl FromIterator<RawRecord> for RawBatch {
    fn from_iter<I: IntoIterator<Item = RawRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// A cleaned, typed sensor sample. Both numeric fields are finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub temperature: f64,
    pub voltage: f64,
    /// Source timestamp as parsed, before any rebasing.
    pub timestamp: Option<NaiveDateTime>,
}

impl Reading {
    /// Create a reading without a timestamp.
    pub fn new(temperature: f64, voltage: f64) -> Self {
        Self {
            temperature,
            voltage,
            timestamp: None,
        }
    }

    /// Attach a source timestamp.
    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Feature vector in scaler column order.
    pub fn features(&self) -> [f64; 2] {
        [self.temperature, self.voltage]
    }

    /// Convert back to a source-shaped record.
    pub fn to_record(&self) -> RawRecord {
        let record = RawRecord::new()
            .with(TEMPERATURE_FIELD, self.temperature)
            .with(VOLTAGE_FIELD, self.voltage);
        match self.timestamp {
            Some(ts) => record.with(
                TIMESTAMP_FIELD,
                ts.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            ),
            None => record,
        }
    }
}

/// The most recent cleaned readings, oldest first, at most `capacity` long.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingWindow {
    readings: Vec<Reading>,
    capacity: usize,
}

impl RollingWindow {
    /// Keep the last `capacity` readings.
    pub fn from_readings(mut readings: Vec<Reading>, capacity: usize) -> Self {
        if readings.len() > capacity {
            readings.drain(..readings.len() - capacity);
        }
        Self { readings, capacity }
    }

    /// Readings, oldest first.
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    /// Iterate over readings.
    pub fn iter(&self) -> std::slice::Iter<'_, Reading> {
        self.readings.iter()
    }

    /// Maximum length.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of readings.
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// True if empty.
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Temperature column.
    pub fn temperatures(&self) -> Vec<f64> {
        self.readings.iter().map(|r| r.temperature).collect()
    }

    /// Voltage column.
    pub fn voltages(&self) -> Vec<f64> {
        self.readings.iter().map(|r| r.voltage).collect()
    }

    /// Source-shaped batch of this window.
    pub fn to_raw_batch(&self) -> RawBatch {
        self.readings.iter().map(Reading::to_record).collect()
    }
}

impl<'a> IntoIterator for &'a RollingWindow {
    type Item = &'a Reading;
    type IntoIter = std::slice::Iter<'a, Reading>;

    fn into_iter(self) -> Self::IntoIter {
        self.readings.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(t: f64, v: f64) -> RawRecord {
        RawRecord::new()
            .with(TEMPERATURE_FIELD, t)
            .with(VOLTAGE_FIELD, v)
    }

    #[test]
    fn test_raw_value_coercion() {
        assert_eq!(RawValue::Number(21.5).as_f64(), Some(21.5));
        assert_eq!(RawValue::from(" 4.9 ").as_f64(), Some(4.9));
        assert_eq!(RawValue::from("abc").as_f64(), None);
        assert_eq!(RawValue::Number(f64::NAN).as_f64(), None);
        assert_eq!(RawValue::from("inf").as_f64(), None);
        assert_eq!(RawValue::Bool(true).as_f64(), None);
        assert!(RawValue::from("   ").is_missing());
        assert!(RawValue::Empty.is_missing());
        assert!(!RawValue::Number(0.0).is_missing());
    }

    #[test]
    fn test_record_get_ignores_case() {
        let rec = RawRecord::new().with("temperature", 20.0);
        assert_eq!(rec.get(TEMPERATURE_FIELD), Some(&RawValue::Number(20.0)));
        assert!(rec.get(VOLTAGE_FIELD).is_none());
    }

    #[test]
    fn test_raw_record_deserialize() {
        let json = r#"{"Temperature": 21.0, "Voltage": "5.1", "Timestamp": null}"#;
        let rec: RawRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.get(TEMPERATURE_FIELD), Some(&RawValue::Number(21.0)));
        assert_eq!(rec.get(VOLTAGE_FIELD), Some(&RawValue::from("5.1")));
        assert_eq!(rec.get(TIMESTAMP_FIELD), Some(&RawValue::Empty));
    }

    #[test]
    fn test_nested_cell_is_kept_as_other() {
        let json = r#"[
            {"Temperature": 20.0, "Voltage": 5.0},
            {"Temperature": 21.0, "Voltage": 5.0, "Meta": {"sensor": "a"}},
            {"Temperature": [22.0], "Voltage": 5.0}
        ]"#;
        let batch: RawBatch = serde_json::from_str(json).unwrap();
        assert_eq!(batch.len(), 3);

        let meta = batch.records()[1].get("Meta").unwrap();
        assert!(matches!(meta, RawValue::Other(_)));
        assert!(!meta.is_missing());
        assert_eq!(meta.as_f64(), None);
        assert_eq!(meta.as_text(), None);
        assert_eq!(batch.records()[2].get(TEMPERATURE_FIELD).unwrap().as_f64(), None);
        assert_eq!(batch.fingerprint(), batch.clone().fingerprint());
    }

    #[test]
    fn test_fingerprint_detects_changes() {
        let a = RawBatch::new(vec![record(20.0, 5.0), record(21.0, 5.0)]);
        let b = a.clone();
        let c = RawBatch::new(vec![record(21.0, 5.0), record(20.0, 5.0)]);
        let d = RawBatch::new(vec![record(20.0, 5.0), record(21.0, 5.01)]);

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_ne!(a.fingerprint(), d.fingerprint());
    }

    #[test]
    fn test_window_keeps_suffix() {
        let readings: Vec<Reading> = (0..10).map(|i| Reading::new(i as f64, 5.0)).collect();
        let window = RollingWindow::from_readings(readings, 4);

        assert_eq!(window.len(), 4);
        assert_eq!(window.temperatures(), vec![6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_window_shorter_than_capacity() {
        let window = RollingWindow::from_readings(vec![Reading::new(1.0, 2.0)], 50);
        assert_eq!(window.len(), 1);
        assert_eq!(window.capacity(), 50);
    }

    #[test]
    fn test_reading_features_order() {
        let reading = Reading::new(25.0, 5.0);
        assert_eq!(reading.features(), [25.0, 5.0]);
    }
}
