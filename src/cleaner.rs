// Thermovolt - Sensor status pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Batch cleaning.
//!
//! Turns a raw batch into a [`RollingWindow`]:
//!
//! 1. drop rows with a missing temperature or voltage (or timestamp, when
//!    required)
//! 2. coerce numbers; rows that do not coerce to a finite `f64` are dropped
//! 3. parse timestamps; unparsable required timestamps drop the row
//! 4. remove exact duplicates, keeping the first occurrence
//! 5. reject Tukey outliers, fences fitted per column on this batch only
//! 6. keep the most recent `window_size` rows
//!
//! Bad rows are never an error. They are counted in a [`CleanReport`].

use crate::config::PipelineConfig;
use crate::reading::{
    RawBatch, RawRecord, Reading, RollingWindow, TEMPERATURE_FIELD, TIMESTAMP_FIELD,
    VOLTAGE_FIELD,
};
use crate::stats::TukeyFence;
use crate::timeline::parse_timestamp;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Cleaner settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanerConfig {
    /// Maximum readings kept.
    pub window_size: usize,
    /// Drop rows without a parsable timestamp.
    pub require_timestamp: bool,
    /// Batches smaller than this skip outlier rejection.
    pub min_outlier_batch: usize,
    /// IQR multiplier.
    pub fence_multiplier: f64,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for CleanerConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            window_size: config.window_size,
            require_timestamp: config.require_timestamp,
            min_outlier_batch: config.min_outlier_batch,
            fence_multiplier: config.fence_multiplier,
        }
    }
}

/// Why rows left the batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanReport {
    /// Rows in the raw batch.
    pub received: usize,
    /// Missing temperature, voltage or required timestamp.
    pub missing_field: usize,
    /// Value present but not a finite number.
    pub invalid_number: usize,
    /// Required timestamp present but unparsable.
    pub invalid_timestamp: usize,
    /// Exact repeats of an earlier row.
    pub duplicates: usize,
    /// Outside the Tukey fences of at least one column.
    pub outliers: usize,
    /// Older rows beyond the window size.
    pub truncated: usize,
    /// Rows in the resulting window.
    pub kept: usize,
    /// Whether the fences were applied.
    pub outlier_rejection_applied: bool,
}

impl CleanReport {
    /// Rows that passed field validation.
    pub fn valid(&self) -> usize {
        self.received - self.missing_field - self.invalid_number - self.invalid_timestamp
    }

    /// Total rows dropped for any reason.
    pub fn dropped(&self) -> usize {
        self.received - self.kept
    }
}

/// Why a single record was rejected during field validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    MissingField,
    InvalidNumber,
    InvalidTimestamp,
}

/// Batch cleaner. Stateless between calls.
#[derive(Debug, Clone, Default)]
pub struct Cleaner {
    config: CleanerConfig,
}

impl Cleaner {
    /// Create a cleaner with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cleaner with custom settings.
    pub fn with_config(config: CleanerConfig) -> Self {
        Self { config }
    }

    /// Current settings.
    pub fn config(&self) -> &CleanerConfig {
        &self.config
    }

    /// Clean a batch into a rolling window.
    pub fn clean(&self, batch: &RawBatch) -> RollingWindow {
        self.clean_with_report(batch).0
    }

    /// Clean a batch and report what was dropped.
    pub fn clean_with_report(&self, batch: &RawBatch) -> (RollingWindow, CleanReport) {
        let mut report = CleanReport {
            received: batch.len(),
            ..Default::default()
        };

        let mut readings = Vec::with_capacity(batch.len());
        for record in batch.records() {
            match self.parse_record(record) {
                Ok(reading) => readings.push(reading),
                Err(Rejection::MissingField) => report.missing_field += 1,
                Err(Rejection::InvalidNumber) => report.invalid_number += 1,
                Err(Rejection::InvalidTimestamp) => report.invalid_timestamp += 1,
            }
        }

        let before = readings.len();
        let readings = dedup(readings);
        report.duplicates = before - readings.len();

        let before = readings.len();
        let readings = if readings.len() >= self.config.min_outlier_batch.max(1) {
            report.outlier_rejection_applied = true;
            self.reject_outliers(readings)
        } else {
            readings
        };
        report.outliers = before - readings.len();

        report.truncated = readings.len().saturating_sub(self.config.window_size);
        let window = RollingWindow::from_readings(readings, self.config.window_size);
        report.kept = window.len();

        log::debug!(
            "cleaned batch: received={} missing={} invalid={} bad_ts={} dup={} outliers={} truncated={} kept={}",
            report.received,
            report.missing_field,
            report.invalid_number,
            report.invalid_timestamp,
            report.duplicates,
            report.outliers,
            report.truncated,
            report.kept
        );

        (window, report)
    }

    fn parse_record(&self, record: &RawRecord) -> Result<Reading, Rejection> {
        let temperature = record
            .get(TEMPERATURE_FIELD)
            .filter(|v| !v.is_missing())
            .ok_or(Rejection::MissingField)?;
        let voltage = record
            .get(VOLTAGE_FIELD)
            .filter(|v| !v.is_missing())
            .ok_or(Rejection::MissingField)?;
        let timestamp = record.get(TIMESTAMP_FIELD).filter(|v| !v.is_missing());

        if self.config.require_timestamp && timestamp.is_none() {
            return Err(Rejection::MissingField);
        }

        let temperature = temperature.as_f64().ok_or(Rejection::InvalidNumber)?;
        let voltage = voltage.as_f64().ok_or(Rejection::InvalidNumber)?;

        let timestamp = timestamp.and_then(|v| v.as_text()).and_then(parse_timestamp);
        if self.config.require_timestamp && timestamp.is_none() {
            return Err(Rejection::InvalidTimestamp);
        }

        Ok(Reading {
            temperature,
            voltage,
            timestamp,
        })
    }

    fn reject_outliers(&self, readings: Vec<Reading>) -> Vec<Reading> {
        let k = self.config.fence_multiplier;
        let temps: Vec<f64> = readings.iter().map(|r| r.temperature).collect();
        let volts: Vec<f64> = readings.iter().map(|r| r.voltage).collect();

        let (Some(temp_fence), Some(volt_fence)) =
            (TukeyFence::fit(&temps, k), TukeyFence::fit(&volts, k))
        else {
            return readings;
        };

        readings
            .into_iter()
            .filter(|r| temp_fence.contains(r.temperature) && volt_fence.contains(r.voltage))
            .collect()
    }
}

/// Order-preserving removal of exact duplicates.
fn dedup(readings: Vec<Reading>) -> Vec<Reading> {
    let mut seen = HashSet::with_capacity(readings.len());
    readings
        .into_iter()
        .filter(|r| seen.insert((value_key(r.temperature), value_key(r.voltage), r.timestamp)))
        .collect()
}

// Adding 0.0 folds -0.0 into 0.0 so the two compare equal.
fn value_key(value: f64) -> u64 {
    (value + 0.0).to_bits()
}
