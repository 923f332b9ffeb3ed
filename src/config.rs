// Thermovolt - Sensor status pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Pipeline configuration.
//!
//! One parameterised configuration replaces the per-deployment variants that
//! differed only in window size, poll interval and timestamp handling.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default number of readings kept in the rolling window.
pub const DEFAULT_WINDOW_SIZE: usize = 50;

/// Default poll interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 12;

/// Default length of the forward projection in days.
pub const DEFAULT_PROJECTION_DAYS: usize = 30;

/// Default Tukey fence multiplier.
pub const DEFAULT_FENCE_MULTIPLIER: f64 = 1.5;

/// Batches smaller than this skip outlier rejection.
pub const DEFAULT_MIN_OUTLIER_BATCH: usize = 4;

/// Configuration shared by every pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum readings kept after cleaning (most recent suffix).
    pub window_size: usize,
    /// Seconds between poll ticks.
    pub poll_interval_secs: u64,
    /// Drop records without a parsable timestamp.
    pub require_timestamp: bool,
    /// Minimum batch size for which Tukey fences are applied.
    pub min_outlier_batch: usize,
    /// IQR multiplier for the Tukey fences.
    pub fence_multiplier: f64,
    /// Days generated by the forward projection.
    pub projection_days: usize,
    /// Re-apply wall-clock timestamp rebasing when an unchanged batch is reused.
    pub refresh_timestamps_on_reuse: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            require_timestamp: false,
            min_outlier_batch: DEFAULT_MIN_OUTLIER_BATCH,
            fence_multiplier: DEFAULT_FENCE_MULTIPLIER,
            projection_days: DEFAULT_PROJECTION_DAYS,
            refresh_timestamps_on_reuse: true,
        }
    }
}

impl PipelineConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Window of 50 readings polled every 12 seconds, timestamps optional.
    pub fn basic() -> Self {
        Self::default()
    }

    /// Window of 50 timestamped readings polled every 30 seconds.
    pub fn timestamped() -> Self {
        Self {
            poll_interval_secs: 30,
            require_timestamp: true,
            ..Default::default()
        }
    }

    /// Window of 100 readings polled every 15 seconds.
    pub fn extended() -> Self {
        Self {
            window_size: 100,
            poll_interval_secs: 15,
            ..Default::default()
        }
    }

    /// Look up a preset by name.
    pub fn preset(name: &str) -> Result<Self, ConfigError> {
        match name.to_lowercase().as_str() {
            "basic" => Ok(Self::basic()),
            "timestamped" => Ok(Self::timestamped()),
            "extended" => Ok(Self::extended()),
            _ => Err(ConfigError::UnknownPreset(name.to_string())),
        }
    }

    /// Load and validate a JSON config file. Missing fields take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Set window size.
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    /// Set poll interval in seconds.
    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    /// Require timestamps on every record.
    pub fn with_required_timestamp(mut self, required: bool) -> Self {
        self.require_timestamp = required;
        self
    }

    /// Set projection length.
    pub fn with_projection_days(mut self, days: usize) -> Self {
        self.projection_days = days;
        self
    }

    /// Choose whether reused views get fresh timestamps.
    pub fn with_refresh_on_reuse(mut self, refresh: bool) -> Self {
        self.refresh_timestamps_on_reuse = refresh;
        self
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "window_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.fence_multiplier.is_finite() && self.fence_multiplier > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "fence_multiplier",
                reason: format!("must be a positive number, got {}", self.fence_multiplier),
            });
        }
        if self.projection_days == 0 {
            return Err(ConfigError::InvalidValue {
                field: "projection_days",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
