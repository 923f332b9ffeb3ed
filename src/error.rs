// Thermovolt - Sensor status pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for Thermovolt
//!
//! Row-level data problems are not errors: the cleaner excludes such rows and
//! counts them in a [`CleanReport`](crate::cleaner::CleanReport). Everything
//! here aborts the operation that raised it.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Thermovolt operations
pub type Result<T> = std::result::Result<T, ThermovoltError>;

/// Main error type for Thermovolt operations
#[derive(Error, Debug)]
pub enum ThermovoltError {
    /// Model loading error (startup-fatal)
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Per-reading classification error
    #[error("Classification error: {0}")]
    Classify(#[from] ClassifyError),

    /// Forward projection error
    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),

    /// Ingestion error
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors while loading the frozen scaler and classifiers
#[derive(Error, Debug)]
pub enum ModelError {
    /// Model file does not exist
    #[error("Model file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Model file could not be read
    #[error("Failed to read model file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Model file is not valid JSON for the expected model type
    #[error("Malformed model file {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Scaler was fitted on a different feature order
    #[error("Feature order mismatch: expected {expected:?}, model has {actual:?}")]
    FeatureOrder {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// Internally inconsistent model parameters
    #[error("Invalid model '{name}': {reason}")]
    Invalid { name: String, reason: String },
}

/// Errors while classifying a single reading
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifyError {
    /// A feature is NaN or infinite
    #[error("Non-finite feature {feature}: {value}")]
    NonFiniteFeature { feature: &'static str, value: f64 },

    /// The scaler produced a non-finite output
    #[error("Scaler produced non-finite output for feature {feature}")]
    ScalerOutput { feature: &'static str },

    /// The predictor could not produce a label
    #[error("Predictor '{predictor}' failed: {reason}")]
    Predictor { predictor: String, reason: String },
}

/// Errors during forward projection
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// Window too small for a sample standard deviation
    #[error("Insufficient data: need at least {required} readings, have {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// Requested zero days
    #[error("Projection length must be at least one day")]
    ZeroDays,

    /// Mean or standard deviation unusable for sampling
    #[error("Invalid distribution for {channel}: mean={mean}, std={std}")]
    InvalidDistribution {
        channel: &'static str,
        mean: f64,
        std: f64,
    },
}

/// Errors while pulling records from a data source
#[derive(Error, Debug)]
pub enum SourceError {
    /// Source could not be reached
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// I/O failure while reading
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload could not be parsed
    #[error("Malformed payload: {0}")]
    Malformed(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A value is out of range
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// Unknown preset name
    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    /// Config file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ThermovoltError::Simulation(SimulationError::InsufficientData {
            required: 2,
            actual: 1,
        });
        let msg = format!("{}", err);
        assert!(msg.contains("at least 2"));
        assert!(msg.contains("have 1"));
    }

    #[test]
    fn test_error_conversion() {
        let classify_err = ClassifyError::NonFiniteFeature {
            feature: "Temperature",
            value: f64::NAN,
        };
        let err: ThermovoltError = classify_err.into();
        assert!(matches!(err, ThermovoltError::Classify(_)));
    }

    #[test]
    fn test_model_not_found_mentions_path() {
        let err = ModelError::NotFound {
            path: PathBuf::from("/models/scaler.json"),
        };
        assert!(err.to_string().contains("scaler.json"));
    }
}
