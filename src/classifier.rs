// Thermovolt - Sensor status pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Status classification module
//!
//! Wraps the frozen scaler and the two frozen classifiers behind one call
//! that turns a reading into a temperature status and a voltage status.

use crate::error::ClassifyError;
use crate::model::{ClassificationModels, Features, FEATURE_ORDER};
use crate::reading::Reading;
use crate::status::{StatusBand, StatusCode};
use serde::{Deserialize, Serialize};

/// Temperature and voltage status for one reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusPair {
    pub temperature: StatusCode,
    pub voltage: StatusCode,
}

impl StatusPair {
    /// Create a pair.
    pub fn new(temperature: StatusCode, voltage: StatusCode) -> Self {
        Self {
            temperature,
            voltage,
        }
    }

    /// Temperature band.
    pub fn temperature_band(&self) -> StatusBand {
        self.temperature.band()
    }

    /// Voltage band.
    pub fn voltage_band(&self) -> StatusBand {
        self.voltage.band()
    }
}

/// Outcome of classifying one reading.
///
/// `Unclassified` means the models could not produce a label at all. A label
/// outside 1..=3 is still `Classified` and interprets as
/// [`StatusBand::Unknown`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Annotation {
    Classified(StatusPair),
    Unclassified { reason: String },
}

impl Annotation {
    /// Status pair, if classified.
    pub fn status(&self) -> Option<StatusPair> {
        match self {
            Annotation::Classified(pair) => Some(*pair),
            Annotation::Unclassified { .. } => None,
        }
    }

    /// True if classified.
    pub fn is_classified(&self) -> bool {
        matches!(self, Annotation::Classified(_))
    }
}

impl From<Result<StatusPair, ClassifyError>> for Annotation {
    fn from(result: Result<StatusPair, ClassifyError>) -> Self {
        match result {
            Ok(pair) => Annotation::Classified(pair),
            Err(e) => Annotation::Unclassified {
                reason: e.to_string(),
            },
        }
    }
}

/// Uniform `classify(reading)` over the frozen models.
///
/// Holds only shared read-only models, so one adapter can serve any number of
/// concurrent callers.
#[derive(Debug, Clone)]
pub struct ClassifierAdapter {
    models: ClassificationModels,
}

impl ClassifierAdapter {
    /// Create an adapter over loaded models.
    pub fn new(models: ClassificationModels) -> Self {
        Self { models }
    }

    /// Underlying models.
    pub fn models(&self) -> &ClassificationModels {
        &self.models
    }

    /// Classify a reading.
    pub fn classify(&self, reading: &Reading) -> Result<StatusPair, ClassifyError> {
        self.classify_values(reading.temperature, reading.voltage)
    }

    /// Classify a raw (temperature, voltage) pair.
    pub fn classify_values(
        &self,
        temperature: f64,
        voltage: f64,
    ) -> Result<StatusPair, ClassifyError> {
        let features: Features = [temperature, voltage];
        for (&name, value) in FEATURE_ORDER.iter().zip(features) {
            if !value.is_finite() {
                return Err(ClassifyError::NonFiniteFeature {
                    feature: name,
                    value,
                });
            }
        }

        let scaled = self.models.scaler.transform(features);
        if let Some(i) = scaled.iter().position(|v| !v.is_finite()) {
            return Err(ClassifyError::ScalerOutput {
                feature: FEATURE_ORDER[i],
            });
        }

        let pair = StatusPair {
            temperature: self.models.temperature.predict(scaled)?,
            voltage: self.models.voltage.predict(scaled)?,
        };

        log::debug!(
            "temperature={} voltage={} -> temp_status={} volt_status={}",
            temperature,
            voltage,
            pair.temperature,
            pair.voltage
        );

        Ok(pair)
    }

    /// Classify a reading into an [`Annotation`], logging failures.
    pub fn annotate(&self, reading: &Reading) -> Annotation {
        let result = self.classify(reading);
        if let Err(ref e) = result {
            log::warn!(
                "reading ({}, {}) left unclassified: {}",
                reading.temperature,
                reading.voltage,
                e
            );
        }
        result.into()
    }
}
