// Thermovolt - Sensor status pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Forward projection.
//!
//! Fits an independent normal distribution to each channel of the recent
//! window and draws one value per day. Temperature and voltage are drawn
//! separately, so no cross-correlation is modelled. Every synthetic pair is
//! then classified with the same frozen models as live data.

use crate::classifier::{Annotation, ClassifierAdapter};
use crate::error::SimulationError;
use crate::reading::RollingWindow;
use crate::stats::ColumnStats;
use crate::timeline::projection_timestamps;
use chrono::NaiveDateTime;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Fewest readings that give a sample standard deviation.
pub const MIN_PROJECTION_READINGS: usize = 2;

/// One projected day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticPoint {
    /// Zero-based day offset.
    pub day: usize,
    pub timestamp: NaiveDateTime,
    pub temperature: f64,
    pub voltage: f64,
    pub annotation: Annotation,
}

/// A projected series with the profile it was drawn from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticSeries {
    pub points: Vec<SyntheticPoint>,
    pub temperature_profile: ColumnStats,
    pub voltage_profile: ColumnStats,
}

impl SyntheticSeries {
    /// Number of projected days.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if nothing was projected.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Projected temperatures.
    pub fn temperatures(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.temperature).collect()
    }

    /// Projected voltages.
    pub fn voltages(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.voltage).collect()
    }
}

/// Generates synthetic forward series from a window's statistical profile.
#[derive(Debug, Clone)]
pub struct FutureSimulator {
    classifier: Arc<ClassifierAdapter>,
}

impl FutureSimulator {
    /// Create a simulator classifying through `classifier`.
    pub fn new(classifier: Arc<ClassifierAdapter>) -> Self {
        Self { classifier }
    }

    /// Project `days` points forward from `now`.
    pub fn project<R: Rng + ?Sized>(
        &self,
        window: &RollingWindow,
        days: usize,
        rng: &mut R,
        now: NaiveDateTime,
    ) -> Result<SyntheticSeries, SimulationError> {
        let draws = generate(window, days, rng)?;
        let timestamps = projection_timestamps(now, days);

        let points = draws
            .temperatures
            .iter()
            .zip(&draws.voltages)
            .zip(timestamps)
            .enumerate()
            .map(|(day, ((&temperature, &voltage), timestamp))| {
                let annotation = self
                    .classifier
                    .classify_values(temperature, voltage)
                    .into();
                SyntheticPoint {
                    day,
                    timestamp,
                    temperature,
                    voltage,
                    annotation,
                }
            })
            .collect();

        log::debug!(
            "projected {} days from {} readings (temp {:.2}±{:.2}, volt {:.3}±{:.3})",
            days,
            window.len(),
            draws.temperature_profile.mean,
            draws.temperature_profile.std,
            draws.voltage_profile.mean,
            draws.voltage_profile.std
        );

        Ok(SyntheticSeries {
            points,
            temperature_profile: draws.temperature_profile,
            voltage_profile: draws.voltage_profile,
        })
    }
}

/// Raw draws before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Draws {
    pub temperatures: Vec<f64>,
    pub voltages: Vec<f64>,
    pub temperature_profile: ColumnStats,
    pub voltage_profile: ColumnStats,
}

/// Draw `days` independent values per channel from `Normal(mean, std)`.
///
/// All temperature draws are taken before any voltage draw.
pub fn generate<R: Rng + ?Sized>(
    window: &RollingWindow,
    days: usize,
    rng: &mut R,
) -> Result<Draws, SimulationError> {
    if days == 0 {
        return Err(SimulationError::ZeroDays);
    }
    if window.len() < MIN_PROJECTION_READINGS {
        return Err(SimulationError::InsufficientData {
            required: MIN_PROJECTION_READINGS,
            actual: window.len(),
        });
    }

    let temperature_profile = ColumnStats::from_values(&window.temperatures());
    let voltage_profile = ColumnStats::from_values(&window.voltages());

    let temperatures = sample(&temperature_profile, "temperature", days, rng)?;
    let voltages = sample(&voltage_profile, "voltage", days, rng)?;

    Ok(Draws {
        temperatures,
        voltages,
        temperature_profile,
        voltage_profile,
    })
}

fn sample<R: Rng + ?Sized>(
    profile: &ColumnStats,
    channel: &'static str,
    days: usize,
    rng: &mut R,
) -> Result<Vec<f64>, SimulationError> {
    let invalid = || SimulationError::InvalidDistribution {
        channel,
        mean: profile.mean,
        std: profile.std,
    };
    if !profile.is_valid() {
        return Err(invalid());
    }
    let normal = Normal::new(profile.mean, profile.std).map_err(|_| invalid())?;
    Ok((0..days).map(|_| normal.sample(rng)).collect())
}
