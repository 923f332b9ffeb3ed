// Thermovolt - Sensor status pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Pipeline context and views.
//!
//! [`PipelineContext`] is built once from configuration and loaded models and
//! is then shared read-only. It produces the annotated live view for the poll
//! loop and projections for ad hoc requests. Nothing here keeps state between
//! calls: each call starts from the batch it is handed.

use crate::classifier::{Annotation, ClassifierAdapter};
use crate::cleaner::{CleanReport, Cleaner, CleanerConfig};
use crate::config::PipelineConfig;
use crate::error::{ConfigError, Result};
use crate::model::{ClassificationModels, ModelStore};
use crate::reading::{RawBatch, Reading, RollingWindow};
use crate::simulator::{FutureSimulator, SyntheticSeries};
use crate::source::RecordSource;
use crate::status::{StatusBand, StatusCode};
use chrono::NaiveDateTime;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Sensor channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Temperature,
    Voltage,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Temperature => f.write_str("temperature"),
            Channel::Voltage => f.write_str("voltage"),
        }
    }
}

/// Per-band counts for one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandCounts {
    pub low: usize,
    pub normal: usize,
    pub high: usize,
    pub unknown: usize,
    /// Readings the models could not label.
    pub unclassified: usize,
}

impl BandCounts {
    fn record(&mut self, band: StatusBand) {
        match band {
            StatusBand::Low => self.low += 1,
            StatusBand::Normal => self.normal += 1,
            StatusBand::High => self.high += 1,
            StatusBand::Unknown => self.unknown += 1,
        }
    }

    /// Count for one band.
    pub fn get(&self, band: StatusBand) -> usize {
        match band {
            StatusBand::Low => self.low,
            StatusBand::Normal => self.normal,
            StatusBand::High => self.high,
            StatusBand::Unknown => self.unknown,
        }
    }

    /// Everything counted, unclassified included.
    pub fn total(&self) -> usize {
        self.low + self.normal + self.high + self.unknown + self.unclassified
    }
}

/// A non-normal status worth surfacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusAlert {
    /// Position in the view.
    pub index: usize,
    pub timestamp: Option<NaiveDateTime>,
    pub channel: Channel,
    pub code: StatusCode,
    pub band: StatusBand,
}

/// Band counts and alerts over a set of annotations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub temperature: BandCounts,
    pub voltage: BandCounts,
    pub alerts: Vec<StatusAlert>,
}

impl StatusSummary {
    /// Summarise `(timestamp, annotation)` pairs in order.
    pub fn from_annotations<'a, I>(items: I) -> Self
    where
        I: IntoIterator<Item = (Option<NaiveDateTime>, &'a Annotation)>,
    {
        let mut summary = Self::default();
        for (index, (timestamp, annotation)) in items.into_iter().enumerate() {
            let Some(pair) = annotation.status() else {
                summary.temperature.unclassified += 1;
                summary.voltage.unclassified += 1;
                continue;
            };
            for (channel, code) in [
                (Channel::Temperature, pair.temperature),
                (Channel::Voltage, pair.voltage),
            ] {
                let band = code.band();
                match channel {
                    Channel::Temperature => summary.temperature.record(band),
                    Channel::Voltage => summary.voltage.record(band),
                }
                if band.is_alert() {
                    summary.alerts.push(StatusAlert {
                        index,
                        timestamp,
                        channel,
                        code,
                        band,
                    });
                }
            }
        }
        summary
    }

    /// Summarise a projection.
    pub fn from_series(series: &SyntheticSeries) -> Self {
        Self::from_annotations(
            series
                .points
                .iter()
                .map(|p| (Some(p.timestamp), &p.annotation)),
        )
    }

    /// Counts for one channel.
    pub fn counts(&self, channel: Channel) -> &BandCounts {
        match channel {
            Channel::Temperature => &self.temperature,
            Channel::Voltage => &self.voltage,
        }
    }

    /// True if any reading is outside the normal band.
    pub fn has_alerts(&self) -> bool {
        !self.alerts.is_empty()
    }
}

/// A cleaned reading with its display timestamp and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedReading {
    pub reading: Reading,
    /// Source clock time moved onto the day the view was generated.
    pub display_timestamp: Option<NaiveDateTime>,
    pub annotation: Annotation,
}

/// The annotated view the poll loop renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveView {
    pub window: RollingWindow,
    pub readings: Vec<AnnotatedReading>,
    pub report: CleanReport,
    pub summary: StatusSummary,
    /// Fingerprint of the raw batch this view was built from.
    pub fingerprint: u64,
    pub generated_at: NaiveDateTime,
}

impl LiveView {
    /// Number of readings shown.
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// True if nothing survived cleaning.
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    fn summarise(readings: &[AnnotatedReading]) -> StatusSummary {
        StatusSummary::from_annotations(
            readings
                .iter()
                .map(|r| (r.display_timestamp, &r.annotation)),
        )
    }
}

fn display_timestamp(reading: &Reading, now: NaiveDateTime) -> Option<NaiveDateTime> {
    reading
        .timestamp
        .map(|ts| crate::timeline::rebase_onto_day(ts, now))
}

/// Shared, read-only pipeline state.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    config: PipelineConfig,
    cleaner: Cleaner,
    classifier: Arc<ClassifierAdapter>,
    simulator: FutureSimulator,
}

impl PipelineContext {
    /// Build a context from a validated configuration and loaded models.
    pub fn new(
        config: PipelineConfig,
        models: ClassificationModels,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let classifier = Arc::new(ClassifierAdapter::new(models));
        Ok(Self {
            cleaner: Cleaner::with_config(CleanerConfig::from(&config)),
            simulator: FutureSimulator::new(Arc::clone(&classifier)),
            classifier,
            config,
        })
    }

    /// Load models from `model_dir` and build a context.
    pub fn load(config: PipelineConfig, model_dir: impl AsRef<Path>) -> Result<Self> {
        let store = ModelStore::open(model_dir.as_ref())?;
        let models = ClassificationModels::load(&store)?;
        Ok(Self::new(config, models)?)
    }

    /// Active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Shared classifier.
    pub fn classifier(&self) -> &Arc<ClassifierAdapter> {
        &self.classifier
    }

    /// Clean a batch into a window.
    pub fn clean(&self, batch: &RawBatch) -> (RollingWindow, CleanReport) {
        self.cleaner.clean_with_report(batch)
    }

    /// Clean, rebase timestamps onto `now`'s day and classify every reading.
    pub fn run_live(&self, batch: &RawBatch, now: NaiveDateTime) -> LiveView {
        let (window, report) = self.clean(batch);

        let readings: Vec<AnnotatedReading> = window
            .iter()
            .map(|reading| AnnotatedReading {
                reading: *reading,
                display_timestamp: display_timestamp(reading, now),
                annotation: self.classifier.annotate(reading),
            })
            .collect();
        let summary = LiveView::summarise(&readings);

        if summary.has_alerts() {
            log::info!(
                "{} readings, {} alerts ({} dropped while cleaning)",
                readings.len(),
                summary.alerts.len(),
                report.dropped()
            );
        }

        LiveView {
            window,
            readings,
            report,
            summary,
            fingerprint: batch.fingerprint(),
            generated_at: now,
        }
    }

    /// Re-apply timestamp rebasing to an existing view without reclassifying.
    pub fn restamp(&self, view: &LiveView, now: NaiveDateTime) -> LiveView {
        let readings: Vec<AnnotatedReading> = view
            .readings
            .iter()
            .map(|r| AnnotatedReading {
                display_timestamp: display_timestamp(&r.reading, now),
                ..r.clone()
            })
            .collect();
        let summary = LiveView::summarise(&readings);
        LiveView {
            window: view.window.clone(),
            readings,
            report: view.report,
            summary,
            fingerprint: view.fingerprint,
            generated_at: now,
        }
    }

    /// Project `days` forward from a window.
    pub fn project<R: Rng + ?Sized>(
        &self,
        window: &RollingWindow,
        days: usize,
        rng: &mut R,
        now: NaiveDateTime,
    ) -> Result<SyntheticSeries> {
        Ok(self.simulator.project(window, days, rng, now)?)
    }

    /// Fetch a fresh batch, clean it and project the configured number of days.
    ///
    /// Independent of any poll loop: the window is built locally for this call.
    pub fn project_from_source<S, R>(
        &self,
        source: &S,
        rng: &mut R,
        now: NaiveDateTime,
    ) -> Result<SyntheticSeries>
    where
        S: RecordSource + ?Sized,
        R: Rng + ?Sized,
    {
        let batch = source.fetch_all_records()?;
        let (window, _) = self.clean(&batch);
        self.project(&window, self.config.projection_days, rng, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SimulationError, ThermovoltError};
    use crate::model::{ClassifierSpec, FrozenClassifier, StandardScaler};
    use crate::reading::RawRecord;
    use crate::source::MemorySource;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn context(config: PipelineConfig) -> PipelineContext {
        let banded = |name: &str, feature| {
            FrozenClassifier::new(
                name,
                ClassifierSpec::Banded {
                    feature,
                    low_below: -1.0,
                    high_above: 1.0,
                },
            )
        };
        let models = ClassificationModels::new(
            StandardScaler::new([25.0, 5.0], [5.0, 0.5]),
            banded("temp_status", 0),
            banded("volt_status", 1),
        );
        PipelineContext::new(config, models).unwrap()
    }

    fn at(d: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, d)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn row(t: f64, v: f64, ts: &str) -> RawRecord {
        RawRecord::new()
            .with("Temperature", t)
            .with("Voltage", v)
            .with("Timestamp", ts)
    }

    #[test]
    fn test_run_live_annotates_and_rebases() {
        let ctx = context(PipelineConfig::default());
        let batch: RawBatch = vec![
            row(25.0, 5.0, "2024-01-03 08:15:30"),
            row(40.0, 5.0, "2024-01-03 09:00:00"),
        ]
        .into();

        let now = at(20, 18, 0, 0);
        let view = ctx.run_live(&batch, now);

        assert_eq!(view.len(), 2);
        assert_eq!(view.readings[0].display_timestamp, Some(at(20, 8, 15, 30)));
        // Source timestamp is kept untouched.
        assert_eq!(
            view.readings[0].reading.timestamp.map(|t| t.date()),
            NaiveDate::from_ymd_opt(2024, 1, 3)
        );
        assert_eq!(view.summary.temperature.normal, 1);
        assert_eq!(view.summary.temperature.high, 1);
        assert_eq!(view.summary.voltage.normal, 2);
        assert_eq!(view.summary.alerts.len(), 1);
        assert_eq!(view.summary.alerts[0].channel, Channel::Temperature);
        assert_eq!(view.summary.alerts[0].band, StatusBand::High);
        assert_eq!(view.fingerprint, batch.fingerprint());
    }

    #[test]
    fn test_restamp_moves_day_only() {
        let ctx = context(PipelineConfig::default());
        let batch: RawBatch = vec![row(25.0, 5.0, "2024-01-03 08:15:30")].into();
        let view = ctx.run_live(&batch, at(20, 18, 0, 0));

        let next = ctx.restamp(&view, at(21, 0, 0, 12));
        assert_eq!(next.readings[0].display_timestamp, Some(at(21, 8, 15, 30)));
        assert_eq!(next.readings[0].annotation, view.readings[0].annotation);
        assert_eq!(next.generated_at, at(21, 0, 0, 12));
        assert_eq!(next.fingerprint, view.fingerprint);
    }

    #[test]
    fn test_empty_batch_gives_empty_view() {
        let ctx = context(PipelineConfig::default());
        let view = ctx.run_live(&RawBatch::default(), at(20, 0, 0, 0));
        assert!(view.is_empty());
        assert_eq!(view.summary, StatusSummary::default());
    }

    #[test]
    fn test_unknown_label_counted_as_unknown() {
        let scaler = StandardScaler::identity();
        let odd = FrozenClassifier::new(
            "temp_status",
            ClassifierSpec::KNearest {
                k: 1,
                points: vec![[0.0, 0.0]],
                labels: vec![7],
            },
        );
        let volt = FrozenClassifier::new(
            "volt_status",
            ClassifierSpec::KNearest {
                k: 1,
                points: vec![[0.0, 0.0]],
                labels: vec![2],
            },
        );
        let ctx = PipelineContext::new(
            PipelineConfig::default(),
            ClassificationModels::new(scaler, odd, volt),
        )
        .unwrap();

        let batch: RawBatch = vec![RawRecord::new()
            .with("Temperature", 1.0)
            .with("Voltage", 1.0)]
        .into();
        let view = ctx.run_live(&batch, at(20, 0, 0, 0));
        assert_eq!(view.summary.temperature.unknown, 1);
        assert_eq!(view.summary.alerts[0].code, StatusCode(7));
        assert_eq!(view.summary.alerts[0].band, StatusBand::Unknown);
    }

    #[test]
    fn test_project_from_source_uses_configured_days() {
        let ctx = context(PipelineConfig::default().with_projection_days(7));
        let source = MemorySource::new(
            vec![
                row(24.0, 5.0, "08:00:00"),
                row(25.0, 5.1, "09:00:00"),
                row(26.0, 4.9, "10:00:00"),
            ]
            .into(),
        );
        let mut rng = StdRng::seed_from_u64(11);

        let series = ctx
            .project_from_source(&source, &mut rng, at(20, 12, 0, 0))
            .unwrap();
        assert_eq!(series.len(), 7);

        let summary = StatusSummary::from_series(&series);
        assert_eq!(summary.temperature.total(), 7);
    }

    #[test]
    fn test_project_from_source_propagates_errors() {
        let ctx = context(PipelineConfig::default());
        let source = MemorySource::new(vec![row(24.0, 5.0, "08:00:00")].into());
        let mut rng = StdRng::seed_from_u64(1);

        let err = ctx
            .project_from_source(&source, &mut rng, at(20, 0, 0, 0))
            .unwrap_err();
        assert!(matches!(
            err,
            ThermovoltError::Simulation(SimulationError::InsufficientData { .. })
        ));

        source.fail_next("offline");
        let err = ctx
            .project_from_source(&source, &mut rng, at(20, 0, 0, 0))
            .unwrap_err();
        assert!(matches!(err, ThermovoltError::Source(_)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let models = ClassificationModels::new(
            StandardScaler::identity(),
            FrozenClassifier::new(
                "temp_status",
                ClassifierSpec::KNearest {
                    k: 1,
                    points: vec![[0.0, 0.0]],
                    labels: vec![2],
                },
            ),
            FrozenClassifier::new(
                "volt_status",
                ClassifierSpec::KNearest {
                    k: 1,
                    points: vec![[0.0, 0.0]],
                    labels: vec![2],
                },
            ),
        );
        let config = PipelineConfig::default().with_window_size(0);
        assert!(PipelineContext::new(config, models).is_err());
    }
}
