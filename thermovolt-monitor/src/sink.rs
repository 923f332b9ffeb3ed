// Thermovolt Monitor - Presentation sinks
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Presentation sinks.
//!
//! A sink receives complete views only. Rendering a view is a single call, so
//! a stopping poller never leaves half a view behind.

use serde::Serialize;
use std::io::{self, Write};
use std::sync::Mutex;
use thermovolt::{LiveView, StatusSummary, SyntheticSeries};
use tracing::{info, warn};

/// Receives annotated views.
pub trait PresentationSink: Send + Sync {
    /// Render the live window.
    fn render_live(&self, view: &LiveView) -> io::Result<()>;

    /// Render a forward projection.
    fn render_projection(&self, series: &SyntheticSeries, summary: &StatusSummary)
        -> io::Result<()>;
}

/// Logs a one-line summary per view and a warning per alert.
#[derive(Debug, Default)]
pub struct LogSink;

impl PresentationSink for LogSink {
    fn render_live(&self, view: &LiveView) -> io::Result<()> {
        let summary = &view.summary;
        info!(
            readings = view.len(),
            dropped = view.report.dropped(),
            temp_normal = summary.temperature.normal,
            volt_normal = summary.voltage.normal,
            "live window at {}",
            view.generated_at
        );
        for alert in &summary.alerts {
            let at = alert
                .timestamp
                .map(|t| t.to_string())
                .unwrap_or_else(|| format!("#{}", alert.index));
            warn!("{} {} (code {}) at {}", alert.channel, alert.band, alert.code, at);
        }
        Ok(())
    }

    fn render_projection(
        &self,
        series: &SyntheticSeries,
        summary: &StatusSummary,
    ) -> io::Result<()> {
        info!(
            "projection: {} days, temperature {:.2}±{:.2}, voltage {:.3}±{:.3}",
            series.len(),
            series.temperature_profile.mean,
            series.temperature_profile.std,
            series.voltage_profile.mean,
            series.voltage_profile.std
        );
        for point in &series.points {
            info!(
                "{} temperature={:.2} voltage={:.3} {:?}",
                point.timestamp,
                point.temperature,
                point.voltage,
                point.annotation.status()
            );
        }
        if summary.has_alerts() {
            warn!("{} projected alerts", summary.alerts.len());
        }
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Line<'a> {
    Live(&'a LiveView),
    Projection {
        series: &'a SyntheticSeries,
        summary: &'a StatusSummary,
    },
}

/// Writes one JSON document per view.
pub struct JsonLinesSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesSink {
    /// Sink writing to `out`.
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }

    /// Sink writing to stdout.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    fn write_line(&self, line: &Line<'_>) -> io::Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "sink lock poisoned"))?;
        serde_json::to_writer(&mut *out, line)?;
        out.write_all(b"\n")?;
        out.flush()
    }
}

impl PresentationSink for JsonLinesSink {
    fn render_live(&self, view: &LiveView) -> io::Result<()> {
        self.write_line(&Line::Live(view))
    }

    fn render_projection(
        &self,
        series: &SyntheticSeries,
        summary: &StatusSummary,
    ) -> io::Result<()> {
        self.write_line(&Line::Projection { series, summary })
    }
}

/// Keeps every rendered view in memory.
#[cfg(test)]
#[derive(Default)]
pub struct CollectingSink {
    pub live: Mutex<Vec<LiveView>>,
    pub projections: Mutex<Vec<SyntheticSeries>>,
}

#[cfg(test)]
impl CollectingSink {
    pub fn live_views(&self) -> Vec<LiveView> {
        self.live.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl PresentationSink for CollectingSink {
    fn render_live(&self, view: &LiveView) -> io::Result<()> {
        self.live.lock().unwrap().push(view.clone());
        Ok(())
    }

    fn render_projection(
        &self,
        series: &SyntheticSeries,
        _summary: &StatusSummary,
    ) -> io::Result<()> {
        self.projections.lock().unwrap().push(series.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use thermovolt::{
        ClassificationModels, ClassifierSpec, FrozenClassifier, PipelineConfig, PipelineContext,
        RawBatch, RawRecord, StandardScaler,
    };

    /// Writer that shares its buffer with the test.
    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn view() -> LiveView {
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
        let ctx = PipelineContext::new(PipelineConfig::default(), models).unwrap();
        let batch: RawBatch = vec![
            RawRecord::new().with("Temperature", 25.0).with("Voltage", 5.0),
            RawRecord::new().with("Temperature", 10.0).with("Voltage", 5.0),
        ]
        .into();
        ctx.run_live(&batch, chrono::Local::now().naive_local())
    }

    #[test]
    fn test_json_lines_sink() {
        let buffer = Shared::default();
        let sink = JsonLinesSink::new(buffer.clone());
        sink.render_live(&view()).unwrap();
        sink.render_live(&view()).unwrap();

        let bytes = buffer.0.lock().unwrap().clone();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let doc: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(doc["kind"], "live");
        assert_eq!(doc["readings"].as_array().unwrap().len(), 2);
        assert_eq!(doc["summary"]["temperature"]["low"], 1);
    }

    #[test]
    fn test_log_sink_accepts_alerts() {
        let view = view();
        assert!(view.summary.has_alerts());
        assert!(LogSink.render_live(&view).is_ok());
    }
}
