// Thermovolt Monitor - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics for the poll loop.
//!
//! This module defines all Prometheus metrics exposed by the monitor
//! and provides functions to update them from live views.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Encoder, Gauge, GaugeVec,
    TextEncoder,
};
use thermovolt::{Channel, CleanReport, LiveView, StatusBand};

lazy_static! {
    // ============================================================
    // Poll loop
    // ============================================================

    /// Ticks by outcome (refreshed, reused, fetch_failed).
    pub static ref POLL_TICKS_TOTAL: CounterVec = register_counter_vec!(
        "thermovolt_poll_ticks_total",
        "Poll ticks by outcome",
        &["outcome"]
    ).unwrap();

    /// Wall time of the last tick, fetch included.
    pub static ref LAST_TICK_SECONDS: Gauge = register_gauge!(
        "thermovolt_last_tick_seconds",
        "Duration of the last poll tick in seconds"
    ).unwrap();

    // ============================================================
    // Live window
    // ============================================================

    /// Readings in the rendered window.
    pub static ref WINDOW_READINGS: Gauge = register_gauge!(
        "thermovolt_window_readings",
        "Readings in the current live window"
    ).unwrap();

    /// Rows dropped while cleaning the last batch, by reason.
    pub static ref ROWS_DROPPED: GaugeVec = register_gauge_vec!(
        "thermovolt_rows_dropped",
        "Rows dropped while cleaning the last batch",
        &["reason"]
    ).unwrap();

    /// Readings per status band in the current window.
    pub static ref STATUS_READINGS: GaugeVec = register_gauge_vec!(
        "thermovolt_status_readings",
        "Readings per channel and status band in the current window",
        &["channel", "band"]
    ).unwrap();

    /// Non-normal statuses in the current window.
    pub static ref ACTIVE_ALERTS: Gauge = register_gauge!(
        "thermovolt_active_alerts",
        "Non-normal statuses in the current window"
    ).unwrap();
}

/// Tick outcome label.
pub fn record_tick(outcome: &str, seconds: f64) {
    POLL_TICKS_TOTAL.with_label_values(&[outcome]).inc();
    LAST_TICK_SECONDS.set(seconds);
}

fn update_drop_metrics(report: &CleanReport) {
    for (reason, count) in [
        ("missing_field", report.missing_field),
        ("invalid_number", report.invalid_number),
        ("invalid_timestamp", report.invalid_timestamp),
        ("duplicate", report.duplicates),
        ("outlier", report.outliers),
        ("truncated", report.truncated),
    ] {
        ROWS_DROPPED.with_label_values(&[reason]).set(count as f64);
    }
}

/// Update window metrics from a rendered view.
pub fn update_view_metrics(view: &LiveView) {
    WINDOW_READINGS.set(view.len() as f64);
    update_drop_metrics(&view.report);

    for channel in [Channel::Temperature, Channel::Voltage] {
        let counts = view.summary.counts(channel);
        let label = channel.to_string();
        for band in StatusBand::ALL {
            STATUS_READINGS
                .with_label_values(&[label.as_str(), band.as_str()])
                .set(counts.get(band) as f64);
        }
        STATUS_READINGS
            .with_label_values(&[label.as_str(), "unclassified"])
            .set(counts.unclassified as f64);
    }

    ACTIVE_ALERTS.set(view.summary.alerts.len() as f64);
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
