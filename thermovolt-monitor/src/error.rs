// Thermovolt Monitor - Error types
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

use thiserror::Error;

/// Monitor errors. Any of these ends the process.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] thermovolt::ThermovoltError),

    #[error("Configuration error: {0}")]
    Config(#[from] thermovolt::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Poller task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
