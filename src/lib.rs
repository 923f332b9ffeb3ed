//! # Thermovolt - Sensor status pipeline
//!
//! Cleans temperature and voltage readings, classifies each one with frozen
//! models and projects the recent behaviour forward.
//!
//! ## Key Features
//!
//! - **Robust cleaning**: missing, malformed and duplicate rows are dropped,
//!   outliers rejected with Tukey fences, and the most recent readings kept
//! - **Status classification**: one call per reading yields a temperature and
//!   a voltage status, interpreted as low, normal, high or unknown
//! - **Forward projection**: per-channel normal draws, classified like live data
//!
//! ## Quick Start
//!
//! ```rust
//! use thermovolt::{
//!     ClassificationModels, ClassifierSpec, FrozenClassifier, PipelineConfig,
//!     PipelineContext, RawBatch, RawRecord, StandardScaler, StatusBand,
//! };
//! use chrono::NaiveDate;
//!
//! let banded = |name: &str, feature| {
//!     FrozenClassifier::new(
//!         name,
//!         ClassifierSpec::Banded { feature, low_below: -1.0, high_above: 1.0 },
//!     )
//! };
//! let models = ClassificationModels::new(
//!     StandardScaler::new([25.0, 5.0], [5.0, 0.5]),
//!     banded("temp_status", 0),
//!     banded("volt_status", 1),
//! );
//! let context = PipelineContext::new(PipelineConfig::default(), models).unwrap();
//!
//! let batch: RawBatch = vec![
//!     RawRecord::new().with("Temperature", 25.0).with("Voltage", 5.0),
//!     RawRecord::new().with("Temperature", 40.0).with("Voltage", 5.0),
//! ]
//! .into();
//!
//! let now = NaiveDate::from_ymd_opt(2024, 7, 20)
//!     .unwrap()
//!     .and_hms_opt(12, 0, 0)
//!     .unwrap();
//! let view = context.run_live(&batch, now);
//!
//! assert_eq!(view.len(), 2);
//! assert_eq!(view.summary.alerts[0].band, StatusBand::High);
//! ```
//!
//! ## Modules
//!
//! - [`cleaner`]: Batch cleaning into a rolling window
//! - [`classifier`]: Uniform classification over the frozen models
//! - [`status`]: Status codes and the central interpreter
//! - [`simulator`]: Forward projection
//! - [`pipeline`]: Shared context, live views and summaries
//! - [`source`]: Record sources

// Modules
pub mod classifier;
pub mod cleaner;
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod reading;
pub mod simulator;
pub mod source;
pub mod stats;
pub mod status;
pub mod timeline;

// Re-exports for convenient access
pub use classifier::{Annotation, ClassifierAdapter, StatusPair};
pub use cleaner::{CleanReport, Cleaner, CleanerConfig};
pub use config::PipelineConfig;
pub use error::{
    ClassifyError, ConfigError, ModelError, Result, SimulationError, SourceError, ThermovoltError,
};
pub use model::{
    ClassificationModels, ClassifierSpec, FeatureScaler, FrozenClassifier, ModelStore,
    StandardScaler, StatusPredictor,
};
pub use pipeline::{
    AnnotatedReading, BandCounts, Channel, LiveView, PipelineContext, StatusAlert, StatusSummary,
};
pub use reading::{RawBatch, RawRecord, RawValue, Reading, RollingWindow};
pub use simulator::{FutureSimulator, SyntheticPoint, SyntheticSeries};
pub use source::{MemorySource, RecordSource};
pub use stats::{ColumnStats, TukeyFence};
pub use status::{interpret, StatusBand, StatusCode};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
