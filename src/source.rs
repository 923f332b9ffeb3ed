// Thermovolt - Sensor status pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Record sources.
//!
//! A source returns the full current batch on every fetch. There is no
//! incremental API; change detection happens downstream.

use crate::error::SourceError;
use crate::reading::RawBatch;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Something that can return all current records.
///
/// Fetches may block (file or network IO). Async callers should run them on a
/// blocking thread.
pub trait RecordSource: Send + Sync {
    /// Fetch every record currently in the source.
    fn fetch_all_records(&self) -> Result<RawBatch, SourceError>;

    /// Short description for logs.
    fn describe(&self) -> String {
        "record source".to_string()
    }
}

impl<S: RecordSource + ?Sized> RecordSource for std::sync::Arc<S> {
    fn fetch_all_records(&self) -> Result<RawBatch, SourceError> {
        (**self).fetch_all_records()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    batch: RawBatch,
    failure: Option<String>,
    fetches: u64,
}

/// In-memory source with a replaceable batch.
///
/// A pending failure makes the next fetch fail once.
#[derive(Debug, Default)]
pub struct MemorySource {
    inner: Mutex<MemoryInner>,
}

impl MemorySource {
    /// Source returning `batch`.
    pub fn new(batch: RawBatch) -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                batch,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the batch.
    pub fn set_batch(&self, batch: RawBatch) {
        self.lock().batch = batch;
    }

    /// Make the next fetch fail with `reason`.
    pub fn fail_next(&self, reason: impl Into<String>) {
        self.lock().failure = Some(reason.into());
    }

    /// Fetch attempts so far, failed ones included.
    pub fn fetch_count(&self) -> u64 {
        self.lock().fetches
    }
}

impl RecordSource for MemorySource {
    fn fetch_all_records(&self) -> Result<RawBatch, SourceError> {
        let mut inner = self.lock();
        inner.fetches += 1;
        if let Some(reason) = inner.failure.take() {
            return Err(SourceError::Unavailable(reason));
        }
        Ok(inner.batch.clone())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::RawRecord;
    use std::sync::Arc;

    fn batch(t: f64) -> RawBatch {
        vec![RawRecord::new().with("Temperature", t).with("Voltage", 5.0)].into()
    }

    #[test]
    fn test_memory_source_returns_current_batch() {
        let source = MemorySource::new(batch(20.0));
        assert_eq!(source.fetch_all_records().unwrap(), batch(20.0));

        source.set_batch(batch(21.0));
        assert_eq!(source.fetch_all_records().unwrap(), batch(21.0));
        assert_eq!(source.fetch_count(), 2);
    }

    #[test]
    fn test_failure_is_one_shot() {
        let source = MemorySource::new(batch(20.0));
        source.fail_next("sheet offline");

        let err = source.fetch_all_records().unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(ref r) if r == "sheet offline"));
        assert!(source.fetch_all_records().is_ok());
    }

    #[test]
    fn test_arc_source() {
        let source: Arc<dyn RecordSource> = Arc::new(MemorySource::new(batch(20.0)));
        assert_eq!(source.fetch_all_records().unwrap().len(), 1);
        assert_eq!(source.describe(), "memory");
    }
}
