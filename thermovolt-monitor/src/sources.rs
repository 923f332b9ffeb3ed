// Thermovolt Monitor - File-backed record sources
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! File-backed record sources.
//!
//! Both sources re-read their file on every fetch, so an external process can
//! keep appending rows while the monitor polls.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thermovolt::{RawBatch, RawRecord, RawValue, RecordSource, SourceError};
use tracing::debug;

/// CSV file with a header row.
///
/// Cells that parse as numbers become numbers, blank cells become empty and
/// everything else stays text.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    /// Source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn cell(text: &str) -> RawValue {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            RawValue::Empty
        } else if let Ok(n) = trimmed.parse::<f64>() {
            RawValue::Number(n)
        } else {
            RawValue::Text(text.to_string())
        }
    }
}

impl RecordSource for CsvSource {
    fn fetch_all_records(&self) -> Result<RawBatch, SourceError> {
        let file = open(&self.path)?;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(BufReader::new(file));

        let headers = reader.headers().map_err(malformed)?.clone();
        let mut batch = RawBatch::default();
        for result in reader.records() {
            let row = result.map_err(malformed)?;
            let mut record = RawRecord::new();
            for (name, value) in headers.iter().zip(row.iter()) {
                record.insert(name, Self::cell(value));
            }
            batch.push(record);
        }

        debug!("read {} rows from {}", batch.len(), self.path.display());
        Ok(batch)
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }
}

/// JSON file holding an array of flat objects.
#[derive(Debug, Clone)]
pub struct JsonSource {
    path: PathBuf,
}

impl JsonSource {
    /// Source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordSource for JsonSource {
    fn fetch_all_records(&self) -> Result<RawBatch, SourceError> {
        let file = open(&self.path)?;
        let batch: RawBatch =
            serde_json::from_reader(BufReader::new(file)).map_err(malformed)?;
        debug!("read {} rows from {}", batch.len(), self.path.display());
        Ok(batch)
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}

/// Pick a source by file extension. Anything not ending in `.json` is CSV.
pub fn open_source(path: impl AsRef<Path>) -> Box<dyn RecordSource> {
    let path = path.as_ref();
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if is_json {
        Box::new(JsonSource::new(path))
    } else {
        Box::new(CsvSource::new(path))
    }
}

fn open(path: &Path) -> Result<File, SourceError> {
    File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            SourceError::Unavailable(format!("{} not found", path.display()))
        }
        _ => SourceError::Io(e),
    })
}

fn malformed(e: impl std::fmt::Display) -> SourceError {
    SourceError::Malformed(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(suffix: &str, contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_csv_source() {
        let file = write_file(
            ".csv",
            "Temperature,Voltage,Timestamp\n\
             20.5,5.0,2024-01-01 08:00:00\n\
             ,4.9,2024-01-01 08:01:00\n\
             abc,5.1,\n",
        );
        let batch = CsvSource::new(file.path()).fetch_all_records().unwrap();

        assert_eq!(batch.len(), 3);
        let rows = batch.records();
        assert_eq!(rows[0].get("Temperature"), Some(&RawValue::Number(20.5)));
        assert_eq!(
            rows[0].get("Timestamp"),
            Some(&RawValue::Text("2024-01-01 08:00:00".to_string()))
        );
        assert_eq!(rows[1].get("Temperature"), Some(&RawValue::Empty));
        assert_eq!(rows[2].get("Temperature"), Some(&RawValue::Text("abc".to_string())));
        assert_eq!(rows[2].get("Timestamp"), Some(&RawValue::Empty));
    }

    #[test]
    fn test_csv_rereads_on_each_fetch() {
        let mut file = write_file(".csv", "Temperature,Voltage\n20,5\n");
        let source = CsvSource::new(file.path());
        assert_eq!(source.fetch_all_records().unwrap().len(), 1);

        file.write_all(b"21,5\n").unwrap();
        file.flush().unwrap();
        assert_eq!(source.fetch_all_records().unwrap().len(), 2);
    }

    #[test]
    fn test_json_source() {
        let file = write_file(
            ".json",
            r#"[{"Temperature": 20.0, "Voltage": 5.0, "Timestamp": "08:00:00"},
                {"Temperature": "21", "Voltage": null}]"#,
        );
        let batch = JsonSource::new(file.path()).fetch_all_records().unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.records()[0].get("Voltage"), Some(&RawValue::Number(5.0)));
        assert_eq!(batch.records()[1].get("Voltage"), Some(&RawValue::Empty));
    }

    #[test]
    fn test_json_nested_cell_drops_only_its_row() {
        let file = write_file(
            ".json",
            r#"[{"Temperature": 20.0, "Voltage": 5.0, "Timestamp": "08:00:00"},
                {"Temperature": 21.0, "Voltage": 5.0, "Timestamp": "08:01:00", "Meta": {"sensor": "a"}},
                {"Temperature": {"value": 22.0}, "Voltage": 5.0, "Timestamp": "08:02:00"}]"#,
        );
        let batch = JsonSource::new(file.path()).fetch_all_records().unwrap();
        assert_eq!(batch.len(), 3);

        let (window, report) = thermovolt::Cleaner::new().clean_with_report(&batch);
        assert_eq!(window.temperatures(), vec![20.0, 21.0]);
        assert_eq!(report.invalid_number, 1);
    }

    #[test]
    fn test_malformed_json() {
        let file = write_file(".json", "{not json");
        let err = JsonSource::new(file.path()).fetch_all_records().unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let err = CsvSource::new("/nonexistent/readings.csv")
            .fetch_all_records()
            .unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(_)));
    }

    #[test]
    fn test_open_source_by_extension() {
        assert!(open_source("readings.json").describe().starts_with("json:"));
        assert!(open_source("readings.JSON").describe().starts_with("json:"));
        assert!(open_source("readings.csv").describe().starts_with("csv:"));
        assert!(open_source("readings").describe().starts_with("csv:"));
    }
}
