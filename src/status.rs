// Thermovolt - Sensor status pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Status codes and their bands.
//!
//! [`interpret`] is the single mapping from classifier labels to bands. The
//! live view, the projection and alerting all go through it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer label emitted by a frozen classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub i64);

impl StatusCode {
    pub const LOW: StatusCode = StatusCode(1);
    pub const NORMAL: StatusCode = StatusCode(2);
    pub const HIGH: StatusCode = StatusCode(3);

    /// Band for this code.
    pub fn band(self) -> StatusBand {
        interpret(self.0)
    }

    /// Raw integer value.
    pub fn value(self) -> i64 {
        self.0
    }
}

impl From<i64> for StatusCode {
    fn from(value: i64) -> Self {
        StatusCode(value)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named status band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusBand {
    Low,
    Normal,
    High,
    /// A label outside the known set. Distinct from a failed classification.
    Unknown,
}

impl StatusBand {
    /// All bands, in display order.
    pub const ALL: [StatusBand; 4] = [
        StatusBand::Low,
        StatusBand::Normal,
        StatusBand::High,
        StatusBand::Unknown,
    ];

    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusBand::Low => "low",
            StatusBand::Normal => "normal",
            StatusBand::High => "high",
            StatusBand::Unknown => "unknown",
        }
    }

    /// Anything other than `Normal` deserves attention.
    pub fn is_alert(&self) -> bool {
        !matches!(self, StatusBand::Normal)
    }
}

impl fmt::Display for StatusBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a label to its band: 1 low, 2 normal, 3 high, anything else unknown.
pub fn interpret(code: i64) -> StatusBand {
    match code {
        1 => StatusBand::Low,
        2 => StatusBand::Normal,
        3 => StatusBand::High,
        _ => StatusBand::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(interpret(1), StatusBand::Low);
        assert_eq!(interpret(2), StatusBand::Normal);
        assert_eq!(interpret(3), StatusBand::High);
    }

    #[test]
    fn test_everything_else_unknown() {
        for code in [-3, -1, 0, 4, 5, 42, i64::MIN, i64::MAX] {
            assert_eq!(interpret(code), StatusBand::Unknown, "code {}", code);
        }
    }

    #[test]
    fn test_status_code_band() {
        assert_eq!(StatusCode::LOW.band(), StatusBand::Low);
        assert_eq!(StatusCode::NORMAL.band(), StatusBand::Normal);
        assert_eq!(StatusCode::HIGH.band(), StatusBand::High);
        assert_eq!(StatusCode(7).band(), StatusBand::Unknown);
    }

    #[test]
    fn test_band_names() {
        let names: Vec<&str> = StatusBand::ALL.iter().map(|b| b.as_str()).collect();
        assert_eq!(names, vec!["low", "normal", "high", "unknown"]);
        assert_eq!(StatusBand::High.to_string(), "high");
        assert_eq!(
            serde_json::to_string(&StatusBand::Normal).unwrap(),
            "\"normal\""
        );
    }

    #[test]
    fn test_alert_bands() {
        assert!(StatusBand::Low.is_alert());
        assert!(StatusBand::High.is_alert());
        assert!(StatusBand::Unknown.is_alert());
        assert!(!StatusBand::Normal.is_alert());
    }
}
