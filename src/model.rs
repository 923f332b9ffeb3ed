// Thermovolt - Sensor status pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Frozen models: the feature scaler and the status classifiers.
//!
//! Models are fitted elsewhere and exported as JSON. They are loaded once at
//! startup through a [`ModelStore`] and never change afterwards; the traits
//! below only expose pure inference.
//!
//! ## File layout
//!
//! ```text
//! models/
//! ├── scaler.json        StandardScaler
//! ├── temp_status.json   FrozenClassifier
//! └── volt_status.json   FrozenClassifier
//! ```

use crate::error::{ClassifyError, ModelError};
use crate::reading::{TEMPERATURE_FIELD, VOLTAGE_FIELD};
use crate::status::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Column order the scaler was fitted on. Swapping it gives wrong answers
/// without any error, so it is checked at load time.
pub const FEATURE_ORDER: [&str; 2] = [TEMPERATURE_FIELD, VOLTAGE_FIELD];

/// Scaler file name inside a model directory.
pub const SCALER_FILE: &str = "scaler.json";

/// Temperature-status classifier name.
pub const TEMPERATURE_MODEL: &str = "temp_status";

/// Voltage-status classifier name.
pub const VOLTAGE_MODEL: &str = "volt_status";

/// Two-feature vector in [`FEATURE_ORDER`].
pub type Features = [f64; 2];

/// Frozen feature normalisation.
pub trait FeatureScaler: Send + Sync + fmt::Debug {
    /// Forward transform of a single row.
    fn transform(&self, features: Features) -> Features;
}

/// Frozen single-label classifier over scaled features.
pub trait StatusPredictor: Send + Sync + fmt::Debug {
    /// Model name, for diagnostics.
    fn name(&self) -> &str;

    /// Predict exactly one label.
    fn predict(&self, scaled: Features) -> Result<StatusCode, ClassifyError>;
}

/// Standardisation `(x - mean) / scale`, column by column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub feature_names: Vec<String>,
    pub mean: Features,
    pub scale: Features,
}

impl StandardScaler {
    /// Create a scaler over [`FEATURE_ORDER`].
    pub fn new(mean: Features, scale: Features) -> Self {
        Self {
            feature_names: FEATURE_ORDER.iter().map(|s| s.to_string()).collect(),
            mean,
            scale,
        }
    }

    /// Identity transform.
    pub fn identity() -> Self {
        Self::new([0.0, 0.0], [1.0, 1.0])
    }

    /// Check feature order and parameters.
    pub fn validate(&self) -> Result<(), ModelError> {
        let expected: Vec<String> = FEATURE_ORDER.iter().map(|s| s.to_string()).collect();
        if self.feature_names != expected {
            return Err(ModelError::FeatureOrder {
                expected,
                actual: self.feature_names.clone(),
            });
        }
        if self.mean.iter().chain(self.scale.iter()).any(|v| !v.is_finite()) {
            return Err(ModelError::Invalid {
                name: "scaler".to_string(),
                reason: "non-finite mean or scale".to_string(),
            });
        }
        Ok(())
    }
}

impl FeatureScaler for StandardScaler {
    fn transform(&self, features: Features) -> Features {
        let mut out = [0.0; 2];
        for i in 0..2 {
            // A zero-variance column was fitted as scale 1.
            let scale = if self.scale[i] == 0.0 { 1.0 } else { self.scale[i] };
            out[i] = (features[i] - self.mean[i]) / scale;
        }
        out
    }
}

/// Parameters of a frozen classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierSpec {
    /// Majority vote of the `k` nearest training points (Euclidean).
    /// Ties go to the smallest label.
    KNearest {
        k: usize,
        points: Vec<Features>,
        labels: Vec<i64>,
    },
    /// Threshold one scaled feature: below `low_below` is 1, above
    /// `high_above` is 3, otherwise 2.
    Banded {
        feature: usize,
        low_below: f64,
        high_above: f64,
    },
}

/// A named frozen classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrozenClassifier {
    pub name: String,
    #[serde(flatten)]
    pub spec: ClassifierSpec,
}

impl FrozenClassifier {
    /// Create a classifier.
    pub fn new(name: &str, spec: ClassifierSpec) -> Self {
        Self {
            name: name.to_string(),
            spec,
        }
    }

    /// Check that parameters are consistent.
    pub fn validate(&self) -> Result<(), ModelError> {
        let invalid = |reason: &str| ModelError::Invalid {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        match &self.spec {
            ClassifierSpec::KNearest { k, points, labels } => {
                if points.is_empty() {
                    return Err(invalid("no training points"));
                }
                if points.len() != labels.len() {
                    return Err(invalid("points and labels differ in length"));
                }
                if *k == 0 || *k > points.len() {
                    return Err(invalid("k must be between 1 and the number of points"));
                }
                if points.iter().flatten().any(|v| !v.is_finite()) {
                    return Err(invalid("non-finite training point"));
                }
            }
            ClassifierSpec::Banded {
                feature,
                low_below,
                high_above,
            } => {
                if *feature >= FEATURE_ORDER.len() {
                    return Err(invalid("feature index out of range"));
                }
                if !(low_below.is_finite() && high_above.is_finite()) || low_below > high_above {
                    return Err(invalid("thresholds must be finite and ordered"));
                }
            }
        }
        Ok(())
    }

    fn predict_knn(&self, k: usize, points: &[Features], labels: &[i64], x: Features) -> i64 {
        let mut ranked: Vec<(f64, i64)> = points
            .iter()
            .zip(labels)
            .map(|(p, &label)| {
                let d = (p[0] - x[0]).powi(2) + (p[1] - x[1]).powi(2);
                (d, label)
            })
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut votes: BTreeMap<i64, usize> = BTreeMap::new();
        for (_, label) in ranked.iter().take(k) {
            *votes.entry(*label).or_default() += 1;
        }

        let mut best = (labels[0], 0usize);
        for (label, count) in votes {
            if count > best.1 {
                best = (label, count);
            }
        }
        best.0
    }
}

impl StatusPredictor for FrozenClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, scaled: Features) -> Result<StatusCode, ClassifyError> {
        if scaled.iter().any(|v| !v.is_finite()) {
            return Err(ClassifyError::Predictor {
                predictor: self.name.clone(),
                reason: "non-finite input".to_string(),
            });
        }

        let label = match &self.spec {
            ClassifierSpec::KNearest { k, points, labels } => {
                if points.is_empty() || points.len() != labels.len() {
                    return Err(ClassifyError::Predictor {
                        predictor: self.name.clone(),
                        reason: "model has no usable training points".to_string(),
                    });
                }
                self.predict_knn(*k, points, labels, scaled)
            }
            ClassifierSpec::Banded {
                feature,
                low_below,
                high_above,
            } => {
                let value = *scaled.get(*feature).ok_or_else(|| ClassifyError::Predictor {
                    predictor: self.name.clone(),
                    reason: format!("feature index {} out of range", feature),
                })?;
                if value < *low_below {
                    1
                } else if value > *high_above {
                    3
                } else {
                    2
                }
            }
        };

        Ok(StatusCode(label))
    }
}

/// Directory of exported model files.
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    /// Open a model directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ModelError> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(ModelError::NotFound { path: dir });
        }
        Ok(Self { dir })
    }

    /// Directory path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load `scaler.json`.
    pub fn load_scaler(&self) -> Result<StandardScaler, ModelError> {
        let scaler: StandardScaler = read_json(&self.dir.join(SCALER_FILE))?;
        scaler.validate()?;
        Ok(scaler)
    }

    /// Load `<name>.json`.
    pub fn load_classifier(&self, name: &str) -> Result<FrozenClassifier, ModelError> {
        let classifier: FrozenClassifier = read_json(&self.dir.join(format!("{}.json", name)))?;
        classifier.validate()?;
        Ok(classifier)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ModelError> {
    if !path.exists() {
        return Err(ModelError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ModelError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// The scaler and both classifiers, frozen and shareable.
#[derive(Debug, Clone)]
pub struct ClassificationModels {
    pub scaler: Arc<dyn FeatureScaler>,
    pub temperature: Arc<dyn StatusPredictor>,
    pub voltage: Arc<dyn StatusPredictor>,
}

impl ClassificationModels {
    /// Wrap already-constructed models.
    pub fn new(
        scaler: impl FeatureScaler + 'static,
        temperature: impl StatusPredictor + 'static,
        voltage: impl StatusPredictor + 'static,
    ) -> Self {
        Self {
            scaler: Arc::new(scaler),
            temperature: Arc::new(temperature),
            voltage: Arc::new(voltage),
        }
    }

    /// Load the scaler and both classifiers from a store.
    pub fn load(store: &ModelStore) -> Result<Self, ModelError> {
        let scaler = store.load_scaler()?;
        let temperature = store.load_classifier(TEMPERATURE_MODEL)?;
        let voltage = store.load_classifier(VOLTAGE_MODEL)?;
        log::info!(
            "loaded models from {}: {}, {}",
            store.dir().display(),
            temperature.name,
            voltage.name
        );
        Ok(Self::new(scaler, temperature, voltage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    fn knn() -> FrozenClassifier {
        FrozenClassifier::new(
            "knn",
            ClassifierSpec::KNearest {
                k: 3,
                points: vec![
                    [-2.0, 0.0],
                    [-1.8, 0.1],
                    [-1.9, -0.1],
                    [0.0, 0.0],
                    [0.1, 0.1],
                    [-0.1, 0.0],
                    [2.0, 0.0],
                    [1.9, 0.2],
                    [2.1, -0.2],
                ],
                labels: vec![1, 1, 1, 2, 2, 2, 3, 3, 3],
            },
        )
    }

    fn write(dir: &Path, file: &str, json: &str) {
        std::fs::write(dir.join(file), json).unwrap();
    }

    #[test]
    fn test_standard_scaler_transform() {
        let scaler = StandardScaler::new([25.0, 5.0], [5.0, 0.5]);
        let out = scaler.transform([30.0, 4.5]);
        assert_relative_eq!(out[0], 1.0);
        assert_relative_eq!(out[1], -1.0);
    }

    #[test]
    fn test_standard_scaler_zero_scale() {
        let scaler = StandardScaler::new([25.0, 5.0], [0.0, 1.0]);
        assert_relative_eq!(scaler.transform([26.0, 5.0])[0], 1.0);
    }

    #[test]
    fn test_scaler_rejects_swapped_columns() {
        let mut scaler = StandardScaler::identity();
        scaler.feature_names.reverse();
        assert!(matches!(
            scaler.validate(),
            Err(ModelError::FeatureOrder { .. })
        ));
    }

    #[test]
    fn test_knn_predicts_majority() {
        let model = knn();
        assert_eq!(model.predict([-1.9, 0.0]).unwrap(), StatusCode(1));
        assert_eq!(model.predict([0.05, 0.0]).unwrap(), StatusCode(2));
        assert_eq!(model.predict([2.2, 0.0]).unwrap(), StatusCode(3));
    }

    #[test]
    fn test_knn_tie_goes_to_smallest_label() {
        let model = FrozenClassifier::new(
            "tie",
            ClassifierSpec::KNearest {
                k: 2,
                points: vec![[1.0, 0.0], [-1.0, 0.0]],
                labels: vec![3, 1],
            },
        );
        assert_eq!(model.predict([0.0, 0.0]).unwrap(), StatusCode(1));
    }

    #[test]
    fn test_banded_classifier() {
        let model = FrozenClassifier::new(
            "volt",
            ClassifierSpec::Banded {
                feature: 1,
                low_below: -1.0,
                high_above: 1.0,
            },
        );
        assert_eq!(model.predict([9.0, -1.5]).unwrap(), StatusCode::LOW);
        assert_eq!(model.predict([9.0, 0.0]).unwrap(), StatusCode::NORMAL);
        assert_eq!(model.predict([9.0, 1.5]).unwrap(), StatusCode::HIGH);
    }

    #[test]
    fn test_predict_rejects_nan() {
        assert!(matches!(
            knn().predict([f64::NAN, 0.0]),
            Err(ClassifyError::Predictor { .. })
        ));
    }

    #[test]
    fn test_validate_knn() {
        let bad = FrozenClassifier::new(
            "bad",
            ClassifierSpec::KNearest {
                k: 5,
                points: vec![[0.0, 0.0]],
                labels: vec![2],
            },
        );
        assert!(matches!(bad.validate(), Err(ModelError::Invalid { .. })));
        assert!(knn().validate().is_ok());
    }

    #[test]
    fn test_classifier_json_roundtrip_format() {
        let json = r#"{"name": "volt", "kind": "banded", "feature": 1, "low_below": -1.0, "high_above": 1.0}"#;
        let model: FrozenClassifier = serde_json::from_str(json).unwrap();
        assert_eq!(model.name, "volt");
        assert!(matches!(model.spec, ClassifierSpec::Banded { feature: 1, .. }));
    }

    #[test]
    fn test_store_loads_models() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            SCALER_FILE,
            &serde_json::to_string(&StandardScaler::new([25.0, 5.0], [5.0, 0.5])).unwrap(),
        );
        write(
            dir.path(),
            "temp_status.json",
            &serde_json::to_string(&knn()).unwrap(),
        );
        write(
            dir.path(),
            "volt_status.json",
            r#"{"name": "volt_status", "kind": "banded", "feature": 1, "low_below": -1.0, "high_above": 1.0}"#,
        );

        let store = ModelStore::open(dir.path()).unwrap();
        let models = ClassificationModels::load(&store).unwrap();
        assert_eq!(models.voltage.name(), "volt_status");
        assert_eq!(models.temperature.name(), "knn");
    }

    #[test]
    fn test_store_missing_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.load_scaler(),
            Err(ModelError::NotFound { .. })
        ));
        assert!(matches!(
            ClassificationModels::load(&store),
            Err(ModelError::NotFound { .. })
        ));
    }

    #[test]
    fn test_store_malformed_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), SCALER_FILE, "{ not json");
        let store = ModelStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.load_scaler(),
            Err(ModelError::Malformed { .. })
        ));
    }

    #[test]
    fn test_store_missing_dir() {
        assert!(matches!(
            ModelStore::open("/definitely/not/a/model/dir"),
            Err(ModelError::NotFound { .. })
        ));
    }
}
