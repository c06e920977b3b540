//! 예측 모듈 - 측정 유형별 단일 특성 로지스틱 분류기
//!
//! 시작 시 JSON 파일에서 한 번만 읽습니다.
//!
//! ```json
//! {
//!   "creatinine": { "intercept": -6.2, "coefficient": 0.045 },
//!   "uacr":       { "intercept": -3.0, "coefficient": 0.02 }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// 예측 실패 유형
#[derive(Debug, Error, PartialEq)]
pub enum PredictError {
    #[error("Model type '{0}' not found")]
    NotFound(String),

    #[error("{0}")]
    Invalid(String),
}

/// 로지스틱 모델: P = sigmoid(intercept + coefficient × x)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub intercept: f64,
    pub coefficient: f64,
}

impl LogisticModel {
    pub fn probability(&self, measurement: f64) -> f64 {
        let z = self.intercept + self.coefficient * measurement;
        1.0 / (1.0 + (-z).exp())
    }
}

/// 측정 유형 → 분류기
#[derive(Debug, Clone, Default)]
pub struct ClassifierRegistry {
    models: BTreeMap<String, LogisticModel>,
}

impl ClassifierRegistry {
    pub fn new(models: BTreeMap<String, LogisticModel>) -> Self {
        Self { models }
    }

    /// JSON 파일에서 로드 (파일이 없으면 빈 레지스트리)
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Classifier file {:?} not found; /predict will reject every type", path);
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read classifier file {:?}", path))?;
        let models: BTreeMap<String, LogisticModel> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse classifier file {:?}", path))?;

        tracing::info!("Loaded {} classifiers from {:?}", models.len(), path);
        Ok(Self { models })
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// 등록된 측정 유형 (정렬됨)
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// 확률 예측
    ///
    /// 측정값은 JSON 숫자 또는 숫자 문자열을 받습니다.
    pub fn predict(&self, model_type: &str, measurement: &Value) -> Result<f64, PredictError> {
        let model = self
            .models
            .get(model_type)
            .ok_or_else(|| PredictError::NotFound(model_type.to_string()))?;

        let value = measurement_value(measurement)?;
        Ok(model.probability(value))
    }
}

fn measurement_value(measurement: &Value) -> Result<f64, PredictError> {
    let value = match measurement {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| PredictError::Invalid(format!("Unsupported measurement: {}", n)))?,
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| {
            PredictError::Invalid(format!("could not convert string to float: '{}'", s))
        })?,
        other => {
            return Err(PredictError::Invalid(format!(
                "Measurement must be a number, got {}",
                other
            )))
        }
    };

    if !value.is_finite() {
        return Err(PredictError::Invalid(format!(
            "Measurement must be finite, got {}",
            value
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn registry() -> ClassifierRegistry {
        let mut models = BTreeMap::new();
        models.insert(
            "creatinine".to_string(),
            LogisticModel {
                intercept: -5.0,
                coefficient: 0.05,
            },
        );
        ClassifierRegistry::new(models)
    }

    #[test]
    fn test_probability_at_decision_boundary() {
        let p = registry().predict("creatinine", &json!(100.0)).unwrap();
        assert!((p - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_probability_increases_with_positive_coefficient() {
        let reg = registry();
        let low = reg.predict("creatinine", &json!(60)).unwrap();
        let high = reg.predict("creatinine", &json!(300)).unwrap();
        assert!(low < 0.5 && high > 0.5);
        assert!((0.0..=1.0).contains(&low) && (0.0..=1.0).contains(&high));
    }

    #[test]
    fn test_numeric_string_accepted() {
        let reg = registry();
        assert_eq!(
            reg.predict("creatinine", &json!("100")).unwrap(),
            reg.predict("creatinine", &json!(100)).unwrap()
        );
    }

    #[test]
    fn test_unknown_type() {
        let err = registry().predict("glucose", &json!(5)).unwrap_err();
        assert_eq!(err.to_string(), "Model type 'glucose' not found");
    }

    #[test]
    fn test_invalid_measurement() {
        let reg = registry();
        assert!(matches!(
            reg.predict("creatinine", &json!("abc")),
            Err(PredictError::Invalid(_))
        ));
        assert!(matches!(
            reg.predict("creatinine", &json!([1, 2])),
            Err(PredictError::Invalid(_))
        ));
        assert!(matches!(
            reg.predict("creatinine", &json!("inf")),
            Err(PredictError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("classifiers.json");
        std::fs::write(
            &path,
            r#"{"uacr": {"intercept": -3.0, "coefficient": 0.1}, "creatinine": {"intercept": 0.0, "coefficient": 0.0}}"#,
        )
        .unwrap();

        let reg = ClassifierRegistry::load(&path).unwrap();
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.types().collect::<Vec<_>>(), vec!["creatinine", "uacr"]);
        assert!((reg.predict("creatinine", &json!(42)).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_missing_file_gives_empty_registry() {
        let dir = TempDir::new().unwrap();
        let reg = ClassifierRegistry::load(&dir.path().join("absent.json")).unwrap();
        assert!(reg.is_empty());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(ClassifierRegistry::load(&path).is_err());
    }
}
