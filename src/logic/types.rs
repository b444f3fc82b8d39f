//! Wire types shared by the API client, the cache and the views.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use super::client::ApiError;

/// Feature name → numeric value (input data, importance weights)
pub type FeatureValues = BTreeMap<String, f64>;

// ============================================================================
// MODEL
// ============================================================================

/// A model known to the explanation server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub name: String,
    /// Implementation tag, e.g. `sklearn`, `xgboost`, `tensorflow`
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ordered input feature names, when the server knows them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,
}

impl Model {
    pub fn features(&self) -> &[String] {
        self.features.as_deref().unwrap_or(&[])
    }
}

/// Binary model file staged for upload. Clones share one buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelUpload {
    pub file_name: String,
    pub bytes: Bytes,
}

impl ModelUpload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a model file from disk
    pub fn from_path(path: &Path) -> Result<Self, ApiError> {
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ApiError::InvalidInput(format!("invalid file name: {}", path.display())))?;

        let bytes = std::fs::read(path)
            .map_err(|e| ApiError::InvalidInput(format!("cannot read {}: {}", path.display(), e)))?;

        Ok(Self::new(file_name, bytes))
    }

    /// Lowercased extension including the dot, e.g. `.pkl`
    pub fn extension(&self) -> Option<String> {
        self.file_name
            .rfind('.')
            .filter(|idx| *idx > 0)
            .map(|idx| self.file_name[idx..].to_lowercase())
    }
}

// ============================================================================
// EXPLANATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationKind {
    #[default]
    FeatureImportance,
    InstanceExplanation,
}

impl ExplanationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FeatureImportance => "feature_importance",
            Self::InstanceExplanation => "instance_explanation",
        }
    }

    /// Heading used by the views
    pub fn title(&self) -> &'static str {
        match self {
            Self::FeatureImportance => "Feature Importance Analysis",
            Self::InstanceExplanation => "Instance Explanation",
        }
    }
}

impl fmt::Display for ExplanationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExplanationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "feature_importance" => Ok(Self::FeatureImportance),
            "instance_explanation" | "instance" => Ok(Self::InstanceExplanation),
            other => Err(format!("unknown explanation type '{}'", other)),
        }
    }
}

/// Predicted class or value reported by an instance explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prediction {
    Class(i64),
    Score(f64),
    Label(String),
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class(c) => write!(f, "Class {}", c),
            Self::Score(v) => write!(f, "{:.4}", v),
            Self::Label(l) => f.write_str(l),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature_importance: FeatureValues,
    #[serde(default)]
    pub input_data: FeatureValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceExplanation {
    pub prediction: Prediction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_probabilities: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_importance: Option<FeatureValues>,
    #[serde(default)]
    pub input_data: FeatureValues,
}

impl InstanceExplanation {
    /// Highest class probability, if probabilities were reported
    pub fn confidence(&self) -> Option<f64> {
        self.prediction_probabilities
            .as_ref()?
            .iter()
            .copied()
            .filter(|p| p.is_finite())
            .fold(None, |best: Option<f64>, p| Some(best.map_or(p, |b| b.max(p))))
    }
}

/// Explanation payload, discriminated by the explanation `type`
#[derive(Debug, Clone, PartialEq)]
pub enum ExplanationResult {
    FeatureImportance(FeatureImportance),
    Instance(InstanceExplanation),
}

impl ExplanationResult {
    pub fn kind(&self) -> ExplanationKind {
        match self {
            Self::FeatureImportance(_) => ExplanationKind::FeatureImportance,
            Self::Instance(_) => ExplanationKind::InstanceExplanation,
        }
    }

    /// The input values the server explained
    pub fn input_data(&self) -> &FeatureValues {
        match self {
            Self::FeatureImportance(r) => &r.input_data,
            Self::Instance(r) => &r.input_data,
        }
    }

    pub fn feature_importance(&self) -> Option<&FeatureValues> {
        match self {
            Self::FeatureImportance(r) => Some(&r.feature_importance),
            Self::Instance(r) => r.feature_importance.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawExplanation", into = "RawExplanation")]
pub struct Explanation {
    pub id: String,
    pub model_id: String,
    pub created_at: DateTime<Utc>,
    pub result: ExplanationResult,
}

impl Explanation {
    pub fn kind(&self) -> ExplanationKind {
        self.result.kind()
    }
}

/// On-the-wire shape: `result` is decoded according to `type`
#[derive(Serialize, Deserialize)]
struct RawExplanation {
    id: String,
    model_id: String,
    #[serde(rename = "type")]
    kind: ExplanationKind,
    #[serde(with = "timestamp")]
    created_at: DateTime<Utc>,
    result: serde_json::Value,
}

impl TryFrom<RawExplanation> for Explanation {
    type Error = serde_json::Error;

    fn try_from(raw: RawExplanation) -> Result<Self, Self::Error> {
        let result = match raw.kind {
            ExplanationKind::FeatureImportance => {
                ExplanationResult::FeatureImportance(serde_json::from_value(raw.result)?)
            }
            ExplanationKind::InstanceExplanation => {
                ExplanationResult::Instance(serde_json::from_value(raw.result)?)
            }
        };

        Ok(Self {
            id: raw.id,
            model_id: raw.model_id,
            created_at: raw.created_at,
            result,
        })
    }
}

impl From<Explanation> for RawExplanation {
    fn from(explanation: Explanation) -> Self {
        let kind = explanation.kind();
        let result = match &explanation.result {
            ExplanationResult::FeatureImportance(r) => serde_json::to_value(r),
            ExplanationResult::Instance(r) => serde_json::to_value(r),
        }
        .unwrap_or(serde_json::Value::Null);

        Self {
            id: explanation.id,
            model_id: explanation.model_id,
            kind,
            created_at: explanation.created_at,
            result,
        }
    }
}

/// Body of a generate-explanation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model_id: String,
    #[serde(rename = "type")]
    pub kind: ExplanationKind,
    pub input_data: FeatureValues,
}

/// RFC 3339 timestamps, plus naive ISO-8601 strings taken as UTC
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&dt.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(dt.with_timezone(&Utc));
        }

        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| format!("invalid timestamp '{}': {}", raw, e))
    }
}
