//! Explanation request form.
//!
//! Starts empty. A request is only built once every declared feature has a
//! value the user typed; nothing is filled in on their behalf.

use std::collections::BTreeMap;
use thiserror::Error;

use crate::logic::types::{ExplanationKind, FeatureValues, GenerateRequest, Model};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormError {
    #[error("Select a model first")]
    NoModel,

    #[error("Enter input data")]
    EmptyInput,

    #[error("Missing values for: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("'{feature}' is not a number: {value}")]
    NotANumber { feature: String, value: String },

    #[error("Input data is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Expected name=value, got '{0}'")]
    BadAssignment(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// One text field per feature
    #[default]
    Fields,
    /// A JSON object typed by hand
    Json,
}

#[derive(Debug, Clone, Default)]
pub struct ExplanationForm {
    model_id: Option<String>,
    features: Vec<String>,
    kind: ExplanationKind,
    mode: InputMode,
    values: BTreeMap<String, String>,
    json: String,
}

impl ExplanationForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to `model`, dropping everything typed for the previous one.
    /// Models without declared features fall back to JSON input.
    pub fn select_model(&mut self, model: &Model) {
        self.model_id = Some(model.id.clone());
        self.features = model.features().to_vec();
        self.values.clear();
        self.json.clear();
        self.mode = if self.features.is_empty() {
            InputMode::Json
        } else {
            InputMode::Fields
        };
    }

    /// Target a model by id alone (features unknown)
    pub fn select_model_id(&mut self, model_id: impl Into<String>) {
        self.model_id = Some(model_id.into());
        self.features.clear();
        self.values.clear();
        self.json.clear();
    }

    pub fn model_id(&self) -> Option<&str> {
        self.model_id.as_deref()
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn kind(&self) -> ExplanationKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: ExplanationKind) {
        self.kind = kind;
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        self.mode = mode;
    }

    pub fn set_value(&mut self, feature: impl Into<String>, raw: impl Into<String>) {
        self.mode = InputMode::Fields;
        self.values.insert(feature.into(), raw.into());
    }

    /// Apply a `name=value` pair
    pub fn set_assignment(&mut self, assignment: &str) -> Result<(), FormError> {
        let (name, value) = assignment
            .split_once('=')
            .filter(|(name, _)| !name.trim().is_empty())
            .ok_or_else(|| FormError::BadAssignment(assignment.to_string()))?;

        self.set_value(name.trim(), value.trim());
        Ok(())
    }

    pub fn set_json(&mut self, raw: impl Into<String>) {
        self.mode = InputMode::Json;
        self.json = raw.into();
    }

    /// Raw text per declared feature, in declaration order
    pub fn fields(&self) -> Vec<(&str, &str)> {
        self.features
            .iter()
            .map(|f| (f.as_str(), self.values.get(f).map_or("", String::as_str)))
            .collect()
    }

    pub fn can_submit(&self, pending: bool) -> bool {
        !pending && self.build().is_ok()
    }

    pub fn build(&self) -> Result<GenerateRequest, FormError> {
        let model_id = self.model_id.clone().ok_or(FormError::NoModel)?;

        let input_data = match self.mode {
            InputMode::Fields => self.parse_fields()?,
            InputMode::Json => parse_json(&self.json)?,
        };

        Ok(GenerateRequest {
            model_id,
            kind: self.kind,
            input_data,
        })
    }

    fn parse_fields(&self) -> Result<FeatureValues, FormError> {
        let entered: Vec<(&String, &str)> = self
            .values
            .iter()
            .map(|(name, raw)| (name, raw.trim()))
            .filter(|(_, raw)| !raw.is_empty())
            .collect();

        let missing: Vec<String> = self
            .features
            .iter()
            .filter(|f| !entered.iter().any(|(name, _)| name == f))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(FormError::Missing(missing));
        }
        if entered.is_empty() {
            return Err(FormError::EmptyInput);
        }

        entered
            .into_iter()
            .map(|(name, raw)| parse_number(name, raw).map(|value| (name.clone(), value)))
            .collect()
    }
}

fn parse_number(feature: &str, raw: &str) -> Result<f64, FormError> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| FormError::NotANumber {
            feature: feature.to_string(),
            value: raw.to_string(),
        })
}

fn parse_json(raw: &str) -> Result<FeatureValues, FormError> {
    if raw.trim().is_empty() {
        return Err(FormError::EmptyInput);
    }

    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| FormError::InvalidJson(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| FormError::InvalidJson("expected an object of feature values".to_string()))?;

    object
        .iter()
        .map(|(name, value)| match value.as_f64() {
            Some(number) => Ok((name.clone(), number)),
            None => Err(FormError::NotANumber {
                feature: name.clone(),
                value: value.to_string(),
            }),
        })
        .collect()
}
