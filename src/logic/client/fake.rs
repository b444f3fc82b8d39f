//! In-memory `ExplainApi` used by tests.
//!
//! Behaves like a small server: stores uploads, echoes input data back in
//! generated explanations, counts every call and can hold list requests
//! in flight until the test releases them.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

use super::{ApiError, ExplainApi};
use crate::logic::types::{
    Explanation, ExplanationKind, ExplanationResult, FeatureImportance, FeatureValues,
    GenerateRequest, InstanceExplanation, Model, ModelUpload, Prediction,
};

#[derive(Default)]
pub(crate) struct FakeApi {
    models: Mutex<Vec<Model>>,
    explanations: Mutex<Vec<Explanation>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    pub list_models_calls: AtomicUsize,
    pub list_explanations_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
    pub generate_calls: AtomicUsize,
    /// Payload of the most recent upload
    pub last_upload: Mutex<Option<ModelUpload>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(self, id: &str, features: &[&str]) -> Self {
        self.models.lock().push(Model {
            id: id.to_string(),
            name: format!("{} model", id),
            kind: "sklearn".to_string(),
            created_at: Utc::now(),
            description: None,
            features: Some(features.iter().map(|f| f.to_string()).collect()),
        });
        self
    }

    /// Hold list requests until permits are added to the returned semaphore
    pub fn hold_lists(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    pub fn model_count(&self) -> usize {
        self.models.lock().len()
    }

    async fn pass_gate(&self) {
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await;
        }
    }
}

#[async_trait]
impl ExplainApi for FakeApi {
    async fn list_models(&self) -> Result<Vec<Model>, ApiError> {
        self.list_models_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;
        Ok(self.models.lock().clone())
    }

    async fn upload_model(&self, upload: ModelUpload) -> Result<Model, ApiError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_upload.lock() = Some(upload.clone());

        match upload.extension().as_deref() {
            Some(".pkl") | Some(".h5") => {}
            other => {
                return Err(ApiError::Validation {
                    status: 422,
                    message: format!("Unsupported model format: {}", other.unwrap_or("none")),
                })
            }
        }

        let model = Model {
            id: uuid::Uuid::new_v4().to_string(),
            name: upload.file_name,
            kind: "sklearn".to_string(),
            created_at: Utc::now(),
            description: None,
            features: None,
        };
        self.models.lock().push(model.clone());
        Ok(model)
    }

    async fn list_explanations(&self, model_id: Option<&str>) -> Result<Vec<Explanation>, ApiError> {
        self.list_explanations_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;

        Ok(self
            .explanations
            .lock()
            .iter()
            .filter(|e| model_id.map_or(true, |id| e.model_id == id))
            .cloned()
            .collect())
    }

    async fn generate_explanation(&self, request: GenerateRequest) -> Result<Explanation, ApiError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);

        let features = self
            .models
            .lock()
            .iter()
            .find(|m| m.id == request.model_id)
            .map(|m| m.features().to_vec())
            .ok_or_else(|| ApiError::Validation {
                status: 404,
                message: format!("Model {} not found", request.model_id),
            })?;

        let missing: Vec<&str> = features
            .iter()
            .filter(|f| !request.input_data.contains_key(*f))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(ApiError::Validation {
                status: 422,
                message: format!("missing features: {}", missing.join(", ")),
            });
        }

        let share = 1.0 / request.input_data.len().max(1) as f64;
        let weights: FeatureValues = request.input_data.keys().map(|k| (k.clone(), share)).collect();

        let result = match request.kind {
            ExplanationKind::FeatureImportance => ExplanationResult::FeatureImportance(FeatureImportance {
                feature_importance: weights,
                input_data: request.input_data,
            }),
            ExplanationKind::InstanceExplanation => ExplanationResult::Instance(InstanceExplanation {
                prediction: Prediction::Class(0),
                prediction_probabilities: Some(vec![0.8, 0.2]),
                feature_importance: Some(weights),
                input_data: request.input_data,
            }),
        };

        let explanation = Explanation {
            id: uuid::Uuid::new_v4().to_string(),
            model_id: request.model_id,
            created_at: Utc::now(),
            result,
        };
        self.explanations.lock().push(explanation.clone());
        Ok(explanation)
    }
}
