//! Explanation Server HTTP Client
//!
//! Thin request/response layer: no caching, no retries.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{ApiError, ExplainApi};
use crate::logic::config::ClientConfig;
use crate::logic::types::{Explanation, GenerateRequest, Model, ModelUpload};

/// HTTP client for the explanation server
#[derive(Debug, Clone)]
pub struct ApiClient {
    config: ClientConfig,
    http_client: reqwest::Client,
}

impl ApiClient {
    /// Create new API client
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        let http_client = builder
            .build()
            .map_err(|e| ApiError::Network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http_client })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send a request and decode a 2xx JSON body
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<T, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            response.json().await
                .map_err(|e| ApiError::Parse(e.to_string()))
        } else {
            let body = response.text().await.unwrap_or_default();
            let error = error_from_response(status.as_u16(), &body);
            log::warn!("{} failed ({}): {}", operation, status.as_u16(), error);
            Err(error)
        }
    }
}

#[async_trait]
impl ExplainApi for ApiClient {
    async fn list_models(&self) -> Result<Vec<Model>, ApiError> {
        let url = self.config.endpoint("/models");
        log::debug!("GET {}", url);

        self.send(self.http_client.get(&url), "List models").await
    }

    async fn upload_model(&self, upload: ModelUpload) -> Result<Model, ApiError> {
        let url = self.config.endpoint("/models/upload");
        let field = self.config.contract.upload_field();

        log::info!(
            "Uploading model {} ({} bytes) as field '{}'",
            upload.file_name,
            upload.bytes.len(),
            field
        );

        let length = upload.bytes.len() as u64;
        let part = Part::stream_with_length(upload.bytes, length)
            .file_name(upload.file_name)
            .mime_str("application/octet-stream")
            .map_err(|e| ApiError::InvalidInput(format!("invalid upload part: {}", e)))?;
        let form = Form::new().part(field, part);

        self.send(self.http_client.post(&url).multipart(form), "Upload model").await
    }

    async fn list_explanations(&self, model_id: Option<&str>) -> Result<Vec<Explanation>, ApiError> {
        let url = self.config.endpoint("/explanations");
        log::debug!("GET {} (model_id: {:?})", url, model_id);

        let mut request = self.http_client.get(&url);
        if let Some(id) = model_id {
            request = request.query(&[("model_id", id)]);
        }

        self.send(request, "List explanations").await
    }

    async fn generate_explanation(&self, request: GenerateRequest) -> Result<Explanation, ApiError> {
        let url = self.config.endpoint(self.config.contract.generate_path());

        log::info!(
            "Generating {} explanation for model {} ({} inputs)",
            request.kind,
            request.model_id,
            request.input_data.len()
        );

        self.send(self.http_client.post(&url).json(&request), "Generate explanation").await
    }
}

/// Map a non-2xx response onto the error taxonomy.
///
/// Any status with a readable reason is a validation error carrying that
/// reason; everything else is a plain server error. A 5xx reason is only
/// read from a JSON body, so proxy error pages stay `Server`.
fn error_from_response(status: u16, body: &str) -> ApiError {
    let plain_text_allowed = status < 500;

    match extract_message(body, plain_text_allowed) {
        Some(message) => ApiError::Validation { status, message },
        None => ApiError::Server { status },
    }
}

fn extract_message(body: &str, plain_text_allowed: bool) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => ["detail", "error", "message"]
            .iter()
            .find_map(|key| value.get(key).and_then(message_text)),
        Err(_) if plain_text_allowed => Some(trimmed.to_string()),
        Err(_) => None,
    }
}

fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        // FastAPI-style `[{"loc": [...], "msg": "..."}]`
        Value::Array(items) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect();
            if messages.is_empty() {
                None
            } else {
                Some(messages.join("; "))
            }
        }
        _ => None,
    }
}
