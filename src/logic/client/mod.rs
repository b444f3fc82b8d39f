//! API Client Module
//!
//! - `http` - reqwest implementation talking to the explanation server
//! - `ExplainApi` - the seam the cache layer and the views depend on

pub mod http;

#[cfg(test)]
pub(crate) mod fake;

pub use http::ApiClient;

use async_trait::async_trait;

use super::types::{Explanation, GenerateRequest, Model, ModelUpload};

/// Errors surfaced by the API client and stored by the cache.
///
/// `Clone` so one failed fetch can be handed to every observer of a key.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// Transport failure, no response received
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx status without an actionable message
    #[error("Server error: {status}")]
    Server { status: u16 },

    /// Request rejected by the server with a reason
    #[error("{message}")]
    Validation { status: u16, message: String },

    /// 2xx response whose body could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rejected locally before any request was sent
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The background fetch task ended without producing a result
    #[error("Request aborted")]
    Aborted,
}

impl ApiError {
    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status } | Self::Validation { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

/// The four operations of the explanation server
#[async_trait]
pub trait ExplainApi: Send + Sync {
    async fn list_models(&self) -> Result<Vec<Model>, ApiError>;

    async fn upload_model(&self, upload: ModelUpload) -> Result<Model, ApiError>;

    /// `None` lists every explanation visible to the caller
    async fn list_explanations(&self, model_id: Option<&str>) -> Result<Vec<Explanation>, ApiError>;

    async fn generate_explanation(&self, request: GenerateRequest) -> Result<Explanation, ApiError>;
}
