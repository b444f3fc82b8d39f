//! Models & Explanations Handles
//!
//! Query + mutation pairs the views use. Each handle observes its list and
//! owns the mutation that invalidates it.

use std::sync::Arc;

use super::client::{ApiError, ExplainApi};
use super::query::{Mutation, QueryClient, QueryKey, QueryObserver, QueryOptions, QueryState};
use super::types::{Explanation, GenerateRequest, Model, ModelUpload};

// ============================================================================
// MODELS
// ============================================================================

/// Model list plus the upload mutation
pub struct ModelsHandle {
    models: QueryObserver<Vec<Model>>,
    upload: Mutation<ModelUpload, Model>,
}

impl ModelsHandle {
    pub fn new(client: &QueryClient, api: Arc<dyn ExplainApi>) -> Self {
        let list_api = Arc::clone(&api);
        let models = client.observe(
            QueryKey::models(),
            move || {
                let api = Arc::clone(&list_api);
                async move { api.list_models().await }
            },
            QueryOptions::default(),
        );

        let upload = Mutation::new(client, "Upload model", move |upload: ModelUpload| {
            let api = Arc::clone(&api);
            async move { api.upload_model(upload).await }
        })
        .invalidates(|_| vec![QueryKey::models().into()]);

        Self { models, upload }
    }

    pub fn state(&self) -> QueryState<Vec<Model>> {
        self.models.state()
    }

    /// Current list, empty while nothing has loaded
    pub fn models(&self) -> Vec<Model> {
        self.state().data().cloned().unwrap_or_default()
    }

    /// Wait for the list (joins or starts a fetch as needed)
    pub async fn load(&self) -> Result<Arc<Vec<Model>>, ApiError> {
        Ok(self.models.result().await?.unwrap_or_default())
    }

    pub async fn refresh(&self) -> Result<Arc<Vec<Model>>, ApiError> {
        Ok(self.models.refetch().await?.unwrap_or_default())
    }

    pub async fn find(&self, model_id: &str) -> Result<Option<Model>, ApiError> {
        let models = self.load().await?;
        Ok(models.iter().find(|m| m.id == model_id).cloned())
    }

    pub async fn upload(&self, upload: ModelUpload) -> Result<Arc<Model>, ApiError> {
        self.upload.mutate(upload).await
    }

    pub fn is_uploading(&self) -> bool {
        self.upload.is_pending()
    }

    pub fn upload_error(&self) -> Option<ApiError> {
        self.upload.error()
    }
}

// ============================================================================
// EXPLANATIONS
// ============================================================================

/// Which explanations a handle lists
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExplanationFilter {
    /// No model chosen yet: the query stays disabled
    #[default]
    Unselected,
    /// Every explanation visible to the caller
    All,
    Model(String),
}

impl ExplanationFilter {
    pub fn model_id(&self) -> Option<&str> {
        match self {
            Self::Model(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_selected(&self) -> bool {
        !matches!(self, Self::Unselected)
    }

    fn key(&self) -> QueryKey {
        QueryKey::explanations(self.model_id())
    }
}

/// Explanation list (scoped by a filter) plus the generate mutation
pub struct ExplanationsHandle {
    filter: ExplanationFilter,
    explanations: QueryObserver<Vec<Explanation>>,
    generate: Mutation<GenerateRequest, Explanation>,
}

impl ExplanationsHandle {
    pub fn new(client: &QueryClient, api: Arc<dyn ExplainApi>, filter: ExplanationFilter) -> Self {
        let list_api = Arc::clone(&api);
        let model_id = filter.model_id().map(str::to_string);
        let explanations = client.observe(
            filter.key(),
            move || {
                let api = Arc::clone(&list_api);
                let model_id = model_id.clone();
                async move { api.list_explanations(model_id.as_deref()).await }
            },
            QueryOptions::enabled(filter.is_selected()),
        );

        // the new explanation shows up in its model's list and in the full list
        let generate = Mutation::new(client, "Generate explanation", move |request: GenerateRequest| {
            let api = Arc::clone(&api);
            async move { api.generate_explanation(request).await }
        })
        .invalidates(|request: &GenerateRequest| {
            vec![
                QueryKey::explanations(Some(&request.model_id)).into(),
                QueryKey::explanations(None).into(),
            ]
        });

        Self {
            filter,
            explanations,
            generate,
        }
    }

    pub fn filter(&self) -> &ExplanationFilter {
        &self.filter
    }

    pub fn state(&self) -> QueryState<Vec<Explanation>> {
        self.explanations.state()
    }

    pub fn explanations(&self) -> Vec<Explanation> {
        self.state().data().cloned().unwrap_or_default()
    }

    pub async fn load(&self) -> Result<Arc<Vec<Explanation>>, ApiError> {
        Ok(self.explanations.result().await?.unwrap_or_default())
    }

    pub async fn refresh(&self) -> Result<Arc<Vec<Explanation>>, ApiError> {
        Ok(self.explanations.refetch().await?.unwrap_or_default())
    }

    pub async fn generate(&self, request: GenerateRequest) -> Result<Arc<Explanation>, ApiError> {
        self.generate.mutate(request).await
    }

    pub async fn generate_with<C>(&self, request: GenerateRequest, on_success: C) -> Result<Arc<Explanation>, ApiError>
    where
        C: FnOnce(&Explanation),
    {
        self.generate.mutate_with(request, on_success).await
    }

    pub fn is_generating(&self) -> bool {
        self.generate.is_pending()
    }

    pub fn generate_error(&self) -> Option<ApiError> {
        self.generate.error()
    }
}
