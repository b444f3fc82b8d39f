//! Model upload panel: drag highlight, staged file and submit.

use std::sync::Arc;

use crate::constants::ACCEPTED_MODEL_EXTENSIONS;
use crate::logic::client::ApiError;
use crate::logic::resources::ModelsHandle;
use crate::logic::types::{Model, ModelUpload};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragEvent {
    Enter,
    Over,
    Leave,
    Drop(ModelUpload),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Staged,
    /// Extension outside the accepted list; the file was not staged
    Rejected { extension: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    Idle,
    Uploading,
    Failed(String),
}

#[derive(Debug, Default)]
pub struct UploadPanel {
    drag_active: bool,
    staged: Option<ModelUpload>,
}

impl UploadPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_drag_active(&self) -> bool {
        self.drag_active
    }

    pub fn staged(&self) -> Option<&ModelUpload> {
        self.staged.as_ref()
    }

    pub fn handle_drag(&mut self, event: DragEvent) -> Option<StageOutcome> {
        match event {
            DragEvent::Enter | DragEvent::Over => {
                self.drag_active = true;
                None
            }
            DragEvent::Leave => {
                self.drag_active = false;
                None
            }
            DragEvent::Drop(file) => {
                self.drag_active = false;
                Some(self.stage(file))
            }
        }
    }

    /// Stage a file picked by the user. Unknown extensions are refused.
    pub fn stage(&mut self, file: ModelUpload) -> StageOutcome {
        if is_accepted(&file) {
            log::debug!("Staged {}", file.file_name);
            self.staged = Some(file);
            StageOutcome::Staged
        } else {
            log::warn!("Refusing to stage {}: {}", file.file_name, hint());
            StageOutcome::Rejected {
                extension: file.extension(),
            }
        }
    }

    /// Stage regardless of extension and let the server decide
    pub fn force_stage(&mut self, file: ModelUpload) {
        self.staged = Some(file);
    }

    pub fn clear(&mut self) {
        self.staged = None;
    }

    /// Upload the staged file. It stays staged if the upload fails.
    pub async fn submit(&mut self, models: &ModelsHandle) -> Result<Arc<Model>, ApiError> {
        let file = self
            .staged
            .take()
            .ok_or_else(|| ApiError::InvalidInput("no model file staged".to_string()))?;

        match models.upload(file.clone()).await {
            Ok(model) => Ok(model),
            Err(e) => {
                self.staged = Some(file);
                Err(e)
            }
        }
    }

    pub fn status(&self, models: &ModelsHandle) -> UploadStatus {
        if models.is_uploading() {
            return UploadStatus::Uploading;
        }
        match models.upload_error() {
            Some(e) => UploadStatus::Failed(e.to_string()),
            None => UploadStatus::Idle,
        }
    }
}

pub fn is_accepted(file: &ModelUpload) -> bool {
    file.extension()
        .map_or(false, |ext| ACCEPTED_MODEL_EXTENSIONS.contains(&ext.as_str()))
}

/// "Supported formats: .pkl, .h5"
pub fn hint() -> String {
    format!("Supported formats: {}", ACCEPTED_MODEL_EXTENSIONS.join(", "))
}
