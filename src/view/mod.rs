//! View State
//!
//! Renderable state derived from the cache layer plus the little local state
//! a screen owns (staged file, drag highlight, raw form text, active tab).
//!
//! - `upload` - drag-and-drop upload panel
//! - `form` - explanation request form
//! - `chart` - feature importance bars and prediction summary
//! - `lists` - model/explanation list states, tabs and text rendering

pub mod upload;
pub mod form;
pub mod chart;
pub mod lists;

pub use chart::{Bar, FeatureChart, PredictionSummary};
pub use form::{ExplanationForm, FormError, InputMode};
pub use lists::{
    explanations_view, models_view, render_explanation, render_explanations, render_models, ExplanationTabs, ListView,
};
pub use upload::{DragEvent, StageOutcome, UploadPanel, UploadStatus};
