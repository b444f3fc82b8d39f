//! Explainify Client
//!
//! Browse machine-learning models held by a remote explanation service and
//! request explanations of their outputs.
//!
//! ```text
//!   view (upload panel, form, chart, lists)
//!         │ user actions            ▲ QueryState / MutationState
//!         ▼                         │
//!   logic::resources (ModelsHandle, ExplanationsHandle)
//!         │                         ▲
//!         ▼                         │
//!   logic::query (QueryClient cache, Mutation)
//!         │                         ▲
//!         ▼                         │
//!   logic::client (ExplainApi → ApiClient over HTTP)
//! ```

pub mod constants;
pub mod logic;
pub mod view;

pub use logic::client::{ApiClient, ApiError, ExplainApi};
pub use logic::config::{ApiContract, ClientConfig};
pub use logic::query::{Invalidation, Mutation, QueryClient, QueryKey, QueryObserver, QueryState};
pub use logic::resources::{ExplanationFilter, ExplanationsHandle, ModelsHandle};
pub use logic::types::{
    Explanation, ExplanationKind, ExplanationResult, GenerateRequest, Model, ModelUpload,
};
