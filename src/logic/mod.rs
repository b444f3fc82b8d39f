//! Logic Module - Client Core
//!
//! - `types` - Wire types (Model, Explanation, requests)
//! - `config` - Client configuration & API contract versions
//! - `client/` - HTTP API client behind the `ExplainApi` trait
//! - `query/` - Query/mutation cache (dedup, invalidation, stale-while-revalidate)
//! - `resources` - Pre-wired models / explanations handles used by the views

pub mod types;
pub mod config;
pub mod client;
pub mod query;
pub mod resources;
