//! Query/Mutation Cache Layer
//!
//! - `key` - Query identity and invalidation scopes
//! - `cache` - `QueryClient` store: dedup, invalidation, stale-while-revalidate
//! - `observer` - `QueryObserver` handles and the `QueryState` triple
//! - `mutation` - `Mutation` with invalidate-on-success

pub mod key;
pub mod cache;
pub mod observer;
pub mod mutation;

#[cfg(test)]
mod tests;

pub use cache::{CacheStats, QueryClient};
pub use key::{Invalidation, QueryKey, Resource};
pub use mutation::{Mutation, MutationState};
pub use observer::{QueryObserver, QueryOptions, QueryState};
