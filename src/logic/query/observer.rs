use chrono::{DateTime, Utc};
use std::marker::PhantomData;
use std::sync::Arc;

use super::cache::{Fetcher, QueryClient};
use super::key::{Invalidation, QueryKey};
use crate::logic::client::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// A disabled query never fetches and always reports the idle state
    pub enabled: bool,
}

impl QueryOptions {
    pub fn enabled(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Loading / error / data triple exposed to views
#[derive(Debug)]
pub struct QueryState<T> {
    /// Most recent successful result. Kept while a refetch runs.
    pub data: Option<Arc<T>>,
    /// A fetch for this key is in flight
    pub is_loading: bool,
    pub error: Option<ApiError>,
    pub is_stale: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> QueryState<T> {
    /// Nothing fetched, nothing pending
    pub fn idle() -> Self {
        Self {
            data: None,
            is_loading: false,
            error: None,
            is_stale: false,
            updated_at: None,
        }
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_deref()
    }
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            is_loading: self.is_loading,
            error: self.error.clone(),
            is_stale: self.is_stale,
            updated_at: self.updated_at,
        }
    }
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self::idle()
    }
}

/// Live interest in one query key.
///
/// While at least one observer of a key exists, a failed fetch's error is
/// stored for display; with none left it is dropped.
pub struct QueryObserver<T> {
    client: QueryClient,
    key: QueryKey,
    fetcher: Fetcher,
    enabled: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> QueryObserver<T> {
    pub(crate) fn attach(client: QueryClient, key: QueryKey, fetcher: Fetcher, enabled: bool) -> Self {
        if enabled {
            client.add_observer(&key);
            client.ensure(&key, &fetcher);
        } else {
            log::debug!("Query {} disabled - not fetching", key);
        }

        Self {
            client,
            key,
            fetcher,
            enabled,
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current snapshot; never triggers a fetch
    pub fn state(&self) -> QueryState<T> {
        if !self.enabled {
            return QueryState::idle();
        }
        self.client.peek(&self.key)
    }

    /// Wait for the settled value: joins an in-flight fetch, refetches a
    /// stale entry once, otherwise answers from the cache.
    pub async fn result(&self) -> Result<Option<Arc<T>>, ApiError> {
        if !self.enabled {
            return Ok(None);
        }

        let value = self.client.read(&self.key, &self.fetcher).await?;
        Ok(value.and_then(|v| v.downcast::<T>().ok()))
    }

    /// User-requested reload. A fetch already in flight is awaited and a
    /// fresh one is queued behind it.
    pub async fn refetch(&self) -> Result<Option<Arc<T>>, ApiError> {
        if !self.enabled {
            return Ok(None);
        }

        self.client.invalidate(&Invalidation::Key(self.key.clone()));
        self.result().await
    }
}

impl<T> Drop for QueryObserver<T> {
    fn drop(&mut self) {
        if self.enabled {
            self.client.remove_observer(&self.key);
        }
    }
}
