//! Keyed query cache
//!
//! One entry per query key. A fetch runs as a spawned task whose shared
//! handle is the entry's in-flight marker: every reader that arrives while it
//! runs awaits the same handle, so a key never has two concurrent fetches.
//! The map lock is never held across an `.await`.
//!
//! Fetches and invalidations are stamped from one monotonic counter. A fetch
//! only answers a read if it started after the entry's last invalidation, and
//! only the fetch currently marked in flight may write its entry.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use super::key::{Invalidation, QueryKey};
use super::observer::{QueryObserver, QueryOptions, QueryState};
use crate::logic::client::ApiError;

pub(crate) type QueryValue = Arc<dyn Any + Send + Sync>;
pub(crate) type FetchResult = Result<QueryValue, ApiError>;
pub(crate) type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, FetchResult> + Send + Sync>;

/// Handle on a running fetch
#[derive(Clone)]
pub(crate) struct InFlight {
    /// Stamp taken when the fetch started
    id: u64,
    result: Shared<BoxFuture<'static, FetchResult>>,
}

#[derive(Default)]
struct CacheEntry {
    data: Option<QueryValue>,
    error: Option<ApiError>,
    stale: bool,
    in_flight: Option<InFlight>,
    /// Set when the entry was invalidated while a fetch was running
    refetch_queued: bool,
    /// Stamp of the most recent invalidation, 0 if never invalidated
    invalidated_at: u64,
    observers: usize,
    /// Most recently registered fetch function for this key
    fetcher: Option<Fetcher>,
    updated_at: Option<DateTime<Utc>>,
    fetch_count: u64,
}

impl CacheEntry {
    fn needs_fetch(&self) -> bool {
        self.in_flight.is_none() && (self.stale || (self.data.is_none() && self.error.is_none()))
    }
}

struct CacheInner {
    entries: Mutex<HashMap<QueryKey, CacheEntry>>,
    generation: watch::Sender<u64>,
    stamps: AtomicU64,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub in_flight: usize,
    pub stale: usize,
    pub total_fetches: u64,
}

/// In-memory query cache. Cheap to clone; clones share the same store.
///
/// Fetches are spawned on the current tokio runtime, so queries must be
/// started from within one.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<CacheInner>,
}

impl QueryClient {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);

        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(HashMap::new()),
                generation,
                stamps: AtomicU64::new(0),
            }),
        }
    }

    /// Register interest in `key`.
    ///
    /// Starts a fetch when the key has no data yet or is stale and nothing is
    /// in flight. Disabled observers never fetch.
    pub fn observe<T, F, Fut>(&self, key: QueryKey, fetch: F, options: QueryOptions) -> QueryObserver<T>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        QueryObserver::attach(self.clone(), key, erase(fetch), options.enabled)
    }

    /// Read `key` through the cache without keeping an observer.
    ///
    /// Joins an in-flight fetch, returns fresh data as is, refetches stale
    /// or missing data.
    pub async fn fetch_query<T, F, Fut>(&self, key: QueryKey, fetch: F) -> Result<Arc<T>, ApiError>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let fetcher = erase(fetch);
        let value = self.read(&key, &fetcher).await?;

        value
            .and_then(|v| v.downcast::<T>().ok())
            .ok_or_else(|| ApiError::Parse(format!("cached value for {} has an unexpected type", key)))
    }

    /// Snapshot of `key` without triggering a fetch
    pub fn peek<T: Send + Sync + 'static>(&self, key: &QueryKey) -> QueryState<T> {
        let entries = self.inner.entries.lock();

        match entries.get(key) {
            Some(entry) => QueryState {
                data: entry.data.clone().and_then(|v| v.downcast::<T>().ok()),
                is_loading: entry.in_flight.is_some(),
                error: entry.error.clone(),
                is_stale: entry.stale,
                updated_at: entry.updated_at,
            },
            None => QueryState::idle(),
        }
    }

    /// Mark matching entries stale.
    ///
    /// Data is kept and served until the refetch lands. An entry with a
    /// fetch in flight gets a second fetch queued behind it. Returns the
    /// number of entries marked.
    pub fn invalidate(&self, scope: &Invalidation) -> usize {
        let mut marked = 0;

        {
            let mut entries = self.inner.entries.lock();
            for (key, entry) in entries.iter_mut().filter(|(key, _)| scope.matches(key)) {
                entry.stale = true;
                entry.invalidated_at = self.next_stamp();
                if entry.in_flight.is_some() {
                    entry.refetch_queued = true;
                    log::debug!("Invalidated {} while in flight - refetch queued", key);
                } else {
                    log::debug!("Invalidated {}", key);
                }
                marked += 1;
            }
        }

        if marked > 0 {
            self.notify();
        }
        marked
    }

    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.inner
            .entries
            .lock()
            .get(key)
            .map_or(false, |entry| entry.stale)
    }

    /// Drop every entry. Fetches still running finish without storing.
    pub fn clear(&self) {
        self.inner.entries.lock().clear();
        self.notify();
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.inner.entries.lock();

        CacheStats {
            entries: entries.len(),
            in_flight: entries.values().filter(|e| e.in_flight.is_some()).count(),
            stale: entries.values().filter(|e| e.stale).count(),
            total_fetches: entries.values().map(|e| e.fetch_count).sum(),
        }
    }

    /// Change notifications: the value is bumped whenever any entry changes
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.generation.subscribe()
    }

    // ------------------------------------------------------------------
    // Internals shared with observers
    // ------------------------------------------------------------------

    /// Read `key`, fetching if needed, and return the settled data or error.
    ///
    /// A fetch that started before the entry's last invalidation does not
    /// answer the read; the read waits for the queued refetch instead.
    pub(crate) async fn read(&self, key: &QueryKey, fetcher: &Fetcher) -> Result<Option<QueryValue>, ApiError> {
        let mut required: Option<u64> = None;

        loop {
            let (pending, invalidated_at) = self.ensure_stamped(key, fetcher);
            let required = *required.get_or_insert(invalidated_at);
            let Some(pending) = pending else {
                break;
            };

            let result = pending.result.await;
            if pending.id > required {
                return result.map(Some);
            }
            log::debug!("Fetch of {} predates its invalidation - waiting for the refetch", key);
        }

        let entries = self.inner.entries.lock();
        match entries.get(key) {
            Some(entry) => match (&entry.error, &entry.data) {
                (Some(error), _) => Err(error.clone()),
                (None, data) => Ok(data.clone()),
            },
            None => Ok(None),
        }
    }

    /// Register `fetcher` for `key` and start a fetch if one is due.
    /// Returns the in-flight handle, if any.
    pub(crate) fn ensure(&self, key: &QueryKey, fetcher: &Fetcher) -> Option<InFlight> {
        self.ensure_stamped(key, fetcher).0
    }

    /// `ensure`, plus the entry's last invalidation stamp read under the same lock
    fn ensure_stamped(&self, key: &QueryKey, fetcher: &Fetcher) -> (Option<InFlight>, u64) {
        let mut entries = self.inner.entries.lock();
        let entry = entries.entry(key.clone()).or_default();
        entry.fetcher = Some(Arc::clone(fetcher));
        let invalidated_at = entry.invalidated_at;

        if let Some(pending) = &entry.in_flight {
            return (Some(pending.clone()), invalidated_at);
        }

        if entry.needs_fetch() {
            return (self.start_fetch(key, entry), invalidated_at);
        }

        (None, invalidated_at)
    }

    pub(crate) fn add_observer(&self, key: &QueryKey) {
        let mut entries = self.inner.entries.lock();
        entries.entry(key.clone()).or_default().observers += 1;
    }

    pub(crate) fn remove_observer(&self, key: &QueryKey) {
        let mut entries = self.inner.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.observers = entry.observers.saturating_sub(1);
        }
    }

    /// Spawn a fetch for `entry`. Caller holds the map lock.
    fn start_fetch(&self, key: &QueryKey, entry: &mut CacheEntry) -> Option<InFlight> {
        let fetcher = entry.fetcher.clone()?;
        let future = fetcher();

        let id = self.next_stamp();
        entry.fetch_count += 1;
        log::debug!("Fetching {} (fetch #{})", key, entry.fetch_count);

        let client = self.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let result = AssertUnwindSafe(future)
                .catch_unwind()
                .await
                .unwrap_or(Err(ApiError::Aborted));
            client.complete(&task_key, id, result.clone());
            result
        });

        let pending = InFlight {
            id,
            result: async move { handle.await.unwrap_or(Err(ApiError::Aborted)) }
                .boxed()
                .shared(),
        };

        entry.in_flight = Some(pending.clone());
        self.notify();
        Some(pending)
    }

    /// Store a finished fetch and start the queued refetch, if any.
    /// Results of fetches no longer marked in flight (e.g. after `clear`)
    /// are dropped.
    fn complete(&self, key: &QueryKey, id: u64, result: FetchResult) {
        {
            let mut entries = self.inner.entries.lock();
            let Some(entry) = entries
                .get_mut(key)
                .filter(|entry| entry.in_flight.as_ref().map(|f| f.id) == Some(id))
            else {
                log::debug!("Discarding result of a superseded fetch for {}", key);
                return;
            };

            entry.in_flight = None;
            match result {
                Ok(value) => {
                    entry.data = Some(value);
                    entry.error = None;
                    entry.stale = false;
                    entry.updated_at = Some(Utc::now());
                    log::debug!("Query {} settled", key);
                }
                Err(error) if entry.observers == 0 => {
                    log::debug!("Query {} failed with no observers left: {}", key, error);
                }
                Err(error) => {
                    log::warn!("Query {} failed: {}", key, error);
                    entry.error = Some(error);
                    entry.stale = false;
                }
            }

            if entry.refetch_queued {
                entry.refetch_queued = false;
                entry.stale = true;
                self.start_fetch(key, entry);
            }
        }

        self.notify();
    }

    fn next_stamp(&self) -> u64 {
        self.inner.stamps.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn notify(&self) {
        self.inner.generation.send_modify(|generation| *generation += 1);
    }
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erase a typed fetch function into a cache fetcher
pub(crate) fn erase<T, F, Fut>(fetch: F) -> Fetcher
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
{
    Arc::new(move || {
        let future = fetch();
        async move { future.await.map(|value| Arc::new(value) as QueryValue) }.boxed()
    })
}
