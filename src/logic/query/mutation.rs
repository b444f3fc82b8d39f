use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;

use super::cache::QueryClient;
use super::key::Invalidation;
use crate::logic::client::ApiError;

type MutateFn<I, O> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<O, ApiError>> + Send + Sync>;
type InvalidatesFn<I> = Arc<dyn Fn(&I) -> Vec<Invalidation> + Send + Sync>;

struct Progress<O> {
    pending: usize,
    data: Option<Arc<O>>,
    error: Option<ApiError>,
}

/// Outcome of the most recently settled invocation
#[derive(Debug)]
pub struct MutationState<O> {
    pub is_pending: bool,
    pub data: Option<Arc<O>>,
    pub error: Option<ApiError>,
}

impl<O> Clone for MutationState<O> {
    fn clone(&self) -> Self {
        Self {
            is_pending: self.is_pending,
            data: self.data.clone(),
            error: self.error.clone(),
        }
    }
}

/// Side-effecting server call with cache invalidation on success.
///
/// Every `mutate` performs its own call; concurrent invocations are not
/// merged. On success the declared keys are invalidated before the caller's
/// success callback runs. On failure the cache is left alone.
pub struct Mutation<I, O> {
    client: QueryClient,
    label: &'static str,
    run: MutateFn<I, O>,
    invalidates: InvalidatesFn<I>,
    progress: Arc<Mutex<Progress<O>>>,
}

impl<I, O> Clone for Mutation<I, O> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            label: self.label,
            run: Arc::clone(&self.run),
            invalidates: Arc::clone(&self.invalidates),
            progress: Arc::clone(&self.progress),
        }
    }
}

impl<I, O> Mutation<I, O>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    pub fn new<F, Fut>(client: &QueryClient, label: &'static str, run: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ApiError>> + Send + 'static,
    {
        Self {
            client: client.clone(),
            label,
            run: Arc::new(move |input| run(input).boxed()),
            invalidates: Arc::new(no_invalidation::<I>),
            progress: Arc::new(Mutex::new(Progress {
                pending: 0,
                data: None,
                error: None,
            })),
        }
    }

    /// Keys to invalidate when a call with this input succeeds
    pub fn invalidates<F>(mut self, scopes: F) -> Self
    where
        F: Fn(&I) -> Vec<Invalidation> + Send + Sync + 'static,
    {
        self.invalidates = Arc::new(scopes);
        self
    }

    pub async fn mutate(&self, input: I) -> Result<Arc<O>, ApiError> {
        self.mutate_with(input, |_| {}).await
    }

    /// Run the call; `on_success` fires after invalidation
    pub async fn mutate_with<C>(&self, input: I, on_success: C) -> Result<Arc<O>, ApiError>
    where
        C: FnOnce(&O),
    {
        let scopes = (self.invalidates)(&input);
        let guard = PendingGuard::enter(Arc::clone(&self.progress));

        let outcome = (self.run)(input).await;
        drop(guard);

        match outcome {
            Ok(value) => {
                let value = Arc::new(value);
                let marked: usize = scopes.iter().map(|scope| self.client.invalidate(scope)).sum();
                log::info!("{} succeeded ({} cached queries invalidated)", self.label, marked);

                {
                    let mut progress = self.progress.lock();
                    progress.data = Some(Arc::clone(&value));
                    progress.error = None;
                }

                on_success(&value);
                Ok(value)
            }
            Err(error) => {
                log::error!("{} failed: {}", self.label, error);
                self.progress.lock().error = Some(error.clone());
                Err(error)
            }
        }
    }

    pub fn is_pending(&self) -> bool {
        self.progress.lock().pending > 0
    }

    pub fn error(&self) -> Option<ApiError> {
        self.progress.lock().error.clone()
    }

    pub fn data(&self) -> Option<Arc<O>> {
        self.progress.lock().data.clone()
    }

    pub fn state(&self) -> MutationState<O> {
        let progress = self.progress.lock();
        MutationState {
            is_pending: progress.pending > 0,
            data: progress.data.clone(),
            error: progress.error.clone(),
        }
    }

    /// Forget the last outcome (e.g. when the user dismisses an error)
    pub fn reset(&self) {
        let mut progress = self.progress.lock();
        progress.data = None;
        progress.error = None;
    }
}

fn no_invalidation<I>(_: &I) -> Vec<Invalidation> {
    Vec::new()
}

/// Keeps `pending` accurate even when a `mutate` future is dropped mid-call
struct PendingGuard<O> {
    progress: Arc<Mutex<Progress<O>>>,
}

impl<O> PendingGuard<O> {
    fn enter(progress: Arc<Mutex<Progress<O>>>) -> Self {
        progress.lock().pending += 1;
        Self { progress }
    }
}

impl<O> Drop for PendingGuard<O> {
    fn drop(&mut self) {
        let mut progress = self.progress.lock();
        progress.pending = progress.pending.saturating_sub(1);
    }
}
