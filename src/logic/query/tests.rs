use super::*;
use crate::logic::client::ApiError;
use futures::future::{BoxFuture, FutureExt};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

type CountingFetch = Arc<dyn Fn() -> BoxFuture<'static, Result<usize, ApiError>> + Send + Sync>;

/// Fetch function returning its own call number. Each call waits for one
/// permit on `gate`, so tests decide when a fetch finishes.
fn counting_fetch(calls: &Arc<AtomicUsize>, gate: &Arc<Semaphore>) -> impl Fn() -> BoxFuture<'static, Result<usize, ApiError>> + Clone + Send + Sync + 'static {
    let calls = Arc::clone(calls);
    let gate = Arc::clone(gate);

    move || {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        let gate = Arc::clone(&gate);
        async move {
            gate.acquire().await.map_err(|_| ApiError::Aborted)?.forget();
            Ok(n)
        }
        .boxed()
    }
}

fn failing_fetch(calls: &Arc<AtomicUsize>, gate: &Arc<Semaphore>) -> CountingFetch {
    let calls = Arc::clone(calls);
    let gate = Arc::clone(gate);

    Arc::new(move || {
        calls.fetch_add(1, Ordering::SeqCst);
        let gate = Arc::clone(&gate);
        async move {
            gate.acquire().await.map_err(|_| ApiError::Aborted)?.forget();
            Err(ApiError::Server { status: 500 })
        }
        .boxed()
    })
}

async fn wait_until_idle(client: &QueryClient) {
    let mut changes = client.subscribe();
    while client.stats().in_flight > 0 {
        changes.changed().await.unwrap();
    }
}

#[tokio::test]
async fn test_concurrent_observers_share_one_fetch() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let fetch = counting_fetch(&calls, &gate);

    let first: QueryObserver<usize> = client.observe(QueryKey::models(), fetch.clone(), QueryOptions::default());
    let second: QueryObserver<usize> = client.observe(QueryKey::models(), fetch.clone(), QueryOptions::default());
    let third: QueryObserver<usize> = client.observe(QueryKey::models(), fetch, QueryOptions::default());

    assert!(first.state().is_loading);
    assert!(first.state().data.is_none());

    gate.add_permits(1);
    let (a, b, c) = tokio::join!(first.result(), second.result(), third.result());
    let (a, b, c) = (a.unwrap().unwrap(), b.unwrap().unwrap(), c.unwrap().unwrap());

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*a, 1);
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&b, &c));
    assert!(!first.state().is_loading);
}

#[tokio::test]
async fn test_fetch_query_shares_in_flight_result() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let fetch = counting_fetch(&calls, &gate);

    gate.add_permits(1);
    let (a, b) = tokio::join!(
        client.fetch_query(QueryKey::models(), fetch.clone()),
        client.fetch_query(QueryKey::models(), fetch.clone()),
    );
    let (a, b): (Arc<usize>, Arc<usize>) = (a.unwrap(), b.unwrap());

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // fresh data is served without a new call
    let cached: Arc<usize> = client.fetch_query(QueryKey::models(), fetch).await.unwrap();
    assert!(Arc::ptr_eq(&a, &cached));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_disabled_query_never_fetches() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(1));
    let fetch = counting_fetch(&calls, &gate);

    let observer: QueryObserver<usize> = client.observe(
        QueryKey::explanations(None),
        fetch,
        QueryOptions::enabled(false),
    );

    let state = observer.state();
    assert!(!state.is_loading);
    assert!(state.data.is_none());
    assert!(state.error.is_none());

    assert_eq!(observer.result().await.unwrap(), None);
    assert_eq!(observer.refetch().await.unwrap(), None);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(client.stats().entries, 0);
}

#[tokio::test]
async fn test_stale_while_revalidate() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let fetch = counting_fetch(&calls, &gate);
    let key = QueryKey::models();

    let observer: QueryObserver<usize> = client.observe(key.clone(), fetch.clone(), QueryOptions::default());
    gate.add_permits(1);
    assert_eq!(observer.result().await.unwrap().as_deref(), Some(&1));

    assert_eq!(client.invalidate(&key.clone().into()), 1);
    let state = observer.state();
    assert!(state.is_stale);
    assert!(!state.is_loading);
    assert_eq!(state.data(), Some(&1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // re-observation of the stale key starts exactly one fetch
    let revalidating: QueryObserver<usize> = client.observe(key.clone(), fetch.clone(), QueryOptions::default());
    let joining: QueryObserver<usize> = client.observe(key.clone(), fetch, QueryOptions::default());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let state = revalidating.state();
    assert!(state.is_loading);
    assert_eq!(state.data(), Some(&1));

    gate.add_permits(1);
    assert_eq!(joining.result().await.unwrap().as_deref(), Some(&2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!observer.state().is_stale);
    assert_eq!(observer.state().data(), Some(&2));
}

#[tokio::test]
async fn test_invalidation_during_flight_queues_refetch() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let key = QueryKey::explanations(Some("m1"));

    let observer: QueryObserver<usize> =
        client.observe(key.clone(), counting_fetch(&calls, &gate), QueryOptions::default());
    assert_eq!(client.invalidate(&Invalidation::Resource(Resource::Explanations)), 1);

    // the running fetch is not cancelled and nothing starts yet
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.stats().in_flight, 1);

    let mut changes = client.subscribe();
    gate.add_permits(1);
    while calls.load(Ordering::SeqCst) < 2 {
        changes.changed().await.unwrap();
    }

    // second fetch started as soon as the first resolved
    let state = observer.state();
    assert!(state.is_loading);
    assert_eq!(state.data(), Some(&1));

    gate.add_permits(1);
    assert_eq!(observer.result().await.unwrap().as_deref(), Some(&2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!client.is_stale(&key));
}

#[tokio::test]
async fn test_read_after_mid_flight_mutation_sees_fresh_data() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let models: QueryObserver<usize> =
        client.observe(QueryKey::models(), counting_fetch(&calls, &gate), QueryOptions::default());
    assert!(models.state().is_loading);

    let upload = Mutation::new(&client, "Upload", |n: u32| async move { Ok::<_, ApiError>(n) })
        .invalidates(|_| vec![QueryKey::models().into()]);
    upload.mutate(7).await.unwrap();
    assert!(client.is_stale(&QueryKey::models()));

    // the fetch that started before the upload must not answer this read
    gate.add_permits(2);
    assert_eq!(models.result().await.unwrap().as_deref(), Some(&2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // same for an explicit refetch issued while a fetch is running
    client.invalidate(&Invalidation::Key(QueryKey::models()));
    let _again: QueryObserver<usize> =
        client.observe(QueryKey::models(), counting_fetch(&calls, &gate), QueryOptions::default());
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let (refetched, ()) = tokio::join!(models.refetch(), async { gate.add_permits(2) });
    assert_eq!(refetched.unwrap().as_deref(), Some(&4));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_fetch_started_before_clear_does_not_store() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let early_gate = Arc::new(Semaphore::new(0));
    let finished = Arc::new(AtomicBool::new(false));

    let _early: QueryObserver<usize> = client.observe(QueryKey::models(), {
        let early_gate = Arc::clone(&early_gate);
        let finished = Arc::clone(&finished);
        move || {
            let early_gate = Arc::clone(&early_gate);
            let finished = Arc::clone(&finished);
            async move {
                early_gate.acquire().await.map_err(|_| ApiError::Aborted)?.forget();
                finished.store(true, Ordering::SeqCst);
                Ok::<usize, _>(100)
            }
        }
    }, QueryOptions::default());

    client.clear();
    let second: QueryObserver<usize> =
        client.observe(QueryKey::models(), counting_fetch(&calls, &gate), QueryOptions::default());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    early_gate.add_permits(1);
    while !finished.load(Ordering::SeqCst) {
        tokio::task::yield_now().await;
    }
    tokio::task::yield_now().await;

    // the newer fetch is still the one in flight
    assert_eq!(client.stats().in_flight, 1);
    let state = second.state();
    assert!(state.is_loading);
    assert!(state.data.is_none());

    // still deduplicated: no second concurrent fetch for the key
    client.invalidate(&Invalidation::Resource(Resource::Models));
    let _third: QueryObserver<usize> =
        client.observe(QueryKey::models(), counting_fetch(&calls, &gate), QueryOptions::default());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    gate.add_permits(2);
    assert_eq!(second.result().await.unwrap().as_deref(), Some(&2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_observed_error_is_stored_and_not_retried() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let fetch = failing_fetch(&calls, &gate);
    let key = QueryKey::models();

    let observer: QueryObserver<usize> = client.observe(key.clone(), {
        let fetch = Arc::clone(&fetch);
        move || fetch()
    }, QueryOptions::default());

    gate.add_permits(1);
    assert_eq!(observer.result().await, Err(ApiError::Server { status: 500 }));
    assert_eq!(observer.state().error, Some(ApiError::Server { status: 500 }));

    // no automatic retry on re-observation
    let again: QueryObserver<usize> = client.observe(key, move || fetch(), QueryOptions::default());
    assert_eq!(again.result().await, Err(ApiError::Server { status: 500 }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // explicit user re-trigger does fetch again
    gate.add_permits(1);
    assert!(again.refetch().await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_abandoned_fetch_error_is_swallowed() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let fetch = failing_fetch(&calls, &gate);
    let key = QueryKey::models();

    let observer: QueryObserver<usize> = client.observe(key.clone(), move || fetch(), QueryOptions::default());
    drop(observer);

    gate.add_permits(1);
    wait_until_idle(&client).await;

    let state: QueryState<usize> = client.peek(&key);
    assert!(state.error.is_none());
    assert!(state.data.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_abandoned_fetch_success_is_cached() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let fetch = counting_fetch(&calls, &gate);

    drop(client.observe::<usize, _, _>(QueryKey::models(), fetch.clone(), QueryOptions::default()));
    gate.add_permits(1);
    wait_until_idle(&client).await;

    let state: QueryState<usize> = client.peek(&QueryKey::models());
    assert_eq!(state.data(), Some(&1));

    let observer: QueryObserver<usize> = client.observe(QueryKey::models(), fetch, QueryOptions::default());
    assert!(!observer.state().is_loading);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_mutation_invalidates_before_success_callback() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let models: QueryObserver<usize> =
        client.observe(QueryKey::models(), counting_fetch(&calls, &gate), QueryOptions::default());
    gate.add_permits(1);
    assert_eq!(models.result().await.unwrap().as_deref(), Some(&1));

    let upload = Mutation::new(&client, "Upload", |n: u32| async move { Ok::<_, ApiError>(n * 2) })
        .invalidates(|_| vec![QueryKey::models().into()]);

    let saw_stale = AtomicBool::new(false);
    let value = upload
        .mutate_with(21, |doubled| {
            assert_eq!(*doubled, 42);
            saw_stale.store(client.is_stale(&QueryKey::models()), Ordering::SeqCst);
        })
        .await
        .unwrap();

    assert_eq!(*value, 42);
    assert!(saw_stale.load(Ordering::SeqCst));
    assert_eq!(upload.data().as_deref(), Some(&42));
    assert!(!upload.is_pending());

    // next read fetches fresh data
    gate.add_permits(1);
    assert_eq!(models.result().await.unwrap().as_deref(), Some(&2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_mutation_leaves_cache_untouched() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let models: QueryObserver<usize> =
        client.observe(QueryKey::models(), counting_fetch(&calls, &gate), QueryOptions::default());
    gate.add_permits(1);
    models.result().await.unwrap();

    let rejected = ApiError::Validation { status: 422, message: "bad file".to_string() };
    let upload = Mutation::new(&client, "Upload", {
        let rejected = rejected.clone();
        move |_: ()| {
            let rejected = rejected.clone();
            async move { Err::<u32, _>(rejected) }
        }
    })
    .invalidates(|_| vec![QueryKey::models().into()]);

    let called_back = AtomicBool::new(false);
    let err = upload
        .mutate_with((), |_| called_back.store(true, Ordering::SeqCst))
        .await
        .unwrap_err();

    assert_eq!(err, rejected);
    assert!(!called_back.load(Ordering::SeqCst));
    assert_eq!(upload.error(), Some(rejected));
    assert!(!client.is_stale(&QueryKey::models()));
    assert_eq!(models.result().await.unwrap().as_deref(), Some(&1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    upload.reset();
    assert!(upload.state().error.is_none());
}

#[tokio::test]
async fn test_concurrent_mutations_are_independent() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));

    let upload = Mutation::new(&client, "Upload", {
        let calls = Arc::clone(&calls);
        let gate = Arc::clone(&gate);
        move |name: &'static str| {
            calls.fetch_add(1, Ordering::SeqCst);
            let gate = Arc::clone(&gate);
            async move {
                gate.acquire().await.map_err(|_| ApiError::Aborted)?.forget();
                Ok::<_, ApiError>(name)
            }
        }
    });

    let first = tokio::spawn({
        let upload = upload.clone();
        async move { upload.mutate("a.pkl").await }
    });
    let second = tokio::spawn({
        let upload = upload.clone();
        async move { upload.mutate("b.pkl").await }
    });

    while calls.load(Ordering::SeqCst) < 2 {
        tokio::task::yield_now().await;
    }
    assert!(upload.is_pending());

    gate.add_permits(2);
    assert_eq!(*first.await.unwrap().unwrap(), "a.pkl");
    assert_eq!(*second.await.unwrap().unwrap(), "b.pkl");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!upload.is_pending());
}

#[tokio::test]
async fn test_stats_and_clear() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let fetch = counting_fetch(&calls, &gate);

    let models: QueryObserver<usize> = client.observe(QueryKey::models(), fetch.clone(), QueryOptions::default());
    let scoped: QueryObserver<usize> =
        client.observe(QueryKey::explanations(Some("m1")), fetch, QueryOptions::default());

    let stats = client.stats();
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.in_flight, 2);
    assert_eq!(stats.total_fetches, 2);

    gate.add_permits(2);
    models.result().await.unwrap();
    scoped.result().await.unwrap();
    client.invalidate(&Invalidation::Resource(Resource::Explanations));
    assert_eq!(client.stats().stale, 1);

    client.clear();
    assert_eq!(client.stats(), CacheStats::default());
    assert!(models.state().data.is_none());
}
