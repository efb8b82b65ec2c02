use agora_cache::{CacheError, FetchOptions, OptimisticUpdate, QueryCache, QueryKey, RetryPolicy};
use agora_core::{BackendError, BackendResult, ErrorKind};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Fetcher that counts calls, waits `latency`, then yields `value`
fn slow_counter<T: Clone + Send + Sync + 'static>(
    calls: &Arc<AtomicUsize>,
    latency: Duration,
    value: T,
) -> impl Fn() -> futures::future::BoxFuture<'static, BackendResult<T>> + Send + Sync + 'static {
    use futures::FutureExt;
    let calls = calls.clone();
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        let value = value.clone();
        async move {
            tokio::time::sleep(latency).await;
            Ok(value)
        }
        .boxed()
    }
}

/// Fetcher that reads `server` when called and replies after `latency`
fn reading(
    server: &Arc<AtomicU64>,
    calls: &Arc<AtomicUsize>,
    latency: Duration,
) -> impl Fn() -> futures::future::BoxFuture<'static, BackendResult<u64>> + Send + Sync + 'static {
    use futures::FutureExt;
    let server = server.clone();
    let calls = calls.clone();
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        let value = server.load(Ordering::SeqCst);
        async move {
            tokio::time::sleep(latency).await;
            Ok(value)
        }
        .boxed()
    }
}

async fn wait_for_calls(calls: &AtomicUsize, n: usize) {
    while calls.load(Ordering::SeqCst) < n {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_fetches_share_one_call() {
    let cache = QueryCache::default();
    let key = QueryKey::new("leaderboard");
    let calls = Arc::new(AtomicUsize::new(0));
    let options = cache.options();

    let (a, b, c) = tokio::join!(
        cache.fetch(&key, slow_counter(&calls, Duration::from_millis(50), 1u32), &options),
        cache.fetch(&key, slow_counter(&calls, Duration::from_millis(50), 2u32), &options),
        cache.fetch(&key, slow_counter(&calls, Duration::from_millis(50), 3u32), &options),
    );

    assert_eq!((*a.unwrap(), *b.unwrap(), *c.unwrap()), (1, 1, 1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_retry_twice() {
    let cache = QueryCache::default();
    let key = QueryKey::new("statistics");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let err = cache
        .fetch(
            &key,
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<u32, _>(BackendError::classify("replica unavailable")) }
            },
            &cache.options(),
        )
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(err.backend().map(BackendError::kind), Some(ErrorKind::Transient));
    let state = cache.state::<u32>(&key);
    assert!(state.is_error());
    assert!(!state.is_fetching);
}

#[tokio::test(start_paused = true)]
async fn test_transient_error_recovers_on_retry() {
    let cache = QueryCache::default();
    let key = QueryKey::new("events");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let value = cache
        .fetch(
            &key,
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(BackendError::transient("connection reset"))
                    } else {
                        Ok(vec![n])
                    }
                }
            },
            &cache.options(),
        )
        .await
        .unwrap();

    assert_eq!(*value, vec![2]);
    assert!(cache.state::<Vec<usize>>(&key).is_success());
}

#[tokio::test]
async fn test_expected_absence_resolves_to_empty() {
    let cache = QueryCache::default();
    let key = QueryKey::new("currentUserProfile");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let value = cache
        .fetch(
            &key,
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<Option<String>, _>(BackendError::classify("User must be registered")) }
            },
            &cache.options().absence_as_empty(),
        )
        .await
        .unwrap();

    assert_eq!(*value, None);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!cache.state::<Option<String>>(&key).is_error());
}

#[tokio::test]
async fn test_absence_without_fallback_is_an_error() {
    let cache = QueryCache::default();
    let key = QueryKey::new("isAdmin");

    let err = cache
        .fetch(
            &key,
            || async { Err::<bool, _>(BackendError::classify("Unauthorized: anonymous caller")) },
            &FetchOptions::new().with_retry(RetryPolicy::none()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CacheError::Backend(ref e) if e.kind() == ErrorKind::NotRegistered));
}

#[tokio::test]
async fn test_failed_refetch_keeps_last_value() {
    let cache = QueryCache::default();
    let key = QueryKey::new("event").with(4);
    let fail = Arc::new(AtomicBool::new(false));
    let flag = fail.clone();
    let fetch = move || {
        let failing = flag.load(Ordering::SeqCst);
        async move {
            if failing {
                Err(BackendError::classify("Event not found"))
            } else {
                Ok(5u32)
            }
        }
    };
    let options = cache.options();

    cache.fetch(&key, fetch.clone(), &options).await.unwrap();
    fail.store(true, Ordering::SeqCst);
    cache.invalidate(&key);
    assert!(cache.fetch(&key, fetch, &options).await.is_err());

    let state = cache.state::<u32>(&key);
    assert_eq!(state.data.as_deref(), Some(&5));
    assert!(state.is_error());
}

#[tokio::test]
async fn test_invalidate_matches_prefix_and_is_idempotent() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let options = cache.options();

    for key in [
        QueryKey::new("event").with(1),
        QueryKey::new("event").with(2),
        QueryKey::new("events"),
    ] {
        cache
            .fetch(&key, slow_counter(&calls, Duration::ZERO, 0u8), &options)
            .await
            .unwrap();
    }

    assert_eq!(cache.invalidate(&QueryKey::new("event")), 2);
    assert_eq!(cache.invalidate(&QueryKey::new("event")), 2);
    assert!(!cache.state::<u8>(&QueryKey::new("events")).is_invalidated);

    let key = QueryKey::new("event").with(1);
    let state = cache.state::<u8>(&key);
    assert!(state.is_invalidated);
    assert_eq!(state.data.as_deref(), Some(&0));

    cache
        .fetch(&key, slow_counter(&calls, Duration::ZERO, 0u8), &options)
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_optimistic_failure_restores_snapshots() {
    let cache = QueryCache::default();
    let visible = QueryKey::from_parts(["messages", "visible"]);
    let all = QueryKey::from_parts(["messages", "all"]);
    let options = cache.options();
    cache
        .fetch(&visible, || async { BackendResult::Ok(vec![1u64, 2]) }, &options)
        .await
        .unwrap();
    cache
        .fetch(&all, || async { BackendResult::Ok(vec![1u64, 2, 3]) }, &options)
        .await
        .unwrap();

    let update = OptimisticUpdate::new(|ids: &Vec<u64>| ids.iter().copied().filter(|id| *id != 2).collect())
        .target(visible.clone())
        .target(all.clone());
    let result: BackendResult<()> = cache
        .mutate_optimistic(
            update,
            async { Err(BackendError::classify("Only admins can remove messages")) },
            &[],
        )
        .await;

    assert!(result.is_err());
    assert_eq!(cache.state::<Vec<u64>>(&visible).data.as_deref(), Some(&vec![1, 2]));
    assert_eq!(cache.state::<Vec<u64>>(&all).data.as_deref(), Some(&vec![1, 2, 3]));
    assert!(cache.state::<Vec<u64>>(&all).is_invalidated);
}

#[tokio::test]
async fn test_optimistic_success_keeps_patch_and_invalidates_dependents() {
    let cache = QueryCache::default();
    let all = QueryKey::from_parts(["messages", "all"]);
    let profile = QueryKey::new("currentUserProfile");
    let options = cache.options();
    cache
        .fetch(&all, || async { BackendResult::Ok(vec![1u64, 2, 3]) }, &options)
        .await
        .unwrap();
    cache
        .fetch(&profile, || async { BackendResult::Ok(10u64) }, &cache.options())
        .await
        .unwrap();

    let update = OptimisticUpdate::new(|ids: &Vec<u64>| ids.iter().copied().filter(|id| *id != 3).collect())
        .target(all.clone());
    cache
        .mutate_optimistic(update, async { BackendResult::Ok(()) }, &[profile.clone()])
        .await
        .unwrap();

    let state = cache.state::<Vec<u64>>(&all);
    assert_eq!(state.data.as_deref(), Some(&vec![1, 2]));
    assert!(state.is_invalidated);
    assert!(cache.state::<u64>(&profile).is_invalidated);
}

#[tokio::test(start_paused = true)]
async fn test_optimistic_patch_survives_in_flight_fetch() {
    let cache = QueryCache::default();
    let all = QueryKey::from_parts(["messages", "all"]);
    let calls = Arc::new(AtomicUsize::new(0));
    let options = cache.options();
    cache
        .fetch(&all, slow_counter(&calls, Duration::ZERO, vec![1u64, 2, 3]), &options)
        .await
        .unwrap();
    cache.invalidate(&all);

    let fetching = {
        let cache = cache.clone();
        let all = all.clone();
        let fetcher = slow_counter(&calls, Duration::from_millis(100), vec![1u64, 2, 3, 4]);
        tokio::spawn(async move { cache.fetch(&all, fetcher, &cache.options()).await })
    };
    tokio::task::yield_now().await;
    assert!(cache.state::<Vec<u64>>(&all).is_fetching);

    let update = OptimisticUpdate::new(|ids: &Vec<u64>| ids.iter().copied().filter(|id| *id != 2).collect())
        .target(all.clone());
    cache
        .mutate_optimistic(
            update,
            async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                BackendResult::Ok(())
            },
            &[],
        )
        .await
        .unwrap();

    let fetched = fetching.await.unwrap().unwrap();
    assert_eq!(*fetched, vec![1, 3]);
    assert_eq!(cache.state::<Vec<u64>>(&all).data.as_deref(), Some(&vec![1, 3]));
}

#[tokio::test]
async fn test_disabled_subscription_resumes_when_ready() {
    let cache = QueryCache::default();
    let key = QueryKey::new("currentUserProfile");
    let ready = Arc::new(AtomicBool::new(false));
    let gate = ready.clone();
    let calls = Arc::new(AtomicUsize::new(0));

    let mut sub = cache.subscribe(
        &key,
        slow_counter(&calls, Duration::ZERO, 42u32),
        cache.options().enabled_when(move || gate.load(Ordering::SeqCst)),
    );
    let state = sub.wait_for(|s| s.is_disabled).await;
    assert!(!state.is_loading());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    ready.store(true, Ordering::SeqCst);
    assert_eq!(cache.resume_disabled(), 1);

    let state = sub.wait_for(|s| s.data.is_some()).await;
    assert_eq!(state.data.as_deref(), Some(&42));
    assert!(!state.is_disabled);
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_during_fetch_forces_a_fresh_call() {
    let cache = QueryCache::default();
    let key = QueryKey::new("currentUserProfile");
    let server = Arc::new(AtomicU64::new(10));
    let calls = Arc::new(AtomicUsize::new(0));

    let first = {
        let cache = cache.clone();
        let key = key.clone();
        let fetcher = reading(&server, &calls, Duration::from_millis(100));
        tokio::spawn(async move { cache.fetch(&key, fetcher, &cache.options()).await })
    };
    wait_for_calls(&calls, 1).await;
    assert!(cache.state::<u64>(&key).is_fetching);

    server.store(20, Ordering::SeqCst);
    cache.invalidate(&key);
    let second = cache
        .fetch(&key, reading(&server, &calls, Duration::from_millis(100)), &cache.options())
        .await
        .unwrap();

    assert_eq!(*second, 20);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(*first.await.unwrap().unwrap(), 20);
    let state = cache.state::<u64>(&key);
    assert_eq!(state.data.as_deref(), Some(&20));
    assert!(!state.is_invalidated);
}

#[tokio::test(start_paused = true)]
async fn test_observed_entry_reconciles_after_invalidate_during_fetch() {
    let cache = QueryCache::default();
    let key = QueryKey::new("currentUserProfile");
    let server = Arc::new(AtomicU64::new(10));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut sub = cache.subscribe(
        &key,
        reading(&server, &calls, Duration::from_millis(100)),
        cache.options(),
    );
    wait_for_calls(&calls, 1).await;
    assert!(sub.state().is_fetching);

    server.store(20, Ordering::SeqCst);
    cache.invalidate(&key);

    let state = tokio::time::timeout(
        Duration::from_secs(60),
        sub.wait_for(|s| s.data.as_deref() == Some(&20) && !s.is_fetching),
    )
    .await
    .expect("observed entry never refetched");
    assert!(!state.is_invalidated);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_clear_during_fetch_hands_waiters_the_fresh_value() {
    let cache = QueryCache::default();
    let key = QueryKey::new("leaderboard");
    let server = Arc::new(AtomicU64::new(1));
    let calls = Arc::new(AtomicUsize::new(0));

    let waiting = {
        let cache = cache.clone();
        let key = key.clone();
        let fetcher = reading(&server, &calls, Duration::from_millis(100));
        tokio::spawn(async move { cache.fetch(&key, fetcher, &cache.options()).await })
    };
    wait_for_calls(&calls, 1).await;

    server.store(2, Ordering::SeqCst);
    cache.clear();

    assert_eq!(*waiting.await.unwrap().unwrap(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_later_subscriber_can_shorten_polling() {
    let cache = QueryCache::default();
    let key = QueryKey::from_parts(["messages", "visible"]);
    let calls = Arc::new(AtomicUsize::new(0));

    let mut quiet = cache.subscribe(&key, slow_counter(&calls, Duration::ZERO, 0u8), cache.options());
    quiet.wait_for(|s| s.is_fetched).await;
    let _polling = cache.subscribe(
        &key,
        slow_counter(&calls, Duration::ZERO, 0u8),
        cache.options().with_poll_interval(Duration::from_secs(5)),
    );

    tokio::time::sleep(Duration::from_millis(11_000)).await;

    assert!(calls.load(Ordering::SeqCst) >= 3);
}
