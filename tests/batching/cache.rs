//! Settled-result caching.

use super::{GetUserById, UserDirectory, user};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tower_batching::{BatchEvent, CachePolicy, Engine, EvictionPolicy, ResolverExt};

#[tokio::test]
async fn test_cached_result_skips_the_resolver() {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);

    let directory = UserDirectory::new();
    let engine = Engine::builder()
        .on_cache_hit(move || {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    let users = engine.loader(directory.resolver().cached());

    assert_eq!(users.issue(GetUserById(1)).await, Ok(user(1)));
    assert_eq!(users.issue(GetUserById(1)).await, Ok(user(1)));

    assert_eq!(directory.calls(), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(users.cached_len(), 1);
}

#[tokio::test]
async fn test_uncached_loader_resolves_every_window() {
    let directory = UserDirectory::new();
    let engine = Engine::new();
    let users = engine.loader(directory.resolver());

    users.issue(GetUserById(1)).await.unwrap();
    users.issue(GetUserById(1)).await.unwrap();

    assert_eq!(directory.calls(), 2);
    assert!(!users.is_cached());
}

#[tokio::test(start_paused = true)]
async fn test_expired_entry_is_resolved_again() {
    let directory = UserDirectory::new();
    let engine = Engine::builder()
        .cache_policy(CachePolicy::builder().ttl(Duration::from_millis(100)).build())
        .build();
    let users = engine.loader(directory.resolver().cached());

    users.issue(GetUserById(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    users.issue(GetUserById(1)).await.unwrap();
    assert_eq!(directory.calls(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    users.issue(GetUserById(1)).await.unwrap();
    assert_eq!(directory.calls(), 2);
    assert_eq!(directory.batches(), vec![vec![1], vec![1]]);
}

#[tokio::test]
async fn test_invalidate_forces_a_new_resolution() {
    let directory = UserDirectory::new();
    let engine = Engine::new();
    let users = engine.loader(directory.resolver().cached());

    users.issue(GetUserById(1)).await.unwrap();
    assert!(users.invalidate(&1));
    assert!(!users.invalidate(&1));
    users.issue(GetUserById(1)).await.unwrap();
    assert_eq!(directory.calls(), 2);

    users.clear_cache();
    assert_eq!(users.cached_len(), 0);
}

#[tokio::test]
async fn test_capacity_evicts_and_reports() {
    let evictions = Arc::new(AtomicUsize::new(0));
    let e = Arc::clone(&evictions);

    let directory = UserDirectory::new();
    let engine = Engine::builder()
        .on_event(move |event: &BatchEvent| {
            if matches!(event, BatchEvent::CacheEviction { .. }) {
                e.fetch_add(1, Ordering::SeqCst);
            }
        })
        .build();
    let users = engine
        .loader_builder(directory.resolver().cached())
        .cache_policy(
            CachePolicy::builder()
                .capacity(2)
                .eviction_policy(EvictionPolicy::Fifo)
                .build(),
        )
        .build();

    users.issue_all([1, 2, 3].map(GetUserById)).await;

    assert_eq!(users.cached_len(), 2);
    assert_eq!(evictions.load(Ordering::SeqCst), 1);

    // FIFO dropped the first settled key.
    users.issue(GetUserById(1)).await.unwrap();
    assert_eq!(directory.calls(), 2);
}

#[tokio::test]
async fn test_loaders_keep_separate_caches() {
    let directory = UserDirectory::new();
    let engine = Engine::new();
    let first = engine.loader(directory.resolver().cached());
    let second = engine.loader(directory.resolver().cached());

    first.issue(GetUserById(1)).await.unwrap();
    second.issue(GetUserById(1)).await.unwrap();

    assert_eq!(directory.calls(), 2);
    assert_ne!(first.kind(), second.kind());
}
