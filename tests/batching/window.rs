//! Window sealing, flushing and early abandonment.

use super::{GetUserById, UserDirectory, user};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tower_batching::{BatchError, BatchEvent, CoordinationError, Engine, Lookup, WindowTrigger};

#[tokio::test]
async fn test_flushing_an_empty_window_is_a_noop() {
    let directory = UserDirectory::new();
    let engine = Engine::builder().manual_flush().build();
    let users = engine.loader(directory.resolver());

    engine.flush().await;
    engine.flush().await;

    assert_eq!(engine.open_kinds(), 0);
    assert_eq!(users.in_flight_len(), 0);
    assert_eq!(directory.calls(), 0);
}

#[tokio::test]
async fn test_manual_window_waits_for_flush() {
    let directory = UserDirectory::new();
    let engine = Engine::builder().manual_flush().build();
    assert_eq!(engine.trigger(), WindowTrigger::Manual);
    let users = engine.loader(directory.resolver());

    let first = users.lookup_or_register(GetUserById(1));
    let second = users.lookup_or_register(GetUserById(2));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(engine.open_kinds(), 1);
    assert_eq!(directory.calls(), 0);

    engine.flush().await;
    assert_eq!(engine.open_kinds(), 0);
    assert_eq!(directory.batches(), vec![vec![1, 2]]);
    assert_eq!(first.outcome().await, Ok(user(1)));
    assert_eq!(second.outcome().await, Ok(user(2)));

    // Nothing left to seal.
    engine.flush().await;
    assert_eq!(directory.calls(), 1);
}

#[tokio::test]
async fn test_flush_and_issue_joined() {
    let directory = UserDirectory::new();
    let engine = Engine::builder().manual_flush().build();
    let users = engine.loader(directory.resolver());

    let (a, b, ()) = futures::join!(
        users.issue(GetUserById(1)),
        users.issue(GetUserById(1)),
        engine.flush(),
    );

    assert_eq!(a, Ok(user(1)));
    assert_eq!(b, Ok(user(1)));
    assert_eq!(directory.calls(), 1);
}

#[tokio::test]
async fn test_requests_after_sealing_start_a_new_window() {
    let directory = UserDirectory::new();
    let engine = Engine::builder().manual_flush().build();
    let users = engine.loader(directory.resolver());

    let first = users.lookup_or_register(GetUserById(1));
    engine.flush().await;
    let second = users.lookup_or_register(GetUserById(1));
    engine.flush().await;

    assert_eq!(first.outcome().await, Ok(user(1)));
    assert_eq!(second.outcome().await, Ok(user(1)));
    assert_eq!(directory.batches(), vec![vec![1], vec![1]]);
}

#[tokio::test]
async fn test_abandoned_requests_are_not_dispatched() {
    let abandoned = Arc::new(Mutex::new(Vec::new()));
    let a = Arc::clone(&abandoned);

    let directory = UserDirectory::new();
    let engine = Engine::builder()
        .manual_flush()
        .on_event(move |event: &BatchEvent| {
            if let BatchEvent::RequestsAbandoned { count, .. } = event {
                a.lock().push(*count);
            }
        })
        .build();
    let users = engine.loader(directory.resolver());

    let kept = users.lookup_or_register(GetUserById(1));
    drop(users.lookup_or_register(GetUserById(2)));
    drop(users.lookup_or_register(GetUserById(3)));

    engine.flush().await;

    assert_eq!(directory.batches(), vec![vec![1]]);
    assert_eq!(*abandoned.lock(), vec![2]);
    assert_eq!(kept.outcome().await, Ok(user(1)));
    assert_eq!(users.in_flight_len(), 0);
}

#[tokio::test]
async fn test_entry_survives_while_any_waiter_remains() {
    let directory = UserDirectory::new();
    let engine = Engine::builder().manual_flush().build();
    let users = engine.loader(directory.resolver());

    let first = users.lookup_or_register(GetUserById(4));
    let second = users.lookup_or_register(GetUserById(4));
    drop(first);

    engine.flush().await;
    assert_eq!(second.outcome().await, Ok(user(4)));
    assert_eq!(directory.calls(), 1);
}

#[tokio::test]
async fn test_cancelled_issue_withdraws_the_caller() {
    let directory = UserDirectory::new();
    let engine = Engine::builder().manual_flush().build();
    let users = engine.loader(directory.resolver());

    let timed_out =
        tokio::time::timeout(Duration::from_millis(10), users.issue(GetUserById(5))).await;
    assert!(timed_out.is_err());
    assert_eq!(users.in_flight_len(), 1);

    engine.flush().await;
    assert_eq!(directory.calls(), 0);
    assert_eq!(users.in_flight_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_quiet_period_seals_the_window() {
    let directory = UserDirectory::new();
    let engine = Engine::builder()
        .window(Duration::from_millis(5))
        .max_delay(Duration::from_millis(100))
        .build();
    let users = engine.loader(directory.resolver());

    let first = users.lookup_or_register(GetUserById(1));
    tokio::time::sleep(Duration::from_millis(3)).await;
    let second = users.lookup_or_register(GetUserById(2));
    tokio::time::sleep(Duration::from_millis(3)).await;
    assert_eq!(directory.calls(), 0);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(directory.batches(), vec![vec![1, 2]]);
    assert!(first.outcome().await.is_ok());
    assert!(second.outcome().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_max_delay_bounds_a_busy_window() {
    let directory = UserDirectory::new();
    let engine = Engine::builder()
        .window(Duration::from_millis(5))
        .max_delay(Duration::from_millis(10))
        .build();
    let users = engine.loader(directory.resolver());

    let mut handles: Vec<Lookup<GetUserById>> = Vec::new();
    for id in 0..8 {
        handles.push(users.lookup_or_register(GetUserById(id)));
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let batches = directory.batches();
    assert_eq!(batches.len(), 2);
    assert!(batches[0].len() >= 5, "first batch: {:?}", batches[0]);
    assert_eq!(batches.concat(), (0..8).collect::<Vec<u64>>());

    for handle in handles {
        assert!(handle.outcome().await.is_ok());
    }
}

fn current_thread() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

#[test]
fn test_engine_outlives_the_runtime_that_opened_its_window() {
    let directory = UserDirectory::new();
    let engine = Engine::new();
    let users = engine.loader(directory.resolver());

    let first = current_thread();
    first.block_on(async {
        drop(users.lookup_or_register(GetUserById(1)));
    });
    drop(first);

    let second = current_thread();
    let outcome = second.block_on(async {
        tokio::time::timeout(Duration::from_secs(2), users.issue(GetUserById(2))).await
    });

    assert_eq!(outcome.expect("window never sealed"), Ok(user(2)));
    assert_eq!(directory.batches(), vec![vec![2]]);
    assert_eq!(users.in_flight_len(), 0);
}

#[test]
fn test_flush_without_a_runtime_resolves_inline() {
    let directory = UserDirectory::new();
    let engine = Engine::new();
    let users = engine.loader(directory.resolver());

    let (outcome, ()) = futures::executor::block_on(async {
        futures::join!(users.issue(GetUserById(1)), engine.flush())
    });

    assert_eq!(outcome, Ok(user(1)));
    assert_eq!(directory.calls(), 1);
    assert_eq!(engine.open_kinds(), 0);
}

#[test]
fn test_size_sealed_batch_without_a_runtime_is_abandoned() {
    let directory = UserDirectory::new();
    let engine = Engine::builder().max_batch_size(1).build();
    let users = engine.loader(directory.resolver());

    let outcome = futures::executor::block_on(users.issue(GetUserById(1)));

    assert_eq!(
        outcome,
        Err(BatchError::Coordination(CoordinationError::Abandoned {
            resolver: "users".to_string(),
        }))
    );
    assert_eq!(directory.calls(), 0);
    assert_eq!(users.in_flight_len(), 0);
}
