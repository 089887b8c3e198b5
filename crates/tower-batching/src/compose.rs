//! Composing issued requests.
//!
//! Issuing a request is an ordinary future, so most composition is plain
//! `async` code: `futures::join!` or the helpers below run requests side by
//! side (they register in the same window and are batched together), while
//! `.await`ing one before issuing the next sequences them.
//!
//! # Example
//!
//! ```
//! use tower_batching::{compose, resolver_fn, BatchError, Engine, Request};
//!
//! struct Double(u32);
//!
//! impl Request for Double {
//!     type Key = u32;
//!     type Value = u32;
//!     type Error = String;
//!
//!     fn key(&self) -> u32 {
//!         self.0
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let engine = Engine::new();
//! let doubles = engine.loader(resolver_fn("doubles", |batch: Vec<Double>| async move {
//!     Ok(batch.into_iter().map(|Double(n)| Ok(n * 2)).collect())
//! }));
//!
//! // 1 -> 2 -> 4, the second request depends on the first.
//! let quad = compose::and_then(doubles.issue(Double(1)), |n| doubles.issue(Double(n))).await;
//! assert_eq!(quad, Ok(4));
//!
//! // Three requests, one batch.
//! let all: Result<Vec<u32>, BatchError<String>> =
//!     compose::for_each(1..=3, |n| doubles.issue(Double(n))).await;
//! assert_eq!(all, Ok(vec![2, 4, 6]));
//! # }
//! ```

use futures::future::try_join_all;
use std::future::Future;

/// Runs `first`, then feeds its value to `step`.
///
/// If `first` fails, `step` is never called and the failure is returned
/// (converted into the step's error type).
pub async fn and_then<A, B, E1, E2, First, F, Fut>(first: First, step: F) -> Result<B, E2>
where
    First: Future<Output = Result<A, E1>>,
    F: FnOnce(A) -> Fut,
    Fut: Future<Output = Result<B, E2>>,
    E2: From<E1>,
{
    let value = first.await?;
    step(value).await
}

/// Runs `f` for every item concurrently and collects the values in input
/// order.
///
/// Requests issued by `f` share a window, so requests of the same kind are
/// resolved in one batch. The first failure is returned; the remaining
/// futures are dropped.
pub async fn for_each<I, F, Fut, T, E>(items: I, f: F) -> Result<Vec<T>, E>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    try_join_all(items.into_iter().map(f)).await
}

/// Like [`for_each`], discarding the values.
pub async fn for_each_discard<I, F, Fut, T, E>(items: I, f: F) -> Result<(), E>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    for_each(items, f).await.map(|_| ())
}
