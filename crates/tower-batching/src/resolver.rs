//! Resolvers: how a batch of same-kind requests is turned into outcomes.
//!
//! A resolver receives the distinct requests of one sealed batch, in a stable
//! order, and answers with one outcome per request in the same order. It may
//! instead fail the whole batch (for example when the downstream system is
//! unreachable), in which case every request of the batch receives that
//! failure.
//!
//! Besides implementing [`Resolver`] directly, resolvers can be built from:
//!
//! - a batched closure: [`resolver_fn`]
//! - a one-request-at-a-time closure: [`per_request_fn`]
//! - a Tower service taking a `Vec` of requests: [`ServiceResolver`]

use crate::request::Request;
use futures::future::{join_all, BoxFuture};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tower::ServiceExt;
use tower_service::Service;

/// Per-request results for a batch, or one failure for all of it.
pub type BatchOutcome<R> =
    Result<Vec<Result<<R as Request>::Value, <R as Request>::Error>>, <R as Request>::Error>;

/// Performs the I/O for batches of one request kind.
///
/// The engine treats resolvers as idempotent black boxes: it never retries
/// and never mutates them.
pub trait Resolver: Send + Sync + 'static {
    /// The request kind this resolver handles.
    type Request: Request;

    /// Resolves a non-empty batch of distinct requests.
    ///
    /// On success the returned vector must have exactly one entry per request,
    /// positionally matched.
    fn resolve(&self, requests: Vec<Self::Request>) -> BoxFuture<'static, BatchOutcome<Self::Request>>;

    /// Name used in events, logs and coordination errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Whether settled successes may be kept in the loader's cache.
    fn cacheable(&self) -> bool {
        false
    }
}

impl<T: Resolver + ?Sized> Resolver for Arc<T> {
    type Request = T::Request;

    fn resolve(&self, requests: Vec<Self::Request>) -> BoxFuture<'static, BatchOutcome<Self::Request>> {
        (**self).resolve(requests)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn cacheable(&self) -> bool {
        (**self).cacheable()
    }
}

/// Extension methods for resolvers.
pub trait ResolverExt: Resolver + Sized {
    /// Marks this resolver's results as cacheable.
    fn cached(self) -> Cached<Self> {
        Cached { inner: self }
    }
}

impl<T: Resolver> ResolverExt for T {}

/// A resolver whose results are cacheable. See [`ResolverExt::cached`].
#[derive(Debug, Clone)]
pub struct Cached<T> {
    inner: T,
}

impl<T: Resolver> Resolver for Cached<T> {
    type Request = T::Request;

    fn resolve(&self, requests: Vec<Self::Request>) -> BoxFuture<'static, BatchOutcome<Self::Request>> {
        self.inner.resolve(requests)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn cacheable(&self) -> bool {
        true
    }
}

/// A resolver built from a batched closure. See [`resolver_fn`].
pub struct ResolverFn<R, F> {
    name: String,
    f: F,
    _req: PhantomData<fn(R)>,
}

/// Creates a resolver from a closure that resolves a whole batch.
///
/// # Example
///
/// ```
/// use tower_batching::{resolver_fn, Request};
///
/// struct Square(u64);
///
/// impl Request for Square {
///     type Key = u64;
///     type Value = u64;
///     type Error = String;
///
///     fn key(&self) -> u64 {
///         self.0
///     }
/// }
///
/// let resolver = resolver_fn("squares", |batch: Vec<Square>| async move {
///     Ok(batch.into_iter().map(|Square(n)| Ok(n * n)).collect())
/// });
/// ```
pub fn resolver_fn<R, F, Fut>(name: impl Into<String>, f: F) -> ResolverFn<R, F>
where
    R: Request,
    F: Fn(Vec<R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BatchOutcome<R>> + Send + 'static,
{
    ResolverFn {
        name: name.into(),
        f,
        _req: PhantomData,
    }
}

impl<R, F, Fut> Resolver for ResolverFn<R, F>
where
    R: Request,
    F: Fn(Vec<R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BatchOutcome<R>> + Send + 'static,
{
    type Request = R;

    fn resolve(&self, requests: Vec<R>) -> BoxFuture<'static, BatchOutcome<R>> {
        Box::pin((self.f)(requests))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A resolver built from a single-request closure. See [`per_request_fn`].
pub struct PerRequestFn<R, F> {
    name: String,
    f: F,
    _req: PhantomData<fn(R)>,
}

/// Creates a resolver from a closure that handles one request at a time.
///
/// Requests of a batch are still deduplicated and dispatched together; the
/// closure is called once per request and the calls run concurrently. A
/// failure of one request does not affect the others.
pub fn per_request_fn<R, F, Fut>(name: impl Into<String>, f: F) -> PerRequestFn<R, F>
where
    R: Request,
    F: Fn(R) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R::Value, R::Error>> + Send + 'static,
{
    PerRequestFn {
        name: name.into(),
        f,
        _req: PhantomData,
    }
}

impl<R, F, Fut> Resolver for PerRequestFn<R, F>
where
    R: Request,
    F: Fn(R) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R::Value, R::Error>> + Send + 'static,
{
    type Request = R;

    fn resolve(&self, requests: Vec<R>) -> BoxFuture<'static, BatchOutcome<R>> {
        let calls: Vec<Fut> = requests.into_iter().map(|r| (self.f)(r)).collect();
        Box::pin(async move { Ok(join_all(calls).await) })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Adapts a Tower service that takes a `Vec` of requests into a resolver.
///
/// The service error fails the whole batch; per-request failures travel in
/// the response vector. The service is cloned for every batch.
pub struct ServiceResolver<S, R> {
    name: String,
    service: S,
    _req: PhantomData<fn(R)>,
}

impl<S, R> ServiceResolver<S, R> {
    /// Wraps a service.
    pub fn new(name: impl Into<String>, service: S) -> Self {
        Self {
            name: name.into(),
            service,
            _req: PhantomData,
        }
    }
}

impl<S: Clone, R> Clone for ServiceResolver<S, R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            service: self.service.clone(),
            _req: PhantomData,
        }
    }
}

impl<S, R> Resolver for ServiceResolver<S, R>
where
    R: Request,
    S: Service<Vec<R>, Response = Vec<Result<R::Value, R::Error>>, Error = R::Error>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    type Request = R;

    fn resolve(&self, requests: Vec<R>) -> BoxFuture<'static, BatchOutcome<R>> {
        let service = self.service.clone();
        Box::pin(service.oneshot(requests))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
