//! Loaders: the deduplicating front-end of one request kind.
//!
//! A [`Loader`] pairs a resolver with the engine's coordination window. Every
//! request issued through it is first checked against the settled-result
//! cache (when the resolver is cacheable), then against the entries already
//! in flight, and only then registered as a new pending entry for the next
//! batch.

use crate::error::BatchError;
use crate::events::BatchEvent;
use crate::pending::{PendingEntry, PendingHandle};
use crate::request::{Outcome, Request};
use crate::resolver::Resolver;
use crate::window::{Coordinator, Dispatch, KindId, SealedBatch};
use futures::future::{join_all, BoxFuture};
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower_batching_cache::{CachePolicy, CacheStore};
use tower_batching_core::CoordinationError;
use tower_service::Service;

#[cfg(feature = "metrics")]
use metrics::{counter, histogram};

#[cfg(feature = "tracing")]
use tracing::{debug, error, warn};

/// What [`Loader::lookup_or_register`] found for a request.
pub enum Lookup<R: Request> {
    /// A live cached value; no I/O happens.
    Cached(R::Value),
    /// A pending entry the caller now waits on.
    Pending(PendingHandle<R>),
}

impl<R: Request> Lookup<R> {
    /// Waits for the outcome.
    pub async fn outcome(self) -> Outcome<R> {
        match self {
            Lookup::Cached(value) => Ok(value),
            Lookup::Pending(handle) => handle.outcome().await,
        }
    }

    /// Returns true if the value came from the cache.
    pub fn is_cached(&self) -> bool {
        matches!(self, Lookup::Cached(_))
    }
}

impl<R: Request> fmt::Debug for Lookup<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Cached(_) => f.write_str("Lookup::Cached"),
            Lookup::Pending(handle) => f.debug_tuple("Lookup::Pending").field(handle).finish(),
        }
    }
}

type Store<R> = CacheStore<<R as Request>::Key, <R as Request>::Value>;

struct LoaderState<R: Request> {
    /// Every entry not yet settled, open or dispatched.
    in_flight: HashMap<R::Key, Arc<PendingEntry<R>>>,
    /// Entries of the current window, in registration order.
    open: Vec<Arc<PendingEntry<R>>>,
    cache: Option<Store<R>>,
}

impl<R: Request> LoaderState<R> {
    /// Removes `entry` from the in-flight table unless the key has since been
    /// taken by a newer entry.
    fn release(&mut self, entry: &Arc<PendingEntry<R>>) {
        let current = self
            .in_flight
            .get(entry.key())
            .is_some_and(|e| Arc::ptr_eq(e, entry));
        if current {
            self.in_flight.remove(entry.key());
        }
    }
}

struct LoaderInner<Rv: Resolver> {
    kind: KindId,
    name: Arc<str>,
    resolver: Rv,
    state: Mutex<LoaderState<Rv::Request>>,
    coordinator: Arc<Coordinator>,
}

impl<Rv: Resolver> LoaderInner<Rv> {
    fn emit(&self, event: BatchEvent) {
        self.coordinator.config.event_listeners.emit(&event);
    }

    fn event_name(&self) -> String {
        self.name.to_string()
    }
}

/// The deduplicating front-end of one request kind.
///
/// Cloning a loader is cheap; clones share the in-flight table, the cache
/// and the engine's window.
///
/// # Example
///
/// ```
/// use tower_batching::{resolver_fn, Engine, Request};
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
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let engine = Engine::new();
/// let squares = engine.loader(resolver_fn("squares", |batch: Vec<Square>| async move {
///     Ok(batch.into_iter().map(|Square(n)| Ok(n * n)).collect())
/// }));
///
/// let (a, b) = futures::join!(squares.issue(Square(3)), squares.issue(Square(3)));
/// assert_eq!(a, Ok(9));
/// assert_eq!(b, Ok(9));
/// # }
/// ```
pub struct Loader<Rv: Resolver> {
    inner: Arc<LoaderInner<Rv>>,
}

impl<Rv: Resolver> Clone for Loader<Rv> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Rv: Resolver> fmt::Debug for Loader<Rv> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .field("in_flight", &self.in_flight_len())
            .field("cached", &self.cached_len())
            .finish()
    }
}

impl<Rv: Resolver> Loader<Rv> {
    fn new(
        coordinator: Arc<Coordinator>,
        resolver: Rv,
        name: Arc<str>,
        cache: Option<Store<Rv::Request>>,
    ) -> Self {
        let kind = coordinator.next_kind();
        Self {
            inner: Arc::new(LoaderInner {
                kind,
                name,
                resolver,
                state: Mutex::new(LoaderState {
                    in_flight: HashMap::new(),
                    open: Vec::new(),
                    cache,
                }),
                coordinator,
            }),
        }
    }

    /// The kind this loader resolves.
    pub fn kind(&self) -> KindId {
        self.inner.kind
    }

    /// The loader name used in events, logs and coordination errors.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns true if settled successes are cached.
    pub fn is_cached(&self) -> bool {
        self.inner.state.lock().cache.is_some()
    }

    /// Resolves a request from the cache, joins the entry already in flight
    /// for its key, or registers a new entry in the current window.
    ///
    /// The three checks happen under one lock, so at most one entry per key
    /// is ever in flight. An expired cache entry counts as a miss.
    pub fn lookup_or_register(&self, request: Rv::Request) -> Lookup<Rv::Request> {
        let inner = &self.inner;
        let key = request.key();
        let mut state = inner.state.lock();

        let cached = state
            .cache
            .as_mut()
            .and_then(|cache| cache.get(&key).into_hit());
        if let Some(value) = cached {
            drop(state);

            #[cfg(feature = "metrics")]
            counter!("batching_requests_total", "loader" => inner.event_name(), "role" => "cached")
                .increment(1);

            inner.emit(BatchEvent::CacheHit {
                name: inner.event_name(),
                timestamp: Instant::now(),
            });
            return Lookup::Cached(value);
        }

        let existing = state.in_flight.get(&key).cloned();
        if let Some(entry) = existing {
            let handle = PendingHandle::join(entry, Arc::clone(&inner.name));
            drop(state);

            #[cfg(feature = "tracing")]
            debug!(loader = %inner.name, key = ?key, "Joining in-flight request");

            #[cfg(feature = "metrics")]
            counter!("batching_requests_total", "loader" => inner.event_name(), "role" => "waiter")
                .increment(1);

            inner.emit(BatchEvent::RequestDeduplicated {
                name: inner.event_name(),
                timestamp: Instant::now(),
            });
            return Lookup::Pending(handle);
        }

        let entry = Arc::new(PendingEntry::new(request));
        state.in_flight.insert(key, Arc::clone(&entry));
        state.open.push(Arc::clone(&entry));
        let open_len = state.open.len();
        let handle = PendingHandle::join(entry, Arc::clone(&inner.name));
        drop(state);

        #[cfg(feature = "metrics")]
        counter!("batching_requests_total", "loader" => inner.event_name(), "role" => "leader")
            .increment(1);

        let dispatch: Arc<dyn Dispatch> = Arc::clone(inner) as Arc<dyn Dispatch>;
        inner.coordinator.register(dispatch, open_len);
        Lookup::Pending(handle)
    }

    /// Issues a request and waits for its outcome.
    ///
    /// Registration happens on the first poll, so requests issued by futures
    /// joined together land in the same window.
    pub async fn issue(&self, request: Rv::Request) -> Outcome<Rv::Request> {
        self.lookup_or_register(request).outcome().await
    }

    /// Issues many requests concurrently and returns their outcomes in input
    /// order.
    pub async fn issue_all<I>(&self, requests: I) -> Vec<Outcome<Rv::Request>>
    where
        I: IntoIterator<Item = Rv::Request>,
    {
        join_all(requests.into_iter().map(|request| self.issue(request))).await
    }

    /// Seals the engine's current window and waits for the batches it sealed.
    pub async fn flush(&self) {
        self.inner.coordinator.flush().await;
    }

    /// Drops the cached value for `key`. Returns true if one was present.
    pub fn invalidate(&self, key: &<Rv::Request as Request>::Key) -> bool {
        self.inner
            .state
            .lock()
            .cache
            .as_mut()
            .is_some_and(|cache| cache.invalidate(key))
    }

    /// Drops every cached value. In-flight entries are unaffected.
    pub fn clear_cache(&self) {
        if let Some(cache) = self.inner.state.lock().cache.as_mut() {
            cache.clear();
        }
    }

    /// Number of cached values, including expired ones not yet collected.
    pub fn cached_len(&self) -> usize {
        self.inner
            .state
            .lock()
            .cache
            .as_ref()
            .map_or(0, CacheStore::len)
    }

    /// Number of keys currently open or being resolved.
    pub fn in_flight_len(&self) -> usize {
        self.inner.state.lock().in_flight.len()
    }
}

impl<Rv: Resolver> Dispatch for LoaderInner<Rv> {
    fn kind(&self) -> KindId {
        self.kind
    }

    fn seal(self: Arc<Self>) -> Vec<SealedBatch> {
        let (entries, abandoned) = {
            let mut state = self.state.lock();
            let open = std::mem::take(&mut state.open);
            let (live, abandoned): (Vec<_>, Vec<_>) =
                open.into_iter().partition(|entry| entry.waiters() > 0);
            for entry in &abandoned {
                state.release(entry);
            }
            (live, abandoned.len())
        };

        if abandoned > 0 {
            #[cfg(feature = "tracing")]
            debug!(loader = %self.name, count = abandoned, "Dropping abandoned requests");

            self.emit(BatchEvent::RequestsAbandoned {
                name: self.event_name(),
                timestamp: Instant::now(),
                count: abandoned,
            });
        }

        // Concurrent registrations can overshoot the limit; no batch exceeds it.
        let limit = self
            .coordinator
            .config
            .max_batch_size
            .unwrap_or(usize::MAX)
            .max(1);

        let mut sealed = Vec::new();
        let mut entries = entries;
        while !entries.is_empty() {
            let rest = entries.split_off(entries.len().min(limit));
            let size = entries.len();
            let batch = Batch {
                loader: Arc::clone(&self),
                entries,
            };
            sealed.push(SealedBatch {
                size,
                run: batch.run(),
            });
            entries = rest;
        }
        sealed
    }
}

/// A sealed batch of one kind.
///
/// If the batch is dropped before it settles (its task panicked or was
/// cancelled, or no runtime was available) every remaining caller receives
/// [`CoordinationError::Abandoned`].
struct Batch<Rv: Resolver> {
    loader: Arc<LoaderInner<Rv>>,
    entries: Vec<Arc<PendingEntry<Rv::Request>>>,
}

impl<Rv: Resolver> Batch<Rv> {
    fn run(mut self) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let mut requests = Vec::with_capacity(self.entries.len());
            self.entries.retain(|entry| match entry.take_request() {
                Some(request) => {
                    requests.push(request);
                    true
                }
                None => false,
            });

            let loader = Arc::clone(&self.loader);
            let size = requests.len();

            #[cfg(feature = "tracing")]
            debug!(loader = %loader.name, size, "Dispatching batch");

            #[cfg(feature = "metrics")]
            {
                counter!("batching_batches_total", "loader" => loader.event_name()).increment(1);
                histogram!("batching_batch_size", "loader" => loader.event_name()).record(size as f64);
            }

            loader.emit(BatchEvent::BatchDispatched {
                name: loader.event_name(),
                timestamp: Instant::now(),
                size,
            });

            let started = Instant::now();
            let result = loader.resolver.resolve(requests).await;
            let duration = started.elapsed();

            let outcomes: Vec<Outcome<Rv::Request>> = match result {
                Ok(values) if values.len() == size => values
                    .into_iter()
                    .map(|value| value.map_err(BatchError::Resolver))
                    .collect(),
                Ok(values) => {
                    let err = CoordinationError::LengthMismatch {
                        resolver: loader.name.to_string(),
                        expected: size,
                        actual: values.len(),
                    };

                    #[cfg(feature = "tracing")]
                    error!(loader = %loader.name, error = %err, "Resolver broke the batch contract");

                    loader.emit(BatchEvent::CoordinationFailure {
                        name: loader.event_name(),
                        timestamp: Instant::now(),
                        error: err.clone(),
                    });
                    (0..size)
                        .map(|_| Err(BatchError::Coordination(err.clone())))
                        .collect()
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    debug!(loader = %loader.name, size, "Resolver failed the whole batch");

                    (0..size).map(|_| Err(BatchError::Resolver(e.clone()))).collect()
                }
            };

            self.settle(outcomes, duration);
        })
    }

    /// Publishes one outcome per entry, caching the successes.
    fn settle(&mut self, outcomes: Vec<Outcome<Rv::Request>>, duration: std::time::Duration) {
        let entries = std::mem::take(&mut self.entries);
        let size = entries.len();
        let mut failures = 0;
        let mut evicted = 0;

        {
            let mut state = self.loader.state.lock();
            for (entry, outcome) in entries.iter().zip(outcomes) {
                state.release(entry);
                match &outcome {
                    Ok(value) => {
                        if let Some(cache) = state.cache.as_mut() {
                            if cache.insert(entry.key().clone(), value.clone()).is_some() {
                                evicted += 1;
                            }
                        }
                    }
                    Err(_) => failures += 1,
                }
                entry.fulfil(outcome);
            }
        }

        let loader = &self.loader;
        for _ in 0..evicted {
            loader.emit(BatchEvent::CacheEviction {
                name: loader.event_name(),
                timestamp: Instant::now(),
            });
        }

        #[cfg(feature = "tracing")]
        debug!(loader = %loader.name, size, failures, ?duration, "Batch settled");

        loader.emit(BatchEvent::BatchCompleted {
            name: loader.event_name(),
            timestamp: Instant::now(),
            size,
            failures,
            duration,
        });
    }
}

impl<Rv: Resolver> Drop for Batch<Rv> {
    fn drop(&mut self) {
        if self.entries.is_empty() {
            return;
        }

        let err = CoordinationError::Abandoned {
            resolver: self.loader.name.to_string(),
        };

        {
            let mut state = self.loader.state.lock();
            for entry in &self.entries {
                state.release(entry);
                entry.fulfil(Err(BatchError::Coordination(err.clone())));
            }
        }

        #[cfg(feature = "tracing")]
        warn!(
            loader = %self.loader.name,
            size = self.entries.len(),
            "Batch dropped before settling"
        );

        self.loader.emit(BatchEvent::CoordinationFailure {
            name: self.loader.event_name(),
            timestamp: Instant::now(),
            error: err,
        });
    }
}

impl<Rv: Resolver> Service<Rv::Request> for Loader<Rv> {
    type Response = <Rv::Request as Request>::Value;
    type Error = BatchError<<Rv::Request as Request>::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Rv::Request) -> Self::Future {
        let loader = self.clone();
        Box::pin(async move { loader.issue(request).await })
    }
}

/// Builder for a [`Loader`]. Obtained from
/// [`Engine::loader_builder`](crate::Engine::loader_builder).
pub struct LoaderBuilder<Rv: Resolver> {
    coordinator: Arc<Coordinator>,
    resolver: Rv,
    name: Option<String>,
    cache: Option<CachePolicy>,
    no_cache: bool,
}

impl<Rv: Resolver> LoaderBuilder<Rv> {
    pub(crate) fn new(coordinator: Arc<Coordinator>, resolver: Rv) -> Self {
        Self {
            coordinator,
            resolver,
            name: None,
            cache: None,
            no_cache: false,
        }
    }

    /// Sets the loader name.
    ///
    /// Default: the resolver's name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Overrides the engine's cache policy for this loader.
    ///
    /// Only takes effect when the resolver is cacheable.
    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache = Some(policy);
        self
    }

    /// Never caches, even if the resolver is cacheable.
    pub fn no_cache(mut self) -> Self {
        self.no_cache = true;
        self
    }

    /// Builds the loader.
    pub fn build(self) -> Loader<Rv> {
        let name: Arc<str> = match self.name {
            Some(name) => Arc::from(name),
            None => Arc::from(self.resolver.name()),
        };

        let cache = if self.resolver.cacheable() && !self.no_cache {
            let policy = self
                .cache
                .as_ref()
                .unwrap_or(&self.coordinator.config.cache);
            Some(CacheStore::new(policy))
        } else {
            None
        };

        #[cfg(feature = "tracing")]
        debug!(
            engine = %self.coordinator.config.name,
            loader = %name,
            cached = cache.is_some(),
            "Loader created"
        );

        Loader::new(self.coordinator, self.resolver, name, cache)
    }
}
