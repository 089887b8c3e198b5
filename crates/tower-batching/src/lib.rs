//! Request deduplication and batching for Tower services.
//!
//! This crate lets independent pieces of code issue small requests for
//! external data while the engine transparently merges them: identical
//! requests are deduplicated, requests of the same kind issued close together
//! are grouped into one batch, and each batch is handed to a user-supplied
//! [`Resolver`] in a single call. Successful results can optionally be cached
//! so that repeated requests cost no I/O at all.
//!
//! # How It Works
//!
//! 1. Each request kind gets a [`Loader`] wrapping its resolver
//! 2. Issuing a request checks the cache, then joins an identical request
//!    already in flight, and otherwise opens a new pending entry
//! 3. Pending entries collect in the engine's coordination window until it
//!    seals (after a short quiet period, a maximum delay, a size limit, or an
//!    explicit [`Engine::flush`])
//! 4. Each kind's sealed entries are resolved in one call; outcomes are
//!    matched back to the requests by position and delivered to every waiter
//!
//! # Example
//!
//! ```rust
//! use tower_batching::{resolver_fn, Engine, Request};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! struct GetUserById(u64);
//!
//! impl Request for GetUserById {
//!     type Key = u64;
//!     type Value = User;
//!     type Error = String;
//!
//!     fn key(&self) -> u64 {
//!         self.0
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let engine = Engine::builder().name("app").build();
//! let users = engine.loader(resolver_fn("users", |batch: Vec<GetUserById>| async move {
//!     // One round trip for the whole batch.
//!     Ok(batch
//!         .into_iter()
//!         .map(|GetUserById(id)| Ok(User { id, name: format!("user-{}", id) }))
//!         .collect())
//! }));
//!
//! let (a, b, c) = futures::join!(
//!     users.issue(GetUserById(1)),
//!     users.issue(GetUserById(2)),
//!     users.issue(GetUserById(1)),
//! );
//! assert_eq!(a, c);
//! assert_eq!(b.unwrap().name, "user-2");
//! # }
//! ```
//!
//! # Failures
//!
//! A resolver reports one outcome per request, so a failure for one key
//! never affects the others. It may instead fail the whole batch, and every
//! caller of that batch receives the failure. A resolver that answers with
//! the wrong number of outcomes breaks the batch contract; its callers get
//! [`BatchError::Coordination`] and the engine logs the violation.
//!
//! # Caching
//!
//! Marking a resolver with [`ResolverExt::cached`] keeps settled successes
//! per loader, bounded by the engine's [`CachePolicy`] (65536 entries, 60
//! minute TTL, LRU eviction by default). Failures are never cached.
//!
//! # Feature Flags
//!
//! - `tracing` (default): structured logs for windows, batches and contract
//!   violations
//! - `metrics`: request, batch and window counters plus a batch-size
//!   histogram

pub mod compose;
mod config;
mod engine;
mod error;
mod events;
mod loader;
mod pending;
mod registry;
mod request;
mod resolver;
mod window;

pub use config::{EngineConfig, EngineConfigBuilder, WindowTrigger, DEFAULT_MAX_DELAY, DEFAULT_QUIET};
pub use engine::Engine;
pub use error::{BatchError, RegistryError};
pub use events::BatchEvent;
pub use loader::{Loader, LoaderBuilder, Lookup};
pub use pending::PendingHandle;
pub use registry::Registry;
pub use request::{Outcome, Request};
pub use resolver::{
    per_request_fn, resolver_fn, BatchOutcome, Cached, PerRequestFn, Resolver, ResolverExt,
    ResolverFn, ServiceResolver,
};
pub use window::KindId;

pub use tower_batching_cache::{CachePolicy, CachePolicyBuilder, EvictionPolicy};
pub use tower_batching_core::{BatchingEvent, CoordinationError};
