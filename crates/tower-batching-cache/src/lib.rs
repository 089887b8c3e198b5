//! Settled-result cache for tower-batching.
//!
//! Loaders whose resolver is cacheable keep successful outcomes here, keyed
//! by request key, so a repeated identical request is answered without
//! dispatching a batch.
//!
//! # Features
//!
//! - **Multiple Eviction Policies**: LRU, LFU, and FIFO eviction strategies
//! - **TTL Support**: Optional time-to-live; expired entries read as misses
//!
//! # Examples
//!
//! ```
//! use tower_batching_cache::{CacheLookup, CachePolicy, CacheStore, EvictionPolicy};
//! use std::time::Duration;
//!
//! let policy = CachePolicy::builder()
//!     .capacity(2)
//!     .ttl(Duration::from_secs(60))
//!     .eviction_policy(EvictionPolicy::Lfu)
//!     .build();
//!
//! let mut store: CacheStore<u64, String> = CacheStore::new(&policy);
//! store.insert(1, "alice".to_string());
//! assert_eq!(store.get(&1), CacheLookup::Hit("alice".to_string()));
//! ```

mod eviction;
mod policy;
mod store;

pub use eviction::EvictionPolicy;
pub use policy::{CachePolicy, CachePolicyBuilder, DEFAULT_CAPACITY, DEFAULT_TTL};
pub use store::{CacheLookup, CacheStore};
