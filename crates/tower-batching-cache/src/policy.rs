//! Configuration for settled-result caching.

use crate::eviction::EvictionPolicy;
use std::time::Duration;

/// Default maximum number of cached results per loader.
pub const DEFAULT_CAPACITY: usize = 65_536;

/// Default time-to-live of a cached result.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// How settled results are retained: capacity, expiry and eviction order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    capacity: usize,
    ttl: Option<Duration>,
    eviction: EvictionPolicy,
}

impl CachePolicy {
    /// Creates a new policy builder.
    pub fn builder() -> CachePolicyBuilder {
        CachePolicyBuilder::new()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Time-to-live of an entry, or `None` if entries never expire.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Which entry is evicted when the cache is full.
    pub fn eviction(&self) -> EvictionPolicy {
        self.eviction
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicyBuilder::new().build()
    }
}

/// Builder for [`CachePolicy`].
#[derive(Debug, Clone)]
pub struct CachePolicyBuilder {
    capacity: usize,
    ttl: Option<Duration>,
    eviction: EvictionPolicy,
}

impl CachePolicyBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            ttl: Some(DEFAULT_TTL),
            eviction: EvictionPolicy::default(),
        }
    }

    /// Sets the maximum number of entries.
    ///
    /// Default: 65536. A capacity of zero is treated as one.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the time-to-live for cached results.
    ///
    /// Default: 60 minutes
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Keeps results until they are evicted by capacity or invalidated.
    pub fn no_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }

    /// Sets the eviction policy.
    ///
    /// Default: [`EvictionPolicy::Lru`]
    pub fn eviction_policy(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }

    /// Builds the policy.
    pub fn build(self) -> CachePolicy {
        CachePolicy {
            capacity: self.capacity.max(1),
            ttl: self.ttl,
            eviction: self.eviction,
        }
    }
}

impl Default for CachePolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
