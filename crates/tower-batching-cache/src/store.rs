//! Settled-result storage.

use crate::eviction::{EvictionPolicy, EvictionStore, FifoStore, LfuStore, LruStore};
use crate::policy::CachePolicy;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

/// A settled value with TTL tracking.
#[derive(Clone, Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        match ttl {
            Some(ttl) => self.inserted_at.elapsed() >= ttl,
            None => false,
        }
    }
}

/// Result of looking a key up in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup<V> {
    /// A live entry was found.
    Hit(V),
    /// No entry exists for the key.
    Miss,
    /// An entry existed but its TTL had passed; it has been removed.
    Expired,
}

impl<V> CacheLookup<V> {
    /// Converts the lookup into an `Option`, treating expiry as a miss.
    pub fn into_hit(self) -> Option<V> {
        match self {
            CacheLookup::Hit(v) => Some(v),
            CacheLookup::Miss | CacheLookup::Expired => None,
        }
    }
}

/// Settled-result store with a configurable eviction policy and TTL.
///
/// The store is not synchronized; owners wrap it in their own lock so that
/// cache lookups can be made atomic with other bookkeeping.
pub struct CacheStore<K, V> {
    store: Box<dyn EvictionStore<K, CacheEntry<V>>>,
    ttl: Option<Duration>,
    capacity: usize,
    policy: EvictionPolicy,
}

impl<K, V> CacheStore<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Creates a store from a policy.
    pub fn new(policy: &CachePolicy) -> Self {
        Self::with_parts(policy.capacity(), policy.ttl(), policy.eviction())
    }

    /// Creates a store with the given capacity, TTL and eviction policy.
    pub fn with_parts(capacity: usize, ttl: Option<Duration>, policy: EvictionPolicy) -> Self {
        let store: Box<dyn EvictionStore<K, CacheEntry<V>>> = match policy {
            EvictionPolicy::Lru => Box::new(LruStore::new(capacity)),
            EvictionPolicy::Lfu => Box::new(LfuStore::new(capacity)),
            EvictionPolicy::Fifo => Box::new(FifoStore::new(capacity)),
        };

        Self {
            store,
            ttl,
            capacity: capacity.max(1),
            policy,
        }
    }

    /// Looks up a key, dropping the entry if it has expired.
    pub fn get(&mut self, key: &K) -> CacheLookup<V> {
        let expired = match self.store.get(key) {
            None => return CacheLookup::Miss,
            Some(entry) if !entry.is_expired(self.ttl) => {
                return CacheLookup::Hit(entry.value.clone());
            }
            Some(_) => true,
        };

        if expired {
            self.store.remove(key);
        }
        CacheLookup::Expired
    }

    /// Inserts a settled value.
    ///
    /// Returns the key evicted to make room, if any. Replacing the value of a
    /// key already present is not an eviction.
    pub fn insert(&mut self, key: K, value: V) -> Option<K> {
        let replacing = self.store.contains(&key);
        let displaced = self.store.insert(key, CacheEntry::new(value));
        if replacing {
            None
        } else {
            displaced.map(|(k, _)| k)
        }
    }

    /// Removes a key. Returns true if it was present.
    pub fn invalidate(&mut self, key: &K) -> bool {
        self.store.remove(key).is_some()
    }

    /// Returns the current number of entries, including not yet collected
    /// expired ones.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.store.len() == 0
    }

    /// Clears all entries.
    pub fn clear(&mut self) {
        self.store.clear();
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Eviction policy in use.
    pub fn eviction_policy(&self) -> EvictionPolicy {
        self.policy
    }
}
