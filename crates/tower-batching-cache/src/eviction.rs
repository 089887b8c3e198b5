//! Bounded maps that decide which settled result leaves first.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::num::NonZeroUsize;

/// Which settled result to drop when a full cache receives a new key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Drop the result read least recently.
    #[default]
    Lru,

    /// Drop the result read the fewest times; ties go to the oldest insert.
    Lfu,

    /// Drop the result inserted first, however often it is read.
    Fifo,
}

/// A bounded map implementing one [`EvictionPolicy`].
///
/// `insert` reports what left the map: the previous value when the key was
/// already present, otherwise the entry dropped to stay within capacity.
pub(crate) trait EvictionStore<K, V>: Send {
    fn get(&mut self, key: &K) -> Option<&V>;

    /// Membership test that does not count as a read.
    fn contains(&self, key: &K) -> bool;

    fn insert(&mut self, key: K, value: V) -> Option<(K, V)>;

    fn remove(&mut self, key: &K) -> Option<V>;

    fn len(&self) -> usize;

    fn clear(&mut self);
}

fn at_least_one(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}

pub(crate) struct LruStore<K, V>(lru::LruCache<K, V>);

impl<K: Hash + Eq, V> LruStore<K, V> {
    pub(crate) fn new(capacity: usize) -> Self {
        LruStore(lru::LruCache::new(at_least_one(capacity)))
    }
}

impl<K: Hash + Eq + Send, V: Send> EvictionStore<K, V> for LruStore<K, V> {
    fn get(&mut self, key: &K) -> Option<&V> {
        self.0.get(key)
    }

    fn contains(&self, key: &K) -> bool {
        self.0.contains(key)
    }

    fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        // `push` returns the replaced pair or the least recently used one.
        self.0.push(key, value)
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        self.0.pop(key)
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}

struct Counted<V> {
    value: V,
    reads: u64,
    inserted: u64,
}

pub(crate) struct LfuStore<K, V> {
    slots: HashMap<K, Counted<V>>,
    limit: NonZeroUsize,
    tick: u64,
}

impl<K: Hash + Eq + Clone, V> LfuStore<K, V> {
    pub(crate) fn new(capacity: usize) -> Self {
        let limit = at_least_one(capacity);
        Self {
            slots: HashMap::with_capacity(limit.get()),
            limit,
            tick: 0,
        }
    }

    fn coldest(&self) -> Option<K> {
        self.slots
            .iter()
            .min_by_key(|(_, slot)| (slot.reads, slot.inserted))
            .map(|(key, _)| key.clone())
    }
}

impl<K: Hash + Eq + Clone + Send, V: Send> EvictionStore<K, V> for LfuStore<K, V> {
    fn get(&mut self, key: &K) -> Option<&V> {
        let slot = self.slots.get_mut(key)?;
        slot.reads += 1;
        Some(&slot.value)
    }

    fn contains(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(slot) = self.slots.get_mut(&key) {
            let previous = std::mem::replace(&mut slot.value, value);
            return Some((key, previous));
        }

        let dropped = if self.slots.len() >= self.limit.get() {
            self.coldest()
                .and_then(|cold| self.slots.remove_entry(&cold))
                .map(|(k, slot)| (k, slot.value))
        } else {
            None
        };

        self.tick += 1;
        self.slots.insert(
            key,
            Counted {
                value,
                reads: 0,
                inserted: self.tick,
            },
        );
        dropped
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        self.slots.remove(key).map(|slot| slot.value)
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn clear(&mut self) {
        self.slots.clear();
    }
}

pub(crate) struct FifoStore<K, V> {
    values: HashMap<K, V>,
    arrivals: VecDeque<K>,
    limit: NonZeroUsize,
}

impl<K: Hash + Eq + Clone, V> FifoStore<K, V> {
    pub(crate) fn new(capacity: usize) -> Self {
        let limit = at_least_one(capacity);
        Self {
            values: HashMap::with_capacity(limit.get()),
            arrivals: VecDeque::with_capacity(limit.get()),
            limit,
        }
    }

    fn pop_oldest(&mut self) -> Option<(K, V)> {
        while let Some(oldest) = self.arrivals.pop_front() {
            if let Some(value) = self.values.remove(&oldest) {
                return Some((oldest, value));
            }
        }
        None
    }
}

impl<K: Hash + Eq + Clone + Send, V: Send> EvictionStore<K, V> for FifoStore<K, V> {
    fn get(&mut self, key: &K) -> Option<&V> {
        self.values.get(key)
    }

    fn contains(&self, key: &K) -> bool {
        self.values.contains_key(key)
    }

    fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        // A replaced key keeps its place in line.
        if let Some(previous) = self.values.get_mut(&key) {
            let previous = std::mem::replace(previous, value);
            return Some((key, previous));
        }

        let dropped = if self.values.len() >= self.limit.get() {
            self.pop_oldest()
        } else {
            None
        };

        self.arrivals.push_back(key.clone());
        self.values.insert(key, value);
        dropped
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let value = self.values.remove(key)?;
        self.arrivals.retain(|k| k != key);
        Some(value)
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn clear(&mut self) {
        self.values.clear();
        self.arrivals.clear();
    }
}
