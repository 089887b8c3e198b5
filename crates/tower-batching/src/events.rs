//! Event types for the batching engine.

use std::time::{Duration, Instant};
use tower_batching_core::{BatchingEvent, CoordinationError};

/// Events emitted by an engine and its loaders.
///
/// Window events carry the engine name; every other event carries the name
/// of the loader that emitted it.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    /// The coordination window closed and its batches were dispatched.
    WindowSealed {
        /// The name of the engine.
        name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Number of kinds with a non-empty batch.
        kinds: usize,
        /// Total requests across all batches.
        requests: usize,
    },
    /// A batch was handed to its resolver.
    BatchDispatched {
        /// The name of the loader.
        name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Number of distinct requests in the batch.
        size: usize,
    },
    /// A batch settled and its callers were notified.
    BatchCompleted {
        /// The name of the loader.
        name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Number of distinct requests in the batch.
        size: usize,
        /// How many of them failed.
        failures: usize,
        /// Time spent in the resolver.
        duration: Duration,
    },
    /// A request joined an entry already in flight for the same key.
    RequestDeduplicated {
        /// The name of the loader.
        name: String,
        /// When the event occurred.
        timestamp: Instant,
    },
    /// Entries whose callers all went away were dropped before dispatch.
    RequestsAbandoned {
        /// The name of the loader.
        name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Number of entries dropped.
        count: usize,
    },
    /// A request was answered from the settled-result cache.
    CacheHit {
        /// The name of the loader.
        name: String,
        /// When the event occurred.
        timestamp: Instant,
    },
    /// A settled result was evicted to make room.
    CacheEviction {
        /// The name of the loader.
        name: String,
        /// When the event occurred.
        timestamp: Instant,
    },
    /// A batch could not be correlated; all its callers got this error.
    CoordinationFailure {
        /// The name of the loader.
        name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// What went wrong.
        error: CoordinationError,
    },
}

impl BatchingEvent for BatchEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BatchEvent::WindowSealed { .. } => "window_sealed",
            BatchEvent::BatchDispatched { .. } => "batch_dispatched",
            BatchEvent::BatchCompleted { .. } => "batch_completed",
            BatchEvent::RequestDeduplicated { .. } => "request_deduplicated",
            BatchEvent::RequestsAbandoned { .. } => "requests_abandoned",
            BatchEvent::CacheHit { .. } => "cache_hit",
            BatchEvent::CacheEviction { .. } => "cache_eviction",
            BatchEvent::CoordinationFailure { .. } => "coordination_failure",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            BatchEvent::WindowSealed { timestamp, .. }
            | BatchEvent::BatchDispatched { timestamp, .. }
            | BatchEvent::BatchCompleted { timestamp, .. }
            | BatchEvent::RequestDeduplicated { timestamp, .. }
            | BatchEvent::RequestsAbandoned { timestamp, .. }
            | BatchEvent::CacheHit { timestamp, .. }
            | BatchEvent::CacheEviction { timestamp, .. }
            | BatchEvent::CoordinationFailure { timestamp, .. } => *timestamp,
        }
    }

    fn source_name(&self) -> &str {
        match self {
            BatchEvent::WindowSealed { name, .. }
            | BatchEvent::BatchDispatched { name, .. }
            | BatchEvent::BatchCompleted { name, .. }
            | BatchEvent::RequestDeduplicated { name, .. }
            | BatchEvent::RequestsAbandoned { name, .. }
            | BatchEvent::CacheHit { name, .. }
            | BatchEvent::CacheEviction { name, .. }
            | BatchEvent::CoordinationFailure { name, .. } => name,
        }
    }
}
