//! Configuration for the batching engine.

use crate::events::BatchEvent;
use std::time::Duration;
use tower_batching_cache::CachePolicy;
use tower_batching_core::{CoordinationError, EventListeners, FnListener};

/// Default quiet period before an open window seals.
pub const DEFAULT_QUIET: Duration = Duration::from_millis(1);

/// Default upper bound on how long a window stays open.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10);

/// When an open coordination window closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowTrigger {
    /// Seal once no request has registered for `quiet`, or `max_delay` after
    /// the window opened, whichever comes first.
    Debounce {
        /// Quiet period after the last registration.
        quiet: Duration,
        /// Maximum time a window stays open.
        max_delay: Duration,
    },
    /// Seal only when [`Engine::flush`](crate::Engine::flush) is called or
    /// `max_batch_size` is reached.
    Manual,
}

impl Default for WindowTrigger {
    fn default() -> Self {
        WindowTrigger::Debounce {
            quiet: DEFAULT_QUIET,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

/// Configuration shared by an engine and the loaders created from it.
pub struct EngineConfig {
    pub(crate) name: String,
    pub(crate) trigger: WindowTrigger,
    pub(crate) max_batch_size: Option<usize>,
    pub(crate) cache: CachePolicy,
    pub(crate) event_listeners: EventListeners<BatchEvent>,
}

impl EngineConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// The engine name used in events and logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The window trigger.
    pub fn trigger(&self) -> WindowTrigger {
        self.trigger
    }

    /// The per-kind batch size that seals the window early, if any.
    pub fn max_batch_size(&self) -> Option<usize> {
        self.max_batch_size
    }

    /// The cache policy given to loaders with a cacheable resolver.
    pub fn cache_policy(&self) -> &CachePolicy {
        &self.cache
    }
}

/// Builder for configuring and constructing an [`Engine`](crate::Engine).
pub struct EngineConfigBuilder {
    name: String,
    trigger: WindowTrigger,
    max_batch_size: Option<usize>,
    cache: CachePolicy,
    event_listeners: EventListeners<BatchEvent>,
}

impl EngineConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            name: String::from("<unnamed>"),
            trigger: WindowTrigger::default(),
            max_batch_size: None,
            cache: CachePolicy::default(),
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the name of this engine for observability.
    ///
    /// Default: `"<unnamed>"`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the quiet period after the last registration that seals the
    /// window. Switches a manual engine back to debounced sealing.
    ///
    /// Default: 1ms
    pub fn window(mut self, quiet: Duration) -> Self {
        let max_delay = match self.trigger {
            WindowTrigger::Debounce { max_delay, .. } => max_delay,
            WindowTrigger::Manual => DEFAULT_MAX_DELAY,
        };
        self.trigger = WindowTrigger::Debounce {
            quiet,
            max_delay: max_delay.max(quiet),
        };
        self
    }

    /// Sets the maximum time a window stays open while registrations keep
    /// arriving.
    ///
    /// Default: 10ms
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        let quiet = match self.trigger {
            WindowTrigger::Debounce { quiet, .. } => quiet,
            WindowTrigger::Manual => DEFAULT_QUIET,
        };
        self.trigger = WindowTrigger::Debounce {
            quiet: quiet.min(max_delay),
            max_delay,
        };
        self
    }

    /// Only seal the window on an explicit flush (or when `max_batch_size`
    /// is reached).
    pub fn manual_flush(mut self) -> Self {
        self.trigger = WindowTrigger::Manual;
        self
    }

    /// Seals the window as soon as one kind has this many distinct requests
    /// open. No resolver call ever receives more; a larger group is split.
    /// `max_batch_size(1)` effectively disables batching.
    ///
    /// Default: unlimited
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = Some(size.max(1));
        self
    }

    /// Sets the cache policy given to loaders whose resolver is cacheable.
    ///
    /// Default: 65536 entries, 60 minute TTL, LRU eviction
    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache = policy;
        self
    }

    /// Registers a callback for every event.
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&BatchEvent) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(f));
        self
    }

    /// Registers a callback invoked with the loader name and batch size when
    /// a batch is handed to its resolver.
    pub fn on_batch_dispatched<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &BatchEvent| {
            if let BatchEvent::BatchDispatched { name, size, .. } = event {
                f(name, *size);
            }
        }));
        self
    }

    /// Registers a callback invoked with the loader name, batch size and
    /// failure count when a batch settles.
    pub fn on_batch_completed<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, usize, usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &BatchEvent| {
            if let BatchEvent::BatchCompleted {
                name,
                size,
                failures,
                ..
            } = event
            {
                f(name, *size, *failures);
            }
        }));
        self
    }

    /// Registers a callback invoked when a request joins one already in
    /// flight.
    pub fn on_deduplicated<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &BatchEvent| {
            if matches!(event, BatchEvent::RequestDeduplicated { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback invoked on a cache hit.
    pub fn on_cache_hit<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &BatchEvent| {
            if matches!(event, BatchEvent::CacheHit { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback invoked when a batch fails coordination.
    pub fn on_coordination_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(&CoordinationError) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &BatchEvent| {
            if let BatchEvent::CoordinationFailure { error, .. } = event {
                f(error);
            }
        }));
        self
    }

    /// Builds the configuration without creating an engine.
    pub fn into_config(self) -> EngineConfig {
        EngineConfig {
            name: self.name,
            trigger: self.trigger,
            max_batch_size: self.max_batch_size,
            cache: self.cache,
            event_listeners: self.event_listeners,
        }
    }

    /// Builds the engine.
    pub fn build(self) -> crate::Engine {
        crate::Engine::with_config(self.into_config())
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
