//! The engine: one coordination domain.

use crate::config::{EngineConfig, EngineConfigBuilder, WindowTrigger};
use crate::loader::{Loader, LoaderBuilder};
use crate::resolver::Resolver;
use crate::window::Coordinator;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "metrics")]
use metrics::{describe_counter, describe_histogram};

/// A coordination domain shared by a set of loaders.
///
/// Requests issued through any loader of the same engine within one window
/// are sealed together; each loader's resolver is then invoked once with its
/// group. Independent engines never share entries or windows.
///
/// Engines are cheap to clone and can be used from any task.
#[derive(Clone)]
pub struct Engine {
    coordinator: Arc<Coordinator>,
}

impl Engine {
    /// Creates an engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::builder().into_config())
    }

    /// Creates a configuration builder for an engine.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Creates an engine from a configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        #[cfg(feature = "metrics")]
        {
            describe_counter!(
                "batching_requests_total",
                "Total number of requests issued, by role (leader, waiter, cached)"
            );
            describe_counter!("batching_batches_total", "Total number of batches dispatched");
            describe_counter!("batching_windows_total", "Total number of windows sealed");
            describe_histogram!("batching_batch_size", "Number of distinct requests per batch");
        }

        Self {
            coordinator: Arc::new(Coordinator::new(config)),
        }
    }

    /// Creates a loader for `resolver` with the engine's defaults.
    pub fn loader<Rv: Resolver>(&self, resolver: Rv) -> Loader<Rv> {
        self.loader_builder(resolver).build()
    }

    /// Starts building a loader for `resolver`.
    pub fn loader_builder<Rv: Resolver>(&self, resolver: Rv) -> LoaderBuilder<Rv> {
        LoaderBuilder::new(Arc::clone(&self.coordinator), resolver)
    }

    /// Seals the current window now and waits for the batches it sealed to
    /// settle. Does nothing when no request is open.
    pub async fn flush(&self) {
        self.coordinator.flush().await;
    }

    /// The engine name.
    pub fn name(&self) -> &str {
        self.coordinator.config.name()
    }

    /// The window trigger in use.
    pub fn trigger(&self) -> WindowTrigger {
        self.coordinator.config.trigger()
    }

    /// Number of kinds with requests waiting in the current window.
    pub fn open_kinds(&self) -> usize {
        self.coordinator.open_kinds()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.name())
            .field("trigger", &self.trigger())
            .field("open_kinds", &self.open_kinds())
            .finish()
    }
}
