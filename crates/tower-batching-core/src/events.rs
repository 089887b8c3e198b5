//! Listener plumbing shared by every batching component.
//!
//! Loaders, the coordination window and the settled-result cache all report
//! through one [`EventListeners`] collection per engine, so a single callback
//! registered on the engine builder sees everything that engine does.

use std::fmt;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Something that happened inside an engine.
pub trait BatchingEvent: Send + Sync + fmt::Debug {
    /// Stable snake_case tag, e.g. `"batch_dispatched"`.
    fn event_type(&self) -> &'static str;

    fn timestamp(&self) -> Instant;

    /// Name of the engine or loader the event came from.
    fn source_name(&self) -> &str;
}

/// Receives events of type `E`.
pub trait EventListener<E: BatchingEvent>: Send + Sync {
    fn on_event(&self, event: &E);
}

/// Shared, type-erased listener.
pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

/// An ordered set of listeners. Cloning shares the listeners themselves.
#[derive(Clone)]
pub struct EventListeners<E: BatchingEvent> {
    inner: Vec<BoxedEventListener<E>>,
}

impl<E: BatchingEvent> EventListeners<E> {
    pub fn new() -> Self {
        Self { inner: Vec::new() }
    }

    /// Appends `listener`; listeners run in the order they were added.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.inner.push(Arc::new(listener));
    }

    /// Appends the listeners of `other`, sharing rather than copying them.
    pub fn extend(&mut self, other: &EventListeners<E>) {
        self.inner.extend(other.inner.iter().map(Arc::clone));
    }

    /// Delivers `event` to every listener and returns how many panicked.
    ///
    /// A panic in one listener is caught; later listeners still run and the
    /// caller never unwinds.
    pub fn emit(&self, event: &E) -> usize {
        self.inner
            .iter()
            .filter(|listener| {
                catch_unwind(AssertUnwindSafe(|| listener.on_event(event))).is_err()
            })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<E: BatchingEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BatchingEvent> fmt::Debug for EventListeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventListeners({})", self.inner.len())
    }
}

/// Adapts a closure into an [`EventListener`].
pub struct FnListener<E, F>(F, PhantomData<fn(&E)>);

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        FnListener(f, PhantomData)
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: BatchingEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.0)(event)
    }
}
