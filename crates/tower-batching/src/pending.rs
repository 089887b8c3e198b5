//! In-flight placeholders and the handles callers wait on.

use crate::request::{Outcome, Request};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tower_batching_core::CoordinationError;

/// Placeholder for the eventual outcome of one (kind, key).
///
/// Created the first time a key is registered, fulfilled exactly once when
/// its batch settles. The waiter count is only incremented under the owning
/// loader's lock.
pub(crate) struct PendingEntry<R: Request> {
    key: R::Key,
    request: Mutex<Option<R>>,
    slot: watch::Sender<Option<Outcome<R>>>,
    waiters: AtomicUsize,
}

impl<R: Request> PendingEntry<R> {
    pub(crate) fn new(request: R) -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            key: request.key(),
            request: Mutex::new(Some(request)),
            slot,
            waiters: AtomicUsize::new(0),
        }
    }

    pub(crate) fn key(&self) -> &R::Key {
        &self.key
    }

    /// Moves the request out for dispatch. Returns `None` on a second call.
    pub(crate) fn take_request(&self) -> Option<R> {
        self.request.lock().take()
    }

    pub(crate) fn waiters(&self) -> usize {
        self.waiters.load(Ordering::Acquire)
    }

    /// Stores the outcome unless one is already present.
    pub(crate) fn fulfil(&self, outcome: Outcome<R>) -> bool {
        self.slot.send_if_modified(move |slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }

    pub(crate) fn is_fulfilled(&self) -> bool {
        self.slot.borrow().is_some()
    }
}

impl<R: Request> fmt::Debug for PendingEntry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingEntry")
            .field("key", &self.key)
            .field("waiters", &self.waiters())
            .field("fulfilled", &self.is_fulfilled())
            .finish()
    }
}

/// A caller's claim on a pending entry.
///
/// Dropping the handle before the outcome arrives withdraws the caller; the
/// entry stays valid for everyone else waiting on the same key.
pub struct PendingHandle<R: Request> {
    entry: Arc<PendingEntry<R>>,
    receiver: watch::Receiver<Option<Outcome<R>>>,
    resolver: Arc<str>,
}

impl<R: Request> PendingHandle<R> {
    /// Registers one more waiter on `entry`. Must be called under the owning
    /// loader's lock.
    pub(crate) fn join(entry: Arc<PendingEntry<R>>, resolver: Arc<str>) -> Self {
        entry.waiters.fetch_add(1, Ordering::AcqRel);
        let receiver = entry.slot.subscribe();
        Self {
            entry,
            receiver,
            resolver,
        }
    }

    /// The key this handle waits on.
    pub fn key(&self) -> &R::Key {
        self.entry.key()
    }

    /// Returns true once the outcome is available.
    pub fn is_ready(&self) -> bool {
        self.receiver.borrow().is_some()
    }

    /// Waits for the outcome.
    pub async fn outcome(mut self) -> Outcome<R> {
        let abandoned = || -> Outcome<R> {
            Err(CoordinationError::Abandoned {
                resolver: self.resolver.to_string(),
            }
            .into())
        };

        match self.receiver.wait_for(Option::is_some).await {
            Ok(slot) => match slot.as_ref() {
                Some(outcome) => outcome.clone(),
                None => abandoned(),
            },
            Err(_) => abandoned(),
        }
    }
}

impl<R: Request> Drop for PendingHandle<R> {
    fn drop(&mut self) {
        self.entry.waiters.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<R: Request> fmt::Debug for PendingHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingHandle")
            .field("entry", &self.entry)
            .field("resolver", &self.resolver)
            .finish()
    }
}
