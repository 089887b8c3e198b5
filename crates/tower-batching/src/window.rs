//! The coordination window.
//!
//! Loaders register here whenever they open a new pending entry. The window
//! remembers which loaders have open entries and, when it closes, asks each
//! of them to seal its open entries into one batch. Sealed batches run on
//! their own tasks.
//!
//! A window closes when the quiet period passes without a new registration,
//! when it has been open for the maximum delay, when one kind reaches the
//! maximum batch size, or on an explicit flush.

use crate::config::{EngineConfig, WindowTrigger};
use crate::events::BatchEvent;
use futures::future::{join_all, BoxFuture};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[cfg(feature = "metrics")]
use metrics::counter;

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

/// Identity of a request kind (one loader) within an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KindId(u64);

impl fmt::Display for KindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kind#{}", self.0)
    }
}

/// A loader as seen by the window.
pub(crate) trait Dispatch: Send + Sync {
    fn kind(&self) -> KindId;

    /// Moves the loader's open entries into sealed batches, none larger
    /// than the engine's `max_batch_size`.
    ///
    /// Returns an empty list when nothing is left to dispatch.
    fn seal(self: Arc<Self>) -> Vec<SealedBatch>;
}

/// One kind's batch, sealed and ready to run.
pub(crate) struct SealedBatch {
    pub(crate) size: usize,
    pub(crate) run: BoxFuture<'static, ()>,
}

/// Debounce timer of the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    Idle,
    /// A timer task with this epoch is scheduled or running.
    Armed(u64),
    /// No runtime was available; the window waits for a flush.
    Unavailable,
}

struct WindowState {
    /// Loaders with open entries, in order of first registration.
    dirty: Vec<Arc<dyn Dispatch>>,
    /// Bumped on every registration; the timer seals once it stops moving.
    generation: u64,
    opened_at: Option<Instant>,
    timer: Timer,
    timer_epoch: u64,
}

impl WindowState {
    /// Disarms the timer with `epoch` unless a newer one replaced it.
    fn disarm(&mut self, epoch: u64) {
        if self.timer == Timer::Armed(epoch) {
            self.timer = Timer::Idle;
        }
    }
}

/// Disarms its timer when the timer task ends, including when the task is
/// dropped unpolled because its runtime shut down.
struct TimerGuard {
    coordinator: Arc<Coordinator>,
    epoch: u64,
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.coordinator.state.lock().disarm(self.epoch);
    }
}

/// Shared state of one coordination domain.
pub(crate) struct Coordinator {
    pub(crate) config: EngineConfig,
    state: Mutex<WindowState>,
    next_kind: AtomicU64,
}

impl Coordinator {
    pub(crate) fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: Mutex::new(WindowState {
                dirty: Vec::new(),
                generation: 0,
                opened_at: None,
                timer: Timer::Idle,
                timer_epoch: 0,
            }),
            next_kind: AtomicU64::new(0),
        }
    }

    pub(crate) fn next_kind(&self) -> KindId {
        KindId(self.next_kind.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of kinds with open entries in the current window.
    pub(crate) fn open_kinds(&self) -> usize {
        self.state.lock().dirty.len()
    }

    /// Records that `loader` opened an entry; `open_len` is its open count.
    ///
    /// Must not be called while holding the loader's lock.
    pub(crate) fn register(self: &Arc<Self>, loader: Arc<dyn Dispatch>, open_len: usize) {
        let full = self
            .config
            .max_batch_size
            .is_some_and(|max| open_len >= max);
        let debounce = !full && matches!(self.config.trigger, WindowTrigger::Debounce { .. });
        let runtime = debounce && Handle::try_current().is_ok();

        let arm_timer = {
            let mut state = self.state.lock();
            let kind = loader.kind();
            if !state.dirty.iter().any(|d| d.kind() == kind) {
                state.dirty.push(loader);
            }
            state.generation = state.generation.wrapping_add(1);
            if state.opened_at.is_none() {
                state.opened_at = Some(Instant::now());
            }

            // A window that found no runtime is retried once one shows up.
            let idle = match state.timer {
                Timer::Idle => true,
                Timer::Unavailable => runtime,
                Timer::Armed(_) => false,
            };
            if debounce && idle {
                state.timer_epoch = state.timer_epoch.wrapping_add(1);
                state.timer = Timer::Armed(state.timer_epoch);
                Some(state.timer_epoch)
            } else {
                None
            }
        };

        if full {
            self.spawn_batches(self.seal());
            return;
        }

        if let Some(epoch) = arm_timer {
            if let WindowTrigger::Debounce { quiet, max_delay } = self.config.trigger {
                self.arm_timer(epoch, quiet, max_delay);
            }
        }
    }

    fn arm_timer(self: &Arc<Self>, epoch: u64, quiet: Duration, max_delay: Duration) {
        let guard = TimerGuard {
            coordinator: Arc::clone(self),
            epoch,
        };

        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(Arc::clone(self).run_timer(guard, quiet, max_delay));
            }
            Err(_) => {
                // Entries stay open until an explicit flush. Marking the
                // window keeps later registrations from retrying (and
                // warning) until it seals.
                {
                    let mut state = self.state.lock();
                    if state.timer == Timer::Armed(epoch) {
                        state.timer = Timer::Unavailable;
                    }
                }
                drop(guard);

                #[cfg(feature = "tracing")]
                warn!(
                    engine = %self.config.name,
                    "No tokio runtime; window will only seal on flush"
                );
            }
        }
    }

    async fn run_timer(self: Arc<Self>, guard: TimerGuard, quiet: Duration, max_delay: Duration) {
        let epoch = guard.epoch;
        loop {
            let (seen, opened_at) = {
                let state = self.state.lock();
                (state.generation, state.opened_at)
            };

            let mut wake = Instant::now() + quiet;
            if let Some(opened_at) = opened_at {
                wake = wake.min(opened_at + max_delay);
            }
            tokio::time::sleep_until(wake).await;

            {
                let mut state = self.state.lock();
                if state.dirty.is_empty() {
                    state.disarm(epoch);
                    return;
                }
                let overdue = state
                    .opened_at
                    .is_some_and(|opened| opened.elapsed() >= max_delay);
                if state.generation != seen && !overdue {
                    continue;
                }
                state.disarm(epoch);
            }

            self.spawn_batches(self.seal());
            return;
        }
    }

    /// Closes the current window and seals every dirty loader's batch.
    pub(crate) fn seal(&self) -> Vec<SealedBatch> {
        let dirty = {
            let mut state = self.state.lock();
            state.opened_at = None;
            if state.timer == Timer::Unavailable {
                state.timer = Timer::Idle;
            }
            std::mem::take(&mut state.dirty)
        };

        let mut kinds = 0;
        let mut batches = Vec::new();
        for loader in dirty {
            let sealed = loader.seal();
            if !sealed.is_empty() {
                kinds += 1;
                batches.extend(sealed);
            }
        }
        if batches.is_empty() {
            return batches;
        }

        let requests = batches.iter().map(|b| b.size).sum();

        #[cfg(feature = "metrics")]
        {
            counter!("batching_windows_total", "engine" => self.config.name.clone()).increment(1);
        }

        #[cfg(feature = "tracing")]
        debug!(
            engine = %self.config.name,
            kinds,
            batches = batches.len(),
            requests,
            "Coordination window sealed"
        );

        self.config.event_listeners.emit(&BatchEvent::WindowSealed {
            name: self.config.name.clone(),
            timestamp: std::time::Instant::now(),
            kinds,
            requests,
        });

        batches
    }

    /// Runs each batch on its own task.
    ///
    /// Without a runtime the batches are dropped unrun, which fails their
    /// callers with an abandonment error instead of leaving them waiting.
    fn spawn_batches(&self, batches: Vec<SealedBatch>) -> Vec<JoinHandle<()>> {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                #[cfg(feature = "tracing")]
                warn!(
                    engine = %self.config.name,
                    batches = batches.len(),
                    "No tokio runtime; dropping sealed batches"
                );
                return Vec::new();
            }
        };

        batches
            .into_iter()
            .map(|batch| handle.spawn(batch.run))
            .collect()
    }

    /// Seals now and waits for the sealed batches to settle.
    pub(crate) async fn flush(&self) {
        let batches = self.seal();
        if batches.is_empty() {
            return;
        }

        if Handle::try_current().is_ok() {
            for handle in self.spawn_batches(batches) {
                // A panicking batch has already failed its callers.
                let _ = handle.await;
            }
        } else {
            join_all(batches.into_iter().map(|b| b.run)).await;
        }
    }
}
