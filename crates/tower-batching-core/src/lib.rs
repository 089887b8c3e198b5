//! Core infrastructure for tower-batching.
//!
//! This crate provides functionality shared by the batching engine and the
//! settled-result cache:
//! - Event system for observability
//! - Coordination errors raised when a batch cannot be correlated

pub mod error;
pub mod events;

pub use error::CoordinationError;
pub use events::{BatchingEvent, BoxedEventListener, EventListener, EventListeners, FnListener};
