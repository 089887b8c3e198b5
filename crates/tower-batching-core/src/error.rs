//! Coordination errors.
//!
//! A coordination error means the engine could not correlate a resolver's
//! answer with the requests it was given. It is fatal to the affected batch
//! only: every caller waiting on that batch receives the same error, other
//! batches are untouched.

use thiserror::Error;

/// An internal invariant violation detected while settling a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinationError {
    /// The resolver returned a different number of outcomes than it was
    /// given requests, so outcomes cannot be matched by position.
    #[error("resolver '{resolver}' returned {actual} outcomes for {expected} requests")]
    LengthMismatch {
        /// Name of the offending resolver.
        resolver: String,
        /// Number of requests in the batch.
        expected: usize,
        /// Number of outcomes returned.
        actual: usize,
    },

    /// The batch was dropped before producing outcomes (the resolver
    /// panicked or its task was cancelled).
    #[error("batch for resolver '{resolver}' was abandoned before completing")]
    Abandoned {
        /// Name of the resolver whose batch was abandoned.
        resolver: String,
    },
}

impl CoordinationError {
    /// Name of the resolver the failed batch belonged to.
    pub fn resolver(&self) -> &str {
        match self {
            CoordinationError::LengthMismatch { resolver, .. }
            | CoordinationError::Abandoned { resolver } => resolver,
        }
    }

    /// Returns `true` if this is a length mismatch.
    pub fn is_length_mismatch(&self) -> bool {
        matches!(self, CoordinationError::LengthMismatch { .. })
    }
}
