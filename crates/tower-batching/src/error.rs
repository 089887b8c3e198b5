//! Error types for the batching engine.

use thiserror::Error;
use tower_batching_core::CoordinationError;

/// Failure delivered to a caller in place of a value.
///
/// A resolver's own failure is passed through verbatim in
/// [`BatchError::Resolver`]; it reaches every caller waiting on the same key.
/// [`BatchError::Coordination`] means the batch could not be correlated and
/// every caller of that batch receives the same error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError<E> {
    /// The resolver reported a failure for this request (or its whole batch).
    #[error("resolver error: {0}")]
    Resolver(#[source] E),

    /// The engine could not match outcomes to requests for this batch.
    #[error(transparent)]
    Coordination(#[from] CoordinationError),
}

impl<E> BatchError<E> {
    /// Returns `true` if the resolver reported this failure.
    pub fn is_resolver(&self) -> bool {
        matches!(self, BatchError::Resolver(_))
    }

    /// Returns `true` if this is a coordination failure.
    pub fn is_coordination(&self) -> bool {
        matches!(self, BatchError::Coordination(_))
    }

    /// Borrows the resolver failure, if any.
    pub fn as_resolver(&self) -> Option<&E> {
        match self {
            BatchError::Resolver(e) => Some(e),
            BatchError::Coordination(_) => None,
        }
    }

    /// Extracts the resolver failure, if any.
    pub fn resolver_error(self) -> Option<E> {
        match self {
            BatchError::Resolver(e) => Some(e),
            BatchError::Coordination(_) => None,
        }
    }

    /// Maps the resolver failure using a function.
    ///
    /// # Examples
    ///
    /// ```
    /// use tower_batching::BatchError;
    ///
    /// let err: BatchError<String> = BatchError::Resolver("not found".to_string());
    /// let mapped: BatchError<usize> = err.map_resolver(|s| s.len());
    /// assert_eq!(mapped.resolver_error(), Some(9));
    /// ```
    pub fn map_resolver<F, T>(self, f: F) -> BatchError<T>
    where
        F: FnOnce(E) -> T,
    {
        match self {
            BatchError::Resolver(e) => BatchError::Resolver(f(e)),
            BatchError::Coordination(c) => BatchError::Coordination(c),
        }
    }
}

/// Errors returned by the [`Registry`](crate::Registry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No service of the requested type was registered.
    #[error("no service registered for {type_name}")]
    Missing {
        /// Name of the requested type.
        type_name: &'static str,
    },
}
