//! Requests: units of deduplicable, batchable work.

use crate::error::BatchError;
use std::fmt;
use std::hash::Hash;

/// A description of one unit of external work.
///
/// The request's *kind* is the [`Loader`](crate::Loader) it is issued
/// through; within a kind, two requests with equal [`key`](Request::key)s are
/// duplicates and share one resolution.
///
/// The associated `Error` is the closed set of failures a resolver can
/// report for this request, usually an enum.
///
/// # Example
///
/// ```
/// use tower_batching::Request;
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// #[derive(Debug, Clone, PartialEq)]
/// enum GetUserError {
///     NotFound(u64),
/// }
///
/// struct GetUserById {
///     id: u64,
/// }
///
/// impl Request for GetUserById {
///     type Key = u64;
///     type Value = User;
///     type Error = GetUserError;
///
///     fn key(&self) -> u64 {
///         self.id
///     }
/// }
/// ```
pub trait Request: Send + 'static {
    /// Identity used for deduplication and caching.
    type Key: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static;

    /// Successful result, cloned to every caller waiting on the key.
    type Value: Clone + Send + Sync + 'static;

    /// Typed failure reported by the resolver.
    type Error: Clone + Send + Sync + 'static;

    /// Returns the deduplication key of this request.
    fn key(&self) -> Self::Key;
}

/// What a caller receives for an issued request.
pub type Outcome<R> = Result<<R as Request>::Value, BatchError<<R as Request>::Error>>;
