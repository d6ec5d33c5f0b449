//! # Errors
//!
//! This module defines the common error type used throughout the crate.
//! By centralizing error definitions, we ensure consistent error handling across
//! resources, schedulers, and caches.

use crate::resource::ResourceState;

/// Opaque error type produced by user-supplied fetchers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by resources, action runners, and caches.
///
/// Nothing is swallowed: hooks may observe a failure locally via
/// `on_fetch_error`, but every error is ultimately returned to the original
/// caller.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// The underlying fetcher rejected. The resource is left in the `Error`
    /// state and the failure propagates to the caller of `fetch`/`force_fetch`.
    #[error("fetcher failed: {0}")]
    Fetch(#[source] BoxError),

    /// An action was invoked on a resource that has never been fetched.
    /// Raised before any ticket is issued.
    #[error("action invoked on an uninitialized resource")]
    Uninitialized,

    /// An action waited out an in-flight fetch but the resource did not settle
    /// in the `Done` state. Recoverable: `on_fetch_error` is invoked, then the
    /// error is re-raised.
    #[error("resource is not ready for actions (state: {0:?})")]
    NotReady(ResourceState),

    /// The action's ticket was abandoned by a flush before its turn came.
    /// Every pending ticket resolves with this error instead of hanging.
    #[error("action cancelled before it ran")]
    Cancelled,

    /// Named action lookup failed on a mutable resource.
    #[error("unknown action: {0}")]
    UnknownAction(String),
}
