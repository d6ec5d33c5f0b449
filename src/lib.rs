//! # fetch-cell
//!
//! Lifecycle management for asynchronously-fetched values: fetch-state
//! tracking, coalescing of concurrent fetches, per-argument memoization, and
//! ordered mutating actions with pre/post/error hooks.
//!
//! ## Core Abstractions
//!
//! - **[`Resource`]**: wraps one fetcher in a state machine
//!   (`Uninitialized → Fetching → Done/Error`, plus `Stale`) with a single
//!   current value. At most one fetch is ever in flight per resource.
//! - **[`OrderedScheduler`]**: a ticket-based turnstile that runs
//!   asynchronous bodies strictly in submission order, advancing past
//!   failures and resolving flushed tickets with an explicit cancellation
//!   instead of leaving them hanging.
//! - **[`Action`] / [`ActionRunner`]**: a mutating operation (fetcher plus
//!   optional `pre_fetch` / `effect` / `on_fetch_error` hooks) bound to a
//!   resource, serialized through the scheduler by default.
//! - **[`MemoCache`]**: keys independent `Resource` instances by a hash of
//!   the fetch arguments.
//! - **[`MemoMutCache`]**: memoization where each entry carries its own
//!   bound action set, for mutate-after-fetch keyed by argument.
//!
//! ## Concurrency Model
//!
//! Every resource's `{state, value}` pair sits behind one mutex, so compound
//! read-branch-mutate sequences are atomic under true multi-threading; the
//! scheduler's counters likewise. Waiting is cooperative: `tokio::sync::watch`
//! wakeups, never blocked threads. State observation is explicit (poll
//! [`Resource::state`] or suspend on [`Resource::wait_while_fetching`]);
//! there is no implicit reactivity runtime.
//!
//! Cancellation of an individual in-flight fetch is not supported: once
//! started, a fetch or action fetcher runs to completion or failure. The
//! stale/flush protocol works around this by suppressing outdated effects
//! and cancelling queued actions before they start.
//!
//! ## Example
//!
//! ```
//! use fetch_cell::{BoxError, Resource, ResourceState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let resource = Resource::new(|| async { Ok::<_, BoxError>(42u32) });
//!     assert_eq!(resource.state(), ResourceState::Uninitialized);
//!
//!     resource.fetch().await.unwrap();
//!     assert_eq!(resource.state(), ResourceState::Done);
//!     assert_eq!(resource.value(), Some(42));
//!
//!     resource.stale();
//!     assert_eq!(resource.state(), ResourceState::Stale);
//!     assert_eq!(resource.value(), Some(42)); // retained until refetched
//! }
//! ```

pub mod action;
pub mod error;
pub mod fetcher;
pub mod memo;
pub mod memo_mut;
pub mod mutable;
pub mod resource;
pub mod scheduler;
pub mod tracing;

// Re-export core types for convenience
pub use action::{Action, ActionConfig, ActionRunner, ActionSet};
pub use error::{BoxError, ResourceError};
pub use fetcher::{map_by_key, ArgFetcher, Fetcher};
pub use memo::MemoCache;
pub use memo_mut::MemoMutCache;
pub use mutable::MutableResource;
pub use resource::{Resource, ResourceState};
pub use scheduler::{OrderedScheduler, Ticket, TurnGuard};
