//! # Resource State Machine
//!
//! This module defines [`Resource`], the core primitive of the crate: one
//! fetcher wrapped in a state machine with a single current value.
//!
//! # Concurrency Model
//!
//! Unlike a single-threaded event loop, a multi-threaded runtime gives no
//! free atomicity for compound "read state, branch, mutate" sequences. The
//! `{state, value}` pair therefore lives behind one mutex and every
//! transition happens while the lock is held. Observers never see `Done`
//! paired with a stale value.
//!
//! Waiting is cooperative: a `tokio::sync::watch` channel broadcasts every
//! transition so tasks can suspend until a state of interest without
//! polling. This is an explicit notification mechanism; there is no implicit
//! reactivity.

use crate::error::ResourceError;
use crate::fetcher::Fetcher;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, warn};

/// The lifecycle state of a [`Resource`].
///
/// - `Uninitialized`: no fetch has ever been performed; the value is absent.
/// - `Fetching`: a fetch is in flight. At most one fetch runs at a time.
/// - `Done`: the last fetch succeeded and the value is current.
/// - `Stale`: a value is retained but considered outdated; the next
///   `force_fetch` refreshes it.
/// - `Error`: the last fetch failed. A previously fetched value, if any, is
///   retained untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Uninitialized,
    Fetching,
    Done,
    Stale,
    Error,
}

/// The guarded `{state, value}` pair. Both fields always change together
/// under the lock.
struct Slot<T> {
    state: ResourceState,
    value: Option<T>,
}

/// A single asynchronously-fetched value and its lifecycle state.
///
/// Invariants:
/// - `value` is `Some` whenever the state is `Done` or `Stale`.
/// - `value` is `None` while `Uninitialized`.
/// - `Fetching` and `Error` may retain a previously fetched value.
///
/// The value is mutated only by the resource's own fetch logic and by bound
/// action hooks (via [`Resource::with_value_mut`] and
/// [`Resource::mutate_if_done`]).
pub struct Resource<T> {
    slot: Mutex<Slot<T>>,
    state_tx: watch::Sender<ResourceState>,
    fetcher: Arc<dyn Fetcher<T>>,
}

impl<T: Send + 'static> Resource<T> {
    /// Creates a resource in the `Uninitialized` state, bound to an
    /// argument-free fetcher.
    pub fn new(fetcher: impl Fetcher<T> + 'static) -> Self {
        let (state_tx, _) = watch::channel(ResourceState::Uninitialized);
        Self {
            slot: Mutex::new(Slot {
                state: ResourceState::Uninitialized,
                value: None,
            }),
            state_tx,
            fetcher: Arc::new(fetcher),
        }
    }

    /// Refreshes the value unless a fetch is already in flight.
    ///
    /// If the state is `Fetching` this returns `Ok(())` immediately without
    /// invoking the fetcher (the at-most-one-concurrent-fetch guarantee).
    /// Otherwise the state moves to `Fetching`, the fetcher runs, and on
    /// completion the `{value, state}` pair is updated atomically: `Done`
    /// with the new value on success, `Error` (value untouched) on failure.
    /// Fetcher failures are re-raised to the caller.
    pub async fn force_fetch(&self) -> Result<(), ResourceError> {
        {
            let mut slot = self.slot.lock().unwrap();
            if slot.state == ResourceState::Fetching {
                debug!("fetch already in flight, coalescing");
                return Ok(());
            }
            slot.state = ResourceState::Fetching;
            self.state_tx.send_replace(ResourceState::Fetching);
        }

        match self.fetcher.run().await {
            Ok(value) => {
                let mut slot = self.slot.lock().unwrap();
                slot.value = Some(value);
                slot.state = ResourceState::Done;
                self.state_tx.send_replace(ResourceState::Done);
                debug!("fetch complete");
                Ok(())
            }
            Err(err) => {
                let mut slot = self.slot.lock().unwrap();
                slot.state = ResourceState::Error;
                self.state_tx.send_replace(ResourceState::Error);
                warn!(error = %err, "fetch failed");
                Err(ResourceError::Fetch(err))
            }
        }
    }

    /// Fetch-if-needed: a no-op when the state is already `Done`, otherwise
    /// delegates to [`Resource::force_fetch`].
    pub async fn fetch(&self) -> Result<(), ResourceError> {
        if self.state() == ResourceState::Done {
            return Ok(());
        }
        self.force_fetch().await
    }

    /// Marks the value outdated. Only legal from `Done`; from any other
    /// state this is a silent no-op. Returns whether a transition happened.
    pub fn stale(&self) -> bool {
        let mut slot = self.slot.lock().unwrap();
        if slot.state == ResourceState::Done {
            slot.state = ResourceState::Stale;
            self.state_tx.send_replace(ResourceState::Stale);
            debug!("resource marked stale");
            true
        } else {
            false
        }
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ResourceState {
        self.slot.lock().unwrap().state
    }

    /// Clones out the current value, if any.
    pub fn value(&self) -> Option<T>
    where
        T: Clone,
    {
        self.slot.lock().unwrap().value.clone()
    }

    /// Reads the current value under the lock without cloning.
    pub fn with_value<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        let slot = self.slot.lock().unwrap();
        f(slot.value.as_ref())
    }

    /// Mutates the current value under the lock.
    ///
    /// Part of the hook surface: `pre_fetch` hooks and the fetch logic are
    /// the only legal mutators of the value besides
    /// [`Resource::mutate_if_done`]. The closure runs while the lock is
    /// held, so the mutation is atomic with respect to all concurrent
    /// readers.
    pub fn with_value_mut<R>(&self, f: impl FnOnce(&mut Option<T>) -> R) -> R {
        let mut slot = self.slot.lock().unwrap();
        f(&mut slot.value)
    }

    /// Runs `f` on the value only while the state is still `Done`, holding
    /// the lock across both the check and the mutation. Returns whether `f`
    /// ran.
    ///
    /// This is the conditional-mutation surface for action `effect` hooks: a
    /// concurrent `stale` cannot land between the state check and the
    /// mutation, so a suppressed effect never touches an outdated value.
    pub fn mutate_if_done(&self, f: impl FnOnce(&mut T)) -> bool {
        let mut slot = self.slot.lock().unwrap();
        if slot.state != ResourceState::Done {
            return false;
        }
        match slot.value.as_mut() {
            Some(value) => {
                f(value);
                true
            }
            None => false,
        }
    }

    /// Suspends until the state is not `Fetching`, then returns the state
    /// that was observed.
    ///
    /// Subscribes to transitions before the first check, so a transition
    /// racing this call is never missed.
    pub async fn wait_while_fetching(&self) -> ResourceState {
        let mut rx = self.state_tx.subscribe();
        loop {
            let state = self.state();
            if state != ResourceState::Fetching {
                return state;
            }
            if rx.changed().await.is_err() {
                // Sender lives in `self`, so this is unreachable while the
                // resource is alive.
                return self.state();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn counting_fetcher(
        calls: Arc<AtomicU32>,
    ) -> impl Fetcher<u32> + 'static {
        move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(7u32)
            }
        }
    }

    #[tokio::test]
    async fn starts_uninitialized_without_value() {
        let resource = Resource::new(|| async { Ok::<_, BoxError>(1u32) });
        assert_eq!(resource.state(), ResourceState::Uninitialized);
        assert_eq!(resource.value(), None);
    }

    #[tokio::test]
    async fn fetch_stores_value_and_reaches_done() {
        let resource = Resource::new(|| async { Ok::<_, BoxError>(42u32) });
        resource.fetch().await.unwrap();
        assert_eq!(resource.state(), ResourceState::Done);
        assert_eq!(resource.value(), Some(42));
    }

    #[tokio::test]
    async fn fetch_on_done_resource_is_a_noop() {
        let calls = Arc::new(AtomicU32::new(0));
        let resource = Resource::new(counting_fetcher(calls.clone()));

        resource.fetch().await.unwrap();
        resource.fetch().await.unwrap();
        resource.fetch().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_keeps_value_and_allows_refetch() {
        let resource = Resource::new(|| async { Ok::<_, BoxError>(5u32) });
        resource.fetch().await.unwrap();

        assert!(resource.stale());
        assert_eq!(resource.state(), ResourceState::Stale);
        assert_eq!(resource.value(), Some(5));

        resource.fetch().await.unwrap();
        assert_eq!(resource.state(), ResourceState::Done);
    }

    #[tokio::test]
    async fn stale_is_a_noop_outside_done() {
        let resource = Resource::new(|| async { Ok::<_, BoxError>(5u32) });
        assert!(!resource.stale());
        assert_eq!(resource.state(), ResourceState::Uninitialized);

        let failing: Resource<u32> =
            Resource::new(|| async { Err::<u32, BoxError>("boom".into()) });
        let _ = failing.fetch().await;
        assert!(!failing.stale());
        assert_eq!(failing.state(), ResourceState::Error);
    }

    #[tokio::test]
    async fn mutate_if_done_skips_resources_that_left_done() {
        let resource = Resource::new(|| async { Ok::<_, BoxError>(vec![1u32]) });
        resource.fetch().await.unwrap();

        assert!(resource.mutate_if_done(|items| items.push(2)));
        assert_eq!(resource.value(), Some(vec![1, 2]));

        // Going stale between an action's completion and its effect must
        // leave the value untouched; the check and the mutation share one
        // lock acquisition.
        resource.stale();
        assert!(!resource.mutate_if_done(|items| items.push(3)));
        assert_eq!(resource.value(), Some(vec![1, 2]));
    }

    #[tokio::test]
    async fn fetch_failure_propagates_and_leaves_error_state() {
        let resource: Resource<u32> =
            Resource::new(|| async { Err::<u32, BoxError>("fetch error".into()) });

        let err = resource.fetch().await.unwrap_err();
        assert!(matches!(err, ResourceError::Fetch(_)));
        assert_eq!(resource.state(), ResourceState::Error);
        assert_eq!(resource.value(), None);

        // No implicit retry: the caller must fetch again.
        let err = resource.force_fetch().await.unwrap_err();
        assert!(matches!(err, ResourceError::Fetch(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_force_fetches_coalesce_to_one_call() {
        let calls = Arc::new(AtomicU32::new(0));
        let slow_calls = calls.clone();
        let resource = Arc::new(Resource::new(move || {
            let calls = slow_calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, BoxError>(1u32)
            }
        }));

        let first = {
            let resource = resource.clone();
            tokio::spawn(async move { resource.force_fetch().await })
        };
        let second = {
            let resource = resource.clone();
            tokio::spawn(async move { resource.force_fetch().await })
        };

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_while_fetching_returns_settled_state() {
        let resource = Arc::new(Resource::new(|| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, BoxError>(3u32)
        }));

        let fetching = {
            let resource = resource.clone();
            tokio::spawn(async move { resource.force_fetch().await })
        };
        // Let the fetch task start before waiting on it.
        tokio::task::yield_now().await;
        assert_eq!(resource.state(), ResourceState::Fetching);

        let settled = resource.wait_while_fetching().await;
        assert_eq!(settled, ResourceState::Done);
        fetching.await.unwrap().unwrap();
    }
}
