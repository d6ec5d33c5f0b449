//! # Actions
//!
//! An [`Action`] is a bound mutating operation: a parameterized fetcher plus
//! optional lifecycle hooks. Actions hold no state of their own; they are
//! pure configuration, bound once per resource by an [`ActionRunner`].
//!
//! The runner serializes concurrent calls through an
//! [`OrderedScheduler`](crate::scheduler::OrderedScheduler) by default, so
//! mutations land in submission order even when their fetchers take wildly
//! different amounts of time. Set
//! [`ActionConfig::order_actions`] to `false` to let calls race instead; the
//! final value order is then determined purely by completion time.

use crate::error::ResourceError;
use crate::fetcher::ArgFetcher;
use crate::resource::{Resource, ResourceState};
use crate::scheduler::OrderedScheduler;
use std::sync::Arc;
use tracing::{debug, warn};

/// Hook run before the action fetcher, against the current resource
/// snapshot. Useful for client-first updates (e.g. inserting a "pending"
/// entry that the effect or error hook later settles).
pub type PreFetchHook<T, A> = Arc<dyn Fn(&Resource<T>, &A) + Send + Sync>;

/// Hook run after a successful fetcher call; responsible for applying the
/// result to the resource value. The runner invokes it through
/// [`Resource::mutate_if_done`], so the hook receives the value directly
/// and runs under the slot lock, together with the still-`Done` check.
pub type EffectHook<T, A, R> = Arc<dyn Fn(&mut T, R, &A) + Send + Sync>;

/// Hook run when the action fails, before the error is re-raised.
pub type FetchErrorHook<T, A> = Arc<dyn Fn(&Resource<T>, &A, &ResourceError) + Send + Sync>;

/// A mutating operation against a resource of type `T`: a fetcher taking
/// arguments `A` and producing `R`, with optional `pre_fetch` / `effect` /
/// `on_fetch_error` hooks.
pub struct Action<T, A, R> {
    fetcher: Arc<dyn ArgFetcher<A, R>>,
    pre_fetch: Option<PreFetchHook<T, A>>,
    effect: Option<EffectHook<T, A, R>>,
    on_fetch_error: Option<FetchErrorHook<T, A>>,
}

// Manual impl: `derive(Clone)` would demand `T: Clone` etc. for the Arc'd
// fields.
impl<T, A, R> Clone for Action<T, A, R> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            pre_fetch: self.pre_fetch.clone(),
            effect: self.effect.clone(),
            on_fetch_error: self.on_fetch_error.clone(),
        }
    }
}

impl<T, A, R> Action<T, A, R> {
    pub fn new(fetcher: impl ArgFetcher<A, R> + 'static) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            pre_fetch: None,
            effect: None,
            on_fetch_error: None,
        }
    }

    pub fn pre_fetch(mut self, hook: impl Fn(&Resource<T>, &A) + Send + Sync + 'static) -> Self {
        self.pre_fetch = Some(Arc::new(hook));
        self
    }

    pub fn effect(mut self, hook: impl Fn(&mut T, R, &A) + Send + Sync + 'static) -> Self {
        self.effect = Some(Arc::new(hook));
        self
    }

    pub fn on_fetch_error(
        mut self,
        hook: impl Fn(&Resource<T>, &A, &ResourceError) + Send + Sync + 'static,
    ) -> Self {
        self.on_fetch_error = Some(Arc::new(hook));
        self
    }
}

/// A named collection of actions sharing one argument and result type.
pub struct ActionSet<T, A, R> {
    actions: Vec<(String, Action<T, A, R>)>,
}

impl<T, A, R> Clone for ActionSet<T, A, R> {
    fn clone(&self) -> Self {
        Self {
            actions: self.actions.clone(),
        }
    }
}

impl<T, A, R> Default for ActionSet<T, A, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A, R> ActionSet<T, A, R> {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, action: Action<T, A, R>) -> Self {
        self.actions.push((name.into(), action));
        self
    }

    pub(crate) fn into_actions(self) -> Vec<(String, Action<T, A, R>)> {
        self.actions
    }
}

/// Construction-time configuration for action binding.
#[derive(Debug, Clone, Copy)]
pub struct ActionConfig {
    /// When `true` (the default), concurrent calls run strictly in
    /// submission order. When `false`, calls race and completion time
    /// decides the final value order.
    pub order_actions: bool,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            order_actions: true,
        }
    }
}

/// Binds one [`Action`] to a resource, routing calls through the shared
/// scheduler when ordering is enabled.
pub struct ActionRunner<T, A, R> {
    resource: Arc<Resource<T>>,
    scheduler: OrderedScheduler,
    action: Action<T, A, R>,
    ordered: bool,
}

impl<T, A, R> Clone for ActionRunner<T, A, R> {
    fn clone(&self) -> Self {
        Self {
            resource: Arc::clone(&self.resource),
            scheduler: self.scheduler.clone(),
            action: self.action.clone(),
            ordered: self.ordered,
        }
    }
}

impl<T, A, R> ActionRunner<T, A, R>
where
    T: Send + 'static,
    A: Clone + Send + 'static,
    R: Send + 'static,
{
    pub fn new(
        resource: Arc<Resource<T>>,
        scheduler: OrderedScheduler,
        action: Action<T, A, R>,
        config: ActionConfig,
    ) -> Self {
        Self {
            resource,
            scheduler,
            action,
            ordered: config.order_actions,
        }
    }

    /// Invokes the action with `args`.
    ///
    /// Fails immediately with [`ResourceError::Uninitialized`] if the
    /// resource has never been fetched; no ticket is consumed. Otherwise
    /// the action body is submitted through the scheduler (or run directly
    /// when ordering is disabled). A flush while the call is queued surfaces
    /// as [`ResourceError::Cancelled`].
    pub async fn call(&self, args: A) -> Result<(), ResourceError> {
        if self.resource.state() == ResourceState::Uninitialized {
            warn!("action invoked on an uninitialized resource");
            return Err(ResourceError::Uninitialized);
        }

        if self.ordered {
            self.scheduler.schedule(|| self.run_action(args)).await?
        } else {
            self.run_action(args).await
        }
    }

    /// The action body: pre-fetch hook, settle any in-flight base fetch,
    /// require `Done`, run the fetcher, then apply the effect.
    async fn run_action(&self, args: A) -> Result<(), ResourceError> {
        if let Some(pre_fetch) = &self.action.pre_fetch {
            pre_fetch(&self.resource, &args);
        }

        // Never race a base-resource refresh.
        let state = self.resource.wait_while_fetching().await;
        if state != ResourceState::Done {
            let err = ResourceError::NotReady(state);
            debug!(?state, "resource not ready for action");
            if let Some(on_fetch_error) = &self.action.on_fetch_error {
                on_fetch_error(&self.resource, &args, &err);
            }
            return Err(err);
        }

        match self.action.fetcher.run(args.clone()).await {
            Ok(result) => {
                // The resource may have gone stale while the fetcher ran.
                // The still-Done check and the mutation share one lock
                // acquisition, so no concurrent stale/flush can land in
                // between and let the effect touch an outdated value.
                if let Some(effect) = &self.action.effect {
                    let applied = self
                        .resource
                        .mutate_if_done(|value| effect(value, result, &args));
                    if !applied {
                        debug!("resource left Done mid-action, effect suppressed");
                    }
                }
                Ok(())
            }
            Err(err) => {
                let err = ResourceError::Fetch(err);
                warn!(error = %err, "action fetcher failed");
                if let Some(on_fetch_error) = &self.action.on_fetch_error {
                    on_fetch_error(&self.resource, &args, &err);
                }
                Err(err)
            }
        }
    }
}
