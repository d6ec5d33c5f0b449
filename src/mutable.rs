//! # Mutable Resource
//!
//! A [`Resource`] bundled with a named set of bound actions and the
//! scheduler that serializes them: the mutate-after-fetch surface.

use crate::action::{ActionConfig, ActionRunner, ActionSet};
use crate::error::ResourceError;
use crate::fetcher::Fetcher;
use crate::resource::{Resource, ResourceState};
use crate::scheduler::OrderedScheduler;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A fetchable resource with bound mutating actions.
///
/// All actions in the set share the resource and (when ordering is enabled)
/// one [`OrderedScheduler`], so calls across different action names are
/// still serialized in submission order.
pub struct MutableResource<T, A, R> {
    resource: Arc<Resource<T>>,
    scheduler: OrderedScheduler,
    actions: HashMap<String, ActionRunner<T, A, R>>,
}

impl<T, A, R> MutableResource<T, A, R>
where
    T: Send + 'static,
    A: Clone + Send + 'static,
    R: Send + 'static,
{
    /// Binds `actions` to a fresh resource with the default configuration
    /// (ordering enabled).
    pub fn new(fetcher: impl Fetcher<T> + 'static, actions: ActionSet<T, A, R>) -> Self {
        Self::with_config(fetcher, actions, ActionConfig::default())
    }

    pub fn with_config(
        fetcher: impl Fetcher<T> + 'static,
        actions: ActionSet<T, A, R>,
        config: ActionConfig,
    ) -> Self {
        let resource = Arc::new(Resource::new(fetcher));
        let scheduler = OrderedScheduler::new();
        let actions = actions
            .into_actions()
            .into_iter()
            .map(|(name, action)| {
                let runner = ActionRunner::new(
                    Arc::clone(&resource),
                    scheduler.clone(),
                    action,
                    config,
                );
                (name, runner)
            })
            .collect();
        Self {
            resource,
            scheduler,
            actions,
        }
    }

    /// Fetch-if-needed on the underlying resource.
    pub async fn fetch(&self) -> Result<(), ResourceError> {
        self.resource.fetch().await
    }

    /// Always refresh (unless already refreshing).
    pub async fn force_fetch(&self) -> Result<(), ResourceError> {
        self.resource.force_fetch().await
    }

    /// Marks the resource stale and flushes the action queue: pending and
    /// not-yet-submitted actions stop mutating the outdated value, and each
    /// pending caller resolves with [`ResourceError::Cancelled`].
    ///
    /// No-op unless the resource is currently `Done`.
    pub fn stale(&self) {
        if self.resource.stale() {
            debug!("resource stale, flushing action queue");
            self.scheduler.flush();
        }
    }

    /// The underlying resource handle.
    pub fn resource(&self) -> &Arc<Resource<T>> {
        &self.resource
    }

    pub fn state(&self) -> ResourceState {
        self.resource.state()
    }

    pub fn value(&self) -> Option<T>
    where
        T: Clone,
    {
        self.resource.value()
    }

    /// Looks up a bound action by name.
    pub fn action(&self, name: &str) -> Result<&ActionRunner<T, A, R>, ResourceError> {
        self.actions
            .get(name)
            .ok_or_else(|| ResourceError::UnknownAction(name.to_string()))
    }

    /// Invokes the named action with `args`.
    pub async fn call(&self, name: &str, args: A) -> Result<(), ResourceError> {
        self.action(name)?.call(args).await
    }
}
