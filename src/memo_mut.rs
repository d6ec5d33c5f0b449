//! # Memoized Mutable Cache
//!
//! Composes the memoization of [`crate::memo`] with the action binding of
//! [`crate::mutable`]: each cache entry is a full [`MutableResource`]
//! (resource, scheduler, and a fresh action set bound per key), for
//! mutate-after-fetch scenarios keyed by argument.

use crate::action::{ActionConfig, ActionSet};
use crate::error::ResourceError;
use crate::fetcher::ArgFetcher;
use crate::mutable::MutableResource;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Memoization cache whose entries are [`MutableResource`]s.
///
/// Entry creation runs an action-set *factory* parameterized by the fetch
/// arguments, so mutation behavior can close over the key's arguments. For a
/// fixed action set, see [`MemoMutCache::with_actions`].
pub struct MemoMutCache<A, T, AA, R, K = String> {
    fetcher: Arc<dyn ArgFetcher<A, T>>,
    hasher: Arc<dyn Fn(&A) -> K + Send + Sync>,
    action_factory: Arc<dyn Fn(&A) -> ActionSet<T, AA, R> + Send + Sync>,
    config: ActionConfig,
    entries: Mutex<HashMap<K, Arc<MutableResource<T, AA, R>>>>,
    current: Mutex<Option<Arc<MutableResource<T, AA, R>>>>,
}

impl<A, T, AA, R> MemoMutCache<A, T, AA, R, String>
where
    A: Serialize + Clone + Send + Sync + 'static,
    T: Send + 'static,
    AA: Clone + Send + 'static,
    R: Send + 'static,
{
    /// Creates a cache with the default structural hasher and a per-key
    /// action-set factory.
    ///
    /// # Panics
    ///
    /// The default hasher panics if the arguments cannot be serialized to
    /// JSON; supply [`MemoMutCache::with_hasher`] for such argument types.
    pub fn new(
        fetcher: impl ArgFetcher<A, T> + 'static,
        action_factory: impl Fn(&A) -> ActionSet<T, AA, R> + Send + Sync + 'static,
    ) -> Self {
        Self::with_hasher(
            fetcher,
            |args: &A| {
                serde_json::to_string(args).expect("fetch arguments must serialize to JSON")
            },
            action_factory,
        )
    }

    /// Creates a cache that binds a clone of one fixed action set to every
    /// key.
    pub fn with_actions(
        fetcher: impl ArgFetcher<A, T> + 'static,
        actions: ActionSet<T, AA, R>,
    ) -> Self {
        Self::new(fetcher, move |_| actions.clone())
    }
}

impl<A, T, AA, R, K> MemoMutCache<A, T, AA, R, K>
where
    A: Clone + Send + Sync + 'static,
    T: Send + 'static,
    AA: Clone + Send + 'static,
    R: Send + 'static,
    K: Eq + Hash,
{
    /// Creates a cache with a caller-supplied key derivation strategy.
    pub fn with_hasher(
        fetcher: impl ArgFetcher<A, T> + 'static,
        hasher: impl Fn(&A) -> K + Send + Sync + 'static,
        action_factory: impl Fn(&A) -> ActionSet<T, AA, R> + Send + Sync + 'static,
    ) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            hasher: Arc::new(hasher),
            action_factory: Arc::new(action_factory),
            config: ActionConfig::default(),
            entries: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
        }
    }

    /// Overrides the action configuration bound into new entries.
    pub fn config(mut self, config: ActionConfig) -> Self {
        self.config = config;
        self
    }

    /// Fetch-if-needed for `args`; returns the composite entry so actions
    /// and per-key values are reachable.
    pub async fn fetch(&self, args: A) -> Result<Arc<MutableResource<T, AA, R>>, ResourceError> {
        let entry = self.entry_for(&args);
        entry.fetch().await?;
        Ok(entry)
    }

    /// Always refresh the entry for `args` (unless already refreshing).
    pub async fn force_fetch(
        &self,
        args: A,
    ) -> Result<Arc<MutableResource<T, AA, R>>, ResourceError> {
        let entry = self.entry_for(&args);
        entry.force_fetch().await?;
        Ok(entry)
    }

    /// The last-touched entry; same caveats as
    /// [`MemoCache::current`](crate::memo::MemoCache::current).
    pub fn current(&self) -> Option<Arc<MutableResource<T, AA, R>>> {
        self.current.lock().unwrap().clone()
    }

    /// Looks up the entry for an already-derived key.
    pub fn get(&self, key: &K) -> Option<Arc<MutableResource<T, AA, R>>> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Marks every entry stale and flushes its pending actions.
    pub fn stale(&self) {
        let entries = self.entries.lock().unwrap();
        debug!(entries = entries.len(), "marking all cache entries stale");
        for entry in entries.values() {
            entry.stale();
        }
    }

    /// Removes the named keys, or clears the whole cache when `keys` is
    /// empty.
    pub fn delete(&self, keys: &[K]) {
        let mut entries = self.entries.lock().unwrap();
        let removed: Vec<Arc<MutableResource<T, AA, R>>> = if keys.is_empty() {
            entries.drain().map(|(_, entry)| entry).collect()
        } else {
            keys.iter().filter_map(|key| entries.remove(key)).collect()
        };
        drop(entries);

        let mut current = self.current.lock().unwrap();
        if let Some(entry) = current.as_ref() {
            if removed.iter().any(|removed| Arc::ptr_eq(removed, entry)) {
                *current = None;
            }
        }
    }

    fn entry_for(&self, args: &A) -> Arc<MutableResource<T, AA, R>> {
        let key = (self.hasher)(args);
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .entry(key)
            .or_insert_with(|| {
                debug!("inserting new mutable cache entry");
                let fetcher = Arc::clone(&self.fetcher);
                let entry_args = args.clone();
                let actions = (self.action_factory)(args);
                Arc::new(MutableResource::with_config(
                    move || {
                        let fetcher = Arc::clone(&fetcher);
                        let args = entry_args.clone();
                        async move { fetcher.run(args).await }
                    },
                    actions,
                    self.config,
                ))
            })
            .clone();
        drop(entries);

        *self.current.lock().unwrap() = Some(Arc::clone(&entry));
        entry
    }
}
