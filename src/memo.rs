//! # Memoized Resource Cache
//!
//! Maps fetch arguments to independent [`Resource`] instances: each distinct
//! key gets its own state machine, so fetches for different arguments never
//! interfere, and refetching previously seen arguments reuses the cached
//! entry instead of the fetcher.

use crate::error::ResourceError;
use crate::fetcher::ArgFetcher;
use crate::resource::Resource;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Memoization cache keying [`Resource`] instances by a hash of the fetch
/// arguments.
///
/// The key is derived by a pluggable hasher. The default (for
/// `A: Serialize`) is the canonical JSON serialization of the argument, so
/// structurally equal arguments share an entry.
///
/// # Example
///
/// ```
/// use fetch_cell::MemoCache;
///
/// #[tokio::main]
/// async fn main() {
///     let cache = MemoCache::new(|n: u32| async move {
///         Ok::<_, fetch_cell::BoxError>(n * 2)
///     });
///
///     let entry = cache.fetch(21).await.unwrap();
///     assert_eq!(entry.value(), Some(42));
///     assert_eq!(cache.len(), 1);
/// }
/// ```
pub struct MemoCache<A, T, K = String> {
    fetcher: Arc<dyn ArgFetcher<A, T>>,
    hasher: Arc<dyn Fn(&A) -> K + Send + Sync>,
    entries: Mutex<HashMap<K, Arc<Resource<T>>>>,
    current: Mutex<Option<Arc<Resource<T>>>>,
}

impl<A, T> MemoCache<A, T, String>
where
    A: Serialize + Clone + Send + Sync + 'static,
    T: Send + 'static,
{
    /// Creates a cache with the default structural hasher.
    ///
    /// # Panics
    ///
    /// The default hasher panics if the arguments cannot be serialized to
    /// JSON; supply [`MemoCache::with_hasher`] for such argument types.
    pub fn new(fetcher: impl ArgFetcher<A, T> + 'static) -> Self {
        Self::with_hasher(fetcher, |args: &A| {
            serde_json::to_string(args).expect("fetch arguments must serialize to JSON")
        })
    }
}

impl<A, T, K> MemoCache<A, T, K>
where
    A: Clone + Send + Sync + 'static,
    T: Send + 'static,
    K: Eq + Hash,
{
    /// Creates a cache with a caller-supplied key derivation strategy.
    pub fn with_hasher(
        fetcher: impl ArgFetcher<A, T> + 'static,
        hasher: impl Fn(&A) -> K + Send + Sync + 'static,
    ) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            hasher: Arc::new(hasher),
            entries: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
        }
    }

    /// Fetch-if-needed for `args`; returns the entry so per-key results can
    /// be read directly.
    pub async fn fetch(&self, args: A) -> Result<Arc<Resource<T>>, ResourceError> {
        let entry = self.entry_for(&args);
        entry.fetch().await?;
        Ok(entry)
    }

    /// Always refresh the entry for `args` (unless already refreshing).
    pub async fn force_fetch(&self, args: A) -> Result<Arc<Resource<T>>, ResourceError> {
        let entry = self.entry_for(&args);
        entry.force_fetch().await?;
        Ok(entry)
    }

    /// The last-touched entry.
    ///
    /// Updated on every `fetch`/`force_fetch` regardless of key, so under
    /// concurrent multi-key use this points at whichever call touched the
    /// cache last. Callers needing per-key results should use the entry
    /// handle returned by `fetch`, or [`MemoCache::get`].
    pub fn current(&self) -> Option<Arc<Resource<T>>> {
        self.current.lock().unwrap().clone()
    }

    /// Looks up the entry for an already-derived key.
    pub fn get(&self, key: &K) -> Option<Arc<Resource<T>>> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Marks every cached entry stale. Cache-wide invalidation, not
    /// selective.
    pub fn stale(&self) {
        let entries = self.entries.lock().unwrap();
        debug!(entries = entries.len(), "marking all cache entries stale");
        for entry in entries.values() {
            entry.stale();
        }
    }

    /// Removes the named keys, or clears the whole cache when `keys` is
    /// empty. The `current` pointer is dropped if its entry is removed.
    pub fn delete(&self, keys: &[K]) {
        let mut entries = self.entries.lock().unwrap();
        let removed: Vec<Arc<Resource<T>>> = if keys.is_empty() {
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

    /// Get-or-insert the entry for `args` and point `current` at it.
    fn entry_for(&self, args: &A) -> Arc<Resource<T>> {
        let key = (self.hasher)(args);
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .entry(key)
            .or_insert_with(|| {
                debug!("inserting new cache entry");
                let fetcher = Arc::clone(&self.fetcher);
                let args = args.clone();
                Arc::new(Resource::new(move || {
                    let fetcher = Arc::clone(&fetcher);
                    let args = args.clone();
                    async move { fetcher.run(args).await }
                }))
            })
            .clone();
        drop(entries);

        *self.current.lock().unwrap() = Some(Arc::clone(&entry));
        entry
    }
}
