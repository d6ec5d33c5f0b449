//! # Fetcher Traits
//!
//! The seams between this crate and the outside world. A fetcher is an opaque
//! asynchronous operation that may succeed with a value or fail with an
//! error; the crate never inspects what it does (network, storage, anything).
//!
//! Two shapes exist:
//!
//! - **[`Fetcher<T>`]**: argument-free, bound directly to a
//!   [`crate::Resource`].
//! - **[`ArgFetcher<A, T>`]**: parameterized, used by the memoizing caches
//!   and by actions, where each call carries its own arguments.
//!
//! Both are blanket-implemented for async closures, so plain
//! `|| async { ... }` / `|args| async move { ... }` closures work everywhere
//! a fetcher is expected.

use crate::error::BoxError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

/// An argument-free asynchronous fetch operation.
#[async_trait]
pub trait Fetcher<T>: Send + Sync {
    async fn run(&self) -> Result<T, BoxError>;
}

#[async_trait]
impl<T, F, Fut> Fetcher<T> for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
{
    async fn run(&self) -> Result<T, BoxError> {
        (self)().await
    }
}

/// An asynchronous fetch operation taking one argument value.
///
/// Multiple logical arguments are passed as a tuple. The caches clone the
/// argument for every invocation, so it should be cheap to clone.
#[async_trait]
pub trait ArgFetcher<A, T>: Send + Sync {
    async fn run(&self, args: A) -> Result<T, BoxError>;
}

#[async_trait]
impl<A, T, F, Fut> ArgFetcher<A, T> for F
where
    A: Send + 'static,
    F: Fn(A) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
{
    async fn run(&self, args: A) -> Result<T, BoxError> {
        (self)(args).await
    }
}

/// Adapts a fetcher returning a list of rows into one returning a map of
/// those rows keyed by an extracted field.
///
/// Useful when the server answers with an array but lookups by identifier
/// matter more than order; the adapted fetcher plugs into a
/// [`MemoCache`](crate::MemoCache) or an action like any other. Rows with
/// duplicate keys collapse to the last one fetched.
pub fn map_by_key<A, T, K>(
    fetcher: impl ArgFetcher<A, Vec<T>> + 'static,
    key: impl Fn(&T) -> K + Send + Sync + 'static,
) -> impl ArgFetcher<A, HashMap<K, T>>
where
    A: Send + 'static,
    T: Send + 'static,
    K: Eq + Hash + Send + 'static,
{
    let fetcher = Arc::new(fetcher);
    let key = Arc::new(key);
    move |args: A| {
        let fetcher = Arc::clone(&fetcher);
        let key = Arc::clone(&key);
        async move {
            let rows = fetcher.run(args).await?;
            let map: HashMap<K, T> = rows.into_iter().map(|row| (key(&row), row)).collect();
            Ok::<_, BoxError>(map)
        }
    }
}
