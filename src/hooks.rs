//! Execution observers and the query override hook.
//!
//! Observers receive notifications around live statement execution;
//! external layers use them for auditing or write-through caching. The
//! override hook is a second-level lookup consulted after the primary
//! cache misses and before the database is touched; returning rows
//! short-circuits live execution entirely.

use crate::error::DbalResult;
use crate::executor::{Fetch, Fetched};
use crate::row::RowSet;
use crate::value::Params;
use std::sync::{Arc, RwLock};

/// Observer of statement execution. All methods have no-op defaults.
pub trait QueryObserver: Send + Sync {
    /// Called immediately before a statement is executed against the
    /// database. Not called for cache or override hits.
    fn before_execute(&self, _sql: &str, _params: &Params) {}

    /// Called after a live read completes, with the fetched rows. A
    /// write-through cache layer reacts here.
    fn after_execute(&self, _sql: &str, _params: &Params, _rows: &RowSet) {}
}

/// Substitute result source consulted before live execution.
pub trait OverrideHook: Send + Sync {
    /// Return rows to short-circuit the database, or `None` to fall
    /// through to live execution.
    fn lookup(&self, sql: &str, params: &Params) -> Option<RowSet>;
}

/// Shared, growable set of observers.
#[derive(Clone, Default)]
pub(crate) struct ObserverSet {
    observers: Arc<RwLock<Vec<Arc<dyn QueryObserver>>>>,
}

impl ObserverSet {
    pub(crate) fn add(&self, observer: Arc<dyn QueryObserver>) {
        self.lock_write().push(observer);
    }

    pub(crate) fn notify_before(&self, sql: &str, params: &Params) {
        for observer in self.lock_read().iter() {
            observer.before_execute(sql, params);
        }
    }

    pub(crate) fn notify_after(&self, sql: &str, params: &Params, rows: &RowSet) {
        for observer in self.lock_read().iter() {
            observer.after_execute(sql, params, rows);
        }
    }

    fn lock_read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<dyn QueryObserver>>> {
        self.observers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<dyn QueryObserver>>> {
        self.observers.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSet")
            .field("count", &self.lock_read().len())
            .finish()
    }
}

/// Fetch decorator that consults an [`OverrideHook`] before its inner
/// executor. Override results are flagged non-live so the cache layer
/// above neither stores them nor notifies observers.
#[derive(Clone)]
pub(crate) struct OverrideFetch<F> {
    inner: F,
    hook: Option<Arc<dyn OverrideHook>>,
}

impl<F> OverrideFetch<F> {
    pub(crate) fn new(inner: F, hook: Option<Arc<dyn OverrideHook>>) -> Self {
        Self { inner, hook }
    }
}

impl<F> std::fmt::Debug for OverrideFetch<F>
where
    F: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverrideFetch")
            .field("inner", &self.inner)
            .field("has_hook", &self.hook.is_some())
            .finish()
    }
}

impl<F: Fetch> Fetch for OverrideFetch<F> {
    async fn fetch(
        &self,
        sql: &str,
        params: &Params,
        cache: &crate::cache::CachePolicy,
    ) -> DbalResult<Fetched> {
        if let Some(hook) = &self.hook {
            if let Some(rows) = hook.lookup(sql, params) {
                tracing::debug!(sql = %sql, "Query served by override hook");
                return Ok(Fetched {
                    rows,
                    live: false,
                });
            }
        }
        self.inner.fetch(sql, params, cache).await
    }
}
