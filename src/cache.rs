//! Look-aside query caching.
//!
//! The cache stores JSON-serialized row sets keyed by a hash of the trimmed
//! statement text plus the canonical parameter serialization. Tags are
//! opaque labels persisted alongside each entry; invalidating by tag is the
//! cache store's job, never this layer's. A malformed cached payload counts
//! as a miss and falls through to live execution.

use crate::error::DbalResult;
use crate::executor::{Fetch, Fetched};
use crate::hooks::ObserverSet;
use crate::row::RowSet;
use crate::value::Params;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long a cached query result stays visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheLifetime {
    /// Do not consult or populate the cache for this query.
    #[default]
    Disabled,
    /// Cache without expiry; the store may still evict.
    NeverExpire,
    /// Cache for the given number of seconds. Zero disables caching.
    Secs(u64),
}

impl CacheLifetime {
    /// Whether this lifetime allows a cache entry at all.
    pub fn allows_caching(&self) -> bool {
        match self {
            Self::Disabled => false,
            Self::NeverExpire => true,
            Self::Secs(n) => *n > 0,
        }
    }
}

/// Caching instructions for one query call.
#[derive(Debug, Clone, Default)]
pub struct CachePolicy {
    pub lifetime: CacheLifetime,
    pub tags: Vec<String>,
}

impl CachePolicy {
    /// No caching (the default).
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Cache without expiry.
    pub fn never_expire() -> Self {
        Self {
            lifetime: CacheLifetime::NeverExpire,
            tags: Vec::new(),
        }
    }

    /// Cache for the given number of seconds.
    pub fn secs(secs: u64) -> Self {
        Self {
            lifetime: CacheLifetime::Secs(secs),
            tags: Vec::new(),
        }
    }

    /// Attach invalidation tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// External cache store contract: an opaque key/value store with tag
/// metadata. This layer never performs invalidation through it.
pub trait QueryCache: Send + Sync {
    /// Load a serialized entry, or `None` on a miss.
    fn load(&self, key: &str) -> Option<String>;

    /// Persist a serialized entry under `key` with its tags and lifetime.
    fn save(&self, value: String, key: &str, tags: &[String], lifetime: CacheLifetime);
}

/// Derive the cache key for a statement.
///
/// Statements with identical trimmed text and canonical parameters collide
/// by design; the key carries no schema namespace.
pub fn cache_key(sql: &str, params: &Params) -> String {
    let digest = md5::compute(format!("{}{}", sql.trim(), params.canonical_json()));
    format!("sql:{:x}", digest)
}

/// Fetch decorator implementing the look-aside cache around its inner
/// fetch path. On a live inner result it stores the rows and notifies
/// observers; cache hits and override hits do neither.
#[derive(Clone)]
pub(crate) struct CachedFetch<F> {
    inner: F,
    cache: Option<Arc<dyn QueryCache>>,
    use_cache: Arc<AtomicBool>,
    debug_bypass: bool,
    observers: ObserverSet,
}

impl<F> CachedFetch<F> {
    pub(crate) fn new(
        inner: F,
        cache: Option<Arc<dyn QueryCache>>,
        use_cache: Arc<AtomicBool>,
        debug_bypass: bool,
        observers: ObserverSet,
    ) -> Self {
        Self {
            inner,
            cache,
            use_cache,
            debug_bypass,
            observers,
        }
    }

    fn cache_enabled(&self, lifetime: CacheLifetime) -> bool {
        self.cache.is_some()
            && self.use_cache.load(Ordering::Relaxed)
            && !self.debug_bypass
            && lifetime.allows_caching()
    }
}

impl<F: Fetch> Fetch for CachedFetch<F> {
    async fn fetch(&self, sql: &str, params: &Params, policy: &CachePolicy) -> DbalResult<Fetched> {
        let enabled = self.cache_enabled(policy.lifetime);
        let key = enabled.then(|| cache_key(sql, params));

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(payload) = cache.load(key) {
                // A payload that fails to deserialize is a miss.
                if let Ok(rows) = serde_json::from_str::<RowSet>(&payload) {
                    tracing::debug!(key = %key, "Query cache hit");
                    return Ok(Fetched { rows, live: false });
                }
                tracing::warn!(key = %key, "Discarding malformed cache entry");
            }
        }

        let fetched = self.inner.fetch(sql, params, policy).await?;

        if fetched.live {
            if let (Some(cache), Some(key)) = (&self.cache, &key) {
                if let Ok(payload) = serde_json::to_string(&fetched.rows) {
                    cache.save(payload, key, &policy.tags, policy.lifetime);
                    tracing::debug!(key = %key, tags = ?policy.tags, "Query result cached");
                }
            }
            self.observers.notify_after(sql, params, &fetched.rows);
        }

        Ok(fetched)
    }
}

struct MemoryEntry {
    value: String,
    tags: Vec<String>,
    expires_at: Option<Instant>,
}

/// In-process [`QueryCache`] store.
///
/// Doubles as the reference implementation of the store side of the
/// contract: it owns tag bookkeeping and exposes [`invalidate_tag`]
/// accordingly.
///
/// [`invalidate_tag`]: MemoryCache::invalidate_tag
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every entry carrying the given tag.
    pub fn invalidate_tag(&self, tag: &str) {
        self.lock().retain(|_, e| !e.tags.iter().any(|t| t == tag));
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of stored entries, including not-yet-collected expired ones.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, MemoryEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl QueryCache for MemoryCache {
    fn load(&self, key: &str) -> Option<String> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) => {
                if entry.expires_at.is_some_and(|at| Instant::now() >= at) {
                    entries.remove(key);
                    return None;
                }
                Some(entry.value.clone())
            }
            None => None,
        }
    }

    fn save(&self, value: String, key: &str, tags: &[String], lifetime: CacheLifetime) {
        let expires_at = match lifetime {
            CacheLifetime::Secs(n) if n > 0 => Some(Instant::now() + Duration::from_secs(n)),
            CacheLifetime::NeverExpire => None,
            // Callers should not get here with a disabled lifetime; treat
            // it as immediately expired rather than storing forever.
            CacheLifetime::Disabled | CacheLifetime::Secs(_) => Some(Instant::now()),
        };
        self.lock().insert(
            key.to_string(),
            MemoryEntry {
                value,
                tags: tags.to_vec(),
                expires_at,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_trims_sql() {
        let params = Params::positional([1i64]);
        assert_eq!(
            cache_key("  SELECT 1  ", &params),
            cache_key("SELECT 1", &params)
        );
    }

    #[test]
    fn test_cache_key_differs_by_params() {
        let sql = "SELECT * FROM account WHERE id = ?";
        assert_ne!(
            cache_key(sql, &Params::positional([1i64])),
            cache_key(sql, &Params::positional([2i64]))
        );
    }

    #[test]
    fn test_lifetime_allows_caching() {
        assert!(!CacheLifetime::Disabled.allows_caching());
        assert!(!CacheLifetime::Secs(0).allows_caching());
        assert!(CacheLifetime::Secs(60).allows_caching());
        assert!(CacheLifetime::NeverExpire.allows_caching());
    }

    #[test]
    fn test_memory_cache_round_trip() {
        let cache = MemoryCache::new();
        cache.save(
            "payload".to_string(),
            "k1",
            &["tag-a".to_string()],
            CacheLifetime::Secs(60),
        );
        assert_eq!(cache.load("k1"), Some("payload".to_string()));
        assert_eq!(cache.load("missing"), None);
    }

    #[test]
    fn test_memory_cache_tag_invalidation() {
        let cache = MemoryCache::new();
        cache.save(
            "a".to_string(),
            "k1",
            &["users".to_string()],
            CacheLifetime::NeverExpire,
        );
        cache.save(
            "b".to_string(),
            "k2",
            &["topics".to_string()],
            CacheLifetime::NeverExpire,
        );

        cache.invalidate_tag("users");
        assert_eq!(cache.load("k1"), None);
        assert_eq!(cache.load("k2"), Some("b".to_string()));
    }

    #[test]
    fn test_memory_cache_expiry() {
        let cache = MemoryCache::new();
        cache.save("v".to_string(), "k", &[], CacheLifetime::Secs(0));
        // Secs(0) stores an already-expired entry
        assert_eq!(cache.load("k"), None);
        assert!(cache.is_empty());
    }
}
