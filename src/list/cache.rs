//! Keyed Request Cache
//!
//! Results are cached per key and concurrent requests for the same key share
//! one underlying call. Failures are handed to every waiter and are never
//! cached, so the next request retries.

use crate::error::{ListError, ListResult};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Canonical JSON of the request parameters; object keys are sorted so
/// equal parameters always produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(params: &impl Serialize) -> ListResult<Self> {
        let value = serde_json::to_value(params).map_err(ListError::from)?;
        let mut out = String::new();
        write_canonical(&value, &mut out);
        Ok(Self(out))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// How long results stay valid
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePolicy {
    /// `None` keeps results until invalidated
    pub ttl: Option<Duration>,
}

impl CachePolicy {
    pub fn session() -> Self {
        Self { ttl: None }
    }

    pub fn ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl) }
    }
}

type SharedFetch<V> = Shared<BoxFuture<'static, ListResult<V>>>;

struct Stored<V> {
    value: V,
    stored_at: Instant,
}

struct Pending<V> {
    fetch: SharedFetch<V>,
    /// Cleared by `invalidate` and `clear` so the settled result is not stored
    store: bool,
}

struct Inner<V> {
    results: HashMap<CacheKey, Stored<V>>,
    in_flight: HashMap<CacheKey, Pending<V>>,
}

pub struct RequestCache<V> {
    inner: Arc<Mutex<Inner<V>>>,
    policy: CachePolicy,
}

impl<V> Clone for RequestCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            policy: self.policy,
        }
    }
}

impl<V> RequestCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                results: HashMap::new(),
                in_flight: HashMap::new(),
            })),
            policy,
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Return the cached result for `key`, join an in-flight request for it,
    /// or start `fetch`.
    pub async fn get_or_fetch<F, Fut>(&self, key: CacheKey, fetch: F) -> ListResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ListResult<V>> + Send + 'static,
    {
        let shared = {
            let mut inner = self.inner.lock();

            if let Some(ttl) = self.policy.ttl {
                let before = inner.results.len();
                inner.results.retain(|_, stored| stored.stored_at.elapsed() < ttl);
                let expired = before - inner.results.len();
                if expired > 0 {
                    tracing::debug!("Evicted {} expired cache entries", expired);
                }
            }

            if let Some(stored) = inner.results.get(&key) {
                tracing::trace!("Cache hit: {}", key);
                return Ok(stored.value.clone());
            }

            let joined = inner.in_flight.get(&key).map(|pending| pending.fetch.clone());
            match joined {
                Some(fetch) => {
                    tracing::trace!("Joining in-flight request: {}", key);
                    fetch
                }
                None => {
                    let fetch = self.settle(key.clone(), fetch());
                    inner.in_flight.insert(
                        key,
                        Pending {
                            fetch: fetch.clone(),
                            store: true,
                        },
                    );
                    fetch
                }
            }
        };

        shared.await
    }

    /// Drop the cached result for `key`. A request already in flight keeps
    /// serving its waiters and new callers, but its result is not stored.
    pub fn invalidate(&self, key: &CacheKey) {
        let mut inner = self.inner.lock();
        inner.results.remove(key);
        if let Some(pending) = inner.in_flight.get_mut(key) {
            pending.store = false;
        }
    }

    /// Drop every cached result; in-flight requests finish without storing
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.results.clear();
        for pending in inner.in_flight.values_mut() {
            pending.store = false;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wrap a fetch so that completion retires the in-flight entry and
    /// stores the result, unless the key was invalidated meanwhile.
    fn settle<Fut>(&self, key: CacheKey, fetch: Fut) -> SharedFetch<V>
    where
        Fut: Future<Output = ListResult<V>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        async move {
            let result = fetch.await;

            let mut guard = inner.lock();
            let store = guard
                .in_flight
                .remove(&key)
                .is_some_and(|pending| pending.store);
            match &result {
                Ok(value) if store => {
                    guard.results.insert(
                        key,
                        Stored {
                            value: value.clone(),
                            stored_at: Instant::now(),
                        },
                    );
                }
                Ok(_) => tracing::debug!("Not caching invalidated request {}", key),
                Err(err) => tracing::debug!("Not caching failed request {}: {}", key, err),
            }

            result
        }
        .boxed()
        .shared()
    }
}

impl<V> Default for RequestCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(CachePolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_fetch(
        calls: &Arc<AtomicUsize>,
        result: ListResult<u64>,
    ) -> impl Future<Output = ListResult<u64>> + Send + 'static {
        let calls = Arc::clone(calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            result
        }
    }

    #[test]
    fn test_key_ignores_object_order() {
        let a = CacheKey::new(&json!({"vendor": "aws", "page": {"limit": 50, "start": 0}})).unwrap();
        let b = CacheKey::new(&json!({"page": {"start": 0, "limit": 50}, "vendor": "aws"})).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), r#"{"page":{"limit":50,"start":0},"vendor":"aws"}"#);

        let c = CacheKey::new(&json!({"vendor": "gcp"})).unwrap();
        assert_ne!(a, c);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_share_one_call() {
        let cache = RequestCache::new(CachePolicy::session());
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new(&json!({"vendor": "aws"})).unwrap();

        let (a, b) = tokio::join!(
            cache.get_or_fetch(key.clone(), || counting_fetch(&calls, Ok(7))),
            cache.get_or_fetch(key.clone(), || counting_fetch(&calls, Ok(8))),
        );
        assert_eq!(a, Ok(7));
        assert_eq!(b, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // settled: served from the cache
        let c = cache.get_or_fetch(key, || counting_fetch(&calls, Ok(9))).await;
        assert_eq!(c, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_shared_and_not_cached() {
        let cache = RequestCache::new(CachePolicy::session());
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new(&"regions").unwrap();
        let failure = ListError::transport(Some(500), "boom");

        let (a, b) = tokio::join!(
            cache.get_or_fetch(key.clone(), || counting_fetch(&calls, Err(failure.clone()))),
            cache.get_or_fetch(key.clone(), || counting_fetch(&calls, Ok(1))),
        );
        assert_eq!(a, Err(failure.clone()));
        assert_eq!(b, Err(failure));
        assert!(cache.is_empty());

        let retry = cache.get_or_fetch(key, || counting_fetch(&calls, Ok(3))).await;
        assert_eq!(retry, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_refetches() {
        let cache = RequestCache::new(CachePolicy::ttl(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new(&1).unwrap();

        assert_eq!(cache.get_or_fetch(key.clone(), || counting_fetch(&calls, Ok(1))).await, Ok(1));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cache.get_or_fetch(key.clone(), || counting_fetch(&calls, Ok(2))).await, Ok(1));
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cache.get_or_fetch(key, || counting_fetch(&calls, Ok(3))).await, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    /// Tracks how many fetches run at the same time
    #[derive(Default)]
    struct Gauge {
        calls: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    fn gauged_fetch(
        gauge: &Arc<Gauge>,
        result: ListResult<u64>,
    ) -> impl Future<Output = ListResult<u64>> + Send + 'static {
        let gauge = Arc::clone(gauge);
        async move {
            gauge.calls.fetch_add(1, Ordering::SeqCst);
            let now = gauge.active.fetch_add(1, Ordering::SeqCst) + 1;
            gauge.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            gauge.active.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_during_flight_keeps_single_request() {
        let cache = RequestCache::new(CachePolicy::session());
        let gauge = Arc::new(Gauge::default());
        let key = CacheKey::new(&"k").unwrap();

        let (first, second) = tokio::join!(
            cache.get_or_fetch(key.clone(), || gauged_fetch(&gauge, Ok(1))),
            async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                cache.invalidate(&key);
                cache.get_or_fetch(key.clone(), || gauged_fetch(&gauge, Ok(2))).await
            }
        );
        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(1));
        assert_eq!(gauge.calls.load(Ordering::SeqCst), 1);
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
        // the invalidated result was not stored
        assert!(cache.is_empty());

        assert_eq!(cache.get_or_fetch(key, || gauged_fetch(&gauge, Ok(3))).await, Ok(3));
        assert_eq!(gauge.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_during_flight_keeps_single_request() {
        let cache = RequestCache::new(CachePolicy::session());
        let gauge = Arc::new(Gauge::default());
        let key = CacheKey::new(&"k").unwrap();

        let (first, second) = tokio::join!(
            cache.get_or_fetch(key.clone(), || gauged_fetch(&gauge, Ok(1))),
            async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                cache.clear();
                cache.get_or_fetch(key.clone(), || gauged_fetch(&gauge, Ok(2))).await
            }
        );
        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(1));
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_of_other_keys_are_evicted() {
        let cache = RequestCache::new(CachePolicy::ttl(Duration::from_secs(60)));
        let gauge = Arc::new(Gauge::default());
        let old = CacheKey::new(&"old").unwrap();
        let new = CacheKey::new(&"new").unwrap();

        cache.get_or_fetch(old.clone(), || gauged_fetch(&gauge, Ok(1))).await.unwrap();
        assert_eq!(cache.len(), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        cache.get_or_fetch(new.clone(), || gauged_fetch(&gauge, Ok(2))).await.unwrap();

        assert_eq!(cache.len(), 1);
        let inner = cache.inner.lock();
        assert!(!inner.results.contains_key(&old));
        assert!(inner.results.contains_key(&new));
    }

    #[tokio::test]
    async fn test_clear() {
        let cache: RequestCache<u64> = RequestCache::default();
        let key = CacheKey::new(&"k").unwrap();
        cache.get_or_fetch(key, || async { Ok(5) }).await.unwrap();
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
