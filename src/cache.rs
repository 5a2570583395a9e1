//! Read-through memoizing cache for GET requests.
//!
//! Entries live for a fixed TTL measured on an injected [`Clock`]. Concurrent
//! reads of the same missing key share one fetch. `invalidate_all` drops every
//! entry and every in-flight slot and bumps a generation counter, so a fetch
//! that started before the invalidation never writes its result back.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use serde_json::{json, Value};

use crate::api::ApiError;
use crate::logging::log_cache;

// =============================================================================
// Clock
// =============================================================================

pub trait Clock: Send + Sync {
    /// Milliseconds on a monotonic-enough timeline.
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis() as u64
    }
}

/// Test clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self { now: AtomicU64::new(start_ms) }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Cache keys
// =============================================================================

/// Query parameters in key order with absent values dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams(BTreeMap<String, Value>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn with_opt<V: Into<Value>>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with(key, v),
            None => self,
        }
    }

    /// Flattens a params struct; `None` fields serialize to null and are dropped.
    pub fn from_serializable<T: Serialize>(params: &T) -> Result<Self, ApiError> {
        match serde_json::to_value(params)? {
            Value::Object(map) => Ok(Self(
                map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
            )),
            Value::Null => Ok(Self::new()),
            other => Err(ApiError::Decode(format!("query params must be an object, got {}", other))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Deterministic serialization: keys sorted, no whitespace.
    pub fn canonical(&self) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        Value::Object(self.0.clone().into_iter().collect()).to_string()
    }

    /// Pairs for the HTTP query string. Strings go out unquoted.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(k, v)| {
                let rendered = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), rendered)
            })
            .collect()
    }
}

pub fn cache_key(endpoint: &str, params: &QueryParams) -> String {
    format!("{}?{}", endpoint, params.canonical())
}

// =============================================================================
// Cache
// =============================================================================

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub key: String,
    pub value: T,
    pub expires_at_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub expired: u64,
    pub invalidations: u64,
    pub stale_fills_dropped: u64,
}

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, ApiError>>>;

struct InFlight<T> {
    id: u64,
    generation: u64,
    future: SharedFetch<T>,
}

struct CacheState<T> {
    entries: HashMap<String, CacheEntry<T>>,
    in_flight: HashMap<String, InFlight<T>>,
    generation: u64,
    next_flight_id: u64,
    stats: CacheStats,
}

pub struct RequestCache<T> {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    state: Mutex<CacheState<T>>,
}

impl<T> RequestCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            ttl,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
                generation: 0,
                next_flight_id: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn with_system_clock(ttl: Duration) -> Self {
        Self::new(ttl, Arc::new(SystemClock))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn ttl_ms(&self) -> u64 {
        u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<T>> {
        // State is only mutated in short non-panicking sections.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the cached value for `endpoint`/`params`, fetching it on a miss.
    ///
    /// A hit never calls `fetch`. A miss while another caller is already
    /// fetching the same key waits on that fetch instead of starting a new
    /// one. Only successful results are stored.
    pub async fn get<F, Fut>(&self, endpoint: &str, params: &QueryParams, fetch: F) -> Result<T, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let key = cache_key(endpoint, params);
        self.get_keyed(key, fetch).await
    }

    async fn get_keyed<F, Fut>(&self, key: String, fetch: F) -> Result<T, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let (future, flight_id, generation, owner) = {
            let mut state = self.lock();
            if let Some(value) = Self::lookup(&mut state, &key, self.clock.now_ms()) {
                return Ok(value);
            }
            if let Some(flight) = state.in_flight.get(&key) {
                let joined = (flight.future.clone(), flight.id, flight.generation);
                state.stats.coalesced += 1;
                log_cache("coalesced", &key, &[]);
                (joined.0, joined.1, joined.2, false)
            } else {
                state.stats.misses += 1;
                let id = state.next_flight_id;
                state.next_flight_id += 1;
                let generation = state.generation;
                let future = fetch().boxed().shared();
                state.in_flight.insert(
                    key.clone(),
                    InFlight { id, generation, future: future.clone() },
                );
                log_cache("miss", &key, &[]);
                (future, id, generation, true)
            }
        };

        let result = future.await;
        self.complete(&key, flight_id, generation, owner, &result);
        result
    }

    /// Every waiter runs this; only the first one to find its flight still
    /// registered clears the slot and stores the value. A flight cleared by
    /// `invalidate_all` is counted as dropped once, by the caller that started it.
    fn complete(
        &self,
        key: &str,
        flight_id: u64,
        generation: u64,
        owner: bool,
        result: &Result<T, ApiError>,
    ) {
        let mut state = self.lock();
        let owns_slot = state.in_flight.get(key).map(|f| f.id) == Some(flight_id);
        if !owns_slot {
            if owner && result.is_ok() && state.generation != generation {
                state.stats.stale_fills_dropped += 1;
                log_cache("stale_fill_dropped", key, &[]);
            }
            return;
        }
        state.in_flight.remove(key);
        match result {
            Ok(value) if state.generation == generation => {
                let expires_at_ms = self.clock.now_ms().saturating_add(self.ttl_ms());
                state.entries.insert(
                    key.to_string(),
                    CacheEntry { key: key.to_string(), value: value.clone(), expires_at_ms },
                );
                log_cache("fill", key, &[("expires_at_ms", json!(expires_at_ms))]);
            }
            Ok(_) => {
                state.stats.stale_fills_dropped += 1;
                log_cache("stale_fill_dropped", key, &[]);
            }
            Err(err) => {
                log_cache("fetch_failed", key, &[("kind", json!(err.kind().as_str()))]);
            }
        }
    }

    fn lookup(state: &mut CacheState<T>, key: &str, now_ms: u64) -> Option<T> {
        let fresh = match state.entries.get(key) {
            Some(entry) if now_ms < entry.expires_at_ms => Some(entry.value.clone()),
            Some(_) => None,
            None => return None,
        };
        match fresh {
            Some(value) => {
                state.stats.hits += 1;
                log_cache("hit", key, &[]);
                Some(value)
            }
            None => {
                state.entries.remove(key);
                state.stats.expired += 1;
                log_cache("expired", key, &[]);
                None
            }
        }
    }

    /// Synchronous hit check; never fetches.
    pub fn peek(&self, endpoint: &str, params: &QueryParams) -> Option<T> {
        let key = cache_key(endpoint, params);
        let mut state = self.lock();
        Self::lookup(&mut state, &key, self.clock.now_ms())
    }

    pub fn invalidate_all(&self) {
        let mut state = self.lock();
        let dropped = state.entries.len();
        state.entries.clear();
        state.in_flight.clear();
        state.generation += 1;
        state.stats.invalidations += 1;
        log_cache(
            "invalidate_all",
            "*",
            &[("dropped", json!(dropped)), ("generation", json!(state.generation))],
        );
    }

    /// Number of stored entries, expired ones included until next touched.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn cache(clock: Arc<ManualClock>) -> RequestCache<u32> {
        RequestCache::new(Duration::from_secs(60), clock)
    }

    fn counting_fetch(
        counter: &Arc<AtomicU32>,
        value: u32,
    ) -> impl FnOnce() -> futures_util::future::Ready<Result<u32, ApiError>> {
        let counter = counter.clone();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            futures_util::future::ready(Ok(value))
        }
    }

    #[test]
    fn test_key_is_order_independent() {
        let a = QueryParams::new().with("a", 1).with("b", 2);
        let b = QueryParams::new().with("b", 2).with("a", 1);
        assert_eq!(cache_key("/x", &a), cache_key("/x", &b));
        assert_eq!(cache_key("/x", &a), "/x?{\"a\":1,\"b\":2}");
    }

    #[test]
    fn test_absent_params_dropped() {
        let with_none = QueryParams::new().with("page", 1).with_opt("status", None::<String>);
        let without = QueryParams::new().with("page", 1);
        assert_eq!(with_none, without);
        assert_eq!(cache_key("/tasks", &QueryParams::new()), "/tasks?");
    }

    #[test]
    fn test_from_serializable_drops_nulls() {
        #[derive(Serialize)]
        struct P {
            page: Option<u32>,
            status: Option<String>,
        }
        let p = QueryParams::from_serializable(&P { page: Some(2), status: None }).unwrap();
        assert_eq!(p.canonical(), "{\"page\":2}");
        assert_eq!(p.to_query_pairs(), vec![("page".to_string(), "2".to_string())]);
    }

    #[test]
    fn test_query_pairs_unquote_strings() {
        let p = QueryParams::new().with("user_key", "u-1").with("page", 3);
        assert_eq!(
            p.to_query_pairs(),
            vec![
                ("page".to_string(), "3".to_string()),
                ("user_key".to_string(), "u-1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_hit_skips_fetch() {
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = cache(clock);
        let counter = Arc::new(AtomicU32::new(0));
        let params = QueryParams::new().with("page", 1);

        assert_eq!(cache.get("/t", &params, counting_fetch(&counter, 7)).await.unwrap(), 7);
        assert_eq!(cache.get("/t", &params, counting_fetch(&counter, 8)).await.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(cache.peek("/t", &params), Some(7));
        assert_eq!(cache.stats().hits, 2);
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(clock.clone());
        let counter = Arc::new(AtomicU32::new(0));
        let params = QueryParams::new();

        cache.get("/t", &params, counting_fetch(&counter, 1)).await.unwrap();
        clock.advance(Duration::from_millis(59_999));
        assert_eq!(cache.peek("/t", &params), Some(1));

        clock.advance(Duration::from_millis(2));
        assert_eq!(cache.peek("/t", &params), None);
        assert!(cache.is_empty(), "expired entry removed lazily");

        assert_eq!(cache.get("/t", &params, counting_fetch(&counter, 2)).await.unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expiry_boundary_is_exclusive() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(clock.clone());
        let counter = Arc::new(AtomicU32::new(0));
        cache.get("/t", &QueryParams::new(), counting_fetch(&counter, 1)).await.unwrap();
        clock.set(60_000);
        assert_eq!(cache.peek("/t", &QueryParams::new()), None);
    }

    #[tokio::test]
    async fn test_invalidate_all_forces_refetch() {
        let cache = cache(Arc::new(ManualClock::new(0)));
        let counter = Arc::new(AtomicU32::new(0));
        let p1 = QueryParams::new().with("page", 1);
        let p2 = QueryParams::new().with("page", 2);

        cache.get("/a", &p1, counting_fetch(&counter, 1)).await.unwrap();
        cache.get("/b", &p2, counting_fetch(&counter, 2)).await.unwrap();
        assert_eq!(cache.len(), 2);

        cache.invalidate_all();
        assert!(cache.is_empty());
        assert_eq!(cache.peek("/a", &p1), None);

        cache.get("/a", &p1, counting_fetch(&counter, 3)).await.unwrap();
        cache.get("/b", &p2, counting_fetch(&counter, 4)).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[tokio::test]
    async fn test_errors_not_cached() {
        let cache = cache(Arc::new(ManualClock::new(0)));
        let params = QueryParams::new();

        let err = cache
            .get("/t", &params, || async { Err::<u32, _>(ApiError::Transport("down".into())) })
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::Transport("down".into()));
        assert!(cache.is_empty());
        assert_eq!(cache.in_flight(), 0);

        let ok = cache.get("/t", &params, || async { Ok::<u32, ApiError>(5) }).await.unwrap();
        assert_eq!(ok, 5);
    }

    #[tokio::test]
    async fn test_concurrent_gets_share_one_fetch() {
        let cache = cache(Arc::new(ManualClock::new(0)));
        let counter = Arc::new(AtomicU32::new(0));
        let params = QueryParams::new().with("page", 1);
        let (tx, rx) = tokio::sync::oneshot::channel::<u32>();

        let c1 = counter.clone();
        let first = cache.get("/slow", &params, move || {
            c1.fetch_add(1, Ordering::SeqCst);
            async move { rx.await.map_err(|_| ApiError::Cancelled) }
        });
        let c2 = counter.clone();
        let second = cache.get("/slow", &params, move || {
            c2.fetch_add(1, Ordering::SeqCst);
            async { Ok::<u32, ApiError>(99) }
        });
        let release = async {
            tokio::task::yield_now().await;
            let _ = tx.send(42);
        };

        let (a, b, _) = tokio::join!(first, second, release);
        assert_eq!(a.unwrap(), 42);
        assert_eq!(b.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().coalesced, 1);
        assert_eq!(cache.peek("/slow", &params), Some(42));
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_fetch_in_flight_across_invalidation_not_stored() {
        let cache = cache(Arc::new(ManualClock::new(0)));
        let params = QueryParams::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<u32>();

        let read = cache.get("/t", &params, move || async move {
            rx.await.map_err(|_| ApiError::Cancelled)
        });
        let write = async {
            tokio::task::yield_now().await;
            cache.invalidate_all();
            let _ = tx.send(1);
        };

        let (value, _) = tokio::join!(read, write);
        assert_eq!(value.unwrap(), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().stale_fills_dropped, 1);
    }

    #[tokio::test]
    async fn test_dropped_fill_counted_once_for_all_waiters() {
        let cache = cache(Arc::new(ManualClock::new(0)));
        let params = QueryParams::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<u32>();

        let owner = cache.get("/t", &params, move || async move {
            rx.await.map_err(|_| ApiError::Cancelled)
        });
        let waiter_a = cache.get("/t", &params, || async { Ok::<u32, ApiError>(0) });
        let waiter_b = cache.get("/t", &params, || async { Ok::<u32, ApiError>(0) });
        let write = async {
            tokio::task::yield_now().await;
            cache.invalidate_all();
            let _ = tx.send(3);
        };

        let (a, b, c, _) = tokio::join!(owner, waiter_a, waiter_b, write);
        assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), (3, 3, 3));
        assert_eq!(cache.stats().coalesced, 2);
        assert_eq!(cache.stats().stale_fills_dropped, 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_huge_ttl_saturates() {
        let clock = Arc::new(ManualClock::new(5_000));
        let cache: RequestCache<u32> = RequestCache::new(Duration::from_secs(u64::MAX), clock.clone());
        let counter = Arc::new(AtomicU32::new(0));

        cache.get("/t", &QueryParams::new(), counting_fetch(&counter, 1)).await.unwrap();
        clock.advance(Duration::from_secs(86_400 * 365));
        assert_eq!(cache.peek("/t", &QueryParams::new()), Some(1));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
