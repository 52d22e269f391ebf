// ── Request gate and read cache ──
//
// One `RateLimiterCache` per device. Every outbound request, read or write,
// passes through the same async mutex so requests to a device are strictly
// serialized, spaced by `min_request_interval`, and held back after a write
// for `write_cooldown`. Reads are cached with a TTL and deduplicated while
// in flight.

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::Error;

/// Temporal policies for one device.
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Minimum gap between the end of one request and the start of the next.
    pub min_request_interval: Duration,
    /// Extra settle time after a completed write before anything else runs.
    pub write_cooldown: Duration,
    /// Repeat-request window, measured from when a value was fetched.
    ///
    /// A request for the same key inside this window is answered from the
    /// cache even if the entry's TTL has already lapsed, so a value fetched
    /// just before expiry is not refetched by a burst of callers. Outside
    /// the window only the TTL decides. `Duration::ZERO` disables it.
    pub request_debounce: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            min_request_interval: Duration::from_millis(250),
            write_cooldown: Duration::from_secs(2),
            request_debounce: Duration::from_millis(500),
        }
    }
}

/// Counters exposed for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimiterStats {
    /// Requests that actually went through the gate.
    pub requests: u64,
    /// Reads served from cache.
    pub cache_hits: u64,
    /// Reads that joined another caller's in-flight fetch.
    pub coalesced: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Read,
    Write,
}

#[derive(Debug, Default)]
struct GateState {
    /// Completion (or start, while running) of the latest request.
    last_request: Option<Instant>,
    /// No request may start before this instant (set by writes).
    cooldown_until: Option<Instant>,
}

impl GateState {
    fn ready_at(&self, min_interval: Duration) -> Option<Instant> {
        let after_interval = self.last_request.map(|t| t + min_interval);
        match (after_interval, self.cooldown_until) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    fetched_at: Instant,
    expires_at: Instant,
}

type Shared<V> = watch::Receiver<Option<Result<V, Error>>>;

/// Serializing, throttling gate with a TTL cache and single-flight reads.
pub struct RateLimiterCache<K, V> {
    config: LimiterConfig,
    gate: Mutex<GateState>,
    cache: DashMap<K, CacheEntry<V>>,
    in_flight: DashMap<K, Shared<V>>,
    shutdown: CancellationToken,
    requests: AtomicU64,
    cache_hits: AtomicU64,
    coalesced: AtomicU64,
}

/// Removes the in-flight marker when the leading fetch finishes or is dropped.
struct InFlightGuard<'a, K: Eq + Hash, V> {
    map: &'a DashMap<K, Shared<V>>,
    key: &'a K,
}

impl<K: Eq + Hash, V> Drop for InFlightGuard<'_, K, V> {
    fn drop(&mut self) {
        self.map.remove(self.key);
    }
}

enum Role<V> {
    Leader(watch::Sender<Option<Result<V, Error>>>),
    Follower(Shared<V>),
}

impl<K, V> RateLimiterCache<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            gate: Mutex::new(GateState::default()),
            cache: DashMap::new(),
            in_flight: DashMap::new(),
            shutdown: CancellationToken::new(),
            requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Return the cached value for `key` if fresh, otherwise fetch it through
    /// the gate and cache it for `ttl`.
    ///
    /// Concurrent callers for the same key share one fetch. If that fetch is
    /// cancelled every waiter receives [`Error::Cancelled`].
    pub async fn get_or_fetch<F, Fut>(&self, key: K, ttl: Duration, fetch: F) -> Result<V, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, Error>>,
    {
        if let Some(value) = self.fresh(&key) {
            trace!(?key, "cache hit");
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        let role = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(e) => Role::Follower(e.get().clone()),
            Entry::Vacant(e) => {
                if self.shutdown.is_cancelled() {
                    return Err(Error::ShuttingDown);
                }
                let (tx, rx) = watch::channel(None);
                e.insert(rx);
                Role::Leader(tx)
            }
        };

        match role {
            Role::Follower(rx) => {
                trace!(?key, "joining in-flight fetch");
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                await_shared(rx).await
            }
            Role::Leader(tx) => {
                let _guard = InFlightGuard {
                    map: &self.in_flight,
                    key: &key,
                };

                // Another leader may have filled the cache between our
                // freshness check and taking the in-flight slot.
                let result = if let Some(value) = self.fresh(&key) {
                    Ok(value)
                } else {
                    let result = self.gated(RequestKind::Read, fetch).await;
                    if let Ok(ref value) = result {
                        let now = Instant::now();
                        self.cache.insert(
                            key.clone(),
                            CacheEntry {
                                value: value.clone(),
                                fetched_at: now,
                                expires_at: now + ttl,
                            },
                        );
                    }
                    result
                };

                let _ = tx.send(Some(result.clone()));
                result
            }
        }
    }

    /// Run a write through the gate, invalidate `key` on success, and start
    /// the write cooldown whether or not the write succeeded.
    pub async fn write_through<T, F, Fut>(&self, key: &K, write: F) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let result = self.write(write).await;
        if result.is_ok() {
            self.invalidate(key);
        }
        result
    }

    /// Run a write through the gate without touching the cache. The write
    /// cooldown starts when it completes.
    pub async fn write<T, F, Fut>(&self, write: F) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        self.gated(RequestKind::Write, write).await
    }

    /// Drop one cache entry.
    pub fn invalidate(&self, key: &K) {
        if self.cache.remove(key).is_some() {
            trace!(?key, "cache entry invalidated");
        }
    }

    /// Drop every cache entry.
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Stop admitting requests. Requests already holding the gate finish;
    /// callers still queued for it get [`Error::ShuttingDown`].
    pub fn close(&self) {
        debug!("request gate closed");
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn fresh(&self, key: &K) -> Option<V> {
        let entry = self.cache.get(key)?;
        let now = Instant::now();
        let debounced = entry.fetched_at + self.config.request_debounce > now;
        (now < entry.expires_at || debounced).then(|| entry.value.clone())
    }

    async fn gated<T, F, Fut>(&self, kind: RequestKind, op: F) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut gate = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => return Err(Error::ShuttingDown),
            gate = self.gate.lock() => gate,
        };

        if let Some(ready_at) = gate.ready_at(self.config.min_request_interval) {
            if ready_at > Instant::now() {
                trace!(wait = ?(ready_at - Instant::now()), "waiting for request slot");
                tokio::select! {
                    biased;
                    () = self.shutdown.cancelled() => return Err(Error::ShuttingDown),
                    () = tokio::time::sleep_until(ready_at) => {}
                }
            }
        }

        // Marked before running so a cancelled request still consumes its slot.
        gate.last_request = Some(Instant::now());
        self.requests.fetch_add(1, Ordering::Relaxed);

        let result = op().await;

        let done = Instant::now();
        gate.last_request = Some(done);
        if kind == RequestKind::Write {
            gate.cooldown_until = Some(done + self.config.write_cooldown);
        }
        result
    }
}

async fn await_shared<V: Clone>(mut rx: Shared<V>) -> Result<V, Error> {
    loop {
        if let Some(result) = rx.borrow_and_update().clone() {
            return result;
        }
        if rx.changed().await.is_err() {
            // Sender gone: either it published just before dropping, or the
            // leading fetch was cancelled.
            return rx.borrow().clone().unwrap_or(Err(Error::Cancelled));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use futures_util::future::join_all;

    use super::*;

    fn limiter(interval_ms: u64, cooldown_ms: u64) -> Arc<RateLimiterCache<u32, u32>> {
        Arc::new(RateLimiterCache::new(LimiterConfig {
            min_request_interval: Duration::from_millis(interval_ms),
            write_cooldown: Duration::from_millis(cooldown_ms),
            request_debounce: Duration::ZERO,
        }))
    }

    const TTL: Duration = Duration::from_secs(5);

    #[tokio::test(start_paused = true)]
    async fn distinct_keys_are_spaced_by_min_interval() {
        let cache = limiter(100, 0);
        let start = Instant::now();

        let reads = (0..10u32).map(|k| {
            let cache = Arc::clone(&cache);
            async move { cache.get_or_fetch(k, TTL, || async move { Ok(k) }).await }
        });
        let results = join_all(reads).await;

        assert!(results.iter().all(Result::is_ok));
        assert!(start.elapsed() >= Duration::from_millis(900));
        assert_eq!(cache.stats().requests, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_same_key_reads_share_one_fetch() {
        let cache = limiter(0, 0);
        let fetches = Arc::new(AtomicUsize::new(0));

        let reads = (0..5).map(|_| {
            let cache = Arc::clone(&cache);
            let fetches = Arc::clone(&fetches);
            async move {
                cache
                    .get_or_fetch(7, TTL, || async move {
                        fetches.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(42)
                    })
                    .await
            }
        });
        let results = join_all(reads).await;

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert!(results.into_iter().all(|r| r.unwrap() == 42));
        assert_eq!(cache.stats().coalesced, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entries_are_served_without_a_request() {
        let cache = limiter(0, 0);
        cache.get_or_fetch(1, TTL, || async { Ok(10) }).await.unwrap();
        let again = cache
            .get_or_fetch(1, TTL, || async { Ok(99) })
            .await
            .unwrap();
        assert_eq!(again, 10);
        assert_eq!(cache.stats().requests, 1);
        assert_eq!(cache.stats().cache_hits, 1);

        tokio::time::advance(TTL + Duration::from_millis(1)).await;
        let expired = cache
            .get_or_fetch(1, TTL, || async { Ok(99) })
            .await
            .unwrap();
        assert_eq!(expired, 99);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_serves_recent_value_past_ttl() {
        let cache: RateLimiterCache<u32, u32> = RateLimiterCache::new(LimiterConfig {
            min_request_interval: Duration::ZERO,
            write_cooldown: Duration::ZERO,
            request_debounce: Duration::from_millis(500),
        });
        let short = Duration::from_millis(100);
        cache.get_or_fetch(1, short, || async { Ok(1) }).await.unwrap();

        tokio::time::advance(Duration::from_millis(200)).await;
        let v = cache.get_or_fetch(1, short, || async { Ok(2) }).await.unwrap();
        assert_eq!(v, 1, "within debounce window");

        tokio::time::advance(Duration::from_millis(400)).await;
        let v = cache.get_or_fetch(1, short, || async { Ok(3) }).await.unwrap();
        assert_eq!(v, 3, "debounce window elapsed");
    }

    #[tokio::test(start_paused = true)]
    async fn read_after_write_waits_for_cooldown() {
        let cache = limiter(0, 300);
        cache
            .write_through(&1, || async { Ok(()) })
            .await
            .unwrap();

        let after_write = Instant::now();
        let started = Arc::new(std::sync::Mutex::new(None));
        let started_in = Arc::clone(&started);
        cache
            .get_or_fetch(1, TTL, || async move {
                *started_in.lock().unwrap() = Some(Instant::now());
                Ok(5)
            })
            .await
            .unwrap();

        let sent_at = started.lock().unwrap().unwrap();
        assert!(sent_at - after_write >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn successful_write_invalidates_cached_read() {
        let cache = limiter(0, 0);
        cache.get_or_fetch(3, TTL, || async { Ok(1) }).await.unwrap();
        cache
            .write_through(&3, || async { Ok(()) })
            .await
            .unwrap();
        let v = cache.get_or_fetch(3, TTL, || async { Ok(2) }).await.unwrap();
        assert_eq!(v, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_keeps_cache_but_still_cools_down() {
        let cache = limiter(0, 300);
        cache.get_or_fetch(3, TTL, || async { Ok(1) }).await.unwrap();

        let err = cache
            .write_through(&3, || async {
                Err::<(), _>(Error::Device {
                    status: 400,
                    message: "rejected".into(),
                })
            })
            .await;
        assert!(err.is_err());
        assert_eq!(
            cache.get_or_fetch(3, TTL, || async { Ok(2) }).await.unwrap(),
            1
        );

        let before = Instant::now();
        cache.get_or_fetch(4, TTL, || async { Ok(4) }).await.unwrap();
        assert!(before.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_still_consumes_a_slot() {
        let cache = limiter(100, 0);
        let err = cache
            .get_or_fetch(1, TTL, || async { Err(Error::validation("boom")) })
            .await;
        assert!(err.is_err());

        let before = Instant::now();
        cache.get_or_fetch(2, TTL, || async { Ok(2) }).await.unwrap();
        assert!(before.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_leader_fails_waiters_instead_of_hanging() {
        let cache = limiter(0, 0);

        let leader = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_fetch(9, TTL, || std::future::pending::<Result<u32, Error>>())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;

        let follower = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_fetch(9, TTL, || async {
                        Err::<u32, _>(Error::validation("follower must not fetch"))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;

        leader.abort();
        let result = follower.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)), "got {result:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn closed_gate_rejects_new_requests() {
        let cache = limiter(0, 0);
        cache.get_or_fetch(1, TTL, || async { Ok(1) }).await.unwrap();
        cache.close();

        assert!(cache.is_closed());
        assert!(matches!(
            cache.get_or_fetch(2, TTL, || async { Ok(2) }).await,
            Err(Error::ShuttingDown)
        ));
        assert!(matches!(
            cache.write_through(&1, || async { Ok(()) }).await,
            Err(Error::ShuttingDown)
        ));
        // Cached reads are not requests.
        assert_eq!(cache.get_or_fetch(1, TTL, || async { Ok(9) }).await.unwrap(), 1);
    }
}
