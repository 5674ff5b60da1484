//! A TTL cache whose eviction hook is a lifecycle event, not a cleanup
//! detail (spec §9's Design Note). Modeled as `{HashMap<id, (value,
//! expiry)>, Mutex, sweep task}` rather than reaching for an external
//! TTL-cache crate, because the eviction hook needs to run the
//! coordinator's own async `unregister_driver` logic — something the
//! generic caches in this corpus don't expose.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Entry<V> {
    value: V,
    expiry: Instant,
}

struct Inner<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
}

/// A handle to a running TTL cache. Dropping it does not stop the
/// sweep task; call [`TtlCache::shutdown`] to do that explicitly.
pub struct TtlCache<V> {
    inner: Arc<Inner<V>>,
    sweep: JoinHandle<()>,
    stop: CancellationToken,
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    /// Spawns the sweep task, which wakes every `sweep_interval` and
    /// evicts anything past its expiry, invoking `on_evict` for each —
    /// outside the entries mutex, so the hook can itself call back
    /// into the cache without deadlocking.
    pub fn new<F, Fut>(sweep_interval: Duration, on_evict: F) -> Self
    where
        F: Fn(String, V) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let inner = Arc::new(Inner { entries: Mutex::new(HashMap::new()) });
        let stop = CancellationToken::new();

        let sweep_inner = inner.clone();
        let sweep_stop = stop.clone();
        let sweep = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            loop {
                tokio::select! {
                    biased;
                    _ = sweep_stop.cancelled() => return,
                    _ = ticker.tick() => {
                        let expired = {
                            let now = Instant::now();
                            let mut entries = sweep_inner.entries.lock().await;
                            let expired: Vec<String> = entries
                                .iter()
                                .filter(|(_, e)| e.expiry <= now)
                                .map(|(k, _)| k.clone())
                                .collect();
                            expired.iter().filter_map(|k| entries.remove(k).map(|e| (k.clone(), e.value))).collect::<Vec<_>>()
                        };
                        for (id, value) in expired {
                            on_evict(id, value).await;
                        }
                    }
                }
            }
        });

        TtlCache { inner, sweep, stop }
    }

    /// Inserts or refreshes `id` with a fresh `ttl` from now. A repeat
    /// call restarts expiry (sliding TTL), matching spec.md's "refresh
    /// the TTL with the same ttl" heartbeat behavior.
    pub async fn set(&self, id: impl Into<String>, value: V, ttl: Duration) {
        let mut entries = self.inner.entries.lock().await;
        entries.insert(id.into(), Entry { value, expiry: Instant::now() + ttl });
    }

    pub async fn get(&self, id: &str) -> Option<V> {
        let entries = self.inner.entries.lock().await;
        entries.get(id).map(|e| e.value.clone())
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.inner.entries.lock().await.contains_key(id)
    }

    /// A point-in-time copy of every live entry, for HTTP listing
    /// handlers (`GET /protocols`).
    pub async fn snapshot(&self) -> Vec<V> {
        self.inner.entries.lock().await.values().map(|e| e.value.clone()).collect()
    }

    pub async fn shutdown(self) {
        self.stop.cancel();
        let _ = self.sweep.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn entry_expires_and_fires_the_eviction_hook() {
        let evicted = Arc::new(AtomicUsize::new(0));
        let hook_evicted = evicted.clone();

        let cache: TtlCache<u32> = TtlCache::new(Duration::from_millis(10), move |_id, _v| {
            let evicted = hook_evicted.clone();
            async move {
                evicted.fetch_add(1, Ordering::SeqCst);
            }
        });

        cache.set("proto-a", 1, Duration::from_millis(50)).await;
        assert!(cache.contains("proto-a").await);

        tokio::time::advance(Duration::from_millis(100)).await;
        // let the sweep task observe the tick
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(10)).await;
        tokio::task::yield_now().await;

        assert_eq!(evicted.load(Ordering::SeqCst), 1);
        assert!(!cache.contains("proto-a").await);

        cache.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_set_slides_the_expiry() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_millis(10), |_, _| async {});

        cache.set("proto-a", 1, Duration::from_millis(60)).await;
        tokio::time::advance(Duration::from_millis(30)).await;
        cache.set("proto-a", 2, Duration::from_millis(60)).await;
        tokio::time::advance(Duration::from_millis(40)).await;
        tokio::task::yield_now().await;

        assert!(cache.contains("proto-a").await);
        assert_eq!(cache.get("proto-a").await, Some(2));

        cache.shutdown().await;
    }
}
