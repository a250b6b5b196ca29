use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

/// Cache key derived from provider, operation and the parameters that shape the call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(provider: &str, operation: &str, params: &[&str]) -> Self {
        Self(format!(
            "{provider}:{operation}:{}",
            hash_fields(params)
        ))
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

fn hash_fields(fields: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for (idx, field) in fields.iter().enumerate() {
        if idx > 0 {
            hasher.update(b"|");
        }
        hasher.update(field.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

struct CachedValue<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
}

impl<V> CachedValue<V> {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.stored_at) < ttl
    }
}

/// One key's slot. The async lock serializes fetches for the key, so
/// concurrent callers wait for the in-flight producer instead of duplicating it.
struct CacheSlot<V> {
    value: tokio::sync::Mutex<Option<CachedValue<V>>>,
}

/// Short-lived, keyed result cache with per-key fetch deduplication.
pub struct ResultCache<V> {
    entries: Mutex<HashMap<CacheKey, Arc<CacheSlot<V>>>>,
}

impl<V> Default for ResultCache<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Clone + Send> ResultCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value for `key` if younger than `ttl`, otherwise runs
    /// `producer` and stores its success. Failures are not cached.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        producer: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = {
            let mut entries = lock(&self.entries);
            entries
                .entry(key.clone())
                .or_insert_with(|| {
                    Arc::new(CacheSlot {
                        value: tokio::sync::Mutex::new(None),
                    })
                })
                .clone()
        };

        let mut guard = slot.value.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.is_fresh(Instant::now(), ttl) {
                tracing::trace!(target: "forge.pool", key = %key, "cache hit");
                return Ok(cached.value.clone());
            }
            *guard = None;
        }

        tracing::trace!(target: "forge.pool", key = %key, "cache miss");
        let value = producer().await?;
        *guard = Some(CachedValue {
            value: value.clone(),
            stored_at: Instant::now(),
            ttl,
        });
        Ok(value)
    }

    /// Drops expired entries and empty slots nobody is waiting on.
    ///
    /// Slots with a fetch in flight are skipped.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|_, slot| {
            let Ok(guard) = slot.value.try_lock() else {
                return true;
            };
            match guard.as_ref() {
                Some(cached) => cached.is_fresh(now, cached.ttl),
                None => Arc::strong_count(slot) > 1,
            }
        });
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_cache_key_is_stable_and_param_sensitive() {
        let a = CacheKey::new("openai", "foundation", &["oil change", "engine"]);
        let b = CacheKey::new("openai", "foundation", &["oil change", "engine"]);
        let c = CacheKey::new("openai", "foundation", &["oil change", "brakes"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.as_str().starts_with("openai:foundation:"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_fetch_reuses_fresh_value() {
        let cache = ResultCache::<String>::new();
        let key = CacheKey::new("p", "op", &["x"]);
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let v = cache
                .get_or_fetch(&key, TTL, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>("payload".to_string())
                })
                .await
                .unwrap();
            assert_eq!(v, "payload");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(TTL).await;
        cache
            .get_or_fetch(&key, TTL, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>("fresh".to_string())
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache = ResultCache::<String>::new();
        let key = CacheKey::new("p", "op", &["x"]);

        let err = cache
            .get_or_fetch(&key, TTL, || async { Err::<String, _>("boom") })
            .await;
        assert_eq!(err, Err("boom"));

        let ok = cache
            .get_or_fetch(&key, TTL, || async { Ok::<_, &str>("ok".to_string()) })
            .await;
        assert_eq!(ok, Ok("ok".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_fetches_are_deduplicated() {
        let cache = Arc::new(ResultCache::<String>::new());
        let key = CacheKey::new("p", "op", &["x"]);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let key = key.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch(&key, TTL, || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, ()>("shared".to_string())
                    })
                    .await
            }));
        }

        for h in handles {
            assert_eq!(h.await.unwrap(), Ok("shared".to_string()));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_expired() {
        let cache = ResultCache::<String>::new();
        let short = CacheKey::new("p", "op", &["short"]);
        let long = CacheKey::new("p", "op", &["long"]);

        cache
            .get_or_fetch(&short, Duration::from_secs(1), || async {
                Ok::<_, ()>("a".to_string())
            })
            .await
            .unwrap();
        cache
            .get_or_fetch(&long, Duration::from_secs(600), || async {
                Ok::<_, ()>("b".to_string())
            })
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.len(), 1);
    }
}
