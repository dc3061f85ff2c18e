//! A tiny TTL-gated cache shared by the NFT Bonus Service (§4.4) and the
//! Profile Service (§4.5): per-key last-fetched value plus a deadline.
//! Concurrent lookups for the same key may race and issue parallel
//! upstream calls — acceptable per §5 because results are idempotent, so
//! this cache does not dedupe in-flight requests, only cache completed ones.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self { entries: Mutex::new(HashMap::new()), ttl }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.lock().await;
        entries.get(key).filter(|e| e.expires_at > Instant::now()).map(|e| e.value.clone())
    }

    pub async fn put(&self, key: K, value: V) {
        let mut entries = self.entries.lock().await;
        entries.insert(key, Entry { value, expires_at: Instant::now() + self.ttl });
    }
}

/// Clamps a configured TTL to `[min, max]`, per §4.4 ("clamped to [5s, 10min]").
pub fn clamp_ttl(requested: Duration, min: Duration, max: Duration) -> Duration {
    requested.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_entry_is_returned() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60));
        cache.put("a".to_string(), 7).await;
        assert_eq!(cache.get(&"a".to_string()).await, Some(7));
    }

    #[tokio::test]
    async fn expired_entry_is_absent() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_millis(1));
        cache.put("a".to_string(), 7).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get(&"a".to_string()).await, None);
    }

    #[test]
    fn ttl_clamps_to_bounds() {
        let min = Duration::from_secs(5);
        let max = Duration::from_secs(600);
        assert_eq!(clamp_ttl(Duration::from_secs(1), min, max), min);
        assert_eq!(clamp_ttl(Duration::from_secs(6000), min, max), max);
        assert_eq!(clamp_ttl(Duration::from_secs(60), min, max), Duration::from_secs(60));
    }
}
