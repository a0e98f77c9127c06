//! Read-through cache for computed totals and balances.
//!
//! Values are JSON blobs under string keys. A failing backend is logged and
//! treated as a miss; the caller then computes from the database.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::timeout;

use ledgerdesk_runtime_config::{CacheBackend, CacheSettings};

const REDIS_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Clone)]
pub enum TotalsCache {
    Redis(ConnectionManager),
    Memory(Arc<Mutex<HashMap<String, (Instant, String)>>>),
    Disabled,
}

impl TotalsCache {
    pub fn memory() -> Self {
        Self::Memory(Arc::new(Mutex::new(HashMap::new())))
    }

    /// Build the configured backend. Redis that cannot be reached at startup
    /// degrades to the in-process map.
    pub async fn connect(settings: &CacheSettings) -> Self {
        match settings.effective_backend() {
            CacheBackend::Disabled => Self::Disabled,
            CacheBackend::Redis => match open_redis(&settings.redis_url).await {
                Ok(conn) => {
                    tracing::info!("totals cache: redis");
                    Self::Redis(conn)
                }
                Err(e) => {
                    tracing::warn!("redis unavailable ({e}); using in-memory cache");
                    Self::memory()
                }
            },
            CacheBackend::Memory | CacheBackend::Auto => Self::memory(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Redis(_) => "redis",
            Self::Memory(_) => "memory",
            Self::Disabled => "disabled",
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self {
            Self::Disabled => return None,
            Self::Memory(map) => {
                let mut map = map.lock().await;
                let now = Instant::now();
                let live = map
                    .get(key)
                    .filter(|(expires, _)| *expires > now)
                    .map(|(_, value)| value.clone());
                if live.is_none() {
                    map.remove(key);
                }
                live
            }
            Self::Redis(conn) => {
                let mut conn = conn.clone();
                match timeout(REDIS_TIMEOUT, conn.get::<_, Option<String>>(key)).await {
                    Ok(Ok(value)) => value,
                    Ok(Err(e)) => {
                        tracing::warn!("cache read {key}: {e}");
                        None
                    }
                    Err(_) => {
                        tracing::warn!("cache read {key}: timed out");
                        None
                    }
                }
            }
        }?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("cache entry {key} is not valid JSON: {e}");
                None
            }
        }
    }

    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        if matches!(self, Self::Disabled) || ttl_secs == 0 {
            return;
        }
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("cache encode {key}: {e}");
                return;
            }
        };
        match self {
            Self::Disabled => {}
            Self::Memory(map) => {
                let now = Instant::now();
                let mut map = map.lock().await;
                map.retain(|_, (expires, _)| *expires > now);
                map.insert(key.to_string(), (now + Duration::from_secs(ttl_secs), raw));
            }
            Self::Redis(conn) => {
                let mut conn = conn.clone();
                match timeout(REDIS_TIMEOUT, conn.set_ex::<_, _, ()>(key, raw, ttl_secs)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!("cache write {key}: {e}"),
                    Err(_) => tracing::warn!("cache write {key}: timed out"),
                }
            }
        }
    }

    pub async fn invalidate(&self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }
        match self {
            Self::Disabled => {}
            Self::Memory(map) => {
                let mut map = map.lock().await;
                for key in keys {
                    map.remove(key);
                }
            }
            Self::Redis(conn) => {
                let mut conn = conn.clone();
                match timeout(REDIS_TIMEOUT, conn.del::<_, ()>(keys)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!("cache invalidate {keys:?}: {e}"),
                    Err(_) => tracing::warn!("cache invalidate {keys:?}: timed out"),
                }
            }
        }
    }
}

async fn open_redis(url: &str) -> Result<ConnectionManager, String> {
    let client = redis::Client::open(url).map_err(|e| e.to_string())?;
    match timeout(Duration::from_secs(2), client.get_connection_manager()).await {
        Ok(Ok(conn)) => Ok(conn),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("connection timed out".to_string()),
    }
}

pub fn invoice_totals_key(id: i64) -> String {
    format!("invoice_totals:{id}")
}

pub fn quote_totals_key(id: i64) -> String {
    format!("quote_totals:{id}")
}

pub fn client_balance_key(id: i64) -> String {
    format!("client_balance:{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_round_trip_and_invalidate() {
        let cache = TotalsCache::memory();
        cache.put_json("k", &vec![1, 2, 3], 60).await;
        assert_eq!(cache.get_json::<Vec<i32>>("k").await, Some(vec![1, 2, 3]));

        cache.invalidate(&["k".to_string()]).await;
        assert_eq!(cache.get_json::<Vec<i32>>("k").await, None);
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let cache = TotalsCache::memory();
        if let TotalsCache::Memory(map) = &cache {
            map.lock().await.insert(
                "old".to_string(),
                (Instant::now() - Duration::from_secs(1), "1".to_string()),
            );
        }
        assert_eq!(cache.get_json::<i32>("old").await, None);
    }

    #[tokio::test]
    async fn writes_sweep_expired_entries() {
        let cache = TotalsCache::memory();
        let TotalsCache::Memory(map) = &cache else {
            unreachable!()
        };
        map.lock().await.insert(
            "stale".to_string(),
            (Instant::now() - Duration::from_secs(1), "1".to_string()),
        );
        cache.put_json("fresh", &2, 60).await;

        let map = map.lock().await;
        assert!(!map.contains_key("stale"));
        assert!(map.contains_key("fresh"));
    }

    #[test]
    fn keys_are_unprefixed() {
        assert_eq!(invoice_totals_key(7), "invoice_totals:7");
        assert_eq!(client_balance_key(3), "client_balance:3");
    }

    #[tokio::test]
    async fn disabled_never_stores() {
        let cache = TotalsCache::Disabled;
        cache.put_json("k", &1, 60).await;
        assert_eq!(cache.get_json::<i32>("k").await, None);
        assert_eq!(cache.backend_name(), "disabled");
    }

    #[tokio::test]
    async fn unreachable_redis_falls_back_to_memory() {
        let settings = CacheSettings {
            backend: CacheBackend::Redis,
            redis_url: "redis://127.0.0.1:1/".to_string(),
            ..Default::default()
        };
        let cache = TotalsCache::connect(&settings).await;
        assert_eq!(cache.backend_name(), "memory");
    }

    #[test]
    fn key_names() {
        assert_eq!(invoice_totals_key(4), "invoice_totals:4");
        assert_eq!(quote_totals_key(4), "quote_totals:4");
        assert_eq!(client_balance_key(9), "client_balance:9");
    }
}
