use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use actix_web::web::Bytes;
use async_trait::async_trait;
use blob_store::{Clock, SystemClock};
use serde::Serialize;
use tokio::sync::RwLock;
use url::Url;

use crate::errors::MediaProxyErr;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const LOGGED_URL_CHARS: usize = 80;

#[derive(Debug, Clone)]
pub struct ProxyCacheConfig {
    pub trusted_host: String,
    pub capacity: usize,
    pub max_age: Duration,
}

impl Default for ProxyCacheConfig {
    fn default() -> Self {
        Self {
            trusted_host: "supabase.co".to_string(),
            capacity: 100,
            max_age: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// A successful upstream response.
#[derive(Debug, Clone)]
pub struct OriginResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// The upstream store media is fetched from.
#[async_trait]
pub trait OriginFetcher: Send + Sync {
    /// Transport failures are `MediaProxyErr::Fetch`; any HTTP status is
    /// returned as a response.
    async fn fetch(&self, url: &Url) -> Result<OriginResponse, MediaProxyErr>;
}

#[derive(Clone, Default)]
pub struct ReqwestOrigin {
    client: reqwest::Client,
}

#[async_trait]
impl OriginFetcher for ReqwestOrigin {
    async fn fetch(&self, url: &Url) -> Result<OriginResponse, MediaProxyErr> {
        let resp = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| MediaProxyErr::Fetch(e.to_string()))?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.bytes().await.map_err(|e| MediaProxyErr::Fetch(e.to_string()))?;
        Ok(OriginResponse { status, content_type, body })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CachedMedia {
    pub payload: Bytes,
    pub content_type: String,
    pub status: CacheStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub oldest_timestamp: Option<u64>,
    pub newest_timestamp: Option<u64>,
    pub capacity: usize,
}

struct Entry {
    payload: Bytes,
    content_type: String,
    timestamp: u64,
    // insertion order, breaks timestamp ties
    seq: u64,
}

#[derive(Default)]
struct Entries {
    by_url: HashMap<String, Entry>,
    next_seq: u64,
}

/// Bounded in-process cache in front of the trusted media store.
pub struct ServerSideMediaCache {
    config: ProxyCacheConfig,
    origin: Arc<dyn OriginFetcher>,
    clock: Arc<dyn Clock>,
    entries: RwLock<Entries>,
}

impl ServerSideMediaCache {
    pub fn new(config: ProxyCacheConfig, origin: Arc<dyn OriginFetcher>) -> Self {
        Self::with_clock(config, origin, Arc::new(SystemClock))
    }

    pub fn with_clock(config: ProxyCacheConfig, origin: Arc<dyn OriginFetcher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            origin,
            clock,
            entries: RwLock::new(Entries::default()),
        }
    }

    pub async fn get(&self, remote_url: &str) -> Result<CachedMedia, MediaProxyErr> {
        tracing::info!("media request {}", truncate_url(remote_url));
        let url = self.check_url(remote_url)?;
        let key = url.to_string();

        if let Some(hit) = self.lookup_fresh(&key).await {
            tracing::debug!("serving {} from cache", truncate_url(&key));
            return Ok(hit);
        }

        let resp = self.origin.fetch(&url).await?;
        if !(200..300).contains(&resp.status) {
            tracing::warn!("upstream returned {} for {}", resp.status, truncate_url(&key));
            return Err(MediaProxyErr::Upstream(resp.status));
        }

        let content_type = resp.content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        self.insert(key, resp.body.clone(), content_type.clone()).await;
        Ok(CachedMedia { payload: resp.body, content_type, status: CacheStatus::Miss })
    }

    /// Empties the cache and returns the new size.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        entries.by_url.clear();
        tracing::info!("media cache cleared");
        entries.by_url.len()
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        let timestamps = entries.by_url.values().map(|e| e.timestamp);
        CacheStats {
            entries: entries.by_url.len(),
            total_bytes: entries.by_url.values().map(|e| e.payload.len() as u64).sum(),
            oldest_timestamp: timestamps.clone().min(),
            newest_timestamp: timestamps.max(),
            capacity: self.config.capacity,
        }
    }

    fn check_url(&self, remote_url: &str) -> Result<Url, MediaProxyErr> {
        let trimmed = remote_url.trim();
        if trimmed.is_empty() {
            return Err(MediaProxyErr::InvalidRequest("missing url".to_string()));
        }
        let url = Url::parse(trimmed).map_err(|e| MediaProxyErr::InvalidRequest(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(MediaProxyErr::InvalidRequest(format!("unsupported scheme {}", url.scheme())));
        }
        let trusted = &self.config.trusted_host;
        let host_ok = url
            .host_str()
            .map(|h| h == trusted || h.ends_with(&format!(".{}", trusted)))
            .unwrap_or(false);
        if !host_ok {
            tracing::warn!("rejected untrusted url {}", truncate_url(trimmed));
            return Err(MediaProxyErr::InvalidRequest("untrusted host".to_string()));
        }
        Ok(url)
    }

    async fn lookup_fresh(&self, key: &str) -> Option<CachedMedia> {
        let entries = self.entries.read().await;
        let entry = entries.by_url.get(key)?;
        let age = self.clock.now_millis().saturating_sub(entry.timestamp);
        if u128::from(age) >= self.config.max_age.as_millis() {
            tracing::debug!("cached copy of {} is stale", truncate_url(key));
            return None;
        }
        Some(CachedMedia {
            payload: entry.payload.clone(),
            content_type: entry.content_type.clone(),
            status: CacheStatus::Hit,
        })
    }

    async fn insert(&self, key: String, payload: Bytes, content_type: String) {
        if self.config.capacity == 0 {
            return;
        }
        let mut entries = self.entries.write().await;
        if !entries.by_url.contains_key(&key) && entries.by_url.len() >= self.config.capacity {
            let oldest = entries
                .by_url
                .iter()
                .min_by_key(|(_, e)| (e.timestamp, e.seq))
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.by_url.remove(&oldest);
                tracing::debug!("evicted {}", truncate_url(&oldest));
            }
        }
        let seq = entries.next_seq;
        entries.next_seq += 1;
        let timestamp = self.clock.now_millis();
        entries.by_url.insert(key, Entry { payload, content_type, timestamp, seq });
    }
}

fn truncate_url(url: &str) -> String {
    match url.char_indices().nth(LOGGED_URL_CHARS) {
        Some((cut, _)) => format!("{}...", &url[..cut]),
        None => url.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use blob_store::ManualClock;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    pub(crate) struct FakeOrigin {
        pub(crate) calls: AtomicUsize,
        pub(crate) offline: AtomicBool,
        pub(crate) status: std::sync::atomic::AtomicU16,
    }

    impl FakeOrigin {
        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OriginFetcher for FakeOrigin {
        async fn fetch(&self, url: &Url) -> Result<OriginResponse, MediaProxyErr> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                return Err(MediaProxyErr::Fetch("connection refused".to_string()));
            }
            let status = match self.status.load(Ordering::SeqCst) {
                0 => 200,
                s => s,
            };
            Ok(OriginResponse {
                status,
                content_type: Some("image/png".to_string()),
                body: Bytes::from(format!("payload:{}", url.path())),
            })
        }
    }

    fn media_url(n: usize) -> String {
        format!("https://proj.supabase.co/storage/v1/object/public/img-{}.png", n)
    }

    fn cache(capacity: usize) -> (ServerSideMediaCache, Arc<FakeOrigin>, Arc<ManualClock>) {
        let origin = Arc::new(FakeOrigin::default());
        let clock = Arc::new(ManualClock::new(10_000));
        let config = ProxyCacheConfig { capacity, ..ProxyCacheConfig::default() };
        let cache = ServerSideMediaCache::with_clock(config, origin.clone(), clock.clone());
        (cache, origin, clock)
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let (cache, origin, _) = cache(100);
        let first = cache.get(&media_url(1)).await.unwrap();
        assert_eq!(first.status, CacheStatus::Miss);
        assert_eq!(first.content_type, "image/png");

        let second = cache.get(&media_url(1)).await.unwrap();
        assert_eq!(second.status, CacheStatus::Hit);
        assert_eq!(second.payload, first.payload);
        assert_eq!(origin.calls(), 1);
    }

    #[tokio::test]
    async fn test_oldest_entry_evicted_at_capacity() {
        let (cache, origin, clock) = cache(100);
        for n in 0..100 {
            cache.get(&media_url(n)).await.unwrap();
            clock.advance(1);
        }
        assert_eq!(cache.stats().await.entries, 100);

        cache.get(&media_url(100)).await.unwrap();
        let stats = cache.stats().await;
        assert_eq!(stats.entries, 100);
        assert_eq!(stats.oldest_timestamp, Some(10_001));

        // the first url was evicted and must be fetched again
        assert_eq!(cache.get(&media_url(0)).await.unwrap().status, CacheStatus::Miss);
        assert_eq!(cache.get(&media_url(50)).await.unwrap().status, CacheStatus::Hit);
        assert_eq!(origin.calls(), 102);
    }

    #[tokio::test]
    async fn test_timestamp_ties_evict_first_inserted() {
        let (cache, _, _) = cache(2);
        cache.get(&media_url(1)).await.unwrap();
        cache.get(&media_url(2)).await.unwrap();
        cache.get(&media_url(3)).await.unwrap();

        assert_eq!(cache.get(&media_url(2)).await.unwrap().status, CacheStatus::Hit);
        assert_eq!(cache.get(&media_url(3)).await.unwrap().status, CacheStatus::Hit);
    }

    #[tokio::test]
    async fn test_zero_capacity_never_stores() {
        let (cache, origin, _) = cache(0);
        assert_eq!(cache.get(&media_url(1)).await.unwrap().status, CacheStatus::Miss);
        assert_eq!(cache.get(&media_url(1)).await.unwrap().status, CacheStatus::Miss);
        assert_eq!(cache.stats().await.entries, 0);
        assert_eq!(origin.calls(), 2);
    }

    #[tokio::test]
    async fn test_untrusted_urls_rejected_without_fetch() {
        let (cache, origin, _) = cache(100);
        for bad in [
            "",
            "   ",
            "not a url",
            "ftp://proj.supabase.co/a.png",
            "https://evil.example.com/a.png",
            "https://supabase.co.evil.com/a.png",
            "https://notsupabase.co/a.png",
        ] {
            let err = cache.get(bad).await.unwrap_err();
            assert!(matches!(err, MediaProxyErr::InvalidRequest(_)), "{:?}", bad);
        }
        assert_eq!(origin.calls(), 0);
    }

    #[tokio::test]
    async fn test_stale_entry_refetched() {
        let (cache, origin, clock) = cache(100);
        cache.get(&media_url(1)).await.unwrap();
        clock.advance(7 * 24 * 60 * 60 * 1000);

        let again = cache.get(&media_url(1)).await.unwrap();
        assert_eq!(again.status, CacheStatus::Miss);
        assert_eq!(origin.calls(), 2);
        assert_eq!(cache.stats().await.entries, 1);
        assert_eq!(cache.stats().await.newest_timestamp, Some(clock.now_millis()));
    }

    #[tokio::test]
    async fn test_upstream_failures() {
        let (cache, origin, _) = cache(100);
        origin.status.store(404, Ordering::SeqCst);
        assert!(matches!(cache.get(&media_url(1)).await, Err(MediaProxyErr::Upstream(404))));

        origin.status.store(0, Ordering::SeqCst);
        origin.offline.store(true, Ordering::SeqCst);
        assert!(matches!(cache.get(&media_url(1)).await, Err(MediaProxyErr::Fetch(_))));
        assert_eq!(cache.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let (cache, _, _) = cache(100);
        cache.get(&media_url(1)).await.unwrap();
        assert_eq!(cache.clear().await, 0);
        assert_eq!(cache.clear().await, 0);

        let stats = cache.stats().await;
        assert_eq!(
            stats,
            CacheStats {
                entries: 0,
                total_bytes: 0,
                oldest_timestamp: None,
                newest_timestamp: None,
                capacity: 100
            }
        );
    }

    #[test]
    fn test_truncate_url() {
        let long = "a".repeat(120);
        assert_eq!(truncate_url(&long).len(), 83);
        assert_eq!(truncate_url("short"), "short");
    }
}
