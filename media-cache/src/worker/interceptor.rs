use std::sync::Arc;

use blob_store::{Clock, SystemClock};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{NetworkError, WorkerError};
use crate::worker::control::{CacheStatsReply, ClearCacheReply, ControlRequest, ControlResponse};
use crate::worker::events::{CacheEvent, CacheEventKind, EventBus};
use crate::worker::fetcher::Fetcher;
use crate::worker::network_cache::NetworkCache;
use crate::worker::response::{InterceptedRequest, MediaResponse};

pub const CACHE_STATUS_HEADER: &str = "X-SW-Cache";
pub const CACHED_AT_HEADER: &str = "X-SW-Cached-At";

/// A URL family the worker caches: host ending in `host_suffix` and path
/// containing `path_fragment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPattern {
    pub host_suffix: String,
    pub path_fragment: String,
}

impl MediaPattern {
    pub fn matches(&self, url: &Url) -> bool {
        url.host_str()
            .map(|host| host.ends_with(&self.host_suffix))
            .unwrap_or(false)
            && url.path().contains(&self.path_fragment)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Name of the live durable namespace. Bumping it retires every older
    /// namespace on the next activation.
    pub cache_name: String,
    /// Never serve stale entries when the network fails; answer 503 instead.
    ///
    /// Only expired entries ever reach the network, so with `max_age_secs`
    /// left at `None` a cached URL is always a HIT and this flag only changes
    /// the answer for URLs that were never cached (503 rather than an error).
    pub strict_mode: bool,
    /// Entries older than this are revalidated against the network before
    /// being served. `None` serves every entry as a hit.
    pub max_age_secs: Option<u64>,
    pub media_patterns: Vec<MediaPattern>,
    pub event_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_name: "media-cache-v1".to_string(),
            strict_mode: false,
            max_age_secs: None,
            media_patterns: vec![MediaPattern {
                host_suffix: "supabase.co".to_string(),
                path_fragment: "/storage/v1/object/".to_string(),
            }],
            event_capacity: 64,
        }
    }
}

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Not a monitored request; fetched untouched.
    Passthrough,
    Cache,
    Network,
    /// Network failed, served an older durable copy.
    Stale,
    /// Network failed in strict mode.
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct Intercepted {
    pub response: MediaResponse,
    pub source: ResponseSource,
}

/// Transparent caching proxy for media GETs.
pub struct InterceptingCacheWorker {
    config: WorkerConfig,
    cache: Arc<dyn NetworkCache>,
    fetcher: Arc<dyn Fetcher>,
    events: EventBus,
    clock: Arc<dyn Clock>,
}

impl InterceptingCacheWorker {
    pub fn new(config: WorkerConfig, cache: Arc<dyn NetworkCache>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self::with_clock(config, cache, fetcher, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: WorkerConfig,
        cache: Arc<dyn NetworkCache>,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let events = EventBus::new(config.event_capacity);
        Self { config, cache, fetcher, events, clock }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Deletes every durable namespace except the current one. Returns the
    /// names removed.
    pub async fn activate(&self) -> Result<Vec<String>, WorkerError> {
        let mut removed = Vec::new();
        for name in self.cache.namespaces().await? {
            if name != self.config.cache_name {
                self.cache.delete_namespace(&name).await?;
                tracing::info!("deleted old cache namespace {}", name);
                removed.push(name);
            }
        }
        Ok(removed)
    }

    pub fn is_monitored(&self, request: &InterceptedRequest) -> bool {
        if !request.method.eq_ignore_ascii_case("GET") {
            return false;
        }
        match Url::parse(&request.url) {
            Ok(url) => self.config.media_patterns.iter().any(|p| p.matches(&url)),
            Err(_) => false,
        }
    }

    pub async fn handle_fetch(&self, request: InterceptedRequest) -> Result<Intercepted, WorkerError> {
        if !self.is_monitored(&request) {
            let response = self.fetcher.fetch(&request).await?;
            return Ok(Intercepted { response, source: ResponseSource::Passthrough });
        }

        let key = request.cache_key();
        let namespace = &self.config.cache_name;

        let cached = match self.cache.lookup(namespace, &key).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("cache lookup failed for {}: {}", request.url, e);
                None
            }
        };
        if let Some(mut response) = cached {
            if self.is_fresh(&response) {
                tracing::debug!("cache hit {}", request.url);
                response.set_header(CACHE_STATUS_HEADER, "HIT");
                self.notify(CacheEventKind::CacheHit, &request.url);
                return Ok(Intercepted { response, source: ResponseSource::Cache });
            }
            tracing::debug!("cached copy of {} is past max age, revalidating", request.url);
        }

        match self.fetcher.fetch(&request).await {
            Ok(response) => {
                if response.is_ok() {
                    self.store(&key, &request.url, &response).await;
                } else {
                    tracing::debug!("not caching {} (HTTP {})", request.url, response.status);
                }
                Ok(Intercepted { response, source: ResponseSource::Network })
            }
            Err(err) => self.fallback(&key, err).await,
        }
    }

    pub async fn handle_control(&self, request: ControlRequest) -> ControlResponse {
        match request {
            ControlRequest::ClearCache => ControlResponse::Clear(self.clear().await),
            ControlRequest::CacheStats => ControlResponse::Stats(self.stats().await),
        }
    }

    pub async fn clear(&self) -> ClearCacheReply {
        match self.cache.delete_namespace(&self.config.cache_name).await {
            Ok(_) => {
                tracing::info!("cleared cache namespace {}", self.config.cache_name);
                ClearCacheReply { success: true }
            }
            Err(e) => {
                tracing::error!("failed to clear {}: {}", self.config.cache_name, e);
                ClearCacheReply { success: false }
            }
        }
    }

    pub async fn stats(&self) -> CacheStatsReply {
        match self.cache.entries(&self.config.cache_name).await {
            Ok(entries) => {
                let total: u64 = entries.iter().map(|(_, size)| size).sum();
                CacheStatsReply::from_sizes(entries.len(), total)
            }
            Err(e) => {
                tracing::error!("failed to read stats for {}: {}", self.config.cache_name, e);
                CacheStatsReply::failed()
            }
        }
    }

    fn is_fresh(&self, response: &MediaResponse) -> bool {
        let Some(max_age) = self.config.max_age_secs else {
            return true;
        };
        let stored_at = response
            .header(CACHED_AT_HEADER)
            .and_then(|v| v.parse::<u64>().ok());
        match stored_at {
            Some(stored_at) => self.clock.now_millis().saturating_sub(stored_at) < max_age * 1000,
            None => false,
        }
    }

    async fn store(&self, key: &str, url: &str, response: &MediaResponse) {
        let mut copy = response.clone();
        copy.set_header(CACHED_AT_HEADER, self.clock.now_millis().to_string());
        self.notify(CacheEventKind::CacheMiss, url);
        match self.cache.store(&self.config.cache_name, key, &copy).await {
            Ok(()) => {
                tracing::debug!("stored {} ({} bytes)", url, copy.body.len());
                self.notify(CacheEventKind::CacheStored, url);
            }
            Err(e) => tracing::warn!("failed to store {}: {}", url, e),
        }
    }

    async fn fallback(&self, key: &str, err: NetworkError) -> Result<Intercepted, WorkerError> {
        if self.config.strict_mode {
            tracing::warn!("{}; strict mode, not serving stale", err);
            return Ok(Intercepted {
                response: MediaResponse::service_unavailable(),
                source: ResponseSource::Unavailable,
            });
        }
        match self.cache.lookup(&self.config.cache_name, key).await {
            Ok(Some(mut stale)) => {
                tracing::warn!("{}; serving stale copy", err);
                stale.set_header(CACHE_STATUS_HEADER, "STALE");
                Ok(Intercepted { response: stale, source: ResponseSource::Stale })
            }
            Ok(None) => Err(err.into()),
            Err(e) => {
                tracing::warn!("stale lookup failed: {}", e);
                Err(err.into())
            }
        }
    }

    fn notify(&self, kind: CacheEventKind, url: &str) {
        self.events.publish(CacheEvent {
            kind,
            url: url.to_string(),
            time: self.clock.now_millis(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheStoreError;
    use crate::worker::network_cache::{CacheResult, MemoryNetworkCache};
    use async_trait::async_trait;
    use blob_store::ManualClock;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const MEDIA_URL: &str = "https://x.supabase.co/storage/v1/object/public/a.jpg";

    #[derive(Default)]
    struct FakeNetwork {
        calls: AtomicUsize,
        offline: AtomicBool,
        status: std::sync::atomic::AtomicU16,
    }

    impl FakeNetwork {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
        fn go_offline(&self) {
            self.offline.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Fetcher for FakeNetwork {
        async fn fetch(&self, request: &InterceptedRequest) -> Result<MediaResponse, NetworkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                return Err(NetworkError { url: request.url.clone(), reason: "offline".to_string() });
            }
            let status = match self.status.load(Ordering::SeqCst) {
                0 => 200,
                s => s,
            };
            Ok(MediaResponse::new(status, format!("body of {}", request.url).into_bytes())
                .with_header("Content-Type", "image/jpeg"))
        }
    }

    struct Harness {
        worker: InterceptingCacheWorker,
        network: Arc<FakeNetwork>,
        cache: Arc<MemoryNetworkCache>,
        clock: Arc<ManualClock>,
    }

    fn harness(config: WorkerConfig) -> Harness {
        let network = Arc::new(FakeNetwork::default());
        let cache = Arc::new(MemoryNetworkCache::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let worker = InterceptingCacheWorker::with_clock(config, cache.clone(), network.clone(), clock.clone());
        Harness { worker, network, cache, clock }
    }

    #[tokio::test]
    async fn test_miss_then_hit_without_network() {
        let h = harness(WorkerConfig::default());
        let mut events = h.worker.events().subscribe();

        let first = h.worker.handle_fetch(InterceptedRequest::get(MEDIA_URL)).await.unwrap();
        assert_eq!(first.source, ResponseSource::Network);
        assert_eq!(first.response.header(CACHE_STATUS_HEADER), None);
        assert_eq!(events.recv().await.unwrap().kind, CacheEventKind::CacheMiss);
        assert_eq!(events.recv().await.unwrap().kind, CacheEventKind::CacheStored);

        let second = h.worker.handle_fetch(InterceptedRequest::get(MEDIA_URL)).await.unwrap();
        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(second.response.header(CACHE_STATUS_HEADER), Some("HIT"));
        assert_eq!(second.response.header(CACHED_AT_HEADER), Some("1000000"));
        assert_eq!(second.response.body, first.response.body);
        assert_eq!(h.network.calls(), 1);

        let hit = events.recv().await.unwrap();
        assert_eq!(hit.kind, CacheEventKind::CacheHit);
        assert_eq!(hit.url, MEDIA_URL);
    }

    #[tokio::test]
    async fn test_unmonitored_requests_pass_through() {
        let h = harness(WorkerConfig::default());
        for request in [
            InterceptedRequest::get("https://example.com/storage/v1/object/a.jpg"),
            InterceptedRequest::get("https://x.supabase.co/rest/v1/messages"),
            InterceptedRequest::new("POST", MEDIA_URL),
            InterceptedRequest::get("not a url"),
        ] {
            let out = h.worker.handle_fetch(request).await.unwrap();
            assert_eq!(out.source, ResponseSource::Passthrough);
        }
        assert_eq!(h.network.calls(), 4);
        assert!(h.cache.namespaces().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_status_is_not_stored() {
        let h = harness(WorkerConfig::default());
        h.network.status.store(404, Ordering::SeqCst);
        let out = h.worker.handle_fetch(InterceptedRequest::get(MEDIA_URL)).await.unwrap();
        assert_eq!(out.response.status, 404);
        assert!(h.cache.entries("media-cache-v1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_with_prior_entry_is_served() {
        let h = harness(WorkerConfig::default());
        h.worker.handle_fetch(InterceptedRequest::get(MEDIA_URL)).await.unwrap();
        h.network.go_offline();

        let out = h.worker.handle_fetch(InterceptedRequest::get(MEDIA_URL)).await.unwrap();
        assert!(out.response.is_ok());
        assert_eq!(out.response.body, format!("body of {}", MEDIA_URL).into_bytes());
    }

    #[tokio::test]
    async fn test_offline_expired_entry_served_stale() {
        let h = harness(WorkerConfig { max_age_secs: Some(60), ..WorkerConfig::default() });
        h.worker.handle_fetch(InterceptedRequest::get(MEDIA_URL)).await.unwrap();
        h.clock.advance(61_000);
        h.network.go_offline();

        let out = h.worker.handle_fetch(InterceptedRequest::get(MEDIA_URL)).await.unwrap();
        assert_eq!(out.source, ResponseSource::Stale);
        assert_eq!(out.response.header(CACHE_STATUS_HEADER), Some("STALE"));
        assert_eq!(h.network.calls(), 2);
    }

    #[tokio::test]
    async fn test_strict_mode_returns_503_instead_of_stale() {
        let h = harness(WorkerConfig {
            max_age_secs: Some(60),
            strict_mode: true,
            ..WorkerConfig::default()
        });
        h.worker.handle_fetch(InterceptedRequest::get(MEDIA_URL)).await.unwrap();
        h.clock.advance(61_000);
        h.network.go_offline();

        let out = h.worker.handle_fetch(InterceptedRequest::get(MEDIA_URL)).await.unwrap();
        assert_eq!(out.source, ResponseSource::Unavailable);
        assert_eq!(out.response.status, 503);
    }

    #[tokio::test]
    async fn test_strict_mode_without_max_age_keeps_serving_hits() {
        let h = harness(WorkerConfig { strict_mode: true, ..WorkerConfig::default() });
        h.worker.handle_fetch(InterceptedRequest::get(MEDIA_URL)).await.unwrap();
        h.clock.advance(365 * 24 * 60 * 60 * 1000);
        h.network.go_offline();

        let cached = h.worker.handle_fetch(InterceptedRequest::get(MEDIA_URL)).await.unwrap();
        assert_eq!(cached.source, ResponseSource::Cache);

        let uncached = h
            .worker
            .handle_fetch(InterceptedRequest::get(format!("{}?v=2", MEDIA_URL)))
            .await
            .unwrap();
        assert_eq!(uncached.source, ResponseSource::Unavailable);
        assert_eq!(uncached.response.status, 503);
    }

    #[tokio::test]
    async fn test_offline_without_entry_propagates() {
        let h = harness(WorkerConfig::default());
        h.network.go_offline();
        let err = h.worker.handle_fetch(InterceptedRequest::get(MEDIA_URL)).await.unwrap_err();
        assert!(matches!(err, WorkerError::Network(_)));
    }

    #[tokio::test]
    async fn test_fresh_entry_within_max_age_is_hit() {
        let h = harness(WorkerConfig { max_age_secs: Some(60), ..WorkerConfig::default() });
        h.worker.handle_fetch(InterceptedRequest::get(MEDIA_URL)).await.unwrap();
        h.clock.advance(59_000);
        let out = h.worker.handle_fetch(InterceptedRequest::get(MEDIA_URL)).await.unwrap();
        assert_eq!(out.source, ResponseSource::Cache);
        assert_eq!(h.network.calls(), 1);
    }

    #[tokio::test]
    async fn test_activate_keeps_only_current_namespace() {
        let h = harness(WorkerConfig { cache_name: "media-cache-v2".to_string(), ..WorkerConfig::default() });
        let resp = MediaResponse::ok(b"x".to_vec());
        h.cache.store("media-cache-v1", "GET a", &resp).await.unwrap();
        h.cache.store("media-cache-v2", "GET a", &resp).await.unwrap();
        h.cache.store("other", "GET a", &resp).await.unwrap();

        let mut removed = h.worker.activate().await.unwrap();
        removed.sort();
        assert_eq!(removed, vec!["media-cache-v1", "other"]);
        assert_eq!(h.cache.namespaces().await.unwrap(), vec!["media-cache-v2"]);
    }

    #[tokio::test]
    async fn test_clear_and_stats() {
        let h = harness(WorkerConfig::default());
        h.worker.handle_fetch(InterceptedRequest::get(MEDIA_URL)).await.unwrap();
        h.worker
            .handle_fetch(InterceptedRequest::get(format!("{}?v=2", MEDIA_URL)))
            .await
            .unwrap();

        let stats = h.worker.stats().await;
        assert!(stats.success);
        assert_eq!(stats.count, 2);
        let expected = (format!("body of {}", MEDIA_URL).len() * 2 + 4) as u64;
        assert_eq!(stats.total_size, expected);
        assert_eq!(stats.total_size_mb, "0.00");

        assert!(h.worker.clear().await.success);
        assert!(h.worker.clear().await.success);
        assert_eq!(h.worker.stats().await.count, 0);

        // a cleared namespace starts missing again
        h.worker.handle_fetch(InterceptedRequest::get(MEDIA_URL)).await.unwrap();
        assert_eq!(h.network.calls(), 3);
    }

    struct BrokenCache;

    #[async_trait]
    impl NetworkCache for BrokenCache {
        async fn lookup(&self, _: &str, _: &str) -> CacheResult<Option<MediaResponse>> {
            Err(CacheStoreError::InvalidNamespace("broken".to_string()))
        }
        async fn store(&self, _: &str, _: &str, _: &MediaResponse) -> CacheResult<()> {
            Err(CacheStoreError::InvalidNamespace("broken".to_string()))
        }
        async fn entries(&self, _: &str) -> CacheResult<Vec<(String, u64)>> {
            Err(CacheStoreError::InvalidNamespace("broken".to_string()))
        }
        async fn namespaces(&self) -> CacheResult<Vec<String>> {
            Err(CacheStoreError::InvalidNamespace("broken".to_string()))
        }
        async fn delete_namespace(&self, _: &str) -> CacheResult<bool> {
            Err(CacheStoreError::InvalidNamespace("broken".to_string()))
        }
    }

    #[tokio::test]
    async fn test_cache_failures_fall_through_to_network() {
        let network = Arc::new(FakeNetwork::default());
        let worker = InterceptingCacheWorker::new(WorkerConfig::default(), Arc::new(BrokenCache), network.clone());
        let mut events = worker.events().subscribe();

        let out = worker.handle_fetch(InterceptedRequest::get(MEDIA_URL)).await.unwrap();
        assert_eq!(out.source, ResponseSource::Network);
        assert_eq!(events.recv().await.unwrap().kind, CacheEventKind::CacheMiss);
        assert!(events.try_recv().is_err());

        assert!(!worker.clear().await.success);
        assert!(!worker.stats().await.success);
    }
}
