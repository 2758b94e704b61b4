//! Transparent caching proxy for media requests, plus its page-facing
//! control channel and event bus.

pub mod control;
pub mod events;
pub mod fetcher;
pub mod interceptor;
pub mod network_cache;
pub mod response;
pub mod runtime;

pub use control::{CacheStatsReply, ClearCacheReply, ControlRequest, ControlResponse};
pub use events::{CacheEvent, CacheEventKind, EventBus};
pub use fetcher::{Fetcher, ReqwestFetcher};
pub use interceptor::{
    Intercepted, InterceptingCacheWorker, MediaPattern, ResponseSource, WorkerConfig, CACHED_AT_HEADER,
    CACHE_STATUS_HEADER,
};
pub use network_cache::{CacheResult, DiskNetworkCache, MemoryNetworkCache, NetworkCache};
pub use response::{InterceptedRequest, MediaResponse};
pub use runtime::{spawn_worker, WorkerClient, WorkerMessage};
