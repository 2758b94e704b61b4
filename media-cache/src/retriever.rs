use std::sync::{Arc, Mutex, MutexGuard};

use blob_store::chunk_storage::ChunkStore;
use blob_store::{BlobStore, ChunkAssembler};
use serde::{Deserialize, Serialize};

use crate::error::ResolveError;
use crate::handle::{HandleFactory, LocalHandle};
use crate::reference::MediaReference;
use crate::session::SessionBlobCache;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Upper bound on live handles kept by the session cache.
    pub session_capacity: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self { session_capacity: 256 }
    }
}

/// What the UI renders for one media slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaView {
    pub handle: Option<String>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl MediaView {
    /// Label for the placeholder drawn while there is no handle.
    pub fn placeholder_label(&self) -> Option<&str> {
        if self.handle.is_some() {
            None
        } else if self.is_loading {
            Some("Loading…")
        } else if self.error.is_some() {
            Some("Media unavailable")
        } else {
            Some("No media")
        }
    }
}

/// Resolves media references to local handles.
///
/// Shared by every slot in the process: session cache first, then the
/// durable blob store, then chunk assembly from the remote store.
pub struct MediaRetriever {
    session: SessionBlobCache,
    blobs: Arc<dyn BlobStore>,
    assembler: ChunkAssembler,
    handles: Arc<dyn HandleFactory>,
}

impl MediaRetriever {
    pub fn new(
        config: RetrieverConfig,
        blobs: Arc<dyn BlobStore>,
        chunks: Arc<dyn ChunkStore>,
        handles: Arc<dyn HandleFactory>,
    ) -> Self {
        Self {
            session: SessionBlobCache::new(config.session_capacity),
            blobs,
            assembler: ChunkAssembler::new(chunks),
            handles,
        }
    }

    pub fn session(&self) -> &SessionBlobCache {
        &self.session
    }

    /// Creates a slot for `reference`, resolving it right away when
    /// `auto_load` is set.
    pub async fn mount(self: &Arc<Self>, reference: Option<&str>, auto_load: bool) -> MediaSlot {
        let slot = MediaSlot {
            retriever: self.clone(),
            auto_load,
            state: Mutex::new(SlotState::default()),
        };
        slot.set_reference(reference).await;
        slot
    }

    /// One-shot resolution. The handle stays valid for as long as the
    /// session cache retains it.
    pub async fn resolve(self: &Arc<Self>, reference: Option<&str>) -> MediaView {
        self.mount(reference, true).await.view()
    }

    /// Forgets `file_id` in the session cache and the durable store.
    pub async fn evict(&self, file_id: &str) -> bool {
        let in_session = self.session.release(file_id);
        let on_disk = match self.blobs.delete(file_id).await {
            Ok(existed) => existed,
            Err(e) => {
                tracing::warn!("failed to evict {} from blob store: {}", file_id, e);
                false
            }
        };
        in_session || on_disk
    }

    pub fn clear_session(&self) {
        self.session.clear();
    }

    async fn acquire(&self, file_id: &str) -> Result<LocalHandle, ResolveError> {
        // another slot may have finished the same file while we waited
        if let Some(handle) = self.session.get(file_id) {
            return Ok(handle);
        }

        let blob = match self.blobs.get(file_id).await {
            Ok(Some(record)) => {
                tracing::debug!("blob store hit for {}", file_id);
                record.blob
            }
            Ok(None) => self.assemble_and_persist(file_id).await?,
            Err(e) => {
                tracing::warn!("blob store read failed for {}, assembling instead: {}", file_id, e);
                self.assemble_and_persist(file_id).await?
            }
        };

        let handle = LocalHandle::create(&self.handles, file_id, &blob).await?;
        self.session.insert(file_id, handle.clone());
        Ok(handle)
    }

    async fn assemble_and_persist(&self, file_id: &str) -> Result<Vec<u8>, ResolveError> {
        let blob = self.assembler.assemble(file_id).await?;
        if let Err(e) = self.blobs.put(file_id, &blob).await {
            // Only caching is lost; the blob is still handed back.
            tracing::warn!("StoreWriteFailure for {}: {}", file_id, e);
        }
        Ok(blob)
    }
}

#[derive(Debug, Default)]
enum SlotStatus {
    #[default]
    Idle,
    Loading,
    Ready(String),
    Failed(String),
}

#[derive(Default)]
struct SlotState {
    reference: Option<MediaReference>,
    /// Bumped on every reference change; results for an older generation
    /// are dropped.
    generation: u64,
    in_flight: bool,
    status: SlotStatus,
    handle: Option<LocalHandle>,
}

impl SlotState {
    fn view(&self) -> MediaView {
        match &self.status {
            SlotStatus::Idle => MediaView::default(),
            SlotStatus::Loading => MediaView { is_loading: true, ..MediaView::default() },
            SlotStatus::Ready(locator) => MediaView {
                handle: Some(locator.clone()),
                ..MediaView::default()
            },
            SlotStatus::Failed(message) => MediaView {
                error: Some(message.clone()),
                ..MediaView::default()
            },
        }
    }
}

/// Per-mount resolution state for one piece of media on screen.
///
/// Dropping the slot drops its handle clone; the handle is revoked unless
/// the session cache still retains it.
pub struct MediaSlot {
    retriever: Arc<MediaRetriever>,
    auto_load: bool,
    state: Mutex<SlotState>,
}

impl MediaSlot {
    fn state(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn view(&self) -> MediaView {
        self.state().view()
    }

    pub fn auto_load(&self) -> bool {
        self.auto_load
    }

    /// Points the slot at a new reference. An unchanged reference is a
    /// no-op; a changed one abandons any in-flight resolution.
    pub async fn set_reference(&self, reference: Option<&str>) -> MediaView {
        let parsed = reference.and_then(|raw| match raw.parse::<MediaReference>() {
            Ok(r) => Some(r),
            Err(e) => {
                tracing::debug!("treating {:?} as no media: {}", raw, e);
                None
            }
        });

        {
            let mut state = self.state();
            if state.generation > 0 && state.reference == parsed {
                return state.view();
            }
            state.reference = parsed;
            state.generation += 1;
            state.in_flight = false;
            state.status = SlotStatus::Idle;
            state.handle = None;
        }

        if self.auto_load {
            self.load().await
        } else {
            self.view()
        }
    }

    /// Resolves the current reference. Used directly for lazy loading when
    /// the slot was mounted without `auto_load`, and to retry after an error.
    pub async fn load(&self) -> MediaView {
        let (generation, file_id) = {
            let mut state = self.state();
            let file_id = match state.reference.clone() {
                None => {
                    state.status = SlotStatus::Idle;
                    return state.view();
                }
                Some(MediaReference::Direct(url)) => {
                    state.status = SlotStatus::Ready(url);
                    return state.view();
                }
                Some(MediaReference::Chunked(file_id)) => file_id,
            };

            if let Some(handle) = self.retriever.session.get(&file_id) {
                state.status = SlotStatus::Ready(handle.locator().to_string());
                state.handle = Some(handle);
                return state.view();
            }
            if state.in_flight {
                return state.view();
            }
            state.in_flight = true;
            state.status = SlotStatus::Loading;
            (state.generation, file_id)
        };

        let outcome = self.retriever.acquire(&file_id).await;

        let mut state = self.state();
        if state.generation != generation {
            tracing::debug!("discarding result for {}: reference changed", file_id);
            return state.view();
        }
        state.in_flight = false;
        match outcome {
            Ok(handle) => {
                state.status = SlotStatus::Ready(handle.locator().to_string());
                state.handle = Some(handle);
            }
            Err(e) => {
                tracing::error!("failed to resolve chunked://{}: {}", file_id, e);
                state.status = SlotStatus::Failed(e.user_message().to_string());
                state.handle = None;
            }
        }
        state.view()
    }
}
