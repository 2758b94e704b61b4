use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::fs;
use uuid::Uuid;

use crate::error::HandleError;

/// Turns a resolved blob into something the UI can render without
/// re-fetching it, and revokes it again.
#[async_trait]
pub trait HandleFactory: Send + Sync {
    /// Materialises `blob` and returns its locator.
    async fn create(&self, file_id: &str, blob: &[u8]) -> Result<String, HandleError>;

    /// Revokes a locator. Unknown or already revoked locators are ignored.
    fn revoke(&self, locator: &str);
}

struct HandleGuard {
    locator: String,
    factory: Arc<dyn HandleFactory>,
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        tracing::debug!("revoking local handle {}", self.locator);
        self.factory.revoke(&self.locator);
    }
}

/// A revocable local handle. Clones share one underlying resource, which is
/// revoked when the last clone is dropped.
#[derive(Clone)]
pub struct LocalHandle {
    inner: Arc<HandleGuard>,
}

impl LocalHandle {
    pub async fn create(
        factory: &Arc<dyn HandleFactory>,
        file_id: &str,
        blob: &[u8],
    ) -> Result<Self, HandleError> {
        let locator = factory.create(file_id, blob).await?;
        Ok(Self {
            inner: Arc::new(HandleGuard { locator, factory: factory.clone() }),
        })
    }

    pub fn locator(&self) -> &str {
        &self.inner.locator
    }

    pub fn same_as(&self, other: &LocalHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for LocalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LocalHandle").field(&self.inner.locator).finish()
    }
}

/// Object-URL style handles kept in memory: `blob:media-cache/<uuid>`.
#[derive(Default)]
pub struct MemoryHandleFactory {
    live: DashMap<String, Vec<u8>>,
}

impl MemoryHandleFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_live(&self, locator: &str) -> bool {
        self.live.contains_key(locator)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn read(&self, locator: &str) -> Option<Vec<u8>> {
        self.live.get(locator).map(|b| b.value().clone())
    }
}

#[async_trait]
impl HandleFactory for MemoryHandleFactory {
    async fn create(&self, _file_id: &str, blob: &[u8]) -> Result<String, HandleError> {
        let locator = format!("blob:media-cache/{}", Uuid::new_v4());
        self.live.insert(locator.clone(), blob.to_vec());
        Ok(locator)
    }

    fn revoke(&self, locator: &str) {
        self.live.remove(locator);
    }
}

/// Writes each blob to its own file under a scratch directory; the locator is
/// the file path. Revoking deletes the file.
pub struct TempFileHandleFactory {
    directory: PathBuf,
}

impl TempFileHandleFactory {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl HandleFactory for TempFileHandleFactory {
    async fn create(&self, _file_id: &str, blob: &[u8]) -> Result<String, HandleError> {
        fs::create_dir_all(&self.directory).await?;
        let path = self.directory.join(format!("{}.media", Uuid::new_v4()));
        fs::write(&path, blob).await?;
        Ok(path.to_string_lossy().into_owned())
    }

    fn revoke(&self, locator: &str) {
        // Runs from Drop, so this cannot be async.
        if let Err(e) = std::fs::remove_file(locator) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("failed to remove handle file {}: {}", locator, e);
            }
        }
    }
}
