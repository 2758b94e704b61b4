use async_trait::async_trait;
use thiserror::Error;

pub type BlobResult<T> = Result<T, BlobStoreError>;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("I/O error while accessing the blob store")]
    Io(#[from] std::io::Error),

    #[error("blob record for {0} is corrupt")]
    Corrupt(String),

    #[error("file identifier must not be empty")]
    EmptyId,
}

/// One durable entry: the blob for a file identifier plus when it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedBlobRecord {
    pub id: String,
    pub blob: Vec<u8>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

/// Durable key-value store of binary blobs keyed by file identifier.
///
/// Records never expire. Writing an id that already exists replaces the
/// previous record (last write wins).
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Retrieves the record stored under `id`, if any.
    async fn get(&self, id: &str) -> BlobResult<Option<CachedBlobRecord>>;

    /// Stores `blob` under `id`, stamping it with the current time.
    async fn put(&self, id: &str, blob: &[u8]) -> BlobResult<()>;

    /// Removes the record under `id`. Returns whether one existed.
    async fn delete(&self, id: &str) -> BlobResult<bool>;

    /// Drops every record.
    async fn clear(&self) -> BlobResult<()>;

    async fn len(&self) -> BlobResult<usize>;
}

pub(crate) fn check_id(id: &str) -> BlobResult<()> {
    if id.is_empty() {
        return Err(BlobStoreError::EmptyId);
    }
    Ok(())
}
