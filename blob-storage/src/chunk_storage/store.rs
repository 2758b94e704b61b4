use std::error::Error;
use async_trait::async_trait;


pub type ChunkResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Trait for storing and fetching chunks by their IDs.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Stores a chunk by its id.
    async fn put_chunk(&self, chunk_id: &str, data: &[u8]) -> ChunkResult<()>;

    /// Retrieves a chunk by its id.
    async fn get_chunk(&self, chunk_id: &str) -> ChunkResult<Vec<u8>>;

    async fn delete_chunk(&self, chunk_id: &str) -> ChunkResult<()>;
}
