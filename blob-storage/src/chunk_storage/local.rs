use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;

use crate::chunk_storage::store::{ChunkResult, ChunkStore};
use crate::digest::compute_hash;

/// A `ChunkStore` that writes chunks to a local directory.
///
/// Chunk ids are hashed into file names, so manifest keys like
/// `file123.manifest` and digest ids share one flat directory.
#[derive(Clone, Debug)]
pub struct LocalChunkStore {
    directory: PathBuf,
}

impl LocalChunkStore {
    /// Creates a new `LocalChunkStore` targeting the specified directory.
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }

    fn chunk_path(&self, chunk_id: &str) -> PathBuf {
        self.directory.join(compute_hash(chunk_id.as_bytes()))
    }
}

#[async_trait]
impl ChunkStore for LocalChunkStore {
    async fn put_chunk(&self, chunk_id: &str, data: &[u8]) -> ChunkResult<()> {
        fs::create_dir_all(&self.directory).await?;
        fs::write(self.chunk_path(chunk_id), data).await?;
        Ok(())
    }

    async fn get_chunk(&self, chunk_id: &str) -> ChunkResult<Vec<u8>> {
        let data = fs::read(self.chunk_path(chunk_id)).await?;
        Ok(data)
    }

    async fn delete_chunk(&self, chunk_id: &str) -> ChunkResult<()> {
        fs::remove_file(self.chunk_path(chunk_id)).await?;
        Ok(())
    }
}
