use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::chunk_storage::store::{ChunkResult, ChunkStore};

/// In-memory `ChunkStore`. Counts reads so callers can assert how often the
/// remote store would have been hit.
#[derive(Debug, Default)]
pub struct MemoryChunkStore {
    chunks: DashMap<String, Vec<u8>>,
    reads: AtomicUsize,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get_chunk` calls served so far, including misses.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn put_chunk(&self, chunk_id: &str, data: &[u8]) -> ChunkResult<()> {
        self.chunks.insert(chunk_id.to_string(), data.to_vec());
        Ok(())
    }

    async fn get_chunk(&self, chunk_id: &str) -> ChunkResult<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.chunks
            .get(chunk_id)
            .map(|c| c.value().clone())
            .ok_or_else(|| format!("chunk {} not found", chunk_id).into())
    }

    async fn delete_chunk(&self, chunk_id: &str) -> ChunkResult<()> {
        self.chunks.remove(chunk_id);
        Ok(())
    }
}
