use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::clock::{Clock, SystemClock};
use crate::store::{check_id, BlobResult, BlobStore, CachedBlobRecord};

/// Process-local `BlobStore`. Nothing survives a restart; used for tests and
/// for hosts with no writable disk.
pub struct MemoryBlobStore {
    records: DashMap<String, CachedBlobRecord>,
    clock: Arc<dyn Clock>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { records: DashMap::new(), clock }
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, id: &str) -> BlobResult<Option<CachedBlobRecord>> {
        check_id(id)?;
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    async fn put(&self, id: &str, blob: &[u8]) -> BlobResult<()> {
        check_id(id)?;
        let record = CachedBlobRecord {
            id: id.to_string(),
            blob: blob.to_vec(),
            timestamp: self.clock.now_millis(),
        };
        self.records.insert(id.to_string(), record);
        Ok(())
    }

    async fn delete(&self, id: &str) -> BlobResult<bool> {
        check_id(id)?;
        Ok(self.records.remove(id).is_some())
    }

    async fn clear(&self) -> BlobResult<()> {
        self.records.clear();
        Ok(())
    }

    async fn len(&self) -> BlobResult<usize> {
        Ok(self.records.len())
    }
}
