use quick_cache::sync::Cache;

use crate::handle::LocalHandle;

/// Session scoped map from file identifier to a live local handle.
///
/// Only avoids repeat handle creation and store lookups while the process
/// runs; durability lives in the blob store. Evicted or released entries
/// drop their clone of the handle, which revokes it once no slot still
/// displays it.
pub struct SessionBlobCache {
    entries: Cache<String, LocalHandle>,
}

impl SessionBlobCache {
    pub fn new(capacity: usize) -> Self {
        Self { entries: Cache::new(capacity.max(1)) }
    }

    pub fn get(&self, file_id: &str) -> Option<LocalHandle> {
        self.entries.get(file_id)
    }

    pub fn insert(&self, file_id: &str, handle: LocalHandle) {
        self.entries.insert(file_id.to_string(), handle);
    }

    /// Whether `handle` is still the entry retained for `file_id`.
    pub fn retains(&self, file_id: &str, handle: &LocalHandle) -> bool {
        self.entries
            .get(file_id)
            .map(|held| held.same_as(handle))
            .unwrap_or(false)
    }

    /// Drops the entry for `file_id`. Returns whether one was held.
    pub fn release(&self, file_id: &str) -> bool {
        self.entries.remove(file_id).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
