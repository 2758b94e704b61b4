use std::error::Error;
use std::sync::Arc;

use thiserror::Error;

use crate::chunk_reference::{manifest_key, ChunkManifest};
use crate::chunk_storage::ChunkStore;
use crate::digest::compute_hash;

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("failed to fetch {what} of file {file_id}")]
    Fetch {
        file_id: String,
        what: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },

    #[error("chunk set of file {file_id} is incomplete or inconsistent: {reason}")]
    Integrity { file_id: String, reason: String },
}

impl AssembleError {
    fn integrity(file_id: &str, reason: impl Into<String>) -> Self {
        AssembleError::Integrity { file_id: file_id.to_string(), reason: reason.into() }
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self, AssembleError::Integrity { .. })
    }
}

/// Rebuilds a chunked upload from its manifest and parts.
///
/// Success is all or nothing: the caller either gets the complete,
/// byte-identical file or an error.
#[derive(Clone)]
pub struct ChunkAssembler {
    store: Arc<dyn ChunkStore>,
}

impl ChunkAssembler {
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self { store }
    }

    pub async fn fetch_manifest(&self, file_id: &str) -> Result<ChunkManifest, AssembleError> {
        let raw = self
            .store
            .get_chunk(&manifest_key(file_id))
            .await
            .map_err(|source| AssembleError::Fetch {
                file_id: file_id.to_string(),
                what: "manifest".to_string(),
                source,
            })?;
        let manifest: ChunkManifest = serde_json::from_slice(&raw)
            .map_err(|e| AssembleError::integrity(file_id, format!("unreadable manifest: {}", e)))?;
        manifest
            .check(file_id)
            .map_err(|reason| AssembleError::integrity(file_id, reason))?;
        Ok(manifest)
    }

    pub async fn assemble(&self, file_id: &str) -> Result<Vec<u8>, AssembleError> {
        let manifest = self.fetch_manifest(file_id).await?;
        tracing::debug!(
            "assembling {} from {} parts ({} bytes)",
            file_id,
            manifest.part_count,
            manifest.total_size
        );

        // Declared sizes are untrusted until each part has been checked, so
        // the buffer only grows by bytes actually received.
        let mut assembled = Vec::new();
        // Parts are fetched strictly in index order.
        for chunk in &manifest.chunks {
            let part = self
                .store
                .get_chunk(&chunk.id)
                .await
                .map_err(|source| AssembleError::Fetch {
                    file_id: file_id.to_string(),
                    what: format!("part {}", chunk.index),
                    source,
                })?;
            if part.len() as u64 != chunk.size {
                return Err(AssembleError::integrity(
                    file_id,
                    format!("part {} is {} bytes, expected {}", chunk.index, part.len(), chunk.size),
                ));
            }
            if compute_hash(&part) != chunk.id {
                return Err(AssembleError::integrity(
                    file_id,
                    format!("part {} does not match its digest", chunk.index),
                ));
            }
            assembled.extend_from_slice(&part);
        }
        Ok(assembled)
    }
}
