use std::error::Error;
use std::sync::Arc;

use thiserror::Error;

use crate::chunk_reference::{manifest_key, ChunkManifest, ChunkReference};
use crate::chunk_storage::ChunkStore;
use crate::digest::compute_hash;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("failed to store {what} of file {file_id}")]
    Store {
        file_id: String,
        what: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },

    #[error("failed to encode manifest")]
    Manifest(#[from] serde_json::Error),
}

/// Splits `data` into ordered parts of at most `chunk_size` bytes and builds
/// the matching manifest. An empty file has zero parts.
pub fn split<'a>(
    file_id: &str,
    data: &'a [u8],
    chunk_size: usize,
) -> Result<(ChunkManifest, Vec<&'a [u8]>), UploadError> {
    if chunk_size == 0 {
        return Err(UploadError::ZeroChunkSize);
    }
    let parts: Vec<&[u8]> = data.chunks(chunk_size).collect();
    let chunks = parts
        .iter()
        .enumerate()
        .map(|(index, part)| ChunkReference {
            index: index as u32,
            id: compute_hash(part),
            size: part.len() as u64,
        })
        .collect::<Vec<_>>();
    let manifest = ChunkManifest {
        file_id: file_id.to_string(),
        total_size: data.len() as u64,
        part_count: chunks.len() as u32,
        chunks,
    };
    Ok((manifest, parts))
}

/// Upload side of the chunk protocol.
pub struct ChunkUploader {
    store: Arc<dyn ChunkStore>,
}

impl ChunkUploader {
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self { store }
    }

    /// Stores every part, then the manifest. Writing the manifest last means
    /// a reader never sees a manifest whose parts are not all present yet.
    pub async fn upload(
        &self,
        file_id: &str,
        data: &[u8],
        chunk_size: usize,
    ) -> Result<ChunkManifest, UploadError> {
        let (manifest, parts) = split(file_id, data, chunk_size)?;
        for (chunk, part) in manifest.chunks.iter().zip(parts) {
            self.store
                .put_chunk(&chunk.id, part)
                .await
                .map_err(|source| UploadError::Store {
                    file_id: file_id.to_string(),
                    what: format!("part {}", chunk.index),
                    source,
                })?;
        }
        let encoded = serde_json::to_vec(&manifest)?;
        self.store
            .put_chunk(&manifest_key(file_id), &encoded)
            .await
            .map_err(|source| UploadError::Store {
                file_id: file_id.to_string(),
                what: "manifest".to_string(),
                source,
            })?;
        tracing::info!(
            "uploaded {} as {} parts ({} bytes)",
            file_id,
            manifest.part_count,
            manifest.total_size
        );
        Ok(manifest)
    }
}
