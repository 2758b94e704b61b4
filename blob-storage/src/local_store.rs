use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use tokio::fs;

use crate::clock::{Clock, SystemClock};
use crate::digest::compute_hash;
use crate::store::{check_id, BlobResult, BlobStore, BlobStoreError, CachedBlobRecord};

const RECORD_EXT: &str = "blob";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A `BlobStore` that keeps one file per record under a base directory.
///
/// File names are the SHA-256 of the file identifier so arbitrary ids are
/// safe as path components. Each file holds an 8 byte timestamp, a 4 byte id
/// length, the id, then the blob, all big endian.
pub struct LocalFileBlobStore {
    base_path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl LocalFileBlobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> BlobResult<Self> {
        Self::with_clock(base_path, Arc::new(SystemClock))
    }

    pub fn with_clock(base_path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> BlobResult<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path, clock })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.base_path
            .join(format!("{}.{}", compute_hash(id.as_bytes()), RECORD_EXT))
    }
}

fn encode_record(id: &str, blob: &[u8], timestamp: u64) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(12 + id.len() + blob.len());
    buf.write_u64::<BigEndian>(timestamp)?;
    buf.write_u32::<BigEndian>(id.len() as u32)?;
    buf.write_all(id.as_bytes())?;
    buf.write_all(blob)?;
    Ok(buf)
}

fn decode_record(expected_id: &str, bytes: Vec<u8>) -> BlobResult<CachedBlobRecord> {
    let corrupt = || BlobStoreError::Corrupt(expected_id.to_string());
    let mut cursor = Cursor::new(bytes);
    let timestamp = cursor.read_u64::<BigEndian>().map_err(|_| corrupt())?;
    let id_len = cursor.read_u32::<BigEndian>().map_err(|_| corrupt())? as usize;
    let remaining = cursor.get_ref().len().saturating_sub(cursor.position() as usize);
    if id_len > remaining {
        return Err(corrupt());
    }
    let mut id = vec![0u8; id_len];
    cursor.read_exact(&mut id).map_err(|_| corrupt())?;
    let id = String::from_utf8(id).map_err(|_| corrupt())?;
    // hash collision or a file copied in from elsewhere
    if id != expected_id {
        return Err(corrupt());
    }
    let offset = cursor.position() as usize;
    let mut blob = cursor.into_inner();
    blob.drain(..offset);
    Ok(CachedBlobRecord { id, blob, timestamp })
}

#[async_trait]
impl BlobStore for LocalFileBlobStore {
    async fn get(&self, id: &str) -> BlobResult<Option<CachedBlobRecord>> {
        check_id(id)?;
        let path = self.record_path(id);
        match fs::read(&path).await {
            Ok(bytes) => decode_record(id, bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, id: &str, blob: &[u8]) -> BlobResult<()> {
        check_id(id)?;
        let encoded = encode_record(id, blob, self.clock.now_millis())?;
        let path = self.record_path(id);
        // Write aside and rename so readers never observe a torn record.
        let tmp = path.with_extension(format!(
            "tmp-{}-{}",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, encoded).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        tracing::debug!("stored blob {} ({} bytes)", id, blob.len());
        Ok(())
    }

    async fn delete(&self, id: &str) -> BlobResult<bool> {
        check_id(id)?;
        match fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> BlobResult<()> {
        let mut entries = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }

    async fn len(&self) -> BlobResult<usize> {
        let mut count = 0;
        let mut entries = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().and_then(|e| e.to_str()) == Some(RECORD_EXT) {
                count += 1;
            }
        }
        Ok(count)
    }
}
