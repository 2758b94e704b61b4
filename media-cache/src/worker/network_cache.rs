use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use blob_store::digest::compute_hash;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::CacheStoreError;
use crate::worker::response::MediaResponse;

pub type CacheResult<T> = Result<T, CacheStoreError>;

/// Durable request -> response storage, split into named namespaces.
///
/// Entries never expire; a namespace goes away only when it is deleted as a
/// whole.
#[async_trait]
pub trait NetworkCache: Send + Sync {
    async fn lookup(&self, namespace: &str, key: &str) -> CacheResult<Option<MediaResponse>>;

    async fn store(&self, namespace: &str, key: &str, response: &MediaResponse) -> CacheResult<()>;

    /// Keys in `namespace` with the body size of each entry.
    async fn entries(&self, namespace: &str) -> CacheResult<Vec<(String, u64)>>;

    async fn namespaces(&self) -> CacheResult<Vec<String>>;

    /// Returns whether the namespace existed.
    async fn delete_namespace(&self, namespace: &str) -> CacheResult<bool>;
}

#[derive(Default)]
pub struct MemoryNetworkCache {
    spaces: DashMap<String, HashMap<String, MediaResponse>>,
}

impl MemoryNetworkCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NetworkCache for MemoryNetworkCache {
    async fn lookup(&self, namespace: &str, key: &str) -> CacheResult<Option<MediaResponse>> {
        Ok(self
            .spaces
            .get(namespace)
            .and_then(|space| space.get(key).cloned()))
    }

    async fn store(&self, namespace: &str, key: &str, response: &MediaResponse) -> CacheResult<()> {
        self.spaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), response.clone());
        Ok(())
    }

    async fn entries(&self, namespace: &str) -> CacheResult<Vec<(String, u64)>> {
        Ok(self
            .spaces
            .get(namespace)
            .map(|space| {
                space
                    .iter()
                    .map(|(k, v)| (k.clone(), v.body.len() as u64))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn namespaces(&self) -> CacheResult<Vec<String>> {
        Ok(self.spaces.iter().map(|e| e.key().clone()).collect())
    }

    async fn delete_namespace(&self, namespace: &str) -> CacheResult<bool> {
        Ok(self.spaces.remove(namespace).is_some())
    }
}

#[derive(Serialize, Deserialize)]
struct EntryMeta {
    key: String,
    status: u16,
    headers: Vec<(String, String)>,
}

const ENTRY_EXT: &str = "entry";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// `NetworkCache` on disk: one directory per namespace and one file per
/// entry. The file holds a BE u32 meta length, the JSON meta, then the raw
/// body. Entries are written aside and renamed into place, so a reader sees
/// either the previous entry or the new one in full.
pub struct DiskNetworkCache {
    root: PathBuf,
}

impl DiskNetworkCache {
    pub fn new(root: impl Into<PathBuf>) -> CacheResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn namespace_dir(&self, namespace: &str) -> CacheResult<PathBuf> {
        let valid = !namespace.is_empty()
            && !namespace.starts_with('.')
            && namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(CacheStoreError::InvalidNamespace(namespace.to_string()));
        }
        Ok(self.root.join(namespace))
    }

    fn entry_path(dir: &Path, key: &str) -> PathBuf {
        dir.join(format!("{}.{}", compute_hash(key.as_bytes()), ENTRY_EXT))
    }
}

fn encode_entry(key: &str, response: &MediaResponse) -> CacheResult<Vec<u8>> {
    let meta = serde_json::to_vec(&EntryMeta {
        key: key.to_string(),
        status: response.status,
        headers: response.headers.clone(),
    })?;
    let mut buf = Vec::with_capacity(4 + meta.len() + response.body.len());
    buf.write_u32::<BigEndian>(meta.len() as u32)?;
    buf.write_all(&meta)?;
    buf.write_all(&response.body)?;
    Ok(buf)
}

fn decode_entry(path: &Path, mut bytes: Vec<u8>) -> CacheResult<(EntryMeta, Vec<u8>)> {
    let corrupt = || CacheStoreError::Corrupt(path.display().to_string());
    let meta_len = (&bytes[..]).read_u32::<BigEndian>().map_err(|_| corrupt())? as usize;
    let body_start = 4usize.checked_add(meta_len).filter(|&end| end <= bytes.len()).ok_or_else(corrupt)?;
    let meta: EntryMeta = serde_json::from_slice(&bytes[4..body_start])?;
    bytes.drain(..body_start);
    Ok((meta, bytes))
}

async fn read_optional(path: &Path) -> CacheResult<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl NetworkCache for DiskNetworkCache {
    async fn lookup(&self, namespace: &str, key: &str) -> CacheResult<Option<MediaResponse>> {
        let dir = self.namespace_dir(namespace)?;
        let path = Self::entry_path(&dir, key);
        let Some(raw) = read_optional(&path).await? else {
            return Ok(None);
        };
        let (meta, body) = decode_entry(&path, raw)?;
        if meta.key != key {
            return Ok(None);
        }
        Ok(Some(MediaResponse { status: meta.status, headers: meta.headers, body }))
    }

    async fn store(&self, namespace: &str, key: &str, response: &MediaResponse) -> CacheResult<()> {
        let dir = self.namespace_dir(namespace)?;
        fs::create_dir_all(&dir).await?;
        let path = Self::entry_path(&dir, key);
        let tmp = path.with_extension(format!(
            "tmp-{}-{}",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, encode_entry(key, response)?).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn entries(&self, namespace: &str) -> CacheResult<Vec<(String, u64)>> {
        let dir = self.namespace_dir(namespace)?;
        let mut listing = match fs::read_dir(&dir).await {
            Ok(listing) => listing,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut found = Vec::new();
        while let Some(entry) = listing.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                continue;
            }
            // cleared between listing and reading
            let Some(raw) = read_optional(&path).await? else {
                continue;
            };
            let (meta, body) = decode_entry(&path, raw)?;
            found.push((meta.key, body.len() as u64));
        }
        Ok(found)
    }

    async fn namespaces(&self) -> CacheResult<Vec<String>> {
        let mut listing = fs::read_dir(&self.root).await?;
        let mut names = Vec::new();
        while let Some(entry) = listing.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    async fn delete_namespace(&self, namespace: &str) -> CacheResult<bool> {
        let dir = self.namespace_dir(namespace)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
