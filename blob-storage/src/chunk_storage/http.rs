use async_trait::async_trait;

use crate::chunk_storage::store::{ChunkResult, ChunkStore};

/// A `ChunkStore` backed by a remote object store reachable over plain HTTP,
/// one object per chunk under `base_url`.
#[derive(Clone, Debug)]
pub struct HttpChunkStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpChunkStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::default())
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    fn object_url(&self, chunk_id: &str) -> String {
        format!("{}/{}", self.base_url, chunk_id)
    }
}

fn status_error(method: &str, url: &str, status: reqwest::StatusCode) -> Box<dyn std::error::Error + Send + Sync> {
    format!("{} {} returned HTTP {}", method, url, status).into()
}

#[async_trait]
impl ChunkStore for HttpChunkStore {
    async fn put_chunk(&self, chunk_id: &str, data: &[u8]) -> ChunkResult<()> {
        let url = self.object_url(chunk_id);
        tracing::debug!("uploading chunk to {}", url);
        let resp = self.client.put(&url).body(data.to_vec()).send().await?;
        if !resp.status().is_success() {
            return Err(status_error("PUT", &url, resp.status()));
        }
        Ok(())
    }

    async fn get_chunk(&self, chunk_id: &str) -> ChunkResult<Vec<u8>> {
        let url = self.object_url(chunk_id);
        tracing::debug!("fetching chunk from {}", url);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(status_error("GET", &url, resp.status()));
        }
        Ok(resp.bytes().await?.to_vec())
    }

    async fn delete_chunk(&self, chunk_id: &str) -> ChunkResult<()> {
        let url = self.object_url(chunk_id);
        let resp = self.client.delete(&url).send().await?;
        if !resp.status().is_success() {
            return Err(status_error("DELETE", &url, resp.status()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_joins_without_double_slash() {
        let store = HttpChunkStore::new("https://x.supabase.co/storage/v1/object/public/chunks/");
        assert_eq!(
            store.object_url("file123.manifest"),
            "https://x.supabase.co/storage/v1/object/public/chunks/file123.manifest"
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_an_error() {
        // port 9 (discard) on loopback is closed in test environments
        let store = HttpChunkStore::new("http://127.0.0.1:9");
        assert!(store.get_chunk("missing").await.is_err());
    }
}
