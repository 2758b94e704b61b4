use async_trait::async_trait;

use crate::error::NetworkError;
use crate::worker::response::{InterceptedRequest, MediaResponse};

/// The real network behind the worker.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Performs `request`. Only transport failures are errors; any HTTP
    /// status comes back as a response.
    async fn fetch(&self, request: &InterceptedRequest) -> Result<MediaResponse, NetworkError>;
}

#[derive(Clone, Debug, Default)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<MediaResponse, NetworkError> {
        let network_error = |reason: String| NetworkError { url: request.url.clone(), reason };

        let method = reqwest::Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|e| network_error(e.to_string()))?;
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let resp = builder.send().await.map_err(|e| network_error(e.to_string()))?;
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = resp.bytes().await.map_err(|e| network_error(e.to_string()))?.to_vec();
        Ok(MediaResponse { status, headers, body })
    }
}
