use blob_store::AssembleError;
use thiserror::Error;


#[derive(Debug, Error)]
pub enum HandleError {
    #[error("failed to create a local handle")]
    Io(#[from] std::io::Error),
}

/// Why a chunked reference could not be turned into a local handle.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to assemble media file")]
    Assemble(#[from] AssembleError),

    #[error(transparent)]
    Handle(#[from] HandleError),
}

impl ResolveError {
    /// Short text shown in place of the media.
    pub fn user_message(&self) -> &'static str {
        match self {
            ResolveError::Assemble(AssembleError::Fetch { .. }) => {
                "This media could not be downloaded. Check your connection and try again."
            }
            ResolveError::Assemble(AssembleError::Integrity { .. }) => {
                "This media file is incomplete or damaged."
            }
            ResolveError::Handle(_) => "This media could not be opened on this device.",
        }
    }
}

#[derive(Debug, Error)]
#[error("request to {url} failed: {reason}")]
pub struct NetworkError {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("I/O error while accessing the network cache")]
    Io(#[from] std::io::Error),

    #[error("failed to encode or decode a cached response")]
    Encoding(#[from] serde_json::Error),

    #[error("invalid cache namespace {0:?}")]
    InvalidNamespace(String),

    #[error("corrupt cache entry {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("network cache failure")]
    CacheStore(#[from] CacheStoreError),

    #[error("unknown control message {0:?}")]
    UnknownMessage(String),

    #[error("failed to encode control reply")]
    Encoding(#[from] serde_json::Error),

    #[error("the cache worker is no longer running")]
    Closed,
}
