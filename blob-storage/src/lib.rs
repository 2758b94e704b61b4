//! Storage primitives for the media cache: a durable blob store keyed by
//! file identifier, chunk stores, and the chunked upload protocol.

pub mod assembler;
pub mod chunk_reference;
pub mod chunk_storage;
pub mod clock;
pub mod digest;
pub mod local_store;
pub mod memory_store;
pub mod store;
pub mod uploader;

pub use assembler::{AssembleError, ChunkAssembler};
pub use chunk_reference::{manifest_key, ChunkManifest, ChunkReference};
pub use clock::{Clock, ManualClock, SystemClock};
pub use local_store::LocalFileBlobStore;
pub use memory_store::MemoryBlobStore;
pub use store::{BlobResult, BlobStore, BlobStoreError, CachedBlobRecord};
pub use uploader::{ChunkUploader, UploadError};
