#![allow(clippy::uninlined_format_args)]
#![deny(unused_qualifications)]

//! Client side media caching: resolving chunked media references to local
//! handles, and the intercepting worker that keeps fetched media offline.

pub mod error;
pub mod handle;
pub mod reference;
pub mod retriever;
pub mod session;
pub mod worker;

pub use error::{CacheStoreError, HandleError, NetworkError, ResolveError, WorkerError};
pub use handle::{HandleFactory, LocalHandle, MemoryHandleFactory, TempFileHandleFactory};
pub use reference::{MediaReference, CHUNKED_SCHEME};
pub use retriever::{MediaRetriever, MediaSlot, MediaView, RetrieverConfig};
pub use session::SessionBlobCache;
