pub mod http;
pub mod local;
pub mod memory;
pub mod store;

pub use http::HttpChunkStore;
pub use local::LocalChunkStore;
pub use memory::MemoryChunkStore;
pub use store::{ChunkResult, ChunkStore};
