//! Vector index module.
//!
//! - store: flat vector index with persist/load/search
//! - chunker: paragraph-aware text splitting
//! - cache: explicit loaded-index cache keyed by path + model

mod cache;
mod chunker;
mod store;

// Re-exports
pub use cache::IndexCache;
pub use chunker::{ChunkConfig, Chunker, TextChunker};
pub use store::{cosine_similarity, Chunk, ScoredChunk, VectorIndex, INDEX_FILE_NAME};
