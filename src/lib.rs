//! docchat-rag - local PDF RAG chat.
//!
//! Two pipelines over a directory of documents:
//! - build: collect -> extract -> chunk -> embed -> persisted flat vector
//!   index
//! - query: embed question -> top-k cosine search -> prompt -> Ollama
//!   generation, with cited sources

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod generator;
pub mod index;
pub mod pipeline;

// Re-exports
pub use collector::{FileCollector, SourceFile};
pub use config::RagConfig;
pub use embedding::{EmbeddingProvider, OllamaEmbedding};
pub use error::{RagError, Result};
pub use extractor::{Document, DocumentExtractor};
pub use generator::{Answer, Citation, GenerationBackend, OllamaGenerator, PromptBuilder};
pub use index::{
    cosine_similarity, Chunk, ChunkConfig, Chunker, IndexCache, ScoredChunk, TextChunker,
    VectorIndex,
};
pub use pipeline::{build_index, BuildReport, QueryPipeline};
