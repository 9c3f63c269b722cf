//! Pipeline configuration.
//!
//! Everything the two pipelines need is carried in one explicit
//! [`RagConfig`] handed to each entry point. No ambient globals, so a test
//! can run an independently configured pipeline against a fake backend.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::index::ChunkConfig;

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default generation model (small, fast on laptop-class hardware).
pub const DEFAULT_GENERATION_MODEL: &str = "llama3.2:1b";

/// Default embedding model and its output dimension.
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;

/// RAG pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Directory containing source documents (read-only input).
    pub source_dir: PathBuf,
    /// Directory holding the persisted index.
    pub storage_dir: PathBuf,
    /// Accepted file extensions (lowercase, no dot).
    pub extensions: Vec<String>,

    /// Ollama base URL.
    pub ollama_url: String,
    /// Generation model identifier.
    pub generation_model: String,
    /// Embedding model identifier. Recorded in the persisted index; a
    /// mismatch at load time is fatal to query startup.
    pub embedding_model: String,
    /// Expected embedding dimension.
    pub embedding_dimension: usize,

    /// Sampling temperature for generation.
    pub temperature: f32,
    /// Model context window in tokens (`num_ctx`).
    pub context_window: usize,
    /// Generation request timeout in seconds.
    pub timeout_secs: u64,
    /// Number of chunks retrieved per question.
    pub top_k: usize,

    /// Chunking parameters.
    pub chunking: ChunkConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("./data"),
            storage_dir: default_storage_dir(),
            extensions: vec!["pdf".to_string()],
            ollama_url: ollama_url_from_env(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            temperature: 0.5,
            context_window: 4096,
            timeout_secs: 600,
            top_k: 2,
            chunking: ChunkConfig::default(),
        }
    }
}

impl RagConfig {
    /// Generation timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Prompt budget in characters derived from the context window.
    ///
    /// `num_ctx` is in tokens; 3 chars/token is a conservative estimate
    /// that keeps the packed prompt inside the model window without
    /// pulling in a tokenizer.
    pub fn prompt_budget_chars(&self) -> usize {
        self.context_window * 3
    }
}

/// Default storage directory: `~/.docchat-rag/storage`, falling back to a
/// relative path when no home directory is available.
pub fn default_storage_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".docchat-rag").join("storage"))
        .unwrap_or_else(|| PathBuf::from("./storage"))
}

/// Ollama base URL, overridable via `OLLAMA_BASE_URL`.
pub fn ollama_url_from_env() -> String {
    match std::env::var("OLLAMA_BASE_URL") {
        Ok(url) if !url.is_empty() => url,
        _ => DEFAULT_OLLAMA_URL.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
