//! Error taxonomy for the build and query pipelines.
//!
//! Build-time errors abort the build with no partial persisted index.
//! Query-time errors (`GenerationUnavailable`, `GenerationTimeout`) are
//! per-question and recoverable: the loaded index stays usable and the
//! caller may ask again. Nothing here retries automatically.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the RAG core.
#[derive(Debug, Error)]
pub enum RagError {
    /// No file in the source directory matched the extension filter.
    #[error("no files matching {extensions:?} found in {dir:?}")]
    NoMatchingFiles { dir: PathBuf, extensions: Vec<String> },

    /// A single document yielded no extractable text. Non-fatal: the build
    /// pipeline logs and skips the document.
    #[error("no text could be extracted from {file:?}: {reason}")]
    Extraction { file: PathBuf, reason: String },

    /// Every document in the corpus extracted to empty text.
    #[error("all {count} documents extracted to empty text; nothing to index")]
    EmptyCorpus { count: usize },

    /// No persisted index exists at the storage path.
    #[error("no index found at {path:?}; run `build` first")]
    IndexNotFound { path: PathBuf },

    /// A persisted index exists but is unreadable or inconsistent.
    #[error("index at {path:?} is corrupt: {reason}")]
    IndexCorrupt { path: PathBuf, reason: String },

    /// The persisted index was built with a different embedding model than
    /// the one currently configured.
    #[error("index was built with embedding model '{index_model}' but '{configured_model}' is configured; rebuild the index")]
    EmbeddingModelMismatch {
        index_model: String,
        configured_model: String,
    },

    /// The generation backend could not be reached.
    #[error("generation backend unreachable at {endpoint}: {reason}")]
    GenerationUnavailable { endpoint: String, reason: String },

    /// The generation call exceeded the configured timeout. Not retried:
    /// repeated timeouts usually mean an oversized prompt or an overloaded
    /// backend, not a transient fault.
    #[error("generation timed out after {seconds}s")]
    GenerationTimeout { seconds: u64 },

    /// Embedding backend failure (build- or query-time).
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Search was requested with `k == 0`.
    #[error("top-k must be >= 1")]
    InvalidTopK,

    /// Another build holds the advisory lock on the storage directory.
    /// `path` is the lock file itself; a crashed build leaves it behind,
    /// and the holder's PID is written inside.
    #[error("another build holds {path:?}; remove it if no build is running")]
    BuildLocked { path: PathBuf },

    /// Index serialization or deserialization failure.
    #[error("index persistence failed: {0}")]
    Persist(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// Whether the error leaves an already-loaded index usable, so the
    /// caller may simply ask another question.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RagError::GenerationUnavailable { .. } | RagError::GenerationTimeout { .. }
        )
    }
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;

// ============================================================================
// Tests
// ============================================================================
