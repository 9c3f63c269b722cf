//! Vector index - build, persist, load, search.
//!
//! A flat in-memory index over chunk vectors, persisted as a single JSON
//! structure with a schema version and a SHA-256 payload checksum. The
//! index is immutable after build/load, so any number of concurrent
//! searches may share it without coordination. Rebuilds overwrite the
//! persisted file wholesale; chunks from removed documents disappear with
//! the rebuild.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};

/// Persisted file name inside the storage directory.
pub const INDEX_FILE_NAME: &str = "index.json";

/// Persisted schema version.
const SCHEMA_VERSION: u32 = 1;

// ============================================================================
// Types
// ============================================================================

/// A retrieval unit: a span of one document's text plus its embedding.
/// Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Source file name.
    pub source: String,
    /// Position of this chunk within its document (0-based).
    pub chunk_index: usize,
    /// Chunk text.
    pub text: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// Metadata copied from the source document. BTreeMap keeps the
    /// serialized form deterministic for the payload checksum.
    pub metadata: BTreeMap<String, String>,
}

/// One search hit: a chunk and its similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity, higher is closer.
    pub score: f32,
}

// ============================================================================
// VectorIndex
// ============================================================================

/// Immutable flat vector index.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    chunks: Vec<Chunk>,
    embedding_model: String,
    dimension: usize,
    built_at: DateTime<Utc>,
}

/// On-disk payload. Field order is fixed, so serialization is
/// deterministic and the checksum can be recomputed on load.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedPayload {
    embedding_model: String,
    dimension: usize,
    built_at: DateTime<Utc>,
    chunks: Vec<Chunk>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedFile {
    schema_version: u32,
    /// SHA-256 hex digest of the serialized payload.
    checksum: String,
    payload: PersistedPayload,
}

impl VectorIndex {
    /// Build an index from chunks embedded with `embedding_model`.
    ///
    /// Every vector must have `dimension` entries.
    pub fn build(chunks: Vec<Chunk>, embedding_model: &str, dimension: usize) -> Result<Self> {
        for chunk in &chunks {
            if chunk.vector.len() != dimension {
                return Err(RagError::Embedding(format!(
                    "chunk {} of '{}' has {} dimensions, expected {}",
                    chunk.chunk_index,
                    chunk.source,
                    chunk.vector.len(),
                    dimension
                )));
            }
        }

        Ok(Self {
            chunks,
            embedding_model: embedding_model.to_string(),
            dimension,
            built_at: Utc::now(),
        })
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunks in insertion order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Embedding model the index was built with.
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Path of the persisted index file under `storage_dir`.
    pub fn file_path(storage_dir: &Path) -> PathBuf {
        storage_dir.join(INDEX_FILE_NAME)
    }

    /// Serialize to `storage_dir/index.json`.
    ///
    /// The payload is written to a temp file in the same directory and
    /// renamed into place, so a crash mid-write can never leave a file
    /// that loads as a truncated index.
    pub fn persist(&self, storage_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(storage_dir)?;

        let payload = PersistedPayload {
            embedding_model: self.embedding_model.clone(),
            dimension: self.dimension,
            built_at: self.built_at,
            chunks: self.chunks.clone(),
        };

        let payload_bytes = serde_json::to_vec(&payload)?;
        let file = PersistedFile {
            schema_version: SCHEMA_VERSION,
            checksum: sha256_hex(&payload_bytes),
            payload,
        };

        let target = Self::file_path(storage_dir);
        let tmp = storage_dir.join(format!("{}.tmp", INDEX_FILE_NAME));

        std::fs::write(&tmp, serde_json::to_vec(&file)?)?;
        std::fs::rename(&tmp, &target)?;

        tracing::info!(
            "persisted index: {} chunks, model '{}', at {}",
            self.chunks.len(),
            self.embedding_model,
            target.display()
        );
        Ok(())
    }

    /// Load a previously persisted index.
    ///
    /// Fails with [`RagError::IndexNotFound`] when no file exists and
    /// [`RagError::IndexCorrupt`] when the file is unreadable, carries an
    /// unknown schema, fails its checksum, or contains vectors of
    /// inconsistent dimensionality.
    pub fn load(storage_dir: &Path) -> Result<Self> {
        let path = Self::file_path(storage_dir);
        if !path.exists() {
            return Err(RagError::IndexNotFound { path });
        }

        let bytes = std::fs::read(&path)?;
        let file: PersistedFile =
            serde_json::from_slice(&bytes).map_err(|e| RagError::IndexCorrupt {
                path: path.clone(),
                reason: format!("parse failed: {}", e),
            })?;

        if file.schema_version != SCHEMA_VERSION {
            return Err(RagError::IndexCorrupt {
                path,
                reason: format!(
                    "schema version {} unsupported (expected {})",
                    file.schema_version, SCHEMA_VERSION
                ),
            });
        }

        let payload_bytes = serde_json::to_vec(&file.payload)?;
        let checksum = sha256_hex(&payload_bytes);
        if checksum != file.checksum {
            return Err(RagError::IndexCorrupt {
                path,
                reason: "checksum mismatch".to_string(),
            });
        }

        let payload = file.payload;
        for chunk in &payload.chunks {
            if chunk.vector.len() != payload.dimension {
                return Err(RagError::IndexCorrupt {
                    path,
                    reason: format!(
                        "chunk {} of '{}' has {} dimensions, index declares {}",
                        chunk.chunk_index,
                        chunk.source,
                        chunk.vector.len(),
                        payload.dimension
                    ),
                });
            }
        }

        tracing::info!(
            "loaded index: {} chunks, model '{}'",
            payload.chunks.len(),
            payload.embedding_model
        );

        Ok(Self {
            chunks: payload.chunks,
            embedding_model: payload.embedding_model,
            dimension: payload.dimension,
            built_at: payload.built_at,
        })
    }

    /// Top-k nearest chunks by cosine similarity, descending; ties keep
    /// insertion order. `k` beyond the chunk count returns everything.
    ///
    /// Read-only: safe to call concurrently through a shared reference.
    pub fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Err(RagError::InvalidTopK);
        }
        if query_vector.len() != self.dimension {
            return Err(RagError::Embedding(format!(
                "query vector has {} dimensions, index has {}",
                query_vector.len(),
                self.dimension
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| (i, cosine_similarity(query_vector, &chunk.vector)))
            .collect();

        // Stable sort keeps insertion order on equal scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.chunks[i].clone(),
                score,
            })
            .collect())
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// Cosine similarity between two vectors, in [-1, 1]. Mismatched or empty
/// inputs score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

// ============================================================================
// Tests
// ============================================================================
