//! Loaded-index cache.
//!
//! Repeated invocations against one storage path share a single loaded
//! [`VectorIndex`]. The cache is explicit and invalidatable, keyed by
//! storage path plus embedding model id, never an implicit global.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{RagError, Result};

use super::store::VectorIndex;

/// Cache of loaded indices.
#[derive(Default)]
pub struct IndexCache {
    entries: Mutex<HashMap<(PathBuf, String), Arc<VectorIndex>>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the index at `storage_dir`, reusing a cached copy when one
    /// exists for this path and model.
    ///
    /// Fails with [`RagError::EmbeddingModelMismatch`] when the persisted
    /// index was built with a different model than `expected_model`.
    pub fn get_or_load(&self, storage_dir: &Path, expected_model: &str) -> Result<Arc<VectorIndex>> {
        let key = (storage_dir.to_path_buf(), expected_model.to_string());

        if let Some(index) = self.lock().get(&key) {
            return Ok(Arc::clone(index));
        }

        let index = VectorIndex::load(storage_dir)?;
        if index.embedding_model() != expected_model {
            return Err(RagError::EmbeddingModelMismatch {
                index_model: index.embedding_model().to_string(),
                configured_model: expected_model.to_string(),
            });
        }

        let index = Arc::new(index);
        self.lock().insert(key, Arc::clone(&index));
        Ok(index)
    }

    /// Drop the cached entry for one path/model pair (e.g. after a
    /// rebuild).
    pub fn invalidate(&self, storage_dir: &Path, model: &str) {
        self.lock()
            .remove(&(storage_dir.to_path_buf(), model.to_string()));
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(PathBuf, String), Arc<VectorIndex>>> {
        // Lock poisoning only happens if a holder panicked; the map itself
        // stays consistent, so recover the guard.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Chunk;
    use std::collections::BTreeMap;

    fn persist_sample(dir: &Path, model: &str) {
        let chunks = vec![Chunk {
            source: "a.pdf".to_string(),
            chunk_index: 0,
            text: "text".to_string(),
            vector: vec![1.0, 0.0],
            metadata: BTreeMap::new(),
        }];
        VectorIndex::build(chunks, model, 2)
            .unwrap()
            .persist(dir)
            .unwrap();
    }

    #[test]
    fn test_cache_reuses_loaded_index() {
        let tmp = tempfile::tempdir().unwrap();
        persist_sample(tmp.path(), "model-a");

        let cache = IndexCache::new();
        let first = cache.get_or_load(tmp.path(), "model-a").unwrap();
        let second = cache.get_or_load(tmp.path(), "model-a").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_cache_rejects_model_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        persist_sample(tmp.path(), "model-a");

        let cache = IndexCache::new();
        let err = cache.get_or_load(tmp.path(), "model-b").unwrap_err();
        assert!(matches!(err, RagError::EmbeddingModelMismatch { .. }));
    }

    #[test]
    fn test_invalidate_reloads_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        persist_sample(tmp.path(), "model-a");

        let cache = IndexCache::new();
        let first = cache.get_or_load(tmp.path(), "model-a").unwrap();

        cache.invalidate(tmp.path(), "model-a");
        let second = cache.get_or_load(tmp.path(), "model-a").unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
    }
}
