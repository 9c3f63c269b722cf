//! The two pipelines.
//!
//! Build: collect -> extract -> chunk -> embed -> index -> persist.
//! Query: embed question -> top-k search -> prompt -> generate.
//!
//! Build and serve are separate invocations that never overlap on one
//! storage path; an advisory lock file guards against an accidental
//! concurrent rebuild. Build-time errors abort with no partial persisted
//! index. Query-time backend errors leave the loaded index intact.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::collector::FileCollector;
use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::extractor::DocumentExtractor;
use crate::generator::{Answer, GenerationBackend, PromptBuilder};
use crate::index::{Chunk, Chunker, IndexCache, ScoredChunk, TextChunker, VectorIndex};

// ============================================================================
// Build Pipeline
// ============================================================================

/// Summary of a completed build.
#[derive(Debug)]
pub struct BuildReport {
    /// Documents whose chunks made it into the index.
    pub documents_indexed: usize,
    /// Documents skipped because extraction produced no content.
    pub documents_skipped: usize,
    /// Total chunks embedded and persisted.
    pub chunks: usize,
}

/// Index the configured source directory and persist the result.
///
/// A document that fails extraction is logged and skipped; the build only
/// fails [`RagError::EmptyCorpus`] when every document is empty. Nothing
/// is persisted unless the whole build succeeds.
pub async fn build_index(
    config: &RagConfig,
    embedder: &dyn EmbeddingProvider,
) -> Result<BuildReport> {
    let _lock = BuildLock::acquire(&config.storage_dir)?;

    let files = FileCollector::new(&config.extensions).collect(&config.source_dir)?;
    let total_files = files.len();

    let extractor = DocumentExtractor::new();
    let mut documents = Vec::new();
    let mut skipped = 0usize;

    for file in &files {
        match extractor.extract(file).await {
            Ok(doc) => documents.push(doc),
            Err(RagError::Extraction { file, reason }) => {
                tracing::warn!("skipping {}: {}", file.display(), reason);
                skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    if documents.is_empty() {
        return Err(RagError::EmptyCorpus { count: total_files });
    }

    let chunker = TextChunker::new(config.chunking.clone());
    let mut chunks: Vec<Chunk> = Vec::new();

    for doc in &documents {
        let texts = chunker.chunk(&doc.text);
        tracing::info!("{}: {} chunks", doc.file_name, texts.len());

        let vectors = embedder.embed_batch(&texts).await?;
        for (i, (text, vector)) in texts.into_iter().zip(vectors).enumerate() {
            chunks.push(Chunk {
                source: doc.file_name.clone(),
                chunk_index: i,
                text,
                vector,
                metadata: doc.metadata.clone(),
            });
        }
    }

    if chunks.is_empty() {
        return Err(RagError::EmptyCorpus { count: total_files });
    }

    let index = VectorIndex::build(chunks, embedder.model_id(), embedder.dimension())?;
    index.persist(&config.storage_dir)?;

    Ok(BuildReport {
        documents_indexed: documents.len(),
        documents_skipped: skipped,
        chunks: index.len(),
    })
}

// ============================================================================
// Build Lock
// ============================================================================

/// Advisory lock file held for the duration of a build.
struct BuildLock {
    path: PathBuf,
}

impl BuildLock {
    const FILE_NAME: &'static str = ".build.lock";

    fn acquire(storage_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(storage_dir)?;
        let path = storage_dir.join(Self::FILE_NAME);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                // Record the holder so a stale lock can be diagnosed.
                use std::io::Write;
                let _ = write!(file, "{}", std::process::id());
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(RagError::BuildLocked { path })
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("failed to remove build lock {:?}: {}", self.path, e);
        }
    }
}

// ============================================================================
// Query Pipeline
// ============================================================================

/// Loaded, ready-to-serve query pipeline. The index is read once at open
/// and shared read-only; per-question backend failures do not unload it.
pub struct QueryPipeline {
    index: Arc<VectorIndex>,
    embedder: Box<dyn EmbeddingProvider>,
    backend: Box<dyn GenerationBackend>,
    prompt: PromptBuilder,
    top_k: usize,
}

impl QueryPipeline {
    /// Load the persisted index and wire it to the given embedder and
    /// generation backend.
    ///
    /// Fails with [`RagError::IndexNotFound`] / [`RagError::IndexCorrupt`]
    /// on storage problems and [`RagError::EmbeddingModelMismatch`] when
    /// the index was built with a different embedding model.
    pub fn open(
        config: &RagConfig,
        embedder: Box<dyn EmbeddingProvider>,
        backend: Box<dyn GenerationBackend>,
    ) -> Result<Self> {
        let index = Arc::new(VectorIndex::load(&config.storage_dir)?);
        Self::wire(config, index, embedder, backend)
    }

    /// Like [`QueryPipeline::open`], but sharing a loaded index through an
    /// explicit cache.
    pub fn open_cached(
        config: &RagConfig,
        cache: &IndexCache,
        embedder: Box<dyn EmbeddingProvider>,
        backend: Box<dyn GenerationBackend>,
    ) -> Result<Self> {
        let index = cache.get_or_load(&config.storage_dir, embedder.model_id())?;
        Self::wire(config, index, embedder, backend)
    }

    fn wire(
        config: &RagConfig,
        index: Arc<VectorIndex>,
        embedder: Box<dyn EmbeddingProvider>,
        backend: Box<dyn GenerationBackend>,
    ) -> Result<Self> {
        if index.embedding_model() != embedder.model_id() {
            return Err(RagError::EmbeddingModelMismatch {
                index_model: index.embedding_model().to_string(),
                configured_model: embedder.model_id().to_string(),
            });
        }
        if index.dimension() != embedder.dimension() {
            return Err(RagError::Embedding(format!(
                "index has {} dimensions but embedder '{}' produces {}",
                index.dimension(),
                embedder.model_id(),
                embedder.dimension()
            )));
        }

        Ok(Self {
            index,
            embedder,
            backend,
            prompt: PromptBuilder::new(config.prompt_budget_chars()),
            top_k: config.top_k.max(1),
        })
    }

    /// Answer one question: embed, retrieve, generate.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let retrieved = self.retrieve(question).await?;

        let prompt = self.prompt.build(question, &retrieved);
        tracing::debug!(
            "prompt: {} chars over {} chunks",
            prompt.len(),
            retrieved.len()
        );

        let text = self.backend.generate(&prompt).await?;
        Ok(Answer::new(text, &retrieved))
    }

    /// Retrieval only (no generation): top-k chunks for a question.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk>> {
        let query_vector = self.embedder.embed(question).await?;
        self.index.search(&query_vector, self.top_k)
    }

    /// The loaded index.
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ChunkConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Deterministic local embedder: buckets byte values into a fixed
    /// number of dimensions.
    struct FakeEmbedding {
        dimension: usize,
        model: String,
    }

    impl FakeEmbedding {
        fn new(model: &str) -> Self {
            Self {
                dimension: 8,
                model: model.to_string(),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedding {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut v = vec![0.0f32; self.dimension];
            for b in text.bytes() {
                v[b as usize % self.dimension] += 1.0;
            }
            Ok(v)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_id(&self) -> &str {
            &self.model
        }
    }

    /// Backend that fails the first call when `flaky`, then succeeds.
    struct FakeBackend {
        fail_next: AtomicBool,
    }

    impl FakeBackend {
        fn reliable() -> Self {
            Self {
                fail_next: AtomicBool::new(false),
            }
        }

        fn flaky() -> Self {
            Self {
                fail_next: AtomicBool::new(true),
            }
        }
    }

    #[async_trait]
    impl GenerationBackend for FakeBackend {
        async fn generate(&self, prompt: &str) -> Result<String> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(RagError::GenerationUnavailable {
                    endpoint: "http://localhost:11434/api/generate".to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            Ok(format!("grounded answer ({} prompt chars)", prompt.len()))
        }

        fn model_id(&self) -> &str {
            "fake-llm"
        }
    }

    fn test_config(source: &Path, storage: &Path) -> RagConfig {
        RagConfig {
            source_dir: source.to_path_buf(),
            storage_dir: storage.to_path_buf(),
            extensions: vec!["txt".to_string()],
            chunking: ChunkConfig {
                min_characters: 0,
                max_characters: 200,
                overlap_characters: 0,
            },
            top_k: 2,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_build_then_query_round_trip() {
        let source = tempfile::tempdir().unwrap();
        let storage = tempfile::tempdir().unwrap();
        std::fs::write(
            source.path().join("handbook.txt"),
            "The GPA minimum is 2.0 for all undergraduate students.",
        )
        .unwrap();
        std::fs::write(
            source.path().join("calendar.txt"),
            "The fall semester begins in September.",
        )
        .unwrap();

        let config = test_config(source.path(), storage.path());
        let embedder = FakeEmbedding::new("fake-embed");

        let report = build_index(&config, &embedder).await.unwrap();
        assert_eq!(report.documents_indexed, 2);
        assert_eq!(report.documents_skipped, 0);
        assert!(report.chunks >= 2);

        let pipeline = QueryPipeline::open(
            &config,
            Box::new(FakeEmbedding::new("fake-embed")),
            Box::new(FakeBackend::reliable()),
        )
        .unwrap();

        let answer = pipeline.ask("What is the minimum GPA?").await.unwrap();
        assert!(answer.text.contains("grounded answer"));
        assert!(!answer.sources.is_empty());
        for source in &answer.sources {
            assert!(source.file_name.ends_with(".txt"));
            assert!((0.0..=1.0).contains(&source.score));
        }
    }

    #[tokio::test]
    async fn test_build_skips_empty_document() {
        let source = tempfile::tempdir().unwrap();
        let storage = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("empty.txt"), "   ").unwrap();
        std::fs::write(source.path().join("one.txt"), "Useful content here.").unwrap();
        std::fs::write(source.path().join("two.txt"), "More useful content.").unwrap();

        let config = test_config(source.path(), storage.path());
        let report = build_index(&config, &FakeEmbedding::new("fake-embed"))
            .await
            .unwrap();

        assert_eq!(report.documents_indexed, 2);
        assert_eq!(report.documents_skipped, 1);

        let index = VectorIndex::load(storage.path()).unwrap();
        assert!(index.chunks().iter().all(|c| c.source != "empty.txt"));
    }

    #[tokio::test]
    async fn test_build_all_empty_is_empty_corpus() {
        let source = tempfile::tempdir().unwrap();
        let storage = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("a.txt"), "").unwrap();
        std::fs::write(source.path().join("b.txt"), "  \n ").unwrap();

        let config = test_config(source.path(), storage.path());
        let err = build_index(&config, &FakeEmbedding::new("fake-embed"))
            .await
            .unwrap_err();

        assert!(matches!(err, RagError::EmptyCorpus { count: 2 }));
        // Nothing persisted.
        assert!(matches!(
            VectorIndex::load(storage.path()).unwrap_err(),
            RagError::IndexNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_build_no_matching_files() {
        let source = tempfile::tempdir().unwrap();
        let storage = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("image.png"), b"png").unwrap();

        let config = test_config(source.path(), storage.path());
        let err = build_index(&config, &FakeEmbedding::new("fake-embed"))
            .await
            .unwrap_err();

        assert!(matches!(err, RagError::NoMatchingFiles { .. }));
        assert!(!VectorIndex::file_path(storage.path()).exists());
    }

    #[tokio::test]
    async fn test_build_respects_lock() {
        let source = tempfile::tempdir().unwrap();
        let storage = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("doc.txt"), "content").unwrap();
        std::fs::write(storage.path().join(".build.lock"), "").unwrap();

        let config = test_config(source.path(), storage.path());
        let err = build_index(&config, &FakeEmbedding::new("fake-embed"))
            .await
            .unwrap_err();

        assert!(matches!(err, RagError::BuildLocked { .. }));
        // The message tells the operator which file to remove.
        assert!(err.to_string().contains(".build.lock"));
    }

    #[tokio::test]
    async fn test_lock_released_after_failed_build() {
        let source = tempfile::tempdir().unwrap();
        let storage = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("doc.txt"), "").unwrap();

        // Build fails (empty corpus) after the lock was taken and written.
        let config = test_config(source.path(), storage.path());
        let err = build_index(&config, &FakeEmbedding::new("fake-embed"))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::EmptyCorpus { .. }));

        // Lock released even on failure.
        assert!(!storage.path().join(".build.lock").exists());
    }

    #[tokio::test]
    async fn test_lock_released_after_build() {
        let source = tempfile::tempdir().unwrap();
        let storage = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("doc.txt"), "some indexable content").unwrap();

        let config = test_config(source.path(), storage.path());
        let embedder = FakeEmbedding::new("fake-embed");

        build_index(&config, &embedder).await.unwrap();
        assert!(!storage.path().join(".build.lock").exists());

        // A second build over the same storage succeeds.
        build_index(&config, &embedder).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_rejects_model_mismatch() {
        let source = tempfile::tempdir().unwrap();
        let storage = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("doc.txt"), "some indexable content").unwrap();

        let config = test_config(source.path(), storage.path());
        build_index(&config, &FakeEmbedding::new("model-a"))
            .await
            .unwrap();

        // unwrap_err would need Debug on QueryPipeline, which boxed trait
        // objects rule out.
        let err = QueryPipeline::open(
            &config,
            Box::new(FakeEmbedding::new("model-b")),
            Box::new(FakeBackend::reliable()),
        )
        .err()
        .unwrap();

        assert!(matches!(err, RagError::EmbeddingModelMismatch { .. }));
    }

    #[tokio::test]
    async fn test_backend_failure_recoverable() {
        let source = tempfile::tempdir().unwrap();
        let storage = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("doc.txt"), "some indexable content").unwrap();

        let config = test_config(source.path(), storage.path());
        build_index(&config, &FakeEmbedding::new("fake-embed"))
            .await
            .unwrap();

        let pipeline = QueryPipeline::open(
            &config,
            Box::new(FakeEmbedding::new("fake-embed")),
            Box::new(FakeBackend::flaky()),
        )
        .unwrap();

        // First question hits the unavailable backend.
        let err = pipeline.ask("question one").await.unwrap_err();
        assert!(err.is_recoverable());

        // The index stays loaded and the next question succeeds.
        let answer = pipeline.ask("question two").await.unwrap();
        assert!(answer.text.contains("grounded answer"));
    }

    #[tokio::test]
    async fn test_open_cached_shares_index() {
        let source = tempfile::tempdir().unwrap();
        let storage = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("doc.txt"), "some indexable content").unwrap();

        let config = test_config(source.path(), storage.path());
        build_index(&config, &FakeEmbedding::new("fake-embed"))
            .await
            .unwrap();

        let cache = IndexCache::new();
        let first = QueryPipeline::open_cached(
            &config,
            &cache,
            Box::new(FakeEmbedding::new("fake-embed")),
            Box::new(FakeBackend::reliable()),
        )
        .unwrap();
        let second = QueryPipeline::open_cached(
            &config,
            &cache,
            Box::new(FakeEmbedding::new("fake-embed")),
            Box::new(FakeBackend::reliable()),
        )
        .unwrap();

        assert!(Arc::ptr_eq(&first.index, &second.index));
    }
}
