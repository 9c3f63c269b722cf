//! Document extraction.
//!
//! Turns a collected source file into a [`Document`]: the full extracted
//! text plus a metadata map keyed by the original file name. PDF parsing is
//! CPU bound and runs on the blocking thread pool.

pub mod pdf;

use std::collections::BTreeMap;
use std::path::Path;

use crate::collector::SourceFile;
use crate::error::{RagError, Result};

// ============================================================================
// Document
// ============================================================================

/// A fully extracted source document. Immutable; discarded after chunking.
#[derive(Debug, Clone)]
pub struct Document {
    /// Source file name (the document identifier).
    pub file_name: String,
    /// Full extracted text.
    pub text: String,
    /// Per-document metadata, copied onto every chunk.
    pub metadata: BTreeMap<String, String>,
}

// ============================================================================
// Extractor
// ============================================================================

/// Extracts text from supported file types.
pub struct DocumentExtractor;

impl DocumentExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract one document.
    ///
    /// Fails with [`RagError::Extraction`] when no content can be produced;
    /// the build pipeline treats that as a per-document skip, not a fatal
    /// error.
    pub async fn extract(&self, file: &SourceFile) -> Result<Document> {
        let file_name = file.file_name();

        let is_pdf = file
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);

        let text = if is_pdf {
            let path = file.path.clone();
            tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&path))
                .await
                .map_err(|e| RagError::Extraction {
                    file: file.path.clone(),
                    reason: format!("extraction task failed: {}", e),
                })??
        } else {
            read_text_file(&file.path).await?
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("file_name".to_string(), file_name.clone());
        if is_pdf {
            metadata.insert("total_pages".to_string(), pdf::count_pages(&text).to_string());
        }

        tracing::debug!("extracted {} chars from {}", text.len(), file_name);

        Ok(Document {
            file_name,
            text,
            metadata,
        })
    }
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_text_file(path: &Path) -> Result<String> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RagError::Extraction {
            file: path.to_path_buf(),
            reason: format!("read failed: {}", e),
        })?;

    if text.trim().is_empty() {
        return Err(RagError::Extraction {
            file: path.to_path_buf(),
            reason: "file is empty".to_string(),
        });
    }

    Ok(text)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn source_file(path: &Path) -> SourceFile {
        SourceFile {
            path: path.to_path_buf(),
            size: std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
            modified_at: None,
        }
    }

    #[tokio::test]
    async fn test_extract_text_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("handbook.txt");
        std::fs::write(&path, "The GPA minimum is 2.0.").unwrap();

        let extractor = DocumentExtractor::new();
        let doc = extractor.extract(&source_file(&path)).await.unwrap();

        assert_eq!(doc.file_name, "handbook.txt");
        assert!(doc.text.contains("GPA"));
        assert_eq!(doc.metadata.get("file_name").unwrap(), "handbook.txt");
    }

    #[tokio::test]
    async fn test_extract_empty_text_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("empty.txt");
        std::fs::write(&path, "   \n  ").unwrap();

        let extractor = DocumentExtractor::new();
        let err = extractor.extract(&source_file(&path)).await.unwrap_err();
        assert!(matches!(err, RagError::Extraction { .. }));
    }

    #[tokio::test]
    async fn test_extract_corrupt_pdf_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-garbage").unwrap();

        let extractor = DocumentExtractor::new();
        let err = extractor.extract(&source_file(&path)).await.unwrap_err();
        assert!(matches!(err, RagError::Extraction { .. }));
    }
}
