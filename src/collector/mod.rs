//! Source file collection.
//!
//! Scans the source directory and keeps the files whose extension matches
//! the configured filter. Hidden files and .gitignore'd paths are skipped.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use ignore::WalkBuilder;

use crate::error::{RagError, Result};

// ============================================================================
// Source File
// ============================================================================

/// A file selected for indexing.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Absolute path.
    pub path: PathBuf,
    /// File size in bytes.
    pub size: u64,
    /// Modification time, when the filesystem reports one.
    pub modified_at: Option<SystemTime>,
}

impl SourceFile {
    /// File name component, lossy for non-UTF-8 paths.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

// ============================================================================
// Collector
// ============================================================================

/// Collects matching files from a directory tree.
pub struct FileCollector {
    extensions: Vec<String>,
}

impl FileCollector {
    /// Filter by the given extensions (lowercase, no dot).
    pub fn new(extensions: &[String]) -> Self {
        Self {
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    /// Recursively collect matching files under `dir`, sorted by path so
    /// repeated builds see documents in a stable order.
    ///
    /// Fails with [`RagError::NoMatchingFiles`] when nothing matches.
    pub fn collect(&self, dir: &Path) -> Result<Vec<SourceFile>> {
        if !dir.is_dir() {
            return Err(RagError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("source directory not found: {}", dir.display()),
            )));
        }

        let walker = WalkBuilder::new(dir).build();
        let mut files = Vec::new();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("failed to read directory entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            let path = entry.path();
            if !self.matches(path) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("failed to read metadata for {:?}: {}", path, e);
                    continue;
                }
            };

            files.push(SourceFile {
                path: path.to_path_buf(),
                size: metadata.len(),
                modified_at: metadata.modified().ok(),
            });
        }

        if files.is_empty() {
            return Err(RagError::NoMatchingFiles {
                dir: dir.to_path_buf(),
                extensions: self.extensions.clone(),
            });
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));

        tracing::info!("collected {} files from {}", files.len(), dir.display());
        Ok(files)
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            })
            .unwrap_or(false)
    }
}

// ============================================================================
// Tests
// ============================================================================
