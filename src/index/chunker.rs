//! Text chunking.
//!
//! Splits extracted document text into retrieval units under a configured
//! maximum length, respecting paragraph boundaries where possible, with an
//! optional word-aligned overlap between consecutive chunks.

use serde::{Deserialize, Serialize};

// ============================================================================
// Chunk Configuration
// ============================================================================

/// Chunking parameters (all in characters).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Minimum chunk size; smaller trailing chunks are merged backwards.
    pub min_characters: usize,
    /// Maximum chunk size, including any overlap prefix.
    pub max_characters: usize,
    /// Overlap carried from the end of the previous chunk.
    pub overlap_characters: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            min_characters: 200,
            max_characters: 1200,
            overlap_characters: 100,
        }
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// Chunking strategy.
pub trait Chunker: Send + Sync {
    /// Split text into chunks. Empty input yields no chunks.
    fn chunk(&self, text: &str) -> Vec<String>;

    /// Strategy name.
    fn name(&self) -> &'static str;
}

// ============================================================================
// TextChunker
// ============================================================================

/// Paragraph-aware chunker for extracted document text.
///
/// Packs paragraphs (blank-line separated) into chunks up to the maximum
/// size; oversized paragraphs are split at line, then word boundaries.
pub struct TextChunker {
    config: ChunkConfig,
}

impl TextChunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    /// Packing budget: the configured maximum minus room for the overlap
    /// prefix (tail plus newline) a chunk may later receive, so chunks
    /// never exceed `max_characters` after overlap is applied.
    fn budget(&self) -> usize {
        if self.config.overlap_characters == 0 {
            return self.config.max_characters;
        }
        self.config
            .max_characters
            .saturating_sub(self.config.overlap_characters + 1)
            .max(1)
    }

    /// Pack paragraphs into chunks under the packing budget.
    fn pack_paragraphs(&self, text: &str) -> Vec<String> {
        let budget = self.budget();
        let mut chunks = Vec::new();
        let mut current = String::new();

        for para in text.split("\n\n") {
            let para = para.trim();
            if para.is_empty() {
                continue;
            }

            if !current.is_empty() && current.len() + para.len() + 2 > budget {
                chunks.push(std::mem::take(&mut current));
            }

            if para.len() > budget {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                chunks.extend(self.split_oversized(para));
            } else {
                if !current.is_empty() {
                    current.push_str("\n\n");
                }
                current.push_str(para);
            }
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
    }

    /// Split a paragraph larger than the budget at line, then word
    /// boundaries.
    fn split_oversized(&self, para: &str) -> Vec<String> {
        let budget = self.budget();
        let mut chunks = Vec::new();
        let mut current = String::new();

        for line in para.lines() {
            if line.len() > budget {
                // A single enormous line: fall back to word packing.
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                for word in line.split_whitespace() {
                    if !current.is_empty() && current.len() + word.len() + 1 > budget {
                        chunks.push(std::mem::take(&mut current));
                    }
                    if !current.is_empty() {
                        current.push(' ');
                    }
                    current.push_str(word);
                }
                continue;
            }

            if !current.is_empty() && current.len() + line.len() + 1 > budget {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
    }

    /// Merge chunks below the minimum size into their predecessor when the
    /// result still fits.
    fn merge_small(&self, chunks: Vec<String>) -> Vec<String> {
        if self.config.min_characters == 0 {
            return chunks;
        }

        let budget = self.budget();
        let mut result: Vec<String> = Vec::new();

        for chunk in chunks {
            if let Some(last) = result.last_mut() {
                if last.len() < self.config.min_characters
                    && last.len() + chunk.len() + 2 <= budget
                {
                    last.push_str("\n\n");
                    last.push_str(&chunk);
                    continue;
                }
            }
            result.push(chunk);
        }

        result
    }

    /// Prefix each chunk after the first with the tail of its predecessor,
    /// aligned to a word boundary.
    fn apply_overlap(&self, chunks: Vec<String>) -> Vec<String> {
        if self.config.overlap_characters == 0 || chunks.len() < 2 {
            return chunks;
        }

        let mut result = Vec::with_capacity(chunks.len());

        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                result.push(chunk.clone());
                continue;
            }

            let prev = &chunks[i - 1];
            let start = floor_char_boundary(
                prev,
                prev.len().saturating_sub(self.config.overlap_characters),
            );
            let tail = &prev[start..];
            let tail = match tail.find(char::is_whitespace) {
                Some(pos) => tail[pos..].trim(),
                None => tail.trim(),
            };

            if tail.len() > 20 {
                result.push(format!("{}\n{}", tail, chunk));
            } else {
                result.push(chunk.clone());
            }
        }

        result
    }
}

impl Chunker for TextChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        let chunks = self.pack_paragraphs(text);
        let chunks = self.merge_small(chunks);
        self.apply_overlap(chunks)
    }

    fn name(&self) -> &'static str {
        "TextChunker"
    }
}

/// Largest index <= `index` that lies on a UTF-8 boundary.
#[inline]
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

// ============================================================================
// Tests
// ============================================================================
