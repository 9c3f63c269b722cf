//! Answer generation - prompt assembly and the Ollama generation backend.
//!
//! The backend is the only long-latency call in the system (tens of
//! seconds), so it carries an explicit timeout. Backend failures are
//! per-question and recoverable: the loaded index stays usable.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::index::ScoredChunk;

// ============================================================================
// Types
// ============================================================================

/// A cited source shown with an answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Citation {
    /// Source file name.
    pub file_name: String,
    /// Similarity score clamped to [0, 1] for display.
    pub score: f32,
}

/// A generated answer plus the retrieval results it was grounded on.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    /// Citations in retrieval rank order.
    pub sources: Vec<Citation>,
}

impl Answer {
    /// Pair generated text with citations derived from the retrieved
    /// chunks.
    pub fn new(text: String, retrieved: &[ScoredChunk]) -> Self {
        let sources = retrieved
            .iter()
            .map(|s| Citation {
                file_name: s.chunk.source.clone(),
                score: s.score.clamp(0.0, 1.0),
            })
            .collect();
        Self { text, sources }
    }
}

// ============================================================================
// Prompt Assembly
// ============================================================================

const PROMPT_HEADER: &str = "Context information is below.\n---------------------\n";
const PROMPT_FOOTER: &str = "\n---------------------\nGiven the context information and not prior \
                             knowledge, answer the query.\nQuery: ";
const CHUNK_SEPARATOR: &str = "\n\n";

/// Builds a bounded-size prompt from retrieved chunks and the question.
pub struct PromptBuilder {
    /// Total prompt budget in characters.
    budget_chars: usize,
}

impl PromptBuilder {
    pub fn new(budget_chars: usize) -> Self {
        Self { budget_chars }
    }

    /// Concatenate chunks (most similar first) and the question under the
    /// budget. Chunks that no longer fit are dropped, least relevant
    /// first; if even the best chunk overflows it is truncated rather
    /// than dropped, so the answer is never generated without context.
    ///
    /// `retrieved` must already be ranked descending by similarity, as
    /// returned by the index search.
    pub fn build(&self, question: &str, retrieved: &[ScoredChunk]) -> String {
        let fixed = PROMPT_HEADER.len() + PROMPT_FOOTER.len() + question.len() + "\nAnswer:".len();
        let context_budget = self.budget_chars.saturating_sub(fixed);

        let mut context = String::new();
        for scored in retrieved {
            let text = scored.chunk.text.trim();
            if text.is_empty() {
                continue;
            }

            let needed = if context.is_empty() {
                text.len()
            } else {
                text.len() + CHUNK_SEPARATOR.len()
            };

            if context.len() + needed > context_budget {
                if context.is_empty() {
                    // Best chunk alone overflows: keep a truncated head.
                    let cut = floor_char_boundary(text, context_budget);
                    context.push_str(&text[..cut]);
                } else {
                    tracing::debug!(
                        "prompt budget exhausted at chunk from '{}' (score {:.3})",
                        scored.chunk.source,
                        scored.score
                    );
                }
                // Everything below this rank is dropped with it, so the
                // drop set is always the least-relevant suffix.
                break;
            }

            if !context.is_empty() {
                context.push_str(CHUNK_SEPARATOR);
            }
            context.push_str(text);
        }

        format!(
            "{}{}{}{}\nAnswer:",
            PROMPT_HEADER, context, PROMPT_FOOTER, question
        )
    }
}

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
// GenerationBackend Trait
// ============================================================================

/// Narrow contract to the text-generation backend: one prompt in, one
/// answer out, with timeout and error propagation.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Model identifier used for generation.
    fn model_id(&self) -> &str;
}

// ============================================================================
// Ollama Generator
// ============================================================================

/// Generation backend over Ollama's `/api/generate` endpoint.
#[derive(Debug)]
pub struct OllamaGenerator {
    endpoint: String,
    model: String,
    temperature: f32,
    context_window: usize,
    timeout: Duration,
    client: reqwest::Client,
}

/// Request body for `/api/generate`.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_ctx: usize,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaGenerator {
    pub fn new(
        base_url: &str,
        model: &str,
        temperature: f32,
        context_window: usize,
        timeout: Duration,
    ) -> Result<Self> {
        // No client-level timeout: the explicit tokio timeout below owns
        // cancellation, so the two cannot disagree.
        let client = reqwest::Client::builder().build().map_err(|e| {
            RagError::GenerationUnavailable {
                endpoint: base_url.to_string(),
                reason: format!("failed to create HTTP client: {}", e),
            }
        })?;

        Ok(Self {
            endpoint: format!("{}/api/generate", base_url.trim_end_matches('/')),
            model: model.to_string(),
            temperature,
            context_window,
            timeout,
            client,
        })
    }
}

#[async_trait]
impl GenerationBackend for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
                num_ctx: self.context_window,
            },
        };

        let call = async {
            let response = self
                .client
                .post(&self.endpoint)
                .json(&request)
                .send()
                .await
                .map_err(|e| RagError::GenerationUnavailable {
                    endpoint: self.endpoint.clone(),
                    reason: e.to_string(),
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(RagError::GenerationUnavailable {
                    endpoint: self.endpoint.clone(),
                    reason: format!("backend returned {} for model '{}': {}", status, self.model, body),
                });
            }

            let parsed: GenerateResponse =
                response
                    .json()
                    .await
                    .map_err(|e| RagError::GenerationUnavailable {
                        endpoint: self.endpoint.clone(),
                        reason: format!("invalid generation response: {}", e),
                    })?;

            Ok(parsed.response)
        };

        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RagError::GenerationTimeout {
                seconds: self.timeout.as_secs(),
            }),
        }
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
