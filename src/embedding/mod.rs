//! Embedding - text vectorization through the Ollama daemon.
//!
//! The same provider must embed both index-time chunks and query-time
//! questions; the persisted index records the model identifier so a
//! mismatch is caught at load time instead of silently degrading search.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// Maps text to a fixed-length vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch (default: sequential calls).
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            tracing::debug!("embedding {}/{}", i + 1, texts.len());
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Output dimensionality.
    fn dimension(&self) -> usize;

    /// Model identifier recorded alongside the persisted index.
    fn model_id(&self) -> &str;
}

// ============================================================================
// Ollama Embedding
// ============================================================================

/// Embedding provider backed by Ollama's `/api/embeddings` endpoint.
#[derive(Debug)]
pub struct OllamaEmbedding {
    endpoint: String,
    model: String,
    dimension: usize,
    client: reqwest::Client,
}

/// Request body for `/api/embeddings`.
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedding {
    /// Create a provider against `base_url` with the given model and
    /// expected output dimension.
    pub fn new(base_url: &str, model: &str, dimension: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| RagError::Embedding(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: format!("{}/api/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            dimension,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // Empty input embeds to the zero vector without a round trip.
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let request = EmbedRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("request to {} failed: {}", self.endpoint, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!(
                "Ollama returned {} for model '{}': {}",
                status, self.model, body
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("invalid embedding response: {}", e)))?;

        if parsed.embedding.len() != self.dimension {
            return Err(RagError::Embedding(format!(
                "model '{}' returned {} dimensions, expected {}",
                self.model,
                parsed.embedding.len(),
                self.dimension
            )));
        }

        Ok(parsed.embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_normalization() {
        let a = OllamaEmbedding::new("http://localhost:11434", "nomic-embed-text", 768).unwrap();
        let b = OllamaEmbedding::new("http://localhost:11434/", "nomic-embed-text", 768).unwrap();
        assert_eq!(a.endpoint, b.endpoint);
        assert_eq!(a.endpoint, "http://localhost:11434/api/embeddings");
    }

    #[test]
    fn test_request_serialization() {
        let request = EmbedRequest {
            model: "nomic-embed-text",
            prompt: "hello",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "nomic-embed-text");
        assert_eq!(json["prompt"], "hello");
    }

    #[tokio::test]
    async fn test_empty_text_embeds_to_zero_vector() {
        let embedder = OllamaEmbedding::new("http://localhost:11434", "nomic-embed-text", 4).unwrap();
        let vector = embedder.embed("   ").await.unwrap();
        assert_eq!(vector, vec![0.0; 4]);
    }
}
