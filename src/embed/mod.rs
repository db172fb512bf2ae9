//! Embedding generation
//!
//! Abstraction over the external embedding gateway: a trait for providers
//! plus the Ollama-backed implementation. The gateway has a bounded safe
//! input length, so text is truncated before every call.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ollama::OllamaClient;
use crate::parse::truncate_chars;
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for embedding providers
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text span
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Embedder backed by the Ollama embeddings endpoint
pub struct OllamaEmbedder {
    client: Arc<OllamaClient>,
    model: String,
    dimension: usize,
    max_input_chars: usize,
}

impl OllamaEmbedder {
    pub fn new(client: Arc<OllamaClient>, config: &Config) -> Self {
        Self {
            client,
            model: config.embedding_model.clone(),
            dimension: config.embedding_dimension,
            max_input_chars: config.embed.max_input_chars,
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let input = truncate_chars(text, self.max_input_chars);
        let vector = self.client.embed(&self.model, input).await?;

        if vector.len() != self.dimension {
            return Err(Error::Embedding(format!(
                "Embedding dimension mismatch for model '{}': expected {}, got {}",
                self.model,
                self.dimension,
                vector.len()
            )));
        }

        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Cosine similarity between two vectors; zero-magnitude inputs score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![0.3, 0.5, 0.2];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatched_or_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
