//! Answer generation
//!
//! Trait seam over the external chat generator. Stateless per call: the
//! orchestrator supplies the full prompt context every time.

use crate::config::Config;
use crate::error::Result;
use crate::ollama::{ChatMessage, OllamaClient};
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for answer generators
#[async_trait]
pub trait Generator: Send + Sync {
    /// Run one chat completion over the supplied messages
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Generator backed by the Ollama chat endpoint
pub struct OllamaGenerator {
    client: Arc<OllamaClient>,
    model: String,
}

impl OllamaGenerator {
    pub fn new(client: Arc<OllamaClient>, config: &Config) -> Self {
        Self {
            client,
            model: config.llm_model.clone(),
        }
    }

    /// Startup probe. Generation is the one capability docent cannot run
    /// without, so an unreachable service is fatal here rather than degraded
    /// later.
    pub async fn verify(&self) -> Result<()> {
        self.client.health().await
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        self.client.chat(&self.model, messages).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
