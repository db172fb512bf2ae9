//! Ollama HTTP client
//!
//! Thin transport for the two external collaborators docent talks to over
//! HTTP: the embedding gateway (`/api/embeddings`) and the chat generator
//! (`/api/chat`). Both are blocking network calls from the caller's point of
//! view; embeddings carry an explicit retry policy, generation does not.

use crate::config::Config;
use crate::error::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// A single chat turn sent to the generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Explicit retry policy for embedding calls.
///
/// Attempt `n` (1-based) that fails sleeps `base_delay * 2^(n-1)` before the
/// next attempt; with the default 2 s base that is the 2 s / 4 s schedule.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

/// HTTP client for a local Ollama instance.
pub struct OllamaClient {
    http: Client,
    base_url: Url,
    embed_timeout: Duration,
    generate_timeout: Duration,
    retry: RetryPolicy,
}

impl OllamaClient {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_url(
            &config.ollama_url,
            Duration::from_secs(config.embed.timeout_secs),
            Duration::from_secs(config.embed.generate_timeout_secs),
            RetryPolicy {
                max_attempts: config.embed.max_attempts,
                ..RetryPolicy::default()
            },
        )
    }

    pub fn with_url(
        base_url: &str,
        embed_timeout: Duration,
        generate_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let http = Client::builder().build()?;
        Ok(Self {
            http,
            base_url,
            embed_timeout,
            generate_timeout,
            retry,
        })
    }

    /// Override the backoff base delay (tests use a short one).
    pub fn with_backoff_base(mut self, base_delay: Duration) -> Self {
        self.retry.base_delay = base_delay;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid Ollama URL: {}", e)))
    }

    /// Probe that the Ollama service answers at all.
    ///
    /// The system cannot operate without the generator, so callers treat a
    /// failure here as fatal at startup.
    pub async fn health(&self) -> Result<()> {
        let response = self
            .http
            .get(self.base_url.clone())
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| unreachable_error(self.base_url.as_str(), &e.to_string()))?;

        if !response.status().is_success() {
            return Err(unreachable_error(
                self.base_url.as_str(),
                &format!("service answered with status {}", response.status()),
            ));
        }

        debug!("Ollama reachable at {}", self.base_url);
        Ok(())
    }

    /// Generate an embedding vector for `text`.
    ///
    /// Retries per the configured policy with exponential backoff; the final
    /// failure is returned as an error, never panicked.
    pub async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let url = self.endpoint("/api/embeddings")?;
        let mut last_err: Option<Error> = None;

        for attempt in 1..=self.retry.max_attempts {
            let request = self
                .http
                .post(url.clone())
                .timeout(self.embed_timeout)
                .json(&EmbeddingsRequest {
                    model,
                    prompt: text,
                });

            match Self::send_embed(request).await {
                Ok(vector) => return Ok(vector),
                Err(e) => {
                    warn!(
                        "Embedding attempt {}/{} failed: {}",
                        attempt, self.retry.max_attempts, e
                    );
                    last_err = Some(e);
                }
            }

            if attempt < self.retry.max_attempts {
                tokio::time::sleep(self.retry.delay_after(attempt)).await;
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Embedding("embedding request failed".to_string())))
    }

    async fn send_embed(request: reqwest::RequestBuilder) -> Result<Vec<f32>> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::Embedding(e.to_string()))?;
        let response = response
            .error_for_status()
            .map_err(|e| Error::Embedding(e.to_string()))?;
        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(e.to_string()))?;
        Ok(parsed.embedding)
    }

    /// Run one stateless chat completion. The caller supplies the full
    /// context every time; there is no server-side session.
    pub async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String> {
        let url = self.endpoint("/api/chat")?;
        let response = self
            .http
            .post(url)
            .timeout(self.generate_timeout)
            .json(&ChatRequest {
                model,
                messages,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| Error::Generation(e.to_string()))?;
        let response = response
            .error_for_status()
            .map_err(|e| Error::Generation(e.to_string()))?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Generation(e.to_string()))?;
        Ok(parsed.message.content)
    }
}

fn unreachable_error(url: &str, detail: &str) -> Error {
    Error::GeneratorUnreachable(format!(
        "Cannot reach Ollama at {url} ({detail}). Start the service first:\n  1. Run: ollama serve\n  2. Check installed models: ollama list"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server_url: &str) -> OllamaClient {
        OllamaClient::with_url(
            server_url,
            Duration::from_secs(5),
            Duration::from_secs(5),
            RetryPolicy::default(),
        )
        .unwrap()
        .with_backoff_base(Duration::from_millis(10))
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_embed_retries_until_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "embedding": [0.1, 0.2, 0.3] })),
            )
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let vector = client.embed("nomic-embed-text", "hello").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_embed_gives_up_after_max_attempts() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.embed("nomic-embed-text", "hello").await.unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }

    #[tokio::test]
    async fn test_chat_returns_message_content() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({ "stream": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": { "role": "assistant", "content": "An answer." }
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("q")];
        let answer = client.chat("mistral", &messages).await.unwrap();
        assert_eq!(answer, "An answer.");
    }

    #[tokio::test]
    async fn test_health_failure_names_remediation() {
        let client = test_client("http://127.0.0.1:9");
        let err = client.health().await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("ollama serve"), "got: {message}");
    }
}
