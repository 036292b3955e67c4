//! Language model completion client

use super::circuit_breaker::{BreakerState, BreakerStats, CircuitBreaker, CircuitBreakerConfig};
use crate::config::LlmConfig;
use crate::error::RagError;
use crate::metrics::METRICS;
use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

const OPERATION: &str = "chat_completion";

/// A single constrained completion request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// System instructions
    pub system: String,
    /// Retrieved context the answer must be grounded in; may be empty
    pub context: String,
    /// The user's question
    pub query: String,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, context: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            context: context.into(),
            query: query.into(),
            max_tokens: None,
            temperature: None,
        }
    }

    /// User-turn text combining context and question
    pub fn user_message(&self) -> String {
        if self.context.trim().is_empty() {
            self.query.clone()
        } else {
            format!("Context:\n{}\n\nQuestion: {}", self.context, self.query)
        }
    }
}

/// Text completion service.
///
/// Injected into query understanding and answer generation so tests can
/// substitute a scripted model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

/// Language model errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Circuit breaker is open: {0}")]
    CircuitOpen(String),
}

impl LlmError {
    /// Short label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            LlmError::Initialization(_) => "initialization",
            LlmError::RateLimited(_) => "rate_limited",
            LlmError::Timeout(_) => "timeout",
            LlmError::Malformed(_) => "malformed",
            LlmError::Api(_) => "api",
            LlmError::Network(_) => "network",
            LlmError::CircuitOpen(_) => "circuit_open",
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited(_) | LlmError::Timeout(_) | LlmError::Network(_) | LlmError::Api(_)
        )
    }
}

impl From<LlmError> for RagError {
    fn from(e: LlmError) -> Self {
        RagError::LlmFailure(e.to_string())
    }
}

/// OpenAI-compatible chat completion client with retry and circuit breaker
pub struct ChatCompletionClient {
    client: Client,
    config: LlmConfig,
    api_key: Option<SecretString>,
    breaker: CircuitBreaker,
}

impl ChatCompletionClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| LlmError::Initialization(e.to_string()))?;

        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: config.circuit_breaker_failures,
            reset_timeout: config.breaker_reset_timeout(),
        });

        let api_key = config.api_key.clone().map(SecretString::new);

        Ok(Self {
            client,
            config,
            api_key,
            breaker,
        })
    }

    /// Exponential backoff with up to 50% random jitter
    fn calculate_backoff(&self, attempt: usize) -> Duration {
        let base = self.config.retry_backoff();
        let multiplier = 2_u32.saturating_pow(attempt.saturating_sub(1) as u32);
        let delay = base.saturating_mul(multiplier);
        let jitter_ms = (delay.as_millis() as u64) / 2;
        let jitter = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_ms)
        } else {
            0
        };
        delay + Duration::from_millis(jitter)
    }

    async fn call_api(&self, body: &ChatCompletionRequest) -> Result<String, LlmError> {
        let mut req = self.client.post(&self.config.endpoint).json(body);
        if let Some(ref api_key) = self.api_key {
            req = req.bearer_auth(api_key.expose_secret());
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(e.to_string())
            } else {
                LlmError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(format!("Failed to parse response: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::Malformed("No choices in response".to_string()))?;

        if content.trim().is_empty() {
            return Err(LlmError::Malformed("Empty completion".to_string()));
        }

        Ok(content.trim().to_string())
    }

    /// Get circuit breaker statistics
    pub fn breaker_stats(&self) -> BreakerStats {
        self.breaker.stats()
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        if !self.breaker.try_acquire() {
            error!("Circuit breaker is open for {}", OPERATION);
            return Err(LlmError::CircuitOpen(OPERATION.to_string()));
        }

        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user_message(),
                },
            ],
            max_tokens: request.max_tokens.or(Some(self.config.max_tokens)),
            temperature: request.temperature,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;

            match self.call_api(&body).await {
                Ok(content) => {
                    self.breaker.record_success();
                    METRICS.record_llm_completion(true);
                    debug!("Completion succeeded on attempt {}", attempt);
                    return Ok(content);
                }
                Err(e) => {
                    self.breaker.record_failure();
                    METRICS.record_llm_completion(false);

                    // No retries once the circuit has left Closed
                    let circuit_tripped = self.breaker.state() != BreakerState::Closed;
                    if !e.is_retryable() || attempt > self.config.max_retries || circuit_tripped {
                        warn!("Completion failed after {} attempts: {}", attempt, e);
                        return Err(e);
                    }

                    let backoff = self.calculate_backoff(attempt);
                    warn!("Completion attempt {} failed: {}, retrying in {:?}", attempt, e, backoff);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

// OpenAI-compatible API types
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: String) -> LlmConfig {
        LlmConfig {
            endpoint,
            api_key: Some("sk-test".to_string()),
            max_retries: 1,
            retry_backoff_ms: 1,
            circuit_breaker_failures: 2,
            ..LlmConfig::default()
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("Answer briefly.", "Expense Ratio: 0.85%", "What is the expense ratio?")
    }

    #[test]
    fn test_user_message_includes_context() {
        let message = request().user_message();
        assert!(message.starts_with("Context:\nExpense Ratio: 0.85%"));
        assert!(message.ends_with("Question: What is the expense ratio?"));

        let bare = CompletionRequest::new("sys", "  ", "hello");
        assert_eq!(bare.user_message(), "hello");
    }

    #[tokio::test]
    async fn test_completion_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"  The expense ratio is 0.85%. "}}]}"#)
            .create_async()
            .await;

        let client = ChatCompletionClient::new(config(format!("{}/v1/chat/completions", server.url()))).unwrap();
        let answer = client.complete(&request()).await.unwrap();

        assert_eq!(answer, "The expense ratio is 0.85%.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat")
            .with_status(429)
            .expect(2)
            .create_async()
            .await;

        let client = ChatCompletionClient::new(config(format!("{}/chat", server.url()))).unwrap();
        let result = client.complete(&request()).await;

        assert!(matches!(result, Err(LlmError::RateLimited(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_malformed_response_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .expect(1)
            .create_async()
            .await;

        let client = ChatCompletionClient::new(config(format!("{}/chat", server.url()))).unwrap();
        let result = client.complete(&request()).await;

        assert!(matches!(result, Err(LlmError::Malformed(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_circuit_opens_after_repeated_failures() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat")
            .with_status(500)
            .with_body("upstream down")
            .create_async()
            .await;

        let client = ChatCompletionClient::new(config(format!("{}/chat", server.url()))).unwrap();
        assert!(matches!(client.complete(&request()).await, Err(LlmError::Api(_))));
        assert_eq!(client.breaker_stats().state, BreakerState::Open);
        assert!(matches!(client.complete(&request()).await, Err(LlmError::CircuitOpen(_))));
    }

    #[tokio::test]
    async fn test_open_circuit_stops_retries() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let client = ChatCompletionClient::new(LlmConfig {
            max_retries: 3,
            circuit_breaker_failures: 1,
            ..config(format!("{}/chat", server.url()))
        })
        .unwrap();

        assert!(matches!(client.complete(&request()).await, Err(LlmError::Api(_))));
        mock.assert_async().await;
        assert_eq!(client.breaker_stats().state, BreakerState::Open);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(LlmError::Timeout("t".into()).kind(), "timeout");
        assert_eq!(LlmError::CircuitOpen("c".into()).kind(), "circuit_open");
        let rag: RagError = LlmError::Api("boom".into()).into();
        assert!(matches!(rag, RagError::LlmFailure(_)));
    }
}
