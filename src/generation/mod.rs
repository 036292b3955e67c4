//! Answer generation
//!
//! This module turns retrieval results into user-facing answers:
//! - Language model client with retries and a circuit breaker
//! - Token-bounded context assembly
//! - Extractive fallback when the model fails or times out
//! - Investment-advice detection and facts-only refusals

pub mod circuit_breaker;
pub mod generator;
pub mod guardrails;
pub mod llm;
pub mod token_estimator;

pub use circuit_breaker::{BreakerState, BreakerStats, CircuitBreaker, CircuitBreakerConfig};
pub use generator::{extractive_answer, limit_sentences, Answer, ResponseGenerator, NO_INFORMATION};
pub use guardrails::{detect_advice, facts_only_response, AdviceTopic};
pub use llm::{ChatCompletionClient, CompletionRequest, LanguageModel, LlmError};
pub use token_estimator::{default_estimator, TiktokenEstimator, TokenEstimator, WordBasedEstimator};
