//! Layered configuration for the fund facts pipeline
//!
//! Values come from (lowest to highest priority): serde defaults, an optional
//! TOML file, and `FUND_FACTS__<SECTION>__<KEY>` environment variables.

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub retriever: RetrieverConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from an optional TOML file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("FUND_FACTS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML document
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            return Err(RagError::Configuration(
                "embedding.dimension must be positive".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(RagError::Configuration(
                "embedding.batch_size must be positive".to_string(),
            ));
        }
        if self.retriever.top_k == 0 {
            return Err(RagError::Configuration(
                "retriever.top_k must be positive".to_string(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.retriever.similarity_threshold) {
            return Err(RagError::Configuration(format!(
                "retriever.similarity_threshold {} outside [-1, 1]",
                self.retriever.similarity_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.matcher.threshold) {
            return Err(RagError::Configuration(format!(
                "matcher.threshold {} outside [0, 1]",
                self.matcher.threshold
            )));
        }
        if self.generator.max_sentences == 0 {
            return Err(RagError::Configuration(
                "generator.max_sentences must be positive".to_string(),
            ));
        }
        if self.embedding.provider == EmbeddingProviderKind::Http
            && self.embedding.endpoint.is_none()
        {
            return Err(RagError::Configuration(
                "embedding.endpoint is required for the http provider".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which embedding backend to load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    /// Local feature-hashing model
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint
    Http,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: EmbeddingProviderKind,

    /// Model identifier recorded in the vector index
    #[serde(default = "default_model_name")]
    pub model_name: String,

    #[serde(default = "default_dimension")]
    pub dimension: usize,

    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum number of cached query embeddings
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,
}

fn default_provider() -> EmbeddingProviderKind { EmbeddingProviderKind::Hashing }
fn default_model_name() -> String { "hashing-v1".to_string() }
fn default_dimension() -> usize { 384 }
fn default_batch_size() -> usize { 32 }
fn default_cache_capacity() -> u64 { 1024 }

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_name: default_model_name(),
            dimension: default_dimension(),
            endpoint: None,
            api_key: None,
            batch_size: default_batch_size(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

/// Vector index persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Where the index snapshot is loaded from and saved to
    #[serde(default)]
    pub index_path: Option<PathBuf>,

    /// Re-embed the fact corpus when no saved index can be loaded
    #[serde(default = "default_rebuild_on_start")]
    pub rebuild_on_start: bool,
}

fn default_rebuild_on_start() -> bool { true }

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            index_path: None,
            rebuild_on_start: default_rebuild_on_start(),
        }
    }
}

/// Fuzzy scheme-name matching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Minimum normalized edit-distance similarity for a match
    #[serde(default = "default_matcher_threshold")]
    pub threshold: f32,
}

fn default_matcher_threshold() -> f32 { 0.85 }

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold: default_matcher_threshold(),
        }
    }
}

/// Retrieval confidence gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieverConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Best vector score required to accept the vector results
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

fn default_top_k() -> usize { 5 }
fn default_similarity_threshold() -> f32 { 0.65 }

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

/// Answer composition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_max_context_facts")]
    pub max_context_facts: usize,

    /// Token budget for the context block sent to the model
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    #[serde(default = "default_max_sentences")]
    pub max_sentences: usize,

    /// Upper bound on a single completion call, in milliseconds
    #[serde(default = "default_generation_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_context_facts() -> usize { 5 }
fn default_max_context_tokens() -> usize { 1500 }
fn default_max_sentences() -> usize { 3 }
fn default_generation_timeout_ms() -> u64 { 30_000 }
fn default_temperature() -> f32 { 0.3 }

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_context_facts: default_max_context_facts(),
            max_context_tokens: default_max_context_tokens(),
            max_sentences: default_max_sentences(),
            timeout_ms: default_generation_timeout_ms(),
            temperature: default_temperature(),
        }
    }
}

impl GeneratorConfig {
    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// OpenAI-compatible chat completion client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Use the completion service for intent extraction and answer wording
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Bearer token, wrapped in a secret once the client is built
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_breaker_failures")]
    pub circuit_breaker_failures: usize,

    #[serde(default = "default_breaker_reset")]
    pub circuit_breaker_reset_secs: u64,
}

fn default_llm_endpoint() -> String { "http://localhost:8080/v1/chat/completions".to_string() }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_llm_timeout_ms() -> u64 { 30_000 }
fn default_max_tokens() -> usize { 256 }
fn default_max_retries() -> usize { 2 }
fn default_retry_backoff_ms() -> u64 { 200 }
fn default_breaker_failures() -> usize { 5 }
fn default_breaker_reset() -> u64 { 30 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            api_key: None,
            timeout_ms: default_llm_timeout_ms(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            circuit_breaker_failures: default_breaker_failures(),
            circuit_breaker_reset_secs: default_breaker_reset(),
        }
    }
}

impl LlmConfig {
    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get retry backoff as Duration
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Get circuit breaker reset timeout as Duration
    pub fn breaker_reset_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_reset_secs)
    }
}

/// Log output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
