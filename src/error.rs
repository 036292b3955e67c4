//! Error types for the fund facts pipeline

use thiserror::Error;

/// Errors raised inside the retrieval and grounding pipeline.
///
/// None of these reach the boundary `answer()` call: the retriever and the
/// response generator resolve every variant into a (possibly degraded)
/// answer. They surface only from construction and indexing paths.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector index is empty")]
    IndexEmpty,

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Fact store error: {0}")]
    FactStore(String),

    #[error("Language model failure: {0}")]
    LlmFailure(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Index encode error: {0}")]
    IndexEncode(#[from] rmp_serde::encode::Error),

    #[error("Index decode error: {0}")]
    IndexDecode(#[from] rmp_serde::decode::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for RagError {
    fn from(e: config::ConfigError) -> Self {
        RagError::Configuration(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
