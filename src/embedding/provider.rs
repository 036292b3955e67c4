//! Embedding provider trait and implementations.
//!
//! Two backends are available: a local feature-hashing model that needs no
//! network access, and any OpenAI-compatible `/embeddings` endpoint.

use crate::error::{RagError, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, info};

/// Trait for embedding providers that convert text to vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for a batch of texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Return the dimensionality of embeddings produced.
    fn dimensions(&self) -> usize;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// Words too common to carry meaning in a fund question
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "of", "for", "in", "on", "to", "is", "are", "was", "what", "whats", "how",
    "much", "many", "does", "do", "did", "can", "could", "tell", "me", "about", "please", "and",
    "or", "with", "by", "my", "i", "it", "its", "this", "that", "which",
];

const WORD_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.5;
const TRIGRAM_WEIGHT: f32 = 0.2;

/// Deterministic feature-hashing embedder.
///
/// Each text is reduced to weighted features (word unigrams, adjacent word
/// bigrams and boundary-marked character trigrams). Every feature is hashed
/// with SHA-256 into one of `dimension` buckets with a hash-derived sign, and
/// the result is L2-normalized. Output depends only on the text and the
/// dimension, so corpus and query vectors are always comparable.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub const MODEL_NAME: &'static str = "hashing-v1";

    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn tokens(text: &str) -> Vec<String> {
        let cleaned: String = text
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();

        cleaned
            .split_whitespace()
            .filter(|t| !STOPWORDS.contains(t))
            .map(str::to_string)
            .collect()
    }

    fn features(text: &str) -> Vec<(String, f32)> {
        let tokens = Self::tokens(text);
        let mut features = Vec::with_capacity(tokens.len() * 8);

        for token in &tokens {
            features.push((format!("w:{}", token), WORD_WEIGHT));
        }

        for pair in tokens.windows(2) {
            features.push((format!("b:{} {}", pair[0], pair[1]), BIGRAM_WEIGHT));
        }

        for token in &tokens {
            if token.chars().count() < 2 {
                continue;
            }
            let padded: Vec<char> = format!("#{}#", token).chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                features.push((format!("c:{}", trigram), TRIGRAM_WEIGHT));
            }
        }

        features
    }

    /// Embed one text synchronously
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RagError::InvalidInput("cannot embed empty text".to_string()));
        }
        if self.dimension == 0 {
            return Err(RagError::InvalidInput("embedding dimension must be positive".to_string()));
        }

        let mut vector = vec![0.0f32; self.dimension];
        for (feature, weight) in Self::features(text) {
            let digest = Sha256::digest(feature.as_bytes());
            let mut head = [0u8; 8];
            head.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(head) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign * weight;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in vector.iter_mut() {
                *x /= norm;
            }
        }

        Ok(vector)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_text(text)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_text(t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        Self::MODEL_NAME
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// OpenAI-compatible embedding provider.
///
/// `endpoint` is the API base (e.g. `http://localhost:11434/v1`); requests go
/// to `{endpoint}/embeddings`.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    dims: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(
        endpoint: String,
        model: String,
        api_key: Option<String>,
        dims: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Embedding(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.map(SecretString::new),
            model,
            dims,
        })
    }

    /// Build the provider and verify the endpoint serves the expected dimension
    pub async fn connect(
        endpoint: String,
        model: String,
        api_key: Option<String>,
        dims: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let provider = Self::new(endpoint, model, api_key, dims, timeout)?;

        let sample = provider
            .embed("dimension sample")
            .await
            .map_err(|e| RagError::ModelUnavailable(format!("sample failed: {}", e)))?;

        if sample.len() != dims {
            return Err(RagError::ModelUnavailable(format!(
                "model {} returned {} dimensions, expected {}",
                provider.model,
                sample.len(),
                dims
            )));
        }

        info!("Connected to embedding endpoint {} (model {})", provider.endpoint, provider.model);
        Ok(provider)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("Empty response from embedding endpoint".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.endpoint);
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        debug!("Requesting {} embeddings from {}", texts.len(), url);

        let mut req = self.client.post(&url).json(&request);
        if let Some(ref api_key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key.expose_secret()));
        }

        let response = req
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!("API error {}: {}", status, body)));
        }

        let mut result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("malformed response: {}", e)))?;

        if result.data.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "requested {} embeddings, received {}",
                texts.len(),
                result.data.len()
            )));
        }

        result.data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
        Ok(result.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
