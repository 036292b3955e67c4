//! Text embedding
//!
//! `EmbeddingService` owns a single model instance used for both corpus and
//! query encoding, so every vector in the index is comparable with every
//! query vector.

pub mod provider;
pub mod service;

pub use provider::{EmbeddingProvider, HashingEmbedder, HttpEmbeddingProvider};
pub use service::{EmbeddingService, ProviderLoader};
