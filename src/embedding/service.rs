//! Lazily loaded embedding service shared by indexing and retrieval

use super::provider::{EmbeddingProvider, HashingEmbedder, HttpEmbeddingProvider};
use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::error::{RagError, Result};
use crate::metrics::METRICS;
use futures::future::{BoxFuture, FutureExt};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

/// Produces the embedding provider on first use
pub type ProviderLoader =
    Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn EmbeddingProvider>>> + Send + Sync>;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Embedding service owning one model instance.
///
/// The model is loaded at most once per service, on first use. A failed load
/// is remembered: every later call reports `ModelUnavailable` so retrieval
/// can degrade to the fuzzy path for the lifetime of this instance.
pub struct EmbeddingService {
    loader: ProviderLoader,
    provider: OnceCell<std::result::Result<Arc<dyn EmbeddingProvider>, String>>,
    cache: Cache<String, Arc<Vec<f32>>>,
    model_name: String,
    dimension: usize,
    batch_size: usize,
}

impl EmbeddingService {
    pub fn new(
        model_name: impl Into<String>,
        dimension: usize,
        batch_size: usize,
        cache_capacity: u64,
        loader: ProviderLoader,
    ) -> Self {
        Self {
            loader,
            provider: OnceCell::new(),
            cache: Cache::new(cache_capacity),
            model_name: model_name.into(),
            dimension,
            batch_size: batch_size.max(1),
        }
    }

    /// Wrap an already constructed provider
    pub fn from_provider(provider: Arc<dyn EmbeddingProvider>) -> Self {
        let model_name = provider.model_name().to_string();
        let dimension = provider.dimensions();
        let loader: ProviderLoader = Box::new(move || {
            let provider = provider.clone();
            async move { Ok::<_, RagError>(provider) }.boxed()
        });
        Self::new(model_name, dimension, 32, 1024, loader)
    }

    /// Build the service described by configuration; the model loads lazily
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let dimension = config.dimension;

        let loader: ProviderLoader = match config.provider {
            EmbeddingProviderKind::Hashing => {
                if config.model_name != HashingEmbedder::MODEL_NAME {
                    return Err(RagError::Configuration(format!(
                        "hashing provider serves model {}, not {}",
                        HashingEmbedder::MODEL_NAME,
                        config.model_name
                    )));
                }
                Box::new(move || {
                    async move {
                        Ok::<_, RagError>(Arc::new(HashingEmbedder::new(dimension)) as Arc<dyn EmbeddingProvider>)
                    }
                    .boxed()
                })
            }
            EmbeddingProviderKind::Http => {
                let endpoint = config.endpoint.clone().ok_or_else(|| {
                    RagError::Configuration("embedding.endpoint is required".to_string())
                })?;
                let model = config.model_name.clone();
                let api_key = config.api_key.clone();
                Box::new(move || {
                    let endpoint = endpoint.clone();
                    let model = model.clone();
                    let api_key = api_key.clone();
                    async move {
                        let provider =
                            HttpEmbeddingProvider::connect(endpoint, model, api_key, dimension, PROBE_TIMEOUT)
                                .await?;
                        Ok::<_, RagError>(Arc::new(provider) as Arc<dyn EmbeddingProvider>)
                    }
                    .boxed()
                })
            }
        };

        Ok(Self::new(
            config.model_name.clone(),
            dimension,
            config.batch_size,
            config.cache_capacity,
            loader,
        ))
    }

    /// Model identifier recorded alongside indexed vectors
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Resolve the provider, loading it on first call
    async fn provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let loaded = self
            .provider
            .get_or_init(|| async {
                info!("Loading embedding model {}", self.model_name);
                match (self.loader)().await {
                    Ok(provider) if provider.dimensions() != self.dimension => {
                        let reason = format!(
                            "model {} produces {} dimensions, expected {}",
                            provider.model_name(),
                            provider.dimensions(),
                            self.dimension
                        );
                        error!("Embedding model rejected: {}", reason);
                        Err(reason)
                    }
                    Ok(provider) => {
                        info!("Embedding model {} ready ({} dims)", provider.model_name(), self.dimension);
                        Ok(provider)
                    }
                    Err(e) => {
                        error!("Embedding model failed to load: {}", e);
                        Err(e.to_string())
                    }
                }
            })
            .await;

        loaded
            .clone()
            .map_err(RagError::ModelUnavailable)
    }

    /// Whether the model is (or can be) loaded
    pub async fn is_available(&self) -> bool {
        self.provider().await.is_ok()
    }

    /// Encode a single text, serving repeats from the cache
    pub async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RagError::InvalidInput("cannot encode empty text".to_string()));
        }

        if let Some(cached) = self.cache.get(text).await {
            METRICS.record_embedding_cache(true);
            return Ok(cached.as_ref().clone());
        }
        METRICS.record_embedding_cache(false);

        let provider = self.provider().await?;
        let vector = provider.embed(text).await?;
        self.check_dimension(&vector)?;

        self.cache.insert(text.to_string(), Arc::new(vector.clone())).await;
        Ok(vector)
    }

    /// Encode many texts in provider-sized batches, preserving order
    pub async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(RagError::InvalidInput(format!("text at position {} is empty", pos)));
        }

        let provider = self.provider().await?;
        let mut vectors = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            let batch = provider.embed_batch(chunk).await?;
            if batch.len() != chunk.len() {
                return Err(RagError::Embedding(format!(
                    "provider returned {} vectors for {} texts",
                    batch.len(),
                    chunk.len()
                )));
            }
            for vector in &batch {
                self.check_dimension(vector)?;
            }
            vectors.extend(batch);
        }

        debug!("Encoded {} texts in batches of {}", texts.len(), self.batch_size);
        Ok(vectors)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_loader(counter: Arc<AtomicUsize>, fail: bool) -> ProviderLoader {
        Box::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                if fail {
                    Err(RagError::ModelUnavailable("weights missing".to_string()))
                } else {
                    Ok(Arc::new(HashingEmbedder::new(64)) as Arc<dyn EmbeddingProvider>)
                }
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_concurrent_first_use_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let service = Arc::new(EmbeddingService::new(
            "hashing-v1",
            64,
            8,
            16,
            counting_loader(loads.clone(), false),
        ));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move { service.encode(&format!("query {}", i)).await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_permanent() {
        let loads = Arc::new(AtomicUsize::new(0));
        let service = EmbeddingService::new("hashing-v1", 64, 8, 16, counting_loader(loads.clone(), true));

        assert!(matches!(service.encode("nav").await, Err(RagError::ModelUnavailable(_))));
        assert!(matches!(service.encode("nav").await, Err(RagError::ModelUnavailable(_))));
        assert!(!service.is_available().await);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_marks_unavailable() {
        let service = EmbeddingService::new(
            "hashing-v1",
            384,
            8,
            16,
            Box::new(|| {
                async { Ok::<_, RagError>(Arc::new(HashingEmbedder::new(64)) as Arc<dyn EmbeddingProvider>) }.boxed()
            }),
        );
        assert!(matches!(service.encode("nav").await, Err(RagError::ModelUnavailable(_))));
    }

    #[tokio::test]
    async fn test_encode_batch_preserves_order() {
        let service = EmbeddingService::from_provider(Arc::new(HashingEmbedder::new(128)));
        let texts: Vec<String> = (0..70).map(|i| format!("document number {}", i)).collect();
        let batch = service.encode_batch(&texts).await.unwrap();

        assert_eq!(batch.len(), 70);
        assert_eq!(batch[42], service.encode("document number 42").await.unwrap());
    }

    #[tokio::test]
    async fn test_encode_rejects_empty() {
        let service = EmbeddingService::from_provider(Arc::new(HashingEmbedder::new(32)));
        assert!(matches!(service.encode("  ").await, Err(RagError::InvalidInput(_))));
        assert!(service.encode_batch(&["ok".to_string(), "".to_string()]).await.is_err());
    }

    #[tokio::test]
    async fn test_cached_encoding_matches() {
        let service = EmbeddingService::from_provider(Arc::new(HashingEmbedder::new(32)));
        let first = service.encode("exit load").await.unwrap();
        let second = service.encode("  exit load ").await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_from_config_rejects_unknown_hashing_model() {
        let config = EmbeddingConfig {
            model_name: "all-MiniLM-L6-v2".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            EmbeddingService::from_config(&config),
            Err(RagError::Configuration(_))
        ));
    }

    #[test]
    fn test_from_config_default() {
        let service = EmbeddingService::from_config(&EmbeddingConfig::default()).unwrap();
        assert_eq!(service.model_name(), "hashing-v1");
        assert_eq!(service.dimension(), 384);
    }
}
