//! Boundary operation: question in, sourced answer out

use crate::config::Config;
use crate::embedding::EmbeddingService;
use crate::error::{RagError, Result};
use crate::facts::{FactSource, InMemoryFactStore};
use crate::generation::{detect_advice, Answer, ChatCompletionClient, LanguageModel, ResponseGenerator};
use crate::logging::init_tracing;
use crate::metrics::METRICS;
use crate::query::{QueryProcessor, QueryType};
use crate::retrieval::{corpus_fingerprint, rebuild_index, RagRetriever};
use crate::vector::VectorStore;
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Fund facts assistant.
///
/// `answer` never fails: retrieval and generation problems resolve to a
/// fallback answer, a not-found answer or a facts-only refusal.
pub struct FaqAssistant {
    processor: QueryProcessor,
    retriever: RagRetriever,
    generator: ResponseGenerator,
    embedding: Arc<EmbeddingService>,
    store: Arc<VectorStore>,
    facts: Arc<dyn FactSource>,
}

impl FaqAssistant {
    pub fn new(
        processor: QueryProcessor,
        retriever: RagRetriever,
        generator: ResponseGenerator,
        embedding: Arc<EmbeddingService>,
        store: Arc<VectorStore>,
        facts: Arc<dyn FactSource>,
    ) -> Self {
        Self {
            processor,
            retriever,
            generator,
            embedding,
            store,
            facts,
        }
    }

    /// Assemble the pipeline from configuration.
    ///
    /// The vector index is loaded from `vector_store.index_path` when it holds
    /// an index for the configured model, and rebuilt from the fact store
    /// otherwise. An embedding model that cannot load leaves the index empty
    /// and the assistant answers through the fuzzy path only.
    pub async fn from_config(
        config: &Config,
        facts: Arc<dyn FactSource>,
        llm: Option<Arc<dyn LanguageModel>>,
    ) -> Result<Self> {
        config.validate()?;

        let embedding = Arc::new(EmbeddingService::from_config(&config.embedding)?);
        let store = Arc::new(open_index(config, &embedding, facts.as_ref()).await?);
        let model_enabled = llm.is_some();

        let processor = match &llm {
            Some(model) => QueryProcessor::with_language_model(model.clone(), config.generator.timeout()),
            None => QueryProcessor::new(),
        };
        let retriever = RagRetriever::new(
            embedding.clone(),
            store.clone(),
            facts.clone(),
            config.retriever.clone(),
            &config.matcher,
        )?;
        let generator = ResponseGenerator::new(llm, config.generator.clone());

        info!(
            "Assistant ready: {} indexed facts, language model {}",
            store.len()?,
            if model_enabled { "enabled" } else { "disabled" }
        );

        Ok(Self::new(processor, retriever, generator, embedding, store, facts))
    }

    /// Start from a config file and a JSON fact seed.
    ///
    /// Installs the tracing subscriber and, when `llm.enabled` is set, the
    /// chat completion client.
    pub async fn from_files(config_path: Option<&Path>, seed_path: &Path) -> anyhow::Result<Self> {
        let config = Config::load(config_path).context("failed to load configuration")?;
        init_tracing(&config.logging);

        let facts = InMemoryFactStore::from_seed_file(seed_path)
            .with_context(|| format!("failed to load fact seed {}", seed_path.display()))?;
        info!("Loaded {} schemes and {} facts", facts.scheme_count(), facts.fact_count());

        let llm: Option<Arc<dyn LanguageModel>> = if config.llm.enabled {
            let client = ChatCompletionClient::new(config.llm.clone()).context("failed to build completion client")?;
            Some(Arc::new(client))
        } else {
            None
        };

        Self::from_config(&config, Arc::new(facts), llm)
            .await
            .context("failed to assemble assistant")
    }

    pub fn retriever(&self) -> &RagRetriever {
        &self.retriever
    }

    pub fn vector_store(&self) -> &VectorStore {
        &self.store
    }

    /// Re-embed the fact corpus and swap the new index in
    pub async fn rebuild_index(&self) -> Result<usize> {
        rebuild_index(&self.embedding, self.facts.as_ref(), &self.store).await
    }

    /// Answer a free-text question
    pub async fn answer(&self, query: &str) -> Answer {
        let request_id = Uuid::new_v4();
        let span = info_span!("answer", %request_id);
        let started = Instant::now();

        let answer = self.answer_inner(query).instrument(span).await;

        METRICS.answer_duration.observe(started.elapsed().as_secs_f64());
        answer
    }

    async fn answer_inner(&self, raw: &str) -> Answer {
        let raw = raw.trim();
        if raw.is_empty() {
            debug!("Empty query");
            return Answer::not_found(QueryType::General);
        }

        if let Some(topic) = detect_advice(raw) {
            info!("Refusing advice request (topic {})", topic.as_str());
            METRICS.record_advice_refusal(topic.as_str());
            return Answer::advice_refusal(topic, self.processor.classify(raw));
        }

        let query = self.processor.understand(raw).await;
        debug!(
            "Query type {} fact {:?} scheme {:?} category {:?}",
            query.query_type.as_str(),
            query.fact_type,
            query.scheme_name,
            query.category
        );

        let result = self.retriever.retrieve(&query).await;
        let answer = self.generator.compose(&query, &result).await;

        info!(
            "Answered via {} (source {})",
            result.strategy().map_or("none", |s| s.as_str()),
            answer.source_url.as_deref().unwrap_or("none")
        );
        answer
    }
}

/// Load a saved index built from the current facts with the configured
/// model, or build a fresh one
async fn open_index(config: &Config, embedding: &EmbeddingService, facts: &dyn FactSource) -> Result<VectorStore> {
    let path = config.vector_store.index_path.as_deref();

    if let Some(path) = path {
        let expected = corpus_fingerprint(facts)?;
        if let Some(store) = load_compatible(path, embedding, &expected) {
            return Ok(store);
        }
    }

    let store = VectorStore::new(embedding.model_name(), embedding.dimension());
    if !config.vector_store.rebuild_on_start {
        warn!("No usable vector index and rebuild disabled, serving fuzzy matches only");
        return Ok(store);
    }

    match rebuild_index(embedding, facts, &store).await {
        Ok(_) => {}
        Err(RagError::ModelUnavailable(reason)) => {
            warn!("Embedding model unavailable ({}), serving fuzzy matches only", reason);
            return Ok(store);
        }
        Err(e) => return Err(e),
    }

    if let Some(path) = path {
        store.save(path)?;
        info!("Saved vector index to {}", path.display());
    }
    Ok(store)
}

fn load_compatible(path: &Path, embedding: &EmbeddingService, fingerprint: &str) -> Option<VectorStore> {
    if !path.exists() {
        return None;
    }

    let store = match VectorStore::load(path) {
        Ok(store) => store,
        Err(e) => {
            warn!("Ignoring unreadable vector index {}: {}", path.display(), e);
            return None;
        }
    };

    let snapshot = store.snapshot().ok()?;
    if snapshot.model() != embedding.model_name() || snapshot.dimension() != embedding.dimension() {
        warn!(
            "Vector index {} was built with {} ({} dims), rebuilding for {}",
            path.display(),
            snapshot.model(),
            snapshot.dimension(),
            embedding.model_name()
        );
        return None;
    }

    match snapshot.fingerprint() {
        Ok(found) if found == fingerprint => Some(store),
        Ok(_) => {
            warn!(
                "Vector index {} ({} documents) does not match the fact store, rebuilding",
                path.display(),
                snapshot.len()
            );
            None
        }
        Err(e) => {
            warn!("Cannot fingerprint vector index {}: {}", path.display(), e);
            None
        }
    }
}
