//! Two-stage retrieval: vector search gated by confidence, fuzzy fallback

use super::indexer::{document_id, document_metadata};
use crate::config::{MatcherConfig, RetrieverConfig};
use crate::embedding::EmbeddingService;
use crate::error::{RagError, Result};
use crate::facts::{Fact, FactQuery, FactSource, FactType, Scheme};
use crate::matcher::{SchemeMatcher, SchemeRegistry};
use crate::metrics::METRICS;
use crate::query::Query;
use crate::vector::{DocumentMetadata, VectorStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Scheme-only matches rank below exact fact-type matches
const SCHEME_ONLY_WEIGHT: f32 = 0.5;

/// Which stage produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Vector,
    Fuzzy,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Vector => "vector",
            Strategy::Fuzzy => "fuzzy",
        }
    }
}

/// A retrieved fact document with its score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub id: String,
    pub score: f32,
    pub metadata: DocumentMetadata,
}

/// Outcome of one retrieval; hits are ordered by descending score
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalResult {
    Found { via: Strategy, hits: Vec<ScoredDocument> },
    NotFound,
}

impl RetrievalResult {
    pub fn is_found(&self) -> bool {
        matches!(self, RetrievalResult::Found { .. })
    }

    pub fn strategy(&self) -> Option<Strategy> {
        match self {
            RetrievalResult::Found { via, .. } => Some(*via),
            RetrievalResult::NotFound => None,
        }
    }

    pub fn hits(&self) -> &[ScoredDocument] {
        match self {
            RetrievalResult::Found { hits, .. } => hits,
            RetrievalResult::NotFound => &[],
        }
    }

    pub fn top(&self) -> Option<&ScoredDocument> {
        self.hits().first()
    }
}

/// Reasons the vector stage produced no acceptable candidate
enum VectorOutcome {
    Accepted(Vec<ScoredDocument>),
    Skipped(&'static str),
}

/// Orchestrates vector search and fuzzy fallback.
///
/// Holds only shared read-only handles; one instance serves any number of
/// concurrent calls.
pub struct RagRetriever {
    embedding: Arc<EmbeddingService>,
    store: Arc<VectorStore>,
    facts: Arc<dyn FactSource>,
    registry: SchemeRegistry,
    config: RetrieverConfig,
}

impl RagRetriever {
    /// Build a retriever; the scheme registry is snapshotted from the fact store
    pub fn new(
        embedding: Arc<EmbeddingService>,
        store: Arc<VectorStore>,
        facts: Arc<dyn FactSource>,
        config: RetrieverConfig,
        matcher: &MatcherConfig,
    ) -> Result<Self> {
        if config.top_k == 0 {
            return Err(RagError::Configuration("retriever.top_k must be positive".to_string()));
        }

        let schemes = facts.schemes()?;
        let registry = SchemeRegistry::new(&schemes, SchemeMatcher::new(matcher.threshold));
        info!(
            "Retriever ready: {} schemes, top_k {}, vector threshold {:.2}, fuzzy threshold {:.2}",
            schemes.len(),
            config.top_k,
            config.similarity_threshold,
            matcher.threshold
        );

        Ok(Self {
            embedding,
            store,
            facts,
            registry,
            config,
        })
    }

    pub fn registry(&self) -> &SchemeRegistry {
        &self.registry
    }

    /// Retrieve facts for a query. Never fails; problems degrade to the
    /// fuzzy path or to `NotFound`.
    pub async fn retrieve(&self, query: &Query) -> RetrievalResult {
        let result = match self.vector_stage(query).await {
            VectorOutcome::Accepted(hits) => RetrievalResult::Found {
                via: Strategy::Vector,
                hits,
            },
            VectorOutcome::Skipped(reason) => {
                debug!("Vector stage skipped ({}), trying fuzzy path", reason);
                METRICS.record_vector_skip(reason);
                self.fuzzy_stage(query)
            }
        };

        match &result {
            RetrievalResult::Found { via, hits } => {
                debug!("Retrieved {} hits via {}", hits.len(), via.as_str());
                METRICS.record_retrieval(via.as_str());
            }
            RetrievalResult::NotFound => {
                debug!("No facts found for '{}'", query.raw);
                METRICS.record_retrieval("not_found");
            }
        }
        result
    }

    async fn vector_stage(&self, query: &Query) -> VectorOutcome {
        let snapshot = match self.store.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Vector index unavailable: {}", e);
                return VectorOutcome::Skipped("error");
            }
        };

        if snapshot.is_empty() {
            return VectorOutcome::Skipped("index_empty");
        }
        if snapshot.model() != self.embedding.model_name() || snapshot.dimension() != self.embedding.dimension() {
            warn!(
                "Index built with {} ({} dims) but queries use {} ({} dims)",
                snapshot.model(),
                snapshot.dimension(),
                self.embedding.model_name(),
                self.embedding.dimension()
            );
            return VectorOutcome::Skipped("model_mismatch");
        }

        let vector = match self.embedding.encode(&query.raw).await {
            Ok(vector) => vector,
            Err(RagError::ModelUnavailable(_)) => return VectorOutcome::Skipped("model_unavailable"),
            Err(e) => {
                warn!("Query encoding failed: {}", e);
                return VectorOutcome::Skipped("error");
            }
        };

        let hits = match snapshot.search(&vector, self.config.top_k) {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Vector search failed: {}", e);
                return VectorOutcome::Skipped("error");
            }
        };

        let hits: Vec<ScoredDocument> = hits
            .into_iter()
            .filter(|hit| !hit.metadata.source_url.trim().is_empty())
            .map(|hit| ScoredDocument {
                id: hit.id,
                score: hit.score,
                metadata: hit.metadata,
            })
            .collect();

        match hits.first() {
            Some(best) if best.score >= self.config.similarity_threshold => {}
            Some(best) => {
                debug!(
                    "Best vector score {:.3} below threshold {:.2}",
                    best.score, self.config.similarity_threshold
                );
                return VectorOutcome::Skipped("below_threshold");
            }
            None => return VectorOutcome::Skipped("index_empty"),
        }

        let hits = match query.fact_type {
            Some(intent) => match self.intent_first(hits, intent) {
                Some(hits) => hits,
                None => {
                    debug!("No confident {} hit among vector candidates", intent);
                    return VectorOutcome::Skipped("intent_mismatch");
                }
            },
            None => hits,
        };

        if let Some(best) = hits.first() {
            debug!("Vector stage accepted '{}' (score {:.3})", best.id, best.score);
        }
        VectorOutcome::Accepted(hits)
    }

    /// Reorder hits so those of the requested fact type lead.
    ///
    /// `None` unless the best hit of that type clears the similarity
    /// threshold and belongs to the same scheme as the best hit overall.
    fn intent_first(&self, hits: Vec<ScoredDocument>, intent: FactType) -> Option<Vec<ScoredDocument>> {
        let best_scheme = hits.first()?.metadata.scheme_id;
        let (matching, rest): (Vec<_>, Vec<_>) = hits.into_iter().partition(|hit| hit.metadata.fact_type == intent);
        match matching.first() {
            Some(lead) if lead.score >= self.config.similarity_threshold && lead.metadata.scheme_id == best_scheme => {
                Some(matching.into_iter().chain(rest).collect())
            }
            _ => None,
        }
    }

    fn fuzzy_stage(&self, query: &Query) -> RetrievalResult {
        let outcome = if let Some(candidate) = query.scheme_name.as_deref() {
            self.scheme_facts(candidate, query.fact_type)
        } else if let (Some(category), Some(fact_type)) = (query.category.as_deref(), query.fact_type) {
            self.category_facts(category, fact_type)
        } else {
            Ok(Vec::new())
        };

        match outcome {
            Ok(hits) if !hits.is_empty() => RetrievalResult::Found {
                via: Strategy::Fuzzy,
                hits,
            },
            Ok(_) => RetrievalResult::NotFound,
            Err(e) => {
                warn!("Fuzzy lookup failed: {}", e);
                RetrievalResult::NotFound
            }
        }
    }

    /// Facts of the matched scheme, exact intent first
    fn scheme_facts(&self, candidate: &str, intent: Option<FactType>) -> Result<Vec<ScoredDocument>> {
        let Some(found) = self.registry.match_scheme(candidate) else {
            debug!("No scheme matches '{}'", candidate);
            return Ok(Vec::new());
        };
        let Some(scheme) = self.facts.scheme(found.scheme_id)? else {
            return Ok(Vec::new());
        };
        let facts = self.facts.facts(&FactQuery::for_scheme(scheme.id))?;

        let mut hits: Vec<ScoredDocument> = match intent {
            Some(fact_type) => {
                let (exact, rest): (Vec<&Fact>, Vec<&Fact>) =
                    facts.iter().partition(|f| f.fact_type == fact_type);
                if exact.is_empty() {
                    debug!("{} has no {} fact", scheme.name, fact_type);
                    return Ok(Vec::new());
                }
                exact
                    .into_iter()
                    .map(|f| scored(&scheme, f, found.similarity))
                    .chain(rest.into_iter().map(|f| scored(&scheme, f, found.similarity * SCHEME_ONLY_WEIGHT)))
                    .collect()
            }
            None => facts.iter().map(|f| scored(&scheme, f, found.similarity)).collect(),
        };

        hits.retain(|hit| !hit.metadata.source_url.trim().is_empty());
        hits.truncate(self.config.top_k);
        Ok(hits)
    }

    /// Facts of one type across every scheme in a category
    fn category_facts(&self, category: &str, fact_type: FactType) -> Result<Vec<ScoredDocument>> {
        let mut hits = Vec::new();
        for scheme in self.facts.schemes_by_category(category)? {
            let query = FactQuery::for_scheme(scheme.id).with_fact_type(fact_type);
            for fact in self.facts.facts(&query)? {
                hits.push(scored(&scheme, &fact, 1.0));
            }
        }

        debug!("Category '{}' yielded {} {} facts", category, hits.len(), fact_type);
        hits.retain(|hit| !hit.metadata.source_url.trim().is_empty());
        hits.sort_by(|a, b| a.metadata.fact_id.cmp(&b.metadata.fact_id));
        hits.truncate(self.config.top_k);
        Ok(hits)
    }
}

fn scored(scheme: &Scheme, fact: &Fact, score: f32) -> ScoredDocument {
    ScoredDocument {
        id: document_id(scheme, fact),
        score,
        metadata: document_metadata(scheme, fact),
    }
}
