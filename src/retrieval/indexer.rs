//! Offline index building from the fact store

use crate::embedding::EmbeddingService;
use crate::error::{RagError, Result};
use crate::facts::{Fact, FactQuery, FactSource, Scheme};
use crate::vector::{documents_fingerprint, DocumentMetadata, IndexSnapshot, VectorStore};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

/// Text embedded for a fact: `"{label} of {scheme} ({category})"`
pub fn document_text(scheme: &Scheme, fact: &Fact) -> String {
    match scheme.category.as_deref() {
        Some(category) if !category.trim().is_empty() => {
            format!("{} of {} ({})", fact.fact_type.label(), scheme.name, category)
        }
        _ => format!("{} of {}", fact.fact_type.label(), scheme.name),
    }
}

/// Stable id of the document derived from a fact
pub fn document_id(scheme: &Scheme, fact: &Fact) -> String {
    format!("scheme_{}_fact_{}_{}", scheme.id, fact.id, fact.fact_type)
}

pub fn document_metadata(scheme: &Scheme, fact: &Fact) -> DocumentMetadata {
    DocumentMetadata {
        fact_id: fact.id,
        scheme_id: scheme.id,
        scheme_name: scheme.name.clone(),
        category: scheme.category.clone(),
        fact_type: fact.fact_type,
        value: fact.value.clone(),
        source_url: fact.source_url.clone(),
        last_updated: fact.last_updated,
    }
}

/// Every fact paired with its scheme; a fact naming an unknown scheme is an error
fn corpus(facts: &dyn FactSource) -> Result<Vec<(Scheme, Fact)>> {
    let schemes: HashMap<u64, Scheme> = facts.schemes()?.into_iter().map(|s| (s.id, s)).collect();
    let all_facts = facts.facts(&FactQuery {
        limit: usize::MAX,
        ..FactQuery::default()
    })?;

    all_facts
        .into_iter()
        .map(|fact| match schemes.get(&fact.scheme_id) {
            Some(scheme) => Ok((scheme.clone(), fact)),
            None => Err(RagError::FactStore(format!(
                "fact {} references unknown scheme {}",
                fact.id, fact.scheme_id
            ))),
        })
        .collect()
}

/// Fingerprint of the documents `rebuild_index` would build from `facts`.
///
/// Equal to [`IndexSnapshot::fingerprint`] of an index built from the same
/// facts, whatever the embedding model.
pub fn corpus_fingerprint(facts: &dyn FactSource) -> Result<String> {
    let documents: BTreeMap<String, DocumentMetadata> = corpus(facts)?
        .iter()
        .map(|(scheme, fact)| (document_id(scheme, fact), document_metadata(scheme, fact)))
        .collect();
    documents_fingerprint(documents.iter().map(|(id, metadata)| (id.as_str(), metadata)))
}

/// Re-embed every fact and atomically swap the new index in.
///
/// Readers keep searching the previous snapshot until the swap. Returns the
/// number of indexed documents.
pub async fn rebuild_index(
    embedding: &EmbeddingService,
    facts: &dyn FactSource,
    store: &VectorStore,
) -> Result<usize> {
    let entries = corpus(facts)?;

    let texts: Vec<String> = entries.iter().map(|(scheme, fact)| document_text(scheme, fact)).collect();
    let vectors = if texts.is_empty() {
        warn!("Fact store is empty, building an empty index");
        Vec::new()
    } else {
        embedding.encode_batch(&texts).await?
    };

    let mut snapshot = IndexSnapshot::new(embedding.model_name(), embedding.dimension());
    for ((scheme, fact), vector) in entries.iter().zip(vectors) {
        snapshot.insert(document_id(scheme, fact), vector, document_metadata(scheme, fact))?;
    }

    if snapshot.len() != entries.len() {
        return Err(RagError::Internal(format!(
            "index holds {} documents for {} facts",
            snapshot.len(),
            entries.len()
        )));
    }

    let count = snapshot.len();
    store.replace(snapshot)?;
    info!("Indexed {} facts with model {}", count, embedding.model_name());
    Ok(count)
}
