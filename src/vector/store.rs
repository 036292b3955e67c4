//! Cosine-similarity vector store with snapshot persistence

use crate::error::{RagError, Result};
use crate::facts::FactType;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

const FORMAT_VERSION: u32 = 1;

/// Fact attributes carried alongside each vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub fact_id: u64,
    pub scheme_id: u64,
    pub scheme_name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub fact_type: FactType,
    pub value: String,
    pub source_url: String,
    pub last_updated: NaiveDate,
}

/// One indexed document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub vector: Vec<f32>,
    norm: f32,
    pub metadata: DocumentMetadata,
}

/// Search result
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub metadata: DocumentMetadata,
}

/// SHA-256 digest over `(id, metadata)` pairs, which must arrive in id order.
///
/// Two corpora with the same digest render the same document texts and
/// carry the same values and sources.
pub fn documents_fingerprint<'a>(
    documents: impl IntoIterator<Item = (&'a str, &'a DocumentMetadata)>,
) -> Result<String> {
    let mut hasher = Sha256::new();
    for document in documents {
        hasher.update(serde_json::to_vec(&document)?);
        hasher.update(b"\n");
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Immutable view of the index at one point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    model: String,
    dimension: usize,
    documents: BTreeMap<String, IndexedDocument>,
}

impl IndexSnapshot {
    pub fn new(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            model: model.into(),
            dimension,
            documents: BTreeMap::new(),
        }
    }

    /// Embedding model that produced every vector in this snapshot
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Fingerprint of the indexed corpus, see [`documents_fingerprint`]
    pub fn fingerprint(&self) -> Result<String> {
        documents_fingerprint(self.documents.iter().map(|(id, doc)| (id.as_str(), &doc.metadata)))
    }

    pub fn get(&self, id: &str) -> Option<&IndexedDocument> {
        self.documents.get(id)
    }

    /// Insert or replace a document
    pub fn insert(&mut self, id: impl Into<String>, vector: Vec<f32>, metadata: DocumentMetadata) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(RagError::InvalidInput("vector contains non-finite values".to_string()));
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        self.documents.insert(id.into(), IndexedDocument { vector, norm, metadata });
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.documents.remove(id).is_some()
    }

    /// Top-`k` documents by cosine similarity, ties broken by ascending id
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.documents.is_empty() {
            return Ok(Vec::new());
        }

        let query_norm = query.iter().map(|x| x * x).sum::<f32>().sqrt();

        let mut scored: Vec<(&String, f32, &IndexedDocument)> = self
            .documents
            .iter()
            .map(|(id, doc)| {
                let score = if query_norm == 0.0 || doc.norm == 0.0 {
                    0.0
                } else {
                    let dot: f32 = query.iter().zip(&doc.vector).map(|(a, b)| a * b).sum();
                    dot / (query_norm * doc.norm)
                };
                (id, score, doc)
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(id, score, doc)| SearchHit {
                id: id.clone(),
                score,
                metadata: doc.metadata.clone(),
            })
            .collect())
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    format_version: u32,
    snapshot: IndexSnapshot,
}

/// Thread-safe vector store.
///
/// Readers take a cheap `Arc` clone of the current snapshot and search it
/// without holding the lock. Writers copy-on-write, so in-flight searches
/// keep the snapshot they started with.
#[derive(Debug)]
pub struct VectorStore {
    current: RwLock<Arc<IndexSnapshot>>,
}

impl VectorStore {
    pub fn new(model: impl Into<String>, dimension: usize) -> Self {
        Self::from_snapshot(IndexSnapshot::new(model, dimension))
    }

    pub fn from_snapshot(snapshot: IndexSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Current snapshot; stays valid and unchanged across later writes
    pub fn snapshot(&self) -> Result<Arc<IndexSnapshot>> {
        self.current
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| RagError::Internal("vector store lock poisoned".to_string()))
    }

    fn write<T>(&self, f: impl FnOnce(&mut IndexSnapshot) -> Result<T>) -> Result<T> {
        let mut guard = self
            .current
            .write()
            .map_err(|_| RagError::Internal("vector store lock poisoned".to_string()))?;
        f(Arc::make_mut(&mut *guard))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.snapshot()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.snapshot()?.is_empty())
    }

    /// Insert or replace a document; re-upserting an id never duplicates it
    pub fn upsert(&self, id: impl Into<String>, vector: Vec<f32>, metadata: DocumentMetadata) -> Result<()> {
        self.write(|snapshot| snapshot.insert(id, vector, metadata))
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        self.write(|snapshot| Ok(snapshot.remove(id)))
    }

    /// Remove every document, keeping model and dimension
    pub fn clear(&self) -> Result<()> {
        self.write(|snapshot| {
            snapshot.documents.clear();
            Ok(())
        })
    }

    /// Search the current snapshot; an empty index yields no hits
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        self.snapshot()?.search(query, k)
    }

    /// Atomically swap in a fully built snapshot
    pub fn replace(&self, snapshot: IndexSnapshot) -> Result<()> {
        let mut guard = self
            .current
            .write()
            .map_err(|_| RagError::Internal("vector store lock poisoned".to_string()))?;
        info!(
            "Swapping vector index: {} -> {} documents (model {})",
            guard.len(),
            snapshot.len(),
            snapshot.model
        );
        *guard = Arc::new(snapshot);
        Ok(())
    }

    /// Persist the current snapshot; writes to a temp file then renames
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let snapshot = self.snapshot()?;
        let persisted = PersistedIndex {
            format_version: FORMAT_VERSION,
            snapshot: snapshot.as_ref().clone(),
        };
        let bytes = rmp_serde::to_vec_named(&persisted)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, path)?;

        debug!("Saved {} documents to {}", snapshot.len(), path.display());
        Ok(())
    }

    /// Load a store previously written by [`VectorStore::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let persisted: PersistedIndex = rmp_serde::from_slice(&bytes)?;

        if persisted.format_version != FORMAT_VERSION {
            return Err(RagError::InvalidInput(format!(
                "unsupported index format version {}",
                persisted.format_version
            )));
        }

        let snapshot = persisted.snapshot;
        if let Some((id, doc)) = snapshot
            .documents
            .iter()
            .find(|(_, doc)| doc.vector.len() != snapshot.dimension)
        {
            return Err(RagError::InvalidInput(format!(
                "document {} has {} dimensions, index declares {}",
                id,
                doc.vector.len(),
                snapshot.dimension
            )));
        }

        info!("Loaded {} documents from {} (model {})", snapshot.len(), path.display(), snapshot.model);
        Ok(Self::from_snapshot(snapshot))
    }
}
