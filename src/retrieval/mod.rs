//! Fact retrieval
//!
//! Vector similarity search is tried first; when its best score falls below
//! the acceptance threshold (or the vector stage is unavailable) retrieval
//! falls back to fuzzy scheme matching plus structured fact lookup.

pub mod indexer;
pub mod retriever;

pub use indexer::{corpus_fingerprint, document_id, document_metadata, document_text, rebuild_index};
pub use retriever::{RagRetriever, RetrievalResult, ScoredDocument, Strategy};
