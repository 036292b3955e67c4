//! In-process vector index
//!
//! Documents are fact embeddings keyed by a stable id. Search is exact cosine
//! similarity over an immutable snapshot; writers build a new snapshot and
//! swap it in so readers never see a partially applied change.

pub mod store;

pub use store::{documents_fingerprint, DocumentMetadata, IndexSnapshot, IndexedDocument, SearchHit, VectorStore};
