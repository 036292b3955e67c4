//! Query understanding
//!
//! Raw questions are normalized and classified, and a candidate scheme name
//! and fact-type intent are extracted for the retriever.

pub mod processor;

pub use processor::{normalize_query, Query, QueryProcessor, QueryType};
