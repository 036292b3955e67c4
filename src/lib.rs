//! Grounded answers to factual questions about mutual fund schemes.
//!
//! A question is parsed for a scheme name and a fact type, matched against a
//! curated corpus of sourced facts (vector search first, fuzzy scheme
//! matching as the fallback) and answered with the source URL of the fact
//! it is based on.

pub mod assistant;
pub mod config;
pub mod embedding;
pub mod error;
pub mod facts;
pub mod generation;
pub mod logging;
pub mod matcher;
pub mod metrics;
pub mod query;
pub mod retrieval;
pub mod vector;

pub use assistant::FaqAssistant;
pub use config::Config;
pub use error::{RagError, Result};
pub use generation::{Answer, LanguageModel};
pub use query::{Query, QueryType};
pub use retrieval::{RetrievalResult, Strategy};
