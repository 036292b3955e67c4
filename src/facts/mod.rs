//! Fund scheme facts
//!
//! Schemes and their sourced facts are owned by an upstream ingestion job.
//! This module models them and exposes read-only access:
//! - A closed vocabulary of fact types with labels and query keywords
//! - The `FactSource` trait consumed by retrieval
//! - An in-memory store loaded from JSON seed data

pub mod store;
pub mod models;

pub use store::{FactSource, InMemoryFactStore};
pub use models::{Fact, FactQuery, FactType, Scheme};
