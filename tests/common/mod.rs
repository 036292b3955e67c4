//! Shared fixture corpus for integration tests

#![allow(dead_code)]

use chrono::NaiveDate;
use fund_facts_rag::config::{MatcherConfig, RetrieverConfig};
use fund_facts_rag::embedding::{EmbeddingService, HashingEmbedder};
use fund_facts_rag::facts::{Fact, FactSource, FactType, InMemoryFactStore, Scheme};
use fund_facts_rag::retrieval::{rebuild_index, RagRetriever};
use fund_facts_rag::vector::VectorStore;
use std::sync::Arc;

pub const LARGE_CAP_URL: &str = "https://groww.in/mutual-funds/icici-prudential-large-cap-fund-direct-growth";

const SCHEMES: &[(u64, &str, &str, &str, &[&str])] = &[
    (
        1,
        "ICICI Prudential Large Cap Fund",
        "Large Cap",
        "icici-prudential-large-cap-fund-direct-growth",
        &["ICICI Pru Bluechip", "ICICI Prudential Bluechip Fund"],
    ),
    (2, "ICICI Prudential Midcap Fund", "Mid Cap", "icici-prudential-midcap-fund-direct-growth", &[]),
    (3, "ICICI Prudential Smallcap Fund", "Small Cap", "icici-prudential-smallcap-fund-direct-growth", &[]),
    (
        4,
        "ICICI Prudential Large & Mid Cap Fund",
        "Large & Mid Cap",
        "icici-prudential-large-mid-cap-fund-direct-growth",
        &[],
    ),
    (
        5,
        "ICICI Prudential ELSS Tax Saver Fund",
        "ELSS",
        "icici-prudential-long-term-equity-fund-tax-saving-direct-growth",
        &[],
    ),
];

/// Fact values per scheme, in fact-type order
fn values(scheme_id: u64) -> Vec<(FactType, &'static str)> {
    let mut values = match scheme_id {
        1 => vec![
            (FactType::ExpenseRatio, "0.85%"),
            (FactType::ExitLoad, "1% if redeemed within 1 year"),
            (FactType::MinSip, "₹100"),
            (FactType::MinLumpsum, "₹100"),
            (FactType::Benchmark, "NIFTY 100 TRI"),
            (FactType::Nav, "₹112.45"),
            (FactType::Rating, "5"),
            (FactType::Riskometer, "Very High"),
        ],
        2 => vec![
            (FactType::ExpenseRatio, "1.05%"),
            (FactType::ExitLoad, "1% if redeemed within 1 year"),
            (FactType::MinSip, "₹100"),
            (FactType::MinLumpsum, "₹5,000"),
            (FactType::Benchmark, "NIFTY Midcap 150 TRI"),
            (FactType::Nav, "₹298.30"),
            (FactType::Rating, "3"),
            (FactType::Riskometer, "Very High"),
        ],
        3 => vec![
            (FactType::ExpenseRatio, "0.72%"),
            (FactType::ExitLoad, "1% if redeemed within 1 year"),
            (FactType::MinSip, "₹100"),
            (FactType::MinLumpsum, "₹5,000"),
            (FactType::Benchmark, "NIFTY Smallcap 250 TRI"),
            (FactType::Nav, "₹91.12"),
            (FactType::Rating, "3"),
            (FactType::Riskometer, "Very High"),
        ],
        4 => vec![
            (FactType::ExpenseRatio, "0.79%"),
            (FactType::ExitLoad, "1% if redeemed within 1 month"),
            (FactType::MinSip, "₹100"),
            (FactType::MinLumpsum, "₹5,000"),
            (FactType::Benchmark, "NIFTY LargeMidcap 250 TRI"),
            (FactType::Nav, "₹1,020.55"),
            (FactType::Rating, "4"),
            (FactType::Riskometer, "Very High"),
        ],
        _ => vec![
            (FactType::ExpenseRatio, "1.08%"),
            (FactType::ExitLoad, "Nil"),
            (FactType::MinSip, "₹500"),
            (FactType::MinLumpsum, "₹500"),
            (FactType::Benchmark, "NIFTY 500 TRI"),
            (FactType::Nav, "₹935.40"),
            (FactType::Rating, "4"),
            (FactType::Riskometer, "Very High"),
        ],
    };
    if scheme_id == 5 {
        values.push((FactType::LockInPeriod, "3 years"));
    }
    values
}

pub fn schemes() -> Vec<Scheme> {
    SCHEMES
        .iter()
        .map(|(id, name, category, _, aliases)| Scheme {
            id: *id,
            name: name.to_string(),
            category: Some(category.to_string()),
            risk_level: Some("Very High".to_string()),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            url: None,
        })
        .collect()
}

pub fn facts() -> Vec<Fact> {
    let mut facts = Vec::new();
    let mut next_id = 1;
    for (scheme_id, _, _, slug, _) in SCHEMES {
        for (fact_type, value) in values(*scheme_id) {
            facts.push(Fact {
                id: next_id,
                scheme_id: *scheme_id,
                fact_type,
                value: value.to_string(),
                source_url: format!("https://groww.in/mutual-funds/{}", slug),
                last_updated: NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            });
            next_id += 1;
        }
    }
    facts
}

pub fn fact_store() -> Arc<InMemoryFactStore> {
    Arc::new(InMemoryFactStore::from_parts(schemes(), facts()).unwrap())
}

/// Phrase a user would write for a fact type
pub fn keyword(fact_type: FactType) -> &'static str {
    match fact_type {
        FactType::ExpenseRatio => "expense ratio",
        FactType::ExitLoad => "exit load",
        FactType::MinSip => "minimum SIP",
        FactType::MinLumpsum => "minimum lumpsum",
        FactType::LockInPeriod => "lock-in period",
        FactType::Benchmark => "benchmark",
        FactType::Nav => "NAV",
        FactType::Rating => "rating",
        FactType::Riskometer => "riskometer",
        FactType::FundSize => "fund size",
        FactType::StatementDownload => "statement download",
    }
}

pub struct Pipeline {
    pub embedding: Arc<EmbeddingService>,
    pub store: Arc<VectorStore>,
    pub facts: Arc<InMemoryFactStore>,
    pub retriever: RagRetriever,
}

/// Indexed retriever over the fixture corpus with default thresholds
pub async fn pipeline() -> Pipeline {
    let facts = fact_store();
    let embedding = Arc::new(EmbeddingService::from_provider(Arc::new(HashingEmbedder::new(384))));
    let store = Arc::new(VectorStore::new(embedding.model_name(), embedding.dimension()));
    rebuild_index(&embedding, facts.as_ref(), &store).await.unwrap();

    let retriever = RagRetriever::new(
        embedding.clone(),
        store.clone(),
        facts.clone() as Arc<dyn FactSource>,
        RetrieverConfig::default(),
        &MatcherConfig::default(),
    )
    .unwrap();

    Pipeline {
        embedding,
        store,
        facts,
        retriever,
    }
}
