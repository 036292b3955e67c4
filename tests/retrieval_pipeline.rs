//! Retrieval pipeline tests over the fixture corpus
//!
//! These cover the vector confidence gate, fuzzy fallback, category lookups
//! and determinism of the index.

mod common;

use common::{keyword, pipeline};
use fund_facts_rag::facts::{FactSource, FactType};
use fund_facts_rag::matcher::SchemeMatcher;
use fund_facts_rag::query::{QueryProcessor, QueryType};
use fund_facts_rag::retrieval::{document_metadata, RetrievalResult, Strategy};
use fund_facts_rag::vector::VectorStore;
use std::time::Duration;

fn parse(raw: &str) -> fund_facts_rag::Query {
    QueryProcessor::new().parse(raw)
}

#[tokio::test]
async fn test_every_fact_is_top_vector_hit_for_its_question() {
    let pipeline = pipeline().await;
    let schemes = pipeline.facts.schemes().unwrap();

    for fact in common::facts() {
        let scheme = schemes.iter().find(|s| s.id == fact.scheme_id).unwrap();
        let question = format!("What is the {} of {}?", keyword(fact.fact_type), scheme.name);

        let result = pipeline.retriever.retrieve(&parse(&question)).await;

        assert_eq!(result.strategy(), Some(Strategy::Vector), "{}", question);
        let top = result.top().unwrap();
        assert_eq!(top.metadata.fact_id, fact.id, "{}", question);
        assert_eq!(top.metadata.value, fact.value);
        assert_eq!(top.metadata.source_url, fact.source_url);
    }
}

#[tokio::test]
async fn test_every_keyword_finds_its_fact() {
    let pipeline = pipeline().await;
    let schemes = pipeline.facts.schemes().unwrap();

    for fact in common::facts() {
        let scheme = schemes.iter().find(|s| s.id == fact.scheme_id).unwrap();
        for keyword in fact.fact_type.keywords() {
            let question = format!("What is the {} of {}?", keyword, scheme.name);
            let query = parse(&question);
            assert_eq!(query.fact_type, Some(fact.fact_type), "{}", question);

            let result = pipeline.retriever.retrieve(&query).await;

            let top = result.top().unwrap_or_else(|| panic!("nothing found for '{}'", question));
            assert_eq!(top.metadata.fact_id, fact.id, "{} via {:?}", question, result.strategy());
            assert_eq!(top.metadata.value, fact.value);
        }
    }
}

#[tokio::test]
async fn test_synonym_keywords_are_not_answered_with_another_fact() {
    let pipeline = pipeline().await;

    let result = pipeline
        .retriever
        .retrieve(&parse("What is the TER of ICICI Prudential Large Cap Fund?"))
        .await;
    assert_eq!(result.top().unwrap().metadata.fact_type, FactType::ExpenseRatio);
    assert_eq!(result.top().unwrap().metadata.value, "0.85%");

    let result = pipeline
        .retriever
        .retrieve(&parse("What is the minimum investment of ICICI Prudential Midcap Fund?"))
        .await;
    assert_eq!(result.top().unwrap().metadata.fact_type, FactType::MinLumpsum);
    assert_eq!(result.top().unwrap().metadata.value, "₹5,000");
}

#[tokio::test]
async fn test_search_is_deterministic() {
    let pipeline = pipeline().await;
    let query = pipeline
        .embedding
        .encode("What is the NAV of ICICI Prudential Smallcap Fund?")
        .await
        .unwrap();

    let first = pipeline.store.search(&query, 10).unwrap();
    for _ in 0..5 {
        assert_eq!(pipeline.store.search(&query, 10).unwrap(), first);
    }

    for pair in first.windows(2) {
        assert!(pair[0].score > pair[1].score || (pair[0].score == pair[1].score && pair[0].id < pair[1].id));
    }
}

#[tokio::test]
async fn test_upsert_is_idempotent() {
    let pipeline = pipeline().await;
    let before = pipeline.store.len().unwrap();
    assert_eq!(before, 41);

    let scheme = pipeline.facts.scheme(1).unwrap().unwrap();
    let fact = common::facts().into_iter().next().unwrap();
    let vector = pipeline.embedding.encode("Expense Ratio of ICICI Prudential Large Cap Fund").await.unwrap();

    for _ in 0..3 {
        pipeline
            .store
            .upsert("scheme_1_fact_1_expense_ratio", vector.clone(), document_metadata(&scheme, &fact))
            .unwrap();
    }

    assert_eq!(pipeline.store.len().unwrap(), before);
}

#[tokio::test]
async fn test_empty_index_returns_not_found_quickly() {
    let pipeline = pipeline().await;
    pipeline.store.clear().unwrap();

    let questions = [
        "What is the expense ratio?",
        "expense ratio of Totally Unrelated XYZ Fund",
        "hello",
    ];
    for question in questions {
        let result = tokio::time::timeout(Duration::from_secs(5), pipeline.retriever.retrieve(&parse(question)))
            .await
            .unwrap();
        assert_eq!(result, RetrievalResult::NotFound, "{}", question);
    }
}

#[tokio::test]
async fn test_empty_index_still_serves_fuzzy_matches() {
    let pipeline = pipeline().await;
    pipeline.store.clear().unwrap();

    let result = pipeline
        .retriever
        .retrieve(&parse("What is the expense ratio of ICICI Prudential Large Cap Fund?"))
        .await;

    assert_eq!(result.strategy(), Some(Strategy::Fuzzy));
    assert_eq!(result.top().unwrap().metadata.value, "0.85%");
}

#[tokio::test]
async fn test_fuzzy_path_tolerates_words_around_scheme_name() {
    let pipeline = pipeline().await;
    pipeline.store.clear().unwrap();

    let questions = [
        "What is the expense ratio of ICICI Prudential Large Cap Fund?",
        "What is the expense ratio of ICICI Prudential Large Cap Fund right now?",
        "ICICI Prudential Large Cap Fund expense ratio as of today",
    ];
    for question in questions {
        let result = pipeline.retriever.retrieve(&parse(question)).await;
        assert_eq!(result.strategy(), Some(Strategy::Fuzzy), "{}", question);
        let top = result.top().unwrap();
        assert_eq!(top.metadata.scheme_name, "ICICI Prudential Large Cap Fund", "{}", question);
        assert_eq!(top.metadata.value, "0.85%", "{}", question);
    }

    let result = pipeline
        .retriever
        .retrieve(&parse("What is the NAV of ICICI Prudential Large & Mid Cap Fund today?"))
        .await;
    assert_eq!(result.top().unwrap().metadata.scheme_name, "ICICI Prudential Large & Mid Cap Fund");
}

#[test]
fn test_scheme_matcher_cases() {
    let names: Vec<String> = common::schemes().into_iter().map(|s| s.name).collect();
    let matcher = SchemeMatcher::new(0.85);

    let found = matcher.match_name("ICICI Pru Large Cap", &names).unwrap();
    assert_eq!(found.name, "ICICI Prudential Large Cap Fund");

    assert!(matcher.match_name("Totally Unrelated XYZ Fund", &names).is_none());
}

#[tokio::test]
async fn test_alias_resolves_through_fuzzy_path() {
    let pipeline = pipeline().await;
    let result = pipeline.retriever.retrieve(&parse("What is the exit load of ICICI Pru Bluechip?")).await;

    assert_eq!(result.strategy(), Some(Strategy::Fuzzy));
    let top = result.top().unwrap();
    assert_eq!(top.metadata.scheme_name, "ICICI Prudential Large Cap Fund");
    assert_eq!(top.metadata.fact_type, FactType::ExitLoad);
    assert_eq!(top.metadata.value, "1% if redeemed within 1 year");

    // Exact intent ranks above the scheme's other facts
    assert!(result.hits()[1..].iter().all(|h| h.score < top.score));
}

#[tokio::test]
async fn test_abbreviated_name_resolves_through_fuzzy_path() {
    let pipeline = pipeline().await;
    let result = pipeline.retriever.retrieve(&parse("What is the benchmark of ICICI Pru Midcap?")).await;

    assert_eq!(result.strategy(), Some(Strategy::Fuzzy));
    let top = result.top().unwrap();
    assert_eq!(top.metadata.scheme_name, "ICICI Prudential Midcap Fund");
    assert_eq!(top.metadata.value, "NIFTY Midcap 150 TRI");
}

#[tokio::test]
async fn test_category_question_uses_category_facts() {
    let pipeline = pipeline().await;
    let query = parse("What is the minimum SIP for mid cap funds?");
    assert_eq!(query.query_type, QueryType::CategoryQuery);

    let result = pipeline.retriever.retrieve(&query).await;

    assert_eq!(result.strategy(), Some(Strategy::Fuzzy));
    assert_eq!(result.hits().len(), 1);
    let top = result.top().unwrap();
    assert_eq!(top.metadata.scheme_name, "ICICI Prudential Midcap Fund");
    assert_eq!(top.metadata.fact_type, FactType::MinSip);
}

#[tokio::test]
async fn test_unknown_scheme_is_not_found() {
    let pipeline = pipeline().await;
    let result = pipeline
        .retriever
        .retrieve(&parse("expense ratio of Totally Unrelated XYZ Fund"))
        .await;
    assert_eq!(result, RetrievalResult::NotFound);
}

#[tokio::test]
async fn test_saved_index_answers_identically() {
    let pipeline = pipeline().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("facts.index");
    pipeline.store.save(&path).unwrap();

    let reloaded = VectorStore::load(&path).unwrap();
    let query = pipeline
        .embedding
        .encode("What is the rating of ICICI Prudential Large & Mid Cap Fund?")
        .await
        .unwrap();

    assert_eq!(reloaded.search(&query, 5).unwrap(), pipeline.store.search(&query, 5).unwrap());
}
