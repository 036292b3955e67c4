//! Read-only fact store backed by an in-memory snapshot

use super::models::*;
use crate::error::{RagError, Result};
use crate::matcher::normalize_name;
use crate::metrics::METRICS;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

/// Read access to schemes and their facts.
///
/// Implementations are shared across concurrent requests and must not be
/// mutated through this interface.
pub trait FactSource: Send + Sync {
    /// All known schemes, ordered by id
    fn schemes(&self) -> Result<Vec<Scheme>>;

    /// Look up a single scheme
    fn scheme(&self, id: u64) -> Result<Option<Scheme>>;

    /// Facts matching the query filters, ordered by fact id
    fn facts(&self, query: &FactQuery) -> Result<Vec<Fact>>;

    /// Schemes whose category equals `category` after name normalization
    fn schemes_by_category(&self, category: &str) -> Result<Vec<Scheme>> {
        let wanted = normalize_name(category);
        Ok(self
            .schemes()?
            .into_iter()
            .filter(|s| s.category.as_deref().map(normalize_name).as_deref() == Some(wanted.as_str()))
            .collect())
    }
}

/// Seed document layout: `{ "schemes": [...], "facts": [...] }`
#[derive(Debug, Deserialize)]
struct SeedData {
    schemes: Vec<Scheme>,
    #[serde(default)]
    facts: Vec<SeedFact>,
}

/// Facts are validated individually so one bad row does not reject the file
#[derive(Debug, Deserialize)]
struct SeedFact {
    id: u64,
    scheme_id: u64,
    fact_type: String,
    value: String,
    #[serde(default)]
    source_url: Option<String>,
    last_updated: NaiveDate,
}

/// Immutable in-memory fact store
#[derive(Debug, Clone, Default)]
pub struct InMemoryFactStore {
    schemes: BTreeMap<u64, Scheme>,
    facts: Vec<Fact>,
}

impl InMemoryFactStore {
    /// Build a store from already-typed schemes and facts.
    ///
    /// Facts without a source URL or pointing at an unknown scheme are
    /// skipped. Where several facts share a scheme and fact type, only the
    /// most recently updated one is kept.
    pub fn from_parts(schemes: Vec<Scheme>, facts: Vec<Fact>) -> Result<Self> {
        let mut by_id = BTreeMap::new();
        for scheme in schemes {
            if scheme.name.trim().is_empty() {
                return Err(RagError::FactStore(format!("scheme {} has an empty name", scheme.id)));
            }
            let id = scheme.id;
            if by_id.insert(id, scheme).is_some() {
                return Err(RagError::FactStore(format!("duplicate scheme id {}", id)));
            }
        }

        let mut latest: HashMap<(u64, FactType), Fact> = HashMap::new();
        for fact in facts {
            if fact.source_url.trim().is_empty() {
                warn!("Skipping fact {}: missing source URL", fact.id);
                METRICS.record_fact_rejected("missing_source");
                continue;
            }
            if !by_id.contains_key(&fact.scheme_id) {
                warn!("Skipping fact {}: unknown scheme {}", fact.id, fact.scheme_id);
                METRICS.record_fact_rejected("unknown_scheme");
                continue;
            }

            let key = (fact.scheme_id, fact.fact_type);
            let newer = match latest.get(&key) {
                Some(existing) => {
                    (fact.last_updated, fact.id) > (existing.last_updated, existing.id)
                }
                None => true,
            };
            if newer {
                if let Some(replaced) = latest.insert(key, fact) {
                    debug!("Superseded fact {} for scheme {}", replaced.id, replaced.scheme_id);
                }
            } else {
                debug!("Ignoring stale fact {}", fact.id);
            }
        }

        let mut facts: Vec<Fact> = latest.into_values().collect();
        facts.sort_by_key(|f| f.id);

        info!("Fact store loaded: {} schemes, {} facts", by_id.len(), facts.len());

        Ok(Self {
            schemes: by_id,
            facts,
        })
    }

    /// Parse a JSON seed document
    pub fn from_json(json: &str) -> Result<Self> {
        let seed: SeedData = serde_json::from_str(json)?;

        let mut facts = Vec::with_capacity(seed.facts.len());
        for raw in seed.facts {
            let fact_type = match raw.fact_type.parse::<FactType>() {
                Ok(t) => t,
                Err(e) => {
                    warn!("Skipping fact {}: {}", raw.id, e);
                    METRICS.record_fact_rejected("unknown_type");
                    continue;
                }
            };
            facts.push(Fact {
                id: raw.id,
                scheme_id: raw.scheme_id,
                fact_type,
                value: raw.value,
                source_url: raw.source_url.unwrap_or_default(),
                last_updated: raw.last_updated,
            });
        }

        Self::from_parts(seed.schemes, facts)
    }

    /// Load a JSON seed file from disk
    pub fn from_seed_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            RagError::FactStore(format!("failed to read seed file {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub fn scheme_count(&self) -> usize {
        self.schemes.len()
    }

    pub fn fact_count(&self) -> usize {
        self.facts.len()
    }
}

impl FactSource for InMemoryFactStore {
    fn schemes(&self) -> Result<Vec<Scheme>> {
        Ok(self.schemes.values().cloned().collect())
    }

    fn scheme(&self, id: u64) -> Result<Option<Scheme>> {
        Ok(self.schemes.get(&id).cloned())
    }

    fn facts(&self, query: &FactQuery) -> Result<Vec<Fact>> {
        Ok(self
            .facts
            .iter()
            .filter(|f| query.matches(f))
            .take(query.limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r#"{
        "schemes": [
            {"id": 1, "name": "ICICI Prudential Large Cap Fund", "category": "Large Cap",
             "aliases": ["ICICI Pru Bluechip"]},
            {"id": 2, "name": "ICICI Prudential Midcap Fund", "category": "Mid Cap"},
            {"id": 3, "name": "ICICI Prudential Large & Mid Cap Fund", "category": "Large & Mid Cap"}
        ],
        "facts": [
            {"id": 10, "scheme_id": 1, "fact_type": "expense_ratio", "value": "0.90%",
             "source_url": "https://example.com/large-cap", "last_updated": "2024-06-01"},
            {"id": 11, "scheme_id": 1, "fact_type": "expense_ratio", "value": "0.85%",
             "source_url": "https://example.com/large-cap", "last_updated": "2025-01-15"},
            {"id": 12, "scheme_id": 1, "fact_type": "exit_load", "value": "1% within 1 year",
             "source_url": "https://example.com/large-cap", "last_updated": "2025-01-15"},
            {"id": 13, "scheme_id": 2, "fact_type": "min_sip", "value": "100",
             "last_updated": "2025-01-15"},
            {"id": 14, "scheme_id": 99, "fact_type": "nav", "value": "10",
             "source_url": "https://example.com/ghost", "last_updated": "2025-01-15"},
            {"id": 15, "scheme_id": 2, "fact_type": "returns_1y", "value": "20%",
             "source_url": "https://example.com/mid-cap", "last_updated": "2025-01-15"},
            {"id": 16, "scheme_id": 2, "fact_type": "exit_load", "value": "1%",
             "source_url": "https://example.com/mid-cap", "last_updated": "2025-01-15"}
        ]
    }"#;

    #[test]
    fn test_seed_loading_filters_invalid_facts() {
        let store = InMemoryFactStore::from_json(SEED).unwrap();
        assert_eq!(store.scheme_count(), 3);
        // 10 superseded by 11, 13 has no source, 14 unknown scheme, 15 unknown type
        let ids: Vec<u64> = store.facts(&FactQuery::default()).unwrap().iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![11, 12, 16]);
    }

    #[test]
    fn test_latest_fact_wins() {
        let store = InMemoryFactStore::from_json(SEED).unwrap();
        let facts = store
            .facts(&FactQuery::for_scheme(1).with_fact_type(FactType::ExpenseRatio))
            .unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].value, "0.85%");
    }

    #[test]
    fn test_query_limit() {
        let store = InMemoryFactStore::from_json(SEED).unwrap();
        let query = FactQuery {
            limit: 1,
            ..FactQuery::default()
        };
        assert_eq!(store.facts(&query).unwrap().len(), 1);
    }

    #[test]
    fn test_schemes_by_category_is_exact() {
        let store = InMemoryFactStore::from_json(SEED).unwrap();
        let mid: Vec<u64> = store.schemes_by_category("mid cap").unwrap().iter().map(|s| s.id).collect();
        assert_eq!(mid, vec![2]);
        let both: Vec<u64> = store
            .schemes_by_category("Large and Mid Cap")
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(both, vec![3]);
    }

    #[test]
    fn test_duplicate_scheme_rejected() {
        let scheme = Scheme {
            id: 1,
            name: "A".to_string(),
            category: None,
            risk_level: None,
            aliases: vec![],
            url: None,
        };
        let result = InMemoryFactStore::from_parts(vec![scheme.clone(), scheme], vec![]);
        assert!(matches!(result, Err(RagError::FactStore(_))));
    }

    #[test]
    fn test_seed_file_missing() {
        let result = InMemoryFactStore::from_seed_file("/nonexistent/seed.json");
        assert!(matches!(result, Err(RagError::FactStore(_))));
    }

    #[test]
    fn test_seed_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        std::fs::write(&path, SEED).unwrap();
        let store = InMemoryFactStore::from_seed_file(&path).unwrap();
        assert_eq!(store.fact_count(), 3);
        assert!(store.scheme(2).unwrap().is_some());
        assert!(store.scheme(42).unwrap().is_none());
    }
}
