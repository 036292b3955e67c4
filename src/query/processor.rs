//! Query normalization, classification and intent extraction

use crate::facts::FactType;
use crate::generation::llm::{CompletionRequest, LanguageModel};
use crate::matcher::normalize_name;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How a query relates to the scheme registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    SpecificFund,
    CategoryQuery,
    General,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::SpecificFund => "specific_fund",
            QueryType::CategoryQuery => "category_query",
            QueryType::General => "general",
        }
    }
}

/// A parsed user query
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub raw: String,
    /// Lowercased text with punctuation collapsed to single spaces
    pub normalized: String,
    /// Candidate scheme-name substring, as written by the user
    pub scheme_name: Option<String>,
    pub fact_type: Option<FactType>,
    /// Fund category named in the query, in display form
    pub category: Option<String>,
    pub query_type: QueryType,
}

/// Category phrases in normalized form, longest first
const CATEGORIES: &[(&str, &str)] = &[
    ("large and mid cap", "Large & Mid Cap"),
    ("tax saver", "ELSS"),
    ("large cap", "Large Cap"),
    ("mid cap", "Mid Cap"),
    ("small cap", "Small Cap"),
    ("flexi cap", "Flexi Cap"),
    ("multi cap", "Multi Cap"),
    ("elss", "ELSS"),
    ("hybrid", "Hybrid"),
    ("debt", "Debt"),
];

/// Function words and question scaffolding that never name a scheme
const QUERY_STOPWORDS: &[&str] = &[
    "a", "an", "the", "of", "for", "in", "on", "to", "is", "are", "was", "what", "whats", "how",
    "much", "many", "does", "do", "did", "can", "could", "tell", "me", "about", "please", "and",
    "or", "with", "by", "my", "i", "it", "its", "this", "that", "which", "s", "current", "latest",
    "give", "show", "find", "know", "want", "get",
];

/// Tokens that do not identify one scheme by themselves
const NON_IDENTIFYING: &[&str] = &["fund", "funds", "scheme", "schemes", "direct", "plan", "growth", "option", "regular"];

/// Lowercase, replace punctuation with spaces and collapse whitespace
pub fn normalize_query(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    format!(" {} ", haystack).contains(&format!(" {} ", phrase))
}

/// Lexical query processor with optional language-model assistance
pub struct QueryProcessor {
    llm: Option<Arc<dyn LanguageModel>>,
    llm_timeout: Duration,
}

impl Default for QueryProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryProcessor {
    /// Purely lexical processor
    pub fn new() -> Self {
        Self {
            llm: None,
            llm_timeout: Duration::from_secs(30),
        }
    }

    /// Processor that asks a language model first and falls back to lexical rules
    pub fn with_language_model(llm: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self {
            llm: Some(llm),
            llm_timeout: timeout,
        }
    }

    /// Classify a raw query
    pub fn classify(&self, raw: &str) -> QueryType {
        self.parse(raw).query_type
    }

    /// Parse a query with keyword heuristics only.
    ///
    /// If keywords for more than one fact type are present the query is
    /// treated as ambiguous: it is classified `General` with no fact type and
    /// no scheme candidate, leaving retrieval to vector similarity.
    pub fn parse(&self, raw: &str) -> Query {
        let raw = raw.trim().to_string();
        let normalized = normalize_query(&raw);

        let mut matched_types = Vec::new();
        let mut keyword_tokens: HashSet<&str> = HashSet::new();
        for fact_type in FactType::ALL {
            let hits: Vec<&str> = fact_type
                .keywords()
                .iter()
                .copied()
                .filter(|kw| contains_phrase(&normalized, kw))
                .collect();
            if !hits.is_empty() {
                matched_types.push(fact_type);
                keyword_tokens.extend(hits.into_iter().flat_map(|kw| kw.split(' ')));
            }
        }

        if matched_types.len() > 1 {
            debug!("Ambiguous fact types {:?} in '{}'", matched_types, raw);
            return Query {
                raw,
                normalized,
                scheme_name: None,
                fact_type: None,
                category: None,
                query_type: QueryType::General,
            };
        }
        let fact_type = matched_types.first().copied();

        let candidate_tokens: Vec<&str> = raw
            .split(|c: char| !c.is_alphanumeric() && c != '&')
            .filter(|t| !t.is_empty())
            .filter(|t| {
                let lower = t.to_lowercase();
                !QUERY_STOPWORDS.contains(&lower.as_str()) && !keyword_tokens.contains(lower.as_str())
            })
            .collect();
        let candidate = candidate_tokens.join(" ");

        let canonical = normalize_name(&candidate);
        let category_hit = CATEGORIES
            .iter()
            .find(|(phrase, _)| contains_phrase(&canonical, phrase));
        let category = category_hit.map(|(_, display)| display.to_string());

        let category_words: HashSet<&str> = category_hit
            .map(|(phrase, _)| phrase.split(' ').collect())
            .unwrap_or_default();
        let identifying = canonical
            .split(' ')
            .filter(|t| !t.is_empty())
            .any(|t| !category_words.contains(t) && !NON_IDENTIFYING.contains(&t));

        let (query_type, scheme_name) = if identifying {
            (QueryType::SpecificFund, Some(candidate))
        } else if category.is_some() {
            (QueryType::CategoryQuery, None)
        } else {
            (QueryType::General, None)
        };

        Query {
            raw,
            normalized,
            scheme_name,
            fact_type,
            category,
            query_type,
        }
    }

    /// Parse a query, consulting the language model when one is configured.
    ///
    /// Any model failure, timeout or unusable reply falls back to [`parse`].
    ///
    /// [`parse`]: QueryProcessor::parse
    pub async fn understand(&self, raw: &str) -> Query {
        let lexical = self.parse(raw);
        let Some(llm) = &self.llm else {
            return lexical;
        };

        let request = CompletionRequest {
            max_tokens: Some(200),
            temperature: Some(0.0),
            ..CompletionRequest::new(INTENT_INSTRUCTIONS, "", lexical.raw.clone())
        };

        let reply = match tokio::time::timeout(self.llm_timeout, llm.complete(&request)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!("Intent extraction failed ({}), using keyword rules", e.kind());
                return lexical;
            }
            Err(_) => {
                warn!("Intent extraction timed out, using keyword rules");
                return lexical;
            }
        };

        match parse_intent(&reply) {
            Some(intent) => {
                debug!("Model intent for '{}': {:?}", lexical.raw, intent);
                Query {
                    scheme_name: intent.scheme_name,
                    fact_type: intent.fact_type,
                    category: intent.category,
                    query_type: intent.query_type,
                    ..lexical
                }
            }
            None => {
                warn!("Unusable intent reply, using keyword rules");
                lexical
            }
        }
    }
}

const INTENT_INSTRUCTIONS: &str = "You extract intent from questions about mutual fund schemes. \
Reply with a single JSON object and nothing else, with keys: \
\"fact_type\" (one of expense_ratio, exit_load, min_sip, min_lumpsum, lock_in_period, benchmark, \
nav, rating, riskometer, fund_size, statement_download, or null), \
\"scheme_name\" (the scheme named in the question, or null), \
\"query_type\" (specific_fund, category_query or general), \
\"category\" (e.g. Large Cap, Mid Cap, Small Cap, ELSS, or null).";

#[derive(Debug, Deserialize)]
struct RawIntent {
    #[serde(default, alias = "intent_type")]
    fact_type: Option<String>,
    #[serde(default)]
    scheme_name: Option<String>,
    query_type: String,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Debug, PartialEq)]
struct Intent {
    fact_type: Option<FactType>,
    scheme_name: Option<String>,
    query_type: QueryType,
    category: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"))
}

/// Validate a model reply; `None` when any field is unusable
fn parse_intent(reply: &str) -> Option<Intent> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    let raw: RawIntent = serde_json::from_str(&reply[start..=end]).ok()?;

    let fact_type = match non_empty(raw.fact_type) {
        None => None,
        Some(t) if t.eq_ignore_ascii_case("general") => None,
        Some(t) => Some(t.parse::<FactType>().ok()?),
    };

    let query_type = match raw.query_type.trim() {
        "specific_fund" => QueryType::SpecificFund,
        "category_query" => QueryType::CategoryQuery,
        "general" => QueryType::General,
        _ => return None,
    };

    let scheme_name = non_empty(raw.scheme_name);
    let category = non_empty(raw.category);

    match query_type {
        QueryType::SpecificFund if scheme_name.is_none() => return None,
        QueryType::CategoryQuery if category.is_none() => return None,
        _ => {}
    }

    Some(Intent {
        fact_type,
        scheme_name: if query_type == QueryType::SpecificFund { scheme_name } else { None },
        query_type,
        category,
    })
}
