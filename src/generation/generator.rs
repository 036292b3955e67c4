//! Grounded answer composition

use super::guardrails::{facts_only_response, AdviceTopic};
use super::llm::{CompletionRequest, LanguageModel};
use super::token_estimator::{default_estimator, TokenEstimator};
use crate::config::GeneratorConfig;
use crate::facts::FactType;
use crate::metrics::METRICS;
use crate::query::{Query, QueryType};
use crate::retrieval::{RetrievalResult, ScoredDocument};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

pub const NO_INFORMATION: &str = "I don't have information about that in my current data. \
Please try asking about a specific ICICI Prudential scheme and one of: expense ratio, exit load, \
minimum SIP, minimum lumpsum, lock-in period, benchmark, NAV, rating or riskometer.";

/// Response returned to the boundary layer.
///
/// Attribution fields are copied from the top-ranked fact and never derived
/// from generated text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub source_url: Option<String>,
    pub scheme_name: Option<String>,
    pub fact_type: Option<FactType>,
    pub query_type: QueryType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<NaiveDate>,
}

impl Answer {
    /// Canned answer with no attribution
    pub fn not_found(query_type: QueryType) -> Self {
        Self {
            answer: NO_INFORMATION.to_string(),
            source_url: None,
            scheme_name: None,
            fact_type: None,
            query_type,
            last_updated: None,
        }
    }

    /// Facts-only refusal pointing at an educational page
    pub fn advice_refusal(topic: AdviceTopic, query_type: QueryType) -> Self {
        Self {
            answer: facts_only_response(topic),
            source_url: Some(topic.link().to_string()),
            scheme_name: None,
            fact_type: None,
            query_type,
            last_updated: None,
        }
    }

    pub fn is_attributed(&self) -> bool {
        self.source_url.is_some() && self.scheme_name.is_some()
    }
}

/// Builds answers from retrieval results
pub struct ResponseGenerator {
    llm: Option<Arc<dyn LanguageModel>>,
    config: GeneratorConfig,
    estimator: Arc<dyn TokenEstimator>,
}

impl ResponseGenerator {
    pub fn new(llm: Option<Arc<dyn LanguageModel>>, config: GeneratorConfig) -> Self {
        Self::with_estimator(llm, config, default_estimator())
    }

    pub fn with_estimator(
        llm: Option<Arc<dyn LanguageModel>>,
        config: GeneratorConfig,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Self {
        Self { llm, config, estimator }
    }

    /// Extractive generator that never calls a language model
    pub fn extractive(config: GeneratorConfig) -> Self {
        Self::new(None, config)
    }

    /// Compose an answer; failures resolve to the extractive form
    pub async fn compose(&self, query: &Query, result: &RetrievalResult) -> Answer {
        let hits = match result {
            RetrievalResult::NotFound => return Answer::not_found(query.query_type),
            RetrievalResult::Found { hits, .. } => hits,
        };
        let Some(top) = hits.first() else {
            return Answer::not_found(query.query_type);
        };

        let text = match &self.llm {
            Some(llm) => self.generate(llm.as_ref(), query, hits, top).await,
            None => extractive_answer(top),
        };

        Answer {
            answer: text,
            source_url: Some(top.metadata.source_url.clone()),
            scheme_name: Some(top.metadata.scheme_name.clone()),
            fact_type: Some(top.metadata.fact_type),
            query_type: query.query_type,
            last_updated: Some(top.metadata.last_updated),
        }
    }

    async fn generate(&self, llm: &dyn LanguageModel, query: &Query, hits: &[ScoredDocument], top: &ScoredDocument) -> String {
        let request = CompletionRequest {
            temperature: Some(self.config.temperature),
            ..CompletionRequest::new(self.system_prompt(), self.build_context(hits), query.raw.clone())
        };

        match tokio::time::timeout(self.config.timeout(), llm.complete(&request)).await {
            Ok(Ok(text)) => {
                let trimmed = limit_sentences(&text, self.config.max_sentences);
                if trimmed.is_empty() {
                    warn!("Language model returned an empty answer, using extractive fallback");
                    METRICS.record_llm_fallback("empty");
                    extractive_answer(top)
                } else {
                    trimmed
                }
            }
            Ok(Err(e)) => {
                warn!("Answer generation failed ({}), using extractive fallback", e.kind());
                METRICS.record_llm_fallback(e.kind());
                extractive_answer(top)
            }
            Err(_) => {
                warn!("Answer generation timed out after {:?}, using extractive fallback", self.config.timeout());
                METRICS.record_llm_fallback("timeout");
                extractive_answer(top)
            }
        }
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are a factual assistant for mutual fund schemes. \
Answer in at most {} sentences using only the information in the context. \
Do not give investment advice, opinions or recommendations. \
If the context does not contain the answer, say that you do not have that information.",
            self.config.max_sentences
        )
    }

    /// Render up to `max_context_facts` facts within the token budget.
    ///
    /// The top fact is always included.
    pub fn build_context(&self, hits: &[ScoredDocument]) -> String {
        let mut blocks: Vec<String> = Vec::new();
        let mut used = 0;

        for (i, hit) in hits.iter().take(self.config.max_context_facts.max(1)).enumerate() {
            let block = format!(
                "[Document {}]\nScheme: {}\nFact Type: {}\nValue: {}\nSource: {}",
                i + 1,
                hit.metadata.scheme_name,
                hit.metadata.fact_type.label(),
                hit.metadata.value,
                hit.metadata.source_url
            );
            let tokens = self.estimator.estimate(&block);
            if !blocks.is_empty() && used + tokens > self.config.max_context_tokens {
                debug!("Context budget reached after {} documents ({} tokens)", blocks.len(), used);
                break;
            }
            used += tokens;
            blocks.push(block);
        }

        blocks.join("\n\n")
    }
}

/// Answer built from the literal value of the top fact
pub fn extractive_answer(top: &ScoredDocument) -> String {
    format!(
        "{} of {} is {}.",
        top.metadata.fact_type.label(),
        top.metadata.scheme_name,
        top.metadata.value.trim_end_matches('.')
    )
}

/// Keep at most `max` sentences.
///
/// A sentence ends at `.`, `!` or `?` followed by whitespace or the end of
/// the text, so decimals like "0.85%" stay intact.
pub fn limit_sentences(text: &str, max: usize) -> String {
    let text = text.trim();
    if max == 0 {
        return String::new();
    }

    let mut count = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_break = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
            if at_break {
                count += 1;
                if count == max {
                    return text[..i + c.len_utf8()].to_string();
                }
            }
        }
    }
    text.to_string()
}
