//! Investment-advice detection
//!
//! The assistant answers factual questions only. Requests for
//! recommendations, timing, comparisons, return forecasts or suitability are
//! refused with a pointer to general educational material.

use once_cell::sync::Lazy;
use regex::RegexSet;
use serde::{Deserialize, Serialize};

const ADVICE_PATTERNS: &[&str] = &[
    // Direct recommendations
    r"\b(should|must|need to|recommend|suggest|advise)\b.*\b(invest|fund|scheme|plan)\b",
    r"\b(best|top|worst)\b.*\b(fund|scheme|elss|equity|debt|hybrid)\b.*\b(invest|put|choose)\b",
    r"\b(which|what)\b.*\b(fund|scheme)\b.*\b(invest|choose|pick|select|should)\b",
    r"\b(which|what)\b.*\b(should|must|need to)\b.*\b(invest|fund|scheme)\b",
    // Timing
    r"\b(good time|right time|best time|timing)\b.*\b(invest|buy|sell)\b",
    r"\bwhen\b.*\b(should|to)\b.*\b(invest|buy|sell|redeem)\b",
    r"\bis (it|this|now) (the |a )?(good|right|best) (time|moment)\b",
    // Comparisons
    r"\b(better|worse|compare|comparison|vs|versus)\b.*\b(fund|scheme)\b.*\b(choose|select|should)\b",
    r"\bwhich\b.*\b(better|choose|prefer|should)\b",
    r"\b(is|are)\b.*\b(better|worse)\b.*\b(than|or)\b",
    // Return forecasts
    r"\b(returns?|performance|profit|gain|loss)\b.*\b(next|future|coming|will give)\b",
    r"\b(highest|lowest|best|worst)\b.*\b(returns?|performance)\b",
    r"\bwill\b.*\b(give|provide|earn|make)\b.*\b(returns?|profit|money)\b",
    // Portfolio construction
    r"\b(portfolio|allocation|diversification|diversify)\b.*\b(invest|allocate|should|how)\b",
    r"\bhow much (should|must|can) i\b",
    // Tax planning
    r"\b(tax saving|tax benefit|elss)\b.*\b(choose|best|should)\b",
    r"\b(best|top)\b.*\b(elss|tax saving|tax saver)\b",
    // Suitability
    r"\b(suitable|right for|good for|fit for)\b.*\b(me|my|i|retirement|goal)\b",
    r"\b(should i|what should|for me|for my)\b",
    // Switching
    r"\b(shift|switch|change|transfer|move)\b.*\b(from|to|plan|fund)\b.*\b(should|now)\b",
    r"\bshould\b.*\b(shift|switch|change|exit|redeem|sell)\b",
    // Requests framed to sidestep the refusal
    r"\b(just tell|just say|just recommend|just suggest)\b.*\b(good|best|better)\b",
    r"\b(won.?t|will not|don.?t|do not)\b.*\b(consider|treat|take)\b.*\badvice\b",
];

static ADVICE_SET: Lazy<RegexSet> = Lazy::new(|| {
    let patterns: Vec<String> = ADVICE_PATTERNS.iter().map(|p| format!("(?i){}", p)).collect();
    RegexSet::new(patterns).expect("failed to compile advice patterns")
});

/// Topic of an advice request, used to pick an educational link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdviceTopic {
    General,
    Elss,
    Equity,
    Debt,
    Hybrid,
    Returns,
    Portfolio,
}

impl AdviceTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdviceTopic::General => "general",
            AdviceTopic::Elss => "elss",
            AdviceTopic::Equity => "equity",
            AdviceTopic::Debt => "debt",
            AdviceTopic::Hybrid => "hybrid",
            AdviceTopic::Returns => "returns",
            AdviceTopic::Portfolio => "portfolio",
        }
    }

    /// Educational page for the topic
    pub fn link(&self) -> &'static str {
        match self {
            AdviceTopic::General => "https://groww.in/mutual-funds/amc/icici-prudential-mutual-funds",
            AdviceTopic::Elss => "https://groww.in/mutual-funds/elss",
            AdviceTopic::Equity => "https://groww.in/mutual-funds/equity",
            AdviceTopic::Debt => "https://groww.in/mutual-funds/debt",
            AdviceTopic::Hybrid => "https://groww.in/mutual-funds/hybrid",
            AdviceTopic::Returns | AdviceTopic::Portfolio => "https://groww.in/mutual-funds",
        }
    }

    fn classify(lowered: &str) -> Self {
        if lowered.contains("elss") || lowered.contains("tax") {
            AdviceTopic::Elss
        } else if lowered.contains("equity") {
            AdviceTopic::Equity
        } else if lowered.contains("debt") {
            AdviceTopic::Debt
        } else if lowered.contains("hybrid") {
            AdviceTopic::Hybrid
        } else if lowered.contains("return") || lowered.contains("performance") {
            AdviceTopic::Returns
        } else if lowered.contains("portfolio") || lowered.contains("allocation") {
            AdviceTopic::Portfolio
        } else {
            AdviceTopic::General
        }
    }
}

/// Detect a request for investment advice
pub fn detect_advice(query: &str) -> Option<AdviceTopic> {
    let lowered = query.to_lowercase();
    if ADVICE_SET.is_match(&lowered) {
        Some(AdviceTopic::classify(&lowered))
    } else {
        None
    }
}

/// Polite facts-only refusal
pub fn facts_only_response(topic: AdviceTopic) -> String {
    format!(
        "I provide factual information about mutual fund schemes only, not investment advice. \
         For investment decisions, please consult a registered investment advisor. Learn more: {}",
        topic.link()
    )
}
