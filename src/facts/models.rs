//! Data models for the fund fact store

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed vocabulary of fund attributes the assistant can answer about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactType {
    ExpenseRatio,
    ExitLoad,
    MinSip,
    MinLumpsum,
    LockInPeriod,
    Benchmark,
    Nav,
    Rating,
    Riskometer,
    FundSize,
    StatementDownload,
}

impl FactType {
    pub const ALL: [FactType; 11] = [
        FactType::ExpenseRatio,
        FactType::ExitLoad,
        FactType::MinSip,
        FactType::MinLumpsum,
        FactType::LockInPeriod,
        FactType::Benchmark,
        FactType::Nav,
        FactType::Rating,
        FactType::Riskometer,
        FactType::FundSize,
        FactType::StatementDownload,
    ];

    /// Wire name, as stored in seed data and index metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            FactType::ExpenseRatio => "expense_ratio",
            FactType::ExitLoad => "exit_load",
            FactType::MinSip => "min_sip",
            FactType::MinLumpsum => "min_lumpsum",
            FactType::LockInPeriod => "lock_in_period",
            FactType::Benchmark => "benchmark",
            FactType::Nav => "nav",
            FactType::Rating => "rating",
            FactType::Riskometer => "riskometer",
            FactType::FundSize => "fund_size",
            FactType::StatementDownload => "statement_download",
        }
    }

    /// Human-readable label used in documents and answers
    pub fn label(&self) -> &'static str {
        match self {
            FactType::ExpenseRatio => "Expense Ratio",
            FactType::ExitLoad => "Exit Load",
            FactType::MinSip => "Minimum SIP Investment",
            FactType::MinLumpsum => "Minimum Lumpsum Investment",
            FactType::LockInPeriod => "Lock-in Period",
            FactType::Benchmark => "Benchmark",
            FactType::Nav => "NAV",
            FactType::Rating => "Rating",
            FactType::Riskometer => "Riskometer",
            FactType::FundSize => "Fund Size",
            FactType::StatementDownload => "Statement Download Instructions",
        }
    }

    /// Keyword phrases that signal this fact type.
    ///
    /// Phrases are in normalized form: lowercase, words separated by single
    /// spaces, punctuation removed.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            FactType::ExpenseRatio => &["expense ratio", "total expense ratio", "expense", "expenses", "ter"],
            FactType::ExitLoad => &["exit load", "exit charge", "exit fee", "redemption charge"],
            FactType::MinSip => &["minimum sip", "min sip", "sip amount", "sip"],
            FactType::MinLumpsum => &[
                "minimum lumpsum",
                "min lumpsum",
                "lumpsum",
                "lump sum",
                "minimum investment",
                "one time investment",
            ],
            FactType::LockInPeriod => &["lock in period", "lock in", "lockin", "lock"],
            FactType::Benchmark => &["benchmark", "benchmark index"],
            FactType::Nav => &["nav", "net asset value"],
            FactType::Rating => &["rating", "ratings", "star rating"],
            FactType::Riskometer => &["riskometer", "risk level", "risk"],
            FactType::FundSize => &["fund size", "aum", "assets under management"],
            FactType::StatementDownload => &[
                "statement",
                "statements",
                "account statement",
                "capital gains statement",
                "download",
            ],
        }
    }
}

impl fmt::Display for FactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FactType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        FactType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| format!("unknown fact type: {}", s))
    }
}

/// A fund scheme known to the fact store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scheme {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub risk_level: Option<String>,
    /// Alternative names the scheme is known by
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Scheme {
    /// Canonical name followed by all aliases
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Atomic sourced datum about a scheme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub id: u64,
    pub scheme_id: u64,
    pub fact_type: FactType,
    pub value: String,
    pub source_url: String,
    pub last_updated: NaiveDate,
}

/// Query criteria for facts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fact_type: Option<FactType>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

impl Default for FactQuery {
    fn default() -> Self {
        Self {
            scheme_id: None,
            fact_type: None,
            limit: default_limit(),
        }
    }
}

impl FactQuery {
    pub fn for_scheme(scheme_id: u64) -> Self {
        Self {
            scheme_id: Some(scheme_id),
            ..Self::default()
        }
    }

    pub fn with_fact_type(mut self, fact_type: FactType) -> Self {
        self.fact_type = Some(fact_type);
        self
    }

    /// Check whether a fact satisfies this query's filters
    pub fn matches(&self, fact: &Fact) -> bool {
        self.scheme_id.map_or(true, |id| fact.scheme_id == id)
            && self.fact_type.map_or(true, |t| fact.fact_type == t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fact_type_round_trip_names() {
        for fact_type in FactType::ALL {
            assert_eq!(fact_type.as_str().parse::<FactType>().unwrap(), fact_type);
        }
        assert!("returns_1y".parse::<FactType>().is_err());
    }

    #[test]
    fn test_fact_type_serde_snake_case() {
        let json = serde_json::to_string(&FactType::LockInPeriod).unwrap();
        assert_eq!(json, "\"lock_in_period\"");
        let parsed: FactType = serde_json::from_str("\"min_sip\"").unwrap();
        assert_eq!(parsed, FactType::MinSip);
    }

    #[test]
    fn test_labels() {
        assert_eq!(FactType::ExpenseRatio.label(), "Expense Ratio");
        assert_eq!(FactType::MinSip.label(), "Minimum SIP Investment");
        assert_eq!(FactType::Nav.label(), "NAV");
    }

    #[test]
    fn test_scheme_names_include_aliases() {
        let scheme = Scheme {
            id: 1,
            name: "ICICI Prudential Large Cap Fund".to_string(),
            category: Some("Large Cap".to_string()),
            risk_level: None,
            aliases: vec!["ICICI Prudential Bluechip Fund".to_string()],
            url: None,
        };
        let names: Vec<&str> = scheme.names().collect();
        assert_eq!(names, vec!["ICICI Prudential Large Cap Fund", "ICICI Prudential Bluechip Fund"]);
    }

    #[test]
    fn test_fact_query_matches() {
        let fact = Fact {
            id: 7,
            scheme_id: 2,
            fact_type: FactType::ExitLoad,
            value: "1%".to_string(),
            source_url: "https://example.com".to_string(),
            last_updated: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        };

        assert!(FactQuery::default().matches(&fact));
        assert!(FactQuery::for_scheme(2).matches(&fact));
        assert!(FactQuery::for_scheme(2).with_fact_type(FactType::ExitLoad).matches(&fact));
        assert!(!FactQuery::for_scheme(3).matches(&fact));
        assert!(!FactQuery::for_scheme(2).with_fact_type(FactType::Nav).matches(&fact));
    }
}
