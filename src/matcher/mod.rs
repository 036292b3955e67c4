//! Approximate scheme-name matching
//!
//! Scheme names arrive in many shapes ("ICICI Pru Bluechip", "icici prudential
//! large cap fund - direct plan - growth"). Names are first reduced to a
//! canonical form, then compared by normalized edit distance.

pub mod normalize;
pub mod scheme_matcher;

pub use normalize::{levenshtein, normalize_name, similarity};
pub use scheme_matcher::{RegisteredMatch, SchemeMatch, SchemeMatcher, SchemeRegistry};
