//! Threshold-gated best-match selection over known scheme names

use super::normalize::{normalize_name, similarity};
use crate::facts::Scheme;
use std::cmp::Ordering;
use tracing::debug;

/// Score for a known name found verbatim inside a longer candidate
const CONTAINED_WEIGHT: f32 = 0.9;

/// Similarity of a normalized candidate to a normalized known name.
///
/// The whole candidate is compared first. When the candidate has more
/// tokens than the name, every window of the name's length is compared too,
/// scaled by [`CONTAINED_WEIGHT`]. A name surrounded by other words scores
/// at most that weight.
fn name_score(candidate: &str, name: &str) -> (f32, usize) {
    let whole = similarity(candidate, name);

    let candidate_tokens: Vec<&str> = candidate.split(' ').collect();
    let width = name.split(' ').count();
    if width < 2 || candidate_tokens.len() <= width {
        return whole;
    }

    candidate_tokens
        .windows(width)
        .map(|window| {
            let (score, distance) = similarity(&window.join(" "), name);
            (score * CONTAINED_WEIGHT, distance)
        })
        .chain(std::iter::once(whole))
        .max_by(|a, b| a.0.total_cmp(&b.0).then_with(|| b.1.cmp(&a.1)))
        .unwrap_or(whole)
}

/// Best match for a candidate name
#[derive(Debug, Clone, PartialEq)]
pub struct SchemeMatch {
    /// The known name as supplied by the caller
    pub name: String,
    pub similarity: f32,
    pub distance: usize,
}

/// Fuzzy matcher over normalized scheme names
#[derive(Debug, Clone)]
pub struct SchemeMatcher {
    threshold: f32,
}

impl SchemeMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Find the known name closest to `candidate`.
    ///
    /// Returns `None` when the best similarity is below the threshold. Ties
    /// go to the smaller edit distance, then to the alphabetically first name.
    pub fn match_name<S: AsRef<str>>(&self, candidate: &str, known_names: &[S]) -> Option<SchemeMatch> {
        let normalized = normalize_name(candidate);
        if normalized.is_empty() {
            return None;
        }

        known_names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                let (score, distance) = name_score(&normalized, &normalize_name(name));
                SchemeMatch {
                    name: name.to_string(),
                    similarity: score,
                    distance,
                }
            })
            .filter(|m| m.similarity >= self.threshold)
            .min_by(|a, b| rank(a, b))
    }
}

/// Ordering where the preferred match sorts first
fn rank(a: &SchemeMatch, b: &SchemeMatch) -> Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| a.distance.cmp(&b.distance))
        .then_with(|| a.name.cmp(&b.name))
}

/// A registry hit resolved back to its scheme
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredMatch {
    pub scheme_id: u64,
    /// Canonical scheme name
    pub scheme_name: String,
    /// The name or alias that matched
    pub matched_name: String,
    pub similarity: f32,
}

#[derive(Debug, Clone)]
struct RegistryEntry {
    scheme_id: u64,
    canonical: String,
    name: String,
    normalized: String,
}

/// Immutable snapshot of known scheme names and aliases
#[derive(Debug, Clone)]
pub struct SchemeRegistry {
    matcher: SchemeMatcher,
    entries: Vec<RegistryEntry>,
}

impl SchemeRegistry {
    /// Build a registry from schemes, indexing canonical names and aliases
    pub fn new(schemes: &[Scheme], matcher: SchemeMatcher) -> Self {
        let mut entries = Vec::new();
        for scheme in schemes {
            for name in scheme.names() {
                let normalized = normalize_name(name);
                if normalized.is_empty() {
                    continue;
                }
                entries.push(RegistryEntry {
                    scheme_id: scheme.id,
                    canonical: scheme.name.clone(),
                    name: name.to_string(),
                    normalized,
                });
            }
        }

        debug!("Scheme registry built with {} names for {} schemes", entries.len(), schemes.len());

        Self { matcher, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a candidate name to a scheme
    pub fn match_scheme(&self, candidate: &str) -> Option<RegisteredMatch> {
        let normalized = normalize_name(candidate);
        if normalized.is_empty() {
            return None;
        }

        let best = self
            .entries
            .iter()
            .map(|entry| {
                let (score, distance) = name_score(&normalized, &entry.normalized);
                (
                    entry,
                    SchemeMatch {
                        name: entry.name.clone(),
                        similarity: score,
                        distance,
                    },
                )
            })
            .filter(|(_, m)| m.similarity >= self.matcher.threshold())
            .min_by(|(ea, a), (eb, b)| rank(a, b).then_with(|| ea.scheme_id.cmp(&eb.scheme_id)))?;

        let (entry, found) = best;
        debug!(
            "Matched '{}' to '{}' via '{}' (similarity {:.3})",
            candidate, entry.canonical, found.name, found.similarity
        );

        Some(RegisteredMatch {
            scheme_id: entry.scheme_id,
            scheme_name: entry.canonical.clone(),
            matched_name: found.name,
            similarity: found.similarity,
        })
    }
}
