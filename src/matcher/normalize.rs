//! Name normalization and edit distance

/// Token-level abbreviation expansions
const ABBREVIATIONS: &[(&str, &[&str])] = &[
    ("pru", &["prudential"]),
    ("midcap", &["mid", "cap"]),
    ("smallcap", &["small", "cap"]),
    ("largecap", &["large", "cap"]),
    ("flexicap", &["flexi", "cap"]),
    ("multicap", &["multi", "cap"]),
];

/// Tokens that carry no identity: plan and option suffixes
const FILLER_TOKENS: &[&str] = &[
    "fund", "funds", "scheme", "direct", "plan", "growth", "option", "regular",
];

/// Reduce a scheme name to its canonical comparison form.
///
/// Case-folds, spells `&` as `and`, replaces punctuation with spaces, expands
/// known abbreviations, drops plan/option filler words and collapses runs of
/// whitespace.
///
/// ```
/// use fund_facts_rag::matcher::normalize_name;
///
/// assert_eq!(
///     normalize_name("ICICI Pru Large & Mid Cap Fund - Direct Plan - Growth"),
///     "icici prudential large and mid cap"
/// );
/// ```
pub fn normalize_name(name: &str) -> String {
    let spaced: String = name
        .to_lowercase()
        .replace('&', " and ")
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut tokens: Vec<&str> = Vec::new();
    for token in spaced.split_whitespace() {
        match ABBREVIATIONS.iter().find(|(abbr, _)| *abbr == token) {
            Some((_, expansion)) => tokens.extend_from_slice(expansion),
            None => tokens.push(token),
        }
    }

    tokens
        .into_iter()
        .filter(|t| !FILLER_TOKENS.contains(t))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Character-level Levenshtein distance
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Normalized edit-distance similarity in `[0, 1]`, plus the raw distance
pub fn similarity(a: &str, b: &str) -> (f32, usize) {
    let distance = levenshtein(a, b);
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return (1.0, 0);
    }
    (1.0 - distance as f32 / longest as f32, distance)
}
