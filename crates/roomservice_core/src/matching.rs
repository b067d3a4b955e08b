//! String matching primitives shared by the resolver and the catalog index.

use serde::{Deserialize, Serialize};

/// Lowercase, strip punctuation (keeping `-` and `_`), collapse whitespace.
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || ch == '-' || ch == '_' || ch.is_whitespace() {
                ch
            } else {
                ' '
            }
        })
        .collect::<String>()
        .to_lowercase();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Round a score to 4 decimal places so threshold comparisons are stable.
pub fn round_score(score: f64) -> f64 {
    if !score.is_finite() {
        return 0.0;
    }
    (score.clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0
}

/// Normalized edit similarity in [0, 1] over normalized text.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    round_score(strsim::normalized_damerau_levenshtein(&a, &b))
}

/// Threshold policy for the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchPolicy {
    /// Fuzzy matches must score strictly above this.
    pub fuzzy_threshold: f64,
    /// Semantic candidates must score at or above this.
    pub semantic_threshold: f64,
    pub max_alternatives: usize,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.80,
            semantic_threshold: 0.70,
            max_alternatives: 3,
        }
    }
}

impl MatchPolicy {
    pub fn accepts_fuzzy(&self, score: f64) -> bool {
        round_score(score) > self.fuzzy_threshold
    }

    pub fn accepts_semantic(&self, score: f64) -> bool {
        round_score(score) >= self.semantic_threshold
    }
}

/// Best fuzzy candidate for `query`. Earlier candidates win ties.
pub fn best_fuzzy<'a, I>(query: &str, candidates: I) -> Option<(&'a str, f64)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&'a str, f64)> = None;
    for candidate in candidates {
        let score = similarity(query, candidate);
        match best {
            Some((_, top)) if top >= score => {}
            _ => best = Some((candidate, score)),
        }
    }
    best
}
