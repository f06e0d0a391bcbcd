//! Regeneration drift detection
//!
//! When requirements are regenerated from a new seed, stale design and tasks
//! content must not survive if the seed changed substantively. The check
//! compares normalised keyword sets of the old and new seed.

use std::collections::BTreeSet;

use unicode_normalization::UnicodeNormalization;

/// Keyword overlap below which the seed counts as a different feature.
pub const DRIFT_THRESHOLD: f64 = 0.4;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "for", "from", "has", "have", "in",
    "is", "it", "its", "of", "on", "or", "should", "so", "that", "the", "their", "them", "then",
    "this", "to", "was", "will", "with", "would", "when", "which", "who", "we", "you", "our",
    "users", "user", "must", "able", "into", "also", "all", "any",
];

/// Outcome of comparing two seeds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftAssessment {
    /// Jaccard similarity of the keyword sets, in `[0, 1]`
    pub overlap: f64,
    pub name_changed: bool,
    pub drifted: bool,
}

/// Normalised keywords of `text`: NFKC, lowercased, split on anything that
/// is not alphanumeric, without stopwords and one- and two-letter tokens.
#[must_use]
pub fn keywords(text: &str) -> BTreeSet<String> {
    let normalized: String = text.nfkc().collect::<String>().to_lowercase();
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() > 2 && !STOPWORDS.contains(word))
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(b).count();
    let union = a.union(b).count();
    shared as f64 / union as f64
}

fn normalize_name(name: &str) -> String {
    name.nfkc()
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compare the previous seed with a new one.
///
/// The feature name counts as changed when the normalised names differ and
/// neither contains the other, so "Login" → "Login page" is a refinement
/// while "Login" → "Payments" is a new feature.
#[must_use]
pub fn assess_drift(
    previous_name: &str,
    previous_description: &str,
    name: &str,
    description: &str,
) -> DriftAssessment {
    let before = keywords(&format!("{previous_name} {previous_description}"));
    let after = keywords(&format!("{name} {description}"));
    let overlap = jaccard(&before, &after);

    let old_name = normalize_name(previous_name);
    let new_name = normalize_name(name);
    let name_changed = old_name != new_name
        && !old_name.contains(&new_name)
        && !new_name.contains(&old_name);

    DriftAssessment {
        overlap,
        name_changed,
        drifted: name_changed || overlap < DRIFT_THRESHOLD,
    }
}
