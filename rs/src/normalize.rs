//! Text normalization for similarity comparison
//!
//! Turns a raw insight field into a lowercase, punctuation-free,
//! single-spaced string. Tokens are the whitespace-separated words of the
//! normalized string.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Common English stop words, removed only when
/// [`NormalizerOptions::remove_stop_words`] is set.
const STOP_WORDS: &[&str] = &[
    // Articles and determiners
    "the", "a", "an", "this", "that", "these", "those",
    // Conjunctions
    "and", "or", "but", "so", "if", "than",
    // Prepositions
    "in", "on", "at", "to", "for", "of", "with", "by", "from", "over", "into", "about", "as",
    // Common verbs
    "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "can", "may", "might",
    // Pronouns
    "i", "me", "my", "you", "your", "we", "our", "us", "they", "them", "their", "it", "its",
    "he", "she", "his", "her",
    // Other fillers
    "not", "no", "very", "just", "also", "more", "most",
];

static STOP_WORD_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| STOP_WORDS.iter().copied().collect());

/// Options controlling normalization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerOptions {
    /// Drop the fixed English stop-word set after normalizing.
    pub remove_stop_words: bool,
}

impl NormalizerOptions {
    /// Options with stop-word removal switched on
    pub fn without_stop_words() -> Self {
        Self {
            remove_stop_words: true,
        }
    }
}

/// Returns true if `word` (already lowercase) is in the stop-word set
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORD_SET.contains(word)
}

/// Normalize a single field.
///
/// Lowercases, replaces every character that is neither alphanumeric nor
/// whitespace with a space, collapses whitespace runs and trims. Empty or
/// whitespace-only input yields an empty string. The function is
/// idempotent: `normalize(&normalize(s, o), o) == normalize(s, o)`.
pub fn normalize(text: &str, options: &NormalizerOptions) -> String {
    // Lowercase first: case mapping can emit combining marks, which the
    // filter below must see.
    let lowered = text.to_lowercase();
    let stripped: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    stripped
        .split_whitespace()
        .filter(|word| !(options.remove_stop_words && is_stop_word(word)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a normalized string into tokens
pub fn tokenize(normalized: &str) -> Vec<&str> {
    normalized.split_whitespace().collect()
}
