//! Query and document tokenization.
//!
//! The stop-word set is frozen; changing it invalidates every index on
//! disk, so additions go through an index format bump, not an edit here.

use once_cell::sync::Lazy;
use std::collections::HashSet;

pub const MIN_TOKEN_CHARS: usize = 2;
pub const MAX_TOKEN_CHARS: usize = 50;

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // Articles & determiners
        "the", "an", "this", "that", "these", "those", "some", "any", "each", "all", "such",
        "same",
        // Pronouns
        "it", "its", "he", "she", "we", "they", "them", "his", "her", "their", "our", "your",
        "you", "me", "my", "who",
        // Prepositions
        "in", "on", "at", "by", "to", "from", "of", "for", "with", "into", "over", "about",
        "before", "after",
        // Conjunctions & question words
        "and", "or", "but", "so", "if", "then", "else", "because", "while", "when", "where",
        "how",
        // Common verbs & fillers
        "is", "are", "was", "were", "be", "been", "do", "does", "did", "have", "has", "had",
        "will", "would", "can", "could",
    ]
    .into_iter()
    .collect()
});

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(token)
}

/// Lowercase, split on non-word runs, then drop tokens that are too short,
/// too long, purely numeric, or stop words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .filter(|t| {
            let len = t.chars().count();
            len >= MIN_TOKEN_CHARS && len <= MAX_TOKEN_CHARS
        })
        .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
        .filter(|t| !is_stop_word(t))
        .map(String::from)
        .collect()
}
