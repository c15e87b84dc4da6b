//! Text normalization used for keyword matching.
//!
//! Policy:
//! - Trim surrounding whitespace.
//! - Unicode-aware lowercasing (`str::to_lowercase`).
//!
//! Nothing else: no tokenization, no stemming, no zero-width stripping. Matching
//! downstream is plain substring search over this form.

/// Normalize text for lexicon matching.
pub fn for_matching(s: &str) -> String {
    s.trim().to_lowercase()
}
