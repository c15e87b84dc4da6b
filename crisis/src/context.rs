//! Short-term conversational context.
//!
//! The bonus looks at the *tail* of the slice it is given. Callers decide the
//! ordering; the chat pipeline hands over its newest-first window unchanged,
//! so the tail there is the oldest part of that window.

use crate::lexicon::{Lexicon, Tier};
use crate::normalize::for_matching;

/// Number of trailing history entries that contribute.
pub const CONTEXT_WINDOW: usize = 5;
pub const BONUS_PER_MATCH: f64 = 0.1;
pub const MAX_CONTEXT_BONUS: f64 = 0.3;

/// Additive confidence bonus in `0.0..=MAX_CONTEXT_BONUS` from concern-tier
/// matches in the last [`CONTEXT_WINDOW`] entries of `history`.
pub fn context_bonus(lexicon: &Lexicon, history: &[String]) -> f64 {
    let start = history.len().saturating_sub(CONTEXT_WINDOW);
    let mut bonus = 0.0;
    for entry in &history[start..] {
        let hits = lexicon.count(Tier::Concern, &for_matching(entry));
        bonus += hits as f64 * BONUS_PER_MATCH;
    }
    bonus.min(MAX_CONTEXT_BONUS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_history_has_no_bonus() {
        assert_eq!(context_bonus(&Lexicon::default(), &[]), 0.0);
    }

    #[test]
    fn bonus_is_capped() {
        let history = h(&["hopeless", "worthless", "burden", "depressed", "give up"]);
        assert!((context_bonus(&Lexicon::default(), &history) - MAX_CONTEXT_BONUS).abs() < 1e-9);
    }

    #[test]
    fn only_the_last_five_entries_count() {
        // The concern phrase sits in position 0 of six; it falls outside the tail.
        let history = h(&["I feel hopeless", "a", "b", "c", "d", "e"]);
        assert_eq!(context_bonus(&Lexicon::default(), &history), 0.0);

        let history = h(&["a", "I feel hopeless", "b", "c", "d", "e"]);
        assert!((context_bonus(&Lexicon::default(), &history) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn crisis_tier_phrases_do_not_add_bonus() {
        let history = h(&["I want to kill myself"]);
        assert_eq!(context_bonus(&Lexicon::default(), &history), 0.0);
    }
}
