use crate::context::context_bonus;
use crate::lexicon::{Lexicon, Tier};
use crate::normalize::for_matching;
use crate::types::{CrisisVerdict, Label};

pub const DEFAULT_CRISIS_THRESHOLD: f64 = 0.8;

const CRISIS_BASE: f64 = 0.9;
const CRISIS_STEP: f64 = 0.05;
const CONCERN_BASE: f64 = 0.7;
const CONCERN_STEP: f64 = 0.1;
const SINGLE_CONCERN: f64 = 0.4;

/// Keyword scorer over a two-tier [`Lexicon`].
///
/// Deterministic: identical message, history, lexicon and threshold always
/// produce an identical verdict.
#[derive(Debug, Clone)]
pub struct CrisisScorer {
    lexicon: Lexicon,
    threshold: f64,
}

impl Default for CrisisScorer {
    fn default() -> Self {
        Self::new(Lexicon::default(), DEFAULT_CRISIS_THRESHOLD)
    }
}

impl CrisisScorer {
    pub fn new(lexicon: Lexicon, threshold: f64) -> Self {
        Self { lexicon, threshold }
    }

    pub fn with_threshold(threshold: f64) -> Self {
        Self::new(Lexicon::default(), threshold)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn score(&self, message: &str, history: Option<&[String]>) -> CrisisVerdict {
        let text = for_matching(message);
        let crisis_matches = self.lexicon.matches(Tier::Crisis, &text);
        let concern_matches = self.lexicon.matches(Tier::Concern, &text);
        let n_crisis = crisis_matches.len();
        let n_concern = concern_matches.len();

        let mut keywords = crisis_matches;
        keywords.extend(concern_matches);
        let mut verdict = CrisisVerdict::safe(keywords);

        // Crisis tier dominates whatever concern phrases are present.
        if n_crisis > 0 {
            verdict.confidence = (CRISIS_BASE + CRISIS_STEP * n_crisis as f64).min(1.0);
            verdict.mark_crisis();
        } else if n_concern >= 2 {
            verdict.confidence = (CONCERN_BASE + CONCERN_STEP * n_concern as f64).min(1.0);
            verdict.label = Label::Concern;
            verdict.requires_review = verdict.confidence > self.threshold;
            verdict.is_crisis = verdict.requires_review;
        } else if n_concern == 1 {
            verdict.confidence = SINGLE_CONCERN;
            verdict.label = Label::Concern;
        }

        if let Some(history) = history.filter(|h| !h.is_empty()) {
            let bonus = context_bonus(&self.lexicon, history);
            verdict.confidence = (verdict.confidence + bonus).min(1.0);
            // Context only escalates an existing concern, never a safe message.
            if verdict.confidence > self.threshold && verdict.label == Label::Concern {
                verdict.mark_crisis();
            }
        }

        tracing::debug!(
            label = %verdict.label,
            confidence = verdict.confidence,
            keywords = verdict.keywords.len(),
            "crisis detection"
        );
        verdict
    }
}
