// Public modules so safeaid-core can use them
pub mod context;
pub mod gate;
pub mod lexicon;
pub mod normalize;
pub mod scorer;
pub mod types;

pub use context::context_bonus;
pub use gate::{sanitize_reply, GateDecision, OutputGate, PROFESSIONAL_REDIRECT};
pub use lexicon::{write_default_lexicon, Lexicon, LexiconError, Tier};
pub use normalize::for_matching as normalize_for_matching;
pub use scorer::{CrisisScorer, DEFAULT_CRISIS_THRESHOLD};
pub use types::{CrisisVerdict, Label};

/// --- Pure Rust API for safeaid-core ---
pub fn score_with_lexicon_toml(
    lexicon_toml: &str,
    threshold: f64,
    message: &str,
) -> Result<CrisisVerdict, LexiconError> {
    let lexicon = Lexicon::from_toml_str(lexicon_toml)?;
    Ok(CrisisScorer::new(lexicon, threshold).score(message, None))
}
