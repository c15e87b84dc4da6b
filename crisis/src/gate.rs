//! Reply gate for provider-generated text.
//!
//! Crude word-boundary patterns, not intent classification: a reply that so
//! much as mentions one of the listed words is swapped for a fixed redirect
//! in full. Partial redaction is never attempted.

use once_cell::sync::Lazy;
use regex::Regex;

pub const PROFESSIONAL_REDIRECT: &str = "I want to support you, but I think it would be best to speak with a mental health professional who can provide the right guidance. Would you like me to help you find local resources?";

static HARM_LANGUAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(kill|suicide|die|death|harm)\b").expect("HARM_LANGUAGE regex should compile")
});

static CLINICAL_ADVICE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(diagnosis|prescribe|medication)\b")
        .expect("CLINICAL_ADVICE regex should compile")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Reply is fine; carries the trimmed text.
    Pass(String),
    /// Reply tripped a pattern; carries the replacement and the pattern name.
    CutAndReplace { replacement: String, pattern: &'static str },
}

impl GateDecision {
    pub fn into_text(self) -> String {
        match self {
            GateDecision::Pass(text) => text,
            GateDecision::CutAndReplace { replacement, .. } => replacement,
        }
    }

    pub fn was_cut(&self) -> bool {
        matches!(self, GateDecision::CutAndReplace { .. })
    }
}

#[derive(Debug, Clone)]
pub struct OutputGate {
    patterns: Vec<(&'static str, &'static Regex)>,
    replacement: String,
}

impl Default for OutputGate {
    fn default() -> Self {
        Self {
            patterns: vec![
                ("harm_language", &*HARM_LANGUAGE),
                ("clinical_advice", &*CLINICAL_ADVICE),
            ],
            replacement: PROFESSIONAL_REDIRECT.to_string(),
        }
    }
}

impl OutputGate {
    pub fn check(&self, reply: &str) -> GateDecision {
        for (name, re) in &self.patterns {
            if re.is_match(reply) {
                tracing::warn!(pattern = *name, "provider reply replaced by redirect");
                return GateDecision::CutAndReplace {
                    replacement: self.replacement.clone(),
                    pattern: name,
                };
            }
        }
        GateDecision::Pass(reply.trim().to_string())
    }
}

/// Gate `reply` with the default patterns and return the text to show.
pub fn sanitize_reply(reply: &str) -> String {
    OutputGate::default().check(reply).into_text()
}
