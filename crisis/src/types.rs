use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    #[default]
    Safe,
    Concern,
    Crisis,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Safe => "safe",
            Label::Concern => "concern",
            Label::Crisis => "crisis",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of scoring one message.
///
/// A `Crisis` label always comes with `is_crisis` and `requires_review` set.
/// The reverse does not hold: a `Concern` verdict above threshold sets both
/// flags while keeping its label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrisisVerdict {
    pub is_crisis: bool,
    /// 0.0..=1.0
    pub confidence: f64,
    /// Crisis-tier matches first, then concern-tier matches.
    pub keywords: Vec<String>,
    pub label: Label,
    pub requires_review: bool,
}

impl Default for CrisisVerdict {
    fn default() -> Self {
        Self::safe(Vec::new())
    }
}

impl CrisisVerdict {
    pub fn safe(keywords: Vec<String>) -> Self {
        Self {
            is_crisis: false,
            confidence: 0.0,
            keywords,
            label: Label::Safe,
            requires_review: false,
        }
    }

    /// Verdict used when a person reports a missed crisis by hand.
    pub fn user_reported() -> Self {
        Self {
            is_crisis: true,
            confidence: 1.0,
            keywords: vec!["user_reported_crisis".to_string()],
            label: Label::Crisis,
            requires_review: true,
        }
    }

    pub(crate) fn mark_crisis(&mut self) {
        self.label = Label::Crisis;
        self.is_crisis = true;
        self.requires_review = true;
    }
}
