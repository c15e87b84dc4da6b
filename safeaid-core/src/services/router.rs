// src/services/router.rs
//! Picks how a scored message is answered.
//!
//! Order of precedence: missing consent, crisis, safe mode, supportive.
//! Only the last two call the completion provider.

use crisis::{CrisisVerdict, OutputGate};
use serde::Serialize;

use crate::config::ChatConfig;
use crate::error::Result;
use crate::services::helplines::{Helpline, HelplineDirectory};
use crate::services::messages::Message;
use crate::services::prompts::{
    BREATHING_OFFER, CONSENT_REQUIRED, build_chat_prompt, build_crisis_response,
    build_safe_mode_prompt,
};
use crate::services::provider::ResilientCompletion;
use crate::services::review::{Priority, ReviewQueue};
use crate::services::techniques::{Technique, TechniqueCatalog};

/// What the router needs to know about the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub session_id: String,
    pub consented: bool,
    pub safe_mode: bool,
    /// ISO-2 country used for helpline lookup.
    pub country: String,
    pub locale: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    ConsentRequired,
    Crisis,
    SafeMode,
    Supportive,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutedReply {
    pub reply_text: String,
    pub strategy: Strategy,
    pub is_crisis: bool,
    pub helplines: Vec<Helpline>,
    pub techniques: Vec<Technique>,
    pub requires_review: bool,
    pub review_id: Option<String>,
    /// Provider name, `fallback`, or `fixed` for replies that never reach a provider.
    pub served_by: String,
}

impl RoutedReply {
    fn fixed(text: &str, strategy: Strategy) -> Self {
        Self {
            reply_text: text.to_string(),
            strategy,
            is_crisis: false,
            helplines: Vec::new(),
            techniques: Vec::new(),
            requires_review: false,
            review_id: None,
            served_by: "fixed".to_string(),
        }
    }
}

pub struct ResponseRouter<'a> {
    helplines: &'a dyn HelplineDirectory,
    techniques: &'a dyn TechniqueCatalog,
    review: &'a ReviewQueue<'a>,
    completion: &'a ResilientCompletion,
    gate: OutputGate,
    prompt_window: usize,
    safe_mode_window: usize,
}

impl<'a> ResponseRouter<'a> {
    pub fn new(
        helplines: &'a dyn HelplineDirectory,
        techniques: &'a dyn TechniqueCatalog,
        review: &'a ReviewQueue<'a>,
        completion: &'a ResilientCompletion,
        chat: &ChatConfig,
    ) -> Self {
        Self {
            helplines,
            techniques,
            review,
            completion,
            gate: OutputGate::default(),
            prompt_window: chat.prompt_window,
            safe_mode_window: chat.safe_mode_window,
        }
    }

    /// `history` is oldest first and excludes `message` itself.
    pub fn route(
        &self,
        verdict: &CrisisVerdict,
        state: &SessionState,
        message: &str,
        history: &[Message],
    ) -> Result<RoutedReply> {
        if !state.consented {
            return Ok(RoutedReply::fixed(CONSENT_REQUIRED, Strategy::ConsentRequired));
        }
        if verdict.is_crisis {
            return self.crisis_reply(verdict, state);
        }
        Ok(self.generated_reply(state, message, history))
    }

    /// Queues the review before anything else can fail. A helpline lookup
    /// error degrades to the generic emergency-number text.
    fn crisis_reply(&self, verdict: &CrisisVerdict, state: &SessionState) -> Result<RoutedReply> {
        let review_id = match self
            .review
            .enqueue(&state.session_id, None, verdict, Priority::High)
        {
            Ok(item) => Some(item.id),
            Err(e) => {
                tracing::warn!(session_id = %state.session_id, error = %e, "crisis review enqueue failed");
                None
            }
        };

        let helplines = self
            .helplines
            .find_crisis_helplines(&state.country)
            .unwrap_or_else(|e| {
                tracing::warn!(country = %state.country, error = %e, "helpline lookup failed");
                Vec::new()
            });
        let reply_text = build_crisis_response(&helplines);

        Ok(RoutedReply {
            reply_text,
            strategy: Strategy::Crisis,
            is_crisis: true,
            helplines,
            techniques: Vec::new(),
            requires_review: true,
            review_id,
            served_by: "fixed".to_string(),
        })
    }

    fn generated_reply(&self, state: &SessionState, message: &str, history: &[Message]) -> RoutedReply {
        let strategy = if state.safe_mode {
            Strategy::SafeMode
        } else {
            Strategy::Supportive
        };

        let lookup = self
            .techniques
            .find_by_locale(&state.locale)
            .and_then(|all| Ok((all, self.techniques.random_technique(&state.locale)?)));
        let (all, pick) = match lookup {
            Ok(found) => found,
            Err(e) => {
                tracing::error!(error = %e, "technique lookup failed; offering breathing exercise");
                return RoutedReply::fixed(BREATHING_OFFER, strategy);
            }
        };

        let prompt = if state.safe_mode {
            build_safe_mode_prompt(message, history, self.safe_mode_window)
        } else {
            build_chat_prompt(message, history, self.prompt_window, &all, &[])
        };

        let completion = self.completion.complete(&prompt, state.safe_mode);
        let reply_text = if completion.fell_back {
            completion.text
        } else {
            self.gate.check(&completion.text).into_text()
        };

        RoutedReply {
            reply_text,
            strategy,
            is_crisis: false,
            helplines: Vec::new(),
            techniques: pick.into_iter().collect(),
            requires_review: false,
            review_id: None,
            served_by: completion.served_by,
        }
    }
}
