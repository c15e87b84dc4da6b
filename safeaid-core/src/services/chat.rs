// src/services/chat.rs
//! One inbound chat message, end to end.
//!
//! session → consent gate → persist → score → route → persist reply → review.
//! Whatever fails along the way, the caller gets a reply: errors collapse
//! into [`SAFETY_REDIRECT`].

use crisis::CrisisScorer;
use serde::Serialize;
use serde_json::Value;

use crate::config::ChatConfig;
use crate::error::Result;
use crate::services::helplines::{Helpline, HelplineType};
use crate::services::messages::{Message, MessageRole};
use crate::services::prompts::{CONSENT_REQUIRED, SAFETY_REDIRECT};
use crate::services::review::{Priority, ReviewQueue};
use crate::services::router::{ResponseRouter, SessionState};
use crate::services::sessions::{SessionDirectory, SessionStats};
use crate::services::store::Store;
use crate::services::techniques::Technique;

/// Helpline fields shown to the person in crisis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HelplineSummary {
    pub description: String,
    pub phone: String,
    #[serde(rename = "type")]
    pub kind: HelplineType,
    pub metadata: Value,
}

impl From<Helpline> for HelplineSummary {
    fn from(h: Helpline) -> Self {
        Self {
            description: h.description,
            phone: h.phone,
            kind: h.kind,
            metadata: h.metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub is_crisis: bool,
    pub helplines: Vec<HelplineSummary>,
    pub techniques: Vec<Technique>,
    pub session_stats: Option<SessionStats>,
    pub requires_review: bool,
}

impl ChatResponse {
    fn text_only(message: &str) -> Self {
        Self {
            message: message.to_string(),
            is_crisis: false,
            helplines: Vec::new(),
            techniques: Vec::new(),
            session_stats: None,
            requires_review: false,
        }
    }
}

pub struct ChatService<'a> {
    store: &'a Store,
    scorer: &'a CrisisScorer,
    router: ResponseRouter<'a>,
    review: &'a ReviewQueue<'a>,
    chat: &'a ChatConfig,
}

impl<'a> ChatService<'a> {
    pub fn new(
        store: &'a Store,
        scorer: &'a CrisisScorer,
        router: ResponseRouter<'a>,
        review: &'a ReviewQueue<'a>,
        chat: &'a ChatConfig,
    ) -> Self {
        Self {
            store,
            scorer,
            router,
            review,
            chat,
        }
    }

    pub fn handle_message(&self, session_id: &str, message: &str, locale: Option<&str>) -> ChatResponse {
        match self.try_handle(session_id, message, locale) {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(session_id, error = %e, "chat handling failed; sending safety redirect");
                ChatResponse::text_only(SAFETY_REDIRECT)
            }
        }
    }

    fn try_handle(&self, session_id: &str, message: &str, locale: Option<&str>) -> Result<ChatResponse> {
        let session = self.store.find_session(session_id)?;
        if !session.consented {
            return Ok(ChatResponse::text_only(CONSENT_REQUIRED));
        }

        self.store.update_last_activity(session_id)?;
        let user_message = self.store.save_message(session_id, message, MessageRole::User)?;

        // Newest first, current message included.
        let recent = self.store.recent_messages(session_id, self.chat.history_window)?;
        let history_text: Vec<String> = recent.iter().map(|m| m.content.clone()).collect();
        let verdict = self.scorer.score(message, Some(&history_text));
        self.store.set_classifier(&user_message.id, &verdict)?;

        let safe_mode = !verdict.is_crisis && self.store.is_safe_mode_active(session_id)?;
        let state = SessionState {
            session_id: session_id.to_string(),
            consented: true,
            safe_mode,
            country: session
                .ip_country()
                .unwrap_or(&self.chat.default_country)
                .to_ascii_uppercase(),
            locale: locale
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .unwrap_or(&self.chat.default_locale)
                .to_string(),
        };

        let mut prior: Vec<Message> = recent
            .into_iter()
            .filter(|m| m.id != user_message.id)
            .collect();
        prior.reverse();

        let reply = self.router.route(&verdict, &state, message, &prior)?;
        self.store.save_message(session_id, &reply.reply_text, MessageRole::Bot)?;

        if reply.is_crisis {
            return Ok(ChatResponse {
                message: reply.reply_text,
                is_crisis: true,
                helplines: reply.helplines.into_iter().map(HelplineSummary::from).collect(),
                techniques: Vec::new(),
                session_stats: None,
                requires_review: true,
            });
        }

        // The scorer only flags review together with is_crisis, so this stays idle
        // with the built-in scorer; it covers verdicts that flag review alone.
        if verdict.requires_review {
            if let Err(e) =
                self.review
                    .enqueue(session_id, Some(&user_message.id), &verdict, Priority::Medium)
            {
                tracing::warn!(session_id, error = %e, "review enqueue failed");
            }
        }

        let session_stats = self.store.session_stats(session_id)?;
        Ok(ChatResponse {
            message: reply.reply_text,
            is_crisis: false,
            helplines: Vec::new(),
            techniques: reply.techniques,
            session_stats: Some(session_stats),
            requires_review: verdict.requires_review,
        })
    }
}
