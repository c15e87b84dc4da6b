use crisis::CrisisVerdict;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;

use crate::error::{CoreError, Result};
use crate::services::audit::{AuditSink, events};
use crate::services::review::{Priority, ReviewQueue};
use crate::services::store::{now, ts, Store};

pub const FEEDBACK_THANKS: &str = "Thank you for your feedback. It helps us improve our service.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Helpful,
    NotHelpful,
    Inappropriate,
    /// The person says a crisis went unnoticed; always escalated.
    CrisisMissed,
    Other,
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackKind::Helpful => "helpful",
            FeedbackKind::NotHelpful => "not_helpful",
            FeedbackKind::Inappropriate => "inappropriate",
            FeedbackKind::CrisisMissed => "crisis_missed",
            FeedbackKind::Other => "other",
        }
    }
}

impl FromStr for FeedbackKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "helpful" => Ok(FeedbackKind::Helpful),
            "not_helpful" => Ok(FeedbackKind::NotHelpful),
            "inappropriate" => Ok(FeedbackKind::Inappropriate),
            "crisis_missed" => Ok(FeedbackKind::CrisisMissed),
            "other" => Ok(FeedbackKind::Other),
            other => Err(CoreError::Validation(format!("unknown feedback type {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub session_id: String,
    pub message_id: Option<String>,
    pub kind: FeedbackKind,
    pub comment: Option<String>,
    /// 1..=5
    pub rating: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackReceipt {
    pub message: String,
    pub received: bool,
    pub review_id: Option<String>,
}

/// Log feedback to the audit trail; a missed crisis is also queued at high
/// priority with a synthetic crisis verdict.
pub fn submit_feedback(
    store: &Store,
    audit: &dyn AuditSink,
    review: &ReviewQueue<'_>,
    feedback: &Feedback,
) -> Result<FeedbackReceipt> {
    if let Some(rating) = feedback.rating {
        if !(1..=5).contains(&rating) {
            return Err(CoreError::Validation(format!("rating must be 1..=5, got {rating}")));
        }
    }
    store.find_session(&feedback.session_id)?;

    audit.append(
        events::USER_FEEDBACK,
        &json!({
            "sessionId": feedback.session_id,
            "messageId": feedback.message_id,
            "type": feedback.kind,
            "comment": feedback.comment,
            "rating": feedback.rating,
            "timestamp": ts(now()),
        }),
    )?;

    let review_id = if feedback.kind == FeedbackKind::CrisisMissed {
        let item = review.enqueue(
            &feedback.session_id,
            feedback.message_id.as_deref(),
            &CrisisVerdict::user_reported(),
            Priority::High,
        )?;
        Some(item.id)
    } else {
        None
    };

    Ok(FeedbackReceipt {
        message: FEEDBACK_THANKS.to_string(),
        received: true,
        review_id,
    })
}
