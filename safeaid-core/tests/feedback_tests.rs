mod common;

use common::{RecordingSleeper, ScriptedProvider, commands, consented_session};
use safeaid_core::services::audit::events;
use safeaid_core::services::feedback::{FEEDBACK_THANKS, Feedback, FeedbackKind};
use safeaid_core::services::review::ReviewStatus;

fn feedback(session_id: &str, kind: FeedbackKind, rating: Option<u8>) -> Feedback {
    Feedback {
        session_id: session_id.to_string(),
        message_id: Some("m-42".into()),
        kind,
        comment: Some("thanks".into()),
        rating,
    }
}

#[test]
fn helpful_feedback_is_audited_only() -> anyhow::Result<()> {
    let cmds = commands(&ScriptedProvider::failing(), &RecordingSleeper::default());
    let session = consented_session(&cmds, None);

    let receipt = cmds.submit_feedback(&feedback(&session.id, FeedbackKind::Helpful, Some(5)))?;
    assert_eq!(receipt.message, FEEDBACK_THANKS);
    assert!(receipt.received);
    assert!(receipt.review_id.is_none());
    assert!(cmds.review_queue(None, None)?.is_empty());

    let entries = cmds.audit_log(Some(events::USER_FEEDBACK), 10)?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].payload["type"], "helpful");
    assert_eq!(entries[0].payload["rating"], 5);
    assert_eq!(entries[0].session_id.as_deref(), Some(session.id.as_str()));
    Ok(())
}

#[test]
fn missed_crisis_is_escalated_at_high_priority() -> anyhow::Result<()> {
    let cmds = commands(&ScriptedProvider::failing(), &RecordingSleeper::default());
    let session = consented_session(&cmds, None);

    let receipt = cmds.submit_feedback(&feedback(&session.id, FeedbackKind::CrisisMissed, None))?;
    let review_id = receipt.review_id.expect("escalated");
    let item = cmds.review_item(&review_id)?;
    assert_eq!(item.status, ReviewStatus::Pending);
    assert_eq!(item.crisis_level, 3);
    assert_eq!(item.message_id.as_deref(), Some("m-42"));
    assert_eq!(item.metadata["keywords"][0], "user_reported_crisis");
    assert_eq!(cmds.review_stats()?.high_priority, 1);
    Ok(())
}

#[test]
fn out_of_range_rating_is_rejected_before_anything_is_written() -> anyhow::Result<()> {
    let cmds = commands(&ScriptedProvider::failing(), &RecordingSleeper::default());
    let session = consented_session(&cmds, None);

    let err = cmds
        .submit_feedback(&feedback(&session.id, FeedbackKind::NotHelpful, Some(6)))
        .unwrap_err();
    assert!(matches!(err, safeaid_core::CoreError::Validation(_)));
    assert!(cmds.audit_log(None, 10)?.is_empty());
    Ok(())
}

#[test]
fn feedback_for_unknown_session_is_not_found() {
    let cmds = commands(&ScriptedProvider::failing(), &RecordingSleeper::default());
    let err = cmds
        .submit_feedback(&feedback("ghost", FeedbackKind::Other, None))
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn kinds_parse_from_their_wire_names() {
    assert_eq!("crisis_missed".parse::<FeedbackKind>().unwrap(), FeedbackKind::CrisisMissed);
    assert_eq!("not_helpful".parse::<FeedbackKind>().unwrap(), FeedbackKind::NotHelpful);
    assert!("meh".parse::<FeedbackKind>().is_err());
}
