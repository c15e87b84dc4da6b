use crisis::{CrisisVerdict, Label};
use safeaid_core::CoreError;
use safeaid_core::services::audit::{AuditSink, AuditTrail, events};
use safeaid_core::services::review::{Priority, ReviewQueue, ReviewStats, ReviewStatus};
use safeaid_core::services::sessions::NewSession;
use safeaid_core::services::store::Store;
use serde_json::Value;

fn concern() -> CrisisVerdict {
    CrisisVerdict {
        is_crisis: false,
        confidence: 0.4,
        keywords: vec!["hopeless".into()],
        label: Label::Concern,
        requires_review: false,
    }
}

/// Sink whose every write fails.
struct BrokenSink;

impl AuditSink for BrokenSink {
    fn append(&self, _event_type: &str, _payload: &Value) -> safeaid_core::Result<()> {
        Err(CoreError::Validation("sink offline".into()))
    }
}

#[test]
fn item_moves_pending_reviewing_resolved() -> anyhow::Result<()> {
    let store = Store::open_in_memory()?;
    let audit = AuditTrail::new(&store, None);
    let queue = ReviewQueue::new(&store, &audit);
    let session = store.create_session(NewSession::default())?;

    let item = queue.enqueue(&session.id, Some("m-1"), &CrisisVerdict::user_reported(), Priority::High)?;
    assert_eq!(item.status, ReviewStatus::Pending);
    assert_eq!(item.crisis_level, 3);
    assert_eq!(item.metadata["label"], "crisis");
    assert_eq!(item.metadata["priority"], "high");

    let assigned = queue.assign(&item.id, "reviewer-7")?;
    assert_eq!(assigned.status, ReviewStatus::Reviewing);
    assert_eq!(assigned.assigned_to.as_deref(), Some("reviewer-7"));
    assert_eq!(queue.list(None, Some("reviewer-7"))?.len(), 1);

    let resolved = queue.resolve(&item.id, Some("called back"), Some("reviewer-7"))?;
    assert_eq!(resolved.status, ReviewStatus::Resolved);
    assert_eq!(resolved.notes.as_deref(), Some("called back"));
    assert_eq!(queue.get(&item.id)?, resolved);

    let kinds: Vec<String> = store
        .audit_entries(None, 10)?
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        kinds,
        vec![events::REVIEW_RESOLVED, events::REVIEW_ASSIGNED, events::REVIEW_QUEUED]
    );
    let queued = store.audit_entries(Some(events::REVIEW_QUEUED), 1)?;
    assert_eq!(queued[0].session_id.as_deref(), Some(session.id.as_str()));
    Ok(())
}

#[test]
fn list_puts_severe_items_first_then_oldest() -> anyhow::Result<()> {
    let store = Store::open_in_memory()?;
    let audit = AuditTrail::new(&store, None);
    let queue = ReviewQueue::new(&store, &audit);

    let low = queue.enqueue("s-1", None, &CrisisVerdict::default(), Priority::Low)?;
    let medium = queue.enqueue("s-2", None, &concern(), Priority::Medium)?;
    let high_a = queue.enqueue("s-3", None, &CrisisVerdict::user_reported(), Priority::High)?;
    let high_b = queue.enqueue("s-4", None, &concern(), Priority::High)?;

    let ids: Vec<String> = queue.list(None, None)?.into_iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![high_a.id, high_b.id, medium.id.clone(), low.id.clone()]);
    assert_eq!(low.crisis_level, 1);
    assert_eq!(medium.crisis_level, 2);
    Ok(())
}

#[test]
fn stats_count_by_status() -> anyhow::Result<()> {
    let store = Store::open_in_memory()?;
    let audit = AuditTrail::new(&store, None);
    let queue = ReviewQueue::new(&store, &audit);
    assert_eq!(queue.stats()?, ReviewStats::default());

    let a = queue.enqueue("s", None, &CrisisVerdict::user_reported(), Priority::High)?;
    let b = queue.enqueue("s", None, &concern(), Priority::Medium)?;
    queue.enqueue("s", None, &CrisisVerdict::user_reported(), Priority::High)?;
    queue.assign(&a.id, "r")?;
    queue.resolve(&b.id, None, None)?;

    assert_eq!(
        queue.stats()?,
        ReviewStats {
            pending: 1,
            reviewing: 1,
            resolved: 1,
            high_priority: 1,
        }
    );
    Ok(())
}

#[test]
fn unknown_item_is_not_found() -> anyhow::Result<()> {
    let store = Store::open_in_memory()?;
    let audit = AuditTrail::new(&store, None);
    let queue = ReviewQueue::new(&store, &audit);

    assert!(queue.get("missing").unwrap_err().is_not_found());
    assert!(queue.assign("missing", "r").unwrap_err().is_not_found());
    assert!(queue.resolve("missing", None, None).unwrap_err().is_not_found());
    Ok(())
}

#[test]
fn audit_failure_does_not_block_enqueue() -> anyhow::Result<()> {
    let store = Store::open_in_memory()?;
    let queue = ReviewQueue::new(&store, &BrokenSink);

    let item = queue.enqueue("s", None, &concern(), Priority::Medium)?;
    assert_eq!(queue.get(&item.id)?.status, ReviewStatus::Pending);
    assert!(store.audit_entries(None, 10)?.is_empty());
    Ok(())
}
