// src/services/review.rs
//! Human-review queue.
//!
//! Items are created `Pending`, move to `Reviewing` through [`ReviewQueue::assign`]
//! and to `Resolved` through [`ReviewQueue::resolve`]. Nothing goes back to
//! `Pending` and nothing is deleted. Each mutation appends one audit event;
//! an audit failure is logged and never undoes the queue write.

use chrono::{DateTime, Utc};
use crisis::{CrisisVerdict, Label};
use rusqlite::{OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};
use crate::services::audit::{AuditSink, events};
use crate::services::store::{new_id, now, parse_json, parse_ts, ts, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Reviewing,
    Resolved,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Reviewing => "reviewing",
            ReviewStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ReviewStatus::Pending),
            "reviewing" => Ok(ReviewStatus::Reviewing),
            "resolved" => Ok(ReviewStatus::Resolved),
            other => Err(CoreError::Validation(format!("unknown review status {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(CoreError::Validation(format!("unknown priority {other:?}"))),
        }
    }
}

/// 3 for high priority or a crisis label, 2 for medium or concern, else 1.
pub fn crisis_level(label: Label, priority: Priority) -> u8 {
    if priority == Priority::High || label == Label::Crisis {
        3
    } else if priority == Priority::Medium || label == Label::Concern {
        2
    } else {
        1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub id: String,
    pub session_id: String,
    pub message_id: Option<String>,
    pub status: ReviewStatus,
    /// 1..=3
    pub crisis_level: u8,
    pub assigned_to: Option<String>,
    pub notes: Option<String>,
    /// `{confidence, keywords, label, priority}` at enqueue time.
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReviewStats {
    pub pending: u64,
    pub reviewing: u64,
    pub resolved: u64,
    /// Pending items at crisis level 3.
    pub high_priority: u64,
}

const REVIEW_COLUMNS: &str =
    "id, session_id, message_id, status, crisis_level, assigned_to, notes, metadata, created_at, updated_at";

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<ReviewItem> {
    let status: String = row.get(3)?;
    let metadata: String = row.get(7)?;
    Ok(ReviewItem {
        id: row.get(0)?,
        session_id: row.get(1)?,
        message_id: row.get(2)?,
        status: status.parse().map_err(|e: CoreError| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
        })?,
        crisis_level: row.get(4)?,
        assigned_to: row.get(5)?,
        notes: row.get(6)?,
        metadata: parse_json(7, &metadata)?,
        created_at: parse_ts(8, &row.get::<_, String>(8)?)?,
        updated_at: parse_ts(9, &row.get::<_, String>(9)?)?,
    })
}

pub struct ReviewQueue<'a> {
    store: &'a Store,
    audit: &'a dyn AuditSink,
}

impl<'a> ReviewQueue<'a> {
    pub fn new(store: &'a Store, audit: &'a dyn AuditSink) -> Self {
        Self { store, audit }
    }

    pub fn enqueue(
        &self,
        session_id: &str,
        message_id: Option<&str>,
        verdict: &CrisisVerdict,
        priority: Priority,
    ) -> Result<ReviewItem> {
        let at = now();
        let item = ReviewItem {
            id: new_id(),
            session_id: session_id.to_string(),
            message_id: message_id.map(str::to_string),
            status: ReviewStatus::Pending,
            crisis_level: crisis_level(verdict.label, priority),
            assigned_to: None,
            notes: None,
            metadata: json!({
                "confidence": verdict.confidence,
                "keywords": verdict.keywords,
                "label": verdict.label,
                "priority": priority,
            }),
            created_at: at,
            updated_at: at,
        };
        self.store.db.execute(
            "INSERT INTO human_review_queue(id, session_id, message_id, status, crisis_level, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            (
                &item.id,
                &item.session_id,
                &item.message_id,
                item.status.as_str(),
                item.crisis_level,
                item.metadata.to_string(),
                ts(at),
            ),
        )?;

        tracing::warn!(
            review_id = %item.id,
            session_id,
            crisis_level = item.crisis_level,
            priority = priority.as_str(),
            "review queued"
        );
        self.audit_best_effort(
            events::REVIEW_QUEUED,
            json!({
                "reviewId": item.id,
                "sessionId": item.session_id,
                "messageId": item.message_id,
                "crisisLevel": item.crisis_level,
                "priority": priority,
            }),
        );
        Ok(item)
    }

    pub fn get(&self, review_id: &str) -> Result<ReviewItem> {
        self.store
            .db
            .query_row(
                &format!("SELECT {REVIEW_COLUMNS} FROM human_review_queue WHERE id=?1"),
                [review_id],
                review_from_row,
            )
            .optional()?
            .ok_or_else(|| CoreError::not_found("review item", review_id))
    }

    /// Hand an item to a reviewer; the status becomes `Reviewing`.
    pub fn assign(&self, review_id: &str, assigned_to: &str) -> Result<ReviewItem> {
        let mut item = self.get(review_id)?;
        item.status = ReviewStatus::Reviewing;
        item.assigned_to = Some(assigned_to.to_string());
        item.updated_at = now();
        self.store.db.execute(
            "UPDATE human_review_queue SET status=?1, assigned_to=?2, updated_at=?3 WHERE id=?4",
            (
                item.status.as_str(),
                assigned_to,
                ts(item.updated_at),
                review_id,
            ),
        )?;
        self.audit_best_effort(
            events::REVIEW_ASSIGNED,
            json!({
                "reviewId": item.id,
                "assignedTo": assigned_to,
                "sessionId": item.session_id,
            }),
        );
        Ok(item)
    }

    /// Close an item, from `Pending` or `Reviewing`.
    pub fn resolve(
        &self,
        review_id: &str,
        notes: Option<&str>,
        resolved_by: Option<&str>,
    ) -> Result<ReviewItem> {
        let mut item = self.get(review_id)?;
        item.status = ReviewStatus::Resolved;
        item.notes = notes.map(str::to_string);
        item.updated_at = now();
        self.store.db.execute(
            "UPDATE human_review_queue SET status=?1, notes=?2, updated_at=?3 WHERE id=?4",
            (
                item.status.as_str(),
                &item.notes,
                ts(item.updated_at),
                review_id,
            ),
        )?;
        self.audit_best_effort(
            events::REVIEW_RESOLVED,
            json!({
                "reviewId": item.id,
                "resolvedBy": resolved_by,
                "sessionId": item.session_id,
                "notes": notes,
            }),
        );
        Ok(item)
    }

    /// Most severe first, then oldest first.
    pub fn list(
        &self,
        status: Option<ReviewStatus>,
        assigned_to: Option<&str>,
    ) -> Result<Vec<ReviewItem>> {
        let mut stmt = self.store.db.prepare(&format!(
            "SELECT {REVIEW_COLUMNS} FROM human_review_queue
             WHERE (?1 IS NULL OR status=?1) AND (?2 IS NULL OR assigned_to=?2)
             ORDER BY crisis_level DESC, created_at ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map(
            (status.map(|s| s.as_str()), assigned_to),
            review_from_row,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn stats(&self) -> Result<ReviewStats> {
        let (pending, reviewing, resolved, high_priority): (i64, i64, i64, i64) =
            self.store.db.query_row(
                "SELECT
                   COALESCE(SUM(status='pending'), 0),
                   COALESCE(SUM(status='reviewing'), 0),
                   COALESCE(SUM(status='resolved'), 0),
                   COALESCE(SUM(status='pending' AND crisis_level=3), 0)
                 FROM human_review_queue",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;
        Ok(ReviewStats {
            pending: pending as u64,
            reviewing: reviewing as u64,
            resolved: resolved as u64,
            high_priority: high_priority as u64,
        })
    }

    fn audit_best_effort(&self, event_type: &str, payload: Value) {
        if let Err(e) = self.audit.append(event_type, &payload) {
            tracing::warn!(event_type, error = %e, "audit append failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crisis_level_mapping() {
        assert_eq!(crisis_level(Label::Safe, Priority::High), 3);
        assert_eq!(crisis_level(Label::Crisis, Priority::Low), 3);
        assert_eq!(crisis_level(Label::Safe, Priority::Medium), 2);
        assert_eq!(crisis_level(Label::Concern, Priority::Low), 2);
        assert_eq!(crisis_level(Label::Safe, Priority::Low), 1);
    }

    #[test]
    fn status_parses_back() {
        for s in [ReviewStatus::Pending, ReviewStatus::Reviewing, ReviewStatus::Resolved] {
            assert_eq!(s.as_str().parse::<ReviewStatus>().unwrap(), s);
        }
        assert!("closed".parse::<ReviewStatus>().is_err());
    }
}
