// src/services/audit.rs
//! Audit trail.
//!
//! Every review-queue mutation and every piece of user feedback lands in the
//! `audit_log` table. When `[audit] mirror_jsonl` is on, the same event is also
//! appended to the JSONL logbook with long string fields cut to a preview.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

use crate::error::{CoreError, Result};
use crate::services::store::{new_id, now, parse_json, parse_ts, ts, Store};
use crate::utils::logbook::{emit_event, redact_payload};

/// Event types written by the core.
pub mod events {
    pub const REVIEW_QUEUED: &str = "review_queued";
    pub const REVIEW_ASSIGNED: &str = "review_assigned";
    pub const REVIEW_RESOLVED: &str = "review_resolved";
    pub const USER_FEEDBACK: &str = "user_feedback";
}

/// Append-only sink for audit events.
pub trait AuditSink {
    fn append(&self, event_type: &str, payload: &Value) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub id: String,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

fn payload_str(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

impl Store {
    /// Write one audit row. `sessionId`/`userId` string fields of the
    /// payload are lifted into their own columns.
    pub fn log_event(&self, event_type: &str, payload: &Value) -> Result<AuditEntry> {
        let entry = AuditEntry {
            id: new_id(),
            event_type: event_type.to_string(),
            payload: payload.clone(),
            created_at: now(),
            user_id: payload_str(payload, "userId"),
            session_id: payload_str(payload, "sessionId"),
        };
        self.db.execute(
            "INSERT INTO audit_log(id, event_type, payload, created_at, user_id, session_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            (
                &entry.id,
                &entry.event_type,
                entry.payload.to_string(),
                ts(entry.created_at),
                &entry.user_id,
                &entry.session_id,
            ),
        )?;
        Ok(entry)
    }

    /// Newest first, optionally filtered by event type.
    pub fn audit_entries(&self, event_type: Option<&str>, limit: usize) -> Result<Vec<AuditEntry>> {
        let mut stmt = self.db.prepare(
            "SELECT id, event_type, payload, created_at, user_id, session_id FROM audit_log
             WHERE (?1 IS NULL OR event_type=?1)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map((event_type, limit as i64), |row| {
            let payload: String = row.get(2)?;
            Ok(AuditEntry {
                id: row.get(0)?,
                event_type: row.get(1)?,
                payload: parse_json(2, &payload)?,
                created_at: parse_ts(3, &row.get::<_, String>(3)?)?,
                user_id: row.get(4)?,
                session_id: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl AuditSink for Store {
    fn append(&self, event_type: &str, payload: &Value) -> Result<()> {
        self.log_event(event_type, payload).map(|_| ())
    }
}

/// JSONL mirror of the audit trail.
#[derive(Debug, Clone)]
pub struct Logbook {
    path: PathBuf,
    preview_len: usize,
}

impl Logbook {
    pub fn new(path: impl Into<PathBuf>, preview_len: usize) -> Self {
        Self {
            path: path.into(),
            preview_len,
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl AuditSink for Logbook {
    fn append(&self, event_type: &str, payload: &Value) -> Result<()> {
        let data = redact_payload(payload, self.preview_len);
        emit_event(&self.path, event_type, &data, &ts(now()))
            .map_err(|e| CoreError::Io(std::io::Error::other(e.to_string())))
    }
}

/// Database first, then the optional mirror. A mirror failure is logged and
/// swallowed; only the database write decides the result.
pub struct AuditTrail<'a> {
    store: &'a Store,
    mirror: Option<&'a Logbook>,
}

impl<'a> AuditTrail<'a> {
    pub fn new(store: &'a Store, mirror: Option<&'a Logbook>) -> Self {
        Self { store, mirror }
    }
}

impl AuditSink for AuditTrail<'_> {
    fn append(&self, event_type: &str, payload: &Value) -> Result<()> {
        self.store.append(event_type, payload)?;
        if let Some(mirror) = self.mirror {
            if let Err(e) = mirror.append(event_type, payload) {
                tracing::warn!(event_type, error = %e, "audit mirror append failed");
            }
        }
        Ok(())
    }
}
