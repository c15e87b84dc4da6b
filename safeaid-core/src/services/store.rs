// src/services/store.rs
//! Single-writer SQLite store.
//!
//! - Owns the one SQLite connection (WAL) for sessions, messages, helplines,
//!   techniques, the review queue and the audit log.
//! - Domain modules add their own `impl Store` blocks next to their types.
//! - Timestamps are fixed-width RFC3339 UTC (microseconds) so that text
//!   ordering in SQL matches time ordering.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::Connection;
use serde_json::Value;
use std::path::Path;

use crate::error::Result;

/// Store is the single authority for writing to SQLite.
pub struct Store {
    pub(crate) db: Connection,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
  id          TEXT PRIMARY KEY,
  locale      TEXT,
  age_range   TEXT,
  consented   INTEGER NOT NULL DEFAULT 0,
  created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
  id                 TEXT PRIMARY KEY,
  user_id            TEXT REFERENCES users(id),
  created_at         TEXT NOT NULL,
  last_activity      TEXT NOT NULL,
  consented          INTEGER NOT NULL DEFAULT 0,
  metadata           TEXT NOT NULL DEFAULT '{}',   -- JSON map; reads ip_country
  safe_mode          INTEGER NOT NULL DEFAULT 0,
  safe_mode_expires  TEXT
);

CREATE TABLE IF NOT EXISTS messages (
  id               TEXT PRIMARY KEY,
  session_id       TEXT NOT NULL REFERENCES sessions(id),
  role             TEXT NOT NULL,                  -- user | bot | system | human
  content          TEXT NOT NULL,
  created_at       TEXT NOT NULL,
  anonymized       INTEGER NOT NULL DEFAULT 0,
  flagged          INTEGER NOT NULL DEFAULT 0,
  classifier       TEXT,                           -- JSON {label, confidence, keywords}
  crisis_detected  INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, created_at);

CREATE TABLE IF NOT EXISTS helplines (
  id           TEXT PRIMARY KEY,
  country      TEXT NOT NULL,                      -- ISO-2
  region       TEXT,
  description  TEXT NOT NULL,
  phone        TEXT NOT NULL,
  type         TEXT NOT NULL,
  priority     INTEGER NOT NULL DEFAULT 0,
  metadata     TEXT NOT NULL DEFAULT '{}',
  active       INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_helplines_country ON helplines(country, active);

CREATE TABLE IF NOT EXISTS techniques (
  id                TEXT PRIMARY KEY,
  key               TEXT NOT NULL,
  title             TEXT NOT NULL,
  locale            TEXT NOT NULL,
  steps             TEXT NOT NULL,                 -- JSON array of strings
  duration_seconds  INTEGER NOT NULL,
  active            INTEGER NOT NULL DEFAULT 1,
  description       TEXT,
  category          TEXT,
  UNIQUE(key, locale)
);

CREATE TABLE IF NOT EXISTS human_review_queue (
  id            TEXT PRIMARY KEY,
  session_id    TEXT NOT NULL,
  message_id    TEXT,
  status        TEXT NOT NULL,                     -- pending | reviewing | resolved
  crisis_level  INTEGER NOT NULL,                  -- 1..=3
  assigned_to   TEXT,
  notes         TEXT,
  metadata      TEXT NOT NULL DEFAULT '{}',
  created_at    TEXT NOT NULL,
  updated_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_review_status ON human_review_queue(status, crisis_level);

CREATE TABLE IF NOT EXISTS audit_log (
  id          TEXT PRIMARY KEY,
  event_type  TEXT NOT NULL,
  payload     TEXT NOT NULL,
  created_at  TEXT NOT NULL,
  user_id     TEXT,
  session_id  TEXT
);
CREATE INDEX IF NOT EXISTS idx_audit_event ON audit_log(event_type, created_at);
"#;

impl Store {
    /// Open/create the SQLite DB and ensure schema.
    ///
    /// Behavior:
    /// - Creates the parent directory if missing.
    /// - Opens SQLite and enables WAL (one writer, many readers).
    /// - Creates every table and index if they don't exist.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Connection::open(db_path)?;
        db.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::with_schema(db)
    }

    /// Private in-memory database; used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_schema(Connection::open_in_memory()?)
    }

    fn with_schema(db: Connection) -> Result<Self> {
        db.execute_batch(SCHEMA)?;
        Ok(Self { db })
    }

    /// Liveness check for health reports.
    pub fn ping(&self) -> Result<()> {
        self.db.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current time at the precision [`ts`] stores, so returned rows equal reloaded ones.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Read a timestamp column written by [`ts`].
pub(crate) fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn parse_opt_ts(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_ts(idx, &s)).transpose()
}

/// Read a JSON column; malformed text is a conversion failure, not a panic.
pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn json_text(value: &Value) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.db.execute_batch(SCHEMA).unwrap();
        store.ping().unwrap();
    }

    #[test]
    fn timestamps_sort_as_text() {
        let a = ts("2024-01-01T00:00:05Z".parse().unwrap());
        let b = ts("2024-01-01T00:00:05.5Z".parse().unwrap());
        assert!(a < b, "{a} should sort before {b}");
        assert_eq!(parse_ts(0, &b).unwrap().timestamp_subsec_millis(), 500);
    }

    #[test]
    fn now_survives_a_store_round_trip() {
        let at = now();
        assert_eq!(parse_ts(0, &ts(at)).unwrap(), at);
    }

    #[test]
    fn open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/data/safeaid.db");
        Store::open(&path).unwrap().ping().unwrap();
        assert!(path.exists());
    }
}
