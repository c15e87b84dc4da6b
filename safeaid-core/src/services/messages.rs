use chrono::{DateTime, Utc};
use crisis::CrisisVerdict;
use rusqlite::{OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};
use crate::services::store::{new_id, now, parse_json, parse_ts, ts, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Bot,
    System,
    /// A human reviewer writing into the conversation.
    Human,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Bot => "bot",
            MessageRole::System => "system",
            MessageRole::Human => "human",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(MessageRole::User),
            "bot" => Ok(MessageRole::Bot),
            "system" => Ok(MessageRole::System),
            "human" => Ok(MessageRole::Human),
            other => Err(CoreError::Validation(format!("unknown message role {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub anonymized: bool,
    pub flagged: bool,
    /// `{label, confidence, keywords}` of the verdict, user messages only.
    pub classifier: Option<Value>,
    pub crisis_detected: bool,
}

const MESSAGE_COLUMNS: &str =
    "id, session_id, role, content, created_at, anonymized, flagged, classifier, crisis_detected";

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let role: String = row.get(2)?;
    let classifier: Option<String> = row.get(7)?;
    Ok(Message {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: role.parse().map_err(|e: CoreError| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
        })?,
        content: row.get(3)?,
        created_at: parse_ts(4, &row.get::<_, String>(4)?)?,
        anonymized: row.get(5)?,
        flagged: row.get(6)?,
        classifier: classifier.map(|c| parse_json(7, &c)).transpose()?,
        crisis_detected: row.get(8)?,
    })
}

impl Store {
    /// Append a message. Bot messages are stored anonymized.
    pub fn save_message(&self, session_id: &str, content: &str, role: MessageRole) -> Result<Message> {
        let msg = Message {
            id: new_id(),
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            created_at: now(),
            anonymized: role == MessageRole::Bot,
            flagged: false,
            classifier: None,
            crisis_detected: false,
        };
        self.db.execute(
            "INSERT INTO messages(id, session_id, role, content, created_at, anonymized, flagged, crisis_detected)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0)",
            (
                &msg.id,
                &msg.session_id,
                role.as_str(),
                &msg.content,
                ts(msg.created_at),
                msg.anonymized,
            ),
        )?;
        Ok(msg)
    }

    /// Attach a verdict to a stored message.
    pub fn set_classifier(&self, message_id: &str, verdict: &CrisisVerdict) -> Result<()> {
        let classifier = json!({
            "label": verdict.label,
            "confidence": verdict.confidence,
            "keywords": verdict.keywords,
        });
        let n = self.db.execute(
            "UPDATE messages SET classifier=?1, crisis_detected=?2 WHERE id=?3",
            (classifier.to_string(), verdict.is_crisis, message_id),
        )?;
        if n == 0 {
            return Err(CoreError::not_found("message", message_id));
        }
        Ok(())
    }

    pub fn find_message(&self, id: &str) -> Result<Message> {
        self.db
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id=?1"),
                [id],
                message_from_row,
            )
            .optional()?
            .ok_or_else(|| CoreError::not_found("message", id))
    }

    /// Up to `limit` messages of a session, newest first.
    pub fn recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE session_id=?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map((session_id, limit as i64), message_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count_messages(&self, session_id: &str) -> Result<u64> {
        let n: i64 = self.db.query_row(
            "SELECT COUNT(*) FROM messages WHERE session_id=?1",
            [session_id],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }
}
