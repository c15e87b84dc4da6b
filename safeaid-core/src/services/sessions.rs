//! Anonymous sessions, consent and safe mode.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};
use crate::services::store::{json_text, new_id, now, parse_json, parse_opt_ts, parse_ts, ts, Store};

pub const MIN_SAFE_MODE_MINUTES: u32 = 5;
pub const MAX_SAFE_MODE_MINUTES: u32 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub consented: bool,
    /// Open map; only `ip_country` is read.
    pub metadata: Value,
    pub safe_mode: bool,
    pub safe_mode_expires: Option<DateTime<Utc>>,
}

impl Session {
    pub fn ip_country(&self) -> Option<&str> {
        self.metadata
            .get("ip_country")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub locale: Option<String>,
    pub age_range: Option<String>,
    pub consented: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub locale: Option<String>,
    pub age_range: Option<String>,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStats {
    pub message_count: u64,
    pub duration_secs: i64,
    pub safe_mode: bool,
    pub safe_mode_time_left_ms: Option<i64>,
}

/// Session lookups the chat pipeline depends on.
pub trait SessionDirectory {
    fn find_session(&self, id: &str) -> Result<Session>;
    /// An expired safe mode is switched off as a side effect.
    fn is_safe_mode_active(&self, id: &str) -> Result<bool>;
}

const SESSION_COLUMNS: &str =
    "id, user_id, created_at, last_activity, consented, metadata, safe_mode, safe_mode_expires";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    let metadata: String = row.get(5)?;
    Ok(Session {
        id: row.get(0)?,
        user_id: row.get(1)?,
        created_at: parse_ts(2, &row.get::<_, String>(2)?)?,
        last_activity: parse_ts(3, &row.get::<_, String>(3)?)?,
        consented: row.get(4)?,
        metadata: parse_json(5, &metadata)?,
        safe_mode: row.get(6)?,
        safe_mode_expires: parse_opt_ts(7, row.get(7)?)?,
    })
}

impl Store {
    /// Open a session without consent or safe mode. A user row is created
    /// only when a locale or an age range is supplied.
    pub fn create_session(&self, req: NewSession) -> Result<Session> {
        let at = now();
        let user_id = if req.locale.is_some() || req.age_range.is_some() {
            let id = new_id();
            self.db.execute(
                "INSERT INTO users(id, locale, age_range, consented, created_at)
                 VALUES (?1, ?2, ?3, 0, ?4)",
                (&id, &req.locale, &req.age_range, ts(at)),
            )?;
            Some(id)
        } else {
            None
        };

        let session = Session {
            id: new_id(),
            user_id,
            created_at: at,
            last_activity: at,
            consented: false,
            metadata: Value::Object(req.metadata),
            safe_mode: false,
            safe_mode_expires: None,
        };
        self.db.execute(
            "INSERT INTO sessions(id, user_id, created_at, last_activity, consented, metadata, safe_mode)
             VALUES (?1, ?2, ?3, ?3, 0, ?4, 0)",
            (
                &session.id,
                &session.user_id,
                ts(at),
                json_text(&session.metadata),
            ),
        )?;
        tracing::info!(session_id = %session.id, "session created");
        Ok(session)
    }

    pub fn find_session(&self, id: &str) -> Result<Session> {
        self.db
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id=?1"),
                [id],
                session_from_row,
            )
            .optional()?
            .ok_or_else(|| CoreError::not_found("session", id))
    }

    pub fn find_user(&self, id: &str) -> Result<User> {
        self.db
            .query_row(
                "SELECT id, locale, age_range, consented, created_at FROM users WHERE id=?1",
                [id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        locale: row.get(1)?,
                        age_range: row.get(2)?,
                        consented: row.get(3)?,
                        created_at: parse_ts(4, &row.get::<_, String>(4)?)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| CoreError::not_found("user", id))
    }

    /// Record consent on the session and mirror it onto the user, if any.
    pub fn update_consent(&self, id: &str, consented: bool) -> Result<Session> {
        let session = self.find_session(id)?;
        self.db.execute(
            "UPDATE sessions SET consented=?1 WHERE id=?2",
            (consented, id),
        )?;
        if let Some(user_id) = &session.user_id {
            self.db.execute(
                "UPDATE users SET consented=?1 WHERE id=?2",
                (consented, user_id),
            )?;
        }
        self.find_session(id)
    }

    /// Switch safe mode on for `minutes` (5..=60) from now.
    pub fn start_safe_mode(&self, id: &str, minutes: u32) -> Result<Session> {
        if !(MIN_SAFE_MODE_MINUTES..=MAX_SAFE_MODE_MINUTES).contains(&minutes) {
            return Err(CoreError::Validation(format!(
                "safe mode duration must be {MIN_SAFE_MODE_MINUTES}..={MAX_SAFE_MODE_MINUTES} minutes, got {minutes}"
            )));
        }
        self.find_session(id)?;
        let expires = now() + Duration::minutes(i64::from(minutes));
        self.db.execute(
            "UPDATE sessions SET safe_mode=1, safe_mode_expires=?1 WHERE id=?2",
            (ts(expires), id),
        )?;
        tracing::info!(session_id = id, minutes, "safe mode started");
        self.find_session(id)
    }

    pub fn end_safe_mode(&self, id: &str) -> Result<Session> {
        self.find_session(id)?;
        self.db.execute(
            "UPDATE sessions SET safe_mode=0, safe_mode_expires=NULL WHERE id=?1",
            [id],
        )?;
        self.find_session(id)
    }

    pub fn update_last_activity(&self, id: &str) -> Result<()> {
        let n = self.db.execute(
            "UPDATE sessions SET last_activity=?1 WHERE id=?2",
            (ts(now()), id),
        )?;
        if n == 0 {
            return Err(CoreError::not_found("session", id));
        }
        Ok(())
    }

    pub fn session_stats(&self, id: &str) -> Result<SessionStats> {
        let session = self.find_session(id)?;
        let message_count = self.count_messages(id)?;
        let at = now();
        let time_left = match (session.safe_mode, session.safe_mode_expires) {
            (true, Some(expires)) => Some((expires - at).num_milliseconds().max(0)),
            _ => None,
        };
        Ok(SessionStats {
            message_count,
            duration_secs: (at - session.created_at).num_seconds(),
            safe_mode: session.safe_mode,
            safe_mode_time_left_ms: time_left,
        })
    }

    pub(crate) fn safe_mode_active_at(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let session = self.find_session(id)?;
        let Some(expires) = session.safe_mode_expires.filter(|_| session.safe_mode) else {
            return Ok(false);
        };
        if at > expires {
            self.end_safe_mode(id)?;
            tracing::info!(session_id = id, "safe mode expired");
            return Ok(false);
        }
        Ok(true)
    }
}

impl SessionDirectory for Store {
    fn find_session(&self, id: &str) -> Result<Session> {
        Store::find_session(self, id)
    }

    fn is_safe_mode_active(&self, id: &str) -> Result<bool> {
        self.safe_mode_active_at(id, now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    #[test]
    fn anonymous_session_has_no_user() {
        let s = store();
        let session = s.create_session(NewSession::default()).unwrap();
        assert!(session.user_id.is_none());
        assert!(!session.consented);
        assert!(!session.safe_mode);
        assert_eq!(s.find_session(&session.id).unwrap(), session);
    }

    #[test]
    fn locale_creates_user_and_consent_mirrors() {
        let s = store();
        let session = s
            .create_session(NewSession {
                locale: Some("en".into()),
                ..Default::default()
            })
            .unwrap();
        let user_id = session.user_id.clone().unwrap();
        assert!(!s.find_user(&user_id).unwrap().consented);

        let session = s.update_consent(&session.id, true).unwrap();
        assert!(session.consented);
        assert!(s.find_user(&user_id).unwrap().consented);
    }

    #[test]
    fn ip_country_reads_metadata() {
        let s = store();
        let mut metadata = Map::new();
        metadata.insert("ip_country".into(), json!("GB"));
        let session = s
            .create_session(NewSession {
                metadata,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(session.ip_country(), Some("GB"));
    }

    #[test]
    fn missing_session_is_not_found() {
        let err = store().find_session("nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn safe_mode_duration_is_validated() {
        let s = store();
        let id = s.create_session(NewSession::default()).unwrap().id;
        assert!(matches!(s.start_safe_mode(&id, 4), Err(CoreError::Validation(_))));
        assert!(matches!(s.start_safe_mode(&id, 61), Err(CoreError::Validation(_))));
        assert!(s.start_safe_mode(&id, 5).unwrap().safe_mode);
    }

    #[test]
    fn expired_safe_mode_is_switched_off() {
        let s = store();
        let id = s.create_session(NewSession::default()).unwrap().id;
        s.start_safe_mode(&id, 10).unwrap();
        assert!(s.is_safe_mode_active(&id).unwrap());

        let later = now() + Duration::minutes(11);
        assert!(!s.safe_mode_active_at(&id, later).unwrap());
        let session = s.find_session(&id).unwrap();
        assert!(!session.safe_mode);
        assert!(session.safe_mode_expires.is_none());
    }

    #[test]
    fn stats_report_time_left() {
        let s = store();
        let id = s.create_session(NewSession::default()).unwrap().id;
        assert_eq!(s.session_stats(&id).unwrap().safe_mode_time_left_ms, None);

        s.start_safe_mode(&id, 30).unwrap();
        let stats = s.session_stats(&id).unwrap();
        assert!(stats.safe_mode);
        let left = stats.safe_mode_time_left_ms.unwrap();
        assert!(left > 29 * 60 * 1000 && left <= 30 * 60 * 1000);
        assert_eq!(stats.message_count, 0);
    }
}
