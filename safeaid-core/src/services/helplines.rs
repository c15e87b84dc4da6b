//! Helpline directory.

use rusqlite::{OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::str::FromStr;

use crate::error::{CoreError, Result};
use crate::services::store::{json_text, new_id, parse_json, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HelplineType {
    Emergency,
    Suicide,
    General,
    Child,
    Women,
    LocalService,
}

impl HelplineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HelplineType::Emergency => "emergency",
            HelplineType::Suicide => "suicide",
            HelplineType::General => "general",
            HelplineType::Child => "child",
            HelplineType::Women => "women",
            HelplineType::LocalService => "local_service",
        }
    }
}

impl FromStr for HelplineType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "emergency" => Ok(HelplineType::Emergency),
            "suicide" => Ok(HelplineType::Suicide),
            "general" => Ok(HelplineType::General),
            "child" => Ok(HelplineType::Child),
            "women" => Ok(HelplineType::Women),
            "local_service" => Ok(HelplineType::LocalService),
            other => Err(CoreError::Validation(format!("unknown helpline type {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Helpline {
    pub id: String,
    /// ISO 3166-1 alpha-2.
    pub country: String,
    pub region: Option<String>,
    pub description: String,
    pub phone: String,
    #[serde(rename = "type")]
    pub kind: HelplineType,
    /// Lower sorts first.
    pub priority: i64,
    pub metadata: Value,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct NewHelpline {
    pub country: String,
    pub region: Option<String>,
    pub description: String,
    pub phone: String,
    pub kind: HelplineType,
    pub priority: i64,
    pub metadata: Value,
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct HelplineUpdate {
    pub description: Option<String>,
    pub phone: Option<String>,
    pub priority: Option<i64>,
    pub active: Option<bool>,
}

/// Where crisis replies get their phone numbers from.
pub trait HelplineDirectory {
    /// Active emergency and suicide lines for `country_code`, by priority.
    fn find_crisis_helplines(&self, country_code: &str) -> Result<Vec<Helpline>>;
}

const HELPLINE_COLUMNS: &str =
    "id, country, region, description, phone, type, priority, metadata, active";

fn helpline_from_row(row: &Row<'_>) -> rusqlite::Result<Helpline> {
    let kind: String = row.get(5)?;
    let metadata: String = row.get(7)?;
    Ok(Helpline {
        id: row.get(0)?,
        country: row.get(1)?,
        region: row.get(2)?,
        description: row.get(3)?,
        phone: row.get(4)?,
        kind: kind.parse().map_err(|e: CoreError| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, e.into())
        })?,
        priority: row.get(6)?,
        metadata: parse_json(7, &metadata)?,
        active: row.get(8)?,
    })
}

fn normalize_country(country: &str) -> String {
    country.trim().to_ascii_uppercase()
}

impl Store {
    pub fn create_helpline(&self, new: NewHelpline) -> Result<Helpline> {
        let helpline = Helpline {
            id: new_id(),
            country: normalize_country(&new.country),
            region: new.region,
            description: new.description,
            phone: new.phone,
            kind: new.kind,
            priority: new.priority,
            metadata: new.metadata,
            active: true,
        };
        self.db.execute(
            "INSERT INTO helplines(id, country, region, description, phone, type, priority, metadata, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1)",
            (
                &helpline.id,
                &helpline.country,
                &helpline.region,
                &helpline.description,
                &helpline.phone,
                helpline.kind.as_str(),
                helpline.priority,
                json_text(&helpline.metadata),
            ),
        )?;
        Ok(helpline)
    }

    pub fn find_helpline(&self, id: &str) -> Result<Helpline> {
        self.db
            .query_row(
                &format!("SELECT {HELPLINE_COLUMNS} FROM helplines WHERE id=?1"),
                [id],
                helpline_from_row,
            )
            .optional()?
            .ok_or_else(|| CoreError::not_found("helpline", id))
    }

    /// Active lines for a country. With a region, lines for that region and
    /// country-wide lines (no region) both match. Ordered by priority, then type.
    pub fn find_helplines_by_country(
        &self,
        country: &str,
        region: Option<&str>,
        kind: Option<HelplineType>,
    ) -> Result<Vec<Helpline>> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {HELPLINE_COLUMNS} FROM helplines
             WHERE country=?1 AND active=1
               AND (?2 IS NULL OR region=?2 OR region IS NULL)
               AND (?3 IS NULL OR type=?3)
             ORDER BY priority ASC, type ASC"
        ))?;
        let rows = stmt.query_map(
            (normalize_country(country), region, kind.map(|k| k.as_str())),
            helpline_from_row,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Active emergency/suicide lines, by priority.
    pub fn crisis_helplines(&self, country: &str, region: Option<&str>) -> Result<Vec<Helpline>> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {HELPLINE_COLUMNS} FROM helplines
             WHERE country=?1 AND active=1
               AND type IN ('emergency', 'suicide')
               AND (?2 IS NULL OR region=?2 OR region IS NULL)
             ORDER BY priority ASC, type ASC"
        ))?;
        let rows = stmt.query_map((normalize_country(country), region), helpline_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Every active line across all countries.
    pub fn find_all_helplines(&self) -> Result<Vec<Helpline>> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {HELPLINE_COLUMNS} FROM helplines WHERE active = 1 \
             ORDER BY country ASC, priority ASC"
        ))?;
        let rows = stmt.query_map([], helpline_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn update_helpline(&self, id: &str, update: HelplineUpdate) -> Result<Helpline> {
        let mut current = self.find_helpline(id)?;
        if let Some(d) = update.description {
            current.description = d;
        }
        if let Some(p) = update.phone {
            current.phone = p;
        }
        if let Some(p) = update.priority {
            current.priority = p;
        }
        if let Some(a) = update.active {
            current.active = a;
        }
        self.db.execute(
            "UPDATE helplines SET description=?1, phone=?2, priority=?3, active=?4 WHERE id=?5",
            (
                &current.description,
                &current.phone,
                current.priority,
                current.active,
                id,
            ),
        )?;
        Ok(current)
    }

    /// Helplines are never deleted, only deactivated.
    pub fn deactivate_helpline(&self, id: &str) -> Result<Helpline> {
        self.update_helpline(
            id,
            HelplineUpdate {
                active: Some(false),
                ..Default::default()
            },
        )
    }

    /// Insert the built-in helplines that are missing, keyed on country and
    /// phone. Returns how many rows were created.
    pub fn seed_default_helplines(&self) -> Result<usize> {
        let mut created = 0;
        for new in default_helplines() {
            let exists: Option<String> = self
                .db
                .query_row(
                    "SELECT id FROM helplines WHERE country=?1 AND phone=?2",
                    (&new.country, &new.phone),
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                self.create_helpline(new)?;
                created += 1;
            }
        }
        Ok(created)
    }
}

impl HelplineDirectory for Store {
    fn find_crisis_helplines(&self, country_code: &str) -> Result<Vec<Helpline>> {
        self.crisis_helplines(country_code, None)
    }
}

fn line(
    country: &str,
    description: &str,
    phone: &str,
    kind: HelplineType,
    priority: i64,
    metadata: Value,
) -> NewHelpline {
    NewHelpline {
        country: country.to_string(),
        region: None,
        description: description.to_string(),
        phone: phone.to_string(),
        kind,
        priority,
        metadata,
    }
}

pub fn default_helplines() -> Vec<NewHelpline> {
    vec![
        line(
            "US",
            "US National Suicide Prevention Lifeline",
            "988",
            HelplineType::Suicide,
            1,
            json!({ "url": "https://988lifeline.org/", "hours": "24/7" }),
        ),
        line(
            "US",
            "Emergency Services",
            "911",
            HelplineType::Emergency,
            1,
            json!({ "hours": "24/7" }),
        ),
        line(
            "PK",
            "Pakistan Mental Health Helpline",
            "021-111-222-333",
            HelplineType::Suicide,
            1,
            json!({ "hours": "9-5 Mon-Fri" }),
        ),
        line(
            "GB",
            "Samaritans",
            "116 123",
            HelplineType::Suicide,
            1,
            json!({ "url": "https://www.samaritans.org/", "hours": "24/7" }),
        ),
        line(
            "CA",
            "Canada Suicide Prevention Service",
            "1-833-456-4566",
            HelplineType::Suicide,
            1,
            json!({ "hours": "24/7" }),
        ),
    ]
}
