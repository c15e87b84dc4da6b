//! Coping-technique catalog (breathing, grounding, relaxation).

use rand::seq::SliceRandom;
use rusqlite::{OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::services::store::{new_id, parse_json, Store};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technique {
    pub id: String,
    /// Unique per locale.
    pub key: String,
    pub title: String,
    pub locale: String,
    pub steps: Vec<String>,
    pub duration_seconds: i64,
    pub active: bool,
    pub description: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewTechnique {
    pub key: String,
    pub title: String,
    pub locale: String,
    pub steps: Vec<String>,
    pub duration_seconds: i64,
    pub description: Option<String>,
    pub category: Option<String>,
}

/// Techniques offered alongside normal replies.
pub trait TechniqueCatalog {
    fn find_by_locale(&self, locale: &str) -> Result<Vec<Technique>>;
    fn random_technique(&self, locale: &str) -> Result<Option<Technique>>;
}

const TECHNIQUE_COLUMNS: &str =
    "id, key, title, locale, steps, duration_seconds, active, description, category";

fn technique_from_row(row: &Row<'_>) -> rusqlite::Result<Technique> {
    let steps: String = row.get(4)?;
    Ok(Technique {
        id: row.get(0)?,
        key: row.get(1)?,
        title: row.get(2)?,
        locale: row.get(3)?,
        steps: parse_json(4, &steps)?,
        duration_seconds: row.get(5)?,
        active: row.get(6)?,
        description: row.get(7)?,
        category: row.get(8)?,
    })
}

impl Store {
    pub fn create_technique(&self, new: NewTechnique) -> Result<Technique> {
        if new.steps.is_empty() {
            return Err(CoreError::Validation(format!(
                "technique {} has no steps",
                new.key
            )));
        }
        let technique = Technique {
            id: new_id(),
            key: new.key,
            title: new.title,
            locale: new.locale,
            steps: new.steps,
            duration_seconds: new.duration_seconds,
            active: true,
            description: new.description,
            category: new.category,
        };
        self.db.execute(
            "INSERT INTO techniques(id, key, title, locale, steps, duration_seconds, active, description, category)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8)",
            (
                &technique.id,
                &technique.key,
                &technique.title,
                &technique.locale,
                serde_json::to_string(&technique.steps)?,
                technique.duration_seconds,
                &technique.description,
                &technique.category,
            ),
        )?;
        Ok(technique)
    }

    /// Active techniques for a locale, ordered by category then title.
    pub fn techniques_by_locale(&self, locale: &str) -> Result<Vec<Technique>> {
        self.techniques_where(locale, None)
    }

    pub fn technique_by_key(&self, key: &str, locale: &str) -> Result<Technique> {
        self.db
            .query_row(
                &format!(
                    "SELECT {TECHNIQUE_COLUMNS} FROM techniques WHERE key=?1 AND locale=?2 AND active=1"
                ),
                (key, locale),
                technique_from_row,
            )
            .optional()?
            .ok_or_else(|| CoreError::not_found("technique", format!("{key}/{locale}")))
    }

    /// Uniformly random active technique, optionally within one category.
    pub fn random_technique_in(&self, locale: &str, category: Option<&str>) -> Result<Option<Technique>> {
        let candidates = self.techniques_where(locale, category)?;
        Ok(candidates.choose(&mut rand::thread_rng()).cloned())
    }

    fn techniques_where(&self, locale: &str, category: Option<&str>) -> Result<Vec<Technique>> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {TECHNIQUE_COLUMNS} FROM techniques
             WHERE locale=?1 AND active=1 AND (?2 IS NULL OR category=?2)
             ORDER BY category ASC, title ASC"
        ))?;
        let rows = stmt.query_map((locale, category), technique_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Insert the built-in techniques that are missing, keyed on key and
    /// locale. Returns how many rows were created.
    pub fn seed_default_techniques(&self) -> Result<usize> {
        let mut created = 0;
        for new in default_techniques() {
            let exists: Option<String> = self
                .db
                .query_row(
                    "SELECT id FROM techniques WHERE key=?1 AND locale=?2",
                    (&new.key, &new.locale),
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                self.create_technique(new)?;
                created += 1;
            }
        }
        Ok(created)
    }
}

impl TechniqueCatalog for Store {
    fn find_by_locale(&self, locale: &str) -> Result<Vec<Technique>> {
        self.techniques_by_locale(locale)
    }

    fn random_technique(&self, locale: &str) -> Result<Option<Technique>> {
        self.random_technique_in(locale, None)
    }
}

fn technique(
    key: &str,
    title: &str,
    category: &str,
    description: &str,
    duration_seconds: i64,
    steps: &[&str],
) -> NewTechnique {
    NewTechnique {
        key: key.to_string(),
        title: title.to_string(),
        locale: "en".to_string(),
        steps: steps.iter().map(|s| s.to_string()).collect(),
        duration_seconds,
        description: Some(description.to_string()),
        category: Some(category.to_string()),
    }
}

pub fn default_techniques() -> Vec<NewTechnique> {
    vec![
        technique(
            "box_breathing",
            "Box Breathing",
            "breathing",
            "A simple breathing technique to reduce anxiety and stress",
            240,
            &[
                "Find a comfortable position and close your eyes",
                "Breathe in slowly through your nose for 4 counts",
                "Hold your breath for 4 counts",
                "Exhale slowly through your mouth for 4 counts",
                "Hold empty for 4 counts",
                "Repeat this cycle 4-6 times",
            ],
        ),
        technique(
            "5_4_3_2_1_grounding",
            "5-4-3-2-1 Grounding",
            "grounding",
            "A grounding technique using your five senses",
            300,
            &[
                "Look around and name 5 things you can see",
                "Notice 4 things you can touch or feel",
                "Listen for 3 things you can hear",
                "Identify 2 things you can smell",
                "Think of 1 thing you can taste",
                "Take a few deep breaths and notice how you feel now",
            ],
        ),
        technique(
            "progressive_muscle_relaxation",
            "Progressive Muscle Relaxation",
            "relaxation",
            "Tense and relax different muscle groups to reduce physical tension",
            600,
            &[
                "Sit or lie down comfortably",
                "Start with your toes - tense for 5 seconds, then relax",
                "Move to your calves - tense and relax",
                "Continue with thighs, abdomen, hands, arms, shoulders",
                "Tense your face muscles, then relax",
                "Notice the difference between tension and relaxation",
                "Take a few deep breaths and enjoy the relaxed feeling",
            ],
        ),
        technique(
            "mindful_breathing",
            "Mindful Breathing",
            "mindfulness",
            "Focus on your breath to center yourself in the present moment",
            180,
            &[
                "Sit comfortably with your back straight",
                "Close your eyes or soften your gaze",
                "Notice your natural breathing rhythm",
                "Focus on the sensation of air entering and leaving your nose",
                "When your mind wanders, gently return focus to your breath",
                "Continue for a few minutes, breathing naturally",
            ],
        ),
    ]
}
