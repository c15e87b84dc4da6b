use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::normalize::for_matching;

/// === Embedded default lexicon ===
pub const DEFAULT_LEXICON_NAME: &str = "lexicon.toml";
pub const DEFAULT_LEXICON_TOML: &str = include_str!("../assets/lexicon.toml");

// Same phrases as the embedded file; kept as consts so `Default` cannot fail.

const CRISIS_PHRASES: &[&str] = &[
    "kill myself",
    "want to die",
    "suicide plan",
    "end my life",
    "i will end it",
    "going to kill myself",
    "want to hurt myself",
    "going to overdose",
    "feel like ending it",
    "no reason to live",
    "i will jump",
    "planning to die",
    "ready to die",
    "suicide",
    "kill me",
    "end it all",
];

const CONCERN_PHRASES: &[&str] = &[
    "depressed",
    "hopeless",
    "worthless",
    "can't go on",
    "give up",
    "nothing matters",
    "tired of living",
    "better off dead",
    "burden",
    "hate myself",
    "want to disappear",
    "can't take it",
    "overwhelming",
];

#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("reading lexicon {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing lexicon: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("serializing lexicon: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("lexicon `{0}` has no crisis-tier phrases")]
    EmptyCrisisTier(String),
}

/// Severity tier a phrase belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Explicit self-harm intent.
    Crisis,
    /// Distress short of explicit crisis language.
    Concern,
}

/// On-disk shape of a lexicon file.
#[derive(Debug, Deserialize, Serialize)]
struct LexiconFile {
    name: String,
    version: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    crisis: Vec<String>,
    #[serde(default)]
    concern: Vec<String>,
}

/// Two-tier phrase list used for substring matching.
///
/// Phrases are stored normalized (trimmed, lowercased), empty entries are
/// dropped and duplicates collapse onto their first occurrence, so a match
/// list never repeats a phrase.
#[derive(Debug, Clone, PartialEq)]
pub struct Lexicon {
    name: String,
    version: String,
    crisis: Vec<String>,
    concern: Vec<String>,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::from_parts(
            "default",
            "1.0.0",
            CRISIS_PHRASES.iter().copied(),
            CONCERN_PHRASES.iter().copied(),
        )
    }
}

impl Lexicon {
    pub fn from_parts<'a>(
        name: &str,
        version: &str,
        crisis: impl IntoIterator<Item = &'a str>,
        concern: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            crisis: dedup_normalized(crisis),
            concern: dedup_normalized(concern),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, LexiconError> {
        let file: LexiconFile = toml::from_str(text)?;
        let lexicon = Self::from_parts(
            &file.name,
            &file.version,
            file.crisis.iter().map(String::as_str),
            file.concern.iter().map(String::as_str),
        );
        if lexicon.crisis.is_empty() {
            return Err(LexiconError::EmptyCrisisTier(lexicon.name));
        }
        Ok(lexicon)
    }

    pub fn load(path: &Path) -> Result<Self, LexiconError> {
        let text = fs::read_to_string(path).map_err(|source| LexiconError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, LexiconError> {
        let file = LexiconFile {
            name: self.name.clone(),
            version: self.version.clone(),
            description: Some("Crisis and concern phrases matched as lowercase substrings.".into()),
            crisis: self.crisis.clone(),
            concern: self.concern.clone(),
        };
        Ok(toml::to_string_pretty(&file)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn phrases(&self, tier: Tier) -> &[String] {
        match tier {
            Tier::Crisis => &self.crisis,
            Tier::Concern => &self.concern,
        }
    }

    /// Phrases of `tier` found in `normalized` (already passed through
    /// [`for_matching`]), in lexicon order.
    pub fn matches(&self, tier: Tier, normalized: &str) -> Vec<String> {
        self.phrases(tier)
            .iter()
            .filter(|p| normalized.contains(p.as_str()))
            .cloned()
            .collect()
    }

    pub fn count(&self, tier: Tier, normalized: &str) -> usize {
        self.phrases(tier)
            .iter()
            .filter(|p| normalized.contains(p.as_str()))
            .count()
    }
}

fn dedup_normalized<'a>(phrases: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for p in phrases {
        let n = for_matching(p);
        if !n.is_empty() && !out.contains(&n) {
            out.push(n);
        }
    }
    out
}

/// Seed the default lexicon into `dir` when missing (idempotent).
/// Returns the path when a file was created.
pub fn write_default_lexicon(dir: impl AsRef<Path>) -> Result<Option<PathBuf>, LexiconError> {
    let dir = dir.as_ref();
    let path = dir.join(DEFAULT_LEXICON_NAME);
    if path.exists() {
        return Ok(None);
    }
    let io_err = |source| LexiconError::Io {
        path: path.clone(),
        source,
    };
    fs::create_dir_all(dir).map_err(io_err)?;
    fs::write(&path, DEFAULT_LEXICON_TOML).map_err(io_err)?;
    Ok(Some(path))
}
