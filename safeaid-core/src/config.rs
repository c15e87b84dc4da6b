use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const THRESHOLD_ENV: &str = "CRISIS_CONFIDENCE_THRESHOLD";
pub const PROVIDER_ENV: &str = "LLM_PROVIDER";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logbook: LogbookConfig,
    #[serde(default)]
    pub crisis: CrisisConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub seed: SeedConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

impl CoreConfig {
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join("config.toml");
        let mut cfg = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            Self::from_toml_str(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?
        } else {
            tracing::info!(
                "No config file found at {}. Using CoreConfig::default().",
                path.display()
            );
            CoreConfig::default()
        };
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        cfg.resolve_paths(root);
        Ok(cfg)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str::<CoreConfig>(text)?)
    }

    /// Apply `CRISIS_CONFIDENCE_THRESHOLD` and `LLM_PROVIDER` from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(THRESHOLD_ENV) {
            let threshold: f64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{THRESHOLD_ENV}={raw:?} is not a number"))?;
            if !(0.0..=1.0).contains(&threshold) {
                anyhow::bail!("{THRESHOLD_ENV} must be within 0.0..=1.0, got {threshold}");
            }
            self.crisis.threshold = threshold;
        }
        if let Some(raw) = lookup(PROVIDER_ENV) {
            let kind = ProviderKind::from_str(&raw)?;
            if kind != self.provider.kind {
                // Per-provider defaults follow the new kind unless set explicitly.
                self.provider = ProviderConfig {
                    kind,
                    model: None,
                    api_key_env: None,
                    base_url: None,
                    ..self.provider.clone()
                };
            }
        }
        Ok(())
    }

    fn resolve_paths(&mut self, root: &Path) {
        self.store.db_path = absolutize(root, &self.store.db_path);
        self.logbook.audit_log = absolutize(root, &self.logbook.audit_log);
        if let Some(p) = self.crisis.lexicon_path.take() {
            self.crisis.lexicon_path = Some(absolutize(root, &p));
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "SystemConfig::default_name")]
    pub name: String,
    #[serde(default = "SystemConfig::default_version")]
    pub version: String,
}

impl SystemConfig {
    fn default_name() -> String {
        "safeaid".to_string()
    }

    fn default_version() -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            version: Self::default_version(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "StoreConfig::default_db_path")]
    pub db_path: PathBuf,
}

impl StoreConfig {
    fn default_db_path() -> PathBuf {
        PathBuf::from("data/safeaid.db")
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: Self::default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogbookConfig {
    #[serde(default = "LogbookConfig::default_audit_log")]
    pub audit_log: PathBuf,
}

impl LogbookConfig {
    fn default_audit_log() -> PathBuf {
        PathBuf::from("logbook/audit.jsonl")
    }
}

impl Default for LogbookConfig {
    fn default() -> Self {
        Self {
            audit_log: Self::default_audit_log(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrisisConfig {
    #[serde(default = "CrisisConfig::default_threshold")]
    pub threshold: f64,
    /// Custom lexicon file; the embedded default is used when unset.
    #[serde(default)]
    pub lexicon_path: Option<PathBuf>,
}

impl CrisisConfig {
    fn default_threshold() -> f64 {
        crisis::DEFAULT_CRISIS_THRESHOLD
    }
}

impl Default for CrisisConfig {
    fn default() -> Self {
        Self {
            threshold: Self::default_threshold(),
            lexicon_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    OpenRouter,
    Groq,
    Gemini,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::Groq => "groq",
            ProviderKind::Gemini => "gemini",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-3.5-turbo",
            ProviderKind::OpenRouter => "anthropic/claude-3-haiku",
            ProviderKind::Groq => "llama3-8b-8192",
            ProviderKind::Gemini => "gemini-pro",
        }
    }

    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::OpenRouter => "OPENROUTER_API_KEY",
            ProviderKind::Groq => "GROQ_API_KEY",
            ProviderKind::Gemini => "GEMINI_API_KEY",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
            ProviderKind::Groq => "https://api.groq.com/openai/v1",
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "openrouter" => Ok(ProviderKind::OpenRouter),
            "groq" => Ok(ProviderKind::Groq),
            "gemini" => Ok(ProviderKind::Gemini),
            other => anyhow::bail!("unknown provider {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,
    #[serde(default)]
    pub model: Option<String>,
    /// Name of the env var holding the API key, never the key itself.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "ProviderConfig::default_timeout_ms")]
    pub timeout_ms: u32,
    #[serde(default = "ProviderConfig::default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "ProviderConfig::default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "ProviderConfig::default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "ProviderConfig::default_temperature")]
    pub temperature: f32,
}

impl ProviderConfig {
    fn default_timeout_ms() -> u32 {
        30_000
    }

    fn default_max_attempts() -> u32 {
        3
    }

    fn default_backoff_ms() -> u64 {
        1_000
    }

    fn default_max_tokens() -> u32 {
        500
    }

    fn default_temperature() -> f32 {
        0.7
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(self.kind.default_model())
    }

    pub fn api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or(self.kind.default_api_key_env())
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or(self.kind.default_base_url())
            .trim_end_matches('/')
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            model: None,
            api_key_env: None,
            base_url: None,
            timeout_ms: Self::default_timeout_ms(),
            max_attempts: Self::default_max_attempts(),
            backoff_ms: Self::default_backoff_ms(),
            max_tokens: Self::default_max_tokens(),
            temperature: Self::default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Messages loaded (newest first) for scoring and prompts.
    #[serde(default = "ChatConfig::default_history_window")]
    pub history_window: usize,
    #[serde(default = "ChatConfig::default_prompt_window")]
    pub prompt_window: usize,
    #[serde(default = "ChatConfig::default_safe_mode_window")]
    pub safe_mode_window: usize,
    #[serde(default = "ChatConfig::default_country")]
    pub default_country: String,
    #[serde(default = "ChatConfig::default_locale")]
    pub default_locale: String,
}

impl ChatConfig {
    fn default_history_window() -> usize {
        10
    }

    fn default_prompt_window() -> usize {
        6
    }

    fn default_safe_mode_window() -> usize {
        8
    }

    fn default_country() -> String {
        "US".to_string()
    }

    fn default_locale() -> String {
        "en".to_string()
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_window: Self::default_history_window(),
            prompt_window: Self::default_prompt_window(),
            safe_mode_window: Self::default_safe_mode_window(),
            default_country: Self::default_country(),
            default_locale: Self::default_locale(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    #[serde(default = "SeedConfig::default_true")]
    pub on_boot: bool,
}

impl SeedConfig {
    fn default_true() -> bool {
        true
    }
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self { on_boot: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Mirror every audit event into the JSONL logbook as well.
    #[serde(default)]
    pub mirror_jsonl: bool,
    #[serde(default = "AuditConfig::default_preview_len")]
    pub preview_len: usize,
}

impl AuditConfig {
    fn default_preview_len() -> usize {
        160
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            mirror_jsonl: false,
            preview_len: Self::default_preview_len(),
        }
    }
}

fn absolutize(root: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        root.join(value)
    }
}
