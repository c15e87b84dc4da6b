// safeaid-core/src/commands/init.rs

use anyhow::{Context, Result};
use chrono::Utc;
use once_cell::sync::OnceCell;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const ROOT_ENV: &str = "SAFEAID_ROOT";

#[derive(Debug, Clone)]
pub struct InitReport {
    pub root: PathBuf,
    pub created: Vec<String>,
    pub existed: Vec<String>,
}

// ---------- single global init gate ----------

static INIT: OnceCell<InitReport> = OnceCell::new();

/// Idempotent global initializer. Safe to call often.
/// Returns a &'static InitReport once initialization has completed.
pub fn ensure_initialized_once() -> Result<&'static InitReport> {
    INIT.get_or_try_init(ensure_initialized)
}

/// Resolve the SafeAid root. Override via SAFEAID_ROOT (tests, deployments).
pub fn safeaid_root() -> PathBuf {
    std::env::var_os(ROOT_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".safeaid"))
}

/// Ensure the default root is initialized (idempotent).
pub fn ensure_initialized() -> Result<InitReport> {
    ensure_initialized_at(&safeaid_root())
}

/// Lay out `root`: data, logbook and lexicon dirs, default config, the
/// editable lexicon template and a seeded audit logbook. Existing files are
/// left untouched.
pub fn ensure_initialized_at(root: &Path) -> Result<InitReport> {
    let root = root.to_path_buf();
    let mut created = Vec::new();
    let mut existed = Vec::new();

    ensure_dir(&root, "", &mut created, &mut existed)?;
    ensure_dir(&root, "data", &mut created, &mut existed)?;
    ensure_dir(&root, "logbook", &mut created, &mut existed)?;
    ensure_dir(&root, "lexicon", &mut created, &mut existed)?;

    ensure_file(
        &root,
        "config.toml",
        Some(DEFAULT_CONFIG_TOML),
        &mut created,
        &mut existed,
    )?;

    match crisis::write_default_lexicon(root.join("lexicon"))
        .context("writing default lexicon")?
    {
        Some(_) => created.push(format!("lexicon/{}", crisis::lexicon::DEFAULT_LEXICON_NAME)),
        None => existed.push(format!("lexicon/{}", crisis::lexicon::DEFAULT_LEXICON_NAME)),
    }

    let ts = Utc::now().to_rfc3339();
    let init_event = format!(
        r#"{{"timestamp":"{}","event":"system_init","data":{{"version":"{}"}}}}"#,
        ts,
        env!("CARGO_PKG_VERSION")
    );
    ensure_seeded_jsonl(
        &root.join("logbook"),
        "audit.jsonl",
        &init_event,
        &mut created,
        &mut existed,
    )?;

    tracing::info!(root = %root.display(), created = created.len(), "safeaid root ready");
    Ok(InitReport {
        root,
        created,
        existed,
    })
}

fn ensure_dir(
    base: &Path,
    rel: &str,
    created: &mut Vec<String>,
    existed: &mut Vec<String>,
) -> Result<()> {
    let p = if rel.is_empty() { base.to_path_buf() } else { base.join(rel) };
    let label = if rel.is_empty() { ".".to_string() } else { rel.to_string() };
    if p.exists() {
        existed.push(label);
        return Ok(());
    }
    fs::create_dir_all(&p).with_context(|| format!("create_dir_all({:?})", p))?;
    created.push(label);
    Ok(())
}

fn ensure_file(
    base: &Path,
    rel_file: &str,
    content_if_absent: Option<&str>,
    created: &mut Vec<String>,
    existed: &mut Vec<String>,
) -> Result<()> {
    let p = base.join(rel_file);
    if p.exists() {
        existed.push(rel_file.to_string());
        return Ok(());
    }
    write_atomic(&p, content_if_absent.unwrap_or("").as_bytes())?;
    created.push(rel_file.to_string());
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create_dir_all({:?})", parent))?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut f = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)
            .with_context(|| format!("open temp file {:?}", tmp))?;
        f.write_all(bytes)?;
        f.flush()?;
    }
    fs::rename(&tmp, path).with_context(|| format!("rename {:?} -> {:?}", tmp, path))?;
    Ok(())
}

fn ensure_seeded_jsonl(
    dir: &Path,
    file: &str,
    init_line: &str,
    created: &mut Vec<String>,
    existed: &mut Vec<String>,
) -> Result<()> {
    let p = dir.join(file);
    let rel = format!("logbook/{file}");
    if !p.exists() {
        write_atomic(&p, format!("{init_line}\n").as_bytes())?;
        created.push(rel);
        return Ok(());
    }
    existed.push(rel);
    // If exists but empty, seed it
    if fs::metadata(&p)?.len() == 0 {
        let mut f = OpenOptions::new().append(true).open(&p)?;
        f.write_all(init_line.as_bytes())?;
        f.write_all(b"\n")?;
    }
    Ok(())
}

// ---------- defaults ----------

const DEFAULT_CONFIG_TOML: &str = r#"[system]
name = "safeaid"

[store]
db_path = "data/safeaid.db"

[logbook]
audit_log = "logbook/audit.jsonl"

[crisis]
# Overridden by CRISIS_CONFIDENCE_THRESHOLD.
threshold = 0.8
# Uncomment to use the editable copy instead of the embedded lexicon.
# lexicon_path = "lexicon/lexicon.toml"

[provider]
# openai | openrouter | groq | gemini. Overridden by LLM_PROVIDER.
kind = "openai"
# model = "gpt-3.5-turbo"
# api_key_env = "OPENAI_API_KEY"
timeout_ms = 30000
max_attempts = 3
backoff_ms = 1000

[chat]
history_window = 10
prompt_window = 6
safe_mode_window = 8
default_country = "US"
default_locale = "en"

[seed]
on_boot = true

[audit]
mirror_jsonl = false
preview_len = 160
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;

    #[test]
    fn init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        let first = ensure_initialized_at(&root).unwrap();
        assert!(first.created.contains(&"config.toml".to_string()));
        assert!(first.created.contains(&"lexicon/lexicon.toml".to_string()));
        assert!(root.join("logbook/audit.jsonl").exists());

        let second = ensure_initialized_at(&root).unwrap();
        assert!(second.created.is_empty());
        assert!(second.existed.contains(&"config.toml".to_string()));
    }

    #[test]
    fn default_config_parses_to_defaults() {
        let cfg = CoreConfig::from_toml_str(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(cfg.crisis.threshold, 0.8);
        assert_eq!(cfg.chat.history_window, 10);
        assert!(cfg.crisis.lexicon_path.is_none());
    }

    #[test]
    fn written_lexicon_loads() {
        let dir = tempfile::tempdir().unwrap();
        ensure_initialized_at(dir.path()).unwrap();
        let lex = crisis::Lexicon::load(&dir.path().join("lexicon/lexicon.toml")).unwrap();
        assert_eq!(lex, crisis::Lexicon::default());
    }
}
