// src/commands/api.rs
use anyhow::Context;
use chrono::{DateTime, Utc};
use crisis::{CrisisScorer, CrisisVerdict, Lexicon};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use crate::commands::init::ensure_initialized_once;
use crate::config::CoreConfig;
use crate::error::Result;
use crate::services::audit::{AuditEntry, AuditTrail, Logbook};
use crate::services::chat::{ChatResponse, ChatService};
use crate::services::feedback::{self, Feedback, FeedbackReceipt};
use crate::services::helplines::{Helpline, HelplineType, NewHelpline};
use crate::services::messages::Message;
use crate::services::provider::{
    CompletionProvider, ResilientCompletion, RetryPolicy, Sleeper, ThreadSleeper,
    provider_from_config,
};
use crate::services::review::{ReviewItem, ReviewQueue, ReviewStats, ReviewStatus};
use crate::services::router::ResponseRouter;
use crate::services::seed::{SeedReport, seed_defaults};
use crate::services::sessions::{NewSession, Session, SessionStats};
use crate::services::store::Store;
use crate::services::techniques::{NewTechnique, Technique};

/// Facade over the store and the chat pipeline. Owns the one SQLite
/// connection; everything else borrows it per call.
pub struct Commands {
    config: CoreConfig,
    store: Store,
    scorer: CrisisScorer,
    completion: ResilientCompletion,
    logbook: Option<Logbook>,
    started: Instant,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub uptime_secs: u64,
    pub version: String,
    pub provider: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
    pub timestamp: DateTime<Utc>,
    pub review: ReviewStats,
    pub system: SystemInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub services: BTreeMap<&'static str, String>,
}

impl Commands {
    /// Initialize the default root (once per process) and open it.
    pub fn new() -> anyhow::Result<Self> {
        let report = ensure_initialized_once()?;
        Self::open_at(&report.root)
    }

    /// Open an already laid-out root with the provider named in its config.
    pub fn open_at(root: &Path) -> anyhow::Result<Self> {
        let config = CoreConfig::load(root)?;
        let store = Store::open(&config.store.db_path)
            .with_context(|| format!("opening store {}", config.store.db_path.display()))?;
        let provider = provider_from_config(&config.provider);
        Self::from_parts(config, store, provider, Box::new(ThreadSleeper))
    }

    /// Assemble from explicit parts. Seeds default data when `[seed] on_boot`
    /// is set; a seeding failure is logged, not fatal.
    pub fn from_parts(
        config: CoreConfig,
        store: Store,
        provider: Box<dyn CompletionProvider>,
        sleeper: Box<dyn Sleeper>,
    ) -> anyhow::Result<Self> {
        let lexicon = match &config.crisis.lexicon_path {
            Some(path) => Lexicon::load(path)
                .with_context(|| format!("loading lexicon {}", path.display()))?,
            None => Lexicon::default(),
        };
        let scorer = CrisisScorer::new(lexicon, config.crisis.threshold);
        let completion =
            ResilientCompletion::new(provider, RetryPolicy::from_config(&config.provider), sleeper);
        let logbook = config
            .audit
            .mirror_jsonl
            .then(|| Logbook::new(&config.logbook.audit_log, config.audit.preview_len));

        let cmds = Self {
            config,
            store,
            scorer,
            completion,
            logbook,
            started: Instant::now(),
        };
        if cmds.config.seed.on_boot {
            if let Err(e) = seed_defaults(&cmds.store) {
                tracing::error!(error = %e, "seeding default data failed");
            }
        }
        Ok(cmds)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn audit(&self) -> AuditTrail<'_> {
        AuditTrail::new(&self.store, self.logbook.as_ref())
    }

    // ---------- chat ----------

    /// Handle one message. Never fails: errors become a safety redirect.
    pub fn chat(&self, session_id: &str, message: &str, locale: Option<&str>) -> ChatResponse {
        let audit = self.audit();
        let review = ReviewQueue::new(&self.store, &audit);
        let router = ResponseRouter::new(
            &self.store,
            &self.store,
            &review,
            &self.completion,
            &self.config.chat,
        );
        ChatService::new(&self.store, &self.scorer, router, &review, &self.config.chat)
            .handle_message(session_id, message, locale)
    }

    /// Score without storing anything.
    pub fn score(&self, message: &str, history: &[String]) -> CrisisVerdict {
        self.scorer.score(message, Some(history))
    }

    // ---------- sessions ----------

    pub fn create_session(&self, req: NewSession) -> Result<Session> {
        self.store.create_session(req)
    }

    pub fn session(&self, id: &str) -> Result<Session> {
        self.store.find_session(id)
    }

    pub fn record_consent(&self, id: &str, consented: bool) -> Result<Session> {
        self.store.update_consent(id, consented)
    }

    pub fn start_safe_mode(&self, id: &str, minutes: u32) -> Result<Session> {
        self.store.start_safe_mode(id, minutes)
    }

    pub fn end_safe_mode(&self, id: &str) -> Result<Session> {
        self.store.end_safe_mode(id)
    }

    pub fn session_stats(&self, id: &str) -> Result<SessionStats> {
        self.store.session_stats(id)
    }

    /// Newest first.
    pub fn history(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        self.store.find_session(session_id)?;
        self.store.recent_messages(session_id, limit)
    }

    // ---------- review ----------

    pub fn review_queue(
        &self,
        status: Option<ReviewStatus>,
        assigned_to: Option<&str>,
    ) -> Result<Vec<ReviewItem>> {
        let audit = self.audit();
        ReviewQueue::new(&self.store, &audit).list(status, assigned_to)
    }

    pub fn review_item(&self, id: &str) -> Result<ReviewItem> {
        let audit = self.audit();
        ReviewQueue::new(&self.store, &audit).get(id)
    }

    pub fn assign_review(&self, id: &str, assigned_to: &str) -> Result<ReviewItem> {
        let audit = self.audit();
        ReviewQueue::new(&self.store, &audit).assign(id, assigned_to)
    }

    pub fn resolve_review(
        &self,
        id: &str,
        notes: Option<&str>,
        resolved_by: Option<&str>,
    ) -> Result<ReviewItem> {
        let audit = self.audit();
        ReviewQueue::new(&self.store, &audit).resolve(id, notes, resolved_by)
    }

    pub fn review_stats(&self) -> Result<ReviewStats> {
        let audit = self.audit();
        ReviewQueue::new(&self.store, &audit).stats()
    }

    pub fn audit_log(&self, event_type: Option<&str>, limit: usize) -> Result<Vec<AuditEntry>> {
        self.store.audit_entries(event_type, limit)
    }

    // ---------- feedback ----------

    pub fn submit_feedback(&self, feedback: &Feedback) -> Result<FeedbackReceipt> {
        let audit = self.audit();
        let review = ReviewQueue::new(&self.store, &audit);
        feedback::submit_feedback(&self.store, &audit, &review, feedback)
    }

    // ---------- helplines & techniques ----------

    pub fn helplines(
        &self,
        country: &str,
        region: Option<&str>,
        kind: Option<HelplineType>,
    ) -> Result<Vec<Helpline>> {
        self.store.find_helplines_by_country(country, region, kind)
    }

    pub fn crisis_helplines(&self, country: &str, region: Option<&str>) -> Result<Vec<Helpline>> {
        self.store.crisis_helplines(country, region)
    }

    pub fn all_helplines(&self) -> Result<Vec<Helpline>> {
        self.store.find_all_helplines()
    }

    pub fn create_helpline(&self, new: NewHelpline) -> Result<Helpline> {
        self.store.create_helpline(new)
    }

    pub fn deactivate_helpline(&self, id: &str) -> Result<Helpline> {
        self.store.deactivate_helpline(id)
    }

    pub fn techniques(&self, locale: &str) -> Result<Vec<Technique>> {
        self.store.techniques_by_locale(locale)
    }

    pub fn technique(&self, key: &str, locale: &str) -> Result<Technique> {
        self.store.technique_by_key(key, locale)
    }

    pub fn random_technique(&self, locale: &str, category: Option<&str>) -> Result<Option<Technique>> {
        self.store.random_technique_in(locale, category)
    }

    pub fn create_technique(&self, new: NewTechnique) -> Result<Technique> {
        self.store.create_technique(new)
    }

    // ---------- admin ----------

    pub fn seed(&self) -> Result<SeedReport> {
        seed_defaults(&self.store)
    }

    pub fn metrics(&self) -> Result<Metrics> {
        Ok(Metrics {
            timestamp: Utc::now(),
            review: self.review_stats()?,
            system: SystemInfo {
                uptime_secs: self.started.elapsed().as_secs(),
                version: self.config.system.version.clone(),
                provider: self.completion.provider().name().to_string(),
            },
        })
    }

    /// Check each subsystem. `status` is "healthy" unless the store is unreachable.
    pub fn health(&self) -> Health {
        let mut services = BTreeMap::new();
        let db_ok = self.store.ping().is_ok();
        services.insert(
            "database",
            if db_ok { "connected" } else { "unreachable" }.to_string(),
        );

        let provider = self.completion.provider();
        services.insert(
            "llm",
            if provider.is_configured() {
                format!("available ({})", provider.name())
            } else {
                format!("unconfigured ({}); canned fallbacks in use", provider.name())
            },
        );

        let lexicon = self.scorer.lexicon();
        services.insert(
            "crisis_detection",
            format!("active (lexicon {} v{})", lexicon.name(), lexicon.version()),
        );

        services.insert(
            "review_queue",
            match self.review_stats() {
                Ok(_) => "operational".to_string(),
                Err(e) => format!("error: {e}"),
            },
        );

        Health {
            status: if db_ok { "healthy" } else { "degraded" },
            timestamp: Utc::now(),
            services,
        }
    }
}
