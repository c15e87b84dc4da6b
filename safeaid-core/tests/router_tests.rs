mod common;

use common::{RecordingSleeper, ScriptedProvider};
use crisis::{CrisisScorer, CrisisVerdict};
use safeaid_core::CoreError;
use safeaid_core::config::ChatConfig;
use safeaid_core::services::audit::AuditTrail;
use safeaid_core::services::helplines::{Helpline, HelplineDirectory, HelplineType};
use safeaid_core::services::prompts::{BREATHING_OFFER, CONSENT_REQUIRED};
use safeaid_core::services::provider::{ResilientCompletion, RetryPolicy};
use safeaid_core::services::review::ReviewQueue;
use safeaid_core::services::router::{ResponseRouter, SessionState, Strategy};
use safeaid_core::services::store::Store;
use safeaid_core::services::techniques::{Technique, TechniqueCatalog};
use serde_json::json;

struct OneLine;

impl HelplineDirectory for OneLine {
    fn find_crisis_helplines(&self, country_code: &str) -> safeaid_core::Result<Vec<Helpline>> {
        Ok(vec![Helpline {
            id: "h-1".into(),
            country: country_code.into(),
            region: None,
            description: "Test Lifeline".into(),
            phone: "000".into(),
            kind: HelplineType::Suicide,
            priority: 1,
            metadata: json!({}),
            active: true,
        }])
    }
}

struct NoDirectory;

impl HelplineDirectory for NoDirectory {
    fn find_crisis_helplines(&self, _country_code: &str) -> safeaid_core::Result<Vec<Helpline>> {
        Err(CoreError::Validation("directory offline".into()))
    }
}

struct Catalog(Vec<Technique>);

impl TechniqueCatalog for Catalog {
    fn find_by_locale(&self, locale: &str) -> safeaid_core::Result<Vec<Technique>> {
        Ok(self.0.iter().filter(|t| t.locale == locale).cloned().collect())
    }

    fn random_technique(&self, locale: &str) -> safeaid_core::Result<Option<Technique>> {
        Ok(self.find_by_locale(locale)?.into_iter().next())
    }
}

struct BrokenCatalog;

impl TechniqueCatalog for BrokenCatalog {
    fn find_by_locale(&self, _locale: &str) -> safeaid_core::Result<Vec<Technique>> {
        Err(CoreError::Validation("catalog offline".into()))
    }

    fn random_technique(&self, _locale: &str) -> safeaid_core::Result<Option<Technique>> {
        Err(CoreError::Validation("catalog offline".into()))
    }
}

fn breathing() -> Technique {
    Technique {
        id: "t-1".into(),
        key: "box_breathing".into(),
        title: "Box Breathing".into(),
        locale: "en".into(),
        steps: vec!["Breathe in for 4".into()],
        duration_seconds: 60,
        active: true,
        description: Some("Square breathing".into()),
        category: Some("breathing".into()),
    }
}

fn state(consented: bool, safe_mode: bool) -> SessionState {
    SessionState {
        session_id: "s-1".into(),
        consented,
        safe_mode,
        country: "US".into(),
        locale: "en".into(),
    }
}

fn completion(provider: &ScriptedProvider) -> ResilientCompletion {
    ResilientCompletion::new(
        Box::new(provider.clone()),
        RetryPolicy::default(),
        Box::new(RecordingSleeper::default()),
    )
}

#[test]
fn missing_consent_short_circuits() -> anyhow::Result<()> {
    let store = Store::open_in_memory()?;
    let audit = AuditTrail::new(&store, None);
    let review = ReviewQueue::new(&store, &audit);
    let provider = ScriptedProvider::replying(&["unused"]);
    let completion = completion(&provider);
    let catalog = Catalog(vec![breathing()]);
    let chat = ChatConfig::default();
    let router = ResponseRouter::new(&OneLine, &catalog, &review, &completion, &chat);

    let verdict = CrisisScorer::default().score("I want to die", None);
    let reply = router.route(&verdict, &state(false, false), "I want to die", &[])?;
    assert_eq!(reply.reply_text, CONSENT_REQUIRED);
    assert_eq!(reply.strategy, Strategy::ConsentRequired);
    assert!(review.list(None, None)?.is_empty());
    assert_eq!(provider.calls(), 0);
    Ok(())
}

#[test]
fn crisis_route_lists_directory_lines_and_queues_review() -> anyhow::Result<()> {
    let store = Store::open_in_memory()?;
    let audit = AuditTrail::new(&store, None);
    let review = ReviewQueue::new(&store, &audit);
    let provider = ScriptedProvider::replying(&["unused"]);
    let completion = completion(&provider);
    let catalog = Catalog(vec![breathing()]);
    let chat = ChatConfig::default();
    let router = ResponseRouter::new(&OneLine, &catalog, &review, &completion, &chat);

    let reply = router.route(&CrisisVerdict::user_reported(), &state(true, true), "help", &[])?;
    assert_eq!(reply.strategy, Strategy::Crisis);
    assert!(reply.is_crisis);
    assert!(reply.reply_text.contains("1. Test Lifeline: 000"));
    assert_eq!(reply.served_by, "fixed");
    let review_id = reply.review_id.expect("review queued");
    assert_eq!(review.get(&review_id)?.crisis_level, 3);
    assert_eq!(provider.calls(), 0);
    Ok(())
}

#[test]
fn supportive_route_offers_a_technique() -> anyhow::Result<()> {
    let store = Store::open_in_memory()?;
    let audit = AuditTrail::new(&store, None);
    let review = ReviewQueue::new(&store, &audit);
    let provider = ScriptedProvider::replying(&["  Let's breathe together.  "]);
    let completion = completion(&provider);
    let catalog = Catalog(vec![breathing()]);
    let chat = ChatConfig::default();
    let router = ResponseRouter::new(&OneLine, &catalog, &review, &completion, &chat);

    let reply = router.route(&CrisisVerdict::default(), &state(true, false), "hi", &[])?;
    assert_eq!(reply.strategy, Strategy::Supportive);
    assert_eq!(reply.reply_text, "Let's breathe together.");
    assert_eq!(reply.techniques, vec![breathing()]);
    assert_eq!(reply.served_by, "scripted");
    let system = provider.last_system_prompt().expect("provider called");
    assert!(system.contains("- Box Breathing: Square breathing"));
    Ok(())
}

#[test]
fn catalog_failure_offers_breathing_without_calling_the_provider() -> anyhow::Result<()> {
    let store = Store::open_in_memory()?;
    let audit = AuditTrail::new(&store, None);
    let review = ReviewQueue::new(&store, &audit);
    let provider = ScriptedProvider::replying(&["unused"]);
    let completion = completion(&provider);
    let chat = ChatConfig::default();
    let router = ResponseRouter::new(&OneLine, &BrokenCatalog, &review, &completion, &chat);

    let reply = router.route(&CrisisVerdict::default(), &state(true, false), "hi", &[])?;
    assert_eq!(reply.reply_text, BREATHING_OFFER);
    assert!(reply.techniques.is_empty());
    assert_eq!(provider.calls(), 0);
    Ok(())
}

#[test]
fn harmful_reply_is_swapped_for_the_redirect() -> anyhow::Result<()> {
    let store = Store::open_in_memory()?;
    let audit = AuditTrail::new(&store, None);
    let review = ReviewQueue::new(&store, &audit);
    let provider = ScriptedProvider::replying(&["Nobody should die alone."]);
    let completion = completion(&provider);
    let catalog = Catalog(Vec::new());
    let chat = ChatConfig::default();
    let router = ResponseRouter::new(&OneLine, &catalog, &review, &completion, &chat);

    let reply = router.route(&CrisisVerdict::default(), &state(true, true), "hi", &[])?;
    assert_eq!(reply.strategy, Strategy::SafeMode);
    assert_eq!(reply.reply_text, crisis::PROFESSIONAL_REDIRECT);
    Ok(())
}

#[test]
fn helpline_outage_still_queues_review_and_gives_emergency_text() -> anyhow::Result<()> {
    let store = Store::open_in_memory()?;
    let audit = AuditTrail::new(&store, None);
    let review = ReviewQueue::new(&store, &audit);
    let provider = ScriptedProvider::replying(&["unused"]);
    let completion = completion(&provider);
    let catalog = Catalog(Vec::new());
    let chat = ChatConfig::default();
    let router = ResponseRouter::new(&NoDirectory, &catalog, &review, &completion, &chat);

    let verdict = CrisisScorer::default().score("I want to kill myself", None);
    let reply = router.route(&verdict, &state(true, false), "I want to kill myself", &[])?;
    assert!(reply.is_crisis);
    assert!(reply.helplines.is_empty());
    assert!(reply.reply_text.contains("emergency room immediately"));
    assert!(reply.review_id.is_some());
    assert_eq!(review.list(None, None)?.len(), 1);
    assert_eq!(provider.calls(), 0);
    Ok(())
}
