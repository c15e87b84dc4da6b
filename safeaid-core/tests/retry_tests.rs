mod common;

use std::time::Duration;

use common::{RecordingSleeper, ScriptedProvider};
use safeaid_core::services::prompts::PromptPair;
use safeaid_core::services::provider::{
    NORMAL_FALLBACKS, ResilientCompletion, RetryPolicy, SAFE_MODE_FALLBACKS,
};

fn prompt() -> PromptPair {
    PromptPair {
        system: "system".into(),
        user: "User: hi\n\nAssistant:".into(),
    }
}

fn wrap(provider: &ScriptedProvider, sleeper: &RecordingSleeper) -> ResilientCompletion {
    ResilientCompletion::new(
        Box::new(provider.clone()),
        RetryPolicy::default(),
        Box::new(sleeper.clone()),
    )
}

#[test]
fn first_success_needs_no_wait() {
    let provider = ScriptedProvider::replying(&["ok"]);
    let sleeper = RecordingSleeper::default();
    let out = wrap(&provider, &sleeper).complete(&prompt(), false);

    assert_eq!(out.text, "ok");
    assert_eq!(out.attempts, 1);
    assert_eq!(out.served_by, "scripted");
    assert!(!out.fell_back);
    assert!(sleeper.delays().is_empty());
}

#[test]
fn third_attempt_succeeds_after_linear_backoff() {
    let provider = ScriptedProvider::default();
    provider.push_err();
    provider.push_err();
    provider.push_ok("finally");
    let sleeper = RecordingSleeper::default();
    let out = wrap(&provider, &sleeper).complete(&prompt(), false);

    assert_eq!(out.text, "finally");
    assert_eq!(out.attempts, 3);
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
}

#[test]
fn exhausted_attempts_fall_back_without_a_final_wait() {
    let provider = ScriptedProvider::failing();
    let sleeper = RecordingSleeper::default();
    let out = wrap(&provider, &sleeper).complete(&prompt(), false);

    assert!(out.fell_back);
    assert_eq!(out.served_by, "fallback");
    assert!(NORMAL_FALLBACKS.contains(&out.text.as_str()));
    assert_eq!(provider.calls(), 3);
    assert_eq!(sleeper.delays().len(), 2);
}

#[test]
fn safe_mode_fallback_comes_from_its_own_pool() {
    let provider = ScriptedProvider::failing();
    let out = wrap(&provider, &RecordingSleeper::default()).complete(&prompt(), true);
    assert!(SAFE_MODE_FALLBACKS.contains(&out.text.as_str()));
}

#[test]
fn single_attempt_policy_never_sleeps() {
    let provider = ScriptedProvider::failing();
    let sleeper = RecordingSleeper::default();
    let completion = ResilientCompletion::new(
        Box::new(provider.clone()),
        RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(500),
        },
        Box::new(sleeper.clone()),
    );
    let out = completion.complete(&prompt(), false);
    assert!(out.fell_back);
    assert_eq!(provider.calls(), 1);
    assert!(sleeper.delays().is_empty());
}
