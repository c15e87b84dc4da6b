// src/services/provider.rs
//! Completion providers and the retry/fallback wrapper around them.
//!
//! The provider is picked once from `[provider]` config. Every call made by
//! the chat pipeline goes through [`ResilientCompletion`], which never
//! returns an error: after the last failed attempt it answers with a canned
//! supportive line.

use rand::seq::SliceRandom;
use serde::Serialize;
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;

use crate::config::{ProviderConfig, ProviderKind};
use crate::services::prompts::PromptPair;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider}: API key not configured (set {env})")]
    NotConfigured { provider: &'static str, env: String },
    #[error("{provider}: HTTP status {status}")]
    Http { provider: &'static str, status: u16 },
    #[error("{provider}: transport error ({kind})")]
    Transport { provider: &'static str, kind: &'static str },
    #[error("{provider}: malformed response ({detail})")]
    Malformed { provider: &'static str, detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

impl PromptPair {
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        vec![ChatMessage::system(&self.system), ChatMessage::user(&self.user)]
    }
}

pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, messages: &[ChatMessage]) -> Result<String, ProviderError>;
    /// False when the provider can only ever fail (e.g. no API key).
    fn is_configured(&self) -> bool {
        true
    }
}

// ---------- HTTP plumbing ----------

fn build_http_agent(timeout_ms: u32) -> ureq::Agent {
    let timeout = Duration::from_millis(u64::from(timeout_ms).max(100));
    ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .user_agent(concat!("safeaid/", env!("CARGO_PKG_VERSION")))
        .build()
}

fn post_json(
    agent: &ureq::Agent,
    provider: &'static str,
    endpoint: &str,
    bearer: Option<&str>,
    payload: &Value,
) -> Result<Value, ProviderError> {
    let mut req = agent
        .post(endpoint)
        .set("Content-Type", "application/json")
        .set("Accept", "application/json");
    if let Some(key) = bearer {
        req = req.set("Authorization", &format!("Bearer {key}"));
    }
    let response = req
        .send_json(payload.clone())
        .map_err(|e| provider_error_from_ureq(provider, e))?;
    serde_json::from_reader(response.into_reader()).map_err(|e| ProviderError::Malformed {
        provider,
        detail: format!("json_parse: {e}"),
    })
}

fn provider_error_from_ureq(provider: &'static str, err: ureq::Error) -> ProviderError {
    match err {
        ureq::Error::Status(status, _) => ProviderError::Http { provider, status },
        ureq::Error::Transport(transport) => {
            let combined = format!("{:?} {}", transport.kind(), transport);
            ProviderError::Transport {
                provider,
                kind: classify_transport_error_kind(&combined),
            }
        }
    }
}

fn classify_transport_error_kind(raw: &str) -> &'static str {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        "timeout"
    } else if lower.contains("tls") || lower.contains("ssl") {
        "tls"
    } else if lower.contains("dns") {
        "dns"
    } else if lower.contains("connection") || lower.contains("connect") {
        "connection"
    } else {
        "transport"
    }
}

// ---------- OpenAI-compatible chat completions (OpenAI, OpenRouter, Groq) ----------

pub struct OpenAiCompatible {
    name: &'static str,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
    max_tokens: u32,
    temperature: f32,
    agent: ureq::Agent,
}

impl OpenAiCompatible {
    pub fn from_config(cfg: &ProviderConfig, api_key: Option<String>) -> Self {
        Self {
            name: cfg.kind.as_str(),
            endpoint: format!("{}/chat/completions", cfg.base_url()),
            model: cfg.model().to_string(),
            api_key,
            api_key_env: cfg.api_key_env().to_string(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            agent: build_http_agent(cfg.timeout_ms),
        }
    }

    fn payload(&self, messages: &[ChatMessage]) -> Value {
        openai_payload(&self.model, messages, self.max_tokens, self.temperature)
    }
}

pub(crate) fn openai_payload(
    model: &str,
    messages: &[ChatMessage],
    max_tokens: u32,
    temperature: f32,
) -> Value {
    json!({
        "model": model,
        "messages": messages,
        "max_tokens": max_tokens,
        "temperature": temperature,
    })
}

pub(crate) fn openai_content(provider: &'static str, body: &Value) -> Result<String, ProviderError> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ProviderError::Malformed {
            provider,
            detail: "missing choices[0].message.content".into(),
        })
}

impl CompletionProvider for OpenAiCompatible {
    fn name(&self) -> &str {
        self.name
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn generate(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let key = self.api_key.as_deref().ok_or_else(|| ProviderError::NotConfigured {
            provider: self.name,
            env: self.api_key_env.clone(),
        })?;
        let body = post_json(&self.agent, self.name, &self.endpoint, Some(key), &self.payload(messages))?;
        openai_content(self.name, &body)
    }
}

// ---------- Gemini generateContent ----------

pub struct Gemini {
    base_url: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
    agent: ureq::Agent,
}

impl Gemini {
    pub fn from_config(cfg: &ProviderConfig, api_key: Option<String>) -> Self {
        Self {
            base_url: cfg.base_url().to_string(),
            model: cfg.model().to_string(),
            api_key,
            api_key_env: cfg.api_key_env().to_string(),
            agent: build_http_agent(cfg.timeout_ms),
        }
    }
}

/// Gemini takes a single text part: system text, blank line, user text.
pub(crate) fn gemini_payload(messages: &[ChatMessage]) -> Value {
    let text = messages
        .iter()
        .map(|m| m.content.as_str())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    json!({ "contents": [{ "parts": [{ "text": text }] }] })
}

pub(crate) fn gemini_content(body: &Value) -> Result<String, ProviderError> {
    body.pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ProviderError::Malformed {
            provider: "gemini",
            detail: "missing candidates[0].content.parts[0].text".into(),
        })
}

impl CompletionProvider for Gemini {
    fn name(&self) -> &str {
        "gemini"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn generate(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let key = self.api_key.as_deref().ok_or_else(|| ProviderError::NotConfigured {
            provider: "gemini",
            env: self.api_key_env.clone(),
        })?;
        let endpoint = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, key
        );
        let body = post_json(&self.agent, "gemini", &endpoint, None, &gemini_payload(messages))?;
        gemini_content(&body)
    }
}

/// Build the configured provider. The API key is read once, here, from the
/// env var named in config; a missing key yields a provider whose every call
/// fails with `NotConfigured` so the fallback path takes over.
pub fn provider_from_config(cfg: &ProviderConfig) -> Box<dyn CompletionProvider> {
    let api_key = std::env::var(cfg.api_key_env())
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty());
    if api_key.is_none() {
        tracing::warn!(
            provider = cfg.kind.as_str(),
            env = cfg.api_key_env(),
            "no API key configured; replies will use canned fallbacks"
        );
    }
    match cfg.kind {
        ProviderKind::Gemini => Box::new(Gemini::from_config(cfg, api_key)),
        ProviderKind::OpenAi | ProviderKind::OpenRouter | ProviderKind::Groq => {
            Box::new(OpenAiCompatible::from_config(cfg, api_key))
        }
    }
}

// ---------- retry + fallback ----------

pub trait Sleeper: Send + Sync {
    fn sleep(&self, d: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait after attempt `n` is `n × base_delay`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1_000),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &ProviderConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay: Duration::from_millis(cfg.backoff_ms),
        }
    }
}

pub const NORMAL_FALLBACKS: &[&str] = &[
    "I understand you're going through a difficult time. Sometimes it helps to take a few deep breaths. Would you like me to guide you through a simple breathing exercise?",
    "Thank you for sharing that with me. It sounds like a lot to carry. Would it help to try a short grounding exercise together?",
    "I'm here with you. If it feels right, we could slow things down with a few calm breaths and then talk about what's on your mind.",
];

pub const SAFE_MODE_FALLBACKS: &[&str] = &[
    "I'm here and I'm listening. Take your time; there's no rush.",
    "It sounds like you're carrying a lot right now. Would you like to tell me more about how you're feeling?",
    "Thank you for trusting me with this. What feels most important to talk about right now?",
];

pub fn fallback_reply(safe_mode: bool) -> &'static str {
    let pool = if safe_mode { SAFE_MODE_FALLBACKS } else { NORMAL_FALLBACKS };
    pool.choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(NORMAL_FALLBACKS[0])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub text: String,
    pub attempts: u32,
    pub served_by: String,
    /// True when every attempt failed and `text` is a canned line.
    pub fell_back: bool,
}

pub struct ResilientCompletion {
    provider: Box<dyn CompletionProvider>,
    policy: RetryPolicy,
    sleeper: Box<dyn Sleeper>,
}

impl ResilientCompletion {
    pub fn new(provider: Box<dyn CompletionProvider>, policy: RetryPolicy, sleeper: Box<dyn Sleeper>) -> Self {
        Self {
            provider,
            policy,
            sleeper,
        }
    }

    pub fn provider(&self) -> &dyn CompletionProvider {
        self.provider.as_ref()
    }

    pub fn complete(&self, prompt: &PromptPair, safe_mode: bool) -> Completion {
        let messages = prompt.to_messages();
        let max = self.policy.max_attempts.max(1);
        for attempt in 1..=max {
            match self.provider.generate(&messages) {
                Ok(text) => {
                    return Completion {
                        text,
                        attempts: attempt,
                        served_by: self.provider.name().to_string(),
                        fell_back: false,
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        provider = self.provider.name(),
                        attempt,
                        error = %e,
                        "completion attempt failed"
                    );
                    if attempt < max {
                        self.sleeper.sleep(self.policy.base_delay * attempt);
                    }
                }
            }
        }
        Completion {
            text: fallback_reply(safe_mode).to_string(),
            attempts: max,
            served_by: "fallback".to_string(),
            fell_back: true,
        }
    }
}
