#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use safeaid_core::commands::Commands;
use safeaid_core::config::CoreConfig;
use safeaid_core::services::provider::{ChatMessage, CompletionProvider, ProviderError, Sleeper};
use safeaid_core::services::sessions::{NewSession, Session};
use safeaid_core::services::store::Store;
use serde_json::{Map, Value};

/// Replays queued outcomes in order; once empty every call fails.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    script: Arc<Mutex<VecDeque<Result<String, ProviderError>>>>,
    pub seen: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl ScriptedProvider {
    pub fn replying(lines: &[&str]) -> Self {
        let p = Self::default();
        for l in lines {
            p.push_ok(l);
        }
        p
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, text: &str) {
        self.script.lock().unwrap().push_back(Ok(text.to_string()));
    }

    pub fn push_err(&self) {
        self.script.lock().unwrap().push_back(Err(ProviderError::Http {
            provider: "scripted",
            status: 503,
        }));
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn last_system_prompt(&self) -> Option<String> {
        self.seen
            .lock()
            .unwrap()
            .last()
            .and_then(|msgs| msgs.iter().find(|m| m.role == "system"))
            .map(|m| m.content.clone())
    }
}

impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ProviderError::Transport {
                provider: "scripted",
                kind: "connect",
            }))
    }
}

#[derive(Clone, Default)]
pub struct RecordingSleeper {
    pub slept: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, d: Duration) {
        self.slept.lock().unwrap().push(d);
    }
}

/// In-memory facade with seeded defaults and the given provider.
pub fn commands(provider: &ScriptedProvider, sleeper: &RecordingSleeper) -> Commands {
    Commands::from_parts(
        CoreConfig::default(),
        Store::open_in_memory().expect("in-memory store"),
        Box::new(provider.clone()),
        Box::new(sleeper.clone()),
    )
    .expect("commands")
}

pub fn consented_session(cmds: &Commands, country: Option<&str>) -> Session {
    let mut metadata = Map::new();
    if let Some(c) = country {
        metadata.insert("ip_country".into(), Value::String(c.into()));
    }
    let s = cmds
        .create_session(NewSession {
            metadata,
            ..Default::default()
        })
        .expect("session");
    cmds.record_consent(&s.id, true).expect("consent")
}
