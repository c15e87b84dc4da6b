use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use safeaid_core::commands::{Commands, ensure_initialized_at};
use safeaid_core::services::feedback::{Feedback, FeedbackKind};
use safeaid_core::services::helplines::HelplineType;
use safeaid_core::services::review::ReviewStatus;
use safeaid_core::services::sessions::NewSession;
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "safeaid-admin", about = "Operator tools for a SafeAid store")]
struct Cli {
    /// Root directory (config.toml, data/, logbook/). Defaults to $SAFEAID_ROOT or .safeaid
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Lay out the root directory and print what was created
    Init,
    /// Insert the built-in helplines and techniques that are missing
    Seed,
    #[command(subcommand)]
    Session(SessionCmd),
    /// Send one message through the full chat pipeline
    Chat {
        #[arg(long)]
        session: String,
        #[arg(long)]
        locale: Option<String>,
        message: String,
    },
    /// Score a message without storing anything
    Score {
        /// Earlier messages, newest first
        #[arg(long = "history")]
        history: Vec<String>,
        message: String,
    },
    #[command(subcommand)]
    Review(ReviewCmd),
    /// Record feedback on a session or message
    Feedback {
        #[arg(long)]
        session: String,
        /// helpful | not_helpful | inappropriate | crisis_missed | other
        #[arg(long)]
        kind: String,
        #[arg(long)]
        message_id: Option<String>,
        #[arg(long)]
        comment: Option<String>,
        #[arg(long)]
        rating: Option<u8>,
    },
    /// List helplines for a country, or every active line with --all
    Helplines {
        #[arg(long, default_value = "US")]
        country: String,
        #[arg(long)]
        region: Option<String>,
        #[arg(long)]
        kind: Option<String>,
        /// Emergency and suicide lines only
        #[arg(long)]
        crisis: bool,
        #[arg(long, conflicts_with_all = ["region", "kind", "crisis"])]
        all: bool,
    },
    /// List techniques for a locale, or show one by key
    Techniques {
        #[arg(long, default_value = "en")]
        locale: String,
        #[arg(long)]
        key: Option<String>,
    },
    #[command(subcommand)]
    Lexicon(LexiconCmd),
    /// Recent audit entries, newest first
    Audit {
        #[arg(long)]
        event: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    Metrics,
    Health,
}

#[derive(Subcommand)]
enum SessionCmd {
    Create {
        #[arg(long)]
        locale: Option<String>,
        #[arg(long)]
        age_range: Option<String>,
        /// ISO-2 country used for helpline lookup
        #[arg(long)]
        country: Option<String>,
    },
    Consent {
        id: String,
        #[arg(long)]
        revoke: bool,
    },
    SafeMode {
        id: String,
        #[arg(long, default_value_t = 15)]
        minutes: u32,
    },
    EndSafeMode {
        id: String,
    },
    Stats {
        id: String,
    },
    History {
        id: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum ReviewCmd {
    List {
        /// pending | reviewing | resolved
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        assigned_to: Option<String>,
    },
    Show {
        id: String,
    },
    Assign {
        id: String,
        #[arg(long)]
        to: String,
    },
    Resolve {
        id: String,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        by: Option<String>,
    },
    Stats,
}

#[derive(Subcommand)]
enum LexiconCmd {
    /// Print the lexicon in use
    Show,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Init => init(cli.root),
        cmd => run(&open(cli.root.as_deref())?, cmd),
    }
}

fn init(root: Option<PathBuf>) -> Result<()> {
    let root = root.unwrap_or_else(safeaid_core::commands::init::safeaid_root);
    let report = ensure_initialized_at(&root)?;
    print_json(&serde_json::json!({
        "root": report.root,
        "created": report.created,
        "existed": report.existed,
    }))
}

fn run(cmds: &Commands, cmd: Cmd) -> Result<()> {
    match cmd {
        Cmd::Init => init(None),
        Cmd::Seed => print_json(&cmds.seed()?),
        Cmd::Session(cmd) => session(cmds, cmd),
        Cmd::Chat {
            session,
            locale,
            message,
        } => print_json(&cmds.chat(&session, &message, locale.as_deref())),
        Cmd::Score { history, message } => print_json(&cmds.score(&message, &history)),
        Cmd::Review(cmd) => review(cmds, cmd),
        Cmd::Feedback {
            session,
            kind,
            message_id,
            comment,
            rating,
        } => {
            let feedback = Feedback {
                session_id: session,
                message_id,
                kind: kind.parse::<FeedbackKind>()?,
                comment,
                rating,
            };
            print_json(&cmds.submit_feedback(&feedback)?)
        }
        Cmd::Helplines {
            country,
            region,
            kind,
            crisis,
            all,
        } => {
            let lines = if all {
                cmds.all_helplines()?
            } else if crisis {
                cmds.crisis_helplines(&country, region.as_deref())?
            } else {
                let kind = kind.map(|k| k.parse::<HelplineType>()).transpose()?;
                cmds.helplines(&country, region.as_deref(), kind)?
            };
            print_json(&lines)
        }
        Cmd::Techniques { locale, key } => match key {
            Some(key) => print_json(&cmds.technique(&key, &locale)?),
            None => print_json(&cmds.techniques(&locale)?),
        },
        Cmd::Lexicon(LexiconCmd::Show) => {
            let text = lexicon_toml(cmds)?;
            print!("{text}");
            Ok(())
        }
        Cmd::Audit { event, limit } => print_json(&cmds.audit_log(event.as_deref(), limit)?),
        Cmd::Metrics => print_json(&cmds.metrics()?),
        Cmd::Health => print_json(&cmds.health()),
    }
}

fn open(root: Option<&std::path::Path>) -> Result<Commands> {
    match root {
        Some(root) => {
            ensure_initialized_at(root)?;
            Commands::open_at(root)
        }
        None => Commands::new(),
    }
}

fn session(cmds: &Commands, cmd: SessionCmd) -> Result<()> {
    match cmd {
        SessionCmd::Create {
            locale,
            age_range,
            country,
        } => {
            let mut metadata = serde_json::Map::new();
            if let Some(c) = country {
                metadata.insert("ip_country".into(), Value::String(c));
            }
            print_json(&cmds.create_session(NewSession {
                locale,
                age_range,
                metadata,
            })?)
        }
        SessionCmd::Consent { id, revoke } => print_json(&cmds.record_consent(&id, !revoke)?),
        SessionCmd::SafeMode { id, minutes } => print_json(&cmds.start_safe_mode(&id, minutes)?),
        SessionCmd::EndSafeMode { id } => print_json(&cmds.end_safe_mode(&id)?),
        SessionCmd::Stats { id } => print_json(&cmds.session_stats(&id)?),
        SessionCmd::History { id, limit } => print_json(&cmds.history(&id, limit)?),
    }
}

fn review(cmds: &Commands, cmd: ReviewCmd) -> Result<()> {
    match cmd {
        ReviewCmd::List {
            status,
            assigned_to,
        } => {
            let status = status.map(|s| s.parse::<ReviewStatus>()).transpose()?;
            print_json(&cmds.review_queue(status, assigned_to.as_deref())?)
        }
        ReviewCmd::Show { id } => print_json(&cmds.review_item(&id)?),
        ReviewCmd::Assign { id, to } => print_json(&cmds.assign_review(&id, &to)?),
        ReviewCmd::Resolve { id, notes, by } => {
            print_json(&cmds.resolve_review(&id, notes.as_deref(), by.as_deref())?)
        }
        ReviewCmd::Stats => print_json(&cmds.review_stats()?),
    }
}

fn lexicon_toml(cmds: &Commands) -> Result<String> {
    match &cmds.config().crisis.lexicon_path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading lexicon {}", path.display())),
        None => Ok(crisis::lexicon::DEFAULT_LEXICON_TOML.to_string()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
