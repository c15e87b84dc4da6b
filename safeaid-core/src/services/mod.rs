// src/services/mod.rs

pub mod audit;
pub mod chat;         // one message end to end
pub mod feedback;
pub mod helplines;
pub mod messages;
pub mod prompts;
pub mod provider;     // HTTP providers + retry/fallback
pub mod review;
pub mod router;       // crisis / safe mode / supportive
pub mod seed;
pub mod sessions;
pub mod store;        // the ONLY SQLite writer
pub mod techniques;

// Public API
pub use audit::{AuditSink, AuditTrail, Logbook};
pub use chat::{ChatResponse, ChatService};
pub use helplines::{Helpline, HelplineDirectory, HelplineType};
pub use provider::{CompletionProvider, ResilientCompletion, RetryPolicy, Sleeper};
pub use review::{Priority, ReviewItem, ReviewQueue, ReviewStats, ReviewStatus};
pub use router::{ResponseRouter, RoutedReply, SessionState};
pub use sessions::{Session, SessionDirectory, SessionStats};
pub use store::Store;
pub use techniques::{Technique, TechniqueCatalog};
