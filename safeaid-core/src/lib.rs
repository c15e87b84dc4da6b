//! SafeAid core: crisis-aware chat pipeline over a single SQLite store.
//!
//! `commands::Commands` is the entry point; `services` holds the store and the
//! pieces the chat pipeline is assembled from.

pub mod commands;
pub mod config;
pub mod error;
pub mod services;
pub mod utils;

pub use commands::{Commands, InitReport, ensure_initialized_once};
pub use config::CoreConfig;
pub use error::{CoreError, Result};
