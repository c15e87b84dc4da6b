use serde::Serialize;

use crate::error::Result;
use crate::services::store::Store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub helplines_created: usize,
    pub techniques_created: usize,
}

/// Load the built-in helplines and techniques. Safe to run repeatedly.
pub fn seed_defaults(store: &Store) -> Result<SeedReport> {
    tracing::info!("seeding default data");
    let helplines_created = store.seed_default_helplines()?;
    let techniques_created = store.seed_default_techniques()?;
    tracing::info!(helplines_created, techniques_created, "seeding complete");
    Ok(SeedReport {
        helplines_created,
        techniques_created,
    })
}
