//! Fixture import: load grant records and preference profiles from JSON.
//!
//! Both commands expect a JSON array in the camelCase wire shape used by
//! the HTTP API and upsert by primary key, so re-importing the same file
//! never creates duplicates.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

use grant_finder_core::models::{GrantRecord, PreferenceProfile};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteGrantStore;

/// `gf import grants <file>`
pub async fn run_import_grants(config: &Config, path: &Path) -> Result<()> {
    let grants: Vec<GrantRecord> = read_json_array(path)?;
    if let Some(i) = grants.iter().position(|g| g.id.trim().is_empty()) {
        bail!("Grant at index {} has an empty id", i);
    }

    let pool = db::connect(config).await?;
    let store = SqliteGrantStore::new(pool);
    let n = store.upsert_grants(&grants).await?;
    store.pool().close().await;

    tracing::info!(count = n, file = %path.display(), "Imported grants.");
    println!("Imported {} grants.", n);
    Ok(())
}

/// `gf import preferences <file>`
pub async fn run_import_preferences(config: &Config, path: &Path) -> Result<()> {
    let profiles: Vec<PreferenceProfile> = read_json_array(path)?;
    if let Some(i) = profiles.iter().position(|p| p.user_id.trim().is_empty()) {
        bail!("Preference profile at index {} has an empty userId", i);
    }

    let pool = db::connect(config).await?;
    let store = SqliteGrantStore::new(pool);
    let n = store.upsert_preferences(&profiles).await?;
    store.pool().close().await;

    tracing::info!(count = n, file = %path.display(), "Imported preference profiles.");
    println!("Imported {} preference profiles.", n);
    Ok(())
}

fn read_json_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} as a JSON array", path.display()))
}
