//! Configuration parsing and validation.
//!
//! Grant Finder is configured via a TOML file (default `config/gf.toml`).
//! Only `[db]` is required; every other section falls back to defaults.
//!
//! ```toml
//! [db]
//! path = "./data/grants.sqlite"
//!
//! [search]
//! page_size = 20
//! relevance_batch_size = 500
//!
//! [stats]
//! top_n = 10
//! numeric_field = "award_ceiling"
//!
//! [server]
//! bind = "127.0.0.1:7340"
//!
//! [logging]
//! level = "info"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use grant_finder_core::search::SearchParams;
use grant_finder_core::stats::{Bucket, StatsRequest};

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: u32 = 500;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Records read per store fetch when collecting `relevance` candidates.
    #[serde(default = "default_relevance_batch_size")]
    pub relevance_batch_size: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            relevance_batch_size: default_relevance_batch_size(),
        }
    }
}

impl SearchConfig {
    pub fn params(&self) -> SearchParams {
        SearchParams {
            page_size: self.page_size,
            relevance_batch_size: self.relevance_batch_size,
        }
    }
}

fn default_page_size() -> u32 {
    20
}
fn default_relevance_batch_size() -> u32 {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatsConfig {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Records read per store fetch while scanning the collection.
    #[serde(default = "default_scan_batch_size")]
    pub scan_batch_size: u64,
    #[serde(default = "default_null_fields")]
    pub null_fields: Vec<String>,
    #[serde(default = "default_categorical_fields")]
    pub categorical_fields: Vec<String>,
    #[serde(default = "default_numeric_field")]
    pub numeric_field: String,
    #[serde(default = "default_buckets")]
    pub buckets: Vec<Bucket>,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            scan_batch_size: default_scan_batch_size(),
            null_fields: default_null_fields(),
            categorical_fields: default_categorical_fields(),
            numeric_field: default_numeric_field(),
            buckets: default_buckets(),
        }
    }
}

impl StatsConfig {
    pub fn request(&self) -> StatsRequest {
        StatsRequest {
            null_fields: self.null_fields.clone(),
            categorical_fields: self.categorical_fields.clone(),
            top_n: self.top_n,
            numeric_field: self.numeric_field.clone(),
            buckets: self.buckets.clone(),
        }
    }
}

fn default_top_n() -> usize {
    10
}
fn default_scan_batch_size() -> u64 {
    500
}
fn default_null_fields() -> Vec<String> {
    ["close_date", "award_ceiling", "agency"]
        .map(String::from)
        .to_vec()
}
fn default_categorical_fields() -> Vec<String> {
    ["agency", "categories", "eligible_applicants", "funding_type"]
        .map(String::from)
        .to_vec()
}
fn default_numeric_field() -> String {
    "award_ceiling".to_string()
}
fn default_buckets() -> Vec<Bucket> {
    let bucket = |name: &str, min: i64, max: Option<i64>| Bucket {
        name: name.to_string(),
        min,
        max,
    };
    vec![
        bucket("Under $50K", 0, Some(50_000)),
        bucket("$50K-$250K", 50_000, Some(250_000)),
        bucket("$250K-$1M", 250_000, Some(1_000_000)),
        bucket("$1M+", 1_000_000, None),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Fallback `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_level() }
    }
}

fn default_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate a TOML config document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate search
    if config.search.page_size == 0 {
        anyhow::bail!("search.page_size must be >= 1");
    }
    if config.search.page_size > MAX_PAGE_SIZE {
        anyhow::bail!("search.page_size must be <= {}", MAX_PAGE_SIZE);
    }
    if config.search.relevance_batch_size == 0 {
        anyhow::bail!("search.relevance_batch_size must be >= 1");
    }

    // Validate stats
    if config.stats.top_n == 0 {
        anyhow::bail!("stats.top_n must be >= 1");
    }
    if config.stats.scan_batch_size == 0 {
        anyhow::bail!("stats.scan_batch_size must be >= 1");
    }

    Ok(config)
}
