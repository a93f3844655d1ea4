//! Database schema migrations.
//!
//! Every statement is `IF NOT EXISTS`, so `gf init` can be run repeatedly.
//!
//! # Schema
//!
//! - `grants`: one row per funding opportunity. Dates are ISO `YYYY-MM-DD`
//!   text so lexical order is chronological; `categories` and
//!   `eligible_applicants` are JSON arrays queried through `json_each`.
//! - `user_preferences`: one ranking profile per user.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes on an open pool.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS grants (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            agency TEXT,
            description TEXT,
            award_ceiling INTEGER,
            close_date TEXT,
            post_date TEXT,
            funding_type TEXT,
            cost_sharing INTEGER,
            categories TEXT NOT NULL DEFAULT '[]',
            eligible_applicants TEXT NOT NULL DEFAULT '[]',
            url TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_preferences (
            user_id TEXT PRIMARY KEY,
            categories TEXT NOT NULL DEFAULT '[]',
            agencies TEXT NOT NULL DEFAULT '[]',
            funding_band_min INTEGER,
            funding_band_max INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes for the range filters and sort keys
    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_grants_close_date ON grants(close_date)",
        "CREATE INDEX IF NOT EXISTS idx_grants_award_ceiling ON grants(award_ceiling)",
        "CREATE INDEX IF NOT EXISTS idx_grants_post_date ON grants(post_date DESC)",
        "CREATE INDEX IF NOT EXISTS idx_grants_agency ON grants(agency)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}
