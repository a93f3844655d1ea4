//! Catalog statistics command.
//!
//! Scans the whole `grants` table in id-ordered batches and prints the
//! aggregate snapshot configured under `[stats]`: null shares, top-N value
//! tables, the funding histogram, and the numeric summary. A metric that
//! fails is printed as an error line and the rest still report.

use anyhow::{Context, Result};

use grant_finder_core::stats::{compute_snapshot, scan_collection, Metric, StatsSnapshot};

use crate::config::Config;
use crate::db;
use crate::search::format_dollars;
use crate::sqlite_store::SqliteGrantStore;

/// Compute the snapshot for the configured database.
pub async fn collect_stats(config: &Config) -> Result<StatsSnapshot> {
    let pool = db::connect(config).await?;
    let store = SqliteGrantStore::new(pool);
    let records = scan_collection(&store, config.stats.scan_batch_size)
        .await
        .context("Failed to scan grant collection")?;
    store.pool().close().await;
    Ok(compute_snapshot(&records, &config.stats.request()))
}

/// `gf stats`
pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let snapshot = collect_stats(config).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("Grant Finder Catalog Stats");
    println!("==========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Grants:      {}", snapshot.total);

    if !snapshot.null_shares.is_empty() {
        println!();
        println!("  Missing values:");
        println!("  {:<24} {:>8} {:>9}", "FIELD", "NULLS", "SHARE");
        println!("  {}", "-".repeat(43));
        for metric in &snapshot.null_shares {
            match &metric.outcome {
                Metric::Ok(share) => println!(
                    "  {:<24} {:>8} {:>8.2}%",
                    metric.field, share.null_count, share.percentage
                ),
                Metric::Error(e) => println!("  {:<24} error: {}", metric.field, e),
            }
        }
    }

    for metric in &snapshot.top_values {
        println!();
        println!("  Top {}:", metric.field);
        match &metric.outcome {
            Metric::Ok(entries) if entries.is_empty() => println!("    (no values)"),
            Metric::Ok(entries) => {
                for entry in entries {
                    println!(
                        "    {:<30} {:>8} {:>8.2}%",
                        entry.name, entry.count, entry.percentage
                    );
                }
            }
            Metric::Error(e) => println!("    error: {}", e),
        }
    }

    println!();
    match &snapshot.histogram {
        Metric::Ok(hist) => {
            println!("  Histogram ({}):", hist.field);
            for bucket in &hist.buckets {
                println!(
                    "    {:<30} {:>8} {:>8.2}%",
                    bucket.name, bucket.count, bucket.percentage
                );
            }
            if hist.unbucketed > 0 {
                println!("    {:<30} {:>8}", "(outside buckets)", hist.unbucketed);
            }
        }
        Metric::Error(e) => println!("  Histogram: error: {}", e),
    }

    println!();
    match &snapshot.summary {
        Metric::Ok(summary) => println!(
            "  Summary ({}, {} values): min {}  median {}  max {}",
            summary.field,
            summary.count,
            format_dollars(summary.min),
            format_dollars(summary.median),
            format_dollars(summary.max)
        ),
        Metric::Error(e) => println!("  Summary: error: {}", e),
    }
    println!();

    Ok(())
}
