//! Search command: run the core engine against the SQLite store.
//!
//! [`search_grants`] is the programmatic entry point; [`run_search`] backs
//! `gf search` and prints either a readable listing or the JSON envelope.

use anyhow::Result;
use chrono::NaiveDate;

use grant_finder_core::filter::GrantFilter;
use grant_finder_core::page::ResultPage;
use grant_finder_core::query::{Direction, Ranking};
use grant_finder_core::search::{plan, search, SearchRequest};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::{where_clause_sql, SqliteGrantStore};

/// Local calendar date used to resolve relative deadline offsets.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Run a search against the configured database and return the page.
pub async fn search_grants(
    config: &Config,
    filter: &GrantFilter,
    user_id: Option<&str>,
) -> Result<ResultPage> {
    let pool = db::connect(config).await?;
    let store = SqliteGrantStore::new(pool);
    let req = SearchRequest {
        filter,
        user_id,
        today: today(),
        params: config.search.params(),
    };
    let page = search(&store, &store, &req).await;
    store.pool().close().await;
    Ok(page?)
}

/// `gf search`
pub async fn run_search(
    config: &Config,
    filter: &GrantFilter,
    user_id: Option<&str>,
    json: bool,
    explain: bool,
) -> Result<()> {
    if explain {
        print_plan(config, filter, user_id)?;
    }

    let page = search_grants(config, filter, user_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    if page.is_empty {
        println!("{}", empty_page_message(&page));
        return Ok(());
    }

    println!(
        "{} grants (page {} of {})",
        page.total_count, page.page, page.total_pages
    );
    println!();

    let first = u64::from(page.page.saturating_sub(1)) * u64::from(page.page_size);
    for (i, item) in page.items.iter().enumerate() {
        let grant = &item.grant;
        match item.score {
            Some(score) => println!(
                "{}. [{:.3}] {}",
                first + i as u64 + 1,
                score,
                grant.title
            ),
            None => println!("{}. {}", first + i as u64 + 1, grant.title),
        }
        println!("    agency: {}", grant.agency.as_deref().unwrap_or("-"));
        println!(
            "    ceiling: {}",
            grant
                .award_ceiling
                .map(format_dollars)
                .unwrap_or_else(|| "none".to_string())
        );
        println!(
            "    closes: {}",
            grant
                .close_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "open".to_string())
        );
        if let Some(ref url) = grant.url {
            println!("    url: {}", url);
        }
        println!("    id: {}", grant.id);
        println!();
    }

    if page.has_more {
        println!("More results: --page {}", page.page + 1);
    }
    Ok(())
}

fn print_plan(config: &Config, filter: &GrantFilter, user_id: Option<&str>) -> Result<()> {
    let req = SearchRequest {
        filter,
        user_id,
        today: today(),
        params: config.search.params(),
    };
    let query = plan(&req)?;

    println!("Query plan");
    println!("==========");
    if query.predicates.is_empty() {
        println!("  where: (all grants)");
    }
    for predicate in &query.predicates {
        println!("  where: {}", predicate);
    }
    let order: Vec<String> = query
        .order
        .iter()
        .map(|t| match t.direction {
            Direction::Asc => format!("{} ASC NULLS LAST", t.field),
            Direction::Desc => format!("{} DESC NULLS LAST", t.field),
        })
        .collect();
    println!("  order: {}", order.join(", "));
    match query.ranking {
        Ranking::Store => println!(
            "  window: offset {} limit {}",
            query.window.offset, query.window.limit
        ),
        Ranking::Relevance { page } => {
            println!("  scan: every match, batches of {}", query.window.limit);
            println!("  rank: relevance, page offset {} limit {}", page.offset, page.limit);
        }
    }
    println!("  sql: {}", where_clause_sql(&query.predicates));
    println!();
    Ok(())
}

/// Format whole dollars with thousands separators, e.g. `$1,250,000`.
pub fn format_dollars(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if amount < 0 {
        format!("-${}", out)
    } else {
        format!("${}", out)
    }
}

/// Message for a page with no items; past the end it names the last page.
fn empty_page_message(page: &ResultPage) -> String {
    if page.total_count == 0 {
        return "No results.".to_string();
    }
    format!(
        "No results on page {} of {} ({} grants). Last page: --page {}",
        page.page, page.total_pages, page.total_count, page.total_pages
    )
}
