//! # Grant Finder CLI (`gf`)
//!
//! ## Usage
//!
//! ```bash
//! gf --config ./config/gf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gf init` | Create the SQLite database and schema |
//! | `gf import grants <file>` | Upsert grant records from a JSON array |
//! | `gf import preferences <file>` | Upsert preference profiles from a JSON array |
//! | `gf search [query]` | Filtered, paginated search |
//! | `gf stats` | Catalog distribution statistics |
//! | `gf serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Grants between $50K and $100K, largest first, no unknown ceilings
//! gf search --funding-min 50000 --funding-max 100000 \
//!     --exclude-funding-null --sort funding-descending
//!
//! # Closing within 30 days, ranked for a user profile
//! gf search --deadline-max-days 30 --sort relevance --user u1
//!
//! # Same filter from a JSON file, as the HTTP API would receive it
//! gf search --filter-json ./filter.json --json
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use grant_finder::{config, import, migrate, search, server, stats, GrantFilter};

/// Grant Finder: filtered, paginated, and ranked search over a
/// funding-opportunity catalog.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/gf.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "gf", version, about = "Grant Finder: search and rank funding opportunities")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/gf.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the grants and preference
    /// tables. Safe to run repeatedly.
    Init,

    /// Import records from a JSON file.
    Import {
        #[command(subcommand)]
        kind: ImportKind,
    },

    /// Search grants.
    Search(SearchArgs),

    /// Print catalog distribution statistics.
    Stats {
        /// Print the snapshot as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum ImportKind {
    /// Upsert grant records (JSON array of camelCase grant objects).
    Grants { file: PathBuf },
    /// Upsert preference profiles (JSON array with `userId`).
    Preferences { file: PathBuf },
}

#[derive(clap::Args)]
struct SearchArgs {
    /// Free-text term matched against title, agency, and description.
    query: Option<String>,

    /// Minimum award ceiling in dollars (inclusive).
    #[arg(long)]
    funding_min: Option<i64>,

    /// Maximum award ceiling in dollars (inclusive). 100000000 or more means no limit.
    #[arg(long)]
    funding_max: Option<i64>,

    /// Drop grants with no award ceiling.
    #[arg(long)]
    exclude_funding_null: bool,

    /// Only grants with no award ceiling; funding bounds are ignored.
    #[arg(long)]
    only_no_funding: bool,

    /// Earliest close date, in days from today (inclusive).
    #[arg(long)]
    deadline_min_days: Option<i64>,

    /// Latest close date, in days from today (inclusive). 365 means no limit.
    #[arg(long)]
    deadline_max_days: Option<i64>,

    /// Drop grants with no close date.
    #[arg(long)]
    exclude_no_deadline: bool,

    /// Only grants with no close date; deadline bounds are ignored.
    #[arg(long)]
    only_no_deadline: bool,

    /// Agencies to include (repeat or comma-separate).
    #[arg(long = "agency", value_delimiter = ',')]
    agencies: Vec<String>,

    /// Categories to match (any overlap).
    #[arg(long = "category", value_delimiter = ',')]
    categories: Vec<String>,

    /// Eligible applicant types to match (any overlap).
    #[arg(long = "applicant", value_delimiter = ',')]
    applicants: Vec<String>,

    /// Funding instrument types to include.
    #[arg(long = "funding-type", value_delimiter = ',')]
    funding_types: Vec<String>,

    /// `required` or `not required`.
    #[arg(long, default_value = "")]
    cost_sharing: String,

    /// relevance, deadline-ascending, deadline-descending, funding-descending,
    /// funding-ascending, posted-date-descending, or title-ascending.
    #[arg(long, default_value = "deadline-ascending")]
    sort: String,

    /// 1-based page number.
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    page: i64,

    /// Preference profile used by `--sort relevance`.
    #[arg(long)]
    user: Option<String>,

    /// Read the whole filter from a JSON file instead of flags.
    #[arg(long, conflicts_with_all = [
        "query", "funding_min", "funding_max", "exclude_funding_null", "only_no_funding",
        "deadline_min_days", "deadline_max_days", "exclude_no_deadline", "only_no_deadline",
        "agencies", "categories", "applicants", "funding_types", "cost_sharing", "sort", "page",
    ])]
    filter_json: Option<PathBuf>,

    /// Print the result envelope as JSON.
    #[arg(long)]
    json: bool,

    /// Print the compiled query before the results.
    #[arg(long, conflicts_with = "json")]
    explain: bool,
}

impl SearchArgs {
    fn to_filter(&self) -> anyhow::Result<GrantFilter> {
        if let Some(path) = &self.filter_json {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read filter file: {}", path.display()))?;
            return Ok(GrantFilter::from_json(&raw)?);
        }

        Ok(GrantFilter {
            search_term: self.query.clone().unwrap_or_default(),
            funding_min: self.funding_min,
            funding_max: self.funding_max,
            include_funding_null: !self.exclude_funding_null,
            only_no_funding: self.only_no_funding,
            deadline_min_days: self.deadline_min_days,
            deadline_max_days: self.deadline_max_days,
            include_no_deadline: !self.exclude_no_deadline,
            only_no_deadline: self.only_no_deadline,
            agencies: self.agencies.clone(),
            eligible_applicants: self.applicants.clone(),
            categories: self.categories.clone(),
            funding_types: self.funding_types.clone(),
            cost_sharing: self.cost_sharing.clone(),
            sort_by: self.sort.clone(),
            page: self.page,
        })
    }
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `[logging].level`.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg.logging.level);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { kind } => match kind {
            ImportKind::Grants { file } => {
                import::run_import_grants(&cfg, &file).await?;
            }
            ImportKind::Preferences { file } => {
                import::run_import_preferences(&cfg, &file).await?;
            }
        },
        Commands::Search(args) => {
            let filter = args.to_filter()?;
            search::run_search(&cfg, &filter, args.user.as_deref(), args.json, args.explain)
                .await?;
        }
        Commands::Stats { json } => {
            stats::run_stats(&cfg, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
