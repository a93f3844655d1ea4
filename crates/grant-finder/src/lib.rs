//! # Grant Finder
//!
//! **Filtered, paginated, and ranked search over a funding-opportunity catalog.**
//!
//! Grant Finder stores grant listings in SQLite and answers structured
//! searches: free text, funding and deadline ranges with explicit null
//! handling, set filters, several sort orders, and preference-based
//! relevance ranking. Catalog-wide distribution statistics are available
//! as a batch command.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────┐   ┌──────────┐
//! │  Filter  │──▶│ Query compile │──▶│ GrantStore  │──▶│  Scorer  │──▶ ResultPage
//! └──────────┘   └──────────────┘   │ (SQLite)    │   │(relevance)│
//!                                   └─────────────┘   └──────────┘
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!                 ┌──────────┐       ┌──────────┐
//!                 │   CLI    │       │   HTTP   │
//!                 │   (gf)   │       │  (axum)  │
//!                 └──────────┘       └──────────┘
//! ```
//!
//! The engine itself lives in `grant-finder-core` and has no database
//! dependency; this crate supplies the SQLite store, configuration, and
//! the two frontends.
//!
//! ## Quick Start
//!
//! ```bash
//! gf init                                   # create database
//! gf import grants ./grants.json            # load listings
//! gf search "water" --funding-min 50000 --sort funding-descending
//! gf stats                                  # catalog distribution
//! gf serve                                  # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Database schema migrations (idempotent) |
//! | [`sqlite_store`] | `GrantStore` / `PreferenceStore` over SQLite |
//! | [`import`] | JSON fixture import for grants and preference profiles |
//! | [`search`] | Search command and programmatic entry point |
//! | [`stats`] | Catalog statistics command |
//! | [`server`] | HTTP server (Axum) with CORS |

pub mod config;
pub mod db;
pub mod import;
pub mod migrate;
pub mod search;
pub mod server;
pub mod sqlite_store;
pub mod stats;

pub use grant_finder_core::filter::GrantFilter;
pub use grant_finder_core::page::ResultPage;
