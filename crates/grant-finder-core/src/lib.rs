//! # Grant Finder Core
//!
//! Storage-agnostic logic for Grant Finder: record models, filter
//! normalization, query compilation, relevance scoring, result paging,
//! aggregate statistics, and the store abstraction.
//!
//! This crate contains no sqlx, filesystem I/O, or configuration loading.
//! Frontends supply a [`store::GrantStore`] and call [`search::search`].

pub mod error;
pub mod filter;
pub mod models;
pub mod page;
pub mod query;
pub mod score;
pub mod search;
pub mod stats;
pub mod store;

pub use error::{GrantError, Result};
