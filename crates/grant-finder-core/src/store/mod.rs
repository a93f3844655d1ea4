//! Storage abstraction for Grant Finder.
//!
//! The [`GrantStore`] trait is the only way the engine reaches grant data:
//! it counts and fetches records that satisfy a list of AND-combined
//! [`Predicate`]s. [`PreferenceStore`] supplies per-user ranking
//! preferences for relevance sort. Both are injected into
//! [`search`](crate::search::search) explicitly, so backends are pluggable
//! (SQLite, in-memory, future remote stores).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//! Failures are reported as `anyhow::Error` and surfaced to callers as
//! [`GrantError::Fetch`](crate::error::GrantError::Fetch).

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Field, GrantRecord, UserPreferences};
use crate::query::{OrderTerm, Predicate, Window};

/// Abstract record store for grant listings.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`count`](GrantStore::count) | Number of records matching every predicate |
/// | [`fetch`](GrantStore::fetch) | Ordered, windowed records matching every predicate |
#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn count(&self, predicates: &[Predicate]) -> Result<u64>;

    /// Fetch matching records ordered by `order` (nulls last), then sliced
    /// to `window`.
    async fn fetch(
        &self,
        predicates: &[Predicate],
        order: &[OrderTerm],
        window: Window,
    ) -> Result<Vec<GrantRecord>>;
}

/// Per-user ranking preferences.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// `Ok(None)` when the user has no stored profile.
    async fn get_preferences(&self, user_id: &str) -> Result<Option<UserPreferences>>;
}

/// Read every record matching `predicates` through `fetch`, in `id`-ordered
/// batches of `batch_size`.
pub async fn scan_matching<S: GrantStore + ?Sized>(
    store: &S,
    predicates: &[Predicate],
    batch_size: u64,
) -> Result<Vec<GrantRecord>> {
    let batch_size = batch_size.max(1);
    let order = [OrderTerm::asc(Field::Id)];
    let mut all = Vec::new();
    loop {
        let window = Window { offset: all.len() as u64, limit: batch_size };
        let batch = store.fetch(predicates, &order, window).await?;
        let done = (batch.len() as u64) < batch_size;
        all.extend(batch);
        if done {
            break;
        }
    }
    Ok(all)
}
