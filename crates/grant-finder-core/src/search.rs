//! Grant search: filter → query → store → (scorer) → page.
//!
//! The search pipeline operates entirely through the [`GrantStore`] and
//! [`PreferenceStore`] traits, with no database or configuration
//! dependencies. The calling application constructs [`SearchParams`] from
//! its config, supplies today's date, and passes the store implementations.
//!
//! # Pipeline
//!
//! 1. Normalize the [`GrantFilter`] (range fixes, null policies, sort key).
//! 2. Compile predicates, ordering, and window.
//! 3. Count matches with the count query.
//! 4. Fetch the page (or, for relevance, every match in `id`-ordered batches).
//! 5. Relevance only: load preferences, score, order, slice the page.
//! 6. Assemble the [`ResultPage`].
//!
//! Store failures abort the request with [`GrantError::Fetch`]; no partial
//! page is ever returned. Count and page are read separately, so under
//! concurrent writes the total may be slightly stale relative to the page.

use chrono::NaiveDate;

use crate::error::{GrantError, Result};
use crate::filter::GrantFilter;
use crate::models::UserPreferences;
use crate::page::ResultPage;
use crate::query::{compile, CompiledQuery, Ranking};
use crate::score::{rank, ScoredGrant};
use crate::store::{scan_matching, GrantStore, PreferenceStore};

/// Pagination and ranking parameters, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchParams {
    pub page_size: u32,
    /// Records read per store fetch when collecting relevance candidates.
    pub relevance_batch_size: u32,
}

/// Bundles all inputs for a single search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub filter: &'a GrantFilter,
    /// Preference profile used for relevance sort.
    pub user_id: Option<&'a str>,
    /// Anchor for relative deadline offsets and urgency scoring.
    pub today: NaiveDate,
    pub params: SearchParams,
}

/// Normalize and compile without touching a store.
pub fn plan(req: &SearchRequest<'_>) -> Result<CompiledQuery> {
    let filter = req.filter.normalize()?;
    compile(
        &filter,
        req.today,
        req.params.page_size,
        req.params.relevance_batch_size,
    )
}

/// Run a filtered, paginated, optionally ranked search.
///
/// This is the core function that every frontend (CLI, HTTP) delegates to.
pub async fn search<S, P>(store: &S, preferences: &P, req: &SearchRequest<'_>) -> Result<ResultPage>
where
    S: GrantStore + ?Sized,
    P: PreferenceStore + ?Sized,
{
    let filter = req.filter.normalize()?;
    let query = compile(
        &filter,
        req.today,
        req.params.page_size,
        req.params.relevance_batch_size,
    )?;
    tracing::debug!(
        predicates = query.predicates.len(),
        sort = %filter.sort,
        page = filter.page,
        "Compiled grant query."
    );

    let total = store
        .count(&query.count_query().predicates)
        .await
        .map_err(GrantError::fetch)?;

    let items = match query.ranking {
        Ranking::Store => store
            .fetch(&query.predicates, &query.order, query.window)
            .await
            .map_err(GrantError::fetch)?
            .into_iter()
            .map(ScoredGrant::unscored)
            .collect(),
        Ranking::Relevance { page } => {
            let candidates = scan_matching(store, &query.predicates, query.window.limit)
                .await
                .map_err(GrantError::fetch)?;
            tracing::debug!(total, candidates = candidates.len(), "Collected relevance candidates.");
            let prefs = match req.user_id {
                Some(user_id) => preferences
                    .get_preferences(user_id)
                    .await
                    .map_err(GrantError::fetch)?
                    .unwrap_or_default(),
                None => UserPreferences::default(),
            };
            page.apply(rank(candidates, &prefs, req.today))
        }
    };

    tracing::debug!(total, returned = items.len(), "Assembled grant page.");
    Ok(ResultPage::assemble(items, total, filter.page, req.params.page_size))
}
