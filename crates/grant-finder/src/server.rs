//! HTTP server for grant search.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/grants` | Filtered, paginated, optionally ranked search |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `GET /grants` takes the camelCase filter fields as query parameters.
//! List fields are comma-separated (`agencies=NSF,NIH`) or repeated, and
//! `user` selects the preference profile used by `sortBy=relevance`.
//!
//! ```text
//! GET /grants?fundingMin=50000&fundingMax=100000&includeFundingNull=false&sortBy=funding-descending
//! ```
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Invalid filter: page must be >= 1, got 0" } }
//! ```
//!
//! Error codes: `bad_request` (400) for invalid or unsupported filters,
//! `fetch_failed` (502) when the record store fails.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use grant_finder_core::error::GrantError;
use grant_finder_core::filter::GrantFilter;
use grant_finder_core::page::ResultPage;
use grant_finder_core::search::{search, SearchParams, SearchRequest};
use grant_finder_core::store::{GrantStore, PreferenceStore};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteGrantStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub grants: Arc<dyn GrantStore>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub params: SearchParams,
    /// Reference date for relative deadline offsets.
    pub today: fn() -> NaiveDate,
}

/// Build the router with CORS applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/grants", get(handle_grants))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteGrantStore::new(pool));

    let state = AppState {
        grants: store.clone(),
        preferences: store,
        params: config.search.params(),
        today: crate::search::today,
    };

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(bind = %bind_addr, "Grant search server listening.");
    println!("Grant search server listening on http://{}", bind_addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<GrantError> for AppError {
    fn from(err: GrantError) -> Self {
        match err {
            GrantError::InvalidFilter { .. } | GrantError::UnsupportedFilter { .. } => AppError {
                status: StatusCode::BAD_REQUEST,
                code: "bad_request",
                message: err.to_string(),
            },
            GrantError::Fetch { .. } => {
                tracing::warn!(error = %err, "Grant search failed.");
                AppError {
                    status: StatusCode::BAD_GATEWAY,
                    code: "fetch_failed",
                    message: err.to_string(),
                }
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /grants ============

async fn handle_grants(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<ResultPage>, AppError> {
    let (filter, user) = filter_from_params(&params)?;
    let req = SearchRequest {
        filter: &filter,
        user_id: user.as_deref(),
        today: (state.today)(),
        params: state.params,
    };
    let page = search(state.grants.as_ref(), state.preferences.as_ref(), &req).await?;
    Ok(Json(page))
}

/// Map query parameters onto a [`GrantFilter`] plus the optional user id.
///
/// Unknown parameters are [`GrantError::UnsupportedFilter`]; values that do
/// not parse are [`GrantError::InvalidFilter`].
pub fn filter_from_params(
    params: &[(String, String)],
) -> Result<(GrantFilter, Option<String>), GrantError> {
    let mut filter = GrantFilter::default();
    let mut user = None;

    for (key, value) in params {
        match key.as_str() {
            "searchTerm" => filter.search_term = value.clone(),
            "fundingMin" => filter.funding_min = Some(parse_int(key, value)?),
            "fundingMax" => filter.funding_max = Some(parse_int(key, value)?),
            "includeFundingNull" => filter.include_funding_null = parse_bool(key, value)?,
            "onlyNoFunding" => filter.only_no_funding = parse_bool(key, value)?,
            "deadlineMinDays" => filter.deadline_min_days = Some(parse_int(key, value)?),
            "deadlineMaxDays" => filter.deadline_max_days = Some(parse_int(key, value)?),
            "includeNoDeadline" => filter.include_no_deadline = parse_bool(key, value)?,
            "onlyNoDeadline" => filter.only_no_deadline = parse_bool(key, value)?,
            "agencies" => filter.agencies.extend(split_list(value)),
            "eligibleApplicants" => filter.eligible_applicants.extend(split_list(value)),
            "categories" => filter.categories.extend(split_list(value)),
            "fundingTypes" => filter.funding_types.extend(split_list(value)),
            "costSharing" => filter.cost_sharing = value.clone(),
            "sortBy" => filter.sort_by = value.clone(),
            "page" => filter.page = parse_int(key, value)?,
            "user" => user = Some(value.clone()).filter(|u| !u.trim().is_empty()),
            other => return Err(GrantError::unsupported("parameter", other)),
        }
    }

    Ok((filter, user))
}

fn parse_int(key: &str, value: &str) -> Result<i64, GrantError> {
    value
        .trim()
        .parse()
        .map_err(|_| GrantError::invalid(format!("{key} must be an integer, got {value:?}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, GrantError> {
    match value.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(GrantError::invalid(format!(
            "{key} must be true or false, got {value:?}"
        ))),
    }
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value.split(',').map(str::to_string)
}
