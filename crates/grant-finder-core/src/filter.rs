//! Filter model and normalization.
//!
//! [`GrantFilter`] is the serializable search intent received from a caller
//! (CLI flags, HTTP query parameters, JSON). [`GrantFilter::normalize`]
//! turns it into a [`NormalizedFilter`] that the query compiler can consume
//! without further checks:
//!
//! - Funding bounds are clamped to `[0, ∞)`; `fundingMax ≥ FUNDING_MAX_OPEN`
//!   means "no upper bound".
//! - Deadline offsets are clamped to `[0, MAX_DEADLINE_DAYS]`; a max of
//!   `MAX_DEADLINE_DAYS` means "no upper bound".
//! - `min > max` is corrected by swapping, never rejected.
//! - The `includeX` / `onlyX` flag pairs collapse into one [`NullPolicy`]
//!   per nullable dimension.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GrantError, Result};

/// Funding slider sentinel: any `fundingMax` at or above this is unbounded.
pub const FUNDING_MAX_OPEN: i64 = 100_000_000;

/// Deadline slider sentinel: a `deadlineMaxDays` of this is unbounded.
pub const MAX_DEADLINE_DAYS: i64 = 365;

/// Raw search intent. Omitted fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct GrantFilter {
    pub search_term: String,
    pub funding_min: Option<i64>,
    pub funding_max: Option<i64>,
    pub include_funding_null: bool,
    pub only_no_funding: bool,
    pub deadline_min_days: Option<i64>,
    pub deadline_max_days: Option<i64>,
    pub include_no_deadline: bool,
    pub only_no_deadline: bool,
    pub agencies: Vec<String>,
    pub eligible_applicants: Vec<String>,
    pub categories: Vec<String>,
    pub funding_types: Vec<String>,
    /// `""`, `"required"`, or `"not required"`.
    pub cost_sharing: String,
    pub sort_by: String,
    pub page: i64,
}

impl Default for GrantFilter {
    fn default() -> Self {
        Self {
            search_term: String::new(),
            funding_min: None,
            funding_max: None,
            include_funding_null: true,
            only_no_funding: false,
            deadline_min_days: None,
            deadline_max_days: None,
            include_no_deadline: true,
            only_no_deadline: false,
            agencies: Vec::new(),
            eligible_applicants: Vec::new(),
            categories: Vec::new(),
            funding_types: Vec::new(),
            cost_sharing: String::new(),
            sort_by: SortKey::default().as_str().to_string(),
            page: 1,
        }
    }
}

/// How a nullable dimension treats records with no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPolicy {
    /// Only records inside the bounds; nulls excluded.
    Bounded,
    /// Records inside the bounds, plus records with no value.
    BoundedOrNull,
    /// Only records with no value; bounds are ignored.
    NullOnly,
}

/// Inclusive bounds over a nullable dimension, with its null policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NullableRange {
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub policy: NullPolicy,
}

impl NullableRange {
    pub fn is_open(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// True when the range admits every record, null or not.
    pub fn is_unrestricted(&self) -> bool {
        self.policy == NullPolicy::BoundedOrNull && self.is_open()
    }
}

/// Definite cost-sharing requirement, when one is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CostSharing {
    Required,
    NotRequired,
}

impl CostSharing {
    fn parse(raw: &str) -> Result<Option<Self>> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "required" => Ok(Some(CostSharing::Required)),
            "not required" | "not_required" | "not-required" => Ok(Some(CostSharing::NotRequired)),
            _ => Err(GrantError::unsupported("costSharing", raw)),
        }
    }

    pub fn as_flag(self) -> bool {
        matches!(self, CostSharing::Required)
    }
}

/// Result ordering requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    Relevance,
    #[default]
    DeadlineAscending,
    DeadlineDescending,
    FundingDescending,
    FundingAscending,
    PostedDateDescending,
    TitleAscending,
}

impl SortKey {
    pub const ALL: [SortKey; 7] = [
        SortKey::Relevance,
        SortKey::DeadlineAscending,
        SortKey::DeadlineDescending,
        SortKey::FundingDescending,
        SortKey::FundingAscending,
        SortKey::PostedDateDescending,
        SortKey::TitleAscending,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Relevance => "relevance",
            SortKey::DeadlineAscending => "deadline-ascending",
            SortKey::DeadlineDescending => "deadline-descending",
            SortKey::FundingDescending => "funding-descending",
            SortKey::FundingAscending => "funding-ascending",
            SortKey::PostedDateDescending => "posted-date-descending",
            SortKey::TitleAscending => "title-ascending",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = GrantError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        if wanted.is_empty() {
            return Ok(SortKey::default());
        }
        SortKey::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| GrantError::unsupported("sortBy", s))
    }
}

/// Internally consistent filter, ready for compilation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedFilter {
    pub search_term: Option<String>,
    /// Funding bounds in dollars.
    pub funding: NullableRange,
    /// Deadline bounds in days from "today".
    pub deadline: NullableRange,
    pub agencies: Vec<String>,
    pub eligible_applicants: Vec<String>,
    pub categories: Vec<String>,
    pub funding_types: Vec<String>,
    pub cost_sharing: Option<CostSharing>,
    pub sort: SortKey,
    pub page: u32,
}

impl GrantFilter {
    /// Parse a JSON filter object.
    ///
    /// Unknown fields are reported as [`GrantError::UnsupportedFilter`];
    /// any other parse failure as [`GrantError::InvalidFilter`].
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|err| {
            let message = err.to_string();
            match unknown_field_name(&message) {
                Some(name) => GrantError::unsupported("field", name),
                None => GrantError::invalid(message),
            }
        })
    }

    pub fn normalize(&self) -> Result<NormalizedFilter> {
        if self.page < 1 {
            return Err(GrantError::invalid(format!(
                "page must be >= 1, got {}",
                self.page
            )));
        }
        let page = u32::try_from(self.page)
            .map_err(|_| GrantError::invalid(format!("page out of range: {}", self.page)))?;

        let sort: SortKey = self.sort_by.parse()?;
        let cost_sharing = CostSharing::parse(&self.cost_sharing)?;

        let funding = normalize_range(
            self.funding_min.map(|v| v.max(0)),
            self.funding_max
                .map(|v| v.max(0))
                .filter(|&v| v < FUNDING_MAX_OPEN),
            self.include_funding_null,
            self.only_no_funding,
        );

        let deadline = normalize_range(
            self.deadline_min_days.map(|v| v.clamp(0, MAX_DEADLINE_DAYS)),
            self.deadline_max_days
                .map(|v| v.clamp(0, MAX_DEADLINE_DAYS))
                .filter(|&v| v < MAX_DEADLINE_DAYS),
            self.include_no_deadline,
            self.only_no_deadline,
        );

        let search_term = Some(self.search_term.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        Ok(NormalizedFilter {
            search_term,
            funding,
            deadline,
            agencies: normalize_set(&self.agencies),
            eligible_applicants: normalize_set(&self.eligible_applicants),
            categories: normalize_set(&self.categories),
            funding_types: normalize_set(&self.funding_types),
            cost_sharing,
            sort,
            page,
        })
    }
}

fn normalize_range(
    min: Option<i64>,
    max: Option<i64>,
    include_null: bool,
    only_null: bool,
) -> NullableRange {
    if only_null {
        return NullableRange { min: None, max: None, policy: NullPolicy::NullOnly };
    }
    let (min, max) = match (min, max) {
        (Some(lo), Some(hi)) if lo > hi => (Some(hi), Some(lo)),
        bounds => bounds,
    };
    let policy = if include_null {
        NullPolicy::BoundedOrNull
    } else {
        NullPolicy::Bounded
    };
    NullableRange { min, max, policy }
}

fn normalize_set(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Extract the field name from serde's "unknown field `x`, expected ..." message.
fn unknown_field_name(message: &str) -> Option<&str> {
    let rest = message.strip_prefix("unknown field `")?;
    rest.split('`').next()
}
