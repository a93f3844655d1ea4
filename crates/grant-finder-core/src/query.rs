//! Query compiler: normalized filter → predicates, ordering, and window.
//!
//! Compilation is a pure function of the [`NormalizedFilter`], the reference
//! date used to resolve relative deadline offsets, and the page size. The
//! result is store-agnostic: the SQLite store renders it to SQL, the
//! in-memory store evaluates it with [`Predicate::matches`] and
//! [`compare_records`].
//!
//! # Predicate families
//!
//! | Filter | Predicate |
//! |--------|-----------|
//! | search term | `Or[Contains(title), Contains(agency), Contains(description)]` |
//! | funding / deadline, `Bounded` | `Range` (or `NotNull` when both bounds are open) |
//! | funding / deadline, `BoundedOrNull` | `Or[Range, IsNull]`, nothing when open |
//! | funding / deadline, `NullOnly` | `IsNull` |
//! | agencies, funding types | `In` |
//! | categories, applicant types | `Overlaps` |
//! | cost sharing | `Eq` when definite |
//!
//! Top-level predicates are AND-combined. Ranges are inclusive at both ends.
//! Every ordering puts nulls last and ends with `id ASC` so pages are stable
//! across repeated requests.

use std::cmp::Ordering;
use std::fmt;

use chrono::{Days, NaiveDate};
use serde::Serialize;

use crate::error::{GrantError, Result};
use crate::filter::{NormalizedFilter, NullPolicy, NullableRange, SortKey};
use crate::models::{Field, FieldValue, GrantRecord};

/// Fields matched by the free-text search term.
pub const SEARCHABLE_FIELDS: [Field; 3] = [Field::Title, Field::Agency, Field::Description];

/// A literal compared against a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Integer(i64),
    Date(NaiveDate),
    Text(String),
    Flag(bool),
}

/// A single boolean test against the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// `min <= field <= max`; an absent bound is unconstrained. Never matches null.
    Range {
        field: Field,
        min: Option<Scalar>,
        max: Option<Scalar>,
    },
    /// Scalar field is one of `values`.
    In { field: Field, values: Vec<String> },
    /// Set-valued field shares at least one element with `values`.
    Overlaps { field: Field, values: Vec<String> },
    Eq { field: Field, value: Scalar },
    IsNull { field: Field },
    NotNull { field: Field },
    /// Case-insensitive substring match. `needle` is stored lowercased.
    Contains { field: Field, needle: String },
    Or { any: Vec<Predicate> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

/// One ordering key. Nulls always sort last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderTerm {
    pub field: Field,
    pub direction: Direction,
}

impl OrderTerm {
    pub const fn asc(field: Field) -> Self {
        Self { field, direction: Direction::Asc }
    }

    pub const fn desc(field: Field) -> Self {
        Self { field, direction: Direction::Desc }
    }
}

/// Pagination window handed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub offset: u64,
    pub limit: u64,
}

impl Window {
    /// Slice `items` to this window.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let offset = usize::try_from(self.offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(self.limit).unwrap_or(usize::MAX);
        items.into_iter().skip(offset).take(limit).collect()
    }
}

/// Where the final ordering comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Ranking {
    /// The store orders and paginates.
    Store,
    /// Every match is read in `id`-ordered batches of the query window; the
    /// scorer orders them and `page` is sliced out in memory.
    Relevance { page: Window },
}

/// Page query: predicates, ordering, and window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub predicates: Vec<Predicate>,
    pub order: Vec<OrderTerm>,
    pub window: Window,
    pub ranking: Ranking,
}

/// Count query: same predicates, no ordering or window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountQuery {
    pub predicates: Vec<Predicate>,
}

impl CompiledQuery {
    pub fn count_query(&self) -> CountQuery {
        CountQuery { predicates: self.predicates.clone() }
    }
}

/// Compile a normalized filter.
///
/// `today` anchors relative deadline offsets. With [`SortKey::Relevance`]
/// the window is the first `id`-ordered batch of candidates; every match is
/// read batch by batch and the requested page is recorded in
/// [`Ranking::Relevance`].
pub fn compile(
    filter: &NormalizedFilter,
    today: NaiveDate,
    page_size: u32,
    relevance_batch_size: u32,
) -> Result<CompiledQuery> {
    if page_size == 0 {
        return Err(GrantError::invalid("page size must be >= 1"));
    }

    let mut predicates = Vec::new();

    if let Some(term) = &filter.search_term {
        let needle = term.to_ascii_lowercase();
        predicates.push(Predicate::Or {
            any: SEARCHABLE_FIELDS
                .into_iter()
                .map(|field| Predicate::Contains { field, needle: needle.clone() })
                .collect(),
        });
    }

    predicates.extend(range_predicate(Field::AwardCeiling, &filter.funding, Scalar::Integer));

    let deadline_bound = |days: i64| -> Result<Scalar> {
        let days = u64::try_from(days)
            .map_err(|_| GrantError::invalid(format!("negative deadline offset: {days}")))?;
        today
            .checked_add_days(Days::new(days))
            .map(Scalar::Date)
            .ok_or_else(|| GrantError::invalid(format!("deadline offset out of range: {days}")))
    };
    let deadline = ResolvedRange {
        min: filter.deadline.min.map(&deadline_bound).transpose()?,
        max: filter.deadline.max.map(&deadline_bound).transpose()?,
        policy: filter.deadline.policy,
    };
    predicates.extend(deadline.predicate(Field::CloseDate));

    for (field, values) in [
        (Field::Agency, &filter.agencies),
        (Field::FundingType, &filter.funding_types),
    ] {
        if !values.is_empty() {
            predicates.push(Predicate::In { field, values: values.clone() });
        }
    }
    for (field, values) in [
        (Field::Categories, &filter.categories),
        (Field::EligibleApplicants, &filter.eligible_applicants),
    ] {
        if !values.is_empty() {
            predicates.push(Predicate::Overlaps { field, values: values.clone() });
        }
    }

    if let Some(cost_sharing) = filter.cost_sharing {
        predicates.push(Predicate::Eq {
            field: Field::CostSharing,
            value: Scalar::Flag(cost_sharing.as_flag()),
        });
    }

    let page_window = Window {
        offset: u64::from(filter.page - 1) * u64::from(page_size),
        limit: u64::from(page_size),
    };

    let (order, window, ranking) = match filter.sort {
        SortKey::Relevance => (
            vec![OrderTerm::asc(Field::Id)],
            Window { offset: 0, limit: u64::from(relevance_batch_size.max(1)) },
            Ranking::Relevance { page: page_window },
        ),
        key => (sort_order(key), page_window, Ranking::Store),
    };

    Ok(CompiledQuery { predicates, order, window, ranking })
}

/// Ordering for store-sorted keys, always ending with `id ASC`.
pub fn sort_order(key: SortKey) -> Vec<OrderTerm> {
    let primary = match key {
        SortKey::Relevance => None,
        SortKey::DeadlineAscending => Some(OrderTerm::asc(Field::CloseDate)),
        SortKey::DeadlineDescending => Some(OrderTerm::desc(Field::CloseDate)),
        SortKey::FundingDescending => Some(OrderTerm::desc(Field::AwardCeiling)),
        SortKey::FundingAscending => Some(OrderTerm::asc(Field::AwardCeiling)),
        SortKey::PostedDateDescending => Some(OrderTerm::desc(Field::PostDate)),
        SortKey::TitleAscending => Some(OrderTerm::asc(Field::Title)),
    };
    primary
        .into_iter()
        .chain(std::iter::once(OrderTerm::asc(Field::Id)))
        .collect()
}

fn range_predicate(
    field: Field,
    range: &NullableRange,
    scalar: fn(i64) -> Scalar,
) -> Option<Predicate> {
    ResolvedRange {
        min: range.min.map(scalar),
        max: range.max.map(scalar),
        policy: range.policy,
    }
    .predicate(field)
}

/// Bounds already converted to store literals.
struct ResolvedRange {
    min: Option<Scalar>,
    max: Option<Scalar>,
    policy: NullPolicy,
}

impl ResolvedRange {
    fn predicate(self, field: Field) -> Option<Predicate> {
        let open = self.min.is_none() && self.max.is_none();
        match self.policy {
            NullPolicy::NullOnly => Some(Predicate::IsNull { field }),
            NullPolicy::Bounded if open => Some(Predicate::NotNull { field }),
            NullPolicy::Bounded => Some(Predicate::Range { field, min: self.min, max: self.max }),
            NullPolicy::BoundedOrNull if open => None,
            NullPolicy::BoundedOrNull => Some(Predicate::Or {
                any: vec![
                    Predicate::Range { field, min: self.min, max: self.max },
                    Predicate::IsNull { field },
                ],
            }),
        }
    }
}

impl Predicate {
    /// Evaluate against a single record in memory.
    pub fn matches(&self, grant: &GrantRecord) -> bool {
        match self {
            Predicate::Range { field, min, max } => {
                let value = grant.value(*field);
                if value.is_null() {
                    return false;
                }
                let above_min = min
                    .as_ref()
                    .map_or(true, |m| compare_scalar(value, m).is_some_and(|o| o != Ordering::Less));
                let below_max = max.as_ref().map_or(true, |m| {
                    compare_scalar(value, m).is_some_and(|o| o != Ordering::Greater)
                });
                above_min && below_max
            }
            Predicate::In { field, values } => match grant.value(*field) {
                FieldValue::Text(Some(s)) => values.iter().any(|v| v == s),
                _ => false,
            },
            Predicate::Overlaps { field, values } => match grant.value(*field) {
                FieldValue::Set(items) => items.iter().any(|item| values.contains(item)),
                _ => false,
            },
            Predicate::Eq { field, value } => {
                compare_scalar(grant.value(*field), value) == Some(Ordering::Equal)
            }
            Predicate::IsNull { field } => grant.value(*field).is_null(),
            Predicate::NotNull { field } => !grant.value(*field).is_null(),
            Predicate::Contains { field, needle } => match grant.value(*field) {
                FieldValue::Text(Some(s)) => s.to_ascii_lowercase().contains(needle.as_str()),
                _ => false,
            },
            Predicate::Or { any } => any.iter().any(|p| p.matches(grant)),
        }
    }
}

fn compare_scalar(value: FieldValue<'_>, literal: &Scalar) -> Option<Ordering> {
    match (value, literal) {
        (FieldValue::Integer(Some(v)), Scalar::Integer(l)) => Some(v.cmp(l)),
        (FieldValue::Date(Some(v)), Scalar::Date(l)) => Some(v.cmp(l)),
        (FieldValue::Text(Some(v)), Scalar::Text(l)) => Some(v.cmp(l.as_str())),
        (FieldValue::Flag(Some(v)), Scalar::Flag(l)) => Some(v.cmp(l)),
        _ => None,
    }
}

/// Compare two records under `order`. Nulls sort last in either direction.
pub fn compare_records(a: &GrantRecord, b: &GrantRecord, order: &[OrderTerm]) -> Ordering {
    order
        .iter()
        .map(|term| compare_field(a.value(term.field), b.value(term.field), term.direction))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

fn compare_field(a: FieldValue<'_>, b: FieldValue<'_>, direction: Direction) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }
    let ord = match (a, b) {
        (FieldValue::Text(x), FieldValue::Text(y)) => x.cmp(&y),
        (FieldValue::Integer(x), FieldValue::Integer(y)) => x.cmp(&y),
        (FieldValue::Date(x), FieldValue::Date(y)) => x.cmp(&y),
        (FieldValue::Flag(x), FieldValue::Flag(y)) => x.cmp(&y),
        (FieldValue::Set(x), FieldValue::Set(y)) => x.cmp(y),
        _ => Ordering::Equal,
    };
    match direction {
        Direction::Asc => ord,
        Direction::Desc => ord.reverse(),
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Integer(v) => write!(f, "{v}"),
            Scalar::Date(v) => write!(f, "'{v}'"),
            Scalar::Text(v) => write!(f, "'{v}'"),
            Scalar::Flag(v) => write!(f, "{v}"),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Range { field, min, max } => match (min, max) {
                (Some(lo), Some(hi)) => write!(f, "{field} BETWEEN {lo} AND {hi}"),
                (Some(lo), None) => write!(f, "{field} >= {lo}"),
                (None, Some(hi)) => write!(f, "{field} <= {hi}"),
                (None, None) => write!(f, "{field} IS NOT NULL"),
            },
            Predicate::In { field, values } => write!(f, "{field} IN ({})", quoted(values)),
            Predicate::Overlaps { field, values } => {
                write!(f, "{field} OVERLAPS ({})", quoted(values))
            }
            Predicate::Eq { field, value } => write!(f, "{field} = {value}"),
            Predicate::IsNull { field } => write!(f, "{field} IS NULL"),
            Predicate::NotNull { field } => write!(f, "{field} IS NOT NULL"),
            Predicate::Contains { field, needle } => write!(f, "{field} CONTAINS '{needle}'"),
            Predicate::Or { any } => {
                let parts: Vec<String> = any.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(" OR "))
            }
        }
    }
}

fn quoted(values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("'{v}'"))
        .collect::<Vec<_>>()
        .join(", ")
}
