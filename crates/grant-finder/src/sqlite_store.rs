//! SQLite-backed [`GrantStore`] and [`PreferenceStore`] implementation.
//!
//! Compiled predicates are rendered into a `WHERE` clause with
//! [`sqlx::QueryBuilder`]; every literal is a bound parameter and only
//! column names from
//! [`Field::as_str`](grant_finder_core::models::Field::as_str) are spliced into the SQL text.
//!
//! | Predicate | SQL |
//! |-----------|-----|
//! | `Range` | `(col IS NOT NULL AND col >= ? AND col <= ?)` |
//! | `In` | `col IN (?, ...)` |
//! | `Overlaps` | `EXISTS (SELECT 1 FROM json_each(grants.col) WHERE json_each.value IN (?, ...))` |
//! | `Contains` | `instr(lower(coalesce(col, '')), ?) > 0` |
//! | `IsNull` | `col IS NULL` (empty JSON array for set columns) |
//!
//! Ordering renders each term as `col IS NULL, col ASC|DESC` so nulls sort
//! last in both directions, matching the in-memory store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use grant_finder_core::models::{FieldKind, GrantRecord, PreferenceProfile, UserPreferences};
use grant_finder_core::query::{Direction, OrderTerm, Predicate, Scalar, Window};
use grant_finder_core::store::{GrantStore, PreferenceStore};

const GRANT_COLUMNS: &str = "id, title, agency, description, award_ceiling, close_date, \
     post_date, funding_type, cost_sharing, categories, eligible_applicants, url";

/// SQLite implementation of both store traits over the `grants` and
/// `user_preferences` tables.
pub struct SqliteGrantStore {
    pool: SqlitePool,
}

impl SqliteGrantStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace grant records by id in a single transaction.
    pub async fn upsert_grants(&self, grants: &[GrantRecord]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        for grant in grants {
            sqlx::query(
                r#"
                INSERT INTO grants (id, title, agency, description, award_ceiling, close_date,
                                    post_date, funding_type, cost_sharing, categories,
                                    eligible_applicants, url)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    agency = excluded.agency,
                    description = excluded.description,
                    award_ceiling = excluded.award_ceiling,
                    close_date = excluded.close_date,
                    post_date = excluded.post_date,
                    funding_type = excluded.funding_type,
                    cost_sharing = excluded.cost_sharing,
                    categories = excluded.categories,
                    eligible_applicants = excluded.eligible_applicants,
                    url = excluded.url
                "#,
            )
            .bind(&grant.id)
            .bind(&grant.title)
            .bind(&grant.agency)
            .bind(&grant.description)
            .bind(grant.award_ceiling)
            .bind(grant.close_date.map(|d| d.to_string()))
            .bind(grant.post_date.map(|d| d.to_string()))
            .bind(&grant.funding_type)
            .bind(grant.cost_sharing)
            .bind(serde_json::to_string(&grant.categories)?)
            .bind(serde_json::to_string(&grant.eligible_applicants)?)
            .bind(&grant.url)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert grant {}", grant.id))?;
        }
        tx.commit().await?;
        Ok(grants.len() as u64)
    }

    /// Insert or replace preference profiles by user id.
    pub async fn upsert_preferences(&self, profiles: &[PreferenceProfile]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        for profile in profiles {
            let prefs = &profile.preferences;
            let (band_min, band_max) = match prefs.preferred_funding_band {
                Some((lo, hi)) => (Some(lo), Some(hi)),
                None => (None, None),
            };
            sqlx::query(
                r#"
                INSERT INTO user_preferences (user_id, categories, agencies,
                                              funding_band_min, funding_band_max)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(user_id) DO UPDATE SET
                    categories = excluded.categories,
                    agencies = excluded.agencies,
                    funding_band_min = excluded.funding_band_min,
                    funding_band_max = excluded.funding_band_max
                "#,
            )
            .bind(&profile.user_id)
            .bind(serde_json::to_string(&prefs.preferred_categories)?)
            .bind(serde_json::to_string(&prefs.preferred_agencies)?)
            .bind(band_min)
            .bind(band_max)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert preferences for {}", profile.user_id))?;
        }
        tx.commit().await?;
        Ok(profiles.len() as u64)
    }
}

#[async_trait]
impl GrantStore for SqliteGrantStore {
    async fn count(&self, predicates: &[Predicate]) -> Result<u64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM grants");
        push_where(&mut qb, predicates);
        let n: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(n.max(0) as u64)
    }

    async fn fetch(
        &self,
        predicates: &[Predicate],
        order: &[OrderTerm],
        window: Window,
    ) -> Result<Vec<GrantRecord>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {GRANT_COLUMNS} FROM grants"));
        push_where(&mut qb, predicates);
        push_order(&mut qb, order);
        qb.push(" LIMIT ")
            .push_bind(i64::try_from(window.limit).unwrap_or(i64::MAX))
            .push(" OFFSET ")
            .push_bind(i64::try_from(window.offset).unwrap_or(i64::MAX));

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_grant).collect()
    }
}

#[async_trait]
impl PreferenceStore for SqliteGrantStore {
    async fn get_preferences(&self, user_id: &str) -> Result<Option<UserPreferences>> {
        let row = sqlx::query(
            "SELECT categories, agencies, funding_band_min, funding_band_max \
             FROM user_preferences WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let categories: String = row.try_get("categories")?;
        let agencies: String = row.try_get("agencies")?;
        let band_min: Option<i64> = row.try_get("funding_band_min")?;
        let band_max: Option<i64> = row.try_get("funding_band_max")?;

        Ok(Some(UserPreferences {
            preferred_categories: serde_json::from_str(&categories)
                .with_context(|| format!("Malformed categories for user {user_id}"))?,
            preferred_agencies: serde_json::from_str(&agencies)
                .with_context(|| format!("Malformed agencies for user {user_id}"))?,
            preferred_funding_band: band_min.zip(band_max),
        }))
    }
}

fn push_where(qb: &mut QueryBuilder<'_, Sqlite>, predicates: &[Predicate]) {
    if predicates.is_empty() {
        return;
    }
    qb.push(" WHERE ");
    for (i, predicate) in predicates.iter().enumerate() {
        if i > 0 {
            qb.push(" AND ");
        }
        push_predicate(qb, predicate);
    }
}

fn push_predicate(qb: &mut QueryBuilder<'_, Sqlite>, predicate: &Predicate) {
    match predicate {
        Predicate::Range { field, min, max } => {
            let col = field.as_str();
            qb.push("(").push(col).push(" IS NOT NULL");
            if let Some(lo) = min {
                qb.push(" AND ").push(col).push(" >= ");
                push_scalar(qb, lo);
            }
            if let Some(hi) = max {
                qb.push(" AND ").push(col).push(" <= ");
                push_scalar(qb, hi);
            }
            qb.push(")");
        }
        Predicate::In { field, values } => {
            if values.is_empty() {
                qb.push("0");
                return;
            }
            qb.push(field.as_str()).push(" IN (");
            let mut list = qb.separated(", ");
            for value in values {
                list.push_bind(value.clone());
            }
            list.push_unseparated(")");
        }
        Predicate::Overlaps { field, values } => {
            if values.is_empty() {
                qb.push("0");
                return;
            }
            qb.push("EXISTS (SELECT 1 FROM json_each(grants.")
                .push(field.as_str())
                .push(") WHERE json_each.value IN (");
            let mut list = qb.separated(", ");
            for value in values {
                list.push_bind(value.clone());
            }
            list.push_unseparated("))");
        }
        Predicate::Eq { field, value } => {
            qb.push(field.as_str()).push(" = ");
            push_scalar(qb, value);
        }
        Predicate::IsNull { field } => {
            let col = field.as_str();
            if field.kind() == FieldKind::Set {
                qb.push("(")
                    .push(col)
                    .push(" IS NULL OR json_array_length(")
                    .push(col)
                    .push(") = 0)");
            } else {
                qb.push(col).push(" IS NULL");
            }
        }
        Predicate::NotNull { field } => {
            let col = field.as_str();
            if field.kind() == FieldKind::Set {
                qb.push("(")
                    .push(col)
                    .push(" IS NOT NULL AND json_array_length(")
                    .push(col)
                    .push(") > 0)");
            } else {
                qb.push(col).push(" IS NOT NULL");
            }
        }
        Predicate::Contains { field, needle } => {
            qb.push("instr(lower(coalesce(")
                .push(field.as_str())
                .push(", '')), ")
                .push_bind(needle.clone())
                .push(") > 0");
        }
        Predicate::Or { any } => {
            if any.is_empty() {
                qb.push("0");
                return;
            }
            qb.push("(");
            for (i, p) in any.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                push_predicate(qb, p);
            }
            qb.push(")");
        }
    }
}

fn push_scalar(qb: &mut QueryBuilder<'_, Sqlite>, scalar: &Scalar) {
    match scalar {
        Scalar::Integer(v) => qb.push_bind(*v),
        Scalar::Date(d) => qb.push_bind(d.to_string()),
        Scalar::Text(t) => qb.push_bind(t.clone()),
        Scalar::Flag(b) => qb.push_bind(*b),
    };
}

fn push_order(qb: &mut QueryBuilder<'_, Sqlite>, order: &[OrderTerm]) {
    let terms: Vec<&OrderTerm> = order
        .iter()
        .filter(|t| t.field.kind() != FieldKind::Set)
        .collect();
    if terms.is_empty() {
        return;
    }
    qb.push(" ORDER BY ");
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        let col = term.field.as_str();
        let direction = match term.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        qb.push(col)
            .push(" IS NULL, ")
            .push(col)
            .push(" ")
            .push(direction);
    }
}

fn row_to_grant(row: &SqliteRow) -> Result<GrantRecord> {
    let id: String = row.try_get("id")?;
    let categories: String = row.try_get("categories")?;
    let applicants: String = row.try_get("eligible_applicants")?;

    Ok(GrantRecord {
        title: row.try_get("title")?,
        agency: row.try_get("agency")?,
        description: row.try_get("description")?,
        award_ceiling: row.try_get("award_ceiling")?,
        close_date: parse_date(row.try_get("close_date")?)
            .with_context(|| format!("Malformed close_date on grant {id}"))?,
        post_date: parse_date(row.try_get("post_date")?)
            .with_context(|| format!("Malformed post_date on grant {id}"))?,
        funding_type: row.try_get("funding_type")?,
        cost_sharing: row.try_get("cost_sharing")?,
        categories: serde_json::from_str(&categories)
            .with_context(|| format!("Malformed categories on grant {id}"))?,
        eligible_applicants: serde_json::from_str(&applicants)
            .with_context(|| format!("Malformed eligible_applicants on grant {id}"))?,
        url: row.try_get("url")?,
        id,
    })
}

fn parse_date(raw: Option<String>) -> Result<Option<NaiveDate>> {
    raw.map(|s| s.parse::<NaiveDate>().with_context(|| format!("not an ISO date: {s}")))
        .transpose()
}

/// Render predicates as SQL text with `?` placeholders, for `--explain`.
pub fn where_clause_sql(predicates: &[Predicate]) -> String {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM grants");
    push_where(&mut qb, predicates);
    qb.sql().to_string()
}
