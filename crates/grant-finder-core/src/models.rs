//! Core data models used throughout Grant Finder.
//!
//! A [`GrantRecord`] is read-only from the engine's point of view: it is
//! created and updated by an external ingestion pipeline and only ever
//! filtered, scored, and counted here.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::GrantError;

/// A single funding opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub agency: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Maximum award in whole dollars. `None` when the listing has no ceiling.
    #[serde(default)]
    pub award_ceiling: Option<i64>,
    #[serde(default)]
    pub close_date: Option<NaiveDate>,
    #[serde(default)]
    pub post_date: Option<NaiveDate>,
    #[serde(default)]
    pub funding_type: Option<String>,
    #[serde(default)]
    pub cost_sharing: Option<bool>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub eligible_applicants: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Ranking preferences for a single user, supplied by a preference store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    #[serde(default)]
    pub preferred_categories: BTreeSet<String>,
    #[serde(default)]
    pub preferred_agencies: BTreeSet<String>,
    /// Inclusive `[min, max]` funding band in dollars.
    #[serde(default)]
    pub preferred_funding_band: Option<(i64, i64)>,
}

/// A stored preference profile keyed by user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceProfile {
    pub user_id: String,
    #[serde(flatten)]
    pub preferences: UserPreferences,
}

/// A filterable, sortable column of a [`GrantRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Id,
    Title,
    Agency,
    Description,
    AwardCeiling,
    CloseDate,
    PostDate,
    FundingType,
    CostSharing,
    Categories,
    EligibleApplicants,
}

/// The shape of a field's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Date,
    Flag,
    Set,
}

impl Field {
    pub const ALL: [Field; 11] = [
        Field::Id,
        Field::Title,
        Field::Agency,
        Field::Description,
        Field::AwardCeiling,
        Field::CloseDate,
        Field::PostDate,
        Field::FundingType,
        Field::CostSharing,
        Field::Categories,
        Field::EligibleApplicants,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Title => "title",
            Field::Agency => "agency",
            Field::Description => "description",
            Field::AwardCeiling => "award_ceiling",
            Field::CloseDate => "close_date",
            Field::PostDate => "post_date",
            Field::FundingType => "funding_type",
            Field::CostSharing => "cost_sharing",
            Field::Categories => "categories",
            Field::EligibleApplicants => "eligible_applicants",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::Id | Field::Title | Field::Agency | Field::Description | Field::FundingType => {
                FieldKind::Text
            }
            Field::AwardCeiling => FieldKind::Integer,
            Field::CloseDate | Field::PostDate => FieldKind::Date,
            Field::CostSharing => FieldKind::Flag,
            Field::Categories | Field::EligibleApplicants => FieldKind::Set,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = GrantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| GrantError::unsupported("field", s))
    }
}

/// A borrowed view of one field on one record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Text(Option<&'a str>),
    Integer(Option<i64>),
    Date(Option<NaiveDate>),
    Flag(Option<bool>),
    Set(&'a [String]),
}

impl FieldValue<'_> {
    /// Scalars are null when absent; sets are null when empty.
    pub fn is_null(&self) -> bool {
        match self {
            FieldValue::Text(v) => v.is_none(),
            FieldValue::Integer(v) => v.is_none(),
            FieldValue::Date(v) => v.is_none(),
            FieldValue::Flag(v) => v.is_none(),
            FieldValue::Set(v) => v.is_empty(),
        }
    }
}

impl GrantRecord {
    pub fn value(&self, field: Field) -> FieldValue<'_> {
        match field {
            Field::Id => FieldValue::Text(Some(&self.id)),
            Field::Title => FieldValue::Text(Some(&self.title)),
            Field::Agency => FieldValue::Text(self.agency.as_deref()),
            Field::Description => FieldValue::Text(self.description.as_deref()),
            Field::AwardCeiling => FieldValue::Integer(self.award_ceiling),
            Field::CloseDate => FieldValue::Date(self.close_date),
            Field::PostDate => FieldValue::Date(self.post_date),
            Field::FundingType => FieldValue::Text(self.funding_type.as_deref()),
            Field::CostSharing => FieldValue::Flag(self.cost_sharing),
            Field::Categories => FieldValue::Set(&self.categories),
            Field::EligibleApplicants => FieldValue::Set(&self.eligible_applicants),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_round_trip() {
        for field in Field::ALL {
            assert_eq!(field.as_str().parse::<Field>().unwrap(), field);
        }
    }

    #[test]
    fn unknown_field_is_unsupported() {
        let err = "match_score".parse::<Field>().unwrap_err();
        assert!(matches!(err, GrantError::UnsupportedFilter { .. }));
    }

    #[test]
    fn empty_set_counts_as_null() {
        let grant: GrantRecord =
            serde_json::from_str(r#"{"id":"g1","title":"Seed"}"#).unwrap();
        assert!(grant.value(Field::Categories).is_null());
        assert!(grant.value(Field::AwardCeiling).is_null());
        assert!(!grant.value(Field::Title).is_null());
    }

    #[test]
    fn deserializes_camel_case_with_iso_dates() {
        let grant: GrantRecord = serde_json::from_str(
            r#"{"id":"g2","title":"Arts","awardCeiling":75000,"closeDate":"2025-03-01","categories":["Arts"]}"#,
        )
        .unwrap();
        assert_eq!(grant.award_ceiling, Some(75_000));
        assert_eq!(grant.close_date, NaiveDate::from_ymd_opt(2025, 3, 1));
        assert_eq!(grant.categories, vec!["Arts".to_string()]);
    }
}
