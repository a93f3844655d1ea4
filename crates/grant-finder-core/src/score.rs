//! Relevance scoring against a user's preference profile.
//!
//! Only used when the sort key is `relevance`; relevance is not a stored
//! column, so the candidate set is scored and ordered in memory.
//!
//! # Scoring
//!
//! ```text
//! score = category + agency + funding + urgency        (0 ≤ score ≤ MAX_SCORE)
//!
//! category = CATEGORY_WEIGHT   if any preferred category is listed
//! agency   = AGENCY_WEIGHT     if the agency is preferred
//! funding  = FUNDING_WEIGHT × exp(-FUNDING_DECAY_RATE × distance / band_scale)
//! urgency  = URGENCY_WEIGHT × 0.5^(days_left / URGENCY_HALF_LIFE_DAYS)
//! ```
//!
//! `distance` is zero inside the preferred band. Expired or undated
//! listings get no urgency bonus; listings without a ceiling get no
//! funding credit.
//!
//! Ordering: score desc, close date asc (nulls last), id asc. The last two
//! keys make equal scores paginate identically across requests.

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{Field, GrantRecord, UserPreferences};
use crate::query::{compare_records, OrderTerm};

pub const CATEGORY_WEIGHT: f64 = 0.35;
pub const AGENCY_WEIGHT: f64 = 0.25;
pub const FUNDING_WEIGHT: f64 = 0.25;
pub const URGENCY_WEIGHT: f64 = 0.15;
pub const MAX_SCORE: f64 = CATEGORY_WEIGHT + AGENCY_WEIGHT + FUNDING_WEIGHT + URGENCY_WEIGHT;

/// Funding credit falls to `exp(-rate)` one band-width outside the band.
pub const FUNDING_DECAY_RATE: f64 = 1.0;
/// Urgency bonus halves every this many days until the deadline.
pub const URGENCY_HALF_LIFE_DAYS: f64 = 30.0;

const TIE_BREAK: [OrderTerm; 2] = [OrderTerm::asc(Field::CloseDate), OrderTerm::asc(Field::Id)];

/// Per-component contribution to a relevance score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub category: f64,
    pub agency: f64,
    pub funding: f64,
    pub urgency: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.category + self.agency + self.funding + self.urgency
    }
}

/// A record with its relevance score, when one was computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredGrant {
    #[serde(flatten)]
    pub grant: GrantRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<ScoreBreakdown>,
}

impl ScoredGrant {
    pub fn unscored(grant: GrantRecord) -> Self {
        Self { grant, score: None, breakdown: None }
    }
}

pub fn score(grant: &GrantRecord, prefs: &UserPreferences, today: NaiveDate) -> ScoreBreakdown {
    let category = if grant
        .categories
        .iter()
        .any(|c| prefs.preferred_categories.contains(c))
    {
        CATEGORY_WEIGHT
    } else {
        0.0
    };

    let agency = match &grant.agency {
        Some(a) if prefs.preferred_agencies.contains(a) => AGENCY_WEIGHT,
        _ => 0.0,
    };

    let funding = match (grant.award_ceiling, prefs.preferred_funding_band) {
        (Some(ceiling), Some(band)) => FUNDING_WEIGHT * funding_proximity(ceiling, band),
        _ => 0.0,
    };

    let urgency = match grant.close_date {
        Some(close) => {
            let days_left = (close - today).num_days();
            if days_left < 0 {
                0.0
            } else {
                URGENCY_WEIGHT * 0.5_f64.powf(days_left as f64 / URGENCY_HALF_LIFE_DAYS)
            }
        }
        None => 0.0,
    };

    ScoreBreakdown { category, agency, funding, urgency }
}

/// `1.0` inside the band, decaying with relative distance outside it.
fn funding_proximity(ceiling: i64, band: (i64, i64)) -> f64 {
    let (lo, hi) = if band.0 <= band.1 { band } else { (band.1, band.0) };
    // Widened so imported extremes cannot overflow.
    let (ceiling, lo, hi) = (i128::from(ceiling), i128::from(lo), i128::from(hi));
    let distance = if ceiling < lo {
        lo - ceiling
    } else if ceiling > hi {
        ceiling - hi
    } else {
        return 1.0;
    };
    let scale = (hi - lo).max(hi).max(1) as f64;
    (-FUNDING_DECAY_RATE * distance as f64 / scale).exp()
}

/// Score and order candidates. Deterministic for identical inputs.
pub fn rank(
    grants: Vec<GrantRecord>,
    prefs: &UserPreferences,
    today: NaiveDate,
) -> Vec<ScoredGrant> {
    let mut scored: Vec<ScoredGrant> = grants
        .into_iter()
        .map(|grant| {
            let breakdown = score(&grant, prefs, today);
            ScoredGrant {
                score: Some(breakdown.total()),
                breakdown: Some(breakdown),
                grant,
            }
        })
        .collect();
    scored.sort_by(compare_scored);
    scored
}

fn compare_scored(a: &ScoredGrant, b: &ScoredGrant) -> Ordering {
    let sa = a.score.unwrap_or(0.0);
    let sb = b.score.unwrap_or(0.0);
    sb.total_cmp(&sa)
        .then_with(|| compare_records(&a.grant, &b.grant, &TIE_BREAK))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    fn grant(id: &str) -> GrantRecord {
        GrantRecord {
            id: id.to_string(),
            title: format!("Grant {id}"),
            agency: None,
            description: None,
            award_ceiling: None,
            close_date: None,
            post_date: None,
            funding_type: None,
            cost_sharing: None,
            categories: Vec::new(),
            eligible_applicants: Vec::new(),
            url: None,
        }
    }

    fn prefs() -> UserPreferences {
        UserPreferences {
            preferred_categories: ["Health".to_string()].into(),
            preferred_agencies: ["NIH".to_string()].into(),
            preferred_funding_band: Some((50_000, 100_000)),
        }
    }

    #[test]
    fn weights_sum_to_one() {
        assert!((MAX_SCORE - 1.0).abs() < 1e-12);
    }

    #[test]
    fn perfect_match_hits_max_score() {
        let g = GrantRecord {
            agency: Some("NIH".into()),
            categories: vec!["Health".into()],
            award_ceiling: Some(75_000),
            close_date: Some(today()),
            ..grant("a")
        };
        let b = score(&g, &prefs(), today());
        assert!((b.total() - MAX_SCORE).abs() < 1e-12);
    }

    #[test]
    fn no_preferences_scores_only_urgency() {
        let g = GrantRecord {
            agency: Some("NIH".into()),
            categories: vec!["Health".into()],
            award_ceiling: Some(75_000),
            close_date: Some(today()),
            ..grant("a")
        };
        let b = score(&g, &UserPreferences::default(), today());
        assert_eq!(b.category + b.agency + b.funding, 0.0);
        assert!((b.urgency - URGENCY_WEIGHT).abs() < 1e-12);
    }

    #[test]
    fn funding_credit_decays_with_distance() {
        let p = prefs();
        let at = |ceiling| score(&GrantRecord { award_ceiling: Some(ceiling), ..grant("a") }, &p, today()).funding;
        assert_eq!(at(60_000), FUNDING_WEIGHT);
        assert!(at(150_000) < FUNDING_WEIGHT);
        assert!(at(500_000) < at(150_000));
        assert!(at(10_000) < at(40_000));
        assert!(at(5_000_000) >= 0.0);
    }

    #[test]
    fn funding_credit_survives_extreme_values() {
        let wide = UserPreferences {
            preferred_funding_band: Some((-5_000_000_000_000_000_000, 5_000_000_000_000_000_000)),
            ..Default::default()
        };
        let at = |ceiling, prefs: &UserPreferences| {
            score(&GrantRecord { award_ceiling: Some(ceiling), ..grant("a") }, prefs, today()).funding
        };

        let above = at(i64::MAX, &wide);
        assert!(above > 0.0 && above < FUNDING_WEIGHT);
        let below = at(i64::MIN, &wide);
        assert!(below > 0.0 && below < FUNDING_WEIGHT);

        let full_range = UserPreferences {
            preferred_funding_band: Some((i64::MIN, i64::MAX)),
            ..Default::default()
        };
        assert_eq!(at(0, &full_range), FUNDING_WEIGHT);

        let narrow = UserPreferences {
            preferred_funding_band: Some((i64::MIN, i64::MIN + 1)),
            ..Default::default()
        };
        let far = at(i64::MAX, &narrow);
        assert!(far.is_finite() && far >= 0.0);
    }

    #[test]
    fn urgency_halves_and_ignores_expired() {
        let p = UserPreferences::default();
        let due = |days: i64| {
            let close = today() + chrono::Duration::days(days);
            score(&GrantRecord { close_date: Some(close), ..grant("a") }, &p, today()).urgency
        };
        assert!((due(30) - URGENCY_WEIGHT / 2.0).abs() < 1e-12);
        assert!(due(5) > due(60));
        assert_eq!(due(-1), 0.0);
        assert_eq!(score(&grant("a"), &p, today()).urgency, 0.0);
    }

    #[test]
    fn ties_break_by_deadline_then_id() {
        let close = today() + chrono::Duration::days(400);
        let candidates = vec![
            GrantRecord { close_date: None, ..grant("a") },
            GrantRecord { close_date: Some(close), ..grant("c") },
            GrantRecord { close_date: Some(close), ..grant("b") },
        ];
        let mut ranked: Vec<ScoredGrant> = candidates
            .into_iter()
            .map(|g| ScoredGrant { score: Some(0.0), breakdown: None, grant: g })
            .collect();
        ranked.sort_by(compare_scored);
        let ids: Vec<&str> = ranked.iter().map(|s| s.grant.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn rank_is_deterministic_under_input_permutation() {
        let p = prefs();
        let base = vec![
            GrantRecord { agency: Some("NIH".into()), ..grant("a") },
            GrantRecord { agency: Some("NIH".into()), ..grant("b") },
            GrantRecord { categories: vec!["Health".into()], ..grant("c") },
            grant("d"),
            grant("e"),
        ];
        let mut reversed = base.clone();
        reversed.reverse();
        let order = |gs: Vec<GrantRecord>| -> Vec<String> {
            rank(gs, &p, today()).into_iter().map(|s| s.grant.id).collect()
        };
        let first = order(base);
        assert_eq!(first, order(reversed));
        assert_eq!(first, vec!["c", "a", "b", "d", "e"]);
    }
}
