//! Aggregate statistics over the full grant collection.
//!
//! A batch, out-of-band computation: [`scan_collection`] reads every
//! record through the [`GrantStore`] and [`compute_snapshot`] derives the
//! distribution summary. Never called from the request path.
//!
//! Each metric is computed independently. A metric that cannot be computed
//! (unknown field, wrong field kind, no values, malformed buckets) is
//! reported as [`Metric::Error`] and the remaining metrics still report.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{Field, FieldKind, FieldValue, GrantRecord};
use crate::store::{scan_matching, GrantStore};

/// A named half-open bucket `[min, max)`. `max = None` is open-ended and
/// only allowed on the last bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    pub min: i64,
    #[serde(default)]
    pub max: Option<i64>,
}

/// Which metrics to compute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRequest {
    pub null_fields: Vec<String>,
    pub categorical_fields: Vec<String>,
    pub top_n: usize,
    pub numeric_field: String,
    pub buckets: Vec<Bucket>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatsError {
    #[error("unknown field: {0}")]
    UnknownField(String),
    #[error("field {field} is not {expected}")]
    WrongKind { field: Field, expected: &'static str },
    #[error("no non-null values for {0}")]
    NoValues(Field),
    #[error("invalid buckets: {0}")]
    InvalidBuckets(String),
    #[error("top_n must be >= 1")]
    ZeroTopN,
}

/// Outcome of one metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric<T> {
    Ok(T),
    Error(String),
}

impl<T> Metric<T> {
    fn from_result(name: &str, result: Result<T, StatsError>) -> Self {
        match result {
            Ok(value) => Metric::Ok(value),
            Err(err) => {
                tracing::warn!(metric = name, error = %err, "Statistics metric failed.");
                Metric::Error(err.to_string())
            }
        }
    }

    pub fn ok(&self) -> Option<&T> {
        match self {
            Metric::Ok(v) => Some(v),
            Metric::Error(_) => None,
        }
    }
}

/// A metric computed for one named field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMetric<T> {
    pub field: String,
    #[serde(flatten)]
    pub outcome: Metric<T>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NullShare {
    pub null_count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyEntry {
    pub name: String,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketCount {
    pub name: String,
    pub min: i64,
    pub max: Option<i64>,
    pub count: u64,
    /// Share of records that have a value for the field.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub field: Field,
    pub buckets: Vec<BucketCount>,
    /// Values that fall below the first bucket or in a gap between buckets.
    pub unbucketed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSummary {
    pub field: Field,
    pub count: u64,
    pub min: i64,
    /// Element at `len / 2` of the sorted values; not interpolated.
    pub median: i64,
    pub max: i64,
}

/// Point-in-time distribution summary. Never persisted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total: u64,
    pub null_shares: Vec<FieldMetric<NullShare>>,
    pub top_values: Vec<FieldMetric<Vec<FrequencyEntry>>>,
    pub histogram: Metric<Histogram>,
    pub summary: Metric<NumericSummary>,
}

/// Read the whole collection through `fetch` in `id`-ordered batches.
pub async fn scan_collection<S: GrantStore + ?Sized>(
    store: &S,
    batch_size: u64,
) -> anyhow::Result<Vec<GrantRecord>> {
    let all = scan_matching(store, &[], batch_size).await?;
    tracing::debug!(records = all.len(), "Scanned grant collection.");
    Ok(all)
}

pub fn compute_snapshot(records: &[GrantRecord], request: &StatsRequest) -> StatsSnapshot {
    let total = records.len() as u64;

    let null_shares = request
        .null_fields
        .iter()
        .map(|name| FieldMetric {
            field: name.clone(),
            outcome: Metric::from_result(
                "null_share",
                resolve(name).map(|field| null_share(records, field)),
            ),
        })
        .collect();

    let top_values = request
        .categorical_fields
        .iter()
        .map(|name| FieldMetric {
            field: name.clone(),
            outcome: Metric::from_result(
                "top_values",
                resolve(name).and_then(|field| top_values(records, field, request.top_n)),
            ),
        })
        .collect();

    let histogram = Metric::from_result(
        "histogram",
        resolve(&request.numeric_field).and_then(|field| histogram(records, field, &request.buckets)),
    );

    let summary = Metric::from_result(
        "summary",
        resolve(&request.numeric_field).and_then(|field| numeric_summary(records, field)),
    );

    StatsSnapshot { total, null_shares, top_values, histogram, summary }
}

fn resolve(name: &str) -> Result<Field, StatsError> {
    name.parse::<Field>()
        .map_err(|_| StatsError::UnknownField(name.to_string()))
}

pub fn null_share(records: &[GrantRecord], field: Field) -> NullShare {
    let null_count = records.iter().filter(|r| r.value(field).is_null()).count() as u64;
    NullShare {
        null_count,
        percentage: percentage(null_count, records.len() as u64),
    }
}

/// Most frequent values, ties in first-seen order. Set-valued fields count
/// each element; percentages are relative to the record count.
pub fn top_values(
    records: &[GrantRecord],
    field: Field,
    n: usize,
) -> Result<Vec<FrequencyEntry>, StatsError> {
    if n == 0 {
        return Err(StatsError::ZeroTopN);
    }
    if !matches!(field.kind(), FieldKind::Text | FieldKind::Set) {
        return Err(StatsError::WrongKind { field, expected: "categorical" });
    }

    let mut counts: Vec<(String, u64)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut bump = |name: &str| match index.get(name) {
        Some(&i) => counts[i].1 += 1,
        None => {
            index.insert(name.to_string(), counts.len());
            counts.push((name.to_string(), 1));
        }
    };

    for record in records {
        match record.value(field) {
            FieldValue::Text(Some(v)) => bump(v),
            FieldValue::Set(items) => {
                for v in items {
                    bump(v.as_str());
                }
            }
            _ => {}
        }
    }

    // Stable sort keeps first-seen order among equal counts.
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    let total = records.len() as u64;
    Ok(counts
        .into_iter()
        .take(n)
        .map(|(name, count)| FrequencyEntry {
            name,
            count,
            percentage: percentage(count, total),
        })
        .collect())
}

pub fn histogram(
    records: &[GrantRecord],
    field: Field,
    buckets: &[Bucket],
) -> Result<Histogram, StatsError> {
    validate_buckets(buckets)?;
    let values = integer_values(records, field)?;

    let mut counts = vec![0u64; buckets.len()];
    let mut unbucketed = 0u64;
    for v in &values {
        match buckets
            .iter()
            .position(|b| *v >= b.min && b.max.map_or(true, |max| *v < max))
        {
            Some(i) => counts[i] += 1,
            None => unbucketed += 1,
        }
    }

    let with_value = values.len() as u64;
    Ok(Histogram {
        field,
        buckets: buckets
            .iter()
            .zip(counts)
            .map(|(b, count)| BucketCount {
                name: b.name.clone(),
                min: b.min,
                max: b.max,
                count,
                percentage: percentage(count, with_value),
            })
            .collect(),
        unbucketed,
    })
}

pub fn numeric_summary(records: &[GrantRecord], field: Field) -> Result<NumericSummary, StatsError> {
    let mut values = integer_values(records, field)?;
    if values.is_empty() {
        return Err(StatsError::NoValues(field));
    }
    values.sort_unstable();
    Ok(NumericSummary {
        field,
        count: values.len() as u64,
        min: values[0],
        median: values[values.len() / 2],
        max: values[values.len() - 1],
    })
}

fn integer_values(records: &[GrantRecord], field: Field) -> Result<Vec<i64>, StatsError> {
    if field.kind() != FieldKind::Integer {
        return Err(StatsError::WrongKind { field, expected: "numeric" });
    }
    Ok(records
        .iter()
        .filter_map(|r| match r.value(field) {
            FieldValue::Integer(v) => v,
            _ => None,
        })
        .collect())
}

fn validate_buckets(buckets: &[Bucket]) -> Result<(), StatsError> {
    if buckets.is_empty() {
        return Err(StatsError::InvalidBuckets("no buckets configured".into()));
    }
    for (i, b) in buckets.iter().enumerate() {
        let last = i + 1 == buckets.len();
        match b.max {
            None if !last => {
                return Err(StatsError::InvalidBuckets(format!(
                    "only the last bucket may be open-ended, not {:?}",
                    b.name
                )));
            }
            Some(max) if max <= b.min => {
                return Err(StatsError::InvalidBuckets(format!(
                    "bucket {:?} has max <= min",
                    b.name
                )));
            }
            _ => {}
        }
        if let (Some(max), Some(next)) = (b.max, buckets.get(i + 1)) {
            if next.min < max {
                return Err(StatsError::InvalidBuckets(format!(
                    "bucket {:?} overlaps {:?}",
                    b.name, next.name
                )));
            }
        }
    }
    Ok(())
}

fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 * 100.0 / total as f64 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryGrantStore;
    use chrono::NaiveDate;

    fn grant(i: usize) -> GrantRecord {
        GrantRecord {
            id: format!("g{i:03}"),
            title: format!("Grant {i}"),
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

    /// 100 records: 20 without a close date, NSF on 30, NIH on 25, DOE on 25,
    /// USDA on 20, ceilings 1_000 × i for every non-multiple of 10.
    fn fixture() -> Vec<GrantRecord> {
        let close = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        (0..100)
            .map(|i| {
                let agency = match i % 20 {
                    0..=5 => "NSF",
                    6..=10 => "NIH",
                    11..=15 => "DOE",
                    _ => "USDA",
                };
                GrantRecord {
                    agency: Some(agency.to_string()),
                    close_date: (i % 5 != 0).then_some(close),
                    award_ceiling: (i % 10 != 0).then_some(1_000 * i as i64),
                    categories: if i % 2 == 0 {
                        vec!["Education".into(), "Health".into()]
                    } else {
                        vec!["Health".into()]
                    },
                    ..grant(i)
                }
            })
            .collect()
    }

    fn request() -> StatsRequest {
        StatsRequest {
            null_fields: vec!["close_date".into(), "award_ceiling".into()],
            categorical_fields: vec!["agency".into(), "categories".into()],
            top_n: 3,
            numeric_field: "award_ceiling".into(),
            buckets: vec![
                Bucket { name: "small".into(), min: 0, max: Some(25_000) },
                Bucket { name: "medium".into(), min: 25_000, max: Some(50_000) },
                Bucket { name: "large".into(), min: 50_000, max: None },
            ],
        }
    }

    #[test]
    fn null_close_dates_are_counted() {
        let share = null_share(&fixture(), Field::CloseDate);
        assert_eq!(share.null_count, 20);
        assert_eq!(share.percentage, 20.0);
    }

    #[test]
    fn nsf_ranks_first() {
        let top = top_values(&fixture(), Field::Agency, 10).unwrap();
        assert_eq!(top[0], FrequencyEntry { name: "NSF".into(), count: 30, percentage: 30.0 });
        assert_eq!(top.len(), 4);
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let top = top_values(&fixture(), Field::Agency, 10).unwrap();
        let names: Vec<&str> = top.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["NSF", "NIH", "DOE", "USDA"]);
    }

    #[test]
    fn set_fields_count_each_element() {
        let top = top_values(&fixture(), Field::Categories, 5).unwrap();
        assert_eq!(top[0].name, "Health");
        assert_eq!(top[0].count, 100);
        assert_eq!(top[1].count, 50);
    }

    #[test]
    fn histogram_is_half_open() {
        let records: Vec<GrantRecord> = [0, 24_999, 25_000, 49_999, 50_000, 9_000_000]
            .into_iter()
            .enumerate()
            .map(|(i, c)| GrantRecord { award_ceiling: Some(c), ..grant(i) })
            .collect();
        let h = histogram(&records, Field::AwardCeiling, &request().buckets).unwrap();
        let counts: Vec<u64> = h.buckets.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![2, 2, 2]);
        assert_eq!(h.unbucketed, 0);
        assert!((h.buckets[0].percentage - 33.33).abs() < 1e-9);
    }

    #[test]
    fn histogram_rejects_overlapping_or_open_middle_buckets() {
        let overlapping = vec![
            Bucket { name: "a".into(), min: 0, max: Some(10) },
            Bucket { name: "b".into(), min: 5, max: None },
        ];
        assert!(matches!(
            histogram(&fixture(), Field::AwardCeiling, &overlapping),
            Err(StatsError::InvalidBuckets(_))
        ));
        let open_middle = vec![
            Bucket { name: "a".into(), min: 0, max: None },
            Bucket { name: "b".into(), min: 5, max: None },
        ];
        assert!(histogram(&fixture(), Field::AwardCeiling, &open_middle).is_err());
    }

    #[test]
    fn median_is_middle_element() {
        let records: Vec<GrantRecord> = [5, 1, 9, 3]
            .into_iter()
            .enumerate()
            .map(|(i, c)| GrantRecord { award_ceiling: Some(c), ..grant(i) })
            .collect();
        let s = numeric_summary(&records, Field::AwardCeiling).unwrap();
        assert_eq!((s.min, s.median, s.max, s.count), (1, 5, 9, 4));
    }

    #[test]
    fn failing_metric_does_not_abort_others() {
        let mut request = request();
        request.null_fields.push("match_score".into());
        request.categorical_fields.push("award_ceiling".into());
        let snapshot = compute_snapshot(&fixture(), &request);

        assert_eq!(snapshot.total, 100);
        assert_eq!(snapshot.null_shares[0].outcome.ok().unwrap().null_count, 20);
        assert_eq!(snapshot.null_shares[1].outcome.ok().unwrap().null_count, 10);
        assert!(matches!(snapshot.null_shares[2].outcome, Metric::Error(_)));
        assert!(snapshot.top_values[0].outcome.ok().is_some());
        assert!(matches!(snapshot.top_values[2].outcome, Metric::Error(_)));
        assert!(snapshot.histogram.ok().is_some());
        assert!(snapshot.summary.ok().is_some());
    }

    #[test]
    fn summary_without_values_is_an_error() {
        let records = vec![grant(1), grant(2)];
        assert_eq!(
            numeric_summary(&records, Field::AwardCeiling),
            Err(StatsError::NoValues(Field::AwardCeiling))
        );
    }

    #[tokio::test]
    async fn scan_reads_every_batch() {
        let store = InMemoryGrantStore::with_grants(fixture());
        let all = scan_collection(&store, 7).await.unwrap();
        assert_eq!(all.len(), 100);
        assert_eq!(all[0].id, "g000");
        assert_eq!(all[99].id, "g099");
    }
}
