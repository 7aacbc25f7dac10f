//! Decides whether stored data can stand in for a remote fetch.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use metricvault_core::{CoverageConfig, Metric, MetricRecord};
use serde::Serialize;

use crate::guard::Bounded;

/// Reason reported when a window holds no rows at all.
pub const NO_STORED_DATA: &str = "no stored data";

/// Thresholds applied by [`evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageRules {
    /// Latest row must be younger than this many days.
    pub max_age_days: i64,
    /// One row is required per this many requested days (at least one).
    pub days_per_record: u32,
}

impl Default for CoverageRules {
    fn default() -> Self {
        Self::from_config(&CoverageConfig::default())
    }
}

impl CoverageRules {
    pub fn from_config(config: &CoverageConfig) -> Self {
        Self {
            max_age_days: config.max_age_days(),
            days_per_record: config.days_per_record(),
        }
    }

    pub fn required_records(&self, days: u32) -> usize {
        (days / self.days_per_record.max(1)).max(1) as usize
    }
}

/// Verdict on a project's stored window. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageResult {
    pub has_coverage: bool,
    pub record_count: usize,
    pub latest_date: Option<String>,
    pub oldest_date: Option<String>,
    pub days_since_latest: Option<i64>,
    pub missing_metrics: Vec<Metric>,
    pub reason: String,
    /// The retrieval behind this verdict hit the result cap.
    pub truncated: bool,
    /// The evaluated rows, kept when coverage holds so callers can use them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<MetricRecord>>,
}

impl CoverageResult {
    fn no_data(truncated: bool) -> Self {
        Self {
            has_coverage: false,
            record_count: 0,
            latest_date: None,
            oldest_date: None,
            days_since_latest: None,
            missing_metrics: Vec::new(),
            reason: NO_STORED_DATA.to_string(),
            truncated,
            records: None,
        }
    }
}

/// Parse a stored date into naive UTC.
///
/// Accepts a bare day, RFC 3339, the `+0000` offset form and naive
/// timestamps. Anything else is `None`.
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return day.and_hms_opt(0, 0, 0);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .into_iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// Judge a retrieved `days` window against `rules` as of `now` (naive UTC).
pub fn evaluate(
    records: Bounded<MetricRecord>,
    days: u32,
    rules: &CoverageRules,
    now: NaiveDateTime,
) -> CoverageResult {
    let truncated = records.truncated;
    let records = records.items;
    if records.is_empty() {
        return CoverageResult::no_data(truncated);
    }

    let dates: Vec<NaiveDateTime> = records.iter().filter_map(|r| parse_date(&r.date)).collect();
    let latest = dates.iter().max().copied();
    let oldest = dates.iter().min().copied();
    let days_since_latest = latest.map(|latest| (now - latest).num_days());

    let missing_metrics: Vec<Metric> = Metric::REQUIRED_FOR_COVERAGE
        .into_iter()
        .filter(|&m| records.iter().all(|r| r.value(m).is_none()))
        .collect();

    let required = rules.required_records(days);
    let mut problems = Vec::new();
    match days_since_latest {
        None => problems.push("no parseable dates".to_string()),
        Some(age) if age >= rules.max_age_days => {
            problems.push(format!("latest data is {age} days old"));
        }
        Some(_) => {}
    }
    if records.len() < required {
        problems.push(format!("{} records, need {required}", records.len()));
    }
    if !missing_metrics.is_empty() {
        let names: Vec<&str> = missing_metrics.iter().map(|m| m.as_str()).collect();
        problems.push(format!("missing metrics: {}", names.join(", ")));
    }

    let has_coverage = problems.is_empty();
    let format_day = |dt: NaiveDateTime| dt.format("%Y-%m-%d").to_string();
    CoverageResult {
        has_coverage,
        record_count: records.len(),
        latest_date: latest.map(format_day),
        oldest_date: oldest.map(format_day),
        days_since_latest,
        missing_metrics,
        reason: if has_coverage {
            "sufficient stored data".to_string()
        } else {
            problems.join("; ")
        },
        truncated,
        records: has_coverage.then_some(records),
    }
}
