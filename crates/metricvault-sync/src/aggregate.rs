//! Per-day aggregation of mixed stored and fetched rows.

use std::collections::BTreeMap;

use metricvault_core::{DEFAULT_BRANCH, Metric, MetricRecord, MetricRow, MetricValue};
use metricvault_store::coverage::parse_date;
use serde::Serialize;

/// The mean of every metric for one project on one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyMetrics {
    pub project_key: String,
    pub date: String,
    pub metrics: BTreeMap<Metric, f64>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Record form of a raw source value. Non-numeric text is kept as text.
fn metric_value(value: &serde_json::Value) -> Option<MetricValue> {
    match value {
        serde_json::Value::Number(n) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .map(MetricValue::Number),
        serde_json::Value::String(s) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Some(MetricValue::Number(v)),
            _ => Some(MetricValue::Text(s.clone())),
        },
        _ => None,
    }
}

/// View a source row as a record of `project`. Undated rows take `today`.
pub fn record_from_row(
    project: &str,
    branch: Option<&str>,
    row: &MetricRow,
    today: &str,
) -> MetricRecord {
    MetricRecord {
        project_key: project.to_string(),
        branch: branch
            .filter(|b| !b.is_empty())
            .unwrap_or(DEFAULT_BRANCH)
            .to_string(),
        date: row.date.clone().unwrap_or_else(|| today.to_string()),
        metrics: Metric::ALL
            .into_iter()
            .filter_map(|m| Some((m, metric_value(row.value(m)?)?)))
            .collect(),
    }
}

/// Calendar day of a stored date, or the raw text when it doesn't parse.
fn day_of(date: &str) -> String {
    parse_date(date)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| date.to_string())
}

/// Collapse records to one row per (project, day), averaging each numeric
/// metric over the records that carry it and rounding to two decimals.
/// Text values take no part in the mean.
pub fn aggregate_daily(records: impl IntoIterator<Item = MetricRecord>) -> Vec<DailyMetrics> {
    let mut groups: BTreeMap<(String, String), BTreeMap<Metric, (f64, u32)>> = BTreeMap::new();
    for record in records {
        let sums = groups
            .entry((record.project_key, day_of(&record.date)))
            .or_default();
        for (metric, value) in record.metrics {
            let Some(value) = value.as_f64() else {
                continue;
            };
            let (sum, count) = sums.entry(metric).or_insert((0.0, 0));
            *sum += value;
            *count += 1;
        }
    }

    groups
        .into_iter()
        .map(|((project_key, date), sums)| DailyMetrics {
            project_key,
            date,
            metrics: sums
                .into_iter()
                .map(|(metric, (sum, count))| (metric, round2(sum / f64::from(count))))
                .collect(),
        })
        .collect()
}
