//! Shared types used across metricvault crates.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Branch name recorded when a caller does not name one.
pub const DEFAULT_BRANCH: &str = "main";

/// The closed set of code-quality metrics persisted for every data point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Coverage,
    DuplicatedLinesDensity,
    Bugs,
    ReliabilityRating,
    Vulnerabilities,
    SecurityRating,
    SecurityHotspots,
    SecurityReviewRating,
    SecurityHotspotsReviewed,
    CodeSmells,
    SqaleRating,
    MajorViolations,
    MinorViolations,
    Violations,
}

impl Metric {
    /// Every stored metric, in storage order.
    pub const ALL: [Metric; 14] = [
        Metric::Coverage,
        Metric::DuplicatedLinesDensity,
        Metric::Bugs,
        Metric::ReliabilityRating,
        Metric::Vulnerabilities,
        Metric::SecurityRating,
        Metric::SecurityHotspots,
        Metric::SecurityReviewRating,
        Metric::SecurityHotspotsReviewed,
        Metric::CodeSmells,
        Metric::SqaleRating,
        Metric::MajorViolations,
        Metric::MinorViolations,
        Metric::Violations,
    ];

    /// Metrics that must be present before stored data counts as coverage.
    pub const REQUIRED_FOR_COVERAGE: [Metric; 5] = [
        Metric::Vulnerabilities,
        Metric::SecurityHotspots,
        Metric::DuplicatedLinesDensity,
        Metric::SecurityRating,
        Metric::ReliabilityRating,
    ];

    /// Field name used in storage and on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Coverage => "coverage",
            Metric::DuplicatedLinesDensity => "duplicated_lines_density",
            Metric::Bugs => "bugs",
            Metric::ReliabilityRating => "reliability_rating",
            Metric::Vulnerabilities => "vulnerabilities",
            Metric::SecurityRating => "security_rating",
            Metric::SecurityHotspots => "security_hotspots",
            Metric::SecurityReviewRating => "security_review_rating",
            Metric::SecurityHotspotsReviewed => "security_hotspots_reviewed",
            Metric::CodeSmells => "code_smells",
            Metric::SqaleRating => "sqale_rating",
            Metric::MajorViolations => "major_violations",
            Metric::MinorViolations => "minor_violations",
            Metric::Violations => "violations",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known metric.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown metric: {0}")]
pub struct UnknownMetric(pub String);

impl FromStr for Metric {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownMetric(s.to_string()))
    }
}

/// One aggregated data point as produced by a metrics source.
///
/// Values are kept loosely typed: sources report some ratings as strings
/// and may omit metrics entirely. The store normalizes them on write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    /// Calendar day (`YYYY-MM-DD`) or a full timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Metric name → raw value.
    #[serde(flatten)]
    pub values: BTreeMap<String, serde_json::Value>,
}

impl MetricRow {
    pub fn new(date: impl Into<String>) -> Self {
        Self {
            date: Some(date.into()),
            values: BTreeMap::new(),
        }
    }

    /// Builder method: set a metric value.
    pub fn with(mut self, metric: Metric, value: impl Into<serde_json::Value>) -> Self {
        self.values.insert(metric.as_str().to_string(), value.into());
        self
    }

    pub fn value(&self, metric: Metric) -> Option<&serde_json::Value> {
        self.values.get(metric.as_str())
    }
}

/// A stored metric value.
///
/// Most metrics are numbers; some sources report ratings as letters,
/// which are kept as text rather than dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(v) => Some(*v),
            MetricValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetricValue::Text(s) => Some(s),
            MetricValue::Number(_) => None,
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Number(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::Text(value)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(v) => write!(f, "{v}"),
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

/// A metric row as read back from storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub project_key: String,
    pub branch: String,
    pub date: String,
    /// Metrics present on the row; absent means null.
    pub metrics: BTreeMap<Metric, MetricValue>,
}

impl MetricRecord {
    /// Numeric view of a metric. Text values read as `None`.
    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.metrics.get(&metric).and_then(MetricValue::as_f64)
    }

    pub fn value(&self, metric: Metric) -> Option<&MetricValue> {
        self.metrics.get(&metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_round_trip_through_from_str() {
        for metric in Metric::ALL {
            assert_eq!(metric.as_str().parse::<Metric>(), Ok(metric));
        }
        assert!("ssn".parse::<Metric>().is_err());
    }

    #[test]
    fn metric_row_flattens_values() {
        let row: MetricRow = serde_json::from_str(
            r#"{"date": "2025-01-01", "bugs": 3, "security_rating": "1.0"}"#,
        )
        .unwrap();
        assert_eq!(row.date.as_deref(), Some("2025-01-01"));
        assert_eq!(row.value(Metric::Bugs), Some(&serde_json::json!(3)));
        assert_eq!(
            row.value(Metric::SecurityRating),
            Some(&serde_json::json!("1.0"))
        );
    }

    #[test]
    fn record_serializes_metric_keys_as_names() {
        let mut metrics = BTreeMap::new();
        metrics.insert(Metric::CodeSmells, MetricValue::from(12.0));
        metrics.insert(Metric::SecurityRating, MetricValue::from("A"));
        let record = MetricRecord {
            project_key: "p".to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            date: "2025-01-01".to_string(),
            metrics,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"code_smells\":12.0"));
        assert!(json.contains("\"security_rating\":\"A\""));

        let back: MetricRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
