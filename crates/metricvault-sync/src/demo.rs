//! Deterministic demo metrics source.
//!
//! Three fixed projects with baselines derived from a SHA-256 of the
//! project key and a sinusoidal drift that flattens on weekends, so the
//! same window always yields the same series.

use chrono::{Datelike, NaiveDate, Utc, Weekday};
use metricvault_core::{Metric, MetricRow};
use sha2::{Digest, Sha256};

use crate::error::SourceResult;
use crate::source::MetricsSource;

/// Demo project keys and display names.
pub const DEMO_PROJECTS: [(&str, &str); 3] = [
    ("demo-project-alpha", "Frontend Web Application"),
    ("demo-project-beta", "Backend Python API"),
    ("demo-project-gamma", "Mobile iOS App"),
];

/// Demo window when a caller does not pick one.
pub const DEMO_DAYS: u32 = 90;

/// Deterministic noise in `[-1.0, 1.0]`.
fn noise(project: &str, salt: &str, index: i64) -> f64 {
    let bytes = Sha256::digest(format!("{project}:{salt}:{index}").as_bytes());
    let raw = u16::from_be_bytes([bytes[0], bytes[1]]);
    f64::from(raw) / f64::from(u16::MAX) * 2.0 - 1.0
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Copy)]
struct Baseline {
    vulnerabilities: f64,
    hotspots: f64,
    bugs: f64,
    duplication: f64,
}

impl Baseline {
    fn for_project(project: &str) -> Self {
        let seed = Sha256::digest(project.as_bytes());
        Self {
            vulnerabilities: f64::from(5 + seed[0] % 15),
            hotspots: f64::from(20 + seed[1] % 30),
            bugs: f64::from(10 + seed[2] % 20),
            duplication: 2.0 + f64::from(seed[3]) / 255.0 * 13.0,
        }
    }
}

/// Serves synthetic history for the demo projects and nothing else.
#[derive(Debug, Clone)]
pub struct DemoSource {
    today: NaiveDate,
}

impl Default for DemoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoSource {
    pub fn new() -> Self {
        Self::as_of(Utc::now().date_naive())
    }

    /// A source whose window ends on `today`.
    pub fn as_of(today: NaiveDate) -> Self {
        Self { today }
    }

    pub fn is_demo_project(project: &str) -> bool {
        DEMO_PROJECTS.iter().any(|(key, _)| *key == project)
    }

    /// One row per day from `today - days` to `today` inclusive.
    pub fn series(&self, project: &str, days: u32) -> Vec<MetricRow> {
        let base = Baseline::for_project(project);
        (0..=i64::from(days))
            .filter_map(|i| {
                let date = self
                    .today
                    .checked_sub_days(chrono::Days::new(u64::from(days) - i as u64))?;
                Some(demo_row(project, &base, i, date))
            })
            .collect()
    }
}

fn demo_row(project: &str, base: &Baseline, index: i64, date: NaiveDate) -> MetricRow {
    let mut drift = (index as f64 / 10.0).sin() * 5.0 + noise(project, "drift", index) * 2.0;
    if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        drift *= 0.1;
    }

    let count = |value: f64| value.max(0.0).trunc();
    let vulnerabilities = count(base.vulnerabilities + drift);
    let hotspots = count(base.hotspots + drift * 2.0);
    let bugs = count(base.bugs + drift);
    let duplication = (base.duplication + drift / 5.0).max(0.0);

    let security_rating = if vulnerabilities == 0.0 {
        1.0
    } else {
        (1.0 + vulnerabilities / 5.0).min(5.0)
    };
    let reliability_rating = if bugs == 0.0 {
        1.0
    } else {
        (1.0 + bugs / 10.0).min(5.0)
    };
    let coverage = round1((85.0 + noise(project, "coverage", index) * 3.0).clamp(50.0, 100.0));

    MetricRow::new(date.format("%Y-%m-%d").to_string())
        .with(Metric::Vulnerabilities, vulnerabilities)
        .with(Metric::SecurityHotspots, hotspots)
        .with(Metric::Bugs, bugs)
        .with(Metric::DuplicatedLinesDensity, round1(duplication))
        .with(Metric::Coverage, coverage)
        .with(Metric::SecurityRating, security_rating)
        .with(Metric::ReliabilityRating, reliability_rating)
        .with(Metric::SqaleRating, (1.0 + duplication / 5.0).clamp(1.0, 5.0))
        .with(Metric::SecurityReviewRating, 1.0)
        .with(Metric::SecurityHotspotsReviewed, 100.0)
        .with(Metric::CodeSmells, count(100.0 + drift * 10.0))
        .with(Metric::Violations, count(150.0 + drift * 15.0))
        .with(Metric::MajorViolations, count(30.0 + drift * 5.0))
        .with(Metric::MinorViolations, count(120.0 + drift * 10.0))
}

impl MetricsSource for DemoSource {
    fn fetch_history(
        &self,
        project: &str,
        days: u32,
        _branch: Option<&str>,
    ) -> SourceResult<Vec<MetricRow>> {
        if !Self::is_demo_project(project) {
            return Ok(Vec::new());
        }
        Ok(self.series(project, days))
    }

    fn fetch_current(&self, project: &str, _branch: Option<&str>) -> SourceResult<Option<MetricRow>> {
        if !Self::is_demo_project(project) {
            return Ok(None);
        }
        Ok(self.series(project, 0).pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> DemoSource {
        DemoSource::as_of(NaiveDate::from_ymd_opt(2025, 6, 30).unwrap())
    }

    #[test]
    fn series_covers_the_window_inclusive() {
        let rows = source().series("demo-project-alpha", 90);
        assert_eq!(rows.len(), 91);
        assert_eq!(rows[0].date.as_deref(), Some("2025-04-01"));
        assert_eq!(rows[90].date.as_deref(), Some("2025-06-30"));
    }

    #[test]
    fn series_is_deterministic() {
        let a = source().series("demo-project-beta", 30);
        let b = source().series("demo-project-beta", 30);
        assert_eq!(a, b);
        assert_ne!(a, source().series("demo-project-gamma", 30));
    }

    #[test]
    fn ratings_stay_in_range() {
        for (project, _) in DEMO_PROJECTS {
            for row in source().series(project, 90) {
                for metric in [Metric::SecurityRating, Metric::ReliabilityRating, Metric::SqaleRating] {
                    let value = row.value(metric).and_then(|v| v.as_f64()).unwrap();
                    assert!((1.0..=5.0).contains(&value), "{metric} = {value}");
                }
                let vulns = row.value(Metric::Vulnerabilities).and_then(|v| v.as_f64()).unwrap();
                assert!(vulns >= 0.0);
            }
        }
    }

    #[test]
    fn unknown_projects_have_no_data() {
        let source = source();
        assert!(source.fetch_history("elsewhere", 30, None).unwrap().is_empty());
        assert!(source.fetch_current("elsewhere", None).unwrap().is_none());
        assert!(source.fetch_current("demo-project-alpha", None).unwrap().is_some());
    }
}
