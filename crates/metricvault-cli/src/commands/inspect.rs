//! Read-only commands: projects, show, coverage.

use std::path::Path;

use metricvault_core::{Metric, MetricRecord};
use metricvault_store::{CoverageResult, MetricsProvider};

const SHOWN_METRICS: [Metric; 5] = [
    Metric::Bugs,
    Metric::Vulnerabilities,
    Metric::CodeSmells,
    Metric::Coverage,
    Metric::DuplicatedLinesDensity,
];

pub fn projects(config: &Path, format: &str) -> anyhow::Result<()> {
    let (_, store) = super::open(config)?;
    let projects = store.list_stored_projects()?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&projects)?),
        _ => {
            for project in &projects.items {
                println!("{project}");
            }
            if projects.truncated {
                println!("(list truncated at {} projects)", projects.len());
            }
        }
    }
    Ok(())
}

pub fn show(
    config: &Path,
    project: &str,
    branch: Option<&str>,
    days: u32,
    format: &str,
) -> anyhow::Result<()> {
    let (_, store) = super::open(config)?;
    let records = store.retrieve_metrics(project, branch, days)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&records)?),
        _ => {
            println!("{}", format_records(&records.items));
            if records.truncated {
                println!("(results truncated at {} rows)", records.len());
            }
        }
    }
    Ok(())
}

pub fn coverage(
    config: &Path,
    project: &str,
    branch: Option<&str>,
    days: u32,
    format: &str,
) -> anyhow::Result<()> {
    let (_, store) = super::open(config)?;
    let mut result = store.check_coverage(project, branch, days)?;
    result.records = None;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => println!("{}", format_coverage(project, days, &result)),
    }
    Ok(())
}

fn format_records(records: &[MetricRecord]) -> String {
    if records.is_empty() {
        return "no stored rows".to_string();
    }

    let mut out = format!("{:<28} {:<12}", "date", "branch");
    for metric in SHOWN_METRICS {
        out.push_str(&format!(" {:>12}", short_name(metric)));
    }
    for record in records {
        out.push('\n');
        out.push_str(&format!("{:<28} {:<12}", record.date, record.branch));
        for metric in SHOWN_METRICS {
            let cell = record
                .value(metric)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!(" {cell:>12}"));
        }
    }
    out
}

fn short_name(metric: Metric) -> &'static str {
    match metric {
        Metric::DuplicatedLinesDensity => "duplication",
        Metric::CodeSmells => "smells",
        Metric::Vulnerabilities => "vulns",
        other => other.as_str(),
    }
}

fn format_coverage(project: &str, days: u32, result: &CoverageResult) -> String {
    let verdict = if result.has_coverage { "✓" } else { "✗" };
    let mut out = format!(
        "{verdict} {project} ({days}d): {}\n  rows: {}",
        result.reason, result.record_count
    );
    if let (Some(oldest), Some(latest)) = (&result.oldest_date, &result.latest_date) {
        out.push_str(&format!("\n  span: {oldest} .. {latest}"));
    }
    if let Some(age) = result.days_since_latest {
        out.push_str(&format!("\n  latest is {age} day(s) old"));
    }
    if result.truncated {
        out.push_str("\n  (retrieval truncated)");
    }
    out
}
