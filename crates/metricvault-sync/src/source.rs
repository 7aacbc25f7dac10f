//! The metrics-source seam.
//!
//! A source answers with history rows for a window, or with a single
//! snapshot of current values when no history exists. Retry and backoff
//! are the source's own business.

use metricvault_core::MetricRow;

use crate::error::SourceResult;

pub trait MetricsSource: Send + Sync {
    /// Rows covering the last `days` days, oldest first.
    fn fetch_history(
        &self,
        project: &str,
        days: u32,
        branch: Option<&str>,
    ) -> SourceResult<Vec<MetricRow>>;

    /// Current values, if the project has any. The returned row's date is
    /// ignored; callers stamp it with today.
    fn fetch_current(&self, project: &str, branch: Option<&str>) -> SourceResult<Option<MetricRow>>;
}
