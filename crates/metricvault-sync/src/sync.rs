//! MetricsSync: stored-first metrics loading.
//!
//! For each requested project, stored data is used when coverage holds.
//! Otherwise history is fetched from the source and written back, with the
//! current snapshot as a fallback when the source has no history. A
//! failure for one project is logged and never fails the request.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use metricvault_core::MetricRecord;
use metricvault_store::MetricsProvider;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregate::{DailyMetrics, aggregate_daily, record_from_row};
use crate::cache::{CacheStats, QueryCache, QueryCacheConfig, QueryKey};
use crate::error::{SyncError, SyncResult};
use crate::source::MetricsSource;

/// Where a project's rows came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "origin", content = "detail")]
pub enum DataOrigin {
    Stored,
    Fetched,
    /// Only a current snapshot was available.
    Current,
    /// Neither storage nor the source had anything.
    Empty,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectOutcome {
    pub project: String,
    #[serde(flatten)]
    pub origin: DataOrigin,
    pub records: usize,
}

/// Result of one fetch request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub projects: Vec<ProjectOutcome>,
    pub daily: Vec<DailyMetrics>,
}

pub struct MetricsSync<P, S> {
    store: P,
    source: S,
    cache: Mutex<QueryCache<Arc<SyncReport>>>,
}

impl<P: MetricsProvider, S: MetricsSource> MetricsSync<P, S> {
    pub fn new(store: P, source: S, cache: QueryCacheConfig) -> Self {
        Self {
            store,
            source,
            cache: Mutex::new(QueryCache::new(cache)),
        }
    }

    pub fn store(&self) -> &P {
        &self.store
    }

    fn cache(&self) -> MutexGuard<'_, QueryCache<Arc<SyncReport>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Daily metrics for `projects` over the last `days` days.
    ///
    /// Served from the query cache when an identical request is fresh.
    pub fn fetch_metrics<T: AsRef<str>>(
        &self,
        projects: &[T],
        days: u32,
        branch: Option<&str>,
    ) -> SyncResult<Arc<SyncReport>> {
        if projects.is_empty() {
            return Err(SyncError::NoProjects);
        }
        if days == 0 {
            return Err(SyncError::EmptyWindow);
        }

        let key = QueryKey::new(projects, days, branch);
        if let Some(report) = self.cache().get(&key) {
            return Ok(Arc::clone(report));
        }

        let mut outcomes = Vec::with_capacity(projects.len());
        let mut records = Vec::new();
        for project in projects {
            let project = project.as_ref();
            let (origin, mut loaded) = self.load_project(project, days, branch);
            outcomes.push(ProjectOutcome {
                project: project.to_string(),
                origin,
                records: loaded.len(),
            });
            records.append(&mut loaded);
        }

        let report = Arc::new(SyncReport {
            projects: outcomes,
            daily: aggregate_daily(records),
        });
        info!(
            projects = projects.len(),
            daily_rows = report.daily.len(),
            "metrics loaded"
        );
        self.cache().insert(key, Arc::clone(&report));
        Ok(report)
    }

    fn load_project(
        &self,
        project: &str,
        days: u32,
        branch: Option<&str>,
    ) -> (DataOrigin, Vec<MetricRecord>) {
        match self.store.check_coverage(project, branch, days) {
            Ok(coverage) if coverage.has_coverage => {
                if let Some(records) = coverage.records {
                    debug!(project, records = records.len(), "using stored metrics");
                    return (DataOrigin::Stored, records);
                }
            }
            Ok(coverage) => {
                debug!(project, reason = %coverage.reason, "stored metrics insufficient");
            }
            Err(e) => {
                warn!(project, error = %e, "coverage check failed, fetching from source");
            }
        }

        let history = match self.source.fetch_history(project, days, branch) {
            Ok(history) => history,
            Err(e) => {
                warn!(project, error = %e, retryable = e.is_retryable(), "history fetch failed");
                return (DataOrigin::Failed(e.to_string()), Vec::new());
            }
        };

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let (rows, origin) = if history.is_empty() {
            match self.source.fetch_current(project, branch) {
                Ok(Some(mut current)) => {
                    current.date = Some(today.clone());
                    (vec![current], DataOrigin::Current)
                }
                Ok(None) => return (DataOrigin::Empty, Vec::new()),
                Err(e) => {
                    warn!(project, error = %e, "current measures fetch failed");
                    return (DataOrigin::Failed(e.to_string()), Vec::new());
                }
            }
        } else {
            (history, DataOrigin::Fetched)
        };

        if let Err(e) = self.store.store_metrics(&rows, project, branch) {
            warn!(project, error = %e, "could not store fetched metrics");
        }

        let records = rows
            .iter()
            .map(|row| record_from_row(project, branch, row, &today))
            .collect();
        (origin, records)
    }

    /// Drop every cached result so the next request reloads.
    pub fn refresh(&self) {
        self.cache().invalidate_all();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache().stats()
    }
}
