//! MetricsProvider: the storage layer's public face.
//!
//! `TableMetricsStore` composes the record store, metadata index,
//! migration coordinator and coverage evaluator over one shared backend.
//! Construct one at startup with [`open_store`] and share it by reference;
//! it is `Send + Sync` and holds no locks across backend calls.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use metricvault_core::{BackendConfig, MetricRecord, MetricRow, StorageConfig};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::TableBackend;
use crate::coverage::{CoverageResult, CoverageRules, evaluate};
use crate::error::{BackendError, StoreResult};
use crate::guard::Bounded;
use crate::metadata::MetadataIndex;
use crate::migration::MigrationCoordinator;
use crate::records;
use crate::tables::RedbTableBackend;

/// Result of a `store_metrics` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub partition_key: String,
    pub rows_written: usize,
    pub batches: usize,
    /// The project's index entry was refreshed.
    pub indexed: bool,
}

/// Result of a `delete_project_data` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteSummary {
    pub rows_deleted: usize,
    /// The scan hit the result cap; rows may remain.
    pub truncated: bool,
    /// Metadata entries removed because no rows of the project remain.
    pub metadata_removed: usize,
}

/// Trait abstracting the metrics storage provider.
///
/// Branch `None` (or empty) stores under the bare project partition and
/// records the branch as `main`.
pub trait MetricsProvider: Send + Sync {
    /// Persist rows for a project branch and index the project.
    fn store_metrics(
        &self,
        rows: &[MetricRow],
        project: &str,
        branch: Option<&str>,
    ) -> StoreResult<StoreSummary>;

    /// Rows of the last `days` days, capped by the retrieval limit.
    fn retrieve_metrics(
        &self,
        project: &str,
        branch: Option<&str>,
        days: u32,
    ) -> StoreResult<Bounded<MetricRecord>>;

    fn check_coverage(
        &self,
        project: &str,
        branch: Option<&str>,
        days: u32,
    ) -> StoreResult<CoverageResult>;

    fn list_stored_projects(&self) -> StoreResult<Bounded<String>>;

    fn delete_project_data(&self, project: &str, branch: Option<&str>) -> StoreResult<DeleteSummary>;
}

/// [`MetricsProvider`] over any [`TableBackend`].
pub struct TableMetricsStore<B: TableBackend> {
    backend: Arc<B>,
    index: MetadataIndex<B>,
    migration: MigrationCoordinator<B>,
    limit: usize,
    legacy_cleanup: bool,
    rules: CoverageRules,
}

impl<B: TableBackend> TableMetricsStore<B> {
    /// Build a store over `backend` with the limits from `config`.
    pub fn new(backend: Arc<B>, config: &StorageConfig) -> Self {
        let limit = config.max_results();
        let index = MetadataIndex::new(Arc::clone(&backend), limit);
        let migration = MigrationCoordinator::new(Arc::clone(&backend), index.clone(), limit);
        Self {
            backend,
            index,
            migration,
            limit,
            legacy_cleanup: config.legacy_metadata_cleanup(),
            rules: CoverageRules::default(),
        }
    }

    /// Builder method: coverage thresholds.
    pub fn with_coverage_rules(mut self, rules: CoverageRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn index(&self) -> &MetadataIndex<B> {
        &self.index
    }

    pub fn migration(&self) -> &MigrationCoordinator<B> {
        &self.migration
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl<B: TableBackend> MetricsProvider for TableMetricsStore<B> {
    fn store_metrics(
        &self,
        rows: &[MetricRow],
        project: &str,
        branch: Option<&str>,
    ) -> StoreResult<StoreSummary> {
        let (partition_key, entities) =
            records::build_entities(rows, project, branch, Utc::now())?;
        if entities.is_empty() {
            debug!(project, "no rows to store");
            return Ok(StoreSummary {
                partition_key,
                rows_written: 0,
                batches: 0,
                indexed: false,
            });
        }

        let written = records::write_batches(self.backend.as_ref(), &partition_key, &entities)?;

        let indexed = match self.index.upsert_project_marker(project) {
            Ok(()) => true,
            Err(e) => {
                warn!(project, error = %e, "failed to index project, enumeration will rescan");
                false
            }
        };

        info!(
            project,
            partition = %written.partition_key,
            rows = written.rows,
            batches = written.batches,
            "metrics stored"
        );
        Ok(StoreSummary {
            partition_key: written.partition_key,
            rows_written: written.rows,
            batches: written.batches,
            indexed,
        })
    }

    fn retrieve_metrics(
        &self,
        project: &str,
        branch: Option<&str>,
        days: u32,
    ) -> StoreResult<Bounded<MetricRecord>> {
        let start = records::window_start(Utc::now().date_naive(), days);
        let query = records::retrieval_query(project, branch, start)?;
        let result = records::retrieve(self.backend.as_ref(), &query, self.limit)?;
        debug!(project, rows = result.len(), truncated = result.truncated, "metrics retrieved");
        Ok(result)
    }

    fn check_coverage(
        &self,
        project: &str,
        branch: Option<&str>,
        days: u32,
    ) -> StoreResult<CoverageResult> {
        let stored = self.retrieve_metrics(project, branch, days)?;
        let result = evaluate(stored, days, &self.rules, Utc::now().naive_utc());
        debug!(
            project,
            has_coverage = result.has_coverage,
            reason = %result.reason,
            "coverage checked"
        );
        Ok(result)
    }

    fn list_stored_projects(&self) -> StoreResult<Bounded<String>> {
        self.migration.list_projects_with_migration()
    }

    fn delete_project_data(&self, project: &str, branch: Option<&str>) -> StoreResult<DeleteSummary> {
        let deleted = records::delete_rows(self.backend.as_ref(), project, branch, self.limit)?;
        if deleted.truncated {
            warn!(project, limit = self.limit, "delete capped, rows remain");
        }

        let metadata_removed = if records::project_has_rows(self.backend.as_ref(), project)? {
            0
        } else {
            self.index.remove_project(project, self.legacy_cleanup)?
        };

        info!(project, rows = deleted.len(), metadata_removed, "project data deleted");
        Ok(DeleteSummary {
            rows_deleted: deleted.len(),
            truncated: deleted.truncated,
            metadata_removed,
        })
    }
}

/// Open the configured backend and wrap it in a store.
pub fn open_store(config: &StorageConfig) -> StoreResult<TableMetricsStore<RedbTableBackend>> {
    let backend = match &config.backend {
        BackendConfig::Redb { path } => {
            let path = Path::new(path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .map_err(|e| BackendError::Open(format!("{}: {e}", parent.display())))?;
            }
            RedbTableBackend::open(path, config.table_name())?
        }
        BackendConfig::Memory => RedbTableBackend::open_in_memory(config.table_name())?,
    };
    info!(table = backend.table_name(), "metrics store opened");
    Ok(TableMetricsStore::new(Arc::new(backend), config))
}

#[cfg(test)]
mod tests {
    use metricvault_core::Metric;

    use super::*;

    fn store() -> TableMetricsStore<RedbTableBackend> {
        open_store(&StorageConfig::in_memory()).unwrap()
    }

    fn today() -> String {
        Utc::now().format("%Y-%m-%d").to_string()
    }

    #[test]
    fn store_then_retrieve() {
        let store = store();
        let rows = vec![MetricRow::new(today()).with(Metric::Bugs, 3)];
        let summary = store.store_metrics(&rows, "p", Some("dev")).unwrap();
        assert_eq!(summary.partition_key, "p_dev");
        assert_eq!(summary.rows_written, 1);
        assert!(summary.indexed);

        let records = store.retrieve_metrics("p", Some("dev"), 7).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records.items[0].branch, "dev");
        assert_eq!(records.items[0].get(Metric::Bugs), Some(3.0));

        assert!(store.retrieve_metrics("p", None, 7).unwrap().is_empty());
    }

    #[test]
    fn empty_store_is_a_no_op() {
        let store = store();
        let summary = store.store_metrics(&[], "p", None).unwrap();
        assert_eq!(summary.rows_written, 0);
        assert!(!summary.indexed);
        assert!(store.index().list_projects().unwrap().is_empty());
    }

    #[test]
    fn rows_outside_the_window_are_excluded() {
        let store = store();
        let rows = vec![MetricRow::new("2000-01-01"), MetricRow::new(today())];
        store.store_metrics(&rows, "p", None).unwrap();
        assert_eq!(store.retrieve_metrics("p", None, 30).unwrap().len(), 1);
    }

    #[test]
    fn open_store_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/metrics.redb");
        let config = StorageConfig {
            table: None,
            max_results: None,
            legacy_metadata_cleanup: None,
            backend: BackendConfig::Redb {
                path: path.display().to_string(),
            },
        };
        let store = open_store(&config).unwrap();
        assert_eq!(store.backend().table_name(), metricvault_core::config::DEFAULT_TABLE);
        assert!(path.exists());
    }
}
