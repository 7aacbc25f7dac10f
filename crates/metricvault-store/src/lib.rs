//! metricvault-store: storage layer for per-project code-quality metrics.
//!
//! Rows live in a partitioned entity table, one partition per
//! (project, branch). A dedicated metadata partition indexes the projects
//! so enumeration never scans the data, and every scan is capped.
//!
//! # Usage
//!
//! ```no_run
//! use metricvault_core::{Metric, MetricRow, StorageConfig};
//! use metricvault_store::{MetricsProvider, open_store};
//!
//! let store = open_store(&StorageConfig::in_memory())?;
//! let rows = vec![MetricRow::new("2025-01-01").with(Metric::Bugs, 3)];
//! store.store_metrics(&rows, "my-project", Some("main"))?;
//! let projects = store.list_stored_projects()?;
//! # Ok::<(), metricvault_store::StoreError>(())
//! ```

pub mod backend;
pub mod coverage;
pub mod entity;
pub mod error;
pub mod filter;
pub mod guard;
pub mod keys;
pub mod metadata;
pub mod migration;
pub mod records;
pub mod store;
pub mod tables;

pub use backend::{EntityCursor, MAX_BATCH_SIZE, TableBackend, UpdateMode};
pub use coverage::{CoverageResult, CoverageRules};
pub use entity::{Entity, EntityValue};
pub use error::{BackendError, BackendResult, StoreError, StoreResult};
pub use filter::{CompiledFilter, EntityQuery};
pub use guard::{Bounded, MAX_RETRIEVAL_LIMIT};
pub use keys::{derive_metadata_row_id, derive_partition_key, legacy_metadata_row_id};
pub use metadata::{METADATA_PARTITION, MetadataIndex};
pub use migration::{MigrationCoordinator, MigrationState};
pub use store::{DeleteSummary, MetricsProvider, StoreSummary, TableMetricsStore, open_store};
pub use tables::RedbTableBackend;
