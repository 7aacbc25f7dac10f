//! The project index: one metadata entry per project plus the migration
//! marker, all in a dedicated partition.
//!
//! Enumeration is a single partition query, so its cost grows with the
//! number of projects instead of the number of stored rows.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tracing::debug;

use crate::backend::TableBackend;
use crate::entity::{Entity, PARTITION_KEY};
use crate::error::BackendResult;
use crate::filter::EntityQuery;
use crate::guard::{Bounded, ScanKind, bounded};
use crate::keys::{derive_metadata_row_id, legacy_metadata_row_id};
use crate::records::PROJECT_KEY;

/// Partition holding the index.
pub const METADATA_PARTITION: &str = "METADATA_PROJECTS";
/// Row key of the migration marker.
pub const MIGRATION_ROW: &str = "MIGRATION_STATUS";
/// Marker status once the index is authoritative.
pub const STATUS_COMPLETE: &str = "Complete";

const STATUS: &str = "Status";
const COMPLETED_AT: &str = "CompletedAt";
const LAST_UPDATED: &str = "LastUpdated";

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The migration marker as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationMarker {
    pub status: String,
    pub completed_at: Option<String>,
}

impl MigrationMarker {
    pub fn is_complete(&self) -> bool {
        self.status == STATUS_COMPLETE
    }
}

/// Read and write access to the metadata partition.
pub struct MetadataIndex<B: TableBackend> {
    backend: Arc<B>,
    limit: usize,
}

impl<B: TableBackend> Clone for MetadataIndex<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            limit: self.limit,
        }
    }
}

impl<B: TableBackend> MetadataIndex<B> {
    pub fn new(backend: Arc<B>, limit: usize) -> Self {
        Self { backend, limit }
    }

    /// Record that `project` has data. Repeating the call changes nothing
    /// but the timestamp.
    pub fn upsert_project_marker(&self, project: &str) -> BackendResult<()> {
        let entity = Entity::new(METADATA_PARTITION, derive_metadata_row_id(project))
            .with(PROJECT_KEY, project)
            .with(LAST_UPDATED, now_rfc3339());
        self.backend.upsert_entity(&entity)?;
        debug!(project, "project indexed");
        Ok(())
    }

    /// Every indexed project, sorted and de-duplicated.
    pub fn list_projects(&self) -> BackendResult<Bounded<String>> {
        let query = EntityQuery::builder()
            .eq(PARTITION_KEY, "pk", METADATA_PARTITION)
            .select([PROJECT_KEY])
            .build();
        let entries = bounded(
            self.backend.query_entities(&query)?,
            self.limit,
            ScanKind::Projects,
        )?;

        let truncated = entries.truncated;
        let projects: BTreeSet<String> = entries
            .into_iter()
            .filter(|e| e.row_key != MIGRATION_ROW)
            .filter_map(|e| e.get_str(PROJECT_KEY).map(str::to_string))
            .collect();
        Ok(Bounded {
            items: projects.into_iter().collect(),
            truncated,
        })
    }

    pub fn migration_marker(&self) -> BackendResult<Option<MigrationMarker>> {
        let Some(entity) = self.backend.get_entity(METADATA_PARTITION, MIGRATION_ROW)? else {
            return Ok(None);
        };
        Ok(Some(MigrationMarker {
            status: entity.get_str(STATUS).unwrap_or_default().to_string(),
            completed_at: entity.get_str(COMPLETED_AT).map(str::to_string),
        }))
    }

    pub fn write_migration_marker(&self) -> BackendResult<()> {
        let entity = Entity::new(METADATA_PARTITION, MIGRATION_ROW)
            .with(STATUS, STATUS_COMPLETE)
            .with(COMPLETED_AT, now_rfc3339());
        self.backend.upsert_entity(&entity)
    }

    /// Delete the marker. Returns whether one existed.
    pub fn clear_migration_marker(&self) -> BackendResult<bool> {
        match self.backend.delete_entity(METADATA_PARTITION, MIGRATION_ROW) {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete every project entry, keeping the migration marker.
    ///
    /// The listing is capped like any other; a truncated clear leaves the
    /// remainder for the next call. Returns the number removed.
    pub fn clear_project_entries(&self) -> BackendResult<usize> {
        let query = EntityQuery::builder()
            .eq(PARTITION_KEY, "pk", METADATA_PARTITION)
            .select([PROJECT_KEY])
            .build();
        let entries = bounded(
            self.backend.query_entities(&query)?,
            self.limit,
            ScanKind::Projects,
        )?;

        let mut removed = 0;
        for entry in entries.into_iter().filter(|e| e.row_key != MIGRATION_ROW) {
            match self.backend.delete_entity(METADATA_PARTITION, &entry.row_key) {
                Ok(()) => removed += 1,
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        debug!(removed, "project index cleared");
        Ok(removed)
    }

    /// Drop a project's entry, plus its pre-hash entry when `legacy` is set.
    ///
    /// Missing entries are not errors. Returns the number removed.
    pub fn remove_project(&self, project: &str, legacy: bool) -> BackendResult<usize> {
        let mut row_ids = vec![derive_metadata_row_id(project)];
        if legacy {
            // An overlong key never had a legacy entry.
            if let Ok(legacy_id) = legacy_metadata_row_id(project) {
                row_ids.push(legacy_id);
            }
        }

        let mut removed = 0;
        for row_id in row_ids {
            match self.backend.delete_entity(METADATA_PARTITION, &row_id) {
                Ok(()) => removed += 1,
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        debug!(project, removed, "project removed from index");
        Ok(removed)
    }
}
