//! Lazy migration from full-table scans to the project index.
//!
//! The first enumeration that finds no completion marker scans the table
//! once, backfills an index entry per project, then writes the marker.
//! Every write is an upsert on a deterministic key, so concurrent first
//! callers may both scan and both backfill and still converge on the same
//! index.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::backend::TableBackend;
use crate::error::StoreResult;
use crate::guard::{Bounded, ScanKind, bounded};
use crate::metadata::{METADATA_PARTITION, MetadataIndex};
use crate::records::PROJECT_KEY;

/// In-process view of the migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    /// Marker not yet consulted, or the last backfill did not finish.
    Unknown,
    /// A full scan is in flight.
    Scanning,
    /// The index is authoritative.
    Complete,
}

pub struct MigrationCoordinator<B: TableBackend> {
    backend: Arc<B>,
    index: MetadataIndex<B>,
    limit: usize,
    state: Mutex<MigrationState>,
}

impl<B: TableBackend> MigrationCoordinator<B> {
    pub fn new(backend: Arc<B>, index: MetadataIndex<B>, limit: usize) -> Self {
        Self {
            backend,
            index,
            limit,
            state: Mutex::new(MigrationState::Unknown),
        }
    }

    pub fn state(&self) -> MigrationState {
        match self.state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_state(&self, next: MigrationState) {
        match self.state.lock() {
            Ok(mut state) => *state = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Enumerate stored projects, migrating the index first if needed.
    pub fn list_projects_with_migration(&self) -> StoreResult<Bounded<String>> {
        if self.state() == MigrationState::Complete {
            return Ok(self.index.list_projects()?);
        }

        match self.index.migration_marker() {
            Ok(Some(marker)) if marker.is_complete() => {
                debug!("migration marker found, using project index");
                self.set_state(MigrationState::Complete);
                return Ok(self.index.list_projects()?);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "migration marker lookup failed, treating index as incomplete");
            }
        }

        self.set_state(MigrationState::Scanning);
        let discovered = match self.scan_projects() {
            Ok(discovered) => discovered,
            Err(e) => {
                self.set_state(MigrationState::Unknown);
                return Err(e);
            }
        };

        if discovered.is_empty() {
            // Nothing to index; the marker stays unwritten so the next call rescans.
            debug!("no stored projects found, migration stays pending");
            self.set_state(MigrationState::Unknown);
            return Ok(discovered);
        }

        let complete = self.backfill(&discovered);
        self.set_state(if complete {
            MigrationState::Complete
        } else {
            MigrationState::Unknown
        });
        Ok(discovered)
    }

    /// Guarded full scan for distinct project keys outside the index.
    fn scan_projects(&self) -> StoreResult<Bounded<String>> {
        info!(limit = self.limit, "scanning table to build project index");
        let select = [PROJECT_KEY.to_string()];
        let rows = bounded(
            self.backend.list_entities(Some(&select[..]))?,
            self.limit,
            ScanKind::Projects,
        )?;

        let truncated = rows.truncated;
        let projects: BTreeSet<String> = rows
            .into_iter()
            .filter(|e| e.partition_key != METADATA_PARTITION)
            .filter_map(|e| e.get_str(PROJECT_KEY).map(str::to_string))
            .collect();
        Ok(Bounded {
            items: projects.into_iter().collect(),
            truncated,
        })
    }

    /// Index every discovered project and, if all of that worked on a
    /// complete scan, write the marker. Returns whether the marker landed.
    fn backfill(&self, discovered: &Bounded<String>) -> bool {
        let mut failures = 0;
        for project in &discovered.items {
            if let Err(e) = self.index.upsert_project_marker(project) {
                warn!(project = %project, error = %e, "index backfill failed");
                failures += 1;
            }
        }

        if failures > 0 {
            warn!(failures, "index backfill incomplete, migration marker not written");
            return false;
        }
        if discovered.truncated {
            warn!(
                limit = self.limit,
                "scan truncated, migration marker not written"
            );
            return false;
        }
        match self.index.write_migration_marker() {
            Ok(()) => {
                info!(projects = discovered.len(), "project index migration complete");
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to write migration marker");
                false
            }
        }
    }

    /// Forget the migration so the next enumeration rebuilds the index
    /// from the stored rows.
    ///
    /// The marker goes first, then every project entry, so entries for
    /// projects whose rows are gone do not survive the rebuild.
    pub fn reset(&self) -> StoreResult<()> {
        let existed = self.index.clear_migration_marker()?;
        self.set_state(MigrationState::Unknown);
        let removed = self.index.clear_project_entries()?;
        info!(existed, removed, "project index reset");
        Ok(())
    }
}
