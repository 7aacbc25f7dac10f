//! RedbTableBackend: a partitioned entity table persisted in redb.
//!
//! Entities live in a single redb table keyed by `(partition_key, row_key)`
//! tuples, so a partition's rows are contiguous and no separator character
//! can make two keys collide. Properties are JSON-serialized into the
//! `&[u8]` value column.
//!
//! Scans are served page by page, each page from its own read transaction,
//! resuming after the last key seen. A cursor that is dropped early never
//! touches the remaining rows.

use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::debug;

use crate::backend::{EntityCursor, TableBackend, UpdateMode};
use crate::entity::{Entity, EntityValue};
use crate::error::{BackendError, BackendResult};
use crate::filter::{CompiledFilter, EntityQuery};

/// Convert any `Display` error into a `BackendError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| BackendError::$variant(e.to_string())
    };
}

type EntityKey = (&'static str, &'static str);

/// Rows scanned per read transaction.
const PAGE_SIZE: usize = 1000;

fn definition(name: &str) -> TableDefinition<'_, EntityKey, &'static [u8]> {
    TableDefinition::new(name)
}

fn encode(entity: &Entity) -> BackendResult<Vec<u8>> {
    serde_json::to_vec(&entity.properties).map_err(map_err!(Serialize))
}

fn decode(partition_key: &str, row_key: &str, bytes: &[u8]) -> BackendResult<Entity> {
    let properties: BTreeMap<String, EntityValue> =
        serde_json::from_slice(bytes).map_err(map_err!(Deserialize))?;
    Ok(Entity {
        partition_key: partition_key.to_string(),
        row_key: row_key.to_string(),
        properties,
    })
}

#[derive(Debug, Clone, Copy)]
enum PutMode {
    Create,
    Update(UpdateMode),
    Upsert,
}

/// Thread-safe entity table backed by redb.
#[derive(Clone)]
pub struct RedbTableBackend {
    db: Arc<Database>,
    table: Arc<str>,
    page_size: usize,
}

impl RedbTableBackend {
    /// Open (or create) a persistent table in the database at `path`.
    pub fn open(path: &Path, table: &str) -> BackendResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let backend = Self::from_database(db, table);
        backend.ensure_table()?;
        debug!(?path, table, "entity table opened");
        Ok(backend)
    }

    /// Create an ephemeral in-memory table (for testing and demos).
    pub fn open_in_memory(table: &str) -> BackendResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let backend = Self::from_database(db, table);
        backend.ensure_table()?;
        debug!(table, "in-memory entity table opened");
        Ok(backend)
    }

    fn from_database(db: Database, table: &str) -> Self {
        Self {
            db: Arc::new(db),
            table: Arc::from(table),
            page_size: PAGE_SIZE,
        }
    }

    /// Builder method: rows scanned per page (for testing cursor resumption).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Create the table if it doesn't exist yet.
    fn ensure_table(&self) -> BackendResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(definition(&self.table))
            .map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn put(&self, entity: &Entity, mode: PutMode) -> BackendResult<()> {
        let key = (entity.partition_key.as_str(), entity.row_key.as_str());
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn
                .open_table(definition(&self.table))
                .map_err(map_err!(Table))?;
            let existing = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => Some(decode(key.0, key.1, guard.value())?),
                None => None,
            };
            let stored = match (mode, existing) {
                (PutMode::Create, Some(_)) => {
                    return Err(BackendError::Conflict {
                        partition: entity.partition_key.clone(),
                        row: entity.row_key.clone(),
                    });
                }
                (PutMode::Update(_), None) => {
                    return Err(BackendError::NotFound {
                        partition: entity.partition_key.clone(),
                        row: entity.row_key.clone(),
                    });
                }
                (PutMode::Update(UpdateMode::Merge), Some(mut current)) => {
                    current.merge_from(entity);
                    current
                }
                _ => entity.clone(),
            };
            let value = encode(&stored)?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(partition = key.0, row = key.1, ?mode, "entity written");
        Ok(())
    }

    fn cursor(&self, filter: Option<CompiledFilter>, select: Option<Vec<String>>) -> PagedCursor {
        PagedCursor {
            db: Arc::clone(&self.db),
            table: Arc::clone(&self.table),
            page_size: self.page_size,
            filter,
            select,
            after: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }
}

impl TableBackend for RedbTableBackend {
    fn get_entity(&self, partition_key: &str, row_key: &str) -> BackendResult<Option<Entity>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn
            .open_table(definition(&self.table))
            .map_err(map_err!(Table))?;
        match table.get((partition_key, row_key)).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(partition_key, row_key, guard.value())?)),
            None => Ok(None),
        }
    }

    fn query_entities(&self, query: &EntityQuery) -> BackendResult<EntityCursor<'_>> {
        let filter = CompiledFilter::compile(query)?;
        let select = query.select().map(<[String]>::to_vec);
        Ok(Box::new(self.cursor(Some(filter), select)))
    }

    fn list_entities(&self, select: Option<&[String]>) -> BackendResult<EntityCursor<'_>> {
        Ok(Box::new(self.cursor(None, select.map(<[String]>::to_vec))))
    }

    fn create_entity(&self, entity: &Entity) -> BackendResult<()> {
        self.put(entity, PutMode::Create)
    }

    fn update_entity(&self, entity: &Entity, mode: UpdateMode) -> BackendResult<()> {
        self.put(entity, PutMode::Update(mode))
    }

    fn upsert_entity(&self, entity: &Entity) -> BackendResult<()> {
        self.put(entity, PutMode::Upsert)
    }

    fn delete_entity(&self, partition_key: &str, row_key: &str) -> BackendResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn
                .open_table(definition(&self.table))
                .map_err(map_err!(Table))?;
            existed = table
                .remove((partition_key, row_key))
                .map_err(map_err!(Write))?
                .is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(partition = partition_key, row = row_key, existed, "entity deleted");
        if existed {
            Ok(())
        } else {
            Err(BackendError::NotFound {
                partition: partition_key.to_string(),
                row: row_key.to_string(),
            })
        }
    }
}

/// Lazy scan over the table, one read transaction per page.
struct PagedCursor {
    db: Arc<Database>,
    table: Arc<str>,
    page_size: usize,
    filter: Option<CompiledFilter>,
    select: Option<Vec<String>>,
    /// Last key scanned; the next page starts strictly after it.
    after: Option<(String, String)>,
    buffer: VecDeque<Entity>,
    exhausted: bool,
}

impl PagedCursor {
    fn fetch_page(&mut self) -> BackendResult<()> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn
            .open_table(definition(&self.table))
            .map_err(map_err!(Table))?;
        let range = match &self.after {
            None => table.iter(),
            Some((partition, row)) => table.range((
                Bound::Excluded((partition.as_str(), row.as_str())),
                Bound::Unbounded,
            )),
        }
        .map_err(map_err!(Read))?;

        let mut scanned = 0;
        let mut last = None;
        for entry in range.take(self.page_size) {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let (partition, row) = key.value();
            scanned += 1;
            last = Some((partition.to_string(), row.to_string()));

            let entity = decode(partition, row, value.value())?;
            if self.filter.as_ref().is_none_or(|f| f.matches(&entity)) {
                let entity = match &self.select {
                    Some(select) => entity.project(select),
                    None => entity,
                };
                self.buffer.push_back(entity);
            }
        }

        if last.is_some() {
            self.after = last;
        }
        if scanned < self.page_size {
            self.exhausted = true;
        }
        Ok(())
    }
}

impl Iterator for PagedCursor {
    type Item = BackendResult<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entity) = self.buffer.pop_front() {
                return Some(Ok(entity));
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
    }
}
