//! Shared fixtures: an in-memory backend wrapped with call counters and
//! failure switches.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use metricvault_core::{Metric, MetricRow, StorageConfig};
use metricvault_store::{
    BackendError, BackendResult, Entity, EntityCursor, EntityQuery, RedbTableBackend,
    TableBackend, TableMetricsStore, UpdateMode,
};

/// Counts every backend call and can be told to fail specific ones.
pub struct CountingBackend {
    inner: RedbTableBackend,
    batch_size: usize,

    pub gets: AtomicU64,
    pub queries: AtomicU64,
    pub lists: AtomicU64,
    pub creates: AtomicU64,
    pub updates: AtomicU64,
    pub upserts: AtomicU64,
    pub deletes: AtomicU64,
    /// Items pulled from any cursor this backend handed out.
    pub pulled: AtomicU64,

    pub fail_gets: AtomicBool,
    pub fail_upserts: AtomicBool,
    /// Creates numbered at or beyond this fail (0-based).
    pub create_limit: AtomicU64,

    last_query: Mutex<Option<EntityQuery>>,
}

impl CountingBackend {
    pub fn new() -> Self {
        Self::with_batch_size(metricvault_store::MAX_BATCH_SIZE)
    }

    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            inner: RedbTableBackend::open_in_memory("TestMetrics").expect("open in-memory table"),
            batch_size,
            gets: AtomicU64::new(0),
            queries: AtomicU64::new(0),
            lists: AtomicU64::new(0),
            creates: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            upserts: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            pulled: AtomicU64::new(0),
            fail_gets: AtomicBool::new(false),
            fail_upserts: AtomicBool::new(false),
            create_limit: AtomicU64::new(u64::MAX),
            last_query: Mutex::new(None),
        }
    }

    pub fn count(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<EntityQuery> {
        self.last_query.lock().unwrap().clone()
    }

    pub fn inner(&self) -> &RedbTableBackend {
        &self.inner
    }

    fn counted<'a>(&'a self, cursor: EntityCursor<'a>) -> EntityCursor<'a> {
        let pulled = &self.pulled;
        Box::new(cursor.inspect(move |_| {
            pulled.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

fn injected(what: &str) -> BackendError {
    BackendError::Write(format!("injected {what} failure"))
}

impl TableBackend for CountingBackend {
    fn get_entity(&self, partition_key: &str, row_key: &str) -> BackendResult<Option<Entity>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(BackendError::Read("injected get failure".to_string()));
        }
        self.inner.get_entity(partition_key, row_key)
    }

    fn query_entities(&self, query: &EntityQuery) -> BackendResult<EntityCursor<'_>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock().unwrap() = Some(query.clone());
        let cursor = self.inner.query_entities(query)?;
        Ok(self.counted(cursor))
    }

    fn list_entities(&self, select: Option<&[String]>) -> BackendResult<EntityCursor<'_>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        let cursor = self.inner.list_entities(select)?;
        Ok(self.counted(cursor))
    }

    fn create_entity(&self, entity: &Entity) -> BackendResult<()> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst);
        if n >= self.create_limit.load(Ordering::SeqCst) {
            return Err(injected("create"));
        }
        self.inner.create_entity(entity)
    }

    fn update_entity(&self, entity: &Entity, mode: UpdateMode) -> BackendResult<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update_entity(entity, mode)
    }

    fn upsert_entity(&self, entity: &Entity) -> BackendResult<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(injected("upsert"));
        }
        self.inner.upsert_entity(entity)
    }

    fn delete_entity(&self, partition_key: &str, row_key: &str) -> BackendResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_entity(partition_key, row_key)
    }

    fn max_batch_size(&self) -> usize {
        self.batch_size
    }
}

pub fn counting_store(config: &StorageConfig) -> TableMetricsStore<CountingBackend> {
    TableMetricsStore::new(Arc::new(CountingBackend::new()), config)
}

pub fn limited_config(max_results: usize) -> StorageConfig {
    StorageConfig {
        max_results: Some(max_results),
        ..StorageConfig::in_memory()
    }
}

/// `YYYY-MM-DD` for `days_ago` days before today (UTC).
pub fn day(days_ago: u64) -> String {
    let today = chrono::Utc::now().date_naive();
    today
        .checked_sub_days(chrono::Days::new(days_ago))
        .unwrap()
        .format("%Y-%m-%d")
        .to_string()
}

/// A row with every metric populated.
pub fn full_row(date: &str) -> MetricRow {
    Metric::ALL
        .into_iter()
        .enumerate()
        .fold(MetricRow::new(date), |row, (i, metric)| row.with(metric, i as f64))
}

/// Write a bare metric row with no index entry, as data written before the
/// index existed.
pub fn write_unindexed_row(backend: &impl TableBackend, project: &str, branch: &str, row_key: &str) {
    let partition = metricvault_store::derive_partition_key(project, Some(branch)).unwrap();
    let entity = Entity::new(partition, row_key)
        .with("ProjectKey", project)
        .with("Branch", branch)
        .with("Date", day(0))
        .with("bugs", 1.0);
    backend.create_entity(&entity).unwrap();
}
