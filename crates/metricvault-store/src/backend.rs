//! The table backend seam.
//!
//! Everything the storage layer needs from the remote entity store:
//! point operations on (partition, row) pairs, parameterized filtered
//! queries with projection, and full-table listing. Queries and listings
//! return lazy cursors so callers decide how much to pull.

use crate::entity::Entity;
use crate::error::BackendResult;
use crate::filter::EntityQuery;

/// Largest number of entities the table service accepts in one batch.
pub const MAX_BATCH_SIZE: usize = 100;

/// A lazy stream of entities. Items are fetched as the cursor advances.
pub type EntityCursor<'a> = Box<dyn Iterator<Item = BackendResult<Entity>> + Send + 'a>;

/// How `update_entity` treats properties absent from the new entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Replace the stored entity wholesale.
    Replace,
    /// Overwrite only the properties present on the new entity.
    Merge,
}

/// Trait abstracting the partitioned entity store.
///
/// The production implementation is [`crate::RedbTableBackend`]; tests
/// wrap it to count calls and inject failures.
pub trait TableBackend: Send + Sync {
    /// Point lookup. `Ok(None)` when no such entity exists.
    fn get_entity(&self, partition_key: &str, row_key: &str) -> BackendResult<Option<Entity>>;

    /// Filtered scan. Only entities matching the query's predicate are yielded,
    /// projected onto its selection when one is given.
    fn query_entities(&self, query: &EntityQuery) -> BackendResult<EntityCursor<'_>>;

    /// Unfiltered scan of the whole table, optionally projected.
    fn list_entities(&self, select: Option<&[String]>) -> BackendResult<EntityCursor<'_>>;

    /// Insert a new entity. Fails with `Conflict` when the key is taken.
    fn create_entity(&self, entity: &Entity) -> BackendResult<()>;

    /// Update an existing entity. Fails with `NotFound` when absent.
    fn update_entity(&self, entity: &Entity, mode: UpdateMode) -> BackendResult<()>;

    /// Insert or replace.
    fn upsert_entity(&self, entity: &Entity) -> BackendResult<()>;

    /// Remove an entity. Fails with `NotFound` when absent.
    fn delete_entity(&self, partition_key: &str, row_key: &str) -> BackendResult<()>;

    fn max_batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }
}

impl<B: TableBackend + ?Sized> TableBackend for std::sync::Arc<B> {
    fn get_entity(&self, partition_key: &str, row_key: &str) -> BackendResult<Option<Entity>> {
        (**self).get_entity(partition_key, row_key)
    }

    fn query_entities(&self, query: &EntityQuery) -> BackendResult<EntityCursor<'_>> {
        (**self).query_entities(query)
    }

    fn list_entities(&self, select: Option<&[String]>) -> BackendResult<EntityCursor<'_>> {
        (**self).list_entities(select)
    }

    fn create_entity(&self, entity: &Entity) -> BackendResult<()> {
        (**self).create_entity(entity)
    }

    fn update_entity(&self, entity: &Entity, mode: UpdateMode) -> BackendResult<()> {
        (**self).update_entity(entity, mode)
    }

    fn upsert_entity(&self, entity: &Entity) -> BackendResult<()> {
        (**self).upsert_entity(entity)
    }

    fn delete_entity(&self, partition_key: &str, row_key: &str) -> BackendResult<()> {
        (**self).delete_entity(partition_key, row_key)
    }

    fn max_batch_size(&self) -> usize {
        (**self).max_batch_size()
    }
}
