//! Per-day metric rows under a (project, branch) partition.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use metricvault_core::{DEFAULT_BRANCH, Metric, MetricRecord, MetricRow, MetricValue};
use tracing::{debug, error, warn};

use crate::backend::{TableBackend, UpdateMode};
use crate::entity::{Entity, EntityValue, PARTITION_KEY};
use crate::error::{BackendResult, StoreError, StoreResult};
use crate::filter::EntityQuery;
use crate::guard::{Bounded, ScanKind, bounded};
use crate::keys::{derive_partition_key, sanitize_key};
use crate::metadata::METADATA_PARTITION;

pub const PROJECT_KEY: &str = "ProjectKey";
pub const BRANCH: &str = "Branch";
pub const DATE: &str = "Date";
pub const WRITTEN_AT: &str = "WrittenAt";

/// Outcome of writing one partition's rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenRows {
    pub partition_key: String,
    pub rows: usize,
    pub batches: usize,
}

/// Row key: `{date}_{HHMMSSffffff}_{seq:05}`.
///
/// The write timestamp separates write events on the same day and the
/// sequence number separates rows within one event.
pub fn row_key(date: &str, written_at: DateTime<Utc>, seq: usize) -> String {
    format!(
        "{}_{}_{seq:05}",
        sanitize_key(date),
        written_at.format("%H%M%S%6f")
    )
}

/// Storage form of one raw metric value.
///
/// Numbers and numeric strings become doubles, other strings are kept as
/// text, and null, NaN or anything else becomes `0.0`.
pub fn normalize_value(value: Option<&serde_json::Value>) -> EntityValue {
    use serde_json::Value;

    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(v) => Some(v),
            Err(_) => return EntityValue::String(s.clone()),
        },
        _ => None,
    };
    EntityValue::Double(number.filter(|v| v.is_finite()).unwrap_or(0.0))
}

/// Build the entities for one `store_metrics` call.
pub fn build_entities(
    rows: &[MetricRow],
    project: &str,
    branch: Option<&str>,
    written_at: DateTime<Utc>,
) -> StoreResult<(String, Vec<Entity>)> {
    let partition_key = derive_partition_key(project, branch)?;
    let branch = branch.filter(|b| !b.is_empty()).unwrap_or(DEFAULT_BRANCH);
    let today = written_at.format("%Y-%m-%d").to_string();
    let written = written_at.to_rfc3339_opts(SecondsFormat::Micros, true);

    let entities = rows
        .iter()
        .enumerate()
        .map(|(seq, row)| {
            let date = row.date.as_deref().unwrap_or(&today);
            let mut entity = Entity::new(&partition_key, row_key(date, written_at, seq))
                .with(PROJECT_KEY, project)
                .with(BRANCH, branch)
                .with(DATE, date)
                .with(WRITTEN_AT, written.as_str());
            for metric in Metric::ALL {
                entity.insert(metric.as_str(), normalize_value(row.value(metric)));
            }
            entity
        })
        .collect();
    Ok((partition_key, entities))
}

/// Create a row, replacing it when the key is already taken.
fn write_row<B: TableBackend + ?Sized>(backend: &B, entity: &Entity) -> BackendResult<()> {
    match backend.create_entity(entity) {
        Err(e) if e.is_conflict() => {
            warn!(
                partition = %entity.partition_key,
                row = %entity.row_key,
                "row exists, replacing"
            );
            backend.update_entity(entity, UpdateMode::Replace)
        }
        other => other,
    }
}

/// Write entities in batches of at most `backend.max_batch_size()`.
///
/// The first failing batch aborts the write. Batches already written stay.
pub fn write_batches<B: TableBackend + ?Sized>(
    backend: &B,
    partition_key: &str,
    entities: &[Entity],
) -> StoreResult<WrittenRows> {
    let batch_size = backend.max_batch_size().max(1);
    let mut batches = 0;
    for (batch, chunk) in entities.chunks(batch_size).enumerate() {
        for entity in chunk {
            write_row(backend, entity).map_err(|source| {
                error!(partition = partition_key, batch, error = %source, "batch write failed");
                StoreError::Batch {
                    partition: partition_key.to_string(),
                    batch,
                    source,
                }
            })?;
        }
        debug!(partition = partition_key, batch, rows = chunk.len(), "batch written");
        batches += 1;
    }
    Ok(WrittenRows {
        partition_key: partition_key.to_string(),
        rows: entities.len(),
        batches,
    })
}

/// Properties returned by retrieval. Anything else on a row stays behind.
pub fn record_fields() -> Vec<String> {
    [PROJECT_KEY, BRANCH, DATE]
        .into_iter()
        .chain(Metric::ALL.iter().map(|m| m.as_str()))
        .map(str::to_string)
        .collect()
}

/// Query for a project's rows on one branch dated `start_date` or later.
pub fn retrieval_query(
    project: &str,
    branch: Option<&str>,
    start_date: NaiveDate,
) -> StoreResult<EntityQuery> {
    let partition_key = derive_partition_key(project, branch)?;
    let branch = branch.filter(|b| !b.is_empty()).unwrap_or(DEFAULT_BRANCH);
    Ok(EntityQuery::builder()
        .eq(PARTITION_KEY, "pk", partition_key)
        .eq(PROJECT_KEY, "project_key", project)
        .eq(BRANCH, "branch", branch)
        .ge(DATE, "start_date", start_date.format("%Y-%m-%d").to_string())
        .select(record_fields())
        .build())
}

/// First day of a `days`-long window ending today.
pub fn window_start(today: NaiveDate, days: u32) -> NaiveDate {
    today
        .checked_sub_days(chrono::Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MIN)
}

/// Record form of a stored property. Text stays text.
fn metric_value(value: EntityValue) -> Option<MetricValue> {
    match value {
        EntityValue::String(text) => match text.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Some(MetricValue::Number(v)),
            _ => Some(MetricValue::Text(text)),
        },
        other => other.as_f64().map(MetricValue::Number),
    }
}

/// Read a stored row back as a record. Missing metrics are absent.
pub fn record_from_entity(entity: &Entity) -> MetricRecord {
    let text = |name: &str| entity.get_str(name).unwrap_or_default().to_string();
    MetricRecord {
        project_key: text(PROJECT_KEY),
        branch: text(BRANCH),
        date: text(DATE),
        metrics: Metric::ALL
            .into_iter()
            .filter_map(|m| Some((m, metric_value(entity.get(m.as_str())?)?)))
            .collect(),
    }
}

/// Run a retrieval query through the guard.
pub fn retrieve<B: TableBackend + ?Sized>(
    backend: &B,
    query: &EntityQuery,
    limit: usize,
) -> StoreResult<Bounded<MetricRecord>> {
    let rows = bounded(backend.query_entities(query)?, limit, ScanKind::Records)?;
    Ok(rows.map(|entity| record_from_entity(&entity)))
}

/// Query matching every row of one project branch.
pub fn branch_rows_query(project: &str, branch: Option<&str>) -> StoreResult<EntityQuery> {
    let partition_key = derive_partition_key(project, branch)?;
    let branch = branch.filter(|b| !b.is_empty()).unwrap_or(DEFAULT_BRANCH);
    Ok(EntityQuery::builder()
        .eq(PARTITION_KEY, "pk", partition_key)
        .eq(PROJECT_KEY, "project_key", project)
        .eq(BRANCH, "branch", branch)
        .select([PROJECT_KEY])
        .build())
}

/// Delete a project branch's rows. Returns how many went and whether the
/// scan was capped.
pub fn delete_rows<B: TableBackend + ?Sized>(
    backend: &B,
    project: &str,
    branch: Option<&str>,
    limit: usize,
) -> StoreResult<Bounded<String>> {
    let query = branch_rows_query(project, branch)?;
    let rows = bounded(backend.query_entities(&query)?, limit, ScanKind::Records)?;
    let mut deleted = Vec::with_capacity(rows.len());
    let truncated = rows.truncated;
    for entity in rows {
        match backend.delete_entity(&entity.partition_key, &entity.row_key) {
            Ok(()) => deleted.push(entity.row_key),
            Err(e) if e.is_not_found() => {
                debug!(row = %entity.row_key, "row already gone");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Bounded {
        items: deleted,
        truncated,
    })
}

/// Whether any metric row of `project` remains on any branch.
pub fn project_has_rows<B: TableBackend + ?Sized>(backend: &B, project: &str) -> StoreResult<bool> {
    let query = EntityQuery::builder()
        .eq(PROJECT_KEY, "project_key", project)
        .select([PROJECT_KEY])
        .build();
    // Metadata rows carry ProjectKey too; at most two exist per project.
    for entity in backend.query_entities(&query)? {
        if entity?.partition_key != METADATA_PARTITION {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn written_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 4, 10, 20, 30).unwrap()
    }

    #[test]
    fn row_key_layout() {
        let key = row_key("2025-03-01", written_at(), 7);
        assert_eq!(key, "2025-03-01_102030000000_00007");
    }

    #[test]
    fn row_keys_are_unique_within_a_batch() {
        let rows = vec![MetricRow::new("2025-03-01"); 3];
        let (_, entities) = build_entities(&rows, "p", Some("b"), written_at()).unwrap();
        let mut keys: Vec<_> = entities.iter().map(|e| e.row_key.clone()).collect();
        keys.dedup();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn values_are_normalized() {
        assert_eq!(normalize_value(Some(&json!(3))), EntityValue::Double(3.0));
        assert_eq!(normalize_value(Some(&json!("1.5"))), EntityValue::Double(1.5));
        assert_eq!(normalize_value(Some(&json!("A"))), EntityValue::from("A"));
        assert_eq!(normalize_value(Some(&json!("NaN"))), EntityValue::Double(0.0));
        assert_eq!(normalize_value(Some(&json!(null))), EntityValue::Double(0.0));
        assert_eq!(normalize_value(None), EntityValue::Double(0.0));
    }

    #[test]
    fn entities_carry_identity_and_all_metrics() {
        let rows = vec![MetricRow::new("2025-03-01").with(Metric::Bugs, 4)];
        let (partition, entities) = build_entities(&rows, "p", None, written_at()).unwrap();
        assert_eq!(partition, "p");

        let entity = &entities[0];
        assert_eq!(entity.get_str(PROJECT_KEY), Some("p"));
        assert_eq!(entity.get_str(BRANCH), Some(DEFAULT_BRANCH));
        assert_eq!(entity.get_str(DATE), Some("2025-03-01"));
        assert_eq!(entity.get("bugs"), Some(EntityValue::Double(4.0)));
        assert_eq!(entity.get("coverage"), Some(EntityValue::Double(0.0)));
        assert_eq!(entity.properties.len(), 4 + Metric::ALL.len());
    }

    #[test]
    fn undated_rows_use_the_write_day() {
        let rows = vec![MetricRow::default()];
        let (_, entities) = build_entities(&rows, "p", None, written_at()).unwrap();
        assert_eq!(entities[0].get_str(DATE), Some("2025-03-04"));
    }

    #[test]
    fn retrieval_query_binds_everything_as_parameters() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let query = retrieval_query("p", Some("b"), start).unwrap();
        assert_eq!(
            query.filter(),
            "PartitionKey eq @pk and ProjectKey eq @project_key and Branch eq @branch and Date ge @start_date"
        );
        assert_eq!(query.parameter("pk"), Some(&EntityValue::from("p_b")));
        assert_eq!(query.parameter("start_date"), Some(&EntityValue::from("2025-01-01")));
        assert_eq!(query.select().map(<[String]>::len), Some(3 + Metric::ALL.len()));
    }

    #[test]
    fn window_start_saturates() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
        assert_eq!(window_start(today, 30), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(window_start(today, u32::MAX), NaiveDate::MIN);
    }

    #[test]
    fn text_metrics_read_back_as_text() {
        let entity = Entity::new("p", "r")
            .with(PROJECT_KEY, "p")
            .with(BRANCH, "main")
            .with(DATE, "2025-01-01")
            .with("security_rating", "A")
            .with("bugs", 2.0);
        let record = record_from_entity(&entity);
        assert_eq!(record.get(Metric::Bugs), Some(2.0));
        assert_eq!(record.get(Metric::SecurityRating), None);
        assert_eq!(record.value(Metric::SecurityRating), Some(&MetricValue::from("A")));
        assert_eq!(record.value(Metric::Coverage), None);
    }
}
