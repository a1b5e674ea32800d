//! Typed repositories over the storage engine, one module per entity family.
//!
//! Every function takes the [`Database`] handle explicitly. Lookups express
//! absence as `Option` and deletes as `bool`; errors are reserved for
//! constraint violations and storage failures. Deletes cascade to
//! dependents inside a single transaction, and every book-content write
//! marks the owning book for upload in that same transaction.

pub mod blocks;
pub mod books;
pub mod chapters;
pub mod configurations;
pub mod instances;
pub mod notes;
pub mod scenes;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use vellum_api::{Result, StoreError};

use crate::storage::{RowData, Schema, SchemaVersion, TableRead, TableSpec, WriteTxn};

/// Table names, shared by the repositories, the schema declaration, and
/// live-query dependency sets.
pub mod tables {
    pub const BOOKS: &str = "books";
    pub const CHAPTERS: &str = "chapters";
    pub const SCENES: &str = "scenes";
    pub const NOTES: &str = "notes";
    pub const CONFIGURATIONS: &str = "configurations";
    pub const BLOCKS: &str = "blocks";
    pub const BLOCK_PARAMETERS: &str = "blockParameters";
    pub const BLOCK_RELATIONS: &str = "blockRelations";
    pub const BLOCK_INSTANCES: &str = "blockInstances";
    pub const BLOCK_PARAMETER_INSTANCES: &str = "blockParameterInstances";
    pub const BLOCK_RELATION_INSTANCES: &str = "blockRelationInstances";
}

/// The application schema. The versions are append-only history: v1 shipped
/// the book shelf, v2 the configuration templates, v3 the per-book block
/// instances.
pub fn schema() -> Result<Schema> {
    Schema::new(vec![
        SchemaVersion::new(1)
            .table(
                TableSpec::new(tables::BOOKS)
                    .unique("uuid")
                    .index("configurationUuid"),
            )
            .table(TableSpec::new(tables::CHAPTERS).unique("uuid").index("bookUuid"))
            .table(
                TableSpec::new(tables::SCENES)
                    .unique("uuid")
                    .index("bookUuid")
                    .index("chapterUuid"),
            )
            .table(
                TableSpec::new(tables::NOTES)
                    .unique("uuid")
                    .index("configurationUuid"),
            ),
        SchemaVersion::new(2)
            .table(TableSpec::new(tables::CONFIGURATIONS).unique("uuid"))
            .table(
                TableSpec::new(tables::BLOCKS)
                    .unique("uuid")
                    .index("configurationUuid"),
            )
            .table(
                TableSpec::new(tables::BLOCK_PARAMETERS)
                    .unique("uuid")
                    .index("blockUuid"),
            )
            .table(
                TableSpec::new(tables::BLOCK_RELATIONS)
                    .unique("uuid")
                    .index("configurationUuid")
                    .index("sourceBlockUuid")
                    .index("targetBlockUuid"),
            ),
        SchemaVersion::new(3)
            .table(
                TableSpec::new(tables::BLOCK_INSTANCES)
                    .unique("uuid")
                    .index("blockUuid")
                    .index("bookUuid"),
            )
            .table(
                TableSpec::new(tables::BLOCK_PARAMETER_INSTANCES)
                    .unique("uuid")
                    .index("instanceUuid")
                    .index("parameterUuid")
                    .compound_unique(&["instanceUuid", "parameterUuid"]),
            )
            .table(
                TableSpec::new(tables::BLOCK_RELATION_INSTANCES)
                    .unique("uuid")
                    .index("relationUuid")
                    .index("sourceInstanceUuid")
                    .index("targetInstanceUuid"),
            ),
    ])
}

// ===== Row conversion =====

pub(crate) fn to_row<T: Serialize>(entity: &T) -> Result<RowData> {
    match serde_json::to_value(entity)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization {
            message: format!("entity serialized to non-object JSON: {other}"),
        }),
    }
}

pub(crate) fn from_row<T: DeserializeOwned>(row: RowData) -> Result<T> {
    Ok(serde_json::from_value(serde_json::Value::Object(row))?)
}

pub(crate) fn rows_into<T: DeserializeOwned>(rows: Vec<RowData>) -> Result<Vec<T>> {
    rows.into_iter().map(from_row).collect()
}

/// First row under an index key, decoded.
pub(crate) fn first_as<T: DeserializeOwned>(
    table: &TableRead<'_>,
    index: &str,
    key: &str,
) -> Result<Option<T>> {
    table.where_eq(index, key)?.first().map(from_row).transpose()
}

/// All rows under an index key, decoded.
pub(crate) fn rows_as<T: DeserializeOwned>(
    table: &TableRead<'_>,
    index: &str,
    key: &str,
) -> Result<Vec<T>> {
    rows_into(table.where_eq(index, key)?.to_vec())
}

/// Does any row exist under the index key, as seen by this transaction?
pub(crate) fn txn_has(txn: &WriteTxn, table: &str, index: &str, key: &str) -> Result<bool> {
    Ok(!txn.table(table)?.where_eq(index, key)?.is_empty())
}

/// One string field of every row under an index key. Cascade code uses
/// this to resolve dependent uuids before deleting.
pub(crate) fn collect_field(
    txn: &WriteTxn,
    table: &str,
    index: &str,
    key: &str,
    field: &str,
) -> Result<Vec<String>> {
    Ok(txn
        .table(table)?
        .where_eq(index, key)?
        .to_vec()
        .iter()
        .filter_map(|row| row.get(field).and_then(|v| v.as_str()).map(str::to_string))
        .collect())
}

/// A "now" that is strictly after `prev`. Wall clocks can stand still or
/// step backwards; callers that need a strictly increasing stamp pass the
/// previous one.
pub(crate) fn monotonic_now(prev: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > prev {
        now
    } else {
        prev + Duration::microseconds(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_app_schema_is_valid() {
        let schema = schema().unwrap();
        assert_eq!(schema.latest_version(), 3);
        assert_eq!(schema.tables().len(), 11);
    }

    #[test]
    fn test_monotonic_now_advances_past_future_stamp() {
        let far_future = Utc.with_ymd_and_hms(2200, 1, 1, 0, 0, 0).unwrap();
        let next = monotonic_now(far_future);
        assert!(next > far_future);
    }

    #[test]
    fn test_monotonic_now_uses_clock_when_ahead() {
        let past = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let next = monotonic_now(past);
        assert!(next > past);
    }
}
