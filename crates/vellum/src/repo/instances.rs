//! Block instance repository: the per-book side of the block subsystem.
//!
//! Instances materialize a block definition inside one book; parameter
//! instances hold their field values (one row per instance/parameter pair,
//! enforced by a compound unique index); relation instances draw concrete
//! edges between instances. Every write here is book content, so the owning
//! books are marked for upload inside the same transaction.

use std::collections::BTreeSet;

use vellum_api::{
    BlockInstance, BlockInstancePatch, BlockParameter, BlockParameterInstance,
    BlockRelation, BlockRelationInstance, ParameterWithValue, Result, StoreError,
};

use crate::repo::{self, tables};
use crate::storage::{compound_key, Database, WriteTxn};
use crate::sync;

// ===== Instances =====

pub async fn get_all(db: &Database) -> Result<Vec<BlockInstance>> {
    let txn = db.begin_read().await;
    repo::rows_into(txn.table(tables::BLOCK_INSTANCES)?.all())
}

pub async fn get_by_uuid(db: &Database, uuid: &str) -> Result<Option<BlockInstance>> {
    let txn = db.begin_read().await;
    repo::first_as(&txn.table(tables::BLOCK_INSTANCES)?, "uuid", uuid)
}

/// Every instance of one block definition, across all books.
pub async fn get_by_block(db: &Database, block_uuid: &str) -> Result<Vec<BlockInstance>> {
    let txn = db.begin_read().await;
    repo::rows_as(&txn.table(tables::BLOCK_INSTANCES)?, "blockUuid", block_uuid)
}

/// Every instance living in one book.
pub async fn get_by_book(db: &Database, book_uuid: &str) -> Result<Vec<BlockInstance>> {
    let txn = db.begin_read().await;
    repo::rows_as(&txn.table(tables::BLOCK_INSTANCES)?, "bookUuid", book_uuid)
}

pub async fn add(db: &Database, instance: &BlockInstance) -> Result<()> {
    let mut txn = db.begin_write().await;
    if !repo::txn_has(&txn, tables::BLOCKS, "uuid", &instance.block_uuid)? {
        return Err(StoreError::ReferentialViolation {
            message: format!(
                "instance {} references missing block {}",
                instance.uuid, instance.block_uuid
            ),
        });
    }
    if !repo::txn_has(&txn, tables::BOOKS, "uuid", &instance.book_uuid)? {
        return Err(StoreError::ReferentialViolation {
            message: format!(
                "instance {} references missing book {}",
                instance.uuid, instance.book_uuid
            ),
        });
    }
    txn.add(tables::BLOCK_INSTANCES, repo::to_row(instance)?)?;
    sync::mark_book_changed(&mut txn, &instance.book_uuid);
    txn.commit().await?;
    Ok(())
}

pub async fn update(
    db: &Database,
    uuid: &str,
    patch: &BlockInstancePatch,
) -> Result<Option<BlockInstance>> {
    let mut txn = db.begin_write().await;
    let Some(existing) =
        repo::first_as::<BlockInstance>(&txn.table(tables::BLOCK_INSTANCES)?, "uuid", uuid)?
    else {
        return Ok(None);
    };
    txn.update_where(tables::BLOCK_INSTANCES, "uuid", uuid, &repo::to_row(patch)?)?;
    sync::mark_book_changed(&mut txn, &existing.book_uuid);
    let updated = repo::first_as(&txn.table(tables::BLOCK_INSTANCES)?, "uuid", uuid)?;
    txn.commit().await?;
    Ok(updated)
}

/// Delete an instance with its parameter values and every edge touching it.
/// Marks the owning book, and any neighbour book that lost an edge.
pub async fn delete(db: &Database, uuid: &str) -> Result<bool> {
    let mut txn = db.begin_write().await;
    let Some(existing) =
        repo::first_as::<BlockInstance>(&txn.table(tables::BLOCK_INSTANCES)?, "uuid", uuid)?
    else {
        return Ok(false);
    };
    let mut affected_books = BTreeSet::new();
    affected_books.insert(existing.book_uuid.clone());
    delete_instance_rows(&mut txn, uuid, &mut affected_books)?;
    for book in &affected_books {
        sync::mark_book_changed(&mut txn, book);
    }
    txn.commit().await?;
    Ok(true)
}

// ===== Parameter values =====

/// The values an instance holds, one per filled-in parameter.
pub async fn parameter_values_of(
    db: &Database,
    instance_uuid: &str,
) -> Result<Vec<BlockParameterInstance>> {
    let txn = db.begin_read().await;
    let mut values: Vec<BlockParameterInstance> = repo::rows_as(
        &txn.table(tables::BLOCK_PARAMETER_INSTANCES)?,
        "instanceUuid",
        instance_uuid,
    )?;
    values.sort_by(|a, b| a.parameter_uuid.cmp(&b.parameter_uuid));
    Ok(values)
}

/// Set the value an instance holds for one parameter: updates the existing
/// row for the `(instance, parameter)` pair or creates it. This is the
/// write path behind every field edit.
pub async fn set_parameter_value(
    db: &Database,
    instance_uuid: &str,
    parameter_uuid: &str,
    value: impl Into<String>,
) -> Result<BlockParameterInstance> {
    let value = value.into();
    let mut txn = db.begin_write().await;
    let Some(instance) = repo::first_as::<BlockInstance>(
        &txn.table(tables::BLOCK_INSTANCES)?,
        "uuid",
        instance_uuid,
    )?
    else {
        return Err(StoreError::ReferentialViolation {
            message: format!("value targets missing instance {instance_uuid}"),
        });
    };
    let Some(parameter) = repo::first_as::<BlockParameter>(
        &txn.table(tables::BLOCK_PARAMETERS)?,
        "uuid",
        parameter_uuid,
    )?
    else {
        return Err(StoreError::ReferentialViolation {
            message: format!("value targets missing parameter {parameter_uuid}"),
        });
    };
    if parameter.block_uuid != instance.block_uuid {
        return Err(StoreError::ReferentialViolation {
            message: format!(
                "parameter {parameter_uuid} is not declared on block {}",
                instance.block_uuid
            ),
        });
    }
    let pair = compound_key(&[instance_uuid, parameter_uuid]);
    let existing = repo::first_as::<BlockParameterInstance>(
        &txn.table(tables::BLOCK_PARAMETER_INSTANCES)?,
        "instanceUuid+parameterUuid",
        &pair,
    )?;
    let row = match existing {
        Some(mut row) => {
            row.value = value;
            txn.put(tables::BLOCK_PARAMETER_INSTANCES, repo::to_row(&row)?)?;
            row
        }
        None => {
            let row = BlockParameterInstance::new(instance_uuid, parameter_uuid, value);
            txn.add(tables::BLOCK_PARAMETER_INSTANCES, repo::to_row(&row)?)?;
            row
        }
    };
    sync::mark_book_changed(&mut txn, &instance.book_uuid);
    txn.commit().await?;
    Ok(row)
}

/// Overwrite one stored value, addressed by its own uuid. `None` when the
/// uuid resolves to nothing.
pub async fn update_parameter_value(
    db: &Database,
    uuid: &str,
    value: impl Into<String>,
) -> Result<Option<BlockParameterInstance>> {
    let mut txn = db.begin_write().await;
    let Some(mut row) = repo::first_as::<BlockParameterInstance>(
        &txn.table(tables::BLOCK_PARAMETER_INSTANCES)?,
        "uuid",
        uuid,
    )?
    else {
        return Ok(None);
    };
    row.value = value.into();
    txn.put(tables::BLOCK_PARAMETER_INSTANCES, repo::to_row(&row)?)?;
    if let Some(book) = book_of_instance(&txn, &row.instance_uuid)? {
        sync::mark_book_changed(&mut txn, &book);
    }
    txn.commit().await?;
    Ok(Some(row))
}

// ===== Relation edges =====

/// Draw an edge between two instances. The relation definition must exist
/// and the endpoint instances must be of its declared source and target
/// blocks. Both endpoint books are marked for upload.
pub async fn add_relation_instance(db: &Database, edge: &BlockRelationInstance) -> Result<()> {
    let mut txn = db.begin_write().await;
    let Some(relation) = repo::first_as::<BlockRelation>(
        &txn.table(tables::BLOCK_RELATIONS)?,
        "uuid",
        &edge.relation_uuid,
    )?
    else {
        return Err(StoreError::ReferentialViolation {
            message: format!(
                "edge {} references missing relation {}",
                edge.uuid, edge.relation_uuid
            ),
        });
    };
    let mut books = BTreeSet::new();
    for (endpoint_uuid, declared_block) in [
        (&edge.source_instance_uuid, &relation.source_block_uuid),
        (&edge.target_instance_uuid, &relation.target_block_uuid),
    ] {
        let Some(endpoint) = repo::first_as::<BlockInstance>(
            &txn.table(tables::BLOCK_INSTANCES)?,
            "uuid",
            endpoint_uuid,
        )?
        else {
            return Err(StoreError::ReferentialViolation {
                message: format!("edge {} references missing instance {endpoint_uuid}", edge.uuid),
            });
        };
        if &endpoint.block_uuid != declared_block {
            return Err(StoreError::ReferentialViolation {
                message: format!(
                    "edge {} endpoint {endpoint_uuid} is not an instance of block {declared_block}",
                    edge.uuid
                ),
            });
        }
        books.insert(endpoint.book_uuid);
    }
    txn.add(tables::BLOCK_RELATION_INSTANCES, repo::to_row(edge)?)?;
    for book in &books {
        sync::mark_book_changed(&mut txn, book);
    }
    txn.commit().await?;
    Ok(())
}

/// Every edge touching one instance, as source or target, deduplicated.
pub async fn relations_of_instance(
    db: &Database,
    instance_uuid: &str,
) -> Result<Vec<BlockRelationInstance>> {
    let txn = db.begin_read().await;
    let table = txn.table(tables::BLOCK_RELATION_INSTANCES)?;
    let mut edges: Vec<BlockRelationInstance> =
        repo::rows_as(&table, "sourceInstanceUuid", instance_uuid)?;
    let incoming: Vec<BlockRelationInstance> =
        repo::rows_as(&table, "targetInstanceUuid", instance_uuid)?;
    for edge in incoming {
        if !edges.iter().any(|e| e.uuid == edge.uuid) {
            edges.push(edge);
        }
    }
    edges.sort_by(|a, b| a.uuid.cmp(&b.uuid));
    Ok(edges)
}

pub async fn delete_relation_instance(db: &Database, uuid: &str) -> Result<bool> {
    let mut txn = db.begin_write().await;
    let Some(edge) = repo::first_as::<BlockRelationInstance>(
        &txn.table(tables::BLOCK_RELATION_INSTANCES)?,
        "uuid",
        uuid,
    )?
    else {
        return Ok(false);
    };
    let mut books = BTreeSet::new();
    for endpoint in [&edge.source_instance_uuid, &edge.target_instance_uuid] {
        if let Some(book) = book_of_instance(&txn, endpoint)? {
            books.insert(book);
        }
    }
    txn.delete_where(tables::BLOCK_RELATION_INSTANCES, "uuid", uuid)?;
    for book in &books {
        sync::mark_book_changed(&mut txn, book);
    }
    txn.commit().await?;
    Ok(true)
}

// ===== Reverse references =====

/// The parameter definitions, with their stored values, carried by every
/// instance related (through relation edges) to any instance of
/// `block_uuid`.
///
/// This answers "what does the rest of the cast say about characters of
/// this kind": once cascade deletes remove the linking instance or its
/// edges, the result shrinks accordingly.
pub async fn referencing_parameters(
    db: &Database,
    block_uuid: &str,
) -> Result<Vec<ParameterWithValue>> {
    let txn = db.begin_read().await;
    let instances_table = txn.table(tables::BLOCK_INSTANCES)?;
    let edges_table = txn.table(tables::BLOCK_RELATION_INSTANCES)?;
    let values_table = txn.table(tables::BLOCK_PARAMETER_INSTANCES)?;
    let parameters_table = txn.table(tables::BLOCK_PARAMETERS)?;

    let mut related: BTreeSet<String> = BTreeSet::new();
    for row in instances_table.where_eq("blockUuid", block_uuid)?.to_vec() {
        let Some(instance_uuid) = row.get("uuid").and_then(|v| v.as_str()) else {
            continue;
        };
        for (own_field, other_field) in [
            ("sourceInstanceUuid", "targetInstanceUuid"),
            ("targetInstanceUuid", "sourceInstanceUuid"),
        ] {
            for edge in edges_table.where_eq(own_field, instance_uuid)?.to_vec() {
                if let Some(other) = edge.get(other_field).and_then(|v| v.as_str()) {
                    related.insert(other.to_string());
                }
            }
        }
    }

    let mut result = Vec::new();
    for instance_uuid in &related {
        let values: Vec<BlockParameterInstance> =
            repo::rows_as(&values_table, "instanceUuid", instance_uuid)?;
        for value in values {
            let Some(parameter) = repo::first_as::<BlockParameter>(
                &parameters_table,
                "uuid",
                &value.parameter_uuid,
            )?
            else {
                continue;
            };
            result.push(ParameterWithValue { parameter, value });
        }
    }
    result.sort_by(|a, b| {
        a.value
            .instance_uuid
            .cmp(&b.value.instance_uuid)
            .then(a.parameter.position.cmp(&b.parameter.position))
            .then(a.parameter.uuid.cmp(&b.parameter.uuid))
    });
    Ok(result)
}

// ===== Cascade plumbing =====

pub(crate) fn book_of_instance(txn: &WriteTxn, instance_uuid: &str) -> Result<Option<String>> {
    Ok(txn
        .table(tables::BLOCK_INSTANCES)?
        .where_eq("uuid", instance_uuid)?
        .first()
        .and_then(|row| row.get("bookUuid").and_then(|v| v.as_str()).map(str::to_string)))
}

/// Remove one instance with its values and edges. Books of neighbour
/// instances that lose an edge are added to `affected_books`; marking is
/// the caller's job.
pub(crate) fn delete_instance_rows(
    txn: &mut WriteTxn,
    instance_uuid: &str,
    affected_books: &mut BTreeSet<String>,
) -> Result<()> {
    for (own_field, other_field) in [
        ("sourceInstanceUuid", "targetInstanceUuid"),
        ("targetInstanceUuid", "sourceInstanceUuid"),
    ] {
        let edges = txn
            .table(tables::BLOCK_RELATION_INSTANCES)?
            .where_eq(own_field, instance_uuid)?
            .to_vec();
        for edge in edges {
            let Some(other) = edge.get(other_field).and_then(|v| v.as_str()) else {
                continue;
            };
            if other != instance_uuid {
                if let Some(book) = book_of_instance(txn, other)? {
                    affected_books.insert(book);
                }
            }
        }
        txn.delete_where(tables::BLOCK_RELATION_INSTANCES, own_field, instance_uuid)?;
    }
    txn.delete_where(tables::BLOCK_PARAMETER_INSTANCES, "instanceUuid", instance_uuid)?;
    txn.delete_where(tables::BLOCK_INSTANCES, "uuid", instance_uuid)?;
    Ok(())
}

/// Remove every instance of one book, with values and edges. Neighbour
/// books that lost an edge are marked; the book being deleted is not.
pub(crate) fn delete_by_book(txn: &mut WriteTxn, book_uuid: &str) -> Result<()> {
    let instance_uuids =
        repo::collect_field(txn, tables::BLOCK_INSTANCES, "bookUuid", book_uuid, "uuid")?;
    let mut affected_books = BTreeSet::new();
    for instance_uuid in &instance_uuids {
        delete_instance_rows(txn, instance_uuid, &mut affected_books)?;
    }
    affected_books.remove(book_uuid);
    for book in &affected_books {
        sync::mark_book_changed(txn, book);
    }
    Ok(())
}
