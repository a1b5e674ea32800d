//! Block definition repository: the template side of the block subsystem.
//!
//! Covers block definitions plus their parameters and relations. Deletions
//! here reach into the instance side: removing a definition removes every
//! per-book materialization of it, and the books that lose content are
//! marked for upload in the same transaction.

use std::collections::BTreeSet;

use tracing::debug;

use vellum_api::{
    Block, BlockParameter, BlockParameterPatch, BlockPatch, BlockRelation, BlockRelationPatch,
    Result, StoreError,
};

use crate::repo::{self, instances, tables};
use crate::storage::{Database, WriteTxn};
use crate::sync;

// ===== Block definitions =====

pub async fn get_all(db: &Database) -> Result<Vec<Block>> {
    let txn = db.begin_read().await;
    repo::rows_into(txn.table(tables::BLOCKS)?.all())
}

pub async fn get_by_uuid(db: &Database, uuid: &str) -> Result<Option<Block>> {
    let txn = db.begin_read().await;
    repo::first_as(&txn.table(tables::BLOCKS)?, "uuid", uuid)
}

pub async fn get_by_configuration(db: &Database, configuration_uuid: &str) -> Result<Vec<Block>> {
    let txn = db.begin_read().await;
    repo::rows_as(&txn.table(tables::BLOCKS)?, "configurationUuid", configuration_uuid)
}

pub async fn add(db: &Database, block: &Block) -> Result<()> {
    let mut txn = db.begin_write().await;
    if !repo::txn_has(&txn, tables::CONFIGURATIONS, "uuid", &block.configuration_uuid)? {
        return Err(StoreError::ReferentialViolation {
            message: format!(
                "block {} references missing configuration {}",
                block.uuid, block.configuration_uuid
            ),
        });
    }
    txn.add(tables::BLOCKS, repo::to_row(block)?)?;
    txn.commit().await?;
    Ok(())
}

pub async fn update(db: &Database, uuid: &str, patch: &BlockPatch) -> Result<Option<Block>> {
    let mut txn = db.begin_write().await;
    let modified = txn.update_where(tables::BLOCKS, "uuid", uuid, &repo::to_row(patch)?)?;
    if modified == 0 {
        return Ok(None);
    }
    let updated = repo::first_as(&txn.table(tables::BLOCKS)?, "uuid", uuid)?;
    txn.commit().await?;
    Ok(updated)
}

/// Delete a block definition and cascade: its parameters (with every stored
/// value), the relations touching it (with every edge), and its instances
/// in every book. Affected books are marked for upload.
pub async fn delete(db: &Database, uuid: &str) -> Result<bool> {
    let mut txn = db.begin_write().await;
    if !repo::txn_has(&txn, tables::BLOCKS, "uuid", uuid)? {
        return Ok(false);
    }
    delete_block_cascade(&mut txn, uuid)?;
    txn.commit().await?;
    Ok(true)
}

/// The cascade behind [`delete`], shared with the configuration cascade.
pub(crate) fn delete_block_cascade(txn: &mut WriteTxn, block_uuid: &str) -> Result<()> {
    let mut affected_books = BTreeSet::new();

    // Parameter definitions, and every value any instance holds for them.
    let parameter_uuids =
        repo::collect_field(txn, tables::BLOCK_PARAMETERS, "blockUuid", block_uuid, "uuid")?;
    for parameter_uuid in &parameter_uuids {
        txn.delete_where(tables::BLOCK_PARAMETER_INSTANCES, "parameterUuid", parameter_uuid)?;
    }
    txn.delete_where(tables::BLOCK_PARAMETERS, "blockUuid", block_uuid)?;

    // Relations touching the block as either endpoint, with their edges.
    // An edge can end at an instance in another book; that book loses the
    // edge, so its uuid is collected before the rows disappear.
    let mut relation_uuids = BTreeSet::new();
    for index in ["sourceBlockUuid", "targetBlockUuid"] {
        relation_uuids.extend(repo::collect_field(
            txn,
            tables::BLOCK_RELATIONS,
            index,
            block_uuid,
            "uuid",
        )?);
    }
    for relation_uuid in &relation_uuids {
        for field in ["sourceInstanceUuid", "targetInstanceUuid"] {
            let endpoint_instances = repo::collect_field(
                txn,
                tables::BLOCK_RELATION_INSTANCES,
                "relationUuid",
                relation_uuid,
                field,
            )?;
            for instance_uuid in &endpoint_instances {
                if let Some(book) = instances::book_of_instance(txn, instance_uuid)? {
                    affected_books.insert(book);
                }
            }
        }
        txn.delete_where(tables::BLOCK_RELATION_INSTANCES, "relationUuid", relation_uuid)?;
        txn.delete_where(tables::BLOCK_RELATIONS, "uuid", relation_uuid)?;
    }

    // Instances of the block, with their remaining values and edges.
    let instance_uuids =
        repo::collect_field(txn, tables::BLOCK_INSTANCES, "blockUuid", block_uuid, "uuid")?;
    for instance_uuid in &instance_uuids {
        if let Some(book) = instances::book_of_instance(txn, instance_uuid)? {
            affected_books.insert(book);
        }
        instances::delete_instance_rows(txn, instance_uuid, &mut affected_books)?;
    }
    txn.delete_where(tables::BLOCKS, "uuid", block_uuid)?;
    for book in &affected_books {
        sync::mark_book_changed(txn, book);
    }
    debug!(
        block = block_uuid,
        parameters = parameter_uuids.len(),
        relations = relation_uuids.len(),
        instances = instance_uuids.len(),
        books = affected_books.len(),
        "deleted block with cascade"
    );
    Ok(())
}

// ===== Parameters =====

pub async fn get_parameter(db: &Database, uuid: &str) -> Result<Option<BlockParameter>> {
    let txn = db.begin_read().await;
    repo::first_as(&txn.table(tables::BLOCK_PARAMETERS)?, "uuid", uuid)
}

/// Parameters declared on one block, in declaration order.
pub async fn parameters_of(db: &Database, block_uuid: &str) -> Result<Vec<BlockParameter>> {
    let txn = db.begin_read().await;
    let mut parameters: Vec<BlockParameter> =
        repo::rows_as(&txn.table(tables::BLOCK_PARAMETERS)?, "blockUuid", block_uuid)?;
    parameters.sort_by_key(|p| p.position);
    Ok(parameters)
}

pub async fn add_parameter(db: &Database, parameter: &BlockParameter) -> Result<()> {
    let mut txn = db.begin_write().await;
    if !repo::txn_has(&txn, tables::BLOCKS, "uuid", &parameter.block_uuid)? {
        return Err(StoreError::ReferentialViolation {
            message: format!(
                "parameter {} references missing block {}",
                parameter.uuid, parameter.block_uuid
            ),
        });
    }
    txn.add(tables::BLOCK_PARAMETERS, repo::to_row(parameter)?)?;
    txn.commit().await?;
    Ok(())
}

pub async fn update_parameter(
    db: &Database,
    uuid: &str,
    patch: &BlockParameterPatch,
) -> Result<Option<BlockParameter>> {
    let mut txn = db.begin_write().await;
    let modified = txn.update_where(tables::BLOCK_PARAMETERS, "uuid", uuid, &repo::to_row(patch)?)?;
    if modified == 0 {
        return Ok(None);
    }
    let updated = repo::first_as(&txn.table(tables::BLOCK_PARAMETERS)?, "uuid", uuid)?;
    txn.commit().await?;
    Ok(updated)
}

/// Delete a parameter definition and every value stored for it. The books
/// holding those values are marked for upload.
pub async fn delete_parameter(db: &Database, uuid: &str) -> Result<bool> {
    let mut txn = db.begin_write().await;
    if !repo::txn_has(&txn, tables::BLOCK_PARAMETERS, "uuid", uuid)? {
        return Ok(false);
    }
    let holder_instances = repo::collect_field(
        &txn,
        tables::BLOCK_PARAMETER_INSTANCES,
        "parameterUuid",
        uuid,
        "instanceUuid",
    )?;
    let mut affected_books = BTreeSet::new();
    for instance_uuid in &holder_instances {
        if let Some(book) = instances::book_of_instance(&txn, instance_uuid)? {
            affected_books.insert(book);
        }
    }
    txn.delete_where(tables::BLOCK_PARAMETER_INSTANCES, "parameterUuid", uuid)?;
    txn.delete_where(tables::BLOCK_PARAMETERS, "uuid", uuid)?;
    for book in &affected_books {
        sync::mark_book_changed(&mut txn, book);
    }
    txn.commit().await?;
    Ok(true)
}

// ===== Relations =====

pub async fn get_relation(db: &Database, uuid: &str) -> Result<Option<BlockRelation>> {
    let txn = db.begin_read().await;
    repo::first_as(&txn.table(tables::BLOCK_RELATIONS)?, "uuid", uuid)
}

/// Relations touching one block as source or target, deduplicated (a
/// self-relation appears once).
pub async fn relations_of(db: &Database, block_uuid: &str) -> Result<Vec<BlockRelation>> {
    let txn = db.begin_read().await;
    let table = txn.table(tables::BLOCK_RELATIONS)?;
    let mut relations: Vec<BlockRelation> = repo::rows_as(&table, "sourceBlockUuid", block_uuid)?;
    let targets: Vec<BlockRelation> = repo::rows_as(&table, "targetBlockUuid", block_uuid)?;
    for relation in targets {
        if !relations.iter().any(|r| r.uuid == relation.uuid) {
            relations.push(relation);
        }
    }
    relations.sort_by(|a, b| a.uuid.cmp(&b.uuid));
    Ok(relations)
}

/// Add a relation. Both endpoint blocks must exist and belong to the
/// relation's own configuration.
pub async fn add_relation(db: &Database, relation: &BlockRelation) -> Result<()> {
    let mut txn = db.begin_write().await;
    if !repo::txn_has(&txn, tables::CONFIGURATIONS, "uuid", &relation.configuration_uuid)? {
        return Err(StoreError::ReferentialViolation {
            message: format!(
                "relation {} references missing configuration {}",
                relation.uuid, relation.configuration_uuid
            ),
        });
    }
    for endpoint in [&relation.source_block_uuid, &relation.target_block_uuid] {
        let block = repo::first_as::<Block>(&txn.table(tables::BLOCKS)?, "uuid", endpoint)?;
        match block {
            Some(block) if block.configuration_uuid == relation.configuration_uuid => {}
            Some(_) => {
                return Err(StoreError::ReferentialViolation {
                    message: format!(
                        "relation {} endpoint {endpoint} belongs to another configuration",
                        relation.uuid
                    ),
                });
            }
            None => {
                return Err(StoreError::ReferentialViolation {
                    message: format!(
                        "relation {} references missing block {endpoint}",
                        relation.uuid
                    ),
                });
            }
        }
    }
    txn.add(tables::BLOCK_RELATIONS, repo::to_row(relation)?)?;
    txn.commit().await?;
    Ok(())
}

pub async fn update_relation(
    db: &Database,
    uuid: &str,
    patch: &BlockRelationPatch,
) -> Result<Option<BlockRelation>> {
    let mut txn = db.begin_write().await;
    let modified = txn.update_where(tables::BLOCK_RELATIONS, "uuid", uuid, &repo::to_row(patch)?)?;
    if modified == 0 {
        return Ok(None);
    }
    let updated = repo::first_as(&txn.table(tables::BLOCK_RELATIONS)?, "uuid", uuid)?;
    txn.commit().await?;
    Ok(updated)
}

/// Delete a relation definition and every edge drawn from it. The books
/// whose instances lose edges are marked for upload.
pub async fn delete_relation(db: &Database, uuid: &str) -> Result<bool> {
    let mut txn = db.begin_write().await;
    if !repo::txn_has(&txn, tables::BLOCK_RELATIONS, "uuid", uuid)? {
        return Ok(false);
    }
    let mut affected_books = BTreeSet::new();
    for field in ["sourceInstanceUuid", "targetInstanceUuid"] {
        let endpoint_instances = repo::collect_field(
            &txn,
            tables::BLOCK_RELATION_INSTANCES,
            "relationUuid",
            uuid,
            field,
        )?;
        for instance_uuid in &endpoint_instances {
            if let Some(book) = instances::book_of_instance(&txn, instance_uuid)? {
                affected_books.insert(book);
            }
        }
    }
    txn.delete_where(tables::BLOCK_RELATION_INSTANCES, "relationUuid", uuid)?;
    txn.delete_where(tables::BLOCK_RELATIONS, "uuid", uuid)?;
    for book in &affected_books {
        sync::mark_book_changed(&mut txn, book);
    }
    txn.commit().await?;
    Ok(true)
}
