//! Configuration repository: the reusable template sets.

use tracing::debug;

use vellum_api::{Configuration, ConfigurationPatch, Result, StoreError};

use crate::repo::{self, blocks, tables};
use crate::storage::Database;

pub async fn get_all(db: &Database) -> Result<Vec<Configuration>> {
    let txn = db.begin_read().await;
    repo::rows_into(txn.table(tables::CONFIGURATIONS)?.all())
}

pub async fn get_by_uuid(db: &Database, uuid: &str) -> Result<Option<Configuration>> {
    let txn = db.begin_read().await;
    repo::first_as(&txn.table(tables::CONFIGURATIONS)?, "uuid", uuid)
}

pub async fn add(db: &Database, configuration: &Configuration) -> Result<()> {
    let mut txn = db.begin_write().await;
    txn.add(tables::CONFIGURATIONS, repo::to_row(configuration)?)?;
    txn.commit().await?;
    Ok(())
}

pub async fn update(
    db: &Database,
    uuid: &str,
    patch: &ConfigurationPatch,
) -> Result<Option<Configuration>> {
    let mut txn = db.begin_write().await;
    let modified = txn.update_where(tables::CONFIGURATIONS, "uuid", uuid, &repo::to_row(patch)?)?;
    if modified == 0 {
        return Ok(None);
    }
    let updated = repo::first_as(&txn.table(tables::CONFIGURATIONS)?, "uuid", uuid)?;
    txn.commit().await?;
    Ok(updated)
}

/// Delete a configuration with its blocks (cascading to their parameters,
/// relations, and instances) and its notes.
///
/// Rejected while any book still references the configuration: a shelf
/// entry with a dangling template set would break every lookup the editing
/// surface performs.
pub async fn delete(db: &Database, uuid: &str) -> Result<bool> {
    let mut txn = db.begin_write().await;
    if !repo::txn_has(&txn, tables::CONFIGURATIONS, "uuid", uuid)? {
        return Ok(false);
    }
    if repo::txn_has(&txn, tables::BOOKS, "configurationUuid", uuid)? {
        return Err(StoreError::ReferentialViolation {
            message: format!("configuration {uuid} is still referenced by books"),
        });
    }
    let block_uuids =
        repo::collect_field(&txn, tables::BLOCKS, "configurationUuid", uuid, "uuid")?;
    for block_uuid in &block_uuids {
        blocks::delete_block_cascade(&mut txn, block_uuid)?;
    }
    // Relations are owned by the configuration; any not already removed via
    // their endpoint blocks go now.
    txn.delete_where(tables::BLOCK_RELATIONS, "configurationUuid", uuid)?;
    txn.delete_where(tables::NOTES, "configurationUuid", uuid)?;
    txn.delete_where(tables::CONFIGURATIONS, "uuid", uuid)?;
    debug!(configuration = uuid, blocks = block_uuids.len(), "deleted configuration with cascade");
    txn.commit().await?;
    Ok(true)
}
