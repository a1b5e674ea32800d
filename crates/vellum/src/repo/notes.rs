//! Note repository. Notes are world-building material scoped to a
//! configuration, outside both the block graph and the per-book sync
//! bookkeeping.

use vellum_api::{Note, NotePatch, Result, StoreError};

use crate::repo::{self, tables};
use crate::storage::Database;

pub async fn get_all(db: &Database) -> Result<Vec<Note>> {
    let txn = db.begin_read().await;
    repo::rows_into(txn.table(tables::NOTES)?.all())
}

pub async fn get_by_uuid(db: &Database, uuid: &str) -> Result<Option<Note>> {
    let txn = db.begin_read().await;
    repo::first_as(&txn.table(tables::NOTES)?, "uuid", uuid)
}

/// Notes of one configuration, most recently updated first.
pub async fn get_by_configuration(db: &Database, configuration_uuid: &str) -> Result<Vec<Note>> {
    let txn = db.begin_read().await;
    let mut notes: Vec<Note> =
        repo::rows_as(&txn.table(tables::NOTES)?, "configurationUuid", configuration_uuid)?;
    notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Ok(notes)
}

pub async fn add(db: &Database, note: &Note) -> Result<()> {
    let mut txn = db.begin_write().await;
    if !repo::txn_has(&txn, tables::CONFIGURATIONS, "uuid", &note.configuration_uuid)? {
        return Err(StoreError::ReferentialViolation {
            message: format!(
                "note {} references missing configuration {}",
                note.uuid, note.configuration_uuid
            ),
        });
    }
    txn.add(tables::NOTES, repo::to_row(note)?)?;
    txn.commit().await?;
    Ok(())
}

/// Merge `patch` into the note and advance `updatedAt`. The stamp is
/// strictly monotonic so repeated quick edits still order correctly.
pub async fn update(db: &Database, uuid: &str, patch: &NotePatch) -> Result<Option<Note>> {
    let mut txn = db.begin_write().await;
    let Some(mut note) = repo::first_as::<Note>(&txn.table(tables::NOTES)?, "uuid", uuid)? else {
        return Ok(None);
    };
    if let Some(title) = &patch.title {
        note.title = title.clone();
    }
    if let Some(body) = &patch.body {
        note.body = body.clone();
    }
    note.updated_at = repo::monotonic_now(note.updated_at);
    txn.put(tables::NOTES, repo::to_row(&note)?)?;
    txn.commit().await?;
    Ok(Some(note))
}

pub async fn delete(db: &Database, uuid: &str) -> Result<bool> {
    let mut txn = db.begin_write().await;
    let deleted = txn.delete_where(tables::NOTES, "uuid", uuid)?;
    txn.commit().await?;
    Ok(deleted > 0)
}
