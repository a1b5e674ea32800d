//! Chapter repository. Chapters group and order the scenes of a book.

use vellum_api::{Chapter, ChapterPatch, Result, StoreError};

use crate::repo::{self, tables};
use crate::storage::Database;
use crate::sync;

pub async fn get_all(db: &Database) -> Result<Vec<Chapter>> {
    let txn = db.begin_read().await;
    repo::rows_into(txn.table(tables::CHAPTERS)?.all())
}

pub async fn get_by_uuid(db: &Database, uuid: &str) -> Result<Option<Chapter>> {
    let txn = db.begin_read().await;
    repo::first_as(&txn.table(tables::CHAPTERS)?, "uuid", uuid)
}

/// Chapters of one book, ordered by position.
pub async fn get_by_book(db: &Database, book_uuid: &str) -> Result<Vec<Chapter>> {
    let txn = db.begin_read().await;
    let mut chapters: Vec<Chapter> =
        repo::rows_as(&txn.table(tables::CHAPTERS)?, "bookUuid", book_uuid)?;
    chapters.sort_by_key(|c| c.position);
    Ok(chapters)
}

pub async fn add(db: &Database, chapter: &Chapter) -> Result<()> {
    let mut txn = db.begin_write().await;
    if !repo::txn_has(&txn, tables::BOOKS, "uuid", &chapter.book_uuid)? {
        return Err(StoreError::ReferentialViolation {
            message: format!(
                "chapter {} references missing book {}",
                chapter.uuid, chapter.book_uuid
            ),
        });
    }
    txn.add(tables::CHAPTERS, repo::to_row(chapter)?)?;
    sync::mark_book_changed(&mut txn, &chapter.book_uuid);
    txn.commit().await?;
    Ok(())
}

pub async fn update(db: &Database, uuid: &str, patch: &ChapterPatch) -> Result<Option<Chapter>> {
    let mut txn = db.begin_write().await;
    let Some(existing) = repo::first_as::<Chapter>(&txn.table(tables::CHAPTERS)?, "uuid", uuid)?
    else {
        return Ok(None);
    };
    txn.update_where(tables::CHAPTERS, "uuid", uuid, &repo::to_row(patch)?)?;
    sync::mark_book_changed(&mut txn, &existing.book_uuid);
    let updated = repo::first_as(&txn.table(tables::CHAPTERS)?, "uuid", uuid)?;
    txn.commit().await?;
    Ok(updated)
}

/// Delete a chapter and its scenes. Returns `false` when the uuid resolves
/// to nothing.
pub async fn delete(db: &Database, uuid: &str) -> Result<bool> {
    let mut txn = db.begin_write().await;
    let Some(existing) = repo::first_as::<Chapter>(&txn.table(tables::CHAPTERS)?, "uuid", uuid)?
    else {
        return Ok(false);
    };
    txn.delete_where(tables::SCENES, "chapterUuid", uuid)?;
    txn.delete_where(tables::CHAPTERS, "uuid", uuid)?;
    sync::mark_book_changed(&mut txn, &existing.book_uuid);
    txn.commit().await?;
    Ok(true)
}
