//! Book repository: the shelf of writing projects.

use tracing::debug;

use vellum_api::{Book, BookPatch, Result, StoreError};

use crate::repo::{self, instances, tables};
use crate::storage::Database;
use crate::sync;

/// Every book on the shelf, in creation order.
pub async fn get_all(db: &Database) -> Result<Vec<Book>> {
    let txn = db.begin_read().await;
    repo::rows_into(txn.table(tables::BOOKS)?.all())
}

pub async fn get_by_uuid(db: &Database, uuid: &str) -> Result<Option<Book>> {
    let txn = db.begin_read().await;
    repo::first_as(&txn.table(tables::BOOKS)?, "uuid", uuid)
}

/// Books built on one configuration.
pub async fn get_by_configuration(db: &Database, configuration_uuid: &str) -> Result<Vec<Book>> {
    let txn = db.begin_read().await;
    repo::rows_as(&txn.table(tables::BOOKS)?, "configurationUuid", configuration_uuid)
}

/// Add a new book. The referenced configuration must exist and the uuid
/// must be fresh. The book itself starts `PendingUpload`, so no extra sync
/// marking is needed.
pub async fn add(db: &Database, book: &Book) -> Result<()> {
    let mut txn = db.begin_write().await;
    if !repo::txn_has(&txn, tables::CONFIGURATIONS, "uuid", &book.configuration_uuid)? {
        return Err(StoreError::ReferentialViolation {
            message: format!(
                "book {} references missing configuration {}",
                book.uuid, book.configuration_uuid
            ),
        });
    }
    txn.add(tables::BOOKS, repo::to_row(book)?)?;
    txn.commit().await?;
    Ok(())
}

/// Merge `patch` into the book. Returns the updated book, or `None` when
/// the uuid resolves to nothing. The edit marks the book for upload in the
/// same transaction.
pub async fn update(db: &Database, uuid: &str, patch: &BookPatch) -> Result<Option<Book>> {
    let mut txn = db.begin_write().await;
    if let Some(new_config) = &patch.configuration_uuid {
        if !repo::txn_has(&txn, tables::CONFIGURATIONS, "uuid", new_config)? {
            return Err(StoreError::ReferentialViolation {
                message: format!("book {uuid} patched to missing configuration {new_config}"),
            });
        }
    }
    let modified = txn.update_where(tables::BOOKS, "uuid", uuid, &repo::to_row(patch)?)?;
    if modified == 0 {
        return Ok(None);
    }
    sync::mark_book_changed(&mut txn, uuid);
    let updated = repo::first_as(&txn.table(tables::BOOKS)?, "uuid", uuid)?;
    txn.commit().await?;
    Ok(updated)
}

/// Delete a book and cascade to its chapters, scenes, and block instances
/// (with their parameter values and relation edges), all in one
/// transaction. Returns `false` when the book does not exist.
pub async fn delete(db: &Database, uuid: &str) -> Result<bool> {
    let mut txn = db.begin_write().await;
    if !repo::txn_has(&txn, tables::BOOKS, "uuid", uuid)? {
        return Ok(false);
    }
    instances::delete_by_book(&mut txn, uuid)?;
    txn.delete_where(tables::SCENES, "bookUuid", uuid)?;
    txn.delete_where(tables::CHAPTERS, "bookUuid", uuid)?;
    txn.delete_where(tables::BOOKS, "uuid", uuid)?;
    debug!(book = uuid, "deleted book with cascade");
    txn.commit().await?;
    Ok(true)
}
