//! Per-book sync-state bookkeeping.
//!
//! Two write paths exist. [`mark_book_changed`] is the internal hook the
//! repositories call inside a content-write transaction: atomically with the
//! content, the owning book moves to `PendingUpload` and its
//! `localUpdatedAt` advances (never backwards, even when the wall clock
//! does). [`update_book_sync_state`] is the boundary the external sync
//! collaborator calls after talking to the remote. Both paths are
//! forgiving about missing books, and the boundary never propagates
//! failures: sync bookkeeping must not block an edit.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use vellum_api::SyncState;

use crate::repo::{self, tables};
use crate::storage::{Database, RowData, WriteTxn};

/// Mark a book as locally changed, inside the caller's transaction.
///
/// An empty or unresolvable uuid is a logged no-op: cascades legitimately
/// run over rows whose book is itself being deleted.
pub(crate) fn mark_book_changed(txn: &mut WriteTxn, book_uuid: &str) {
    if book_uuid.is_empty() {
        debug!("sync: empty book uuid, skipping mark");
        return;
    }
    let row = match txn
        .table(tables::BOOKS)
        .and_then(|t| t.where_eq("uuid", book_uuid).map(|s| s.first()))
    {
        Ok(Some(row)) => row,
        Ok(None) => {
            debug!(book = book_uuid, "sync: unknown book, skipping mark");
            return;
        }
        Err(err) => {
            warn!(book = book_uuid, error = %err, "sync: mark failed");
            return;
        }
    };
    let prev = row
        .get("localUpdatedAt")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let stamp = repo::monotonic_now(prev);
    let stamp_value = match serde_json::to_value(stamp) {
        Ok(v) => v,
        Err(err) => {
            warn!(book = book_uuid, error = %err, "sync: mark failed");
            return;
        }
    };
    let mut patch = RowData::new();
    patch.insert(
        "syncState".to_string(),
        serde_json::Value::String(SyncState::PendingUpload.as_str().to_string()),
    );
    patch.insert("localUpdatedAt".to_string(), stamp_value);
    if let Err(err) = txn.update_where(tables::BOOKS, "uuid", book_uuid, &patch) {
        warn!(book = book_uuid, error = %err, "sync: mark failed");
    }
}

/// Record the outcome of a sync exchange for one book. This is the only
/// write path for `Synced`, `PendingDownload`, and `Conflict`.
///
/// An empty or unknown book uuid is a no-op, and internal failures are
/// logged instead of propagated. `localUpdatedAt` is untouched: it tracks
/// local edits, not remote knowledge.
pub async fn update_book_sync_state(db: &Database, book_uuid: &str, state: SyncState) {
    if book_uuid.is_empty() {
        debug!("sync: empty book uuid, skipping state update");
        return;
    }
    let mut txn = db.begin_write().await;
    let mut patch = RowData::new();
    patch.insert(
        "syncState".to_string(),
        serde_json::Value::String(state.as_str().to_string()),
    );
    match txn.update_where(tables::BOOKS, "uuid", book_uuid, &patch) {
        Ok(0) => {
            debug!(book = book_uuid, "sync: unknown book, state not updated");
            return;
        }
        Ok(_) => {}
        Err(err) => {
            warn!(book = book_uuid, error = %err, "sync: state update failed");
            return;
        }
    }
    match txn.commit().await {
        Ok(_) => debug!(book = book_uuid, state = %state, "sync: book state updated"),
        Err(err) => {
            warn!(book = book_uuid, state = %state, error = %err, "sync: state update failed");
        }
    }
}
