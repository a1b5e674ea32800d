//! Scene repository: the prose itself.
//!
//! Scenes carry derived symbol counts; any write that touches `body` (the
//! constructor covers creation, this module covers patches) recomputes them
//! so readers never see a stale count.

use std::collections::BTreeMap;

use vellum_api::{symbol_counts, Chapter, Result, Scene, ScenePatch, StoreError};

use crate::repo::{self, tables};
use crate::storage::Database;
use crate::sync;

pub async fn get_all(db: &Database) -> Result<Vec<Scene>> {
    let txn = db.begin_read().await;
    repo::rows_into(txn.table(tables::SCENES)?.all())
}

pub async fn get_by_uuid(db: &Database, uuid: &str) -> Result<Option<Scene>> {
    let txn = db.begin_read().await;
    repo::first_as(&txn.table(tables::SCENES)?, "uuid", uuid)
}

/// Scenes of one chapter, ordered by position.
pub async fn get_by_chapter(db: &Database, chapter_uuid: &str) -> Result<Vec<Scene>> {
    let txn = db.begin_read().await;
    let mut scenes: Vec<Scene> =
        repo::rows_as(&txn.table(tables::SCENES)?, "chapterUuid", chapter_uuid)?;
    scenes.sort_by_key(|s| s.position);
    Ok(scenes)
}

/// Every scene of one book in reading order: chapters by their position,
/// scenes by position within each chapter.
pub async fn get_by_book(db: &Database, book_uuid: &str) -> Result<Vec<Scene>> {
    let txn = db.begin_read().await;
    let chapter_positions: BTreeMap<String, u32> =
        repo::rows_as::<Chapter>(&txn.table(tables::CHAPTERS)?, "bookUuid", book_uuid)?
            .into_iter()
            .map(|c| (c.uuid, c.position))
            .collect();
    let mut scenes: Vec<Scene> = repo::rows_as(&txn.table(tables::SCENES)?, "bookUuid", book_uuid)?;
    scenes.sort_by_key(|s| {
        (
            chapter_positions.get(&s.chapter_uuid).copied().unwrap_or(u32::MAX),
            s.position,
        )
    });
    Ok(scenes)
}

/// Add a scene. Both the book and the chapter must exist, and the chapter
/// must belong to that book.
pub async fn add(db: &Database, scene: &Scene) -> Result<()> {
    let mut txn = db.begin_write().await;
    if !repo::txn_has(&txn, tables::BOOKS, "uuid", &scene.book_uuid)? {
        return Err(StoreError::ReferentialViolation {
            message: format!(
                "scene {} references missing book {}",
                scene.uuid, scene.book_uuid
            ),
        });
    }
    let Some(chapter) =
        txn.table(tables::CHAPTERS)?.where_eq("uuid", &scene.chapter_uuid)?.first()
    else {
        return Err(StoreError::ReferentialViolation {
            message: format!(
                "scene {} references missing chapter {}",
                scene.uuid, scene.chapter_uuid
            ),
        });
    };
    if chapter.get("bookUuid").and_then(|v| v.as_str()) != Some(scene.book_uuid.as_str()) {
        return Err(StoreError::ReferentialViolation {
            message: format!(
                "scene {} places chapter {} in the wrong book",
                scene.uuid, scene.chapter_uuid
            ),
        });
    }
    txn.add(tables::SCENES, repo::to_row(scene)?)?;
    sync::mark_book_changed(&mut txn, &scene.book_uuid);
    txn.commit().await?;
    Ok(())
}

/// Merge `patch` into the scene, recomputing symbol counts when the body
/// changes. Returns the updated scene, or `None` for an unknown uuid.
pub async fn update(db: &Database, uuid: &str, patch: &ScenePatch) -> Result<Option<Scene>> {
    let mut txn = db.begin_write().await;
    let Some(existing) = repo::first_as::<Scene>(&txn.table(tables::SCENES)?, "uuid", uuid)? else {
        return Ok(None);
    };
    if let Some(new_chapter) = &patch.chapter_uuid {
        let Some(chapter) = txn.table(tables::CHAPTERS)?.where_eq("uuid", new_chapter)?.first()
        else {
            return Err(StoreError::ReferentialViolation {
                message: format!("scene {uuid} moved to missing chapter {new_chapter}"),
            });
        };
        if chapter.get("bookUuid").and_then(|v| v.as_str()) != Some(existing.book_uuid.as_str()) {
            return Err(StoreError::ReferentialViolation {
                message: format!("scene {uuid} moved to chapter {new_chapter} of another book"),
            });
        }
    }
    let mut patch_row = repo::to_row(patch)?;
    if let Some(body) = &patch.body {
        let (with_spaces, wo_spaces) = symbol_counts(body);
        patch_row.insert("symbolsWithSpaces".to_string(), with_spaces.into());
        patch_row.insert("symbolsWoSpaces".to_string(), wo_spaces.into());
    }
    txn.update_where(tables::SCENES, "uuid", uuid, &patch_row)?;
    sync::mark_book_changed(&mut txn, &existing.book_uuid);
    let updated = repo::first_as(&txn.table(tables::SCENES)?, "uuid", uuid)?;
    txn.commit().await?;
    Ok(updated)
}

pub async fn delete(db: &Database, uuid: &str) -> Result<bool> {
    let mut txn = db.begin_write().await;
    let Some(existing) = repo::first_as::<Scene>(&txn.table(tables::SCENES)?, "uuid", uuid)? else {
        return Ok(false);
    };
    txn.delete_where(tables::SCENES, "uuid", uuid)?;
    sync::mark_book_changed(&mut txn, &existing.book_uuid);
    txn.commit().await?;
    Ok(true)
}
