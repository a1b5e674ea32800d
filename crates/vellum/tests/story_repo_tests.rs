//! Repository-level behavior for the story entities: books, chapters,
//! scenes and notes, including cascades, sync marking and persistence.

use anyhow::Result;

use vellum::api::{
    Book, BookPatch, Chapter, ChapterPatch, Configuration, Note, NotePatch, Scene, ScenePatch,
    StoreError, SyncState,
};
use vellum::repo::{self, books, chapters, configurations, instances, notes, scenes};
use vellum::storage::Database;
use vellum::sync;
use vellum::testing::{self, SeededWorld};

async fn world(name: &str) -> Result<(Database, SeededWorld)> {
    let db = testing::open_test_db(name)?;
    let world = testing::seed_world(&db).await?;
    Ok((db, world))
}

#[tokio::test]
async fn test_book_add_then_get_round_trips() -> Result<()> {
    let (db, world) = world("book-round-trip").await?;

    let book = Book::new("Ashes of Iron", "M. Verlaine", "novella", &world.configuration_uuid);
    books::add(&db, &book).await?;

    let found = books::get_by_uuid(&db, &book.uuid).await?;
    assert_eq!(found, Some(book.clone()));
    assert_eq!(found.as_ref().map(|b| b.sync_state), Some(SyncState::PendingUpload));

    let by_configuration = books::get_by_configuration(&db, &world.configuration_uuid).await?;
    assert_eq!(by_configuration.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_book_add_requires_existing_configuration() -> Result<()> {
    let db = testing::open_test_db("book-missing-config")?;

    let book = Book::new("Orphan", "Nobody", "novel", "no-such-configuration");
    let err = books::add(&db, &book).await.unwrap_err();
    assert!(matches!(err, StoreError::ReferentialViolation { .. }));
    assert!(books::get_all(&db).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_duplicate_uuid_add_is_rejected_and_row_count_stays_one() -> Result<()> {
    let (db, world) = world("book-duplicate").await?;

    let book = books::get_by_uuid(&db, &world.book_uuid).await?.unwrap();
    let err = books::add(&db, &book).await.unwrap_err();
    assert!(matches!(err, StoreError::UniquenessViolation { ref table, .. } if table == "books"));
    assert_eq!(books::get_all(&db).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_book_update_merges_patch_and_leaves_other_fields() -> Result<()> {
    let (db, world) = world("book-update").await?;

    let before = books::get_by_uuid(&db, &world.book_uuid).await?.unwrap();
    let patch = BookPatch {
        title: Some("The Hollow Crown, Revised".to_string()),
        ..Default::default()
    };
    let updated = books::update(&db, &world.book_uuid, &patch).await?.unwrap();
    assert_eq!(updated.title, "The Hollow Crown, Revised");
    assert_eq!(updated.author, before.author);
    assert_eq!(updated.kind, before.kind);
    assert!(updated.local_updated_at > before.local_updated_at);
    Ok(())
}

#[tokio::test]
async fn test_update_of_missing_book_reports_absence() -> Result<()> {
    let (db, _) = world("book-update-missing").await?;

    let patch = BookPatch {
        title: Some("Ghost".to_string()),
        ..Default::default()
    };
    assert_eq!(books::update(&db, "no-such-book", &patch).await?, None);
    assert_eq!(books::delete(&db, "no-such-book").await?, false);
    Ok(())
}

#[tokio::test]
async fn test_content_writes_mark_book_pending_with_monotonic_stamp() -> Result<()> {
    let (db, world) = world("book-marking").await?;

    sync::update_book_sync_state(&db, &world.book_uuid, SyncState::Synced).await;
    let synced = books::get_by_uuid(&db, &world.book_uuid).await?.unwrap();
    assert_eq!(synced.sync_state, SyncState::Synced);

    let chapter = Chapter::new(&world.book_uuid, "Chapter Two", 1);
    chapters::add(&db, &chapter).await?;
    let after_chapter = books::get_by_uuid(&db, &world.book_uuid).await?.unwrap();
    assert_eq!(after_chapter.sync_state, SyncState::PendingUpload);
    assert!(after_chapter.local_updated_at > synced.local_updated_at);

    sync::update_book_sync_state(&db, &world.book_uuid, SyncState::Synced).await;
    let resynced = books::get_by_uuid(&db, &world.book_uuid).await?.unwrap();
    let patch = ScenePatch {
        body: Some("The ramparts were empty now.".to_string()),
        ..Default::default()
    };
    scenes::update(&db, &world.scene_uuid, &patch).await?;
    let after_scene = books::get_by_uuid(&db, &world.book_uuid).await?.unwrap();
    assert_eq!(after_scene.sync_state, SyncState::PendingUpload);
    assert!(after_scene.local_updated_at > resynced.local_updated_at);
    Ok(())
}

#[tokio::test]
async fn test_sync_boundary_is_forgiving_and_keeps_local_stamp() -> Result<()> {
    let (db, world) = world("sync-boundary").await?;

    // Neither of these may fail or change anything.
    sync::update_book_sync_state(&db, "", SyncState::Synced).await;
    sync::update_book_sync_state(&db, "no-such-book", SyncState::Synced).await;

    let before = books::get_by_uuid(&db, &world.book_uuid).await?.unwrap();
    sync::update_book_sync_state(&db, &world.book_uuid, SyncState::Conflict).await;
    let after = books::get_by_uuid(&db, &world.book_uuid).await?.unwrap();
    assert_eq!(after.sync_state, SyncState::Conflict);
    assert_eq!(after.local_updated_at, before.local_updated_at);
    Ok(())
}

#[tokio::test]
async fn test_chapters_and_scenes_come_back_in_position_order() -> Result<()> {
    let (db, world) = world("ordering").await?;

    let late = Chapter::new(&world.book_uuid, "Chapter Three", 2);
    let middle = Chapter::new(&world.book_uuid, "Chapter Two", 1);
    chapters::add(&db, &late).await?;
    chapters::add(&db, &middle).await?;
    let titles: Vec<String> = chapters::get_by_book(&db, &world.book_uuid)
        .await?
        .into_iter()
        .map(|c| c.title)
        .collect();
    assert_eq!(titles, ["Chapter One", "Chapter Two", "Chapter Three"]);
    assert_eq!(chapters::get_all(&db).await?.len(), 3);

    let second = Scene::new(&world.book_uuid, &world.chapter_uuid, "Second", "", 2);
    let first = Scene::new(&world.book_uuid, &world.chapter_uuid, "First", "", 1);
    scenes::add(&db, &second).await?;
    scenes::add(&db, &first).await?;
    let scene_titles: Vec<String> = scenes::get_by_chapter(&db, &world.chapter_uuid)
        .await?
        .into_iter()
        .map(|s| s.title)
        .collect();
    assert_eq!(scene_titles, ["Opening", "First", "Second"]);
    Ok(())
}

#[tokio::test]
async fn test_book_scenes_come_back_in_reading_order() -> Result<()> {
    let db = testing::open_test_db("book-reading-order")?;
    let configuration = Configuration::new("Fantasy standard", "");
    configurations::add(&db, &configuration).await?;
    let book = Book::new("The Hollow Crown", "E. Marlowe", "novel", &configuration.uuid);
    books::add(&db, &book).await?;

    // Chapter uuids sort against their positions, so identity-ordered
    // grouping would reverse the chapters.
    let mut opening = Chapter::new(&book.uuid, "Opening", 0);
    opening.uuid = "zz-opening".to_string();
    let mut finale = Chapter::new(&book.uuid, "Finale", 1);
    finale.uuid = "aa-finale".to_string();
    chapters::add(&db, &opening).await?;
    chapters::add(&db, &finale).await?;

    scenes::add(&db, &Scene::new(&book.uuid, &finale.uuid, "Last stand", "", 0)).await?;
    scenes::add(&db, &Scene::new(&book.uuid, &opening.uuid, "Arrival", "", 1)).await?;
    scenes::add(&db, &Scene::new(&book.uuid, &opening.uuid, "Gates", "", 0)).await?;

    let titles: Vec<String> = scenes::get_by_book(&db, &book.uuid)
        .await?
        .into_iter()
        .map(|s| s.title)
        .collect();
    assert_eq!(titles, ["Gates", "Arrival", "Last stand"]);
    Ok(())
}

#[tokio::test]
async fn test_scene_body_update_recomputes_symbol_counts() -> Result<()> {
    let (db, world) = world("symbol-counts").await?;

    let patch = ScenePatch {
        body: Some("Hello world".to_string()),
        ..Default::default()
    };
    let updated = scenes::update(&db, &world.scene_uuid, &patch).await?.unwrap();
    assert_eq!(updated.body, "Hello world");
    assert_eq!(updated.symbols_with_spaces, 11);
    assert_eq!(updated.symbols_wo_spaces, 10);

    // A patch without a body leaves the counts alone.
    let rename = ScenePatch {
        title: Some("Renamed".to_string()),
        ..Default::default()
    };
    let renamed = scenes::update(&db, &world.scene_uuid, &rename).await?.unwrap();
    assert_eq!(renamed.symbols_with_spaces, 11);
    assert_eq!(renamed.symbols_wo_spaces, 10);
    Ok(())
}

#[tokio::test]
async fn test_scene_move_validates_the_target_chapter() -> Result<()> {
    let (db, world) = world("scene-move").await?;

    let second_chapter = Chapter::new(&world.book_uuid, "Chapter Two", 1);
    chapters::add(&db, &second_chapter).await?;
    let move_patch = ScenePatch {
        chapter_uuid: Some(second_chapter.uuid.clone()),
        ..Default::default()
    };
    let moved = scenes::update(&db, &world.scene_uuid, &move_patch).await?.unwrap();
    assert_eq!(moved.chapter_uuid, second_chapter.uuid);
    assert_eq!(scenes::get_by_chapter(&db, &world.chapter_uuid).await?.len(), 0);
    assert_eq!(scenes::get_by_chapter(&db, &second_chapter.uuid).await?.len(), 1);

    // A chapter of another book is not a valid destination.
    let other_book = Book::new("Other", "E. Marlowe", "novel", &world.configuration_uuid);
    books::add(&db, &other_book).await?;
    let foreign_chapter = Chapter::new(&other_book.uuid, "Foreign", 0);
    chapters::add(&db, &foreign_chapter).await?;
    let bad_move = ScenePatch {
        chapter_uuid: Some(foreign_chapter.uuid.clone()),
        ..Default::default()
    };
    let err = scenes::update(&db, &world.scene_uuid, &bad_move).await.unwrap_err();
    assert!(matches!(err, StoreError::ReferentialViolation { .. }));
    Ok(())
}

#[tokio::test]
async fn test_chapter_delete_cascades_its_scenes() -> Result<()> {
    let (db, world) = world("chapter-cascade").await?;

    assert!(chapters::delete(&db, &world.chapter_uuid).await?);
    assert_eq!(chapters::get_by_uuid(&db, &world.chapter_uuid).await?, None);
    assert_eq!(scenes::get_by_uuid(&db, &world.scene_uuid).await?, None);
    assert!(scenes::get_by_book(&db, &world.book_uuid).await?.is_empty());
    assert!(scenes::get_all(&db).await?.is_empty());

    let book = books::get_by_uuid(&db, &world.book_uuid).await?.unwrap();
    assert_eq!(book.sync_state, SyncState::PendingUpload);
    Ok(())
}

#[tokio::test]
async fn test_book_delete_cascades_every_owned_row() -> Result<()> {
    let (db, world) = world("book-cascade").await?;

    assert!(books::delete(&db, &world.book_uuid).await?);
    assert_eq!(books::get_by_uuid(&db, &world.book_uuid).await?, None);
    assert!(chapters::get_by_book(&db, &world.book_uuid).await?.is_empty());
    assert!(scenes::get_by_book(&db, &world.book_uuid).await?.is_empty());
    assert!(instances::get_by_book(&db, &world.book_uuid).await?.is_empty());
    assert!(instances::get_all(&db).await?.is_empty());
    assert!(instances::parameter_values_of(&db, &world.hero_uuid).await?.is_empty());
    assert!(instances::relations_of_instance(&db, &world.castle_uuid).await?.is_empty());

    // The configuration side is untouched, and the delete is idempotent.
    assert!(configurations::get_by_uuid(&db, &world.configuration_uuid).await?.is_some());
    assert_eq!(books::delete(&db, &world.book_uuid).await?, false);
    Ok(())
}

#[tokio::test]
async fn test_note_crud_with_recency_ordering() -> Result<()> {
    let (db, world) = world("notes").await?;

    let first = Note::new(&world.configuration_uuid, "Geography", "Mountains in the north.");
    let second = Note::new(&world.configuration_uuid, "Customs", "Winter feast of lanterns.");
    let third = Note::new(&world.configuration_uuid, "Lineage", "Three royal houses.");
    for note in [&first, &second, &third] {
        notes::add(&db, note).await?;
    }
    assert_eq!(notes::get_all(&db).await?.len(), 3);

    let patch = NotePatch {
        body: Some("Mountains in the north, marshes south.".to_string()),
        ..Default::default()
    };
    let updated = notes::update(&db, &first.uuid, &patch).await?.unwrap();
    assert!(updated.updated_at > first.updated_at);

    let listed = notes::get_by_configuration(&db, &world.configuration_uuid).await?;
    assert_eq!(listed.len(), 3);
    assert_eq!(listed[0].uuid, first.uuid, "most recently updated note comes first");

    assert!(notes::delete(&db, &second.uuid).await?);
    assert_eq!(notes::get_by_uuid(&db, &second.uuid).await?, None);
    assert_eq!(notes::delete(&db, &second.uuid).await?, false);
    Ok(())
}

#[tokio::test]
async fn test_note_add_requires_existing_configuration() -> Result<()> {
    let db = testing::open_test_db("note-missing-config")?;

    let note = Note::new("no-such-configuration", "Stray", "");
    let err = notes::add(&db, &note).await.unwrap_err();
    assert!(matches!(err, StoreError::ReferentialViolation { .. }));
    Ok(())
}

#[tokio::test]
async fn test_database_persists_content_across_reopen() -> Result<()> {
    let dir = tempfile::tempdir()?;

    let db = Database::open(dir.path(), "library", repo::schema()?).await?;
    let configuration = Configuration::new("Fantasy standard", "");
    configurations::add(&db, &configuration).await?;
    let book = Book::new("The Hollow Crown", "E. Marlowe", "novel", &configuration.uuid);
    books::add(&db, &book).await?;
    let seq = db.commit_seq().await;
    assert!(seq > 0);
    drop(db);

    let reopened = Database::open(dir.path(), "library", repo::schema()?).await?;
    assert_eq!(reopened.commit_seq().await, seq);
    let found = books::get_by_uuid(&reopened, &book.uuid).await?;
    assert_eq!(found, Some(book));
    Ok(())
}
