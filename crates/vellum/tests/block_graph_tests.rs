//! Repository-level behavior for the block subsystem: definitions,
//! instances, parameter values, relation edges, cascades and the reverse
//! reference query.

use anyhow::Result;

use vellum::api::{
    Block, BlockInstance, BlockParameter, BlockParameterPatch, BlockPatch, BlockRelation,
    BlockRelationInstance, Book, Configuration, ConfigurationPatch, Note, ParameterKind,
    StoreError, SyncState,
};
use vellum::repo::{blocks, books, configurations, instances, notes};
use vellum::sync;
use vellum::testing::{self, SeededWorld};
use vellum::storage::Database;

async fn world(name: &str) -> Result<(Database, SeededWorld)> {
    let db = testing::open_test_db(name)?;
    let world = testing::seed_world(&db).await?;
    Ok((db, world))
}

#[tokio::test]
async fn test_configuration_crud_and_guarded_delete() -> Result<()> {
    let (db, world) = world("config-crud").await?;

    let patch = ConfigurationPatch {
        description: Some("Revised template".to_string()),
        ..Default::default()
    };
    let updated = configurations::update(&db, &world.configuration_uuid, &patch)
        .await?
        .unwrap();
    assert_eq!(updated.description, "Revised template");
    assert_eq!(updated.title, "Fantasy standard");

    let note = Note::new(&world.configuration_uuid, "Lore", "The old kings.");
    notes::add(&db, &note).await?;

    // A configuration in use by a book cannot be deleted.
    let err = configurations::delete(&db, &world.configuration_uuid).await.unwrap_err();
    assert!(matches!(err, StoreError::ReferentialViolation { .. }));
    assert!(configurations::get_by_uuid(&db, &world.configuration_uuid).await?.is_some());

    books::delete(&db, &world.book_uuid).await?;
    assert!(configurations::delete(&db, &world.configuration_uuid).await?);
    assert_eq!(configurations::get_by_uuid(&db, &world.configuration_uuid).await?, None);
    assert!(blocks::get_by_configuration(&db, &world.configuration_uuid).await?.is_empty());
    assert_eq!(notes::get_by_uuid(&db, &note.uuid).await?, None);
    assert_eq!(configurations::delete(&db, &world.configuration_uuid).await?, false);
    Ok(())
}

#[tokio::test]
async fn test_block_and_parameter_definitions_round_trip() -> Result<()> {
    let (db, world) = world("block-defs").await?;

    let patch = BlockPatch {
        title: Some("Major Character".to_string()),
        ..Default::default()
    };
    let renamed = blocks::update(&db, &world.character_block_uuid, &patch).await?.unwrap();
    assert_eq!(renamed.title, "Major Character");

    let names: Vec<String> = blocks::parameters_of(&db, &world.character_block_uuid)
        .await?
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, ["Name", "Mood"], "parameters come back in position order");

    let rename = BlockParameterPatch {
        name: Some("Full name".to_string()),
        ..Default::default()
    };
    let parameter = blocks::update_parameter(&db, &world.name_parameter_uuid, &rename)
        .await?
        .unwrap();
    assert_eq!(parameter.name, "Full name");
    assert_eq!(parameter.kind, ParameterKind::Text);

    let stray = BlockParameter::new("no-such-block", "Stray", ParameterKind::Number);
    let err = blocks::add_parameter(&db, &stray).await.unwrap_err();
    assert!(matches!(err, StoreError::ReferentialViolation { .. }));
    Ok(())
}

#[tokio::test]
async fn test_relations_of_covers_both_endpoints_without_duplicates() -> Result<()> {
    let (db, world) = world("relations-of").await?;

    // A self-relation must appear once even though both endpoints match.
    let rivalry = BlockRelation::new(
        &world.configuration_uuid,
        "rival of",
        &world.character_block_uuid,
        &world.character_block_uuid,
    );
    blocks::add_relation(&db, &rivalry).await?;

    let of_character = blocks::relations_of(&db, &world.character_block_uuid).await?;
    assert_eq!(of_character.len(), 2);
    assert_eq!(
        of_character.iter().filter(|r| r.uuid == rivalry.uuid).count(),
        1
    );

    let of_location = blocks::relations_of(&db, &world.location_block_uuid).await?;
    assert_eq!(of_location.len(), 1);
    assert_eq!(of_location[0].uuid, world.residence_relation_uuid);
    Ok(())
}

#[tokio::test]
async fn test_relation_endpoints_must_share_the_configuration() -> Result<()> {
    let (db, world) = world("relation-config").await?;

    let other = Configuration::new("Noir standard", "");
    configurations::add(&db, &other).await?;
    let clue = Block::new(&other.uuid, "Clue", "");
    blocks::add(&db, &clue).await?;

    let crossing = BlockRelation::new(
        &world.configuration_uuid,
        "points at",
        &world.character_block_uuid,
        &clue.uuid,
    );
    let err = blocks::add_relation(&db, &crossing).await.unwrap_err();
    assert!(matches!(err, StoreError::ReferentialViolation { .. }));

    let dangling = BlockRelation::new(
        &world.configuration_uuid,
        "haunts",
        &world.character_block_uuid,
        "no-such-block",
    );
    let err = blocks::add_relation(&db, &dangling).await.unwrap_err();
    assert!(matches!(err, StoreError::ReferentialViolation { .. }));
    Ok(())
}

#[tokio::test]
async fn test_parameter_value_red_to_blue_then_cascade() -> Result<()> {
    let (db, world) = world("red-blue").await?;

    let cloak = BlockParameter::new(&world.character_block_uuid, "Cloak color", ParameterKind::Text)
        .with_position(2);
    blocks::add_parameter(&db, &cloak).await?;

    let red = instances::set_parameter_value(&db, &world.hero_uuid, &cloak.uuid, "red").await?;
    assert_eq!(red.value, "red");

    let blue = instances::update_parameter_value(&db, &red.uuid, "blue").await?.unwrap();
    assert_eq!(blue.uuid, red.uuid);
    assert_eq!(blue.value, "blue");
    let stored = instances::parameter_values_of(&db, &world.hero_uuid)
        .await?
        .into_iter()
        .find(|v| v.uuid == red.uuid)
        .unwrap();
    assert_eq!(stored.value, "blue");

    assert!(instances::delete(&db, &world.hero_uuid).await?);
    assert!(instances::parameter_values_of(&db, &world.hero_uuid).await?.is_empty());
    assert_eq!(instances::get_by_uuid(&db, &world.hero_uuid).await?, None);

    // The cascaded-away value behaves like any other absent row.
    assert_eq!(instances::update_parameter_value(&db, &red.uuid, "green").await?, None);
    Ok(())
}

#[tokio::test]
async fn test_set_parameter_value_upserts_the_instance_parameter_pair() -> Result<()> {
    let (db, world) = world("value-upsert").await?;

    let before = instances::parameter_values_of(&db, &world.hero_uuid).await?;
    assert_eq!(before.len(), 1);
    let original_uuid = before[0].uuid.clone();

    let replaced = instances::set_parameter_value(
        &db,
        &world.hero_uuid,
        &world.name_parameter_uuid,
        "Aldric the Bold",
    )
    .await?;
    assert_eq!(replaced.uuid, original_uuid, "the pair keeps one row");
    assert_eq!(replaced.value, "Aldric the Bold");
    assert_eq!(instances::parameter_values_of(&db, &world.hero_uuid).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_parameter_value_requires_matching_block() -> Result<()> {
    let (db, world) = world("value-mismatch").await?;

    // Name is declared on Character; the castle is a Location instance.
    let err = instances::set_parameter_value(
        &db,
        &world.castle_uuid,
        &world.name_parameter_uuid,
        "Stormhold",
    )
    .await
    .unwrap_err();
    assert!(matches!(err, StoreError::ReferentialViolation { .. }));

    let err = instances::set_parameter_value(&db, "no-such-instance", &world.name_parameter_uuid, "x")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::ReferentialViolation { .. }));
    Ok(())
}

#[tokio::test]
async fn test_referencing_parameters_reads_the_related_cast() -> Result<()> {
    let (db, world) = world("referencing").await?;

    let referencing = instances::referencing_parameters(&db, &world.location_block_uuid).await?;
    assert_eq!(referencing.len(), 1);
    assert_eq!(referencing[0].parameter.uuid, world.name_parameter_uuid);
    assert_eq!(referencing[0].value.value, "Aldric of Stormhold");

    // A second value on the related instance shows up position-ordered.
    instances::set_parameter_value(&db, &world.hero_uuid, &world.mood_parameter_uuid, "stormy")
        .await?;
    let referencing = instances::referencing_parameters(&db, &world.location_block_uuid).await?;
    assert_eq!(referencing.len(), 2);
    assert_eq!(referencing[0].parameter.name, "Name");
    assert_eq!(referencing[1].parameter.name, "Mood");

    // Nothing references the character block itself: the hero's own values
    // belong to it, not to instances related to it.
    // The castle carries no values, so the character side stays empty.
    assert!(instances::referencing_parameters(&db, &world.character_block_uuid)
        .await?
        .is_empty());
    Ok(())
}

#[tokio::test]
async fn test_instance_delete_clears_values_edges_and_reverse_references() -> Result<()> {
    let (db, world) = world("instance-cascade").await?;

    assert!(instances::delete(&db, &world.hero_uuid).await?);
    assert_eq!(instances::get_by_uuid(&db, &world.hero_uuid).await?, None);
    assert!(instances::parameter_values_of(&db, &world.hero_uuid).await?.is_empty());
    assert!(instances::relations_of_instance(&db, &world.castle_uuid).await?.is_empty());
    assert!(instances::referencing_parameters(&db, &world.location_block_uuid)
        .await?
        .is_empty());

    // The castle itself survives.
    assert!(instances::get_by_uuid(&db, &world.castle_uuid).await?.is_some());
    assert_eq!(instances::delete(&db, &world.hero_uuid).await?, false);
    Ok(())
}

#[tokio::test]
async fn test_block_delete_cascades_definitions_values_and_instances() -> Result<()> {
    let (db, world) = world("block-cascade").await?;

    sync::update_book_sync_state(&db, &world.book_uuid, SyncState::Synced).await;
    assert!(blocks::delete(&db, &world.character_block_uuid).await?);

    assert_eq!(blocks::get_by_uuid(&db, &world.character_block_uuid).await?, None);
    assert!(blocks::parameters_of(&db, &world.character_block_uuid).await?.is_empty());
    assert_eq!(blocks::get_relation(&db, &world.residence_relation_uuid).await?, None);
    assert_eq!(instances::get_by_uuid(&db, &world.hero_uuid).await?, None);
    assert!(instances::parameter_values_of(&db, &world.hero_uuid).await?.is_empty());
    assert!(instances::relations_of_instance(&db, &world.castle_uuid).await?.is_empty());

    // The location block and its instance are untouched; the book whose
    // content shrank is marked for upload.
    assert!(blocks::get_by_uuid(&db, &world.location_block_uuid).await?.is_some());
    assert_eq!(blocks::get_all(&db).await?.len(), 1);
    assert!(instances::get_by_uuid(&db, &world.castle_uuid).await?.is_some());
    let book = books::get_by_uuid(&db, &world.book_uuid).await?.unwrap();
    assert_eq!(book.sync_state, SyncState::PendingUpload);
    Ok(())
}

#[tokio::test]
async fn test_relation_instance_endpoint_types_are_checked() -> Result<()> {
    let (db, world) = world("edge-types").await?;

    // The residence relation declares Character -> Location.
    let backwards = BlockRelationInstance::new(
        &world.residence_relation_uuid,
        &world.castle_uuid,
        &world.hero_uuid,
    );
    let err = instances::add_relation_instance(&db, &backwards).await.unwrap_err();
    assert!(matches!(err, StoreError::ReferentialViolation { .. }));

    let dangling = BlockRelationInstance::new("no-such-relation", &world.hero_uuid, &world.castle_uuid);
    let err = instances::add_relation_instance(&db, &dangling).await.unwrap_err();
    assert!(matches!(err, StoreError::ReferentialViolation { .. }));

    // Only the seeded edge exists.
    assert_eq!(instances::relations_of_instance(&db, &world.hero_uuid).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_delete_parameter_removes_its_values() -> Result<()> {
    let (db, world) = world("parameter-cascade").await?;

    sync::update_book_sync_state(&db, &world.book_uuid, SyncState::Synced).await;
    assert!(blocks::delete_parameter(&db, &world.name_parameter_uuid).await?);
    assert_eq!(blocks::get_parameter(&db, &world.name_parameter_uuid).await?, None);
    assert!(instances::parameter_values_of(&db, &world.hero_uuid).await?.is_empty());
    assert!(instances::get_by_uuid(&db, &world.hero_uuid).await?.is_some());

    let book = books::get_by_uuid(&db, &world.book_uuid).await?.unwrap();
    assert_eq!(book.sync_state, SyncState::PendingUpload);
    Ok(())
}

#[tokio::test]
async fn test_edge_between_books_marks_both_owners() -> Result<()> {
    let (db, world) = world("edge-two-books").await?;

    let second_book = Book::new("Companion Atlas", "E. Marlowe", "atlas", &world.configuration_uuid);
    books::add(&db, &second_book).await?;
    let outpost = BlockInstance::new(&world.location_block_uuid, &second_book.uuid, "Outpost");
    instances::add(&db, &outpost).await?;

    sync::update_book_sync_state(&db, &world.book_uuid, SyncState::Synced).await;
    sync::update_book_sync_state(&db, &second_book.uuid, SyncState::Synced).await;

    let edge = BlockRelationInstance::new(&world.residence_relation_uuid, &world.hero_uuid, &outpost.uuid);
    instances::add_relation_instance(&db, &edge).await?;
    for uuid in [&world.book_uuid, &second_book.uuid] {
        let book = books::get_by_uuid(&db, uuid).await?.unwrap();
        assert_eq!(book.sync_state, SyncState::PendingUpload, "edge write marks both books");
    }

    sync::update_book_sync_state(&db, &world.book_uuid, SyncState::Synced).await;
    sync::update_book_sync_state(&db, &second_book.uuid, SyncState::Synced).await;
    assert!(instances::delete_relation_instance(&db, &edge.uuid).await?);
    for uuid in [&world.book_uuid, &second_book.uuid] {
        let book = books::get_by_uuid(&db, uuid).await?.unwrap();
        assert_eq!(book.sync_state, SyncState::PendingUpload, "edge delete marks both books");
    }
    Ok(())
}

#[tokio::test]
async fn test_block_delete_cascade_marks_neighbour_book_losing_its_edge() -> Result<()> {
    let (db, world) = world("block-cascade-two-books").await?;

    let second_book = Book::new("Companion Atlas", "E. Marlowe", "atlas", &world.configuration_uuid);
    books::add(&db, &second_book).await?;
    let outpost = BlockInstance::new(&world.location_block_uuid, &second_book.uuid, "Outpost");
    instances::add(&db, &outpost).await?;
    let edge =
        BlockRelationInstance::new(&world.residence_relation_uuid, &world.hero_uuid, &outpost.uuid);
    instances::add_relation_instance(&db, &edge).await?;

    sync::update_book_sync_state(&db, &world.book_uuid, SyncState::Synced).await;
    sync::update_book_sync_state(&db, &second_book.uuid, SyncState::Synced).await;

    // Deleting Character takes the residence relation and the hero ->
    // outpost edge with it; the atlas book loses only that edge.
    assert!(blocks::delete(&db, &world.character_block_uuid).await?);
    assert!(instances::relations_of_instance(&db, &outpost.uuid).await?.is_empty());
    assert!(instances::get_by_uuid(&db, &outpost.uuid).await?.is_some());
    assert_eq!(instances::get_by_uuid(&db, &world.hero_uuid).await?, None);

    for uuid in [&world.book_uuid, &second_book.uuid] {
        let book = books::get_by_uuid(&db, uuid).await?.unwrap();
        assert_eq!(book.sync_state, SyncState::PendingUpload, "both books lost content");
    }
    Ok(())
}
