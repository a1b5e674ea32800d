//! Test support: telemetry, disposable databases, and seeded story worlds.
//!
//! Used by the unit tests and the integration suite. The seeding helper
//! builds a small but complete world (configuration, blocks, book,
//! instances, one relation edge) so tests exercise realistic
//! cross-references instead of orphan rows.

use anyhow::{Context, Result};

use vellum_api::{
    Block, BlockInstance, BlockParameter, BlockRelation, BlockRelationInstance, Book, Chapter,
    Configuration, ParameterKind, Scene,
};

use crate::repo::{self, blocks, books, chapters, configurations, instances, scenes};
use crate::storage::Database;

/// Install a fmt subscriber for test output. Safe to call from every test;
/// only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// An in-memory database carrying the full application schema.
pub fn open_test_db(name: &str) -> Result<Database> {
    let schema = repo::schema().context("declared schema is invalid")?;
    Ok(Database::open_in_memory(name, schema))
}

/// Uuids of everything [`seed_world`] creates.
#[derive(Debug, Clone)]
pub struct SeededWorld {
    pub configuration_uuid: String,
    pub book_uuid: String,
    pub chapter_uuid: String,
    pub scene_uuid: String,
    pub character_block_uuid: String,
    pub location_block_uuid: String,
    pub name_parameter_uuid: String,
    pub mood_parameter_uuid: String,
    pub residence_relation_uuid: String,
    pub hero_uuid: String,
    pub castle_uuid: String,
    pub residence_edge_uuid: String,
}

/// Seed a complete small world: one configuration with Character and
/// Location blocks (Character carries Name and Mood parameters plus a
/// "resides in" relation to Location), one book built on it with a chapter
/// and a scene, a hero instance with a name value, a castle instance, and
/// the edge between them.
pub async fn seed_world(db: &Database) -> Result<SeededWorld> {
    let configuration = Configuration::new("Fantasy standard", "Shared world template");
    configurations::add(db, &configuration)
        .await
        .context("seed configuration")?;

    let character = Block::new(&configuration.uuid, "Character", "A person in the story");
    blocks::add(db, &character).await.context("seed character block")?;
    let location = Block::new(&configuration.uuid, "Location", "A place in the world");
    blocks::add(db, &location).await.context("seed location block")?;

    let name = BlockParameter::new(&character.uuid, "Name", ParameterKind::Text).with_position(0);
    blocks::add_parameter(db, &name).await.context("seed name parameter")?;
    let mood = BlockParameter::new(&character.uuid, "Mood", ParameterKind::Select)
        .with_position(1)
        .with_options(vec!["calm".to_string(), "stormy".to_string()]);
    blocks::add_parameter(db, &mood).await.context("seed mood parameter")?;

    let residence = BlockRelation::new(
        &configuration.uuid,
        "resides in",
        &character.uuid,
        &location.uuid,
    );
    blocks::add_relation(db, &residence).await.context("seed relation")?;

    let book = Book::new("The Hollow Crown", "E. Marlowe", "novel", &configuration.uuid);
    books::add(db, &book).await.context("seed book")?;
    let chapter = Chapter::new(&book.uuid, "Chapter One", 0);
    chapters::add(db, &chapter).await.context("seed chapter")?;
    let scene = Scene::new(
        &book.uuid,
        &chapter.uuid,
        "Opening",
        "A cold morning on the ramparts.",
        0,
    );
    scenes::add(db, &scene).await.context("seed scene")?;

    let hero = BlockInstance::new(&character.uuid, &book.uuid, "Aldric");
    instances::add(db, &hero).await.context("seed hero instance")?;
    let castle = BlockInstance::new(&location.uuid, &book.uuid, "Stormhold");
    instances::add(db, &castle).await.context("seed castle instance")?;

    instances::set_parameter_value(db, &hero.uuid, &name.uuid, "Aldric of Stormhold")
        .await
        .context("seed name value")?;

    let edge = BlockRelationInstance::new(&residence.uuid, &hero.uuid, &castle.uuid);
    instances::add_relation_instance(db, &edge)
        .await
        .context("seed residence edge")?;

    Ok(SeededWorld {
        configuration_uuid: configuration.uuid,
        book_uuid: book.uuid,
        chapter_uuid: chapter.uuid,
        scene_uuid: scene.uuid,
        character_block_uuid: character.uuid,
        location_block_uuid: location.uuid,
        name_parameter_uuid: name.uuid,
        mood_parameter_uuid: mood.uuid,
        residence_relation_uuid: residence.uuid,
        hero_uuid: hero.uuid,
        castle_uuid: castle.uuid,
        residence_edge_uuid: edge.uuid,
    })
}
