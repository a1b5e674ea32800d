//! Entity model and error taxonomy for the vellum storage layer.
//!
//! This crate is pure data: serde-shaped entities, their patch types, and
//! the shared [`StoreError`]. The storage engine, repositories, and sync
//! machinery live in the `vellum` crate.

pub mod blocks;
pub mod book;
pub mod error;

// Re-export book-side types
pub use book::{
    symbol_counts, Book, BookPatch, Chapter, ChapterPatch, Note, NotePatch, Scene, ScenePatch,
    SyncState,
};

// Re-export template and instance types
pub use blocks::{
    Block, BlockInstance, BlockInstancePatch, BlockParameter, BlockParameterInstance,
    BlockParameterPatch, BlockPatch, BlockRelation, BlockRelationInstance, BlockRelationPatch,
    Configuration, ConfigurationPatch, ParameterKind, ParameterWithValue,
};

pub use error::{Result, StoreError};
