pub mod backup;
pub mod live;
pub mod repo;
pub mod state;
pub mod storage;
pub mod sync;
pub mod testing;

// Re-export the entity model so consumers depend on one crate.
pub use vellum_api as api;
