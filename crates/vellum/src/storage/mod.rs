pub mod engine;
pub mod schema;

pub use engine::{
    compound_key, CommitNotice, Database, ReadTxn, RowData, Selection, TableRead, WriteTxn,
};
pub use schema::{IndexSpec, Schema, SchemaVersion, TableSpec};
