use std::collections::BTreeMap;

use vellum_api::{Result, StoreError};

/// One secondary index over a table: one or more row fields, optionally
/// unique. Compound indexes are named by joining their fields with `+`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub fields: Vec<String>,
    pub unique: bool,
}

impl IndexSpec {
    fn single(field: &str, unique: bool) -> Self {
        Self {
            name: field.to_string(),
            fields: vec![field.to_string()],
            unique,
        }
    }

    fn compound(fields: &[&str], unique: bool) -> Self {
        Self {
            name: fields.join("+"),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            unique,
        }
    }
}

/// Declared shape of one table: its name plus secondary indexes.
///
/// Rows are keyed by an auto-incremented primary key owned by the engine;
/// the declaration only covers the lookups the table must answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub indexes: Vec<IndexSpec>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexes: Vec::new(),
        }
    }

    /// Builder: add a non-unique single-field index
    pub fn index(mut self, field: &str) -> Self {
        self.indexes.push(IndexSpec::single(field, false));
        self
    }

    /// Builder: add a unique single-field index
    pub fn unique(mut self, field: &str) -> Self {
        self.indexes.push(IndexSpec::single(field, true));
        self
    }

    /// Builder: add a unique compound index over several fields
    pub fn compound_unique(mut self, fields: &[&str]) -> Self {
        self.indexes.push(IndexSpec::compound(fields, true));
        self
    }
}

/// The tables (or additional indexes on already declared tables) introduced
/// at one schema version.
#[derive(Debug, Clone)]
pub struct SchemaVersion {
    pub number: u32,
    pub tables: Vec<TableSpec>,
}

impl SchemaVersion {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            tables: Vec::new(),
        }
    }

    pub fn table(mut self, spec: TableSpec) -> Self {
        self.tables.push(spec);
        self
    }
}

/// The full, additive schema history of a database.
///
/// Versions only ever add tables and indexes; nothing is renamed or removed.
/// `Schema::new` validates that version numbers ascend strictly, that index
/// fields are non-empty, and that no version redefines an existing index
/// with a different shape.
#[derive(Debug, Clone)]
pub struct Schema {
    versions: Vec<SchemaVersion>,
    merged: BTreeMap<String, TableSpec>,
}

impl Schema {
    pub fn new(versions: Vec<SchemaVersion>) -> Result<Self> {
        if versions.is_empty() {
            return Err(StoreError::Schema {
                message: "schema needs at least one version".to_string(),
            });
        }
        let mut last = 0u32;
        let mut merged: BTreeMap<String, TableSpec> = BTreeMap::new();
        for version in &versions {
            if version.number <= last {
                return Err(StoreError::Schema {
                    message: format!(
                        "schema versions must ascend strictly, got {} after {}",
                        version.number, last
                    ),
                });
            }
            last = version.number;
            for table in &version.tables {
                merge_table(&mut merged, table)?;
            }
        }
        Ok(Self { versions, merged })
    }

    /// Highest declared version number.
    pub fn latest_version(&self) -> u32 {
        self.versions.last().map(|v| v.number).unwrap_or(0)
    }

    /// Every declared table with its cumulative index set.
    pub fn tables(&self) -> &BTreeMap<String, TableSpec> {
        &self.merged
    }
}

fn merge_table(merged: &mut BTreeMap<String, TableSpec>, table: &TableSpec) -> Result<()> {
    let entry = merged
        .entry(table.name.clone())
        .or_insert_with(|| TableSpec::new(table.name.clone()));
    for index in &table.indexes {
        if index.fields.is_empty() {
            return Err(StoreError::Schema {
                message: format!("index {} on table {} has no fields", index.name, table.name),
            });
        }
        match entry.indexes.iter().find(|i| i.name == index.name) {
            Some(existing) if existing == index => {}
            Some(_) => {
                return Err(StoreError::Schema {
                    message: format!(
                        "index {} on table {} redefined with a different shape",
                        index.name, table.name
                    ),
                });
            }
            None => entry.indexes.push(index.clone()),
        }
    }
    Ok(())
}
