//! Configuration backup: export the definition graph to a self-contained
//! JSON document and re-import it later.
//!
//! The export is the bounded closure over what a configuration owns: the
//! configuration record, its blocks, their parameters and its relations.
//! Book-scoped rows (instances, values, edges) never appear. The document
//! carries uuids only, no engine keys, and its vectors are uuid-sorted so
//! equal graphs serialize identically.
//!
//! Import runs as one transaction under an explicit collision policy:
//! [`ImportPolicy::Reject`] keeps incoming identities and fails on any uuid
//! that collides with a different local record (identical records are
//! skipped, so re-importing a backup is idempotent); [`ImportPolicy::Remap`]
//! mints a fresh uuid for every record and rewrites the internal
//! cross-references, preserving the graph shape while changing identities.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use vellum_api::{
    Block, BlockParameter, BlockRelation, Configuration, Result, StoreError,
};

use crate::repo::{self, tables};
use crate::storage::{Database, RowData, WriteTxn};

/// A self-contained snapshot of one configuration's definition graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationExport {
    pub configuration: Configuration,
    pub blocks: Vec<Block>,
    pub parameters: Vec<BlockParameter>,
    pub relations: Vec<BlockRelation>,
}

impl ConfigurationExport {
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// What to do when an imported uuid already exists locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPolicy {
    /// Keep incoming identities. A uuid colliding with a different local
    /// record fails the whole import; identical records are skipped.
    Reject,
    /// Mint fresh uuids for the whole document and rewrite its internal
    /// references; never collides with local data.
    Remap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSummary {
    /// Uuid the configuration landed under (changed by `Remap`).
    pub configuration_uuid: String,
    pub written: usize,
    pub skipped: usize,
}

/// Suggested download name for an exported configuration.
pub fn export_file_name(configuration: &Configuration) -> String {
    format!("{}_config.json", configuration.title)
}

/// Collect the export document for one configuration, under a single read
/// transaction. `None` when the configuration does not exist.
pub async fn export_configuration(
    db: &Database,
    configuration_uuid: &str,
) -> Result<Option<ConfigurationExport>> {
    let txn = db.begin_read().await;
    let Some(configuration) = repo::first_as::<Configuration>(
        &txn.table(tables::CONFIGURATIONS)?,
        "uuid",
        configuration_uuid,
    )?
    else {
        return Ok(None);
    };
    let mut blocks: Vec<Block> = repo::rows_as(
        &txn.table(tables::BLOCKS)?,
        "configurationUuid",
        configuration_uuid,
    )?;
    let parameters_table = txn.table(tables::BLOCK_PARAMETERS)?;
    let mut parameters: Vec<BlockParameter> = Vec::new();
    for block in &blocks {
        parameters.extend(repo::rows_as::<BlockParameter>(
            &parameters_table,
            "blockUuid",
            &block.uuid,
        )?);
    }
    let mut relations: Vec<BlockRelation> = repo::rows_as(
        &txn.table(tables::BLOCK_RELATIONS)?,
        "configurationUuid",
        configuration_uuid,
    )?;
    blocks.sort_by(|a, b| a.uuid.cmp(&b.uuid));
    parameters.sort_by(|a, b| a.uuid.cmp(&b.uuid));
    relations.sort_by(|a, b| a.uuid.cmp(&b.uuid));
    debug!(
        configuration = configuration_uuid,
        blocks = blocks.len(),
        parameters = parameters.len(),
        relations = relations.len(),
        "exported configuration"
    );
    Ok(Some(ConfigurationExport {
        configuration,
        blocks,
        parameters,
        relations,
    }))
}

/// Import an export document under the given collision policy, as one
/// transaction: on any failure nothing is written.
pub async fn import_configuration(
    db: &Database,
    export: &ConfigurationExport,
    policy: ImportPolicy,
) -> Result<ImportSummary> {
    validate_export(export)?;
    let summary = match policy {
        ImportPolicy::Reject => import_verbatim(db, export).await?,
        ImportPolicy::Remap => import_remapped(db, export).await?,
    };
    info!(
        configuration = %summary.configuration_uuid,
        written = summary.written,
        skipped = summary.skipped,
        ?policy,
        "imported configuration"
    );
    Ok(summary)
}

fn inconsistent(message: String) -> StoreError {
    StoreError::ReferentialViolation {
        message: format!("import document inconsistent: {message}"),
    }
}

/// The document must be closed over itself: every record unique, every
/// internal reference resolvable, before anything touches the database.
fn validate_export(export: &ConfigurationExport) -> Result<()> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let all_uuids = std::iter::once(export.configuration.uuid.as_str())
        .chain(export.blocks.iter().map(|b| b.uuid.as_str()))
        .chain(export.parameters.iter().map(|p| p.uuid.as_str()))
        .chain(export.relations.iter().map(|r| r.uuid.as_str()));
    for uuid in all_uuids {
        if !seen.insert(uuid) {
            return Err(inconsistent(format!("duplicate uuid {uuid}")));
        }
    }
    let configuration_uuid = &export.configuration.uuid;
    let block_uuids: BTreeSet<&str> = export.blocks.iter().map(|b| b.uuid.as_str()).collect();
    for block in &export.blocks {
        if block.configuration_uuid != *configuration_uuid {
            return Err(inconsistent(format!(
                "block {} belongs to configuration {}, not {configuration_uuid}",
                block.uuid, block.configuration_uuid
            )));
        }
    }
    for parameter in &export.parameters {
        if !block_uuids.contains(parameter.block_uuid.as_str()) {
            return Err(inconsistent(format!(
                "parameter {} references block {} missing from the document",
                parameter.uuid, parameter.block_uuid
            )));
        }
    }
    for relation in &export.relations {
        if relation.configuration_uuid != *configuration_uuid {
            return Err(inconsistent(format!(
                "relation {} belongs to configuration {}, not {configuration_uuid}",
                relation.uuid, relation.configuration_uuid
            )));
        }
        for endpoint in [&relation.source_block_uuid, &relation.target_block_uuid] {
            if !block_uuids.contains(endpoint.as_str()) {
                return Err(inconsistent(format!(
                    "relation {} references block {endpoint} missing from the document",
                    relation.uuid
                )));
            }
        }
    }
    Ok(())
}

/// Write a record keeping its incoming identity: skip when an identical
/// local record exists, fail on a colliding different one.
fn write_verbatim(
    txn: &mut WriteTxn,
    table: &str,
    row: RowData,
    summary: &mut ImportSummary,
) -> Result<()> {
    let uuid = row
        .get("uuid")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| StoreError::Serialization {
            message: format!("import row for {table} lacks a uuid"),
        })?;
    let existing = txn.table(table)?.where_eq("uuid", &uuid)?.first();
    match existing {
        Some(existing) if existing == row => {
            summary.skipped += 1;
        }
        Some(_) => {
            return Err(StoreError::UniquenessViolation {
                table: table.to_string(),
                key: uuid,
            });
        }
        None => {
            txn.add(table, row)?;
            summary.written += 1;
        }
    }
    Ok(())
}

async fn import_verbatim(db: &Database, export: &ConfigurationExport) -> Result<ImportSummary> {
    let mut txn = db.begin_write().await;
    let mut summary = ImportSummary {
        configuration_uuid: export.configuration.uuid.clone(),
        written: 0,
        skipped: 0,
    };
    write_verbatim(
        &mut txn,
        tables::CONFIGURATIONS,
        repo::to_row(&export.configuration)?,
        &mut summary,
    )?;
    for block in &export.blocks {
        write_verbatim(&mut txn, tables::BLOCKS, repo::to_row(block)?, &mut summary)?;
    }
    for parameter in &export.parameters {
        write_verbatim(
            &mut txn,
            tables::BLOCK_PARAMETERS,
            repo::to_row(parameter)?,
            &mut summary,
        )?;
    }
    for relation in &export.relations {
        write_verbatim(
            &mut txn,
            tables::BLOCK_RELATIONS,
            repo::to_row(relation)?,
            &mut summary,
        )?;
    }
    txn.commit().await?;
    Ok(summary)
}

async fn import_remapped(db: &Database, export: &ConfigurationExport) -> Result<ImportSummary> {
    let mut configuration = export.configuration.clone();
    configuration.uuid = Uuid::new_v4().to_string();

    let mut block_ids: BTreeMap<&str, String> = BTreeMap::new();
    let mut blocks = Vec::with_capacity(export.blocks.len());
    for block in &export.blocks {
        let mut mapped = block.clone();
        mapped.uuid = Uuid::new_v4().to_string();
        mapped.configuration_uuid = configuration.uuid.clone();
        block_ids.insert(block.uuid.as_str(), mapped.uuid.clone());
        blocks.push(mapped);
    }
    let mapped_block = |uuid: &str| -> Result<String> {
        block_ids
            .get(uuid)
            .cloned()
            .ok_or_else(|| inconsistent(format!("block {uuid} missing from the document")))
    };

    let mut parameters = Vec::with_capacity(export.parameters.len());
    for parameter in &export.parameters {
        let mut mapped = parameter.clone();
        mapped.uuid = Uuid::new_v4().to_string();
        mapped.block_uuid = mapped_block(&parameter.block_uuid)?;
        parameters.push(mapped);
    }
    let mut relations = Vec::with_capacity(export.relations.len());
    for relation in &export.relations {
        let mut mapped = relation.clone();
        mapped.uuid = Uuid::new_v4().to_string();
        mapped.configuration_uuid = configuration.uuid.clone();
        mapped.source_block_uuid = mapped_block(&relation.source_block_uuid)?;
        mapped.target_block_uuid = mapped_block(&relation.target_block_uuid)?;
        relations.push(mapped);
    }

    let mut txn = db.begin_write().await;
    txn.add(tables::CONFIGURATIONS, repo::to_row(&configuration)?)?;
    for block in &blocks {
        txn.add(tables::BLOCKS, repo::to_row(block)?)?;
    }
    for parameter in &parameters {
        txn.add(tables::BLOCK_PARAMETERS, repo::to_row(parameter)?)?;
    }
    for relation in &relations {
        txn.add(tables::BLOCK_RELATIONS, repo::to_row(relation)?)?;
    }
    txn.commit().await?;
    Ok(ImportSummary {
        configuration_uuid: configuration.uuid,
        written: 1 + blocks.len() + parameters.len() + relations.len(),
        skipped: 0,
    })
}

#[cfg(test)]
#[path = "backup_tests.rs"]
mod backup_tests;
