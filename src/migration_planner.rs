//! The migration planner (C3): folds every shredded type in a batch into
//! a composite [`Migration`], branching per-target capability rather
//! than per-target name.
//!
//! Targets with table-level versioning (Redshift) are driven through the
//! warehouse catalog: does the table exist, what version comment does it
//! carry, what columns does it have. Targets without it (Snowflake's wide
//! row, Databricks' no-migration policy) never touch the catalog —
//! `extend_table`/`update_table` alone decide the delta.

use crate::error::{LoaderError, Result};
use crate::model::{DataDiscovery, Migration, SchemaKey};
use crate::statement::Statement;
use crate::transactor::Transactor;

/// Resolve `discovery`'s shredded types into the composite migration for
/// this batch. Skips atomic/legacy-JSON types, which carry no
/// `schema_list`.
pub async fn plan(transactor: &Transactor, discovery: &DataDiscovery) -> Result<Migration> {
    let mut migration = Migration::empty();

    for shredded in &discovery.shredded_types {
        let Some(list) = &shredded.schema_list else { continue };
        let target = transactor.target();

        if let Some(block) = target.extend_table(&shredded.info) {
            migration.extend_with(block);
            continue;
        }

        if !target.supports_per_table_migration() {
            let block = target.update_table(list.latest(), &[], list)?;
            migration.extend_with(block);
            continue;
        }

        let table = list.table_name();
        let exists = {
            let table = table.clone();
            transactor
                .run(move |conn, target| {
                    Box::pin(async move {
                        let sql = target.to_fragment(&Statement::TableExists { name: table })?;
                        Ok(conn.query_scalar(&sql).await?.is_some())
                    })
                })
                .await?
        };

        let block = if !exists {
            target.create_table(list)
        } else {
            let current = current_version(transactor, &table).await?;
            let columns = if &current == list.latest() {
                Vec::new()
            } else {
                existing_columns(transactor, &table).await?
            };
            target.update_table(&current, &columns, list)?
        };

        migration.extend_with(block);
    }

    Ok(migration)
}

async fn current_version(transactor: &Transactor, table: &str) -> Result<SchemaKey> {
    let table = table.to_string();
    let table_for_closure = table.clone();
    let version_text = transactor
        .run(move |conn, target| {
            Box::pin(async move {
                let sql = target.to_fragment(&Statement::GetVersion { name: table_for_closure })?;
                conn.query_scalar(&sql).await
            })
        })
        .await?;

    match version_text {
        Some(uri) => SchemaKey::parse_uri(&uri),
        None => Err(LoaderError::migration(format!("table {table} exists but carries no version comment"))),
    }
}

async fn existing_columns(transactor: &Transactor, table: &str) -> Result<Vec<String>> {
    let table = table.to_string();
    transactor
        .run(move |conn, target| {
            Box::pin(async move {
                let sql = target.to_fragment(&Statement::GetColumns { name: table })?;
                let rows = conn.query_rows(&sql).await?;
                Ok(rows.into_iter().filter_map(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) }).collect())
            })
        })
        .await
}
