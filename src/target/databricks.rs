//! Databricks: no migrations at all. `update_table` records intent only
//! (an empty Block); `ShreddedCopy`/`TableExists`/`GetVersion`/
//! `GetColumns` all fail. Wide-row: `EventsCopy` is parameterized by the
//! warehouse's current column list (`requires_events_columns`).

use crate::error::{LoaderError, Result};
use crate::model::{Block, DataDiscovery, SchemaKey, SchemaList, ShreddedTypeInfo};
use crate::statement::{EventsCopy, Statement};

use super::Target;

pub struct DatabricksTarget {
    db_schema: String,
    catalog: String,
    /// `featureFlags.addLoadTstampColumn` (§6): when true, every load
    /// adds the `load_tstamp` column to `events` before copying.
    add_load_tstamp_column: bool,
}

impl DatabricksTarget {
    pub fn new(db_schema: impl Into<String>, catalog: impl Into<String>) -> Self {
        DatabricksTarget { db_schema: db_schema.into(), catalog: catalog.into(), add_load_tstamp_column: false }
    }

    pub fn with_add_load_tstamp_column(mut self, add_load_tstamp_column: bool) -> Self {
        self.add_load_tstamp_column = add_load_tstamp_column;
        self
    }
}

impl Target for DatabricksTarget {
    fn update_table(&self, _current: &SchemaKey, _existing_columns: &[String], state: &SchemaList) -> Result<Block> {
        // Databricks has no migration capability; the Block carries no
        // statements, only the intent of "we are now at this version".
        Ok(Block { pre: Vec::new(), in_: Vec::new(), db_schema: self.db_schema.clone(), target: state.latest().clone(), is_creation: false })
    }

    fn extend_table(&self, _info: &ShreddedTypeInfo) -> Option<Block> {
        None
    }

    fn get_load_statements(&self, discovery: &DataDiscovery, existing_event_columns: &[String]) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        if self.add_load_tstamp_column {
            statements.push(Statement::AddLoadTstampColumn);
        }
        statements.push(Statement::EventsCopy(EventsCopy {
            path: discovery.base.clone(),
            compression: discovery.compression,
            columns: Some(existing_event_columns.to_vec()),
        }));
        Ok(statements)
    }

    fn create_table(&self, state: &SchemaList) -> Block {
        Block { pre: Vec::new(), in_: Vec::new(), db_schema: self.db_schema.clone(), target: state.latest().clone(), is_creation: true }
    }

    fn get_manifest(&self) -> Statement {
        Statement::CreateTable {
            ddl: format!(
                "CREATE TABLE IF NOT EXISTS {}.{}.manifest (base STRING, types STRING, shredding_started TIMESTAMP, \
                 shredding_completed TIMESTAMP, ingestion TIMESTAMP, compression STRING, processor_artifact STRING, \
                 processor_version STRING, count_good BIGINT) USING DELTA",
                self.catalog, self.db_schema
            ),
        }
    }

    fn to_fragment(&self, statement: &Statement) -> Result<crate::statement::SqlText> {
        use crate::statement::SqlText;
        let schema = format!("{}.{}", self.catalog, self.db_schema);
        let text = match statement {
            Statement::Begin => return Err(LoaderError::not_supported("Databricks autocommits; there is no BEGIN")),
            Statement::Commit => return Err(LoaderError::not_supported("Databricks autocommits; there is no COMMIT")),
            Statement::Abort => return Err(LoaderError::not_supported("Databricks autocommits; there is no ABORT")),
            Statement::Select1 => "SELECT 1".to_string(),
            Statement::ReadyCheck => "SELECT 1".to_string(),
            Statement::CreateAlertingTempTable => "CREATE TEMPORARY VIEW folder_monitoring AS SELECT '' AS run_id WHERE 1 = 0".to_string(),
            Statement::DropAlertingTempTable => "DROP VIEW IF EXISTS folder_monitoring".to_string(),
            Statement::FoldersMinusManifest => format!("SELECT run_id FROM folder_monitoring EXCEPT SELECT base FROM {schema}.manifest"),
            Statement::FoldersCopy { source } => format!("COPY INTO folder_monitoring FROM '{source}'"),
            Statement::EventsCopy(copy) => format!(
                "COPY INTO {schema}.events FROM '{}' FILEFORMAT = CSV {}",
                copy.path,
                copy.columns.as_ref().map(|c| format!("-- columns: {}", c.join(","))).unwrap_or_default()
            ),
            Statement::ShreddedCopy(_) => return Err(LoaderError::not_supported("Databricks has no shredded copy")),
            Statement::CreateTransient => return Err(LoaderError::not_supported("Databricks has no transit table mode")),
            Statement::DropTransient => return Err(LoaderError::not_supported("Databricks has no transit table mode")),
            Statement::AppendTransient => return Err(LoaderError::not_supported("Databricks has no transit table mode")),
            Statement::TableExists { .. } => return Err(LoaderError::not_supported("Databricks does not support catalog introspection here")),
            Statement::GetVersion { .. } => return Err(LoaderError::not_supported("Databricks has no table versioning")),
            Statement::RenameTable { from, to } => format!("ALTER TABLE {schema}.{from} RENAME TO {schema}.{to}"),
            Statement::SetSchema => format!("USE {schema}"),
            Statement::GetColumns { .. } => return Err(LoaderError::not_supported("Databricks has no column introspection here")),
            Statement::ManifestAdd { message } => {
                format!("INSERT INTO {schema}.manifest (base, ingestion) VALUES ('{}', current_timestamp())", message.base)
            }
            Statement::ManifestGet { base } => format!("SELECT * FROM {schema}.manifest WHERE base = '{base}'"),
            Statement::AddLoadTstampColumn => format!("ALTER TABLE {schema}.events ADD COLUMN load_tstamp TIMESTAMP"),
            Statement::CreateTable { ddl } => ddl.clone(),
            Statement::CommentOn { .. } => return Err(LoaderError::not_supported("Databricks has no per-table schema comments here")),
            Statement::DdlFile { ddl } => ddl.clone(),
            Statement::AlterTable { ddl } => ddl.clone(),
        };
        Ok(SqlText::new(text))
    }

    fn requires_events_columns(&self) -> bool {
        true
    }

    fn supports_per_table_migration(&self) -> bool {
        false
    }

    fn db_schema(&self) -> &str {
        &self.db_schema
    }

    fn name(&self) -> &'static str {
        "databricks"
    }
}
