//! Redshift: full migrations. `pre` carries `ALTER COLUMN TYPE`
//! (disallowed inside a transaction); an optional transit-table mode
//! loads into a sibling table and appends it once the COPY succeeds.

use crate::collaborators::{ColumnChange, ColumnDiffer};
use crate::error::{LoaderError, Result};
use crate::model::{Action, Block, DataDiscovery, SchemaKey, SchemaList, ShreddedTypeInfo};
use crate::statement::{EventsCopy, ShreddedCopy, Statement};
use std::sync::Arc;

use super::Target;

pub struct RedshiftTarget {
    db_schema: String,
    differ: Arc<dyn ColumnDiffer>,
    /// When true, `get_load_statements` routes the events COPY through a
    /// transient sibling table and an `ALTER TABLE APPEND` instead of
    /// copying straight into `events`.
    pub use_transit_table: bool,
    /// `featureFlags.addLoadTstampColumn` (§6): when true, every load
    /// adds the `load_tstamp` column to `events` before copying.
    add_load_tstamp_column: bool,
}

impl RedshiftTarget {
    pub fn new(db_schema: impl Into<String>, differ: Arc<dyn ColumnDiffer>, use_transit_table: bool) -> Self {
        RedshiftTarget { db_schema: db_schema.into(), differ, use_transit_table, add_load_tstamp_column: false }
    }

    pub fn with_add_load_tstamp_column(mut self, add_load_tstamp_column: bool) -> Self {
        self.add_load_tstamp_column = add_load_tstamp_column;
        self
    }

    fn comment_action(&self, table: &str, target: &SchemaKey) -> Action {
        Action::new(
            Statement::CommentOn { table: table.to_string(), comment: target.uri() },
            format!("commit schema version {target} on {}.{table}", self.db_schema),
        )
    }
}

impl Target for RedshiftTarget {
    fn update_table(&self, current: &SchemaKey, _existing_columns: &[String], state: &SchemaList) -> Result<Block> {
        let table = state.table_name();
        let targets = state
            .after(current)
            .ok_or_else(|| LoaderError::migration(format!("{current} is not a member of the known schema list for {table}")))?;
        if targets.is_empty() {
            return Ok(Block::reaffirm(&self.db_schema, state.latest().clone(), self.comment_action(&table, state.latest())));
        }

        let mut pre = Vec::new();
        let mut in_ = Vec::new();
        let mut cursor = current.clone();
        for next in targets {
            for change in self.differ.diff(&cursor, next)? {
                match change {
                    ColumnChange::Add { name, sql_type } => {
                        in_.push(Action::new(
                            Statement::AlterTable { ddl: format!("ALTER TABLE {}.{table} ADD COLUMN {name} {sql_type}", self.db_schema) },
                            format!("add column {name} to {}.{table}", self.db_schema),
                        ));
                    }
                    ColumnChange::Widen { name, sql_type } => {
                        pre.push(Action::new(
                            Statement::AlterTable { ddl: format!("ALTER TABLE {}.{table} ALTER COLUMN {name} TYPE {sql_type}", self.db_schema) },
                            format!("widen column {name} on {}.{table}", self.db_schema),
                        ));
                    }
                }
            }
            cursor = next.clone();
        }

        Ok(Block::alteration(&self.db_schema, state.latest().clone(), pre, in_, self.comment_action(&table, state.latest())))
    }

    fn extend_table(&self, _info: &ShreddedTypeInfo) -> Option<Block> {
        None
    }

    fn get_load_statements(&self, discovery: &DataDiscovery, _existing_event_columns: &[String]) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        if self.add_load_tstamp_column {
            statements.push(Statement::AddLoadTstampColumn);
        }
        if self.use_transit_table {
            statements.push(Statement::CreateTransient);
            statements.push(Statement::EventsCopy(EventsCopy {
                path: discovery.base.clone(),
                compression: discovery.compression,
                columns: None,
            }));
            statements.push(Statement::AppendTransient);
            statements.push(Statement::DropTransient);
        } else {
            statements.push(Statement::EventsCopy(EventsCopy {
                path: discovery.base.clone(),
                compression: discovery.compression,
                columns: None,
            }));
        }
        for shredded in &discovery.shredded_types {
            if let Some(list) = &shredded.schema_list {
                statements.push(Statement::ShreddedCopy(ShreddedCopy {
                    path: discovery.base.clone(),
                    compression: discovery.compression,
                    table: list.table_name(),
                    jsonpaths: None,
                }));
            }
        }
        Ok(statements)
    }

    fn create_table(&self, state: &SchemaList) -> Block {
        let table = state.table_name();
        let ddl = format!("CREATE TABLE IF NOT EXISTS {}.{table} ( ... )", self.db_schema);
        let create = Action::new(Statement::CreateTable { ddl }, format!("create table {}.{table}", self.db_schema));
        Block::creation(&self.db_schema, state.latest().clone(), create, Some(self.comment_action(&table, state.latest())))
    }

    fn get_manifest(&self) -> Statement {
        Statement::CreateTable {
            ddl: format!(
                "CREATE TABLE IF NOT EXISTS {}.manifest (base VARCHAR(512) PRIMARY KEY, types VARCHAR(65535), \
                 shredding_started TIMESTAMP, shredding_completed TIMESTAMP, min_collector TIMESTAMP, \
                 max_collector TIMESTAMP, ingestion TIMESTAMP, compression VARCHAR(8), \
                 processor_artifact VARCHAR(64), processor_version VARCHAR(32), count_good BIGINT)",
                self.db_schema
            ),
        }
    }

    fn to_fragment(&self, statement: &Statement) -> Result<crate::statement::SqlText> {
        use crate::statement::SqlText;
        let schema = &self.db_schema;
        let text = match statement {
            Statement::Begin => "BEGIN".to_string(),
            Statement::Commit => "COMMIT".to_string(),
            Statement::Abort => "ABORT".to_string(),
            Statement::Select1 => "SELECT 1".to_string(),
            Statement::ReadyCheck => "SELECT 1".to_string(),
            Statement::CreateAlertingTempTable => format!("CREATE TEMP TABLE {schema}_folder_monitoring (run_id VARCHAR(512))"),
            Statement::DropAlertingTempTable => format!("DROP TABLE IF EXISTS {schema}_folder_monitoring"),
            Statement::FoldersMinusManifest => {
                format!("SELECT run_id FROM {schema}_folder_monitoring EXCEPT SELECT base FROM {schema}.manifest")
            }
            Statement::FoldersCopy { source } => format!("COPY {schema}_folder_monitoring FROM '{source}' CREDENTIALS ''"),
            Statement::EventsCopy(copy) => format!(
                "COPY {schema}.events FROM '{}' CREDENTIALS '' {}",
                copy.path,
                if copy.compression == crate::model::Compression::Gzip { "GZIP" } else { "" }
            ),
            Statement::ShreddedCopy(copy) => format!("COPY {schema}.{} FROM '{}' CREDENTIALS '' JSON 'auto'", copy.table, copy.path),
            Statement::CreateTransient => format!("CREATE TABLE {schema}.events_transient (LIKE {schema}.events)"),
            Statement::DropTransient => format!("DROP TABLE IF EXISTS {schema}.events_transient"),
            Statement::AppendTransient => format!("ALTER TABLE {schema}.events APPEND FROM {schema}.events_transient"),
            Statement::TableExists { name } => {
                format!("SELECT 1 FROM information_schema.tables WHERE table_schema = '{schema}' AND table_name = '{name}'")
            }
            Statement::GetVersion { name } => format!("SELECT obj_description('{schema}.{name}'::regclass)"),
            Statement::RenameTable { from, to } => format!("ALTER TABLE {schema}.{from} RENAME TO {to}"),
            Statement::SetSchema => format!("SET search_path TO {schema}"),
            Statement::GetColumns { name } => {
                format!("SELECT column_name FROM information_schema.columns WHERE table_schema = '{schema}' AND table_name = '{name}'")
            }
            Statement::ManifestAdd { message } => format!(
                "INSERT INTO {schema}.manifest (base, ingestion) VALUES ('{}', GETDATE())",
                message.base
            ),
            Statement::ManifestGet { base } => format!("SELECT * FROM {schema}.manifest WHERE base = '{base}'"),
            Statement::AddLoadTstampColumn => format!("ALTER TABLE {schema}.events ADD COLUMN load_tstamp TIMESTAMP"),
            Statement::CreateTable { ddl } => ddl.clone(),
            Statement::CommentOn { table, comment } => format!("COMMENT ON TABLE {schema}.{table} IS '{comment}'"),
            Statement::DdlFile { ddl } => ddl.clone(),
            Statement::AlterTable { ddl } => ddl.clone(),
        };
        Ok(SqlText::new(text))
    }

    fn requires_events_columns(&self) -> bool {
        false
    }

    fn db_schema(&self) -> &str {
        &self.db_schema
    }

    fn name(&self) -> &'static str {
        "redshift"
    }
}
