//! Snowflake: a single wide events table. There is no `ShreddedCopy` —
//! every non-atomic shred type becomes a column on `events` via
//! `extend_table`. No table versioning: `GetVersion`/`CommentOn` are
//! not supported, so `update_table` (which needs `GetVersion` to find
//! `current`) is also not supported — the planner must route Snowflake
//! shred types through `extend_table` instead (§4.1 "known capability
//! gaps").

use crate::error::{LoaderError, Result};
use crate::model::{Action, Block, DataDiscovery, SchemaKey, SchemaList, ShreddedTypeInfo, SnowplowEntity};
use crate::statement::{EventsCopy, Statement};

use super::Target;

pub struct SnowflakeTarget {
    db_schema: String,
    warehouse: String,
    /// `featureFlags.addLoadTstampColumn` (§6): when true, every load
    /// adds the `load_tstamp` column to `events` before copying.
    add_load_tstamp_column: bool,
}

impl SnowflakeTarget {
    pub fn new(db_schema: impl Into<String>, warehouse: impl Into<String>) -> Self {
        SnowflakeTarget { db_schema: db_schema.into(), warehouse: warehouse.into(), add_load_tstamp_column: false }
    }

    pub fn with_add_load_tstamp_column(mut self, add_load_tstamp_column: bool) -> Self {
        self.add_load_tstamp_column = add_load_tstamp_column;
        self
    }

    fn column_name(info: &ShreddedTypeInfo) -> String {
        format!("{}_{}_{}", info.vendor.replace('.', "_"), info.name, info.model)
    }

    fn column_type(info: &ShreddedTypeInfo) -> &'static str {
        match info.snowplow_entity {
            SnowplowEntity::SelfDescribing => "VARIANT",
            SnowplowEntity::Context => "ARRAY",
        }
    }
}

impl Target for SnowflakeTarget {
    fn update_table(&self, _current: &SchemaKey, _existing_columns: &[String], _state: &SchemaList) -> Result<Block> {
        Err(LoaderError::not_supported("Snowflake has no per-table versioning; use extend_table for new columns"))
    }

    fn extend_table(&self, info: &ShreddedTypeInfo) -> Option<Block> {
        let column = Self::column_name(info);
        let sql_type = Self::column_type(info);
        let add = Action::new(
            Statement::AlterTable { ddl: format!("ALTER TABLE {}.events ADD COLUMN IF NOT EXISTS {column} {sql_type}", self.db_schema) },
            format!("add wide-row column {column} to {}.events", self.db_schema),
        );
        let key = SchemaKey::new(&info.vendor, &info.name, crate::model::SchemaVer::new(info.model, 0, 0));
        Some(Block { pre: Vec::new(), in_: vec![add], db_schema: self.db_schema.clone(), target: key, is_creation: false })
    }

    fn get_load_statements(&self, discovery: &DataDiscovery, existing_event_columns: &[String]) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        if self.add_load_tstamp_column {
            statements.push(Statement::AddLoadTstampColumn);
        }
        statements.push(Statement::ReadyCheck);
        statements.push(Statement::EventsCopy(EventsCopy {
            path: discovery.base.clone(),
            compression: discovery.compression,
            columns: Some(existing_event_columns.to_vec()),
        }));
        Ok(statements)
    }

    fn create_table(&self, state: &SchemaList) -> Block {
        // Snowflake has no per-shred-type table; this only ever builds
        // the initial wide `events` table, and carries no version
        // comment because CommentOn is unsupported.
        let ddl = format!("CREATE TABLE IF NOT EXISTS {}.events ( ... )", self.db_schema);
        let create = Action::new(Statement::CreateTable { ddl }, format!("create table {}.events", self.db_schema));
        Block::creation(&self.db_schema, state.latest().clone(), create, None)
    }

    fn get_manifest(&self) -> Statement {
        Statement::CreateTable {
            ddl: format!(
                "CREATE TABLE IF NOT EXISTS {}.manifest (base VARCHAR PRIMARY KEY, types VARIANT, \
                 shredding_started TIMESTAMP_NTZ, shredding_completed TIMESTAMP_NTZ, ingestion TIMESTAMP_NTZ, \
                 compression VARCHAR, processor_artifact VARCHAR, processor_version VARCHAR, count_good NUMBER)",
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
            Statement::Abort => "ROLLBACK".to_string(),
            Statement::Select1 => "SELECT 1".to_string(),
            Statement::ReadyCheck => format!("ALTER WAREHOUSE {} RESUME IF SUSPENDED", self.warehouse),
            Statement::CreateAlertingTempTable => format!("CREATE TEMPORARY TABLE {schema}.folder_monitoring (run_id VARCHAR)"),
            Statement::DropAlertingTempTable => format!("DROP TABLE IF EXISTS {schema}.folder_monitoring"),
            Statement::FoldersMinusManifest => {
                format!("SELECT run_id FROM {schema}.folder_monitoring MINUS SELECT base FROM {schema}.manifest")
            }
            Statement::FoldersCopy { source } => format!("COPY INTO {schema}.folder_monitoring FROM '{source}'"),
            Statement::EventsCopy(copy) => format!("COPY INTO {schema}.events FROM '{}' FILE_FORMAT = (TYPE = CSV)", copy.path),
            Statement::ShreddedCopy(_) => return Err(LoaderError::not_supported("Snowflake has no shredded copy")),
            Statement::CreateTransient => return Err(LoaderError::not_supported("Snowflake has no transit table mode")),
            Statement::DropTransient => return Err(LoaderError::not_supported("Snowflake has no transit table mode")),
            Statement::AppendTransient => return Err(LoaderError::not_supported("Snowflake has no transit table mode")),
            Statement::TableExists { name } => format!("SHOW TABLES LIKE '{name}' IN SCHEMA {schema}"),
            Statement::GetVersion { .. } => return Err(LoaderError::not_supported("Snowflake has no table versioning")),
            Statement::RenameTable { from, to } => format!("ALTER TABLE {schema}.{from} RENAME TO {schema}.{to}"),
            Statement::SetSchema => format!("USE SCHEMA {schema}"),
            Statement::GetColumns { name } => format!("SHOW COLUMNS IN TABLE {schema}.{name}"),
            Statement::ManifestAdd { message } => {
                format!("INSERT INTO {schema}.manifest (base, ingestion) SELECT '{}', CURRENT_TIMESTAMP()", message.base)
            }
            Statement::ManifestGet { base } => format!("SELECT * FROM {schema}.manifest WHERE base = '{base}'"),
            Statement::AddLoadTstampColumn => format!("ALTER TABLE {schema}.events ADD COLUMN load_tstamp TIMESTAMP_NTZ"),
            Statement::CreateTable { ddl } => ddl.clone(),
            Statement::CommentOn { .. } => return Err(LoaderError::not_supported("Snowflake has no table comments")),
            Statement::DdlFile { ddl } => ddl.clone(),
            Statement::AlterTable { ddl } => ddl.clone(),
        };
        Ok(SqlText::new(text))
    }

    fn requires_events_columns(&self) -> bool {
        false
    }

    fn supports_per_table_migration(&self) -> bool {
        false
    }

    fn db_schema(&self) -> &str {
        &self.db_schema
    }

    fn name(&self) -> &'static str {
        "snowflake"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ShredFormat, ShreddedTypeInfo};

    #[test]
    fn update_table_is_not_supported() {
        let target = SnowflakeTarget::new("atomic", "wh");
        let list = SchemaList::new(vec![SchemaKey::new("com.acme", "context", crate::model::SchemaVer::parse("1-0-0").unwrap())]).unwrap();
        assert!(target.update_table(&list.latest().clone(), &[], &list).is_err());
    }

    #[test]
    fn extend_table_adds_a_wide_row_column() {
        let target = SnowflakeTarget::new("atomic", "wh");
        let info = ShreddedTypeInfo {
            vendor: "com.acme".to_string(),
            name: "context".to_string(),
            model: 1,
            format: ShredFormat::Json,
            snowplow_entity: SnowplowEntity::Context,
        };
        let block = target.extend_table(&info).unwrap();
        assert_eq!(block.in_.len(), 1);
        assert!(matches!(&block.in_[0].statement, Statement::AlterTable { ddl } if ddl.contains("com_acme_context_1")));
    }

    #[test]
    fn comment_on_and_get_version_are_unsupported() {
        let target = SnowflakeTarget::new("atomic", "wh");
        assert!(target.to_fragment(&Statement::GetVersion { name: "x".to_string() }).is_err());
        assert!(target
            .to_fragment(&Statement::CommentOn { table: "x".to_string(), comment: "y".to_string() })
            .is_err());
    }

    fn empty_discovery() -> DataDiscovery {
        DataDiscovery {
            base: crate::model::StorageFolder::parse("s3://bucket/run=1/").unwrap(),
            compression: crate::model::Compression::Gzip,
            shredded_types: Vec::new(),
            timestamps: crate::model::BatchTimestamps { job_started: chrono::Utc::now(), job_completed: chrono::Utc::now(), min_collector: None, max_collector: None },
            processor: crate::model::ProcessorInfo { artifact: "rdb-shredder".to_string(), version: "5.0.0".to_string() },
            count: Some(1),
        }
    }

    #[test]
    fn add_load_tstamp_column_flag_prepends_the_alter() {
        let target = SnowflakeTarget::new("atomic", "wh").with_add_load_tstamp_column(true);
        let statements = target.get_load_statements(&empty_discovery(), &[]).unwrap();
        assert!(matches!(statements[0], Statement::AddLoadTstampColumn));
    }
}
