//! The warehouse target abstraction (C1): a dialect-neutral interface
//! hiding Redshift/Snowflake/Databricks-specific DDL/DML behind the
//! shared [`crate::statement::Statement`] vocabulary.
//!
//! Every method here is pure with respect to configuration — no I/O.
//! Catalog inspection (`TableExists`, `GetVersion`, `GetColumns`) is a
//! `Statement` executed through [`crate::transactor::Transactor`], not a
//! `Target` method; `Target` only ever *builds* statements.

pub mod databricks;
pub mod redshift;
pub mod snowflake;

use crate::error::Result;
use crate::model::{Block, DataDiscovery, SchemaKey, SchemaList, ShreddedTypeInfo};
use crate::statement::{SqlText, Statement};

pub use databricks::DatabricksTarget;
pub use redshift::RedshiftTarget;
pub use snowflake::SnowflakeTarget;

pub trait Target: Send + Sync {
    /// Produce the delta from `current` to `state.latest()`. Errors when
    /// `current` is not a member of `state` (stale catalog) or when
    /// `state` has only one entry (nothing to migrate to).
    fn update_table(&self, current: &SchemaKey, existing_columns: &[String], state: &SchemaList) -> Result<Block>;

    /// Snowflake only: a shred type becomes a new wide-table column
    /// instead of its own table. `None` for every other target.
    fn extend_table(&self, info: &ShreddedTypeInfo) -> Option<Block>;

    /// The non-empty sequence of statements that load one batch's rows,
    /// once migrations have already been applied.
    fn get_load_statements(&self, discovery: &DataDiscovery, existing_event_columns: &[String]) -> Result<Vec<Statement>>;

    /// The `CreateTable` + `CommentOn` block for a brand-new table.
    fn create_table(&self, state: &SchemaList) -> Block;

    /// The CREATE statement for the manifest table.
    fn get_manifest(&self) -> Statement;

    /// Render a statement as warehouse-specific SQL text. The only
    /// dialect-specific renderer; fails for statements this target
    /// doesn't support (§4.1's "known capability gaps").
    fn to_fragment(&self, statement: &Statement) -> Result<SqlText>;

    /// True for wide-row warehouses (Databricks) where `EventsCopy` is
    /// parameterized by the current column list.
    fn requires_events_columns(&self) -> bool;

    /// True when the planner should drive this target through the
    /// `TableExists`/`GetVersion`/`GetColumns` catalog-inspection path
    /// (Redshift). False routes every shred type through `extend_table`
    /// or, failing that, a bare `update_table` call with no catalog
    /// lookups (Snowflake, Databricks).
    fn supports_per_table_migration(&self) -> bool {
        true
    }

    fn db_schema(&self) -> &str;

    fn name(&self) -> &'static str;
}
