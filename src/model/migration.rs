//! The migration plan types: [`Action`], [`Block`] and [`Migration`].
//!
//! A `Block` is one table's contribution to a migration; folding every
//! table's `Block`s produces the composite `Migration` the load state
//! machine executes (§4.3 of the migration planner design).

use super::schema::SchemaKey;
use crate::statement::Statement;

/// An opaque DB effect: the statement to run plus the message logged
/// when it runs.
#[derive(Debug, Clone)]
pub struct Action {
    pub statement: Statement,
    pub log_message: String,
}

impl Action {
    pub fn new(statement: Statement, log_message: impl Into<String>) -> Self {
        Action { statement, log_message: log_message.into() }
    }
}

/// One table's migration delta.
///
/// Invariants upheld by construction: `pre` holds only type-widening
/// alterations, `in_` holds only additive column/table operations, and a
/// creation block has an empty `pre` and exactly one `in_` action.
#[derive(Debug, Clone)]
pub struct Block {
    pub pre: Vec<Action>,
    pub in_: Vec<Action>,
    pub db_schema: String,
    pub target: SchemaKey,
    pub is_creation: bool,
}

impl Block {
    /// A block that creates a brand-new table. `pre` is empty, `in_` is
    /// the `CreateTable` action followed by its `CommentOn` marker, when
    /// the target supports table comments (Snowflake does not — see
    /// `SnowflakeTarget`).
    pub fn creation(db_schema: impl Into<String>, target: SchemaKey, create: Action, comment: Option<Action>) -> Self {
        let mut in_ = vec![create];
        in_.extend(comment);
        Block { pre: Vec::new(), in_, db_schema: db_schema.into(), target, is_creation: true }
    }

    /// A block that alters an existing table: `pre_alters` are
    /// type-widening `AlterTable`s, `in_adds` are additive `AlterTable`
    /// (`ADD COLUMN`) actions, and `comment` records the new version.
    ///
    /// `comment` lands in `pre` when there are no in-transaction
    /// actions (so the table's version marker still gets set
    /// pre-transaction) and in `in_` otherwise, matching the composite
    /// folding rule in the planner.
    pub fn alteration(
        db_schema: impl Into<String>,
        target: SchemaKey,
        pre_alters: Vec<Action>,
        in_adds: Vec<Action>,
        comment: Action,
    ) -> Self {
        let mut pre = pre_alters;
        let mut in_ = in_adds;
        if in_.is_empty() {
            pre.push(comment);
        } else {
            in_.push(comment);
        }
        Block { pre, in_, db_schema: db_schema.into(), target, is_creation: false }
    }

    /// A block with nothing to do but reaffirm the version comment
    /// (catalog already matches the latest known schema).
    pub fn reaffirm(db_schema: impl Into<String>, target: SchemaKey, comment: Action) -> Self {
        Block { pre: vec![comment], in_: Vec::new(), db_schema: db_schema.into(), target, is_creation: false }
    }

    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.in_.is_empty()
    }
}

/// The composite plan for one batch: statements to run before opening
/// the transaction and statements to run inside it.
#[derive(Debug, Clone, Default)]
pub struct Migration {
    pub pre: Vec<Action>,
    pub in_: Vec<Action>,
}

impl Migration {
    pub fn empty() -> Self {
        Migration::default()
    }

    /// Fold one table's `Block` into the composite plan, preserving the
    /// ordering guarantee that blocks are appended in input order and
    /// that within a block `pre` precedes `in_`.
    pub fn extend_with(&mut self, block: Block) {
        self.pre.extend(block.pre);
        self.in_.extend(block.in_);
    }
}
