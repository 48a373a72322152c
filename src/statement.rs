//! The dialect-neutral statement vocabulary (C1). Every DB effect the
//! core can request is one of these tags; only [`crate::target::Target::to_fragment`]
//! knows how to render a tag into warehouse-specific SQL text.

use crate::model::{Compression, StorageFolder};

/// Rendered SQL text for one statement, produced by a `Target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlText(pub String);

impl SqlText {
    pub fn new(s: impl Into<String>) -> Self {
        SqlText(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventsCopy {
    pub path: StorageFolder,
    pub compression: Compression,
    /// Present only when `Target::requires_events_columns()` is true
    /// (wide-row warehouses, e.g. Databricks).
    pub columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShreddedCopy {
    pub path: StorageFolder,
    pub compression: Compression,
    pub table: String,
    pub jsonpaths: Option<StorageFolder>,
}

/// A closed set of statement tags covering every operation the core
/// needs from a warehouse target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Begin,
    Commit,
    Abort,
    Select1,
    ReadyCheck,
    CreateAlertingTempTable,
    DropAlertingTempTable,
    FoldersMinusManifest,
    FoldersCopy { source: StorageFolder },
    EventsCopy(EventsCopy),
    ShreddedCopy(ShreddedCopy),
    CreateTransient,
    DropTransient,
    AppendTransient,
    TableExists { name: String },
    GetVersion { name: String },
    RenameTable { from: String, to: String },
    SetSchema,
    GetColumns { name: String },
    ManifestAdd { message: crate::model::ShreddingComplete },
    ManifestGet { base: StorageFolder },
    AddLoadTstampColumn,
    CreateTable { ddl: String },
    CommentOn { table: String, comment: String },
    DdlFile { ddl: String },
    AlterTable { ddl: String },
}

impl Statement {
    /// A short, stable label for logging — cheaper than formatting the
    /// full statement payload.
    pub fn label(&self) -> &'static str {
        match self {
            Statement::Begin => "Begin",
            Statement::Commit => "Commit",
            Statement::Abort => "Abort",
            Statement::Select1 => "Select1",
            Statement::ReadyCheck => "ReadyCheck",
            Statement::CreateAlertingTempTable => "CreateAlertingTempTable",
            Statement::DropAlertingTempTable => "DropAlertingTempTable",
            Statement::FoldersMinusManifest => "FoldersMinusManifest",
            Statement::FoldersCopy { .. } => "FoldersCopy",
            Statement::EventsCopy(_) => "EventsCopy",
            Statement::ShreddedCopy(_) => "ShreddedCopy",
            Statement::CreateTransient => "CreateTransient",
            Statement::DropTransient => "DropTransient",
            Statement::AppendTransient => "AppendTransient",
            Statement::TableExists { .. } => "TableExists",
            Statement::GetVersion { .. } => "GetVersion",
            Statement::RenameTable { .. } => "RenameTable",
            Statement::SetSchema => "SetSchema",
            Statement::GetColumns { .. } => "GetColumns",
            Statement::ManifestAdd { .. } => "ManifestAdd",
            Statement::ManifestGet { .. } => "ManifestGet",
            Statement::AddLoadTstampColumn => "AddLoadTstampColumn",
            Statement::CreateTable { .. } => "CreateTable",
            Statement::CommentOn { .. } => "CommentOn",
            Statement::DdlFile { .. } => "DdlFile",
            Statement::AlterTable { .. } => "AlterTable",
        }
    }
}
