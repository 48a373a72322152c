pub mod discovery;
pub mod manifest;
pub mod migration;
pub mod schema;
pub mod status;
pub mod storage_path;

pub use discovery::{
    BatchTimestamps, Compression, DataDiscovery, ProcessorInfo, ShredFormat, ShreddedType,
    ShreddedTypeInfo, ShreddingComplete, SnowplowEntity,
};
pub use manifest::ManifestEntry;
pub use migration::{Action, Block, Migration};
pub use schema::{SchemaKey, SchemaList, SchemaVer};
pub use status::{LoadStatus, Stage};
pub use storage_path::{StorageFolder, StorageKey};
