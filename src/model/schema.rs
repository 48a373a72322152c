//! Iglu schema keys and the ordered schema lists the migration planner
//! works against.

use crate::error::LoaderError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A `major.minor.patch` schema version, e.g. `1-0-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaVer {
    pub model: u32,
    pub revision: u32,
    pub addition: u32,
}

impl SchemaVer {
    pub fn new(model: u32, revision: u32, addition: u32) -> Self {
        SchemaVer { model, revision, addition }
    }

    pub fn parse(s: &str) -> Result<Self, LoaderError> {
        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() != 3 {
            return Err(LoaderError::migration(format!("invalid schema version: {s}")));
        }
        let parse_part = |p: &str| {
            p.parse::<u32>()
                .map_err(|_| LoaderError::migration(format!("invalid schema version: {s}")))
        };
        Ok(SchemaVer {
            model: parse_part(parts[0])?,
            revision: parse_part(parts[1])?,
            addition: parse_part(parts[2])?,
        })
    }
}

impl fmt::Display for SchemaVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.model, self.revision, self.addition)
    }
}

impl PartialOrd for SchemaVer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SchemaVer {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.model, self.revision, self.addition).cmp(&(other.model, other.revision, other.addition))
    }
}

/// `(vendor, name, "jsonschema", major.minor.patch)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaKey {
    pub vendor: String,
    pub name: String,
    pub format: String,
    pub version: SchemaVer,
}

impl SchemaKey {
    pub fn new(vendor: impl Into<String>, name: impl Into<String>, version: SchemaVer) -> Self {
        SchemaKey {
            vendor: vendor.into(),
            name: name.into(),
            format: "jsonschema".to_string(),
            version,
        }
    }

    /// The Iglu URI, e.g. `iglu:com.acme/context/jsonschema/1-0-1`.
    pub fn uri(&self) -> String {
        format!("iglu:{}/{}/{}/{}", self.vendor, self.name, self.format, self.version)
    }

    /// Parse an Iglu URI back into a `SchemaKey`, e.g. the text stored
    /// in a `COMMENT ON TABLE` marker.
    pub fn parse_uri(s: &str) -> Result<Self, LoaderError> {
        let rest = s.strip_prefix("iglu:").ok_or_else(|| LoaderError::migration(format!("not an iglu URI: {s}")))?;
        let parts: Vec<&str> = rest.split('/').collect();
        if parts.len() != 4 {
            return Err(LoaderError::migration(format!("malformed iglu URI: {s}")));
        }
        Ok(SchemaKey { vendor: parts[0].to_string(), name: parts[1].to_string(), format: parts[2].to_string(), version: SchemaVer::parse(parts[3])? })
    }

    /// The warehouse-safe table name, e.g. `com_acme_context_1`.
    pub fn table_name(&self) -> String {
        format!(
            "{}_{}_{}",
            self.vendor.replace('.', "_"),
            self.name,
            self.version.model
        )
    }
}

impl fmt::Display for SchemaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

/// A non-empty, version-ordered list of schemas within one `major`
/// model. The last element is "latest known".
#[derive(Debug)]
pub struct SchemaList {
    schemas: Vec<SchemaKey>,
}

impl SchemaList {
    /// Builds a list, sorting by full version and validating every
    /// member shares the same vendor/name/model.
    pub fn new(mut schemas: Vec<SchemaKey>) -> Result<Self, LoaderError> {
        if schemas.is_empty() {
            return Err(LoaderError::migration("schema list must not be empty"));
        }
        schemas.sort_by(|a, b| a.version.cmp(&b.version));
        let first = &schemas[0];
        for s in &schemas {
            if s.vendor != first.vendor || s.name != first.name || s.version.model != first.version.model {
                return Err(LoaderError::migration(format!(
                    "schema list contains mismatched schemas: {} vs {}",
                    first.uri(),
                    s.uri()
                )));
            }
        }
        Ok(SchemaList { schemas })
    }

    pub fn latest(&self) -> &SchemaKey {
        self.schemas.last().expect("non-empty by construction")
    }

    pub fn contains(&self, key: &SchemaKey) -> bool {
        self.schemas.iter().any(|s| s == key)
    }

    pub fn position(&self, key: &SchemaKey) -> Option<usize> {
        self.schemas.iter().position(|s| s == key)
    }

    /// Every schema strictly after `current`, in order, up to and
    /// including `latest()`. `None` if `current` is not a member (a
    /// stale catalog version).
    pub fn after(&self, current: &SchemaKey) -> Option<&[SchemaKey]> {
        let idx = self.position(current)?;
        Some(&self.schemas[idx + 1..])
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = &SchemaKey> {
        self.schemas.iter()
    }

    pub fn table_name(&self) -> String {
        self.latest().table_name()
    }
}

impl Clone for SchemaList {
    fn clone(&self) -> Self {
        SchemaList { schemas: self.schemas.clone() }
    }
}
