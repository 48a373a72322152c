//! Refined string types for object-storage locations.
//!
//! Mirrors the teacher's constructor-validated value types: a single
//! smart constructor (`parse`) that returns a `Result`, and `coerce` for
//! call sites that already hold a trusted, well-formed string.

use crate::error::LoaderError;
use std::fmt;

const MAX_LEN: usize = 1024;

fn normalize_scheme(s: &str) -> Option<(&'static str, &str)> {
    if let Some(rest) = s.strip_prefix("s3://") {
        Some(("s3://", rest))
    } else if let Some(rest) = s.strip_prefix("s3a://") {
        Some(("s3://", rest))
    } else if let Some(rest) = s.strip_prefix("s3n://") {
        Some(("s3://", rest))
    } else {
        None
    }
}

/// A canonical object-store prefix. Always starts with `s3://` and ends
/// with a trailing `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageFolder(String);

impl StorageFolder {
    pub fn parse(s: &str) -> Result<Self, LoaderError> {
        let (_, rest) = normalize_scheme(s)
            .ok_or_else(|| LoaderError::discovery(format!("not a storage URI: {s}")))?;
        let rest = rest.trim_start_matches('/');
        let mut canonical = format!("s3://{rest}");
        if !canonical.ends_with('/') {
            canonical.push('/');
        }
        if canonical.len() > MAX_LEN {
            return Err(LoaderError::discovery(format!(
                "storage folder exceeds {MAX_LEN} bytes: {canonical}"
            )));
        }
        Ok(StorageFolder(canonical))
    }

    /// Build from a string already known to be well-formed (e.g. read
    /// back from the manifest table). Panics in debug builds on
    /// malformed input; in release it best-effort normalizes.
    pub fn coerce(s: impl Into<String>) -> Self {
        let s = s.into();
        debug_assert!(s.starts_with("s3://") && s.ends_with('/'));
        StorageFolder(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append a path segment, returning the child folder.
    pub fn append(&self, segment: &str) -> StorageFolder {
        let segment = segment.trim_matches('/');
        StorageFolder(format!("{}{}/", self.0, segment))
    }

    /// The folder one level up, or `None` if this is already the bucket
    /// root (`s3://bucket/`).
    pub fn parent(&self) -> Option<StorageFolder> {
        let trimmed = self.0.trim_end_matches('/');
        let idx = trimmed.rfind('/')?;
        // idx must be past the "s3:/" scheme separator to be a real parent.
        if idx < "s3:/".len() {
            return None;
        }
        Some(StorageFolder(format!("{}/", &trimmed[..idx])))
    }

    /// The suffix of `self` relative to `parent`, or `None` if `self` is
    /// not nested under `parent`.
    pub fn diff(&self, parent: &StorageFolder) -> Option<String> {
        self.0
            .strip_prefix(parent.0.as_str())
            .map(|rest| rest.trim_end_matches('/').to_string())
    }
}

impl fmt::Display for StorageFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl serde::Serialize for StorageFolder {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for StorageFolder {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        StorageFolder::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Same constraints as [`StorageFolder`] without the trailing slash —
/// identifies a single object, not a prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn parse(s: &str) -> Result<Self, LoaderError> {
        let (_, rest) = normalize_scheme(s)
            .ok_or_else(|| LoaderError::discovery(format!("not a storage URI: {s}")))?;
        let rest = rest.trim_matches('/');
        let canonical = format!("s3://{rest}");
        if canonical.len() > MAX_LEN {
            return Err(LoaderError::discovery(format!(
                "storage key exceeds {MAX_LEN} bytes: {canonical}"
            )));
        }
        Ok(StorageKey(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
