//! S3 URI parsing
//!
//! Handles parsing of remote locations in the format: s3://bucket/key
//! Local paths are passed through as-is by the CLI.

use std::path::Path;

use crate::error::{Error, Result};

const SCHEME: &str = "s3://";

/// A parsed remote location pointing to an S3 object or key prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Uri {
    /// Bucket name
    pub bucket: String,
    /// Object key or key prefix
    pub key: String,
}

impl S3Uri {
    /// Create a new S3Uri
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Whether the key names a prefix (directory semantics)
    pub fn is_prefix(&self) -> bool {
        self.key.ends_with('/')
    }

    /// Last path segment of the key
    pub fn base_name(&self) -> &str {
        let key = self.key.trim_end_matches('/');
        key.rsplit('/').next().unwrap_or(key)
    }

    /// Resolve the destination key for an uploaded local file
    ///
    /// A prefix destination gets the local file name appended.
    pub fn resolve_key(&self, local: &Path) -> String {
        if self.is_prefix() {
            let file_name = local
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!("{}{}", self.key, file_name)
        } else {
            self.key.clone()
        }
    }
}

impl std::fmt::Display for S3Uri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{SCHEME}{}/{}", self.bucket, self.key)
    }
}

/// Parse an S3 URI of the form `s3://bucket/key`
pub fn parse_s3_uri(uri: &str) -> Result<S3Uri> {
    let rest = uri
        .strip_prefix(SCHEME)
        .ok_or_else(|| Error::InvalidPath(format!("{uri:?}: must start with {SCHEME}")))?;

    let (bucket, key) = rest
        .split_once('/')
        .ok_or_else(|| Error::InvalidPath(format!("{uri:?}: no key found after bucket name")))?;

    if bucket.is_empty() {
        return Err(Error::InvalidPath(format!("{uri:?}: bucket name is empty")));
    }
    if key.is_empty() {
        return Err(Error::InvalidPath(format!("{uri:?}: key is empty")));
    }

    Ok(S3Uri::new(bucket, key))
}
