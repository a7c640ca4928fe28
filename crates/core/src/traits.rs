//! ObjectStore trait definition
//!
//! This trait defines the storage operations the transfer engine consumes.
//! It allows the engine to be decoupled from the specific S3 SDK implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;

/// Metadata attached to a newly written object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Content type header
    pub content_type: Option<String>,

    /// User metadata (x-amz-meta-*)
    pub user: BTreeMap<String, String>,
}

/// A part accepted by the server, as submitted at completion time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based part number
    pub part_number: i32,

    /// Server-assigned tag (ETag) for the part
    pub etag: String,
}

/// Trait for S3-compatible storage operations used by transfers
///
/// This trait is implemented by the S3 adapter and can be mocked for testing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Size of an object in bytes
    async fn head_size(&self, bucket: &str, key: &str) -> Result<u64>;

    /// Fetch the inclusive byte range `start..=end` of an object
    async fn range_get(&self, bucket: &str, key: &str, start: u64, end: u64) -> Result<Vec<u8>>;

    /// Start a multipart upload session, returning its upload id
    async fn create_multipart(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> Result<String>;

    /// Upload one part of a session, returning the server tag
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Vec<u8>,
    ) -> Result<String>;

    /// Complete a session from its ordered part list
    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()>;

    /// Abort a session and discard its uploaded parts
    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()>;

    /// Write a whole object in one request
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        metadata: &ObjectMetadata,
    ) -> Result<()>;
}
