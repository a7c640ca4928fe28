//! Multipart upload session lifecycle
//!
//! A session is created once, accumulates one server tag per part in strict
//! part-number order, and is then either completed or aborted exactly once.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Error, Result, SessionStage};
use crate::traits::{CompletedPart, ObjectMetadata, ObjectStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Open,
    Completed,
    Aborted,
}

/// Controller for one multipart upload
pub struct MultipartSession {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    key: String,
    upload_id: String,
    parts: Vec<CompletedPart>,
    phase: Phase,
}

impl std::fmt::Debug for MultipartSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultipartSession")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("upload_id", &self.upload_id)
            .field("parts", &self.parts.len())
            .field("phase", &self.phase)
            .finish()
    }
}

impl MultipartSession {
    /// Start a new session on the server
    pub async fn create(
        store: Arc<dyn ObjectStore>,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> Result<Self> {
        let upload_id = store
            .create_multipart(bucket, key, metadata)
            .await
            .map_err(|e| Error::session(SessionStage::Create, e))?;
        info!(bucket, key, upload_id = %upload_id, "multipart session created");

        Ok(Self {
            store,
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id,
            parts: Vec::new(),
            phase: Phase::Open,
        })
    }

    /// Server-assigned upload id
    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    /// Parts accepted so far, in part-number order
    pub fn completed_parts(&self) -> &[CompletedPart] {
        &self.parts
    }

    /// Part number the next `upload_part` call must use
    pub fn next_part_number(&self) -> i32 {
        self.parts.len() as i32 + 1
    }

    /// Upload one part and record its tag
    ///
    /// Parts must arrive contiguously starting from 1.
    pub async fn upload_part(&mut self, part_number: i32, data: Vec<u8>) -> Result<String> {
        self.ensure_open()?;
        if part_number != self.next_part_number() {
            return Err(Error::InvalidJob(format!(
                "part {part_number} out of order, expected part {}",
                self.next_part_number()
            )));
        }

        let etag = self
            .store
            .upload_part(&self.bucket, &self.key, &self.upload_id, part_number, data)
            .await?;
        debug!(part_number, etag = %etag, "part uploaded");

        self.parts.push(CompletedPart {
            part_number,
            etag: etag.clone(),
        });
        Ok(etag)
    }

    /// Submit the ordered part list and finish the upload
    pub async fn complete(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.store
            .complete_multipart(&self.bucket, &self.key, &self.upload_id, &self.parts)
            .await
            .map_err(|e| Error::session(SessionStage::Complete, e))?;
        self.phase = Phase::Completed;
        info!(upload_id = %self.upload_id, parts = self.parts.len(), "multipart session completed");
        Ok(())
    }

    /// Discard the session and its uploaded parts
    ///
    /// Callers on a failure path treat this as best-effort cleanup and
    /// report, rather than propagate, its error.
    pub async fn abort(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.phase = Phase::Aborted;
        self.store
            .abort_multipart(&self.bucket, &self.key, &self.upload_id)
            .await
            .map_err(|e| Error::session(SessionStage::Abort, e))?;
        info!(upload_id = %self.upload_id, "multipart session aborted");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        match self.phase {
            Phase::Open => Ok(()),
            Phase::Completed => Err(Error::General(format!(
                "multipart session {} already completed",
                self.upload_id
            ))),
            Phase::Aborted => Err(Error::General(format!(
                "multipart session {} already aborted",
                self.upload_id
            ))),
        }
    }
}
