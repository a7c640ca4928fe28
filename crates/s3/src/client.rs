//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the ObjectStore trait from sc-core.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as S3CompletedPart};
use aws_smithy_types::byte_stream::ByteStream;
use tracing::debug;

use sc_core::{CompletedPart, ConnectionOptions, Error, ObjectMetadata, ObjectStore, Result};

/// S3 client wrapper
pub struct S3Client {
    inner: aws_sdk_s3::Client,
    options: ConnectionOptions,
}

impl std::fmt::Debug for S3Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Client")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl S3Client {
    /// Create a client from the default credential chain
    ///
    /// `options` selects the profile, region and endpoint; unset fields fall
    /// back to the environment and shared config files.
    pub async fn connect(options: &ConnectionOptions) -> Result<Self> {
        options.validate()?;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(profile) = &options.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = &options.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        let config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&config);
        if let Some(endpoint) = &options.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        let s3_config = builder.force_path_style(options.path_style).build();

        debug!(
            profile = ?options.profile,
            region = ?options.region,
            endpoint = ?options.endpoint,
            "S3 client connected"
        );

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
            options: options.clone(),
        })
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }

    /// Connection options this client was built from
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }
}

fn user_metadata(metadata: &ObjectMetadata) -> Option<HashMap<String, String>> {
    (!metadata.user.is_empty()).then(|| {
        metadata
            .user
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    })
}

fn map_sdk_error<E>(err: SdkError<E>, target: &str) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.code().map(str::to_string);
    classify(
        code.as_deref(),
        status,
        target,
        &DisplayErrorContext(&err).to_string(),
    )
}

/// Object size from a HEAD response's `Content-Length`
fn object_size(content_length: Option<i64>, target: &str) -> Result<u64> {
    let length = content_length
        .ok_or_else(|| Error::General(format!("{target}: server returned no content length")))?;
    u64::try_from(length)
        .map_err(|_| Error::General(format!("{target}: invalid content length {length}")))
}

/// Map a service error code and HTTP status to an sc-core error
fn classify(code: Option<&str>, status: Option<u16>, target: &str, detail: &str) -> Error {
    match (code, status) {
        (Some("NoSuchKey" | "NoSuchBucket" | "NotFound" | "NoSuchUpload"), _) | (_, Some(404)) => {
            Error::NotFound(format!("{target}: {}", code.unwrap_or("NotFound")))
        }
        (
            Some(
                "AccessDenied"
                | "InvalidAccessKeyId"
                | "SignatureDoesNotMatch"
                | "ExpiredToken"
                | "InvalidToken",
            ),
            _,
        )
        | (_, Some(401 | 403)) => {
            Error::Auth(format!("{target}: {}", code.unwrap_or("AccessDenied")))
        }
        (
            Some("PreconditionFailed" | "ConditionalRequestConflict" | "OperationAborted"),
            _,
        )
        | (_, Some(409 | 412)) => {
            Error::Conflict(format!("{target}: {}", code.unwrap_or("PreconditionFailed")))
        }
        (Some("NotImplemented"), _) | (_, Some(501)) => {
            Error::Unsupported(format!("{target}: {}", code.unwrap_or("NotImplemented")))
        }
        (_, Some(status)) => Error::Network(format!(
            "{target}: {} (HTTP {status}): {detail}",
            code.unwrap_or("request failed")
        )),
        (_, None) => Error::Network(format!("{target}: {detail}")),
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn head_size(&self, bucket: &str, key: &str) -> Result<u64> {
        let response = self
            .inner
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &format!("s3://{bucket}/{key}")))?;

        object_size(response.content_length(), &format!("s3://{bucket}/{key}"))
    }

    async fn range_get(&self, bucket: &str, key: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        let response = self
            .inner
            .get_object()
            .bucket(bucket)
            .key(key)
            .range(format!("bytes={start}-{end}"))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &format!("s3://{bucket}/{key}")))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Network(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(data)
    }

    async fn create_multipart(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> Result<String> {
        let response = self
            .inner
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .set_content_type(metadata.content_type.clone())
            .set_metadata(user_metadata(metadata))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &format!("s3://{bucket}/{key}")))?;

        response
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| Error::General("server returned no upload id".into()))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Vec<u8>,
    ) -> Result<String> {
        let response = self
            .inner
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &format!("s3://{bucket}/{key} part {part_number}")))?;

        // Quotes are kept: completion expects the tag exactly as returned
        response
            .e_tag()
            .map(str::to_string)
            .ok_or_else(|| {
                Error::General(format!("server returned no ETag for part {part_number}"))
            })
    }

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        let parts = parts
            .iter()
            .map(|p| {
                S3CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect();
        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.inner
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(upload)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &format!("s3://{bucket}/{key}")))?;

        Ok(())
    }

    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        self.inner
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &format!("s3://{bucket}/{key}")))?;

        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        metadata: &ObjectMetadata,
    ) -> Result<()> {
        let size = data.len() as i64;
        self.inner
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_length(size)
            .set_content_type(metadata.content_type.clone())
            .set_metadata(user_metadata(metadata))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &format!("s3://{bucket}/{key}")))?;

        Ok(())
    }
}
