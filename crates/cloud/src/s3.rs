//! S3-backed [`ObjectStore`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use gas_core::storage::{ObjectStore, StorageError};
use tokio::io::AsyncWriteExt;

/// Error code S3 returns for a denied request.
const ACCESS_DENIED: &str = "AccessDenied";

#[derive(Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self::with_client(aws_sdk_s3::Client::new(config))
    }

    pub fn with_client(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_get_error(e, bucket, key))?;

        // Stream into a sibling file and rename, so a partial download is
        // never mistaken for a staged input.
        let partial = partial_path(dest);
        let written = match write_partial(output.body, &partial, bucket, key).await {
            Ok(written) => written,
            Err(e) => {
                discard_partial(&partial).await;
                return Err(e);
            }
        };
        if let Err(e) = tokio::fs::rename(&partial, dest).await {
            discard_partial(&partial).await;
            return Err(e.into());
        }

        tracing::debug!(bucket, key, bytes = written, dest = %dest.display(), "Downloaded object");
        Ok(())
    }

    async fn upload(&self, src: &Path, bucket: &str, key: &str) -> Result<(), StorageError> {
        tokio::fs::metadata(src).await?;
        let body = ByteStream::from_path(src)
            .await
            .map_err(|e| StorageError::Service(format!("Failed to read {}: {e}", src.display())))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.code() == Some(ACCESS_DENIED) {
                    StorageError::AccessDenied {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    StorageError::Service(DisplayErrorContext(&e).to_string())
                }
            })?;

        tracing::debug!(bucket, key, src = %src.display(), "Uploaded object");
        Ok(())
    }
}

fn classify_get_error(err: SdkError<GetObjectError>, bucket: &str, key: &str) -> StorageError {
    if let Some(service) = err.as_service_error() {
        if service.is_no_such_key() {
            return StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            };
        }
        if service.code() == Some(ACCESS_DENIED) {
            return StorageError::AccessDenied {
                bucket: bucket.to_string(),
                key: key.to_string(),
            };
        }
    }
    StorageError::Service(DisplayErrorContext(&err).to_string())
}

async fn write_partial(
    mut body: ByteStream,
    partial: &Path,
    bucket: &str,
    key: &str,
) -> Result<u64, StorageError> {
    let mut file = tokio::fs::File::create(partial).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = body
        .try_next()
        .await
        .map_err(|e| StorageError::Service(format!("Download of s3://{bucket}/{key} interrupted: {e}")))?
    {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// Remove a leftover partial download.
async fn discard_partial(partial: &Path) {
    match tokio::fs::remove_file(partial).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %partial.display(), error = %e, "Failed to remove partial download");
        }
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}
