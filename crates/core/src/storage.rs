//! Object storage capability.
//!
//! Objects are addressed by `(bucket, key)`. Uploads overwrite, so
//! re-uploading an identical artifact is harmless.

use std::path::Path;

use async_trait::async_trait;

/// Errors returned by an [`ObjectStore`].
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Access denied: s3://{bucket}/{key}")]
    AccessDenied { bucket: String, key: String },

    #[error("Local file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object storage error: {0}")]
    Service(String),
}

/// Download and upload of whole objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write the object at `(bucket, key)` to the local file `dest`,
    /// replacing it if it exists.
    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), StorageError>;

    /// Store the local file `src` at `(bucket, key)`.
    async fn upload(&self, src: &Path, bucket: &str, key: &str) -> Result<(), StorageError>;
}
