use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::storage::{ObjectStore, StorageError};

/// An [`ObjectStore`] backed by a map of `(bucket, key)` to bytes.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<(String, String), Vec<u8>>>,
    /// Uploads whose key ends with one of these suffixes fail.
    failing_upload_suffixes: RwLock<Vec<String>>,
    downloads_unavailable: AtomicBool,
    uploads: AtomicUsize,
    downloads: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object.
    pub async fn put_object(&self, bucket: &str, key: &str, bytes: impl Into<Vec<u8>>) {
        self.objects
            .write()
            .await
            .insert((bucket.to_string(), key.to_string()), bytes.into());
    }

    pub async fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Make every upload to a key ending in `suffix` fail.
    pub async fn fail_uploads_ending_with(&self, suffix: &str) {
        self.failing_upload_suffixes
            .write()
            .await
            .push(suffix.to_string());
    }

    /// Clear injected upload failures.
    pub async fn heal_uploads(&self) {
        self.failing_upload_suffixes.write().await.clear();
    }

    /// Toggle a simulated network outage for downloads.
    pub fn set_downloads_unavailable(&self, unavailable: bool) {
        self.downloads_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of successful uploads.
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Number of successful downloads.
    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), StorageError> {
        if self.downloads_unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Service("injected download outage".to_string()));
        }
        let bytes = self
            .object(bucket, key)
            .await
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;
        tokio::fs::write(dest, bytes).await?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upload(&self, src: &Path, bucket: &str, key: &str) -> Result<(), StorageError> {
        let failing = self
            .failing_upload_suffixes
            .read()
            .await
            .iter()
            .any(|suffix| key.ends_with(suffix.as_str()));
        if failing {
            return Err(StorageError::Service(format!("injected upload failure for {key}")));
        }
        let bytes = tokio::fs::read(src).await?;
        self.put_object(bucket, key, bytes).await;
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
