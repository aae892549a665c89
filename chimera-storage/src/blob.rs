//! Blob stores for generated binary payloads.

use crate::traits::{BlobStore, StorageResult};
use ::async_trait::async_trait;
use chimera_core::StorageError;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

/// Reject keys that could escape the store root.
fn validate_key(key: &str) -> StorageResult<()> {
    let path = Path::new(key);
    let ok = !key.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if ok {
        Ok(())
    } else {
        Err(StorageError::BlobWriteFailed {
            key: key.to_string(),
            reason: "key must be a relative path without '..'".to_string(),
        })
    }
}

// ============================================================================
// FILESYSTEM
// ============================================================================

/// Writes blobs under a root directory and serves them from a public base URL.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Create from environment variables.
    ///
    /// # Environment Variables
    /// - `CHIMERA_BLOB_ROOT`: Directory blobs are written under (default: `./generated`)
    /// - `CHIMERA_BLOB_PUBLIC_URL`: URL prefix for references (default: `/generated`)
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("CHIMERA_BLOB_ROOT").unwrap_or_else(|_| "./generated".to_string()),
            std::env::var("CHIMERA_BLOB_PUBLIC_URL").unwrap_or_else(|_| "/generated".to_string()),
        )
    }

    pub fn reference_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, data: &[u8], _content_type: &str) -> StorageResult<String> {
        validate_key(key)?;
        let path = self.root.join(key);
        let write_err = |e: std::io::Error| StorageError::BlobWriteFailed {
            key: key.to_string(),
            reason: e.to_string(),
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        // Write to a sibling and rename so readers never see a partial file.
        let tmp = path.with_extension("partial");
        tokio::fs::write(&tmp, data).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(write_err)?;

        tracing::debug!(key = %key, size_bytes = data.len(), "Blob written");
        Ok(self.reference_for(key))
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        match tokio::fs::read(self.root.join(key)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::query("blob_get", e)),
        }
    }
}

// ============================================================================
// MEMORY
// ============================================================================

/// Blobs kept in a hash map; references use a `memory://` scheme.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .map(|(_, ct)| ct.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> StorageResult<String> {
        validate_key(key)?;
        self.blobs
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?
            .insert(key.to_string(), (data.to_vec(), content_type.to_string()));
        Ok(format!("memory://{}", key))
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .blobs
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?
            .get(key)
            .map(|(data, _)| data.clone()))
    }
}
