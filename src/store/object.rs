//! Filesystem-backed object store for chunk text payloads.
//!
//! Keys follow the flat `<resource_id>/<chunk_id>.txt` layout. The
//! filesystem implementation is the local-first default; the [`ObjectStore`]
//! trait is the seam for a remote blob store.

use super::{chunk_text_key, ObjectStore};
use crate::error::{NotatError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Object store rooted at a local directory.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Resolve a reference to a path under the root, rejecting traversal.
    fn resolve(&self, text_ref: &str) -> Result<PathBuf> {
        if text_ref.is_empty()
            || text_ref.starts_with('/')
            || text_ref.split('/').any(|part| part.is_empty() || part == "..")
        {
            return Err(NotatError::ObjectStore(format!(
                "Invalid object reference: {}",
                text_ref
            )));
        }
        Ok(self.root.join(text_ref))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    #[instrument(skip(self, text), fields(resource_id = %resource_id, chunk_id = chunk_id))]
    async fn put_text(&self, resource_id: &str, chunk_id: i64, text: &str) -> Result<String> {
        let key = chunk_text_key(resource_id, chunk_id);
        let path = self.resolve(&key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write-then-rename so a concurrent reader never observes a torn
        // payload and re-puts of the same key are plain replacements.
        let tmp = path.with_extension("txt.tmp");
        tokio::fs::write(&tmp, text.as_bytes()).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!("Stored {} bytes at {}", text.len(), key);
        Ok(key)
    }

    async fn get_text(&self, text_ref: &str) -> Result<String> {
        let path = self.resolve(text_ref)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(NotatError::NotFound(
                format!("No stored text at {}", text_ref),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_text(&self, text_ref: &str) -> Result<()> {
        let path = self.resolve(text_ref)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), fields(resource_id = %resource_id))]
    async fn delete_all_for_resource(&self, resource_id: &str) -> Result<()> {
        if resource_id.is_empty() || resource_id.contains('/') || resource_id == ".." {
            return Err(NotatError::ObjectStore(format!(
                "Invalid resource id: {}",
                resource_id
            )));
        }
        let dir = self.root.join(resource_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
