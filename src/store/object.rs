//! Object-keyed result store.
//!
//! Layout under the store root:
//!
//! ```text
//! reviews/<review_id>/<component_type>.json
//! reviews/<review_id>/STATUS.json
//! ```
//!
//! Every object is written to a temporary file in its partition and renamed
//! into place, so readers only ever see complete objects.

use super::ResultStore;
use crate::error::StorageError;
use crate::models::{ComponentResult, ComponentType, ReviewId, ReviewState, ReviewStatus};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

const STATUS_OBJECT: &str = "STATUS.json";

/// Filesystem-backed store with one object per component.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: &Path) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(root.join("reviews")).await?;
        debug!("Object store rooted at {}", root.display());

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn partition(&self, review_id: &ReviewId) -> PathBuf {
        self.root.join("reviews").join(review_id.to_string())
    }

    fn object_path(&self, review_id: &ReviewId, component_type: &ComponentType) -> PathBuf {
        self.partition(review_id)
            .join(format!("{}.json", component_type.as_str()))
    }

    /// Write `bytes` to `path` via a sibling temp file and an atomic rename.
    async fn write_object(&self, path: PathBuf, bytes: Vec<u8>) -> Result<(), StorageError> {
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| StorageError::InvalidKey(path.display().to_string()))?;
        tokio::fs::create_dir_all(&dir).await?;

        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut file = NamedTempFile::new_in(&dir)?;
            file.write_all(&bytes)?;
            file.as_file().sync_all()?;
            file.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::new(ErrorKind::Other, e)))?
    }

    async fn read_object<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, StorageError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ResultStore for ObjectStore {
    async fn put(
        &self,
        review_id: &ReviewId,
        component_type: &ComponentType,
        data: &Value,
        ttl: i64,
    ) -> Result<(), StorageError> {
        let record = ComponentResult::new(*review_id, component_type.clone(), data.clone(), ttl);
        let path = self.object_path(review_id, component_type);

        self.write_object(path.clone(), serde_json::to_vec(&record)?)
            .await?;

        info!(
            "Stored result for {} in object store: {}",
            component_type,
            path.display()
        );
        Ok(())
    }

    async fn get(
        &self,
        review_id: &ReviewId,
        component_type: &ComponentType,
    ) -> Result<Option<ComponentResult>, StorageError> {
        let path = self.object_path(review_id, component_type);
        let record: Option<ComponentResult> = self.read_object(&path).await?;

        if record.is_none() {
            debug!(
                "Result not found in object store: {} for review {}",
                component_type, review_id
            );
        }
        Ok(record)
    }

    async fn get_all(&self, review_id: &ReviewId) -> Result<Vec<ComponentResult>, StorageError> {
        let partition = self.partition(review_id);

        let mut entries = match tokio::fs::read_dir(&partition).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut results = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();

            // Skip the status object, temp files and anything that isn't JSON
            if name == STATUS_OBJECT || name.starts_with('.') || !name.ends_with(".json") {
                continue;
            }

            match self.read_object::<ComponentResult>(&entry.path()).await {
                Ok(Some(record)) => results.push(record),
                // Removed between listing and reading
                Ok(None) => {}
                Err(StorageError::Serde(e)) => {
                    warn!("Skipping unreadable object {}: {}", entry.path().display(), e);
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "Retrieved {} results from object store for review {}",
            results.len(),
            review_id
        );
        Ok(results)
    }

    async fn set_status(
        &self,
        review_id: &ReviewId,
        status: ReviewState,
        message: &str,
    ) -> Result<(), StorageError> {
        let record = ReviewStatus {
            review_id: *review_id,
            status,
            message: message.to_string(),
            updated_at: Utc::now(),
        };
        let path = self.partition(review_id).join(STATUS_OBJECT);

        self.write_object(path, serde_json::to_vec(&record)?).await
    }

    async fn get_status(&self, review_id: &ReviewId) -> Result<Option<ReviewStatus>, StorageError> {
        let path = self.partition(review_id).join(STATUS_OBJECT);
        self.read_object(&path).await
    }

    fn backend_name(&self) -> &'static str {
        "object"
    }
}
