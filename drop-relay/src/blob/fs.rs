//! Filesystem blob store.

use super::{BlobStore, HandleStage};
use crate::error::BlobError;
use async_trait::async_trait;
use bytes::Bytes;
use drop_types::{BlobLocator, FetchHandle, PhotoMime, Timestamp};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::io::AsyncWriteExt;

/// Blob store keeping each blob as a file under a root directory.
///
/// A locator such as `photos/ABCDE/<id>.png` maps to the same relative path
/// under the root. Writes go to a hidden temporary file first and are
/// renamed into place, so a reader never sees a half-written blob. The
/// temporary file is removed if the write fails or is abandoned.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    handles: HandleStage,
}

impl FsBlobStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn new(root: impl Into<PathBuf>, handles: HandleStage) -> Result<Self, BlobError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        tracing::info!("Filesystem blob store rooted at {}", root.display());
        Ok(Self { root, handles })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a locator to a path, refusing anything that could escape the root.
    fn path_for(&self, locator: &BlobLocator) -> Result<PathBuf, BlobError> {
        let invalid = || BlobError::InvalidLocator {
            locator: locator.to_string(),
        };
        let mut path = self.root.clone();
        for segment in locator.as_str().split('/') {
            let allowed = !segment.is_empty()
                && segment != "."
                && segment != ".."
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
            if !allowed {
                return Err(invalid());
            }
            path.push(segment);
        }
        Ok(path)
    }
}

fn modified_at(metadata: &std::fs::Metadata) -> Option<Timestamp> {
    let since_epoch = metadata.modified().ok()?.duration_since(UNIX_EPOCH).ok()?;
    i64::try_from(since_epoch.as_millis()).ok().map(Timestamp::from_millis)
}

/// Content type implied by a blob's extension.
fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => PhotoMime::Png.as_mime_type(),
        Some("jpg") | Some("jpeg") => PhotoMime::Jpeg.as_mime_type(),
        Some("webp") => PhotoMime::Webp.as_mime_type(),
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put_blob(
        &self,
        locator: &BlobLocator,
        bytes: Bytes,
        _content_type: &str,
    ) -> Result<(), BlobError> {
        let path = self.path_for(locator)?;
        let parent = path.parent().ok_or_else(|| BlobError::InvalidLocator {
            locator: locator.to_string(),
        })?;
        tokio::fs::create_dir_all(parent).await?;

        // Deleted when dropped, including when this future is.
        let tmp = tempfile::Builder::new()
            .prefix(".")
            .suffix(".tmp")
            .tempfile_in(parent)?;
        let mut file = tokio::fs::File::from_std(tmp.as_file().try_clone()?);
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);
        tmp.persist(&path).map_err(|e| e.error)?;

        tracing::debug!("Stored blob {} ({} bytes)", locator, bytes.len());
        Ok(())
    }

    async fn get_blob_handle(&self, locator: &BlobLocator) -> Result<FetchHandle, BlobError> {
        let path = self.path_for(locator)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BlobError::NotFound {
                    locator: locator.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        Ok(self.handles.stage(Bytes::from(bytes), content_type_for(&path)))
    }

    async fn delete_blob(&self, locator: &BlobLocator) -> Result<(), BlobError> {
        let path = self.path_for(locator)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        // Drop the per-code directory once it is empty; failure just means
        // something else still lives there.
        if let Some(parent) = path.parent() {
            if parent != self.root {
                let _ = tokio::fs::remove_dir(parent).await;
            }
        }
        Ok(())
    }

    async fn contains(&self, locator: &BlobLocator) -> Result<bool, BlobError> {
        let path = self.path_for(locator)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn list_older_than(&self, cutoff: Timestamp) -> Result<Vec<BlobLocator>, BlobError> {
        let mut found = Vec::new();
        let mut pending = vec![(self.root.clone(), String::new())];

        while let Some((dir, prefix)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let Ok(name) = entry.file_name().into_string() else {
                    continue;
                };
                // Temporary files of in-flight writes
                if name.starts_with('.') {
                    continue;
                }
                // Gone since the directory was read
                let Ok(metadata) = entry.metadata().await else {
                    continue;
                };
                let relative = if prefix.is_empty() {
                    name
                } else {
                    format!("{prefix}/{name}")
                };
                if metadata.is_dir() {
                    pending.push((entry.path(), relative));
                } else if modified_at(&metadata).is_some_and(|at| at < cutoff) {
                    if let Ok(locator) = BlobLocator::new(relative) {
                        found.push(locator);
                    }
                }
            }
        }
        Ok(found)
    }

    fn handles(&self) -> &HandleStage {
        &self.handles
    }
}
