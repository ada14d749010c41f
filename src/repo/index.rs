//! Index decorator: persists the wrapped repository's items to a JSON file.
//!
//! Items are stored with repository-relative paths and rehydrated to absolute
//! ones on load. Every successful mutation saves; the previous index survives
//! as `<path>.old`, the recovery point if a crash interrupts the write.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::media::format::Format;
use crate::media::Media;
use crate::meta::source::Source;
use crate::meta::Metadata;
use crate::repo::{Capability, Repository};

/// On-disk form of the index.
#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    items: Vec<IndexEntry>,
}

/// On-disk form of a single media item; `path` is relative to the
/// repository root.
#[derive(Debug, Serialize, Deserialize)]
struct IndexEntry {
    id: String,
    path: PathBuf,
    mime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta: Option<Metadata>,
}

/// A wrapping [`Repository`] with the [`Capability::INDEX`] capability.
pub struct IndexedRepository {
    inner: Arc<dyn Repository>,
    path: PathBuf,
    old_path: PathBuf,
    parent_path: PathBuf,
    mutate: Mutex<()>,
}

impl IndexedRepository {
    /// Wrap a repository with a persistent index at `path`, loading any
    /// existing index file into the wrapped repository.
    pub async fn open(inner: Arc<dyn Repository>, path: impl AsRef<Path>) -> Result<Self> {
        let path = std::path::absolute(path.as_ref())?;
        let parent_path = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));

        let mut old_path = path.as_os_str().to_owned();
        old_path.push(".old");

        let repo = Self {
            inner,
            path,
            old_path: PathBuf::from(old_path),
            parent_path,
            mutate: Mutex::new(()),
        };
        repo.load().await?;

        Ok(repo)
    }

    async fn load(&self) -> Result<()> {
        let load_time = Instant::now();

        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let index: IndexFile = serde_json::from_slice(&bytes)?;
        let root = self.inner.root();

        for entry in index.items {
            let abs_path = root.join(&entry.path);
            if tokio::fs::metadata(&abs_path).await.is_err() {
                warn!(
                    repo = %self.inner.id(),
                    index_path = %self.path.display(),
                    path = %abs_path.display(),
                    "non-existent index item, skipping"
                );
                continue;
            }

            self.inner
                .add(Media::new(entry.id, abs_path, entry.mime, entry.meta))
                .await?;
        }

        info!(
            repo = %self.inner.id(),
            path = %self.path.display(),
            elapsed_ms = load_time.elapsed().as_millis() as u64,
            "finished index load"
        );
        Ok(())
    }

    async fn save(&self) -> Result<()> {
        let save_time = Instant::now();
        let root = self.inner.root();

        let mut entries = Vec::new();
        for item in self.inner.items().await {
            let rel_path = item
                .path
                .strip_prefix(root)
                .map_err(|_| Error::InvalidMediaPath {
                    path: item.path.clone(),
                    root: root.to_path_buf(),
                })?;

            entries.push(IndexEntry {
                id: item.id,
                path: rel_path.to_path_buf(),
                mime: item.mime,
                meta: item.meta,
            });
        }

        let bytes = serde_json::to_vec(&IndexFile { items: entries })?;

        tokio::fs::create_dir_all(&self.parent_path).await?;
        self.backup().await?;
        tokio::fs::write(&self.path, bytes).await?;

        info!(
            repo = %self.inner.id(),
            path = %self.path.display(),
            elapsed_ms = save_time.elapsed().as_millis() as u64,
            "finished index save"
        );
        Ok(())
    }

    /// Copy the committed index to `<path>.old` before overwriting it.
    async fn backup(&self) -> Result<()> {
        match tokio::fs::copy(&self.path, &self.old_path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Repository for IndexedRepository {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn root(&self) -> &Path {
        self.inner.root()
    }

    fn capabilities(&self) -> Capability {
        self.inner.capabilities() | Capability::INDEX
    }

    async fn scan(&self) -> Result<()> {
        let _guard = self.mutate.lock().await;
        self.inner.scan().await?;
        self.save().await
    }

    async fn get(&self, id: &str) -> Option<Media> {
        self.inner.get(id).await
    }

    async fn find(&self, path: &Path) -> Option<Media> {
        self.inner.find(path).await
    }

    async fn add(&self, media: Media) -> Result<()> {
        let _guard = self.mutate.lock().await;
        self.inner.add(media).await?;
        self.save().await
    }

    async fn add_path(&self, path: &Path) -> Result<()> {
        let _guard = self.mutate.lock().await;
        self.inner.add_path(path).await?;
        self.save().await
    }

    async fn remove(&self, media: &Media) -> Result<()> {
        let _guard = self.mutate.lock().await;
        self.inner.remove(media).await?;
        self.save().await
    }

    async fn remove_path(&self, path: &Path) -> Result<()> {
        let _guard = self.mutate.lock().await;
        self.inner.remove_path(path).await?;
        self.save().await
    }

    async fn items(&self) -> Vec<Media> {
        self.inner.items().await
    }

    async fn remux(&self, id: &str, format: &Format) -> Result<Option<Media>> {
        self.inner.remux(id, format).await
    }

    fn source(&self) -> Arc<dyn Source> {
        self.inner.source()
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}
