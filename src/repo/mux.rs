//! Mux decorator: content-addressed remux cache.
//!
//! Conversions land in `<cache>/remux/<fingerprint>.<ext>` where the
//! fingerprint is the MD5 of the first mebibyte of the source concatenated
//! with its little-endian size, so unchanged inputs reuse outputs across
//! restarts. Concurrent conversions of the same source collapse into one via
//! the keyed mutex; scanning garbage-collects cache files whose source left
//! the repository.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::av::Remuxer;
use crate::error::{Error, Result};
use crate::media::format::Format;
use crate::media::Media;
use crate::meta::source::Source;
use crate::repo::{Capability, Repository};
use crate::sync::KeyedMutex;

/// How much of the file head goes into the fingerprint.
const FINGERPRINT_HEAD: u64 = 1024 * 1024;

/// The capability bits this decorator can carry.
const CAP_MASK: Capability = Capability(Capability::REMUX.0 | Capability::TRANSCODE.0);

/// The file name without its final extension, the shape cache entries are
/// named in.
fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Content fingerprint of a media file: MD5 over the first mebibyte and the
/// little-endian file size.
pub async fn fingerprint(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let size = file.metadata().await?.len() as i64;

    let mut hasher = Md5::new();
    let mut head = (&mut file).take(FINGERPRINT_HEAD);
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = head.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    hasher.update(size.to_le_bytes());

    Ok(hex::encode(hasher.finalize()))
}

/// A wrapping [`Repository`] with the remux (and optionally transcode)
/// capability.
pub struct MuxRepository {
    inner: Arc<dyn Repository>,
    caps: Capability,
    remux_path: Option<PathBuf>,
    transcode_path: Option<PathBuf>,
    remuxer: Arc<dyn Remuxer>,
    locks: KeyedMutex,
}

impl MuxRepository {
    /// Wrap a repository with a mux cache rooted at `cache_path`, creating
    /// the per-capability subdirectories on demand.
    pub fn new(
        inner: Arc<dyn Repository>,
        caps: Capability,
        cache_path: impl AsRef<Path>,
        remuxer: Arc<dyn Remuxer>,
    ) -> Result<Self> {
        let caps = caps & CAP_MASK;
        let cache_path = std::path::absolute(cache_path.as_ref())?;
        std::fs::create_dir_all(&cache_path)?;

        let remux_path = caps
            .has(Capability::REMUX)
            .then(|| cache_path.join("remux"));
        if let Some(path) = &remux_path {
            std::fs::create_dir_all(path)?;
        }

        let transcode_path = caps
            .has(Capability::TRANSCODE)
            .then(|| cache_path.join("transcode"));
        if let Some(path) = &transcode_path {
            std::fs::create_dir_all(path)?;
        }

        Ok(Self {
            inner,
            caps,
            remux_path,
            transcode_path,
            remuxer,
            locks: KeyedMutex::new(),
        })
    }

    fn cache_dirs(&self) -> impl Iterator<Item = &PathBuf> {
        self.remux_path.iter().chain(self.transcode_path.iter())
    }

    /// All cache files across the remux and transcode directories.
    async fn cache_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for dir in self.cache_dirs() {
            let mut entries = tokio::fs::read_dir(dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_file() {
                    files.push(entry.path());
                }
            }
        }

        Ok(files)
    }

    /// Delete a cache file under its keyed lock so the deletion cannot race
    /// an in-flight conversion writing it.
    async fn delete_cache_file(&self, file: &Path) -> Result<()> {
        let key = file.to_string_lossy().into_owned();
        self.locks
            .locked(&key, async {
                match tokio::fs::remove_file(file).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(Error::from(e)),
                }
            })
            .await
    }

    /// Delete every cache file named after the given fingerprint.
    async fn remove_cached(&self, fingerprint: &str) -> Result<()> {
        for file in self.cache_files().await? {
            if file_stem(&file) != fingerprint {
                continue;
            }

            self.delete_cache_file(&file).await?;
            info!(
                repo = %self.inner.id(),
                path = %file.display(),
                "removed cache file"
            );
        }

        Ok(())
    }

    /// Fingerprint of the source behind a removal, if it can still be read.
    async fn removal_fingerprint(&self, path: &Path) -> Option<String> {
        match fingerprint(path).await {
            Ok(fp) => Some(fp),
            Err(e) => {
                // The file may already be gone; the next scan GC collects
                // whatever this leaves behind.
                debug!(
                    repo = %self.inner.id(),
                    path = %path.display(),
                    error = %e,
                    "could not fingerprint removed media"
                );
                None
            }
        }
    }
}

#[async_trait]
impl Repository for MuxRepository {
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
        self.inner.capabilities() | self.caps
    }

    async fn scan(&self) -> Result<()> {
        self.inner.scan().await?;

        // Garbage-collect cache files whose source is no longer live.
        let items = self.inner.items().await;
        let mut live = HashSet::with_capacity(items.len());
        for item in &items {
            live.insert(fingerprint(&item.path).await?);
        }

        for file in self.cache_files().await? {
            if live.contains(&file_stem(&file)) {
                continue;
            }

            self.delete_cache_file(&file).await?;
            info!(
                repo = %self.inner.id(),
                path = %file.display(),
                "removed unused cache file"
            );
        }

        Ok(())
    }

    async fn get(&self, id: &str) -> Option<Media> {
        self.inner.get(id).await
    }

    async fn find(&self, path: &Path) -> Option<Media> {
        self.inner.find(path).await
    }

    async fn add(&self, media: Media) -> Result<()> {
        self.inner.add(media).await
    }

    async fn add_path(&self, path: &Path) -> Result<()> {
        self.inner.add_path(path).await
    }

    async fn remove(&self, media: &Media) -> Result<()> {
        let fp = self.removal_fingerprint(&media.path).await;
        self.inner.remove(media).await?;

        match fp {
            Some(fp) => self.remove_cached(&fp).await,
            None => Ok(()),
        }
    }

    async fn remove_path(&self, path: &Path) -> Result<()> {
        let fp = self.removal_fingerprint(path).await;
        self.inner.remove_path(path).await?;

        match fp {
            Some(fp) => self.remove_cached(&fp).await,
            None => Ok(()),
        }
    }

    async fn items(&self) -> Vec<Media> {
        self.inner.items().await
    }

    async fn remux(&self, id: &str, format: &Format) -> Result<Option<Media>> {
        let Some(media) = self.inner.get(id).await else {
            return Ok(None);
        };

        // FAST PATH: the source container already matches.
        if media.mime == format.mime {
            return Ok(Some(media));
        }

        let Some(remux_path) = &self.remux_path else {
            return Err(Error::UnsupportedOperation { operation: "remux" });
        };

        let fp = fingerprint(&media.path).await?;
        let dst = remux_path.join(format!("{fp}.{}", format.extension));

        let key = media.path.to_string_lossy().into_owned();
        self.locks
            .locked(&key, async {
                let relocated = media.relocated(&dst, format.mime.to_string());
                if tokio::fs::try_exists(&dst).await? {
                    return Ok(Some(relocated)); // already remuxed
                }

                if !self.remuxer.supports(format) {
                    return Err(Error::UnsupportedFormat {
                        format: format.name.to_string(),
                        operation: "muxing",
                    });
                }

                self.remuxer.remux(&media.path, &dst, format).await?;
                info!(
                    repo = %self.inner.id(),
                    id = %media.id,
                    format = %format.name,
                    dst = %dst.display(),
                    "remuxed media"
                );

                Ok(Some(relocated))
            })
            .await
    }

    fn source(&self) -> Arc<dyn Source> {
        self.inner.source()
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}
