//! Media repositories.
//!
//! A repository is an ID- and path-indexed collection of media discovered
//! under a root directory. Capabilities (watch, index, remux, transcode) are
//! added by wrapping a repository in a decorator; each layer preserves the
//! contract of the one below and ORs its capability bit upward.

pub mod index;
pub mod mux;
pub mod watch;

use std::collections::HashMap;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::media::format::Format;
use crate::media::{is_hidden, mime, sanitize_id, valid_id, Media};
use crate::meta::source::Source;

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// A bitmask of repository capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capability(u8);

impl Capability {
    /// No capabilities.
    pub const NONE: Capability = Capability(0);
    /// The repository watches for filesystem changes.
    pub const WATCH: Capability = Capability(1 << 0);
    /// The repository persists its contents.
    pub const INDEX: Capability = Capability(1 << 1);
    /// The repository can remux media.
    pub const REMUX: Capability = Capability(1 << 2);
    /// The repository can transcode media.
    pub const TRANSCODE: Capability = Capability(1 << 3);

    /// Whether any bit of `flag` is set in this capability.
    pub fn has(self, flag: Capability) -> bool {
        self.0 & flag.0 != 0
    }

    /// The names of all set bits.
    pub fn names(self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.has(Capability::WATCH) {
            names.push("watch");
        }
        if self.has(Capability::INDEX) {
            names.push("index");
        }
        if self.has(Capability::REMUX) {
            names.push("remux");
        }
        if self.has(Capability::TRANSCODE) {
            names.push("transcode");
        }
        names
    }
}

impl BitOr for Capability {
    type Output = Capability;

    fn bitor(self, rhs: Capability) -> Capability {
        Capability(self.0 | rhs.0)
    }
}

impl BitOrAssign for Capability {
    fn bitor_assign(&mut self, rhs: Capability) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Capability {
    type Output = Capability;

    fn bitand(self, rhs: Capability) -> Capability {
        Capability(self.0 & rhs.0)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names().join("|"))
    }
}

// ---------------------------------------------------------------------------
// Repository trait
// ---------------------------------------------------------------------------

/// A media repository.
///
/// All operations are safe to invoke from multiple tasks concurrently.
#[async_trait]
pub trait Repository: Send + Sync {
    /// The repository ID (`[a-z0-9-_]`).
    fn id(&self) -> &str;

    /// The repository display name.
    fn name(&self) -> &str;

    /// The absolute path of the repository root directory.
    fn root(&self) -> &Path;

    /// The capabilities of this repository.
    fn capabilities(&self) -> Capability;

    /// Recursively discover missing media under the root directory.
    async fn scan(&self) -> Result<()>;

    /// Get media by ID.
    async fn get(&self, id: &str) -> Option<Media>;

    /// Find media by absolute or repository-relative path.
    async fn find(&self, path: &Path) -> Option<Media>;

    /// Add media to the repository.
    async fn add(&self, media: Media) -> Result<()>;

    /// Add the media file at the supplied path to the repository.
    async fn add_path(&self, path: &Path) -> Result<()>;

    /// Remove media from the repository. A no-op when absent.
    async fn remove(&self, media: &Media) -> Result<()>;

    /// Remove media with the supplied path from the repository.
    /// A no-op when absent.
    async fn remove_path(&self, path: &Path) -> Result<()>;

    /// Snapshot all media in this repository (order unspecified).
    async fn items(&self) -> Vec<Media>;

    /// Remux media into the target container format.
    ///
    /// Returns `None` when no media has the ID. Fails with
    /// [`Error::UnsupportedOperation`] unless a layer provides the remux
    /// capability.
    async fn remux(&self, id: &str, format: &Format) -> Result<Option<Media>>;

    /// The metadata source of this repository.
    fn source(&self) -> Arc<dyn Source>;

    /// Tear down watchers and flush any open resources.
    /// The repository must not be used afterwards.
    async fn close(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Base repository
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Indices {
    by_id: HashMap<String, Media>,
    // Keyed by path relative to the repository root.
    by_path: HashMap<PathBuf, Media>,
}

impl Indices {
    fn insert(&mut self, rel_path: PathBuf, media: Media) {
        self.by_id.insert(media.id.clone(), media.clone());
        self.by_path.insert(rel_path, media);
    }

    fn remove(&mut self, id: &str, rel_path: &Path) -> bool {
        let removed = self.by_id.remove(id).is_some();
        self.by_path.remove(rel_path);
        removed
    }
}

/// The base repository: an in-memory store populated by scanning the root
/// directory. Carries no capabilities of its own.
pub struct CrudRepository {
    id: String,
    name: String,
    root: PathBuf,
    source: Arc<dyn Source>,
    items: RwLock<Indices>,
}

impl CrudRepository {
    /// Create a repository rooted at `path`, creating the directory if
    /// missing. Fails when `id` is not a valid repository ID.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        path: impl AsRef<Path>,
        source: Arc<dyn Source>,
    ) -> Result<Self> {
        let id = id.into();
        if !valid_id(&id) {
            return Err(Error::InvalidId { id });
        }

        let root = std::path::absolute(path.as_ref())?;
        std::fs::create_dir_all(&root)?;

        Ok(Self {
            id,
            name: name.into(),
            root,
            source,
            items: RwLock::new(Indices::default()),
        })
    }

    /// Relativize a path against the repository root.
    fn relativize<'a>(&self, path: &'a Path) -> Result<&'a Path> {
        if path.is_relative() {
            return Ok(path);
        }

        path.strip_prefix(&self.root)
            .map_err(|_| Error::InvalidMediaPath {
                path: path.to_path_buf(),
                root: self.root.clone(),
            })
    }

    /// Detect the MIME type of a file and gate it on the allowed groups.
    fn detect_and_check_mime(&self, path: &Path) -> Result<String> {
        let mime = mime::detect_file(path)?;
        if !mime::is_media(&mime) {
            return Err(Error::InvalidMediaType {
                path: path.to_path_buf(),
                mime,
            });
        }

        Ok(mime)
    }

    /// Insert under both indices after uniqueness checks.
    async fn add_inner(&self, media: Media) -> Result<()> {
        if !valid_id(&media.id) {
            return Err(Error::InvalidId {
                id: media.id.clone(),
            });
        }

        let rel_path = self.relativize(&media.path)?.to_path_buf();

        let mut items = self.items.write().await;
        if items.by_id.contains_key(&media.id) {
            return Err(Error::DuplicateId {
                id: media.id.clone(),
                repo: self.id.clone(),
            });
        }
        if items.by_path.contains_key(&rel_path) {
            return Err(Error::DuplicatePath {
                path: rel_path,
                repo: self.id.clone(),
            });
        }

        info!(
            repo = %self.id,
            id = %media.id,
            path = %rel_path.display(),
            "added media to repository"
        );
        items.insert(rel_path, media);

        Ok(())
    }
}

#[async_trait]
impl Repository for CrudRepository {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn capabilities(&self) -> Capability {
        Capability::NONE
    }

    async fn scan(&self) -> Result<()> {
        let scan_time = Instant::now();
        let mut items = self.items.write().await;

        let walker = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()));
        for entry in walker {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let rel_path = self.relativize(path)?;
            if items.by_path.contains_key(rel_path) {
                continue;
            }

            let mime = match self.detect_and_check_mime(path) {
                Ok(mime) => mime,
                Err(Error::InvalidMediaType { mime, .. }) => {
                    warn!(
                        repo = %self.id,
                        path = %rel_path.display(),
                        %mime,
                        "invalid MIME type, skipping"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };

            let meta = self.source.from_file(path).await?;
            let id = sanitize_id(&entry.file_name().to_string_lossy());
            if items.by_id.contains_key(&id) {
                warn!(
                    repo = %self.id,
                    %id,
                    path = %rel_path.display(),
                    "media id already taken, skipping"
                );
                continue;
            }

            let rel_path = rel_path.to_path_buf();
            items.insert(rel_path, Media::new(id, path, mime, meta));
        }

        info!(
            repo = %self.id,
            path = %self.root.display(),
            elapsed_ms = scan_time.elapsed().as_millis() as u64,
            "finished repository scan"
        );
        Ok(())
    }

    async fn get(&self, id: &str) -> Option<Media> {
        self.items.read().await.by_id.get(id).cloned()
    }

    async fn find(&self, path: &Path) -> Option<Media> {
        let rel_path = self.relativize(path).ok()?;
        self.items.read().await.by_path.get(rel_path).cloned()
    }

    async fn add(&self, media: Media) -> Result<()> {
        if !mime::is_media(&media.mime) {
            return Err(Error::InvalidMediaType {
                path: media.path.clone(),
                mime: media.mime.clone(),
            });
        }

        self.add_inner(media).await
    }

    async fn add_path(&self, path: &Path) -> Result<()> {
        let path = std::path::absolute(path)?;
        let mime = self.detect_and_check_mime(&path)?;
        let meta = self.source.from_file(&path).await?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let id = sanitize_id(&name);

        self.add_inner(Media::new(id, path, mime, meta)).await
    }

    async fn remove(&self, media: &Media) -> Result<()> {
        let Ok(rel_path) = self.relativize(&media.path) else {
            return Ok(()); // fast path: not under this repository
        };

        let mut items = self.items.write().await;
        if items.remove(&media.id, rel_path) {
            info!(
                repo = %self.id,
                id = %media.id,
                path = %rel_path.display(),
                "removed media from repository"
            );
        }

        Ok(())
    }

    async fn remove_path(&self, path: &Path) -> Result<()> {
        let Ok(rel_path) = self.relativize(path) else {
            return Ok(()); // fast path: not under this repository
        };

        let mut items = self.items.write().await;
        let Some(media) = items.by_path.get(rel_path).cloned() else {
            return Ok(()); // fast path: path not in repository
        };

        items.remove(&media.id, rel_path);
        info!(
            repo = %self.id,
            id = %media.id,
            path = %rel_path.display(),
            "removed media from repository"
        );

        Ok(())
    }

    async fn items(&self) -> Vec<Media> {
        self.items.read().await.by_id.values().cloned().collect()
    }

    async fn remux(&self, _id: &str, _format: &Format) -> Result<Option<Media>> {
        Err(Error::UnsupportedOperation { operation: "remux" })
    }

    fn source(&self) -> Arc<dyn Source> {
        self.source.clone()
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
