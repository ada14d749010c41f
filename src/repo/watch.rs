//! Watch decorator: keeps the wrapped repository synchronized with the
//! directory tree.
//!
//! Create and write events are debounced per absolute path (file copies emit
//! bursts of writes); remove and rename events are handled immediately.
//! Subdirectories join and leave the watch set dynamically. Handler errors
//! are logged and swallowed so the event loop outlives them.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::media::format::Format;
use crate::media::{is_hidden, Media};
use crate::meta::source::Source;
use crate::repo::{Capability, Repository};

/// How long a path must stay quiet after a create/write burst before the
/// handler runs.
const DEBOUNCE: Duration = Duration::from_millis(100);

/// How often the pending map is swept for settled paths.
const SWEEP_INTERVAL: Duration = Duration::from_millis(25);

/// A wrapping [`Repository`] with the [`Capability::WATCH`] capability.
pub struct WatchedRepository {
    inner: Arc<dyn Repository>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    watched: Arc<Mutex<HashSet<PathBuf>>>,
    cancel: CancellationToken,
}

impl WatchedRepository {
    /// Wrap a repository with a filesystem watcher. Registers a watch on
    /// every non-hidden subdirectory and spawns the event loop.
    pub fn new(inner: Arc<dyn Repository>) -> Result<Arc<Self>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                let _ = tx.send(res);
            })?;

        let mut watched = HashSet::new();
        let walker = WalkDir::new(inner.root())
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()));
        for entry in walker {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_dir() {
                watcher.watch(entry.path(), RecursiveMode::NonRecursive)?;
                watched.insert(entry.path().to_path_buf());
            }
        }

        let repo = Arc::new(Self {
            inner,
            watcher: Mutex::new(Some(watcher)),
            watched: Arc::new(Mutex::new(watched)),
            cancel: CancellationToken::new(),
        });

        tokio::spawn(repo.clone().run(rx));
        Ok(repo)
    }

    /// The filesystem event loop: debounces upserts, handles removals
    /// immediately, exits on close or when the watcher goes away.
    async fn run(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    ) {
        let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = rx.recv() => match event {
                    None => break,
                    Some(Err(e)) => {
                        error!(
                            repo = %self.inner.id(),
                            path = %self.inner.root().display(),
                            error = %e,
                            "filesystem watch error"
                        );
                    }
                    Some(Ok(event)) => self.dispatch(event, &mut pending).await,
                },
                _ = sweep.tick() => {
                    let now = Instant::now();
                    let settled: Vec<PathBuf> = pending
                        .iter()
                        .filter(|(_, at)| now.duration_since(**at) >= DEBOUNCE)
                        .map(|(path, _)| path.clone())
                        .collect();

                    for path in settled {
                        pending.remove(&path);
                        self.handle_upsert(&path).await;
                    }
                }
            }
        }

        debug!(repo = %self.inner.id(), "filesystem event loop stopped");
    }

    /// Route a notify event. Paths are always absolute because the watch
    /// registrations are.
    async fn dispatch(&self, event: notify::Event, pending: &mut HashMap<PathBuf, Instant>) {
        match event.kind {
            EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Modify(ModifyKind::Other)
            | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                for path in event.paths {
                    if self.excluded(&path) {
                        continue;
                    }
                    pending.insert(path, Instant::now());
                }
            }
            EventKind::Remove(_)
            | EventKind::Modify(ModifyKind::Name(RenameMode::From))
            | EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => {
                for path in event.paths {
                    if self.excluded(&path) {
                        continue;
                    }
                    pending.remove(&path);
                    self.handle_remove(&path).await;
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                // paths = [from, to]
                if let Some(from) = event.paths.first() {
                    if !self.excluded(from) {
                        pending.remove(from);
                        self.handle_remove(from).await;
                    }
                }
                if let Some(to) = event.paths.get(1) {
                    if !self.excluded(to) {
                        pending.insert(to.clone(), Instant::now());
                    }
                }
            }
            _ => {}
        }
    }

    fn excluded(&self, path: &Path) -> bool {
        if is_hidden(path) {
            debug!(
                repo = %self.inner.id(),
                path = %path.display(),
                "ignored filesystem event, excluded file name"
            );
            return true;
        }

        false
    }

    /// A path settled after a create/write burst: watch it if it is a
    /// directory, index it otherwise.
    async fn handle_upsert(&self, path: &Path) {
        let is_dir = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.is_dir(),
            Err(e) => {
                debug!(
                    repo = %self.inner.id(),
                    path = %path.display(),
                    error = %e,
                    "path vanished before debounce fired"
                );
                return;
            }
        };

        if is_dir {
            if let Err(e) = self.watch_dir(path) {
                error!(
                    repo = %self.inner.id(),
                    path = %path.display(),
                    error = %e,
                    "failed to watch new directory"
                );
            }
            return;
        }

        if let Err(e) = self.inner.add_path(path).await {
            warn!(
                repo = %self.inner.id(),
                path = %path.display(),
                error = %e,
                "filesystem event handler error"
            );
        }
    }

    /// A path disappeared: unwatch it if it was a watched directory,
    /// unindex it otherwise.
    async fn handle_remove(&self, path: &Path) {
        if self.watched.lock().remove(path) {
            info!(
                repo = %self.inner.id(),
                path = %path.display(),
                "removing filesystem watcher from directory"
            );
            if let Some(watcher) = self.watcher.lock().as_mut() {
                // The directory is already gone, the unwatch may fail along with it.
                let _ = watcher.unwatch(path);
            }
            return;
        }

        if let Err(e) = self.inner.remove_path(path).await {
            warn!(
                repo = %self.inner.id(),
                path = %path.display(),
                error = %e,
                "filesystem event handler error"
            );
        }
    }

    fn watch_dir(&self, path: &Path) -> Result<()> {
        info!(
            repo = %self.inner.id(),
            path = %path.display(),
            "adding filesystem watcher to directory"
        );

        let mut guard = self.watcher.lock();
        let watcher = guard
            .as_mut()
            .ok_or(Error::UnsupportedOperation { operation: "watch" })?;
        watcher.watch(path, RecursiveMode::NonRecursive)?;
        self.watched.lock().insert(path.to_path_buf());

        Ok(())
    }
}

#[async_trait]
impl Repository for WatchedRepository {
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
        self.inner.capabilities() | Capability::WATCH
    }

    async fn scan(&self) -> Result<()> {
        self.inner.scan().await
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
        self.inner.remove(media).await
    }

    async fn remove_path(&self, path: &Path) -> Result<()> {
        self.inner.remove_path(path).await
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
        if self.cancel.is_cancelled() {
            return Ok(()); // already closed
        }

        self.cancel.cancel();
        self.watcher.lock().take();
        self.inner.close().await
    }
}
