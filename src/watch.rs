//! File-system change notifications.
//!
//! The container only needs to know that something it reads may have
//! changed, every event triggers a full refresh.

use std::collections::HashSet;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::hosts::resolve_in;

const EVENTS_CAPACITY: usize = 16;

/// Error type for watcher operations.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The path to watch doesn't exist.
    #[error("path not found: {0:?}")]
    NotFound(PathBuf),

    /// The underlying watcher failed.
    #[error("file watcher failed")]
    Notify(#[from] notify::Error),
}

/// A change of one or more watched paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchEvent {
    pub paths: Vec<PathBuf>,
}

impl WatchEvent {
    pub fn new(paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

/// Trait for sources of file-system change notifications.
pub trait FsWatcher: Send + 'static {
    /// Start watching `path`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::NotFound`] if `path` doesn't exist, and
    /// [`WatchError::Notify`] if it can't be watched.
    fn add(&mut self, path: &Path) -> Result<(), WatchError>;

    /// Wait for the next change.
    ///
    /// Returns `None` once the watcher is closed.
    fn next_event(&mut self) -> impl Future<Output = Option<WatchEvent>> + Send;

    /// Stop watching, pending events are discarded.
    fn close(&mut self);
}

#[derive(Debug, Default)]
struct Targets {
    files: HashSet<PathBuf>,
    dirs: HashSet<PathBuf>,
}

impl Targets {
    fn is_relevant(&self, path: &Path) -> bool {
        self.files.contains(path)
            || self.dirs.contains(path)
            || path.parent().is_some_and(|parent| self.dirs.contains(parent))
    }
}

/// A [`FsWatcher`] backed by the platform's notification API.
///
/// Files are observed through their parent directory so that files
/// replaced or removed and recreated keep being watched.
pub struct NotifyWatcher {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
    events: mpsc::Receiver<WatchEvent>,
    targets: Arc<RwLock<Targets>>,
    watched_dirs: HashSet<PathBuf>,
}

impl NotifyWatcher {
    /// Create a watcher for paths relative to `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform watcher can't be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, WatchError> {
        let (tx, events) = mpsc::channel(EVENTS_CAPACITY);
        let targets = Arc::new(RwLock::new(Targets::default()));

        let filter = Arc::clone(&targets);
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if !matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    return;
                }

                let targets = filter.read();
                let paths: Vec<_> = event
                    .paths
                    .into_iter()
                    .filter(|path| targets.is_relevant(path))
                    .collect();
                drop(targets);

                if paths.is_empty() {
                    return;
                }

                // A full queue already guarantees a refresh.
                if tx.try_send(WatchEvent { paths }).is_err() {
                    tracing::trace!("watch event queue is full, dropping event");
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "file watcher error");
            }
        })?;

        Ok(Self {
            root: root.into(),
            watcher: Some(watcher),
            events,
            targets,
            watched_dirs: HashSet::new(),
        })
    }

    fn watch_dir(&mut self, dir: &Path) -> Result<(), WatchError> {
        if self.watched_dirs.contains(dir) {
            return Ok(());
        }

        let Some(watcher) = self.watcher.as_mut() else {
            return Ok(());
        };
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        self.watched_dirs.insert(dir.to_path_buf());
        tracing::debug!(path = ?dir, "watching directory");

        Ok(())
    }
}

impl std::fmt::Debug for NotifyWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyWatcher")
            .field("root", &self.root)
            .field("watched_dirs", &self.watched_dirs)
            .finish_non_exhaustive()
    }
}

impl FsWatcher for NotifyWatcher {
    fn add(&mut self, path: &Path) -> Result<(), WatchError> {
        let resolved = resolve_in(&self.root, path);
        let canonical = match std::fs::canonicalize(&resolved) {
            Ok(canonical) => canonical,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(WatchError::NotFound(path.to_path_buf()));
            }
            Err(err) => return Err(notify::Error::io(err).add_path(resolved).into()),
        };

        if canonical.is_dir() {
            self.watch_dir(&canonical)?;
            self.targets.write().dirs.insert(canonical);
        } else {
            let parent = canonical.parent().unwrap_or(canonical.as_path()).to_path_buf();
            self.watch_dir(&parent)?;
            self.targets.write().files.insert(canonical);
        }

        Ok(())
    }

    async fn next_event(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }

    fn close(&mut self) {
        self.watcher = None;
        self.events.close();
        while self.events.try_recv().is_ok() {}
    }
}

/// A [`FsWatcher`] fed by the embedding application.
///
/// Every [`WatchEvent`] sent through the paired sender triggers a refresh.
/// Dropping every sender ends the feed.
#[derive(Debug)]
pub struct ChannelWatcher {
    events: mpsc::Receiver<WatchEvent>,
}

impl ChannelWatcher {
    /// Create a watcher along with the sender feeding it.
    #[must_use]
    pub fn new() -> (Self, mpsc::Sender<WatchEvent>) {
        let (tx, events) = mpsc::channel(EVENTS_CAPACITY);
        (Self { events }, tx)
    }
}

impl FsWatcher for ChannelWatcher {
    fn add(&mut self, _path: &Path) -> Result<(), WatchError> {
        Ok(())
    }

    async fn next_event(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }

    fn close(&mut self) {
        self.events.close();
        while self.events.try_recv().is_ok() {}
    }
}
