//! Hosts container.
//!
//! Keeps a rule engine built from hosts files in sync with the files, and
//! notifies consumers each time the hosts table changes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::Config;
use crate::hosts::{
    DirFs, HostTable, HostsFs, PathPattern, RuleSynthesizer, paths_to_patterns,
};
use crate::matcher::RequestMatcher;
use crate::rules::{
    CompileError, DnsRequest, DnsResult, RewriteCompiler, RewriteEngine, RuleCompiler, RuleEngine,
};
use crate::updates::{self, UpdateReceiver, UpdateSender};
use crate::watch::{FsWatcher, NotifyWatcher, WatchError};

/// Error type for container construction.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// None of the configured paths exists.
    #[error("no valid hosts paths provided")]
    NoHostsPaths,

    /// A configured path can't be inspected.
    #[error("bad hosts path at index {index}")]
    Path {
        /// Index of the path in the configuration.
        index: usize,
        #[source]
        source: std::io::Error,
    },

    /// A configured path can't be watched.
    #[error("adding path to watcher")]
    Watch(#[from] WatchError),

    /// The initial refresh failed.
    #[error("refreshing hosts")]
    Refresh(#[from] RefreshError),
}

/// Error type for a refresh cycle.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// Reading the hosts files failed.
    #[error("scanning {path:?}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The synthesized rules don't compile.
    #[error("compiling rules")]
    Compile(#[from] CompileError),

    /// The refresh task panicked or was cancelled.
    #[error("refresh task join error")]
    Join(#[from] tokio::task::JoinError),
}

/// Outcome of a successful refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The hosts table didn't change, nothing was rebuilt.
    Unchanged,
    /// A new engine was committed and the table published.
    Committed {
        /// Number of addresses in the new table.
        addresses: usize,
    },
}

/// Rebuilds the rule engine from the hosts files.
struct Refresher<F, C: RuleCompiler> {
    list_id: i32,
    fs: F,
    compiler: C,
    patterns: Vec<PathPattern>,
    /// The last committed table.
    last: Option<Arc<HostTable>>,
    matcher: Arc<RequestMatcher<C::Engine>>,
    updates: UpdateSender,
}

impl<F: HostsFs, C: RuleCompiler> Refresher<F, C> {
    fn refresh(&mut self) -> Result<RefreshOutcome, RefreshError> {
        let res = self.try_refresh();
        crate::metrics::record_refresh(&res);
        res
    }

    fn try_refresh(&mut self) -> Result<RefreshOutcome, RefreshError> {
        tracing::debug!("refreshing");

        let synth = self.scan()?;
        if self.last.as_deref() == Some(synth.table()) {
            tracing::debug!("no changes detected");
            return Ok(RefreshOutcome::Unchanged);
        }

        let engine = self.compiler.compile(self.list_id, synth.rules_text())?;
        let rules = engine.rules_count();
        let translations = synth.translations();
        self.matcher.swap(engine, translations);

        let table = Arc::new(synth.into_table());
        let addresses = table.len();
        self.last = Some(Arc::clone(&table));
        self.updates.publish(table);

        crate::metrics::record_tables(addresses, rules);
        tracing::info!(addresses, rules, "hosts tables refreshed");

        Ok(RefreshOutcome::Committed { addresses })
    }

    fn scan(&self) -> Result<RuleSynthesizer, RefreshError> {
        let capacity = self.last.as_ref().map_or(0, |last| last.len());
        let mut synth = RuleSynthesizer::with_capacity(capacity);

        for pattern in &self.patterns {
            let files = match self.fs.expand(pattern) {
                Ok(files) => files,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(path = ?pattern.path(), "pattern matches nothing");
                    continue;
                }
                Err(source) => {
                    return Err(RefreshError::Scan {
                        path: pattern.path().to_path_buf(),
                        source,
                    });
                }
            };

            for path in files {
                let mut reader = match self.fs.open(&path) {
                    Ok(reader) => reader,
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                        tracing::debug!(path = ?path, "file disappeared, skipping");
                        continue;
                    }
                    Err(source) => return Err(RefreshError::Scan { path, source }),
                };

                if let Err(source) = synth.parse_reader(reader.as_mut()) {
                    return Err(RefreshError::Scan { path, source });
                }
            }
        }

        Ok(synth)
    }
}

/// Object-safe handle on a refresher, erasing its file system and compiler.
trait Refresh: Send + Sync + 'static {
    fn refresh(&self) -> Result<RefreshOutcome, RefreshError>;
}

impl<F: HostsFs, C: RuleCompiler> Refresh for Mutex<Refresher<F, C>> {
    fn refresh(&self) -> Result<RefreshOutcome, RefreshError> {
        self.lock().refresh()
    }
}

async fn run_refresh(refresher: &Arc<dyn Refresh>) -> Result<RefreshOutcome, RefreshError> {
    let refresher = Arc::clone(refresher);
    let span = tracing::Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(|| refresher.refresh())).await?
}

async fn watch_loop<W: FsWatcher>(
    refresher: Arc<dyn Refresh>,
    updates: UpdateSender,
    mut watcher: W,
    mut shutdown: oneshot::Receiver<()>,
) {
    tracing::info!("starting watch loop");

    loop {
        tokio::select! {
            event = watcher.next_event() => {
                let Some(event) = event else {
                    tracing::debug!("watcher closed the events channel");
                    break;
                };

                tracing::debug!(paths = ?event.paths, "hosts files changed");
                if let Err(err) = run_refresh(&refresher).await {
                    tracing::error!(error = ?err, "refreshing after event");
                }
            }
            _ = &mut shutdown => {
                tracing::debug!("shutdown requested");
                break;
            }
        }
    }

    updates.close();
    watcher.close();

    tracing::info!("watch loop stopped");
}

/// A container of hosts, keeping a rule engine up to date with the hosts
/// files it watches.
///
/// # Example
///
/// ```no_run
/// use hosts_container::container::HostsContainer;
/// use hosts_container::hosts::DirFs;
/// use hosts_container::rules::{DnsRequest, RewriteCompiler};
/// use hosts_container::watch::NotifyWatcher;
/// use hickory_proto::rr::RecordType;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let container = HostsContainer::new(
///     1,
///     DirFs::new("/"),
///     NotifyWatcher::new("/")?,
///     RewriteCompiler,
///     &["etc/hosts"],
/// )
/// .await?;
///
/// let res = container.match_request(&DnsRequest::new("localhost", RecordType::A));
/// println!("{res:?}");
///
/// container.close().await;
/// # Ok(())
/// # }
/// ```
pub struct HostsContainer<E> {
    list_id: i32,
    matcher: Arc<RequestMatcher<E>>,
    updates: UpdateReceiver,
    refresher: Arc<dyn Refresh>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl<E: RuleEngine> HostsContainer<E> {
    /// Create a container reading `paths` from `fs`.
    ///
    /// Paths pointing to directories include every file directly inside
    /// them. The hosts files are read once before returning, then again on
    /// every event of `watcher`.
    ///
    /// # Errors
    ///
    /// Returns an error if no path exists, if a path can't be inspected or
    /// watched, or if the initial refresh fails.
    pub async fn new<F, C, W, P>(
        list_id: i32,
        fs: F,
        mut watcher: W,
        compiler: C,
        paths: &[P],
    ) -> Result<Self, ContainerError>
    where
        F: HostsFs,
        C: RuleCompiler<Engine = E>,
        W: FsWatcher,
        P: AsRef<Path>,
    {
        if paths.is_empty() {
            return Err(ContainerError::NoHostsPaths);
        }

        let patterns = paths_to_patterns(&fs, paths)
            .map_err(|(index, source)| ContainerError::Path { index, source })?;
        if patterns.is_empty() {
            return Err(ContainerError::NoHostsPaths);
        }

        let matcher = Arc::new(RequestMatcher::new());
        let (tx, rx) = updates::channel();
        let refresher: Arc<dyn Refresh> = Arc::new(Mutex::new(Refresher {
            list_id,
            fs,
            compiler,
            patterns,
            last: None,
            matcher: Arc::clone(&matcher),
            updates: tx.clone(),
        }));

        let span = tracing::info_span!("hosts_container", list_id);
        run_refresh(&refresher).instrument(span.clone()).await?;

        for path in paths {
            let path = path.as_ref();
            match watcher.add(path) {
                Ok(()) => {}
                Err(WatchError::NotFound(_)) => {
                    tracing::debug!(parent: &span, path = ?path, "file does not exist, skipping");
                }
                Err(err) => return Err(err.into()),
            }
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(
            watch_loop(Arc::clone(&refresher), tx, watcher, shutdown_rx).instrument(span),
        );

        Ok(Self {
            list_id,
            matcher,
            updates: rx,
            refresher,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// The identifier of the generated rules list.
    #[must_use]
    pub const fn list_id(&self) -> i32 {
        self.list_id
    }

    /// Match the request against the hosts rules.
    ///
    /// Only A, AAAA and PTR requests can match.
    pub fn match_request(&self, request: &DnsRequest) -> Option<DnsResult> {
        self.matcher.match_request(request)
    }

    /// Returns the hosts line the given generated rule was produced from.
    pub fn translate(&self, rule: &str) -> Option<String> {
        self.matcher.translate(rule)
    }

    /// Returns the matcher, to be shared with query handlers.
    #[must_use]
    pub fn matcher(&self) -> Arc<RequestMatcher<E>> {
        Arc::clone(&self.matcher)
    }

    /// Returns a receiver of committed hosts tables.
    #[must_use]
    pub fn updates(&self) -> UpdateReceiver {
        self.updates.clone()
    }

    /// Refresh the hosts tables now, without waiting for an event.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the files or compiling the rules fails,
    /// the active engine is left untouched.
    pub async fn refresh(&self) -> Result<RefreshOutcome, RefreshError> {
        run_refresh(&self.refresher).await
    }

    /// Stop watching and wait for the watch loop to finish.
    ///
    /// Closes the updates channel.
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        if let Some(handle) = self.handle.take()
            && let Err(err) = handle.await
        {
            tracing::error!(error = %err, list_id = self.list_id, "watch loop failed");
        }
    }
}

impl HostsContainer<RewriteEngine> {
    /// Create a container over the configured root, watching it with the
    /// platform file watcher.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the root is not a readable
    /// directory, [`Error::Watch`](crate::Error::Watch) if the watcher can't
    /// be created and [`Error::Container`](crate::Error::Container) if the
    /// container can't start.
    pub async fn from_config(config: &Config) -> crate::Result<Self> {
        let metadata = std::fs::metadata(&config.root)?;
        if !metadata.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("root {} is not a directory", config.root.display()),
            )
            .into());
        }

        let watcher = NotifyWatcher::new(&config.root)?;
        let container = Self::new(
            config.list_id,
            DirFs::new(&config.root),
            watcher,
            RewriteCompiler,
            &config.hosts_paths,
        )
        .await?;

        Ok(container)
    }
}

impl<E> std::fmt::Debug for HostsContainer<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostsContainer")
            .field("list_id", &self.list_id)
            .finish_non_exhaustive()
    }
}
