//! Working file system the hosts files are read from.
//!
//! Paths handed to a [`HostsFs`] are relative to its root. A leading `/` is
//! ignored, so `/etc/hosts` and `etc/hosts` locate the same file.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

/// Kind of an existing entry of a [`HostsFs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// A configured path turned into a set of files to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    /// A single file.
    File(PathBuf),
    /// Every regular file directly inside the directory.
    Dir(PathBuf),
}

impl PathPattern {
    /// The configured path the pattern was made from.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::File(path) | Self::Dir(path) => path,
        }
    }
}

/// Trait for the file system containing hosts files.
///
/// Implementations must treat paths as relative to their root.
pub trait HostsFs: Send + Sync + 'static {
    /// Returns the kind of the entry at `path`.
    ///
    /// # Errors
    ///
    /// Returns an [`io::ErrorKind::NotFound`] error if nothing exists at
    /// `path`, and any other error if the entry can't be inspected.
    fn kind(&self, path: &Path) -> io::Result<EntryKind>;

    /// Expand the pattern into the files it matches, in reading order.
    ///
    /// A pattern whose path doesn't exist matches nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if listing the files fails for any other reason.
    fn expand(&self, pattern: &PathPattern) -> io::Result<Vec<PathBuf>>;

    /// Open the file at `path` for reading.
    ///
    /// # Errors
    ///
    /// Returns the error of opening the file.
    fn open(&self, path: &Path) -> io::Result<Box<dyn BufRead + Send>>;
}

/// Convert the configured paths into patterns.
///
/// Directories become [`PathPattern::Dir`], everything else becomes
/// [`PathPattern::File`]. Paths that don't exist are skipped.
///
/// # Errors
///
/// Returns the index of the path along with the error if inspecting it
/// fails for any reason other than its absence.
pub fn paths_to_patterns<F, P>(fs: &F, paths: &[P]) -> Result<Vec<PathPattern>, (usize, io::Error)>
where
    F: HostsFs + ?Sized,
    P: AsRef<Path>,
{
    let mut patterns = Vec::with_capacity(paths.len());
    for (idx, path) in paths.iter().enumerate() {
        let path = path.as_ref();
        match fs.kind(path) {
            Ok(EntryKind::Dir) => patterns.push(PathPattern::Dir(path.to_path_buf())),
            Ok(EntryKind::File) => patterns.push(PathPattern::File(path.to_path_buf())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = ?path, "hosts path doesn't exist, skipping");
            }
            Err(err) => return Err((idx, err)),
        }
    }

    Ok(patterns)
}

/// A [`HostsFs`] rooted at a directory of the local file system.
#[derive(Debug, Clone)]
pub struct DirFs {
    root: PathBuf,
}

impl DirFs {
    /// Create a file system rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` against the root.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        resolve_in(&self.root, path)
    }
}

/// Resolve `path` against `root`, ignoring its root and prefix components.
#[must_use]
pub fn resolve_in(root: &Path, path: &Path) -> PathBuf {
    let relative: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect();
    root.join(relative)
}

impl HostsFs for DirFs {
    fn kind(&self, path: &Path) -> io::Result<EntryKind> {
        let meta = std::fs::metadata(self.resolve(path))?;
        Ok(if meta.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        })
    }

    fn expand(&self, pattern: &PathPattern) -> io::Result<Vec<PathBuf>> {
        match pattern {
            PathPattern::File(path) => match std::fs::metadata(self.resolve(path)) {
                Ok(_) => Ok(vec![path.clone()]),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
                Err(err) => Err(err),
            },
            PathPattern::Dir(dir) => {
                let walker = WalkDir::new(self.resolve(dir))
                    .min_depth(1)
                    .max_depth(1)
                    .follow_links(true)
                    .sort_by_file_name();

                let mut files = Vec::new();
                for entry in walker {
                    let entry = match entry {
                        Ok(entry) => entry,
                        Err(err) if err.depth() == 0 && is_not_found(&err) => {
                            return Ok(Vec::new());
                        }
                        Err(err) if is_not_found(&err) => continue,
                        Err(err) => return Err(err.into()),
                    };

                    if !entry.file_type().is_file() {
                        tracing::debug!(path = ?entry.path(), "skipping non-file entry");
                        continue;
                    }

                    files.push(dir.join(entry.file_name()));
                }

                Ok(files)
            }
        }
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
        let file = File::open(self.resolve(path))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

fn is_not_found(err: &walkdir::Error) -> bool {
    err.io_error()
        .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io::{Cursor, Read};
    use std::sync::Arc;

    use parking_lot::RwLock;
    use tempfile::TempDir;

    /// In-memory file system for testing.
    ///
    /// Directories are implied by the files they contain. Errors can be
    /// injected per path.
    #[derive(Clone, Default)]
    pub struct MemFs {
        files: Arc<RwLock<BTreeMap<PathBuf, String>>>,
        failing: Arc<RwLock<BTreeMap<PathBuf, io::ErrorKind>>>,
    }

    impl MemFs {
        pub fn new() -> Self {
            Self::default()
        }

        /// Create or overwrite a file.
        pub fn write(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
            self.files.write().insert(path.into(), content.into());
        }

        /// Remove a file.
        pub fn remove(&self, path: impl AsRef<Path>) {
            self.files.write().remove(path.as_ref());
        }

        /// Make opening `path` fail with the given error kind.
        pub fn fail(&self, path: impl Into<PathBuf>, kind: io::ErrorKind) {
            self.failing.write().insert(path.into(), kind);
        }

        /// Stop failing on `path`.
        pub fn heal(&self, path: impl AsRef<Path>) {
            self.failing.write().remove(path.as_ref());
        }

        fn failure(&self, path: &Path) -> Option<io::Error> {
            self.failing
                .read()
                .get(path)
                .map(|kind| io::Error::from(*kind))
        }
    }

    impl HostsFs for MemFs {
        fn kind(&self, path: &Path) -> io::Result<EntryKind> {
            if let Some(err) = self.failure(path) {
                return Err(err);
            }

            let files = self.files.read();
            if files.contains_key(path) {
                Ok(EntryKind::File)
            } else if files.keys().any(|p| p.parent() == Some(path)) {
                Ok(EntryKind::Dir)
            } else {
                Err(io::ErrorKind::NotFound.into())
            }
        }

        fn expand(&self, pattern: &PathPattern) -> io::Result<Vec<PathBuf>> {
            let files = self.files.read();
            Ok(match pattern {
                PathPattern::File(path) => files
                    .contains_key(path)
                    .then(|| path.clone())
                    .into_iter()
                    .collect(),
                PathPattern::Dir(dir) => files
                    .keys()
                    .filter(|p| p.parent() == Some(dir.as_path()))
                    .cloned()
                    .collect(),
            })
        }

        fn open(&self, path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
            if let Some(err) = self.failure(path) {
                return Err(err);
            }

            let content = self
                .files
                .read()
                .get(path)
                .cloned()
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
            Ok(Box::new(Cursor::new(content.into_bytes())))
        }
    }

    fn read_all(fs: &impl HostsFs, path: &Path) -> String {
        let mut content = String::new();
        fs.open(path).unwrap().read_to_string(&mut content).unwrap();
        content
    }

    #[test]
    fn should_convert_paths_to_patterns() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("hosts"), "").unwrap();
        std::fs::create_dir(dir.path().join("hosts.d")).unwrap();

        let fs = DirFs::new(dir.path());
        let patterns = paths_to_patterns(&fs, &["hosts", "missing", "hosts.d"]).unwrap();

        assert_eq!(
            patterns,
            vec![
                PathPattern::File("hosts".into()),
                PathPattern::Dir("hosts.d".into()),
            ]
        );
    }

    #[test]
    fn should_return_index_of_failing_path() {
        let fs = MemFs::new();
        fs.write("etc/hosts", "");
        fs.fail("etc/broken", io::ErrorKind::PermissionDenied);

        let (idx, err) = paths_to_patterns(&fs, &["etc/hosts", "etc/broken"]).unwrap_err();

        assert_eq!(idx, 1);
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn should_ignore_leading_slash() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("etc")).unwrap();
        std::fs::write(dir.path().join("etc/hosts"), "10.0.0.1 a\n").unwrap();

        let fs = DirFs::new(dir.path());

        assert_eq!(fs.resolve(Path::new("/etc/hosts")), dir.path().join("etc/hosts"));
        assert_eq!(fs.kind(Path::new("/etc/hosts")).unwrap(), EntryKind::File);
        assert_eq!(read_all(&fs, Path::new("/etc/hosts")), "10.0.0.1 a\n");
    }

    #[test]
    fn should_expand_directory_in_name_order() {
        let dir = TempDir::new().unwrap();
        let hosts_d = dir.path().join("hosts.d");
        std::fs::create_dir(&hosts_d).unwrap();
        std::fs::write(hosts_d.join("20-second"), "").unwrap();
        std::fs::write(hosts_d.join("10-first"), "").unwrap();
        std::fs::create_dir(hosts_d.join("30-subdir")).unwrap();

        let fs = DirFs::new(dir.path());
        let files = fs.expand(&PathPattern::Dir("hosts.d".into())).unwrap();

        assert_eq!(
            files,
            vec![
                PathBuf::from("hosts.d/10-first"),
                PathBuf::from("hosts.d/20-second"),
            ]
        );
    }

    #[test]
    fn should_expand_missing_paths_to_nothing() {
        let dir = TempDir::new().unwrap();
        let fs = DirFs::new(dir.path());

        assert!(
            fs.expand(&PathPattern::File("gone".into()))
                .unwrap()
                .is_empty()
        );
        assert!(
            fs.expand(&PathPattern::Dir("gone.d".into()))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn should_report_missing_file_on_open() {
        let dir = TempDir::new().unwrap();
        let fs = DirFs::new(dir.path());

        let Err(err) = fs.open(Path::new("gone")) else {
            panic!("expected an error");
        };
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn should_serve_files_from_memory() {
        let fs = MemFs::new();
        fs.write("etc/hosts", "10.0.0.1 a\n");
        fs.write("etc/hosts.d/extra", "10.0.0.2 b\n");

        assert_eq!(fs.kind(Path::new("etc/hosts.d")).unwrap(), EntryKind::Dir);
        assert_eq!(
            fs.expand(&PathPattern::Dir("etc/hosts.d".into())).unwrap(),
            vec![PathBuf::from("etc/hosts.d/extra")]
        );
        assert_eq!(read_all(&fs, Path::new("etc/hosts")), "10.0.0.1 a\n");
    }
}
