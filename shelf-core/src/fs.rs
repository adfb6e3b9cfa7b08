use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Minimal, async-capable filesystem abstraction used by the traversal stage.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Check whether a path exists.
    async fn path_exists(&self, path: &Path) -> bool;

    /// Open a directory for iteration.
    async fn read_dir(
        &self,
        path: &Path,
    ) -> io::Result<Box<dyn ReadDirStream + Send>>;

    /// Fetch lightweight file metadata.
    async fn metadata(&self, path: &Path) -> io::Result<FsMetadata>;
}

/// Lightweight metadata needed by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsMetadata {
    pub is_dir: bool,
    pub is_file: bool,
    pub len: u64,
    /// Last modified time if available
    pub modified: Option<DateTime<Utc>>,
}

/// Async directory iterator (similar to tokio::fs::ReadDir).
#[async_trait]
pub trait ReadDirStream {
    /// Return next entry's path, or None when exhausted.
    async fn next_entry(&mut self) -> io::Result<Option<PathBuf>>;
}

/// Real filesystem implementation backed by tokio::fs.
#[derive(Debug, Clone, Default)]
pub struct RealFs {
    follow_links: bool,
}

impl RealFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }
}

#[async_trait]
impl FileSystem for RealFs {
    async fn path_exists(&self, path: &Path) -> bool {
        // try_exists avoids errors for permission issues by returning false
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn read_dir(
        &self,
        path: &Path,
    ) -> io::Result<Box<dyn ReadDirStream + Send>> {
        let rd = tokio::fs::read_dir(path).await?;
        Ok(Box::new(RealReadDir { inner: rd }))
    }

    async fn metadata(&self, path: &Path) -> io::Result<FsMetadata> {
        let mut md = tokio::fs::symlink_metadata(path).await?;
        if md.file_type().is_symlink() {
            if !self.follow_links {
                return Ok(FsMetadata {
                    is_dir: false,
                    is_file: false,
                    len: 0,
                    modified: None,
                });
            }
            md = tokio::fs::metadata(path).await?;
        }
        Ok(FsMetadata {
            is_dir: md.is_dir(),
            is_file: md.is_file(),
            len: md.len(),
            modified: md.modified().ok().map(DateTime::<Utc>::from),
        })
    }
}

struct RealReadDir {
    inner: tokio::fs::ReadDir,
}

#[async_trait]
impl ReadDirStream for RealReadDir {
    async fn next_entry(&mut self) -> io::Result<Option<PathBuf>> {
        Ok(self.inner.next_entry().await?.map(|entry| entry.path()))
    }
}

/// In-memory filesystem for tests.
///
/// Paths are treated literally; callers should use consistent absolute paths.
/// Clones share state so a test can mutate the tree while a scan holds it.
#[derive(Debug, Default, Clone)]
pub struct InMemoryFs {
    inner: Arc<RwLock<InMemoryTree>>,
}

#[derive(Debug, Default)]
struct InMemoryTree {
    nodes: HashMap<PathBuf, Node>,
    unreadable: HashSet<PathBuf>,
    /// Children listed by `read_dir` whose metadata lookup then fails.
    vanishing: HashSet<PathBuf>,
}

#[derive(Debug, Clone)]
enum Node {
    Dir {
        children: Vec<PathBuf>,
    },
    File {
        len: u64,
        modified: Option<DateTime<Utc>>,
    },
}

impl InMemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dir<P: Into<PathBuf>>(&self, path: P) {
        let path = path.into();
        let mut tree = self.write();
        if tree.nodes.contains_key(&path) {
            return;
        }
        tree.ensure_parent_link(&path);
        tree.nodes.insert(
            path,
            Node::Dir {
                children: Vec::new(),
            },
        );
    }

    pub fn add_file<P: Into<PathBuf>>(&self, path: P, len: u64) {
        self.add_file_with_mtime(path, len, None);
    }

    pub fn add_file_with_mtime<P: Into<PathBuf>>(
        &self,
        path: P,
        len: u64,
        modified: Option<DateTime<Utc>>,
    ) {
        let path = path.into();
        let mut tree = self.write();
        tree.ensure_parent_link(&path);
        tree.nodes.insert(path, Node::File { len, modified });
    }

    /// Remove a path and everything beneath it.
    pub fn remove<P: AsRef<Path>>(&self, path: P) {
        let path = path.as_ref();
        let mut tree = self.write();
        tree.nodes.retain(|candidate, _| !candidate.starts_with(path));
        if let Some(parent) = path.parent()
            && let Some(Node::Dir { children }) = tree.nodes.get_mut(parent)
        {
            children.retain(|child| child.as_path() != path);
        }
    }

    /// Make `read_dir` fail for this directory.
    pub fn mark_unreadable<P: Into<PathBuf>>(&self, path: P) {
        self.write().unreadable.insert(path.into());
    }

    /// Keep the entry in its parent listing but fail metadata lookups, as if
    /// it disappeared between listing and stat.
    pub fn mark_vanishing<P: Into<PathBuf>>(&self, path: P) {
        self.write().vanishing.insert(path.into());
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InMemoryTree> {
        self.inner.read().unwrap_or_else(|poison| poison.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryTree> {
        self.inner.write().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl InMemoryTree {
    fn ensure_parent_link(&mut self, path: &Path) {
        if let Some(parent) = path.parent() {
            if parent.as_os_str().is_empty() {
                return;
            }
            // Ensure parent directory exists
            if !self.nodes.contains_key(parent) {
                self.nodes.insert(
                    parent.to_path_buf(),
                    Node::Dir {
                        children: Vec::new(),
                    },
                );
                // Recurse to ensure its parent exists
                self.ensure_parent_link(parent);
            }
            // Link child into parent
            if let Some(Node::Dir { children }) = self.nodes.get_mut(parent)
                && !children.iter().any(|p| p.as_path() == path)
            {
                children.push(path.to_path_buf());
            }
        }
    }
}

fn not_found(what: &str, path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{what} on missing path: {}", path.display()),
    )
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn path_exists(&self, path: &Path) -> bool {
        self.read().nodes.contains_key(path)
    }

    async fn read_dir(
        &self,
        path: &Path,
    ) -> io::Result<Box<dyn ReadDirStream + Send>> {
        let tree = self.read();
        if tree.unreadable.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("read_dir denied: {}", path.display()),
            ));
        }
        match tree.nodes.get(path) {
            Some(Node::Dir { children }) => Ok(Box::new(InMemReadDir {
                queue: children.clone().into(),
            })),
            Some(Node::File { .. }) => Err(io::Error::other(format!(
                "read_dir on file: {}",
                path.display()
            ))),
            None => Err(not_found("read_dir", path)),
        }
    }

    async fn metadata(&self, path: &Path) -> io::Result<FsMetadata> {
        let tree = self.read();
        if tree.vanishing.contains(path) {
            return Err(not_found("metadata", path));
        }
        match tree.nodes.get(path) {
            Some(Node::Dir { .. }) => Ok(FsMetadata {
                is_dir: true,
                is_file: false,
                len: 0,
                modified: None,
            }),
            Some(Node::File { len, modified }) => Ok(FsMetadata {
                is_dir: false,
                is_file: true,
                len: *len,
                modified: *modified,
            }),
            None => Err(not_found("metadata", path)),
        }
    }
}

struct InMemReadDir {
    queue: VecDeque<PathBuf>,
}

#[async_trait]
impl ReadDirStream for InMemReadDir {
    async fn next_entry(&mut self) -> io::Result<Option<PathBuf>> {
        Ok(self.queue.pop_front())
    }
}
