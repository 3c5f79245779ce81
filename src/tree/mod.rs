//! Hierarchical view over a flat key space
//!
//! A [`Node`] is a resolved position in the tree: the root, a directory
//! implied by keys sharing a prefix, or a file backed by one object.
//! [`Tree`] answers the filesystem questions for a node (resolve a child,
//! list children, read content) using an injected [`ObjectStore`].
//!
//! Nodes hold no store handle and no shared state. Whether a name is a
//! directory is decided against the store on every resolution.

pub mod attr;
pub mod mapper;

use std::sync::Arc;

use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::error::{BucketFsError, Result};
use crate::store::{dir_prefix, join_key, ObjectStore, DELIMITER};

pub use attr::Attributes;
pub use mapper::Partition;

/// Kind of a child entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

/// Directory entry returned by listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub kind: EntryKind,
}

impl Entry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
        }
    }
}

/// When file content is fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStrategy {
    /// Fetch the whole object when the name is resolved
    #[default]
    Eager,
    /// Fetch only the size on resolution and byte ranges on read
    Lazy,
}

/// A directory implied by at least one key below it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirNode {
    /// Ancestor names joined by the delimiter, never empty
    pub key: String,
}

/// Content held by a file node
#[derive(Debug, Clone)]
pub enum FileContent {
    Loaded(Bytes),
    /// Not fetched yet; reads go to the store by range
    Deferred,
}

/// A file backed by exactly one object
#[derive(Debug, Clone)]
pub struct FileNode {
    pub key: String,
    /// Content length reported by the store at resolution time
    pub size: u64,
    pub content: FileContent,
}

/// A resolved filesystem position
#[derive(Debug, Clone)]
pub enum Node {
    Root,
    Directory(DirNode),
    File(FileNode),
}

impl Node {
    /// Object key (files) or implied prefix without delimiter (directories).
    /// Empty for the root.
    pub fn key(&self) -> &str {
        match self {
            Node::Root => "",
            Node::Directory(dir) => &dir.key,
            Node::File(file) => &file.key,
        }
    }

    /// Key of the containing directory, `None` for the root
    pub fn parent_key(&self) -> Option<&str> {
        match self {
            Node::Root => None,
            _ => Some(
                self.key()
                    .rsplit_once(DELIMITER)
                    .map(|(parent, _)| parent)
                    .unwrap_or(""),
            ),
        }
    }

    pub fn is_dir(&self) -> bool {
        !matches!(self, Node::File(_))
    }

    pub fn attributes(&self) -> Attributes {
        match self {
            Node::Root | Node::Directory(_) => Attributes::directory(),
            Node::File(file) => Attributes::file(file.size),
        }
    }
}

/// Resolves and lists nodes against an object store
pub struct Tree {
    store: Arc<dyn ObjectStore>,
    strategy: ContentStrategy,
}

impl Tree {
    pub fn new(store: Arc<dyn ObjectStore>, strategy: ContentStrategy) -> Self {
        Self { store, strategy }
    }

    pub fn root(&self) -> Node {
        Node::Root
    }

    pub fn strategy(&self) -> ContentStrategy {
        self.strategy
    }

    /// Resolve `name` under `parent`.
    ///
    /// Directory-ness is probed first; only when the name is not a
    /// directory is it fetched as an object. A name that is both fails
    /// with `AmbiguousEntry`.
    pub async fn resolve(&self, parent: &Node, name: &str) -> Result<Node> {
        let parent_key = match parent {
            Node::File(file) => return Err(BucketFsError::NotADirectory(file.key.clone())),
            _ => parent.key(),
        };

        if name.is_empty() || name == "." || name == ".." || name.contains(DELIMITER) {
            return Err(BucketFsError::NotFound(format!(
                "Invalid name {:?} under {:?}",
                name, parent_key
            )));
        }

        let key = join_key(parent_key, name);
        trace!("resolve: key={}", key);

        let is_dir = self
            .store
            .is_directory(parent_key, name)
            .await
            .map_err(|e| report("is_directory", &key, e))?;

        if is_dir {
            match self.store.head_object(&key).await {
                Ok(_) => {
                    let err = BucketFsError::AmbiguousEntry(key);
                    warn!("resolve: {}", err);
                    return Err(err);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(report("head_object", &key, e)),
            }
            return Ok(Node::Directory(DirNode { key }));
        }

        let file = match self.strategy {
            ContentStrategy::Eager => {
                let object = self
                    .store
                    .get_object(&key)
                    .await
                    .map_err(|e| report("get_object", &key, e))?;
                FileNode {
                    key,
                    size: object.content_length,
                    content: FileContent::Loaded(object.body),
                }
            }
            ContentStrategy::Lazy => {
                let size = self
                    .store
                    .head_object(&key)
                    .await
                    .map_err(|e| report("head_object", &key, e))?;
                FileNode {
                    key,
                    size,
                    content: FileContent::Deferred,
                }
            }
        };

        Ok(Node::File(file))
    }

    /// Immediate children of a directory node plus any ambiguous names
    pub async fn partition_children(&self, node: &Node) -> Result<Partition> {
        let prefix = match node {
            Node::File(file) => return Err(BucketFsError::NotADirectory(file.key.clone())),
            _ => dir_prefix(node.key()),
        };
        trace!("list: prefix={:?}", prefix);

        let keys = self
            .store
            .list(&prefix)
            .await
            .map_err(|e| report("list", &prefix, e))?;

        Ok(mapper::partition(&prefix, &keys))
    }

    /// Immediate children of a directory node.
    ///
    /// Ambiguous names are logged and left out.
    pub async fn list_children(&self, node: &Node) -> Result<Vec<Entry>> {
        let partition = self.partition_children(node).await?;
        for name in &partition.conflicts {
            warn!(
                "list: {}",
                BucketFsError::AmbiguousEntry(join_key(node.key(), name))
            );
        }
        Ok(partition.entries)
    }

    /// Read up to `size` bytes at `offset`; short or empty at end of file.
    pub async fn read(&self, node: &Node, offset: u64, size: u32) -> Result<Bytes> {
        let file = match node {
            Node::File(file) => file,
            _ => return Err(BucketFsError::IsADirectory(node.key().to_string())),
        };

        match &file.content {
            FileContent::Loaded(data) => Ok(slice(data, offset, size)),
            FileContent::Deferred => {
                if offset >= file.size || size == 0 {
                    return Ok(Bytes::new());
                }
                self.store
                    .get_range(&file.key, offset, size)
                    .await
                    .map_err(|e| report("get_range", &file.key, e))
            }
        }
    }
}

/// EOF-clamped view of already fetched content
fn slice(data: &Bytes, offset: u64, size: u32) -> Bytes {
    let len = data.len() as u64;
    if offset >= len {
        return Bytes::new();
    }
    let end = offset.saturating_add(size as u64).min(len);
    data.slice(offset as usize..end as usize)
}

/// Log a store failure with its cause and pass it on unchanged
fn report(operation: &str, key: &str, err: BucketFsError) -> BucketFsError {
    if err.is_not_found() {
        debug!("{} {:?}: {}", operation, key, err);
    } else {
        warn!("{} {:?} failed: {}", operation, key, err);
    }
    err
}
