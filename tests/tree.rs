//! Tree behaviour against in-process stores
//!
//! Covers classification, listing, content reads and failure reporting
//! for both content strategies.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use bucketfs::store::memory::MemoryStore;
use bucketfs::store::{ObjectStore, StoredObject};
use bucketfs::tree::{ContentStrategy, Entry, EntryKind, Node, Tree};
use bucketfs::{BucketFsError, Result};

fn tree_with(objects: &[(&str, &'static str)], strategy: ContentStrategy) -> Tree {
    let store = MemoryStore::with_objects(objects.iter().map(|(k, v)| (k.to_string(), *v)));
    Tree::new(Arc::new(store), strategy)
}

fn eager(objects: &[(&str, &'static str)]) -> Tree {
    tree_with(objects, ContentStrategy::Eager)
}

fn entry_set(entries: &[Entry]) -> HashSet<(String, EntryKind)> {
    entries.iter().map(|e| (e.name.clone(), e.kind)).collect()
}

/// Store whose every call fails as if the network were down
struct UnreachableStore;

#[async_trait]
impl ObjectStore for UnreachableStore {
    async fn is_directory(&self, _parent_prefix: &str, _name: &str) -> Result<bool> {
        Err(BucketFsError::backend("ListObjectsV2", "connection refused"))
    }

    async fn list(&self, _prefix: &str) -> Result<Vec<String>> {
        Err(BucketFsError::backend("ListObjectsV2", "connection refused"))
    }

    async fn get_object(&self, _key: &str) -> Result<StoredObject> {
        Err(BucketFsError::backend("GetObject", "connection refused"))
    }

    async fn head_object(&self, _key: &str) -> Result<u64> {
        Err(BucketFsError::backend("HeadObject", "connection refused"))
    }

    async fn get_range(&self, _key: &str, _offset: u64, _size: u32) -> Result<Bytes> {
        Err(BucketFsError::backend("GetObject", "connection refused"))
    }
}

/// Wraps a store and counts full-object fetches and range reads
struct CountingStore {
    inner: MemoryStore,
    gets: AtomicUsize,
    ranges: AtomicUsize,
}

#[async_trait]
impl ObjectStore for CountingStore {
    async fn is_directory(&self, parent_prefix: &str, name: &str) -> Result<bool> {
        self.inner.is_directory(parent_prefix, name).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix).await
    }

    async fn get_object(&self, key: &str) -> Result<StoredObject> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_object(key).await
    }

    async fn head_object(&self, key: &str) -> Result<u64> {
        self.inner.head_object(key).await
    }

    async fn get_range(&self, key: &str, offset: u64, size: u32) -> Result<Bytes> {
        self.ranges.fetch_add(1, Ordering::SeqCst);
        self.inner.get_range(key, offset, size).await
    }
}

#[tokio::test]
async fn test_single_file_at_root() {
    let tree = eager(&[("a.txt", "hello")]);

    let entries = tree.list_children(&tree.root()).await.unwrap();
    assert_eq!(entries, vec![Entry::file("a.txt")]);

    let node = tree.resolve(&tree.root(), "a.txt").await.unwrap();
    let attr = node.attributes();
    assert_eq!(attr.kind, EntryKind::File);
    assert_eq!(attr.size, 5);
    assert_eq!(attr.perm, 0o444);
    assert_eq!(tree.read(&node, 0, 4096).await.unwrap(), Bytes::from("hello"));
}

#[tokio::test]
async fn test_directory_from_nested_key() {
    let tree = eager(&[("dir1/b.txt", "bravo")]);

    let entries = tree.list_children(&tree.root()).await.unwrap();
    assert_eq!(entries, vec![Entry::directory("dir1")]);

    let dir = tree.resolve(&tree.root(), "dir1").await.unwrap();
    assert!(matches!(dir, Node::Directory(_)));
    assert_eq!(dir.key(), "dir1");
    assert_eq!(dir.attributes().perm, 0o555);

    let children = tree.list_children(&dir).await.unwrap();
    assert_eq!(children, vec![Entry::file("b.txt")]);

    let file = tree.resolve(&dir, "b.txt").await.unwrap();
    assert_eq!(file.key(), "dir1/b.txt");
    assert_eq!(tree.read(&file, 0, 100).await.unwrap(), Bytes::from("bravo"));
}

#[tokio::test]
async fn test_empty_store() {
    let tree = eager(&[]);

    assert!(tree.list_children(&tree.root()).await.unwrap().is_empty());

    let err = tree.resolve(&tree.root(), "anything").await.unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {}", err);
    assert_eq!(err.lookup_errno(), libc::ENOENT);
}

#[tokio::test]
async fn test_file_and_directory_collision() {
    let tree = eager(&[("x", "flat"), ("x/y.txt", "nested"), ("z", "ok")]);

    let partition = tree.partition_children(&tree.root()).await.unwrap();
    assert_eq!(partition.conflicts, vec!["x".to_string()]);

    // Listing leaves the ambiguous name out rather than picking a view
    let entries = tree.list_children(&tree.root()).await.unwrap();
    assert_eq!(entries, vec![Entry::file("z")]);

    let err = tree.resolve(&tree.root(), "x").await.unwrap_err();
    assert!(matches!(err, BucketFsError::AmbiguousEntry(ref key) if key == "x"));
}

#[tokio::test]
async fn test_listing_is_idempotent() {
    let tree = eager(&[
        ("a/1.txt", "1"),
        ("a/2.txt", "2"),
        ("b.txt", "b"),
        ("c/d/e.txt", "e"),
    ]);

    let first = tree.list_children(&tree.root()).await.unwrap();
    let second = tree.list_children(&tree.root()).await.unwrap();
    assert_eq!(entry_set(&first), entry_set(&second));
    assert_eq!(first.len(), 3);
}

#[tokio::test]
async fn test_every_listed_entry_resolves() {
    let tree = eager(&[
        ("docs/readme.md", "r"),
        ("docs/guide/intro.md", "i"),
        ("docs/guide/setup.md", "s"),
        ("img/logo.png", "png"),
        ("top.txt", "t"),
    ]);

    let mut pending = vec![tree.root()];
    let mut visited = 0;
    while let Some(dir) = pending.pop() {
        for entry in tree.list_children(&dir).await.unwrap() {
            let node = tree.resolve(&dir, &entry.name).await.unwrap();
            assert_eq!(node.attributes().kind, entry.kind, "kind of {}", node.key());
            visited += 1;
            if node.is_dir() {
                pending.push(node);
            }
        }
    }
    // docs, readme.md, guide, intro.md, setup.md, img, logo.png, top.txt
    assert_eq!(visited, 8);
}

#[tokio::test]
async fn test_dot_keys_are_not_listed() {
    let tree = eager(&[(".", "dot"), ("..", "dotdot"), ("../up.txt", "u"), ("ok.txt", "k")]);

    let entries = tree.list_children(&tree.root()).await.unwrap();
    assert_eq!(entries, vec![Entry::file("ok.txt")]);
    for entry in &entries {
        tree.resolve(&tree.root(), &entry.name).await.unwrap();
    }
}

#[tokio::test]
async fn test_directory_is_never_a_file() {
    let store = Arc::new(MemoryStore::with_objects([("dir1/b.txt", "b")]));
    let tree = Tree::new(store.clone(), ContentStrategy::Eager);

    let node = tree.resolve(&tree.root(), "dir1").await.unwrap();
    assert!(node.is_dir());
    assert!(store.get_object("dir1").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_directory_marker_objects() {
    let tree = eager(&[("empty/", ""), ("dir1/", ""), ("dir1/b.txt", "b")]);

    let root = tree.list_children(&tree.root()).await.unwrap();
    assert_eq!(root, vec![Entry::directory("dir1"), Entry::directory("empty")]);

    let empty = tree.resolve(&tree.root(), "empty").await.unwrap();
    assert!(tree.list_children(&empty).await.unwrap().is_empty());

    let dir1 = tree.resolve(&tree.root(), "dir1").await.unwrap();
    assert_eq!(tree.list_children(&dir1).await.unwrap(), vec![Entry::file("b.txt")]);
}

#[tokio::test]
async fn test_invalid_names_not_found() {
    let tree = eager(&[("a.txt", "a"), ("dir1/b.txt", "b")]);

    for name in ["", ".", "..", "dir1/b.txt"] {
        let err = tree.resolve(&tree.root(), name).await.unwrap_err();
        assert!(err.is_not_found(), "{:?} gave {}", name, err);
    }
}

#[tokio::test]
async fn test_file_nodes_have_no_children() {
    let tree = eager(&[("a.txt", "a")]);
    let file = tree.resolve(&tree.root(), "a.txt").await.unwrap();

    assert!(matches!(
        tree.list_children(&file).await,
        Err(BucketFsError::NotADirectory(_))
    ));
    assert!(matches!(
        tree.resolve(&file, "x").await,
        Err(BucketFsError::NotADirectory(_))
    ));
    assert!(matches!(
        tree.read(&tree.root(), 0, 10).await,
        Err(BucketFsError::IsADirectory(_))
    ));
}

#[tokio::test]
async fn test_read_offsets() {
    let tree = eager(&[("a.txt", "0123456789")]);
    let file = tree.resolve(&tree.root(), "a.txt").await.unwrap();

    assert_eq!(tree.read(&file, 2, 3).await.unwrap(), Bytes::from("234"));
    assert_eq!(tree.read(&file, 8, 10).await.unwrap(), Bytes::from("89"));
    assert!(tree.read(&file, 10, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_eager_fetches_once_at_resolution() {
    let store = Arc::new(CountingStore {
        inner: MemoryStore::with_objects([("big.bin", "abcdefgh")]),
        gets: AtomicUsize::new(0),
        ranges: AtomicUsize::new(0),
    });
    let tree = Tree::new(store.clone(), ContentStrategy::Eager);

    let file = tree.resolve(&tree.root(), "big.bin").await.unwrap();
    assert_eq!(store.gets.load(Ordering::SeqCst), 1);

    tree.read(&file, 0, 4).await.unwrap();
    tree.read(&file, 4, 4).await.unwrap();
    assert_eq!(store.gets.load(Ordering::SeqCst), 1);
    assert_eq!(store.ranges.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_lazy_reads_by_range() {
    let store = Arc::new(CountingStore {
        inner: MemoryStore::with_objects([("big.bin", "abcdefgh")]),
        gets: AtomicUsize::new(0),
        ranges: AtomicUsize::new(0),
    });
    let tree = Tree::new(store.clone(), ContentStrategy::Lazy);

    let file = tree.resolve(&tree.root(), "big.bin").await.unwrap();
    assert_eq!(file.attributes().size, 8);
    assert_eq!(store.gets.load(Ordering::SeqCst), 0);

    assert_eq!(tree.read(&file, 0, 4).await.unwrap(), Bytes::from("abcd"));
    assert_eq!(tree.read(&file, 6, 4).await.unwrap(), Bytes::from("gh"));
    // Past the end is answered without a request
    assert!(tree.read(&file, 8, 4).await.unwrap().is_empty());

    assert_eq!(store.gets.load(Ordering::SeqCst), 0);
    assert_eq!(store.ranges.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_backend_failure_is_distinguishable() {
    let tree = Tree::new(Arc::new(UnreachableStore), ContentStrategy::Eager);

    let err = tree.resolve(&tree.root(), "a.txt").await.unwrap_err();
    assert!(matches!(err, BucketFsError::BackendUnavailable { .. }));
    assert!(err.to_string().contains("connection refused"));
    // The kernel only ever sees an absent entry
    assert_eq!(err.lookup_errno(), libc::ENOENT);

    let err = tree.list_children(&tree.root()).await.unwrap_err();
    assert_eq!(err.to_errno(), libc::EIO);
}

#[tokio::test]
async fn test_resolution_reflects_store_changes() {
    let store = Arc::new(MemoryStore::with_objects([("d/a.txt", "a")]));
    let tree = Tree::new(store.clone(), ContentStrategy::Eager);

    assert!(tree.resolve(&tree.root(), "d").await.unwrap().is_dir());

    store.remove("d/a.txt");
    store.put("d", "now a file");

    let node = tree.resolve(&tree.root(), "d").await.unwrap();
    assert!(!node.is_dir());
    assert_eq!(node.attributes().size, 10);
}

#[tokio::test]
async fn test_concurrent_resolution() {
    let objects: Vec<(String, String)> = (0..32)
        .map(|i| (format!("dir{}/file{}.txt", i % 4, i), format!("content {}", i)))
        .collect();
    let store = MemoryStore::with_objects(objects);
    let tree = Arc::new(Tree::new(Arc::new(store), ContentStrategy::Eager));

    let mut handles = Vec::new();
    for d in 0..4 {
        let tree = tree.clone();
        handles.push(tokio::spawn(async move {
            let dir = tree.resolve(&tree.root(), &format!("dir{}", d)).await?;
            let entries = tree.list_children(&dir).await?;
            for entry in &entries {
                tree.resolve(&dir, &entry.name).await?;
            }
            Ok::<_, BucketFsError>(entries.len())
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 8);
    }
}
