//! bucketfs: mount an object-store bucket as a read-only filesystem
//!
//! Object stores address data by flat keys; by convention a `/` inside a
//! key implies hierarchy (`a/b/c.txt` implies directories `a` and `a/b`).
//! This crate materializes that implied tree on demand and serves it
//! through FUSE.
//!
//! # Architecture
//!
//! - **Stores**: the [`store::ObjectStore`] contract (list by prefix, fetch,
//!   directory probe) with an S3 backend and an in-memory backend.
//! - **Tree**: classifies names as files or directories, partitions prefix
//!   listings into immediate children and synthesizes attributes.
//! - **FUSE Adapter**: translates kernel requests into tree operations and
//!   owns the inode table that keeps resolved nodes alive.
//! - **Mount Manager**: handles lifecycle of the configured mounts.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bucketfs::store::memory::MemoryStore;
//! use bucketfs::tree::{ContentStrategy, Tree};
//!
//! # async fn example() -> bucketfs::Result<()> {
//! let store = MemoryStore::with_objects([("dir1/b.txt", "hello")]);
//! let tree = Tree::new(Arc::new(store), ContentStrategy::Eager);
//!
//! let dir = tree.resolve(&tree.root(), "dir1").await?;
//! for entry in tree.list_children(&dir).await? {
//!     println!("{} {:?}", entry.name, entry.kind);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod env;
pub mod error;
pub mod fuse;
pub mod mount;
pub mod store;
pub mod tree;

pub use error::{BucketFsError, Result};
