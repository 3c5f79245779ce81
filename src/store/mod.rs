pub mod memory;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Delimiter that encodes hierarchy inside flat object keys
pub const DELIMITER: char = '/';

/// Full content of an object as fetched from the store
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    /// Length reported by the store, which is what the filesystem exposes
    pub content_length: u64,
}

/// Join a parent key and a child name with the delimiter.
///
/// The root is the empty key, so its children are addressed by bare name.
pub fn join_key(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", parent, DELIMITER, name)
    }
}

/// Listing prefix for the directory identified by `key`.
pub fn dir_prefix(key: &str) -> String {
    if key.is_empty() {
        String::new()
    } else {
        format!("{}{}", key, DELIMITER)
    }
}

/// Read-only capability contract over a flat key space
///
/// Keys passed in and returned are relative to the store's root; a store
/// mounted at a bucket sub-prefix hides that prefix from callers.
/// Implementations must be safe for concurrent use from many in-flight
/// filesystem calls.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// True if any key exists under `parent_prefix/name/`.
    ///
    /// This is a bounded existence probe, not an enumeration.
    async fn is_directory(&self, parent_prefix: &str, name: &str) -> Result<bool>;

    /// Keys beginning with `prefix` (empty for the root).
    ///
    /// A key ending in the delimiter stands for everything beneath it, which
    /// lets backends report one level at a time.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Fetch the full content and size of an object.
    ///
    /// Fails with `NotFound` if no object has exactly this key.
    async fn get_object(&self, key: &str) -> Result<StoredObject>;

    /// Content length of an object without fetching its body.
    async fn head_object(&self, key: &str) -> Result<u64>;

    /// Fetch `size` bytes starting at `offset`.
    ///
    /// The returned buffer is shorter than `size` when the range crosses the
    /// end of the object, and empty when `offset` is at or past it.
    async fn get_range(&self, key: &str, offset: u64, size: u32) -> Result<Bytes>;
}
