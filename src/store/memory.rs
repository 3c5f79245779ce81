//! In-process object store
//!
//! Holds objects in an ordered map so prefix scans are range queries.
//! Used as the backend for tests and for trying the tree layer without
//! a remote bucket.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::trace;

use crate::error::{BucketFsError, Result};
use crate::store::{dir_prefix, join_key, ObjectStore, StoredObject};

/// Object store backed by a `BTreeMap`
#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from `(key, content)` pairs
    pub fn with_objects<K, V, I>(objects: I) -> Self
    where
        K: Into<String>,
        V: Into<Bytes>,
        I: IntoIterator<Item = (K, V)>,
    {
        let store = Self::new();
        for (key, body) in objects {
            store.put(key, body);
        }
        store
    }

    pub fn put(&self, key: impl Into<String>, body: impl Into<Bytes>) {
        self.objects.write().insert(key.into(), body.into());
    }

    pub fn remove(&self, key: &str) -> bool {
        self.objects.write().remove(key).is_some()
    }

    fn lookup(&self, key: &str) -> Result<Bytes> {
        self.objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| BucketFsError::NotFound(format!("No such key: {}", key)))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn is_directory(&self, parent_prefix: &str, name: &str) -> Result<bool> {
        let prefix = dir_prefix(&join_key(parent_prefix, name));
        let objects = self.objects.read();
        let found = objects
            .range(prefix.clone()..)
            .next()
            .map(|(key, _)| key.starts_with(&prefix))
            .unwrap_or(false);
        trace!("is_directory: prefix={} found={}", prefix, found);
        Ok(found)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self.objects.read();
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn get_object(&self, key: &str) -> Result<StoredObject> {
        let body = self.lookup(key)?;
        Ok(StoredObject {
            content_length: body.len() as u64,
            body,
        })
    }

    async fn head_object(&self, key: &str) -> Result<u64> {
        self.lookup(key).map(|body| body.len() as u64)
    }

    async fn get_range(&self, key: &str, offset: u64, size: u32) -> Result<Bytes> {
        let body = self.lookup(key)?;
        let len = body.len() as u64;
        if offset >= len {
            return Ok(Bytes::new());
        }
        let end = offset.saturating_add(size as u64).min(len);
        Ok(body.slice(offset as usize..end as usize))
    }
}
