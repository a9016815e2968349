use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use async_trait::async_trait;
use blobsync_types::Meta;
use bytes::Bytes;

use crate::error::StoreResult;
use crate::traits::{BlobBackend, MetaStore};

/// In-memory, HashMap-based blob backend.
///
/// Intended for tests and for sync targets that should not touch disk.
/// `Bytes` values are reference counted, so reads are cheap clones.
pub struct InMemoryBlobBackend {
    blobs: RwLock<HashMap<String, Bytes>>,
}

impl InMemoryBlobBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }

    /// Sorted list of all stored keys.
    pub fn keys(&self) -> Vec<String> {
        let map = self.blobs.read().expect("lock poisoned");
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for InMemoryBlobBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryBlobBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryBlobBackend")
            .field("len", &self.len())
            .finish()
    }
}

#[async_trait]
impl BlobBackend for InMemoryBlobBackend {
    async fn read(&self, key: &str) -> StoreResult<Option<Bytes>> {
        Ok(self.blobs.read().expect("lock poisoned").get(key).cloned())
    }

    async fn write(&self, key: &str, body: Bytes) -> StoreResult<()> {
        self.blobs
            .write()
            .expect("lock poisoned")
            .insert(key.to_string(), body);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.blobs.write().expect("lock poisoned").remove(key);
        Ok(())
    }
}

/// In-memory metadata store.
#[derive(Default)]
pub struct InMemoryMetaStore {
    records: RwLock<HashMap<String, Meta>>,
}

impl InMemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for InMemoryMetaStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.records.read().expect("lock poisoned").len();
        f.debug_struct("InMemoryMetaStore").field("len", &len).finish()
    }
}

#[async_trait]
impl MetaStore for InMemoryMetaStore {
    async fn read_meta(&self, key: &str) -> StoreResult<Meta> {
        let map = self.records.read().expect("lock poisoned");
        Ok(map.get(key).cloned().unwrap_or_default())
    }

    async fn write_meta(&self, key: &str, meta: &Meta) -> StoreResult<()> {
        self.records
            .write()
            .expect("lock poisoned")
            .insert(key.to_string(), meta.clone());
        Ok(())
    }

    async fn delete_meta(&self, key: &str) -> StoreResult<()> {
        self.records.write().expect("lock poisoned").remove(key);
        Ok(())
    }
}
