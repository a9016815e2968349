use async_trait::async_trait;
use blobsync_types::Meta;
use bytes::Bytes;

use crate::error::StoreResult;

/// Pluggable storage for blob content.
///
/// All implementations must satisfy these invariants:
/// - A reader never observes a partially written value: `write` either
///   replaces the whole content or leaves the previous content in place.
/// - `delete` of an absent key succeeds.
/// - The backend never interprets the bytes it stores.
/// - All I/O errors are propagated, never silently ignored.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Read the content for `key`.
    ///
    /// Returns `Ok(None)` if the key has no content.
    async fn read(&self, key: &str) -> StoreResult<Option<Bytes>>;

    /// Replace the content for `key`.
    async fn write(&self, key: &str, body: Bytes) -> StoreResult<()>;

    /// Remove the content for `key`. Idempotent.
    async fn delete(&self, key: &str) -> StoreResult<()>;
}

/// Per-key `{version, content_type}` records.
///
/// `read_meta` of an unknown key returns [`Meta::default`], whose `version`
/// is `None`. `write_meta` is atomic with respect to crashes: after a crash
/// the record holds either the old or the new value.
#[async_trait]
pub trait MetaStore: Send + Sync {
    async fn read_meta(&self, key: &str) -> StoreResult<Meta>;

    async fn write_meta(&self, key: &str, meta: &Meta) -> StoreResult<()>;

    /// Remove the record for `key`. Idempotent.
    async fn delete_meta(&self, key: &str) -> StoreResult<()>;
}
