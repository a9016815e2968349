use std::fmt;
use std::sync::Arc;

use blobsync_fabric::{KeySerializer, Subscription, SubscriptionRegistry};
use blobsync_store::{
    load_or_create_peer, purge_scratch_files, BlobBackend, FsBlobBackend, FsMetaStore,
    InMemoryBlobBackend, InMemoryMetaStore, MetaStore, StoreConfig,
};
use blobsync_types::{Meta, PeerId, Update, Version, VersionClock};
use bytes::Bytes;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{SdkError, SdkResult};
use crate::options::{DeleteOptions, GetOptions, Outcome, PutOptions, PutResult, Snapshot};

/// How the store gets its backends on first use.
enum Source {
    Fs(StoreConfig),
    Custom {
        blobs: Arc<dyn BlobBackend>,
        meta: Arc<dyn MetaStore>,
        peer: Option<String>,
    },
}

/// Backends and identity, resolved once.
struct Ready {
    peer: PeerId,
    blobs: Arc<dyn BlobBackend>,
    meta: Arc<dyn MetaStore>,
}

struct Inner {
    source: Source,
    ready: OnceCell<Ready>,
    fiber: KeySerializer,
    registry: SubscriptionRegistry,
    clock: VersionClock,
}

/// A versioned blob store instance.
///
/// Each key holds exactly one current `(version, content_type, body)`. All
/// operations on a key run through that key's serializer slot, so "read the
/// current version, decide, write, notify" is atomic with respect to other
/// operations on the same key. Subscribers and queues belong to this
/// instance alone.
///
/// Cloning is cheap and shares the instance.
#[derive(Clone)]
pub struct BlobStore {
    inner: Arc<Inner>,
}

/// A registered local subscription.
#[derive(Debug)]
pub struct LocalSubscription {
    /// The version current when the subscription was registered.
    pub current: Option<Version>,
    pub content_type: Option<String>,
    /// Catch-up (if any) followed by every later update.
    pub updates: Subscription,
}

impl BlobStore {
    fn from_source(source: Source) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                ready: OnceCell::new(),
                fiber: KeySerializer::new(),
                registry: SubscriptionRegistry::new(),
                clock: VersionClock::new(),
            }),
        }
    }

    /// A filesystem-backed store. Directories are created on first use.
    pub fn new(config: StoreConfig) -> Self {
        Self::from_source(Source::Fs(config))
    }

    /// A store over caller-supplied backends.
    pub fn with_backends(
        blobs: Arc<dyn BlobBackend>,
        meta: Arc<dyn MetaStore>,
        peer: Option<String>,
    ) -> Self {
        Self::from_source(Source::Custom { blobs, meta, peer })
    }

    /// A purely in-memory store.
    pub fn in_memory() -> Self {
        Self::with_backends(
            Arc::new(InMemoryBlobBackend::new()),
            Arc::new(InMemoryMetaStore::new()),
            None,
        )
    }

    /// Resolve backends and identity. Runs once; later calls are free.
    pub async fn init(&self) -> SdkResult<()> {
        self.ready().await.map(|_| ())
    }

    async fn ready(&self) -> SdkResult<&Ready> {
        self.inner
            .ready
            .get_or_try_init(|| resolve(&self.inner.source))
            .await
    }

    /// This instance's identity, used as the prefix of generated versions.
    pub async fn peer(&self) -> SdkResult<PeerId> {
        Ok(self.ready().await?.peer.clone())
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    pub fn serializer(&self) -> &KeySerializer {
        &self.inner.fiber
    }

    /// Read the current state of `key`.
    ///
    /// Returns `Ok(Done(None))` if the key does not exist, and
    /// [`SdkError::VersionUnknown`] if the requested version or parents are
    /// newer than the current version.
    pub async fn get(&self, key: &str, mut opts: GetOptions) -> SdkResult<Outcome<Option<Snapshot>>> {
        opts.normalize()?;
        if opts.common.is_aborted() {
            return Ok(Outcome::Aborted);
        }
        let ready = self.ready().await?;
        let _slot = self.inner.fiber.acquire(key).await;
        if opts.common.is_aborted() {
            return Ok(Outcome::Aborted);
        }

        let meta = ready.meta.read_meta(key).await?;
        let Some(current) = meta.version else {
            debug!(key, "get: not found");
            return Ok(Outcome::Done(None));
        };
        check_known(key, &current, opts.requested_version())?;
        check_known(key, &current, opts.requested_parents())?;

        let body = if opts.head {
            None
        } else {
            let blobs = opts.common.db.as_ref().unwrap_or(&ready.blobs);
            Some(blobs.read(key).await?.unwrap_or_default())
        };
        debug!(key, version = %current, head = opts.head, "get");
        Ok(Outcome::Done(Some(Snapshot {
            version: current,
            content_type: meta.content_type,
            body,
        })))
    }

    /// Register a live subscription to `key`.
    ///
    /// If the current version is newer than `parents` (absent parents being
    /// the minimum), the full current content is queued as the first update.
    /// Subscribing to a missing key is allowed and yields only future writes.
    pub async fn subscribe(
        &self,
        key: &str,
        mut opts: GetOptions,
    ) -> SdkResult<Outcome<LocalSubscription>> {
        opts.normalize()?;
        if opts.common.is_aborted() {
            return Ok(Outcome::Aborted);
        }
        let ready = self.ready().await?;
        let _slot = self.inner.fiber.acquire(key).await;
        if opts.common.is_aborted() {
            return Ok(Outcome::Aborted);
        }

        let meta = ready.meta.read_meta(key).await?;
        if let Some(current) = &meta.version {
            check_known(key, current, opts.requested_version())?;
            check_known(key, current, opts.requested_parents())?;
        }

        let catch_up = match &meta.version {
            Some(current) if current.is_newer_than(opts.requested_parents()) => {
                let blobs = opts.common.db.as_ref().unwrap_or(&ready.blobs);
                Some(Update::Value {
                    version: current.clone(),
                    content_type: meta.content_type.clone(),
                    body: blobs.read(key).await?.unwrap_or_default(),
                })
            }
            _ => None,
        };

        let peer = opts
            .common
            .peer
            .clone()
            .unwrap_or_else(|| PeerId::generate().as_str().to_string());
        debug!(key, %peer, catch_up = catch_up.is_some(), "subscribe");
        let updates = self.inner.registry.subscribe(key, &peer, catch_up);
        Ok(Outcome::Done(LocalSubscription {
            current: meta.version,
            content_type: meta.content_type,
            updates,
        }))
    }

    /// Subscribe and feed every update to `deliver` until the options'
    /// signal fires. Each delivery completes before the next begins.
    pub async fn subscribe_with<F, Fut>(&self, key: &str, opts: GetOptions, deliver: F) -> SdkResult<Outcome<()>>
    where
        F: FnMut(Update) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let signal = opts.common.signal.clone().unwrap_or_default();
        match self.subscribe(key, opts).await? {
            Outcome::Aborted => Ok(Outcome::Aborted),
            Outcome::Done(sub) => {
                sub.updates.for_each(signal, deliver).await;
                Ok(Outcome::Done(()))
            }
        }
    }

    /// Write a new value for `key`.
    ///
    /// An explicit version is accepted only if it is newer than the current
    /// one; otherwise the write is a no-op reported as [`PutResult::Stale`].
    /// Without a version the store generates the next one. Accepted writes
    /// are published to every subscriber except `opts.peer`.
    ///
    /// Once the key's slot is acquired, the blob write, metadata write and
    /// notification complete even if the caller stops waiting.
    pub async fn put(&self, key: &str, body: Bytes, mut opts: PutOptions) -> SdkResult<Outcome<PutResult>> {
        opts.normalize()?;
        if opts.common.is_aborted() {
            return Ok(Outcome::Aborted);
        }
        self.ready().await?;
        let slot = self.inner.fiber.acquire(key).await;
        if opts.common.is_aborted() {
            return Ok(Outcome::Aborted);
        }

        let store = self.clone();
        let key = key.to_string();
        let commit = tokio::spawn(async move {
            let _slot = slot;
            store.commit_put(&key, body, opts).await
        });
        let result = commit
            .await
            .map_err(|e| SdkError::Internal(format!("put task failed: {e}")))??;
        Ok(Outcome::Done(result))
    }

    /// Decide and apply one put under the key's slot.
    ///
    /// The blob is written before its metadata, and each write is atomic on
    /// its own. If the process dies (or the metadata write fails) between the
    /// two, the key keeps its previous version and content type while the
    /// backend already holds the new body. The write is then lost as far as
    /// versions go: nothing is published, the caller gets the error, and the
    /// next accepted put for the key overwrites both.
    async fn commit_put(&self, key: &str, body: Bytes, opts: PutOptions) -> SdkResult<PutResult> {
        let ready = self.ready().await?;
        let meta = ready.meta.read_meta(key).await?;
        let current = meta.version.as_ref();

        let version = match opts.requested_version() {
            Some(supplied) if supplied.is_newer_than(current) => supplied.clone(),
            Some(supplied) => {
                warn!(key, version = %supplied, current = ?current, "rejected stale put");
                return Ok(PutResult::Stale {
                    current: meta.version.clone(),
                });
            }
            None => self.inner.clock.next(ready.peer.as_str(), current),
        };
        let content_type = opts.content_type.clone().or(meta.content_type);

        let blobs = opts.common.db.as_ref().unwrap_or(&ready.blobs);
        blobs.write(key, body.clone()).await?;
        ready
            .meta
            .write_meta(key, &Meta::new(version.clone(), content_type.clone()))
            .await?;

        let delivered = self.inner.registry.publish(
            key,
            opts.common.peer.as_deref(),
            &Update::Value {
                version: version.clone(),
                content_type,
                body,
            },
        );
        debug!(key, %version, delivered, "put accepted");
        Ok(PutResult::Accepted(version))
    }

    /// Delete `key`. Deleting a missing key succeeds.
    ///
    /// Subscribers other than `opts.peer` receive a tombstone when the key
    /// existed.
    pub async fn delete(&self, key: &str, mut opts: DeleteOptions) -> SdkResult<Outcome<()>> {
        opts.normalize()?;
        if opts.common.is_aborted() {
            return Ok(Outcome::Aborted);
        }
        self.ready().await?;
        let slot = self.inner.fiber.acquire(key).await;
        if opts.common.is_aborted() {
            return Ok(Outcome::Aborted);
        }

        let store = self.clone();
        let key = key.to_string();
        let commit = tokio::spawn(async move {
            let _slot = slot;
            store.commit_delete(&key, opts).await
        });
        commit
            .await
            .map_err(|e| SdkError::Internal(format!("delete task failed: {e}")))??;
        Ok(Outcome::Done(()))
    }

    async fn commit_delete(&self, key: &str, opts: DeleteOptions) -> SdkResult<()> {
        let ready = self.ready().await?;
        let meta = ready.meta.read_meta(key).await?;

        let blobs = opts.common.db.as_ref().unwrap_or(&ready.blobs);
        blobs.delete(key).await?;
        ready.meta.delete_meta(key).await?;

        if meta.exists() {
            let delivered = self.inner.registry.publish(
                key,
                opts.common.peer.as_deref(),
                &Update::Delete {
                    content_type: meta.content_type,
                },
            );
            debug!(key, delivered, "deleted");
        }
        Ok(())
    }

    /// A token that is already cancelled; handy for probing abort paths.
    pub fn cancelled_signal() -> CancellationToken {
        let token = CancellationToken::new();
        token.cancel();
        token
    }
}

async fn resolve(source: &Source) -> SdkResult<Ready> {
    match source {
        Source::Fs(config) => {
            let temp_dir = config.temp_dir();
            let blobs = FsBlobBackend::open(&config.db_dir, temp_dir).await?;
            let meta = FsMetaStore::open(&config.meta_dir, temp_dir).await?;
            purge_scratch_files(temp_dir).await?;
            let peer = load_or_create_peer(&config.meta_dir, config.peer.as_deref()).await?;
            tracing::info!(
                %peer,
                db = %config.db_dir.display(),
                meta = %config.meta_dir.display(),
                "blob store ready"
            );
            Ok(Ready {
                peer,
                blobs: Arc::new(blobs),
                meta: Arc::new(meta),
            })
        }
        Source::Custom { blobs, meta, peer } => Ok(Ready {
            peer: match peer {
                Some(peer) => PeerId::new(peer.clone())?,
                None => PeerId::generate(),
            },
            blobs: blobs.clone(),
            meta: meta.clone(),
        }),
    }
}

/// Fail with `VersionUnknown` if `requested` is newer than `current`.
fn check_known(key: &str, current: &Version, requested: Option<&Version>) -> SdkResult<()> {
    match requested {
        Some(requested) if requested.is_newer_than(Some(current)) => {
            Err(SdkError::VersionUnknown {
                key: key.to_string(),
            })
        }
        _ => Ok(()),
    }
}

impl fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("BlobStore");
        if let Source::Fs(config) = &self.inner.source {
            s.field("db_dir", &config.db_dir);
        }
        s.field("peer", &self.inner.ready.get().map(|r| r.peer.clone()))
            .field("subscribed_keys", &self.inner.registry.key_count())
            .finish()
    }
}
