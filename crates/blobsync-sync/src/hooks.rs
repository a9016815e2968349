use async_trait::async_trait;
use blobsync_sdk::{Endpoint, Version};

use crate::error::{SyncError, SyncResult};

/// Callbacks around the life of a sync session.
///
/// `remote` is the endpoint the session talks to over the network (or the
/// second endpoint when both sides are the same kind).
#[async_trait]
pub trait SyncHooks: Send + Sync {
    /// Runs before every connection attempt. An error skips the attempt and
    /// counts as a failure.
    async fn on_pre_connect(&self, remote: &Endpoint) -> SyncResult<()>;

    /// The remote subscription is open; `current` is the version it reported.
    async fn on_res(&self, remote: &Endpoint, current: Option<&Version>);

    /// The remote answered 401 or 403.
    async fn on_unauthorized(&self, remote: &Endpoint, status: u16);

    /// The session ended with `error` and will reconnect unless stopped.
    async fn on_disconnect(&self, error: &SyncError);
}

pub struct NoOpHooks;

#[async_trait]
impl SyncHooks for NoOpHooks {
    async fn on_pre_connect(&self, _remote: &Endpoint) -> SyncResult<()> {
        Ok(())
    }

    async fn on_res(&self, _remote: &Endpoint, _current: Option<&Version>) {}

    async fn on_unauthorized(&self, _remote: &Endpoint, _status: u16) {}

    async fn on_disconnect(&self, _error: &SyncError) {}
}
