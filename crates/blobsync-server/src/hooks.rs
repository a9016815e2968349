use async_trait::async_trait;
use axum::http::HeaderMap;
use blobsync_sdk::PutResult;
use blobsync_types::Meta;

use crate::error::ServerResult;

/// Server-side extension points.
#[async_trait]
pub trait ServerHook: Send + Sync {
    /// Runs before a GET/HEAD response is sent. Headers set here take
    /// precedence over the defaults (`Version`, `Content-Type`, `Editable`,
    /// `Merge-Type`), which are only filled in when absent.
    async fn before_send(&self, key: &str, meta: &Meta, headers: &mut HeaderMap) -> ServerResult<()>;

    /// Runs after a PUT has been applied or rejected as stale.
    async fn after_write(&self, key: &str, result: &PutResult) -> ServerResult<()>;
}

pub struct NoOpHook;

#[async_trait]
impl ServerHook for NoOpHook {
    async fn before_send(&self, _key: &str, _meta: &Meta, _headers: &mut HeaderMap) -> ServerResult<()> {
        Ok(())
    }

    async fn after_write(&self, _key: &str, _result: &PutResult) -> ServerResult<()> {
        Ok(())
    }
}
