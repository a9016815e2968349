use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use blobsync_types::Update;
use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::SdkResult;

/// A stream of updates from either a local or a remote subscription.
///
/// Local streams never yield errors. A remote stream yields an error when
/// the connection breaks or a frame is malformed, and ends after it.
pub struct UpdateStream {
    inner: Pin<Box<dyn Stream<Item = SdkResult<Update>> + Send>>,
}

impl UpdateStream {
    pub fn new(stream: impl Stream<Item = SdkResult<Update>> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// End the stream as soon as `signal` fires.
    pub fn until(self, signal: Option<&CancellationToken>) -> Self {
        match signal {
            Some(signal) => Self::new(self.take_until(signal.clone().cancelled_owned())),
            None => self,
        }
    }
}

impl Stream for UpdateStream {
    type Item = SdkResult<Update>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for UpdateStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateStream").finish_non_exhaustive()
    }
}
