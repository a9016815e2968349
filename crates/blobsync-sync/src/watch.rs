//! Follow a remote URL and react to every newer version.

use blobsync_sdk::{GetOptions, Outcome, PeerId, RemoteClient, SdkError, Snapshot, Update, Version};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::state::ReconnectPolicy;

/// A running watcher. Dropping the handle does not stop it; call
/// [`Watcher::stop`].
#[derive(Debug)]
pub struct Watcher {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Watcher {
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop and wait for the background task to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "watch task failed");
        }
    }
}

/// Subscribe to `url` and keep the subscription alive.
///
/// `on_update` sees each value whose version is strictly newer than the last
/// one delivered; older or repeated versions (e.g. a catch-up replayed after
/// a reconnect) are skipped. `on_delete` runs for tombstones, after which
/// any version counts as newer again. Failures are retried with `policy`.
pub fn watch<U, D>(client: RemoteClient, url: Url, policy: ReconnectPolicy, on_update: U, on_delete: D) -> Watcher
where
    U: FnMut(Snapshot) + Send + 'static,
    D: FnMut() + Send + 'static,
{
    let cancel = CancellationToken::new();
    let state = WatchLoop {
        client,
        url,
        policy,
        peer: PeerId::generate().as_str().to_string(),
        cancel: cancel.clone(),
        last: None,
    };
    let task = tokio::spawn(state.run(on_update, on_delete));
    Watcher { cancel, task }
}

struct WatchLoop {
    client: RemoteClient,
    url: Url,
    policy: ReconnectPolicy,
    peer: String,
    cancel: CancellationToken,
    last: Option<Version>,
}

impl WatchLoop {
    async fn run<U, D>(mut self, mut on_update: U, mut on_delete: D)
    where
        U: FnMut(Snapshot),
        D: FnMut(),
    {
        let mut attempt = 0u32;
        while !self.cancel.is_cancelled() {
            match self.follow(&mut attempt, &mut on_update, &mut on_delete).await {
                Ok(()) => break,
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    let delay = self.policy.delay(attempt);
                    warn!(url = %self.url, attempt, error = %e, "watch interrupted, retrying");
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
        debug!(url = %self.url, "watch stopped");
    }

    /// One subscription. `Ok` only when cancelled.
    async fn follow<U, D>(&mut self, attempt: &mut u32, on_update: &mut U, on_delete: &mut D) -> Result<(), SdkError>
    where
        U: FnMut(Snapshot),
        D: FnMut(),
    {
        let sub = match self.client.subscribe(&self.url, self.options(true)).await {
            Err(SdkError::VersionUnknown { .. }) if self.last.is_some() => {
                self.client.subscribe(&self.url, self.options(false)).await?
            }
            other => other?,
        };
        let Outcome::Done(mut sub) = sub else {
            return Ok(());
        };
        *attempt = 0;
        debug!(url = %self.url, current = ?sub.current, "watching");

        while let Some(update) = sub.updates.next().await {
            match update? {
                Update::Value {
                    version,
                    content_type,
                    body,
                } => {
                    if !version.is_newer_than(self.last.as_ref()) {
                        continue;
                    }
                    self.last = Some(version.clone());
                    on_update(Snapshot {
                        version,
                        content_type,
                        body: Some(body),
                    });
                }
                Update::Delete { .. } => {
                    self.last = None;
                    on_delete();
                }
            }
        }
        Ok(())
    }

    fn options(&self, with_parents: bool) -> GetOptions {
        let opts = GetOptions::new().peer(&self.peer).signal(self.cancel.clone());
        match (&self.last, with_parents) {
            (Some(last), true) => opts.parents(last.clone()),
            _ => opts,
        }
    }
}
