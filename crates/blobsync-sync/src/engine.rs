//! Live two-way replication between two endpoints.
//!
//! A session links a local key and a remote URL. It first works out how far
//! the two sides already agree (the fork point), then runs both directions
//! at once:
//!
//! - local → remote: a local subscription whose updates are `put` (or
//!   `delete`d) on the remote with their original version
//! - remote → local: a remote subscription forwarded into the local store
//!
//! Both directions carry the session's peer id, so neither side echoes our
//! own writes back. Whichever direction fails first ends the session, and
//! the supervisor reconnects after a delay until the handle is stopped.

use std::fmt;
use std::sync::Arc;

use blobsync_sdk::{
    DeleteOptions, Endpoint, GetOptions, Outcome, PeerId, PutOptions, SdkError, Update,
    UpdateStream, Version,
};
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::hooks::{NoOpHooks, SyncHooks};
use crate::state::{ReconnectPolicy, SyncState};

/// Options for [`sync`].
#[derive(Clone)]
pub struct SyncOptions {
    /// Peer id the session uses on both sides. Generated when unset.
    pub peer: Option<String>,
    pub reconnect: ReconnectPolicy,
    pub hooks: Arc<dyn SyncHooks>,
    /// Stops the session when cancelled, like [`SyncHandle::stop`].
    pub signal: Option<CancellationToken>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            peer: None,
            reconnect: ReconnectPolicy::default(),
            hooks: Arc::new(NoOpHooks),
            signal: None,
        }
    }
}

impl SyncOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn SyncHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }
}

impl fmt::Debug for SyncOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOptions")
            .field("peer", &self.peer)
            .field("reconnect", &self.reconnect)
            .field("signal", &self.signal.is_some())
            .finish_non_exhaustive()
    }
}

/// Handle to a running sync session.
#[derive(Debug)]
pub struct SyncHandle {
    cancel: CancellationToken,
    state: watch::Receiver<SyncState>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<SyncState> {
        self.state.clone()
    }

    /// Wait until the state satisfies `pred`. Returns the matching state, or
    /// `Closed` if the session ends first.
    pub async fn wait_for(&self, pred: impl Fn(SyncState) -> bool) -> SyncState {
        let mut rx = self.state.clone();
        let state = match rx.wait_for(|s| pred(*s) || s.is_closed()).await {
            Ok(state) => *state,
            Err(_) => SyncState::Closed,
        };
        state
    }

    /// Abort the session. No further reconnects happen.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop the session and wait for it to wind down.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "sync task failed");
        }
    }
}

/// Start replicating between `a` and `b`.
///
/// Runs in the background until the handle is stopped or the options'
/// signal fires. When exactly one side is remote it becomes the session's
/// remote; otherwise both sides are subscribed without parents and updates
/// flow both ways.
pub fn sync(a: Endpoint, b: Endpoint, opts: SyncOptions) -> SyncHandle {
    let cancel = opts
        .signal
        .as_ref()
        .map(CancellationToken::child_token)
        .unwrap_or_default();
    let (state_tx, state_rx) = watch::channel(SyncState::Disconnected);

    let peer = opts
        .peer
        .clone()
        .unwrap_or_else(|| PeerId::generate().as_str().to_string());
    let link = match (a.is_remote(), b.is_remote()) {
        (false, true) => Link::Mirror { local: a, remote: b },
        (true, false) => Link::Mirror { local: b, remote: a },
        _ => Link::Symmetric { a, b },
    };
    let supervisor = Supervisor {
        link,
        peer,
        policy: opts.reconnect,
        hooks: opts.hooks,
        cancel: cancel.clone(),
        state: state_tx,
    };
    let task = tokio::spawn(supervisor.run());

    SyncHandle {
        cancel,
        state: state_rx,
        task,
    }
}

enum Link {
    Mirror { local: Endpoint, remote: Endpoint },
    Symmetric { a: Endpoint, b: Endpoint },
}

impl Link {
    fn remote(&self) -> &Endpoint {
        match self {
            Link::Mirror { remote, .. } => remote,
            Link::Symmetric { b, .. } => b,
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Link::Mirror { local, remote } => write!(f, "{local} <-> {remote}"),
            Link::Symmetric { a, b } => write!(f, "{a} <=> {b}"),
        }
    }
}

/// One open direction: updates read from `from`'s subscription and written
/// to `to`.
struct Pump {
    updates: UpdateStream,
    to: Endpoint,
}

struct Supervisor {
    link: Link,
    peer: String,
    policy: ReconnectPolicy,
    hooks: Arc<dyn SyncHooks>,
    cancel: CancellationToken,
    state: watch::Sender<SyncState>,
}

impl Supervisor {
    async fn run(self) {
        let mut attempt = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.state.send_replace(SyncState::Connecting);

            // One child token per attempt: cancelling it tears down both
            // directions of this attempt only.
            let session = self.cancel.child_token();
            let result = self.session(&session, &mut attempt).await;
            session.cancel();
            if self.cancel.is_cancelled() {
                break;
            }

            let error = match result {
                Ok(()) => SyncError::LinkClosed(self.link.to_string()),
                Err(e) => e,
            };
            warn!(link = %self.link, error = %error, "sync session ended");
            self.hooks.on_disconnect(&error).await;

            attempt = attempt.saturating_add(1);
            self.state.send_replace(SyncState::Backoff { attempt });
            let delay = self.policy.delay(attempt);
            debug!(attempt, ?delay, "waiting before reconnect");
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        self.state.send_replace(SyncState::Closed);
        info!(link = %self.link, "sync closed");
    }

    async fn session(&self, signal: &CancellationToken, attempt: &mut u32) -> SyncResult<()> {
        let remote = self.link.remote();
        self.hooks.on_pre_connect(remote).await?;

        let connected = tokio::select! {
            _ = signal.cancelled() => return Ok(()),
            pumps = self.connect(signal) => pumps?,
        };
        let Some((first, second)) = connected else {
            return Ok(());
        };
        *attempt = 0;
        self.state.send_replace(SyncState::Connected);
        info!(link = %self.link, peer = %self.peer, "sync connected");

        // The first direction to stop ends the attempt; the other is
        // dropped, so concurrent failures produce a single reconnect.
        tokio::select! {
            _ = signal.cancelled() => Ok(()),
            r = self.pump(first, signal) => r,
            r = self.pump(second, signal) => r,
        }
    }

    async fn connect(&self, signal: &CancellationToken) -> SyncResult<Option<(Pump, Pump)>> {
        match &self.link {
            Link::Mirror { local, remote } => self.connect_mirror(local, remote, signal).await,
            Link::Symmetric { a, b } => {
                let Some(from_a) = self.open(a, None, signal).await? else {
                    return Ok(None);
                };
                let Some(from_b) = self.open(b, None, signal).await? else {
                    return Ok(None);
                };
                self.hooks.on_res(b, from_b.0.as_ref()).await;
                Ok(Some((
                    Pump { updates: from_a.1, to: b.clone() },
                    Pump { updates: from_b.1, to: a.clone() },
                )))
            }
        }
    }

    async fn connect_mirror(
        &self,
        local: &Endpoint,
        remote: &Endpoint,
        signal: &CancellationToken,
    ) -> SyncResult<Option<(Pump, Pump)>> {
        let head = GetOptions::new().head().peer(&self.peer).signal(signal.clone());
        let local_version = match local.get(head).await? {
            Outcome::Done(snapshot) => snapshot.map(|s| s.version),
            Outcome::Aborted => return Ok(None),
        };

        let remote_has_ours = match &local_version {
            Some(version) => self.remote_has(remote, version, signal).await?,
            None => false,
        };
        debug!(
            link = %self.link,
            local_version = ?local_version,
            remote_has_ours,
            "fork point"
        );

        let ours_parents = if remote_has_ours { local_version.clone() } else { None };
        let Some((_, outgoing)) = self.open(local, ours_parents, signal).await? else {
            return Ok(None);
        };

        let incoming = match self.open(remote, local_version.clone(), signal).await {
            Err(SyncError::Sdk(SdkError::VersionUnknown { .. })) if local_version.is_some() => {
                debug!(link = %self.link, "remote does not know our version, full resync");
                self.open(remote, None, signal).await?
            }
            other => other?,
        };
        let Some((current, incoming)) = incoming else {
            return Ok(None);
        };
        self.hooks.on_res(remote, current.as_ref()).await;

        Ok(Some((
            Pump { updates: outgoing, to: remote.clone() },
            Pump { updates: incoming, to: local.clone() },
        )))
    }

    /// Whether `remote` holds `version` or something newer.
    async fn remote_has(&self, remote: &Endpoint, version: &Version, signal: &CancellationToken) -> SyncResult<bool> {
        let opts = GetOptions::new()
            .head()
            .version(version.clone())
            .peer(&self.peer)
            .signal(signal.clone());
        match remote.get(opts).await {
            Ok(Outcome::Done(found)) => Ok(found.is_some()),
            Ok(Outcome::Aborted) => Ok(false),
            Err(SdkError::VersionUnknown { .. }) => Ok(false),
            Err(e) => Err(self.classify(remote, e).await),
        }
    }

    async fn open(
        &self,
        from: &Endpoint,
        parents: Option<Version>,
        signal: &CancellationToken,
    ) -> SyncResult<Option<(Option<Version>, UpdateStream)>> {
        let mut opts = GetOptions::new().peer(&self.peer).signal(signal.clone());
        if let Some(parents) = parents {
            opts = opts.parents(parents);
        }
        match from.subscribe(opts).await {
            Ok(Outcome::Done(sub)) => Ok(Some((sub.current, sub.updates))),
            Ok(Outcome::Aborted) => Ok(None),
            Err(e) => Err(self.classify(from, e).await),
        }
    }

    async fn pump(&self, pump: Pump, signal: &CancellationToken) -> SyncResult<()> {
        let Pump { mut updates, to } = pump;
        while let Some(update) = updates.next().await {
            let update = update?;
            if let Err(e) = self.forward(&update, &to, signal).await {
                return Err(self.classify(&to, e).await);
            }
        }
        Ok(())
    }

    async fn forward(&self, update: &Update, to: &Endpoint, signal: &CancellationToken) -> Result<(), SdkError> {
        match update {
            Update::Value {
                version,
                content_type,
                body,
            } => {
                let mut opts = PutOptions::new()
                    .version(version.clone())
                    .peer(&self.peer)
                    .signal(signal.clone());
                if let Some(content_type) = content_type {
                    opts = opts.content_type(content_type);
                }
                let result = to.put(body.clone(), opts).await?;
                debug!(to = %to, %version, ?result, "forwarded update");
            }
            Update::Delete { .. } => {
                let opts = DeleteOptions::new().peer(&self.peer).signal(signal.clone());
                to.delete(opts).await?;
                debug!(to = %to, "forwarded delete");
            }
        }
        Ok(())
    }

    async fn classify(&self, endpoint: &Endpoint, err: SdkError) -> SyncError {
        match err {
            SdkError::Unauthorized { status, .. } => {
                self.hooks.on_unauthorized(endpoint, status).await;
                SyncError::Unauthorized {
                    endpoint: endpoint.to_string(),
                    status,
                }
            }
            other => SyncError::Sdk(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use blobsync_sdk::{BlobStore, RemoteClient, Snapshot};
    use bytes::Bytes;

    async fn wait_for_body(store: &BlobStore, key: &str, want: &str) -> Snapshot {
        for _ in 0..200 {
            if let Some(snap) = store.get(key, GetOptions::new()).await.unwrap().done().flatten() {
                if snap.body.as_deref() == Some(want.as_bytes()) {
                    return snap;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{key} never reached {want:?}");
    }

    fn fast() -> ReconnectPolicy {
        ReconnectPolicy::new(Duration::from_millis(20), Duration::from_millis(50))
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SyncHooks for Recorder {
        async fn on_pre_connect(&self, _remote: &Endpoint) -> SyncResult<()> {
            self.events.lock().unwrap().push("pre_connect".into());
            Ok(())
        }

        async fn on_res(&self, _remote: &Endpoint, _current: Option<&Version>) {
            self.events.lock().unwrap().push("res".into());
        }

        async fn on_unauthorized(&self, _remote: &Endpoint, status: u16) {
            self.events.lock().unwrap().push(format!("unauthorized {status}"));
        }

        async fn on_disconnect(&self, _error: &SyncError) {
            self.events.lock().unwrap().push("disconnect".into());
        }
    }

    // ------------------------------------------------------------------
    // Symmetric links
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn local_pair_converges_both_ways() {
        let a = BlobStore::in_memory();
        let b = BlobStore::in_memory();
        a.put("/doc", Bytes::from_static(b"local content"), PutOptions::new().version("1"))
            .await
            .unwrap();

        let handle = sync(Endpoint::local(&a, "/doc"), Endpoint::local(&b, "/doc"), SyncOptions::new());
        let snap = wait_for_body(&b, "/doc", "local content").await;
        assert_eq!(snap.version, Version::from("1"));

        b.put("/doc", Bytes::from_static(b"from b"), PutOptions::new().version("2"))
            .await
            .unwrap();
        wait_for_body(&a, "/doc", "from b").await;
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn deletes_propagate() {
        let a = BlobStore::in_memory();
        let b = BlobStore::in_memory();
        a.put("/k", Bytes::from_static(b"x"), PutOptions::new().version("1"))
            .await
            .unwrap();

        let handle = sync(Endpoint::local(&a, "/k"), Endpoint::local(&b, "/k"), SyncOptions::new());
        handle.wait_for(|s| s == SyncState::Connected).await;
        wait_for_body(&b, "/k", "x").await;

        a.delete("/k", DeleteOptions::new()).await.unwrap();
        let mut gone = false;
        for _ in 0..200 {
            if b.get("/k", GetOptions::new()).await.unwrap() == Outcome::Done(None) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(gone);
        handle.shutdown().await;
    }

    // ------------------------------------------------------------------
    // State machine
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn unreachable_remote_backs_off_until_stopped() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let store = BlobStore::in_memory();
        let remote = Endpoint::resolve(&format!("http://{addr}/k"), &store, &RemoteClient::new()).unwrap();
        let hooks = Arc::new(Recorder::default());
        let handle = sync(
            Endpoint::local(&store, "/k"),
            remote,
            SyncOptions::new().reconnect(fast()).hooks(hooks.clone()),
        );

        let state = handle
            .wait_for(|s| matches!(s, SyncState::Backoff { attempt } if attempt >= 2))
            .await;
        assert!(matches!(state, SyncState::Backoff { .. }));

        handle.stop();
        assert_eq!(handle.wait_for(|s| s.is_closed()).await, SyncState::Closed);

        let events = hooks.events.lock().unwrap().clone();
        assert_eq!(events[0], "pre_connect");
        assert!(events.iter().filter(|e| *e == "disconnect").count() >= 2);
        assert!(!events.contains(&"res".to_string()));
    }

    #[tokio::test]
    async fn external_signal_closes_session() {
        let a = BlobStore::in_memory();
        let b = BlobStore::in_memory();
        let signal = CancellationToken::new();
        let handle = sync(
            Endpoint::local(&a, "/k"),
            Endpoint::local(&b, "/k"),
            SyncOptions::new().signal(signal.clone()),
        );
        handle.wait_for(|s| s == SyncState::Connected).await;

        signal.cancel();
        assert_eq!(handle.wait_for(|s| s.is_closed()).await, SyncState::Closed);
        // Nothing flows once closed.
        a.put("/k", Bytes::from_static(b"late"), PutOptions::new()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(b.get("/k", GetOptions::new()).await.unwrap(), Outcome::Done(None));
    }

    #[tokio::test]
    async fn rejecting_hook_prevents_connect() {
        struct Deny;

        #[async_trait]
        impl SyncHooks for Deny {
            async fn on_pre_connect(&self, _remote: &Endpoint) -> SyncResult<()> {
                Err(SyncError::Hook("no".into()))
            }
            async fn on_res(&self, _remote: &Endpoint, _current: Option<&Version>) {}
            async fn on_unauthorized(&self, _remote: &Endpoint, _status: u16) {}
            async fn on_disconnect(&self, _error: &SyncError) {}
        }

        let a = BlobStore::in_memory();
        let b = BlobStore::in_memory();
        let handle = sync(
            Endpoint::local(&a, "/k"),
            Endpoint::local(&b, "/k"),
            SyncOptions::new()
                .reconnect(ReconnectPolicy::new(Duration::from_secs(5), Duration::from_secs(5)))
                .hooks(Arc::new(Deny)),
        );
        let state = handle.wait_for(|s| matches!(s, SyncState::Backoff { .. })).await;
        assert_eq!(state, SyncState::Backoff { attempt: 1 });
        handle.shutdown().await;
    }
}
