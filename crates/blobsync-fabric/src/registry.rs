use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};

use blobsync_types::Update;
use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One live subscriber: its registration id and its private queue.
struct Subscriber {
    id: u64,
    sender: mpsc::UnboundedSender<Update>,
}

/// key -> peer -> subscriber
type Table = HashMap<String, HashMap<String, Subscriber>>;

/// Per-key registry of live subscribers.
///
/// Every subscriber owns an unbounded FIFO queue, so a slow consumer never
/// blocks or reorders another's stream. At most one subscriber exists per
/// `(key, peer)`: registering the same peer again replaces the previous
/// entry and closes its stream.
///
/// Ordering: updates published for a key reach each subscriber in publish
/// order. Callers publish while holding the key's
/// [`KeySerializer`](crate::KeySerializer) slot, which makes publish order
/// equal acceptance order.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    table: Arc<RwLock<Table>>,
    next_id: Arc<AtomicU64>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `peer` as a subscriber of `key`.
    ///
    /// `catch_up`, if any, is queued before the registration becomes
    /// visible, so it precedes every later publish on this key.
    pub fn subscribe(&self, key: &str, peer: &str, catch_up: Option<Update>) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        if let Some(update) = catch_up {
            // The receiver is alive in this scope, so this cannot fail.
            let _ = sender.send(update);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let replaced = self
            .table
            .write()
            .expect("lock poisoned")
            .entry(key.to_string())
            .or_default()
            .insert(peer.to_string(), Subscriber { id, sender });
        if replaced.is_some() {
            debug!(key, peer, "replaced existing subscription");
        }

        Subscription {
            key: key.to_string(),
            peer: peer.to_string(),
            id,
            receiver,
            table: self.table.clone(),
        }
    }

    /// Deliver `update` to every subscriber of `key` except `origin`.
    ///
    /// Returns the number of subscribers the update was queued for.
    pub fn publish(&self, key: &str, origin: Option<&str>, update: &Update) -> usize {
        let table = self.table.read().expect("lock poisoned");
        let Some(subscribers) = table.get(key) else {
            return 0;
        };

        let mut delivered = 0;
        for (peer, subscriber) in subscribers {
            if origin == Some(peer.as_str()) {
                continue;
            }
            if subscriber.sender.send(update.clone()).is_ok() {
                delivered += 1;
            }
        }
        debug!(key, delivered, "published update");
        delivered
    }

    /// Number of live subscribers for `key`.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.table
            .read()
            .expect("lock poisoned")
            .get(key)
            .map_or(0, HashMap::len)
    }

    /// Number of keys with at least one subscriber.
    pub fn key_count(&self) -> usize {
        self.table.read().expect("lock poisoned").len()
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("keys", &self.key_count())
            .finish()
    }
}

/// A live subscription. Dropping it unregisters the subscriber.
///
/// Yields updates in order as a [`Stream`], via [`Subscription::recv`], or
/// through a callback with [`Subscription::for_each`]. The stream ends when
/// the same peer subscribes again or the registry is gone.
pub struct Subscription {
    key: String,
    peer: String,
    id: u64,
    receiver: mpsc::UnboundedReceiver<Update>,
    table: Arc<RwLock<Table>>,
}

impl Subscription {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Wait for the next update. `None` once the subscription is closed.
    pub async fn recv(&mut self) -> Option<Update> {
        self.receiver.recv().await
    }

    /// Feed updates to `deliver` one at a time until `cancel` fires or the
    /// stream closes. Each delivery completes before the next one starts.
    pub async fn for_each<F, Fut>(mut self, cancel: CancellationToken, mut deliver: F)
    where
        F: FnMut(Update) -> Fut,
        Fut: Future<Output = ()>,
    {
        loop {
            let update = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = self.receiver.recv() => match next {
                    Some(update) => update,
                    None => break,
                },
            };
            deliver(update).await;
        }
    }
}

impl Stream for Subscription {
    type Item = Update;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Update>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut table = self.table.write().expect("lock poisoned");
        let Some(subscribers) = table.get_mut(&self.key) else {
            return;
        };
        // A newer subscription from the same peer owns the slot now.
        if subscribers.get(&self.peer).map(|s| s.id) == Some(self.id) {
            subscribers.remove(&self.peer);
        }
        if subscribers.is_empty() {
            table.remove(&self.key);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("peer", &self.peer)
            .finish()
    }
}
