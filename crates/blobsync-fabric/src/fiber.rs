use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slots = Arc<Mutex<HashMap<String, Slot>>>;

/// Per-key queue state.
struct Slot {
    /// Fair async mutex: waiters acquire in the order they queued.
    lock: Arc<AsyncMutex<()>>,
    /// Holders plus waiters. The slot is dropped when this reaches zero.
    users: usize,
}

/// Per-key FIFO serializer ("fiber").
///
/// Tasks submitted for the same key run one at a time in submission order,
/// each seeing the full effects of the one before. Tasks for different keys
/// never wait on each other. A key with nothing queued holds no entry.
///
/// Cloning is cheap and yields a handle to the same queues.
#[derive(Clone, Default)]
pub struct KeySerializer {
    slots: Slots,
}

/// Exclusive access to one key. Released on drop.
pub struct KeyGuard {
    // Field order matters: the mutex is released before the lease is
    // returned, so a drained slot is never removed while still locked.
    _guard: OwnedMutexGuard<()>,
    _lease: Lease,
}

/// Registration of one holder or waiter in a slot.
struct Lease {
    slots: Slots,
    key: String,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().expect("lock poisoned");
        if let Some(slot) = slots.get_mut(&self.key) {
            slot.users -= 1;
            if slot.users == 0 {
                slots.remove(&self.key);
            }
        }
    }
}

impl KeySerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    ///
    /// Cancel-safe: dropping the future before it resolves leaves the queue
    /// without leaking the slot.
    pub async fn acquire(&self, key: &str) -> KeyGuard {
        let (lock, lease) = {
            let mut slots = self.slots.lock().expect("lock poisoned");
            let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
                lock: Arc::new(AsyncMutex::new(())),
                users: 0,
            });
            slot.users += 1;
            (
                slot.lock.clone(),
                Lease {
                    slots: self.slots.clone(),
                    key: key.to_string(),
                },
            )
        };
        let guard = lock.lock_owned().await;
        KeyGuard {
            _guard: guard,
            _lease: lease,
        }
    }

    /// Run `task` with exclusive access to `key`.
    pub async fn run_exclusive<F, Fut, T>(&self, key: &str, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.acquire(key).await;
        task().await
    }

    /// Number of keys with a running or queued task.
    pub fn pending_keys(&self) -> usize {
        self.slots.lock().expect("lock poisoned").len()
    }

    /// Holders plus waiters for `key`.
    pub fn queue_len(&self, key: &str) -> usize {
        self.slots
            .lock()
            .expect("lock poisoned")
            .get(key)
            .map_or(0, |slot| slot.users)
    }
}

impl std::fmt::Debug for KeySerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySerializer")
            .field("pending_keys", &self.pending_keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures_util::future::join_all;

    #[tokio::test]
    async fn runs_in_submission_order() {
        let fiber = KeySerializer::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let tasks = (0..20).map(|i| {
            let fiber = fiber.clone();
            let log = log.clone();
            async move {
                fiber
                    .run_exclusive("/k", || async {
                        // Later tasks sleep less; without FIFO they would overtake.
                        tokio::time::sleep(Duration::from_millis(20 - i)).await;
                        log.lock().unwrap().push(i);
                    })
                    .await
            }
        });
        join_all(tasks).await;

        assert_eq!(*log.lock().unwrap(), (0..20).collect::<Vec<_>>());
        assert_eq!(fiber.pending_keys(), 0);
    }

    #[tokio::test]
    async fn never_runs_two_tasks_for_one_key() {
        let fiber = KeySerializer::new();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let fiber = fiber.clone();
                let running = running.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    fiber
                        .run_exclusive("/k", || async {
                            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::task::yield_now().await;
                            running.fetch_sub(1, Ordering::SeqCst);
                        })
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let fiber = KeySerializer::new();
        let _held = fiber.acquire("/a").await;
        let other = tokio::time::timeout(Duration::from_millis(100), fiber.acquire("/b")).await;
        assert!(other.is_ok());
        assert_eq!(fiber.pending_keys(), 2);
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_leak() {
        let fiber = KeySerializer::new();
        let held = fiber.acquire("/k").await;

        let waited = tokio::time::timeout(Duration::from_millis(10), fiber.acquire("/k")).await;
        assert!(waited.is_err());
        assert_eq!(fiber.queue_len("/k"), 1);

        drop(held);
        assert_eq!(fiber.pending_keys(), 0);
    }

    #[tokio::test]
    async fn returns_task_output() {
        let fiber = KeySerializer::new();
        let out = fiber.run_exclusive("/k", || async { 41 + 1 }).await;
        assert_eq!(out, 42);
    }
}
