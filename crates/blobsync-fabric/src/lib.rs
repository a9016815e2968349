//! Coordination primitives for a blobsync store instance.
//!
//! - [`KeySerializer`] runs tasks for one key one at a time, in submission
//!   order. It is the only mutual-exclusion primitive the store uses: "read
//!   current version, decide, write, notify" is atomic because it runs under
//!   the key's slot.
//! - [`SubscriptionRegistry`] tracks live subscribers per key and fans out
//!   [`Update`](blobsync_types::Update)s with self-echo suppression.
//!
//! Both are owned by a single store instance. Two instances never observe
//! each other's queues or subscribers.

pub mod fiber;
pub mod registry;

pub use fiber::{KeyGuard, KeySerializer};
pub use registry::{Subscription, SubscriptionRegistry};
