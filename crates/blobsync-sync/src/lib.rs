//! Replication for blobsync.
//!
//! [`sync`] keeps two endpoints converged for as long as the returned handle
//! lives, reconnecting after failures. [`watch`] follows a remote URL and
//! hands every newer version to a callback.

pub mod engine;
pub mod error;
pub mod hooks;
pub mod state;
pub mod watch;

pub use engine::{sync, SyncHandle, SyncOptions};
pub use error::{SyncError, SyncResult};
pub use hooks::{NoOpHooks, SyncHooks};
pub use state::{ReconnectPolicy, SyncState};
pub use watch::{watch, Watcher};
