//! # blobsync-sdk
//!
//! The user-facing API of blobsync.
//!
//! [`BlobStore`] is a versioned blob store instance: last-writer-wins per
//! key, per-key serialized operations, and live subscriptions with catch-up.
//! [`RemoteClient`] speaks the same operations to a blobsync server over
//! HTTP, and [`Endpoint`] hides the difference so replication code can treat
//! both alike.
//!
//! Every operation that takes a cancellation signal returns an [`Outcome`]:
//! `Aborted` means the signal fired before anything changed.

pub mod endpoint;
pub mod error;
pub mod options;
pub mod remote;
pub mod store;
pub mod stream;

pub use endpoint::{Endpoint, EndpointSubscription};
pub use error::{SdkError, SdkResult};
pub use options::{CommonOptions, DeleteOptions, GetOptions, Outcome, PutOptions, PutResult, Snapshot};
pub use remote::{RemoteClient, RemoteSubscription};
pub use store::{BlobStore, LocalSubscription};
pub use stream::UpdateStream;

pub use blobsync_store::StoreConfig;
pub use blobsync_types::{PeerId, Update, Version};
