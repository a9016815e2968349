//! Persistence layer for blobsync.
//!
//! A store keeps two records per key: the blob content, held by a
//! [`BlobBackend`], and a small JSON [`Meta`](blobsync_types::Meta) document
//! held by a [`MetaStore`]. Both are addressed by the [`codec`] so any key
//! string maps to a single filesystem-safe name.
//!
//! # Backends
//!
//! - [`FsBlobBackend`] / [`FsMetaStore`] -- temp file + atomic rename
//! - [`InMemoryBlobBackend`] / [`InMemoryMetaStore`] -- `HashMap`-based, for
//!   tests and sync targets
//!
//! # Design Rules
//!
//! 1. A reader never observes a partially written blob or meta file.
//! 2. Stale `temp_` files left by an unclean shutdown are purged on open.
//! 3. Keys that differ only in letter case never share a file.
//! 4. All I/O errors are propagated, never retried here.

pub mod codec;
pub mod config;
pub mod error;
pub mod fs;
pub mod memory;
pub mod peer;
pub mod traits;

pub use codec::{decode_filename, encode_filename};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use fs::{atomic_write, purge_scratch_files, FsBlobBackend, FsMetaStore, TEMP_PREFIX};
pub use memory::{InMemoryBlobBackend, InMemoryMetaStore};
pub use peer::{load_or_create_peer, PEER_FILE};
pub use traits::{BlobBackend, MetaStore};
