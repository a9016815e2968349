//! Foundation types for blobsync.
//!
//! Every other blobsync crate depends on `blobsync-types`. The types here are
//! deliberately small: a store instance only ever tracks one current version
//! per key, so the whole data model fits in a handful of structs.
//!
//! # Key Types
//!
//! - [`Version`]: opaque, totally ordered event id (`"<peer>-<seq>"`)
//! - [`VersionClock`]: generator of strictly increasing versions
//! - [`Meta`]: per-key `{version, content_type}` record
//! - [`Update`]: a value or tombstone delivered to subscribers
//! - [`PeerId`]: store-instance / subscriber identity

pub mod clock;
pub mod error;
pub mod ids;
pub mod meta;
pub mod version;

pub use clock::VersionClock;
pub use error::{TypeError, TypeResult};
pub use ids::{single_parent, single_version, PeerId};
pub use meta::{Meta, Update};
pub use version::{compare_versions, Version};
