//! Wire protocol for blobsync.
//!
//! A key is an HTTP path. Versions travel in `Version`, `Current-Version`
//! and `Parents` headers as comma-separated JSON string literals. A
//! subscription is one long response body carrying a sequence of update
//! frames, see [`frame`].

pub mod error;
pub mod event_ids;
pub mod frame;
pub mod headers;
pub mod negotiate;
pub mod path;

pub use error::{ProtocolError, ProtocolResult};
pub use event_ids::{encode_event_ids, parse_event_ids};
pub use frame::{encode_update, UpdateDecoder};
pub use headers::{status, MERGE_TYPE_AWW};
pub use negotiate::{accepts, not_acceptable_message};
pub use path::key_from_path;
