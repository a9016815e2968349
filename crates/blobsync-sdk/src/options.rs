//! Per-call options and results.
//!
//! Options may carry protocol headers in `headers`. `Version`, `Parents`,
//! `Peer` and `Content-Type` found there (matched case-insensitively) fill
//! the typed fields that the caller left unset.

use std::fmt;
use std::sync::Arc;

use blobsync_protocol::headers;
use blobsync_store::BlobBackend;
use blobsync_types::{single_parent, single_version, Version};
use bytes::Bytes;
use hyper::header::{HeaderMap, CONTENT_TYPE};
use tokio_util::sync::CancellationToken;

use crate::error::SdkResult;

/// Result of an operation that honours a cancellation signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Done(T),
    /// The signal fired before the operation changed anything.
    Aborted,
}

impl<T> Outcome<T> {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Outcome::Aborted)
    }

    /// The value, or `None` if aborted.
    pub fn done(self) -> Option<T> {
        match self {
            Outcome::Done(value) => Some(value),
            Outcome::Aborted => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Done(value) => Outcome::Done(f(value)),
            Outcome::Aborted => Outcome::Aborted,
        }
    }
}

/// Current state of a key as returned by `get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub version: Version,
    pub content_type: Option<String>,
    /// `None` for metadata-only (`head`) requests.
    pub body: Option<Bytes>,
}

/// Result of a `put`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutResult {
    /// The write was applied at this version.
    Accepted(Version),
    /// The supplied version was not newer than the current one.
    Stale { current: Option<Version> },
}

impl PutResult {
    pub fn accepted(&self) -> Option<&Version> {
        match self {
            PutResult::Accepted(version) => Some(version),
            PutResult::Stale { .. } => None,
        }
    }
}

/// Fields shared by every operation.
#[derive(Clone, Default)]
pub struct CommonOptions {
    /// Identity of the caller, used for self-echo suppression.
    pub peer: Option<String>,
    pub signal: Option<CancellationToken>,
    /// Blob backend to use for this call instead of the store's own.
    pub db: Option<Arc<dyn BlobBackend>>,
    /// Extra protocol headers.
    pub headers: HeaderMap,
}

impl CommonOptions {
    pub fn is_aborted(&self) -> bool {
        self.signal.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    fn merge_peer(&mut self) -> SdkResult<()> {
        if self.peer.is_none() {
            self.peer = headers::get_str(&self.headers, headers::PEER)?.map(str::to_string);
        }
        Ok(())
    }
}

impl fmt::Debug for CommonOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommonOptions")
            .field("peer", &self.peer)
            .field("signal", &self.signal.is_some())
            .field("db", &self.db.is_some())
            .field("headers", &self.headers)
            .finish()
    }
}

macro_rules! common_builders {
    ($ty:ty) => {
        impl $ty {
            pub fn peer(mut self, peer: impl Into<String>) -> Self {
                self.common.peer = Some(peer.into());
                self
            }

            pub fn signal(mut self, signal: CancellationToken) -> Self {
                self.common.signal = Some(signal);
                self
            }

            pub fn db(mut self, db: Arc<dyn BlobBackend>) -> Self {
                self.common.db = Some(db);
                self
            }

            pub fn headers(mut self, headers: HeaderMap) -> Self {
                self.common.headers = headers;
                self
            }
        }
    };
}

fn merge_ids(
    field: &mut Option<Vec<Version>>,
    map: &HeaderMap,
    name: &str,
) -> SdkResult<()> {
    if field.is_none() {
        *field = headers::get_event_ids(map, name)?;
    }
    Ok(())
}

/// Options for `get` and `subscribe`.
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    pub version: Option<Vec<Version>>,
    pub parents: Option<Vec<Version>>,
    /// Metadata only; do not read the body.
    pub head: bool,
    /// Media types the caller accepts (remote requests only).
    pub accept: Option<String>,
    pub common: CommonOptions,
}

common_builders!(GetOptions);

impl GetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(mut self, version: impl Into<Version>) -> Self {
        self.version = Some(vec![version.into()]);
        self
    }

    pub fn parents(mut self, parents: impl Into<Version>) -> Self {
        self.parents = Some(vec![parents.into()]);
        self
    }

    pub fn head(mut self) -> Self {
        self.head = true;
        self
    }

    pub fn accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    /// Fold headers into typed fields and check arity.
    pub(crate) fn normalize(&mut self) -> SdkResult<()> {
        merge_ids(&mut self.version, &self.common.headers, headers::VERSION)?;
        merge_ids(&mut self.parents, &self.common.headers, headers::PARENTS)?;
        self.common.merge_peer()?;
        single_version(self.version.as_deref())?;
        single_parent(self.parents.as_deref())?;
        Ok(())
    }

    pub fn requested_version(&self) -> Option<&Version> {
        self.version.as_ref().and_then(|ids| ids.first())
    }

    pub fn requested_parents(&self) -> Option<&Version> {
        self.parents.as_ref().and_then(|ids| ids.first())
    }
}

/// Options for `put`.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Explicit version for the write. Generated by the store when unset.
    pub version: Option<Vec<Version>>,
    pub parents: Option<Vec<Version>>,
    pub content_type: Option<String>,
    pub common: CommonOptions,
}

common_builders!(PutOptions);

impl PutOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(mut self, version: impl Into<Version>) -> Self {
        self.version = Some(vec![version.into()]);
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub(crate) fn normalize(&mut self) -> SdkResult<()> {
        merge_ids(&mut self.version, &self.common.headers, headers::VERSION)?;
        merge_ids(&mut self.parents, &self.common.headers, headers::PARENTS)?;
        if self.content_type.is_none() {
            self.content_type = self
                .common
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
        }
        self.common.merge_peer()?;
        single_version(self.version.as_deref())?;
        single_parent(self.parents.as_deref())?;
        Ok(())
    }

    pub fn requested_version(&self) -> Option<&Version> {
        self.version.as_ref().and_then(|ids| ids.first())
    }
}

/// Options for `delete`.
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    pub common: CommonOptions,
}

common_builders!(DeleteOptions);

impl DeleteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn normalize(&mut self) -> SdkResult<()> {
        self.common.merge_peer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobsync_types::TypeError;
    use hyper::header::{HeaderName, HeaderValue};

    use crate::error::SdkError;

    fn header(map: &mut HeaderMap, name: &str, value: &str) {
        map.insert(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }

    #[test]
    fn headers_fill_unset_fields() {
        let mut map = HeaderMap::new();
        header(&mut map, "Parents", "\"1.0\"");
        header(&mut map, "Version", "\"2.0\"");
        header(&mut map, "Peer", "alice");

        let mut opts = GetOptions::new().headers(map);
        opts.normalize().unwrap();
        assert_eq!(opts.requested_parents(), Some(&Version::from("1.0")));
        assert_eq!(opts.requested_version(), Some(&Version::from("2.0")));
        assert_eq!(opts.common.peer.as_deref(), Some("alice"));
    }

    #[test]
    fn explicit_fields_win_over_headers() {
        let mut map = HeaderMap::new();
        header(&mut map, "version", "\"from-header\"");
        header(&mut map, "Content-Type", "text/html");

        let mut opts = PutOptions::new()
            .version("explicit")
            .content_type("text/plain")
            .headers(map);
        opts.normalize().unwrap();
        assert_eq!(opts.requested_version(), Some(&Version::from("explicit")));
        assert_eq!(opts.content_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn arity_is_validated() {
        let mut opts = PutOptions {
            version: Some(vec![]),
            ..Default::default()
        };
        assert!(matches!(
            opts.normalize(),
            Err(SdkError::Type(TypeError::EmptyVersion))
        ));

        let mut opts = GetOptions {
            parents: Some(vec![Version::from("1"), Version::from("2")]),
            ..Default::default()
        };
        assert!(matches!(
            opts.normalize(),
            Err(SdkError::Type(TypeError::MultipleParents(2)))
        ));

        let mut opts = GetOptions {
            parents: Some(vec![]),
            ..Default::default()
        };
        assert!(opts.normalize().is_ok());
    }

    #[test]
    fn malformed_header_is_rejected() {
        let mut map = HeaderMap::new();
        header(&mut map, "Version", "unquoted");
        let mut opts = PutOptions::new().headers(map);
        assert!(matches!(opts.normalize(), Err(SdkError::Protocol(_))));
    }

    #[test]
    fn outcome_helpers() {
        assert_eq!(Outcome::Done(1).map(|n| n + 1), Outcome::Done(2));
        assert!(Outcome::<()>::Aborted.is_aborted());
        assert_eq!(Outcome::<u8>::Aborted.done(), None);
    }
}
