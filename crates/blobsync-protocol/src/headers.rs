use blobsync_types::Version;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::{ProtocolError, ProtocolResult};
use crate::event_ids::{encode_event_ids, parse_event_ids};

pub const VERSION: &str = "version";
pub const CURRENT_VERSION: &str = "current-version";
pub const PARENTS: &str = "parents";
pub const SUBSCRIBE: &str = "subscribe";
pub const PEER: &str = "peer";
pub const MERGE_TYPE: &str = "merge-type";
pub const EDITABLE: &str = "editable";
pub const STATUS: &str = "status";

/// The merge type every blob advertises: arbitrary-writer-wins.
pub const MERGE_TYPE_AWW: &str = "aww";

/// Status codes used by the protocol.
pub mod status {
    use hyper::StatusCode;

    /// The key exists, but not at the requested version or parents.
    pub const VERSION_UNKNOWN: u16 = 309;

    pub fn version_unknown() -> StatusCode {
        StatusCode::from_u16(VERSION_UNKNOWN).unwrap_or(StatusCode::CONFLICT)
    }
}

/// A header as a string, if present.
pub fn get_str<'a>(headers: &'a HeaderMap, name: &str) -> ProtocolResult<Option<&'a str>> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| ProtocolError::InvalidHeader(name.to_string())),
    }
}

/// Parse an event id list header (`Version`, `Parents`, ...).
pub fn get_event_ids(headers: &HeaderMap, name: &str) -> ProtocolResult<Option<Vec<Version>>> {
    get_str(headers, name)?.map(parse_event_ids).transpose()
}

/// Set an event id list header.
pub fn set_event_ids(headers: &mut HeaderMap, name: &'static str, ids: &[Version]) {
    // Encoded ids are pure ASCII, so the value is always valid.
    if let Ok(value) = HeaderValue::from_str(&encode_event_ids(ids)) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

/// Does the request declare a live-subscribe intent?
pub fn is_subscribe(headers: &HeaderMap) -> bool {
    match headers.get(SUBSCRIBE).and_then(|v| v.to_str().ok()) {
        Some(value) => !value.trim().eq_ignore_ascii_case("false"),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_lowercase() {
        for name in [VERSION, CURRENT_VERSION, PARENTS, SUBSCRIBE, PEER, MERGE_TYPE, EDITABLE] {
            assert_eq!(name, name.to_ascii_lowercase());
            HeaderName::from_static(name);
        }
    }

    #[test]
    fn version_unknown_is_309() {
        assert_eq!(status::version_unknown().as_u16(), 309);
    }

    #[test]
    fn event_ids_roundtrip_through_headers() {
        let mut headers = HeaderMap::new();
        set_event_ids(&mut headers, PARENTS, &[Version::from("p-1")]);
        assert_eq!(headers.get("Parents").unwrap(), "\"p-1\"");
        assert_eq!(
            get_event_ids(&headers, PARENTS).unwrap(),
            Some(vec![Version::from("p-1")])
        );
        assert_eq!(get_event_ids(&headers, VERSION).unwrap(), None);
    }

    #[test]
    fn subscribe_flag() {
        let mut headers = HeaderMap::new();
        assert!(!is_subscribe(&headers));
        headers.insert(SUBSCRIBE, HeaderValue::from_static("true"));
        assert!(is_subscribe(&headers));
        headers.insert(SUBSCRIBE, HeaderValue::from_static("false"));
        assert!(!is_subscribe(&headers));
    }

    #[test]
    fn malformed_ids_are_errors() {
        let mut headers = HeaderMap::new();
        headers.insert(VERSION, HeaderValue::from_static("not-json"));
        assert!(get_event_ids(&headers, VERSION).is_err());
    }
}
