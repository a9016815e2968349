//! Subscription stream framing.
//!
//! A subscription response body is a sequence of frames, one per update:
//!
//! ```text
//! Version: "p-1700000000000"\r\n
//! Content-Type: text/plain\r\n
//! Content-Length: 5\r\n
//! \r\n
//! hello\r\n
//! \r\n
//! ```
//!
//! A deletion is sent as a frame with `Status: 404` and no `Version`.
//! Header names are case-insensitive and blank lines between frames are
//! skipped.

use blobsync_types::{single_version, Update};
use bytes::{Buf, Bytes, BytesMut};

use crate::error::{ProtocolError, ProtocolResult};
use crate::event_ids::{encode_event_ids, parse_event_ids};

/// Serialize one update as a frame.
pub fn encode_update(update: &Update) -> Bytes {
    let mut head = String::new();
    let body: &[u8] = match update {
        Update::Value {
            version,
            content_type,
            body,
        } => {
            head.push_str(&format!(
                "Version: {}\r\n",
                encode_event_ids(std::slice::from_ref(version))
            ));
            if let Some(ct) = content_type {
                head.push_str(&format!("Content-Type: {ct}\r\n"));
            }
            body
        }
        Update::Delete { content_type } => {
            head.push_str("Status: 404\r\n");
            if let Some(ct) = content_type {
                head.push_str(&format!("Content-Type: {ct}\r\n"));
            }
            &[]
        }
    };
    head.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));

    let mut out = BytesMut::with_capacity(head.len() + body.len() + 4);
    out.extend_from_slice(head.as_bytes());
    out.extend_from_slice(body);
    out.extend_from_slice(b"\r\n\r\n");
    out.freeze()
}

/// Incremental decoder for a subscription body.
///
/// Feed chunks with [`push`](Self::push) as they arrive and drain complete
/// updates with [`next_update`](Self::next_update).
#[derive(Debug, Default)]
pub struct UpdateDecoder {
    buf: BytesMut,
}

struct FrameHead {
    /// Bytes up to and including the blank line.
    len: usize,
    version: Option<String>,
    content_type: Option<String>,
    status: Option<u16>,
    content_length: usize,
}

impl UpdateDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next complete frame, or `Ok(None)` if more input is needed.
    pub fn next_update(&mut self) -> ProtocolResult<Option<Update>> {
        let skip = self
            .buf
            .iter()
            .take_while(|b| **b == b'\r' || **b == b'\n')
            .count();
        self.buf.advance(skip);

        let Some(head) = parse_head(&self.buf)? else {
            return Ok(None);
        };
        if self.buf.len() < head.len + head.content_length {
            return Ok(None);
        }

        self.buf.advance(head.len);
        let body = self.buf.split_to(head.content_length).freeze();

        if head.status == Some(404) {
            return Ok(Some(Update::Delete {
                content_type: head.content_type,
            }));
        }

        let raw = head
            .version
            .ok_or_else(|| ProtocolError::Framing("frame without Version header".into()))?;
        let ids = parse_event_ids(&raw)?;
        let version = single_version(Some(ids.as_slice()))?
            .cloned()
            .ok_or_else(|| ProtocolError::Framing("empty Version header".into()))?;
        Ok(Some(Update::Value {
            version,
            content_type: head.content_type,
            body,
        }))
    }
}

fn parse_head(buf: &[u8]) -> ProtocolResult<Option<FrameHead>> {
    let mut head = FrameHead {
        len: 0,
        version: None,
        content_type: None,
        status: None,
        content_length: 0,
    };

    let mut pos = 0;
    loop {
        let Some(nl) = buf[pos..].iter().position(|b| *b == b'\n') else {
            return Ok(None);
        };
        let line = &buf[pos..pos + nl];
        pos += nl + 1;
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            head.len = pos;
            return Ok(Some(head));
        }

        let line = std::str::from_utf8(line)
            .map_err(|_| ProtocolError::Framing("header line is not UTF-8".into()))?;
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ProtocolError::Framing(format!("malformed header line {line:?}")))?;
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "version" => head.version = Some(value.to_string()),
            "content-type" => head.content_type = Some(value.to_string()),
            "status" => {
                let code = value.split_whitespace().next().unwrap_or("");
                head.status = Some(code.parse().map_err(|_| {
                    ProtocolError::Framing(format!("bad status {value:?}"))
                })?);
            }
            "content-length" => {
                head.content_length = value.parse().map_err(|_| {
                    ProtocolError::Framing(format!("bad content-length {value:?}"))
                })?;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobsync_types::Version;

    fn value(v: &str, body: &'static [u8]) -> Update {
        Update::Value {
            version: Version::from(v),
            content_type: Some("text/plain".into()),
            body: Bytes::from_static(body),
        }
    }

    #[test]
    fn frame_layout() {
        let frame = encode_update(&value("p-1", b"hello"));
        assert_eq!(
            &frame[..],
            b"Version: \"p-1\"\r\nContent-Type: text/plain\r\nContent-Length: 5\r\n\r\nhello\r\n\r\n"
        );
    }

    #[test]
    fn tombstone_layout() {
        let frame = encode_update(&Update::Delete { content_type: None });
        assert_eq!(&frame[..], b"Status: 404\r\nContent-Length: 0\r\n\r\n\r\n\r\n");
    }

    #[test]
    fn decodes_across_chunk_boundaries() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&encode_update(&value("1", b"first")));
        wire.extend_from_slice(&encode_update(&Update::Delete { content_type: None }));
        wire.extend_from_slice(&encode_update(&value("3", b"body with\r\n\r\nblank lines")));

        let mut decoder = UpdateDecoder::new();
        let mut got = Vec::new();
        for chunk in wire.chunks(7) {
            decoder.push(chunk);
            while let Some(update) = decoder.next_update().unwrap() {
                got.push(update);
            }
        }

        assert_eq!(
            got,
            vec![
                value("1", b"first"),
                Update::Delete { content_type: None },
                value("3", b"body with\r\n\r\nblank lines"),
            ]
        );
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let mut decoder = UpdateDecoder::new();
        decoder.push(b"\n\nversion: \"9\"\ncontent-length: 2\n\nok");
        assert_eq!(
            decoder.next_update().unwrap(),
            Some(Update::Value {
                version: Version::from("9"),
                content_type: None,
                body: Bytes::from_static(b"ok"),
            })
        );
    }

    #[test]
    fn waits_for_full_body() {
        let mut decoder = UpdateDecoder::new();
        decoder.push(b"Version: \"1\"\r\nContent-Length: 10\r\n\r\nshort");
        assert_eq!(decoder.next_update().unwrap(), None);
        decoder.push(b"_tail");
        assert!(decoder.next_update().unwrap().is_some());
    }

    #[test]
    fn missing_version_is_an_error() {
        let mut decoder = UpdateDecoder::new();
        decoder.push(b"Content-Length: 0\r\n\r\n");
        assert!(matches!(
            decoder.next_update(),
            Err(ProtocolError::Framing(_))
        ));
    }
}
