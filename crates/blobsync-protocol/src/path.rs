use crate::error::{ProtocolError, ProtocolResult};

/// The store key addressed by a request target: the path without its query,
/// percent-decoded.
pub fn key_from_path(target: &str) -> ProtocolResult<String> {
    let path = target.split_once('?').map_or(target, |(path, _)| path);
    let invalid = || ProtocolError::InvalidPath(target.to_string());

    let raw = path.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' {
            let byte = path
                .get(i + 1..i + 3)
                .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(invalid)?;
            bytes.push(byte);
            i += 3;
        } else {
            bytes.push(raw[i]);
            i += 1;
        }
    }
    String::from_utf8(bytes).map_err(|_| invalid())
}
