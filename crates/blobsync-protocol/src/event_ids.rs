use blobsync_types::Version;

use crate::error::{ProtocolError, ProtocolResult};

/// Render event ids for a `Version` / `Parents` header.
///
/// Each id becomes a JSON string literal with every non-ASCII code point
/// written as `\uXXXX` (surrogate pairs above U+FFFF), joined by `", "`.
pub fn encode_event_ids(ids: &[Version]) -> String {
    ids.iter()
        .map(|id| ascii_json_string(id.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a `Version` / `Parents` header value. An empty value is an empty
/// list.
pub fn parse_event_ids(value: &str) -> ProtocolResult<Vec<Version>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<String> =
        serde_json::from_str(&format!("[{value}]")).map_err(|e| ProtocolError::InvalidEventIds {
            value: value.to_string(),
            reason: e.to_string(),
        })?;
    Ok(ids.into_iter().map(Version::from).collect())
}

fn ascii_json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || (c as u32) > 0x7e => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{unit:04x}"));
                }
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<Version> {
        list.iter().map(|s| Version::from(*s)).collect()
    }

    #[test]
    fn encodes_quoted_and_joined() {
        assert_eq!(encode_event_ids(&ids(&["p-1"])), r#""p-1""#);
        assert_eq!(encode_event_ids(&ids(&["a", "b"])), r#""a", "b""#);
        assert_eq!(encode_event_ids(&[]), "");
    }

    #[test]
    fn escapes_non_ascii() {
        assert_eq!(encode_event_ids(&ids(&["é"])), r#""\u00e9""#);
        assert_eq!(encode_event_ids(&ids(&["😀"])), r#""\ud83d\ude00""#);
        assert_eq!(encode_event_ids(&ids(&["a\"b"])), r#""a\"b""#);
        assert!(encode_event_ids(&ids(&["ünïcode-1"])).is_ascii());
    }

    #[test]
    fn parses_what_it_encodes() {
        let original = ids(&["pëer-1700000000000"]);
        let header = encode_event_ids(&original);
        assert_eq!(parse_event_ids(&header).unwrap(), original);
    }

    #[test]
    fn parses_lists_and_empty() {
        assert_eq!(parse_event_ids(r#""1", "2""#).unwrap(), ids(&["1", "2"]));
        assert_eq!(parse_event_ids("  ").unwrap(), Vec::<Version>::new());
    }

    #[test]
    fn rejects_unquoted() {
        assert!(matches!(
            parse_event_ids("11.0"),
            Err(ProtocolError::InvalidEventIds { .. })
        ));
        assert!(parse_event_ids("[\"1\"]").is_err());
    }
}
