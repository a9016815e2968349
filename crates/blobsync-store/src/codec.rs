//! Key to filename codec.
//!
//! Any key string maps to one filesystem-safe name and back:
//! - `!` and `/` are swapped, so the common `/` separator becomes a plain `!`
//!   and a literal `!` is the one that gets escaped
//! - `< > : " / \ | ? * %` and control characters are percent-encoded
//! - a stem (text before the first `.`) equal to a reserved device name such
//!   as `CON` or `LPT1` has its second character percent-encoded
//! - `.` plus a hex case mask is appended: one bit per letter of the key,
//!   set when the letter is uppercase, most significant bit first
//!
//! The case mask keeps `a` and `A` apart on case-insensitive filesystems. It
//! also guarantees every encoded name contains a `.` and never equals `.`,
//! `..` or a reserved device name.

use crate::error::{StoreError, StoreResult};

/// Characters that are illegal in filenames on at least one common platform.
const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*', '%'];

/// Device names Windows reserves regardless of extension.
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Encode a key into a filesystem-safe filename.
///
/// # Examples
///
/// ```
/// use blobsync_store::codec::{decode_filename, encode_filename};
///
/// assert_eq!(encode_filename("/hello"), "!hello.00");
/// assert_ne!(encode_filename("a"), encode_filename("A"));
/// assert_eq!(decode_filename(&encode_filename("x/y!z")).unwrap(), "x/y!z");
/// ```
pub fn encode_filename(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars().map(swap_bang_slash) {
        if FORBIDDEN_CHARS.contains(&ch) || (ch.is_control() && (ch as u32) < 0x80) {
            push_escaped(&mut out, ch);
        } else {
            out.push(ch);
        }
    }

    let stem_len = out.find('.').unwrap_or(out.len());
    if is_reserved(&out[..stem_len]) {
        // Reserved names are pure ASCII, so the second char is at byte 1.
        let second = out.as_bytes()[1] as char;
        let mut escaped = String::with_capacity(3);
        push_escaped(&mut escaped, second);
        out.replace_range(1..2, &escaped);
    }

    out.push('.');
    out.push_str(&case_mask(key));
    out
}

/// Recover the key from a name produced by [`encode_filename`].
pub fn decode_filename(name: &str) -> StoreResult<String> {
    let (body, _mask) = name
        .rsplit_once('.')
        .ok_or_else(|| StoreError::InvalidFilename(name.to_string()))?;

    let mut bytes = Vec::with_capacity(body.len());
    let raw = body.as_bytes();
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' {
            let hex = body
                .get(i + 1..i + 3)
                .filter(|h| h.bytes().all(|b| b.is_ascii_hexdigit()))
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| StoreError::InvalidFilename(name.to_string()))?;
            bytes.push(hex);
            i += 3;
        } else {
            bytes.push(raw[i]);
            i += 1;
        }
    }

    let decoded =
        String::from_utf8(bytes).map_err(|_| StoreError::InvalidFilename(name.to_string()))?;
    Ok(decoded.chars().map(swap_bang_slash).collect())
}

fn swap_bang_slash(ch: char) -> char {
    match ch {
        '!' => '/',
        '/' => '!',
        other => other,
    }
}

fn push_escaped(out: &mut String, ch: char) {
    let mut buf = [0u8; 4];
    for byte in ch.encode_utf8(&mut buf).bytes() {
        out.push_str(&format!("%{byte:02X}"));
    }
}

fn is_reserved(stem: &str) -> bool {
    RESERVED_NAMES
        .iter()
        .any(|name| name.eq_ignore_ascii_case(stem))
}

/// Hex rendering of the uppercase bitmask over the key's letters.
fn case_mask(key: &str) -> String {
    let bits: Vec<bool> = key
        .chars()
        .filter(|c| c.is_alphabetic())
        .map(char::is_uppercase)
        .collect();
    if bits.is_empty() {
        return "0".to_string();
    }
    bits.chunks(4)
        .map(|nibble| {
            let value = nibble
                .iter()
                .enumerate()
                .fold(0u32, |acc, (i, &bit)| acc | (u32::from(bit) << (3 - i)));
            char::from_digit(value, 16).unwrap_or('0')
        })
        .collect()
}
