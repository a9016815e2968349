use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque event id stamped on every accepted write.
///
/// The canonical form is `"<peer>-<seq>"` where `seq` is an unsigned decimal
/// without leading zeros, but any string is a valid version: callers may
/// supply their own tokens (e.g. `"11.0"`) and they are carried verbatim.
///
/// Ordering: numeric suffix length → suffix bytes → whole string (total
/// order). The numeric suffix is the substring after the last `-`, or the
/// whole string when there is no `-`. Because generated suffixes never carry
/// leading zeros, comparing by length then lexicographically is a numeric
/// compare of arbitrarily large sequence numbers.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    /// Wrap a raw event id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build the canonical `"<peer>-<seq>"` form.
    pub fn from_parts(peer: &str, seq: impl fmt::Display) -> Self {
        Self(format!("{peer}-{seq}"))
    }

    /// The raw event id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the raw event id.
    pub fn into_inner(self) -> String {
        self.0
    }

    /// The sequence part: everything after the last `-`.
    pub fn seq(&self) -> &str {
        seq_of(&self.0)
    }

    /// The peer part, if the id has the canonical shape.
    pub fn peer(&self) -> Option<&str> {
        self.0.rfind('-').map(|i| &self.0[..i])
    }

    /// Returns `true` if this version is strictly newer than `other`.
    ///
    /// An absent `other` is the minimum, so any version is newer than `None`
    /// except the empty string.
    pub fn is_newer_than(&self, other: Option<&Version>) -> bool {
        compare_versions(Some(self), other) == Ordering::Greater
    }
}

fn seq_of(id: &str) -> &str {
    match id.rfind('-') {
        Some(i) => &id[i + 1..],
        None => id,
    }
}

fn compare_ids(a: &str, b: &str) -> Ordering {
    let (sa, sb) = (seq_of(a), seq_of(b));
    sa.len()
        .cmp(&sb.len())
        .then_with(|| sa.cmp(sb))
        .then_with(|| a.cmp(b))
}

/// Compare two optional versions. `None` compares as the empty id.
pub fn compare_versions(a: Option<&Version>, b: Option<&Version>) -> Ordering {
    compare_ids(
        a.map(Version::as_str).unwrap_or(""),
        b.map(Version::as_str).unwrap_or(""),
    )
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_ids(&self.0, &other.0)
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({:?})", self.0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Version {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for Version {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
