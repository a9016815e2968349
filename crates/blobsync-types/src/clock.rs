use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::version::Version;

/// Generator of strictly increasing versions for one store instance.
///
/// A new sequence number is `max(wall_clock_ms, last_issued + 1, prev_seq + 1)`,
/// which survives clock skew, backwards clock jumps, and rapid successive
/// writes within one millisecond. The peer prefix keeps versions from
/// different instances distinct even when they share a sequence number.
///
/// When the previous version's suffix is not a plain `u64` (caller-supplied
/// tokens such as `"11.0"`), the clock falls back to a power of ten one digit
/// longer than that suffix, which the comparator always ranks higher.
pub struct VersionClock {
    last_ms: Mutex<u64>,
}

impl VersionClock {
    /// Create a clock that has not issued anything yet.
    pub fn new() -> Self {
        Self {
            last_ms: Mutex::new(0),
        }
    }

    /// Produce the next version for `peer`, strictly newer than `prev`.
    pub fn next(&self, peer: &str, prev: Option<&Version>) -> Version {
        let wall = Self::wall_clock_ms();
        let mut last = self.last_ms.lock().expect("clock mutex poisoned");

        let floor = last.saturating_add(1).max(wall);
        let candidate = match prev.map(Version::seq) {
            None => Some(floor),
            Some(seq) => parse_seq(seq)
                .and_then(|n| n.checked_add(1))
                .map(|n| n.max(floor)),
        };

        if let Some(seq) = candidate {
            let version = Version::from_parts(peer, seq);
            if version.is_newer_than(prev) {
                *last = (*last).max(seq);
                return version;
            }
        }

        let width = prev.map(|p| p.seq().len()).unwrap_or(0);
        Version::from_parts(peer, format!("1{}", "0".repeat(width)))
    }

    /// Current wall-clock time in milliseconds since the UNIX epoch.
    fn wall_clock_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

impl Default for VersionClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a suffix that consists only of ASCII digits.
fn parse_seq(seq: &str) -> Option<u64> {
    if seq.is_empty() || !seq.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    seq.parse().ok()
}
