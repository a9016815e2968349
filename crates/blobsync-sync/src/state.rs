use std::fmt;
use std::time::Duration;

/// Connection state of a sync session, observable through
/// [`SyncHandle::state`](crate::SyncHandle::state).
///
/// Transitions: `Disconnected → Connecting → Connected`, and on failure
/// `Connected | Connecting → Backoff → Connecting`. Any state moves to
/// `Closed` when the session is stopped; nothing leaves `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting before reconnect attempt number `attempt` (starting at 1).
    Backoff { attempt: u32 },
    Closed,
}

impl SyncState {
    pub fn is_closed(&self) -> bool {
        matches!(self, SyncState::Closed)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Backoff { attempt } => write!(f, "backoff (attempt {attempt})"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Delay between reconnect attempts: `base_delay * attempt`, capped at
/// `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3),
        }
    }
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.max(1)).min(self.max_delay)
    }
}
