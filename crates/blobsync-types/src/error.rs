use thiserror::Error;

/// Errors produced when validating version and peer arguments.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("version must contain exactly one event id, got none")]
    EmptyVersion,

    #[error("version must contain exactly one event id, got {0}")]
    MultipleVersions(usize),

    #[error("parents must contain at most one event id, got {0}")]
    MultipleParents(usize),

    #[error("peer id must not be empty")]
    EmptyPeer,
}

/// Result alias for type validation.
pub type TypeResult<T> = Result<T, TypeError>;
