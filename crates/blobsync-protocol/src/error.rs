use blobsync_types::TypeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed event id list {value:?}: {reason}")]
    InvalidEventIds { value: String, reason: String },

    #[error("invalid value for header {0}")]
    InvalidHeader(String),

    #[error("missing {0} header")]
    MissingHeader(&'static str),

    #[error("invalid request path {0:?}")]
    InvalidPath(String),

    #[error("framing error: {0}")]
    Framing(String),

    #[error(transparent)]
    Type(#[from] TypeError),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
