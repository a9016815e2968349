use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    /// The requested version or parents are newer than what the store holds.
    #[error("version unknown for {key}")]
    VersionUnknown { key: String },

    /// A remote endpoint refused the credentials (401 / 403).
    #[error("unauthorized ({status}) at {url}")]
    Unauthorized { status: u16, url: String },

    /// A remote endpoint answered with an unexpected status.
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// The remote endpoint could not be reached or the stream broke.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),

    #[error("invalid argument: {0}")]
    Type(#[from] blobsync_types::TypeError),

    #[error("store error: {0}")]
    Store(#[from] blobsync_store::StoreError),

    #[error("protocol error: {0}")]
    Protocol(#[from] blobsync_protocol::ProtocolError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SdkError {
    /// Returns `true` for failures worth retrying after a delay.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SdkError::Transport(_) | SdkError::Status { .. } | SdkError::VersionUnknown { .. }
        )
    }
}

impl From<reqwest::Error> for SdkError {
    fn from(err: reqwest::Error) -> Self {
        SdkError::Transport(err.to_string())
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
