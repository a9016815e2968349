use blobsync_sdk::SdkError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote side refused our credentials.
    #[error("unauthorized ({status}) at {endpoint}")]
    Unauthorized { endpoint: String, status: u16 },

    /// One direction of the link stopped without an error.
    #[error("link closed: {0}")]
    LinkClosed(String),

    #[error("hook rejected connection: {0}")]
    Hook(String),

    #[error(transparent)]
    Sdk(#[from] SdkError),
}

pub type SyncResult<T> = Result<T, SyncError>;
