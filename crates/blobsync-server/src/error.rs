use axum::http::StatusCode;
use blobsync_protocol::{status, ProtocolError};
use blobsync_sdk::SdkError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("authorization denied: {action}")]
    AuthorizationDenied { action: String },

    /// Stored content type is not among the accepted ones. The message is
    /// sent as the response body.
    #[error("{0}")]
    NotAcceptable(String),

    #[error("method {0} not allowed")]
    MethodNotAllowed(String),

    #[error("request body rejected: {0}")]
    PayloadTooLarge(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Sdk(#[from] SdkError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// The HTTP status this error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            Self::AuthorizationDenied { .. } => StatusCode::FORBIDDEN,
            Self::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Protocol(_) => StatusCode::BAD_REQUEST,
            Self::Sdk(err) => match err {
                SdkError::VersionUnknown { .. } => status::version_unknown(),
                SdkError::Type(_) | SdkError::Protocol(_) => StatusCode::BAD_REQUEST,
                SdkError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
