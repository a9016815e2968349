use blobsync_types::TypeError;

/// Errors from blob and metadata persistence.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A metadata document could not be encoded or decoded.
    #[error("corrupt metadata for {key}: {reason}")]
    CorruptMeta { key: String, reason: String },

    /// A filename did not come from [`encode_filename`](crate::encode_filename).
    #[error("not an encoded filename: {0}")]
    InvalidFilename(String),

    /// The persisted peer identity is unusable.
    #[error("invalid peer identity: {0}")]
    Peer(#[from] TypeError),

    /// A blocking filesystem task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
