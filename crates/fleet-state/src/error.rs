use thiserror::Error;

/// Failure reported by a backing store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("unrecognized command: {0}")]
    UnknownCommand(String),
    #[error("unknown client: {0}")]
    ClientNotFound(String),
    #[error("a similar command has already been queued")]
    DuplicateQueued,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("agent link error: {0}")]
    Link(#[from] agent_bus::LinkError),
    #[error("malformed upload payload: {0}")]
    BadUpload(#[from] base64::DecodeError),
    #[error("media write failed: {0}")]
    Blob(#[from] std::io::Error),
}
