use thiserror::Error;

pub type TabsyncResult<T> = Result<T, TabsyncError>;

#[derive(Debug, Error)]
pub enum TabsyncError {
    #[error("storage is not available")]
    StorageUnavailable,

    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
