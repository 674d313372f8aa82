use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Catalog error: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] core_metadata::MetadataError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Filesystem watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::Task(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
