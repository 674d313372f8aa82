use core_library::LibraryError;
use core_metadata::MetadataError;
use core_sync::SyncError;
use thiserror::Error;

/// Errors surfaced by [`crate::LibraryService`]
///
/// Absence and bad input from the lower crates are lifted into `NotFound` and
/// `InvalidInput`, so a transport layer only needs to match on this enum.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Operation '{operation}' is disabled in read-only mode")]
    ReadOnly { operation: String },

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Library error: {0}")]
    Library(LibraryError),

    #[error("Metadata error: {0}")]
    Metadata(MetadataError),

    #[error("Sync error: {0}")]
    Sync(SyncError),
}

impl CoreError {
    pub fn song_not_found(id: impl ToString) -> Self {
        CoreError::NotFound {
            entity_type: "Song".to_string(),
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound { .. })
    }
}

impl From<LibraryError> for CoreError {
    fn from(err: LibraryError) -> Self {
        match err {
            LibraryError::NotFound { entity_type, id } => CoreError::NotFound { entity_type, id },
            LibraryError::InvalidInput { field, message } => {
                CoreError::InvalidInput { field, message }
            }
            other => CoreError::Library(other),
        }
    }
}

impl From<MetadataError> for CoreError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::NoPicture { filename } => CoreError::NotFound {
                entity_type: "Image".to_string(),
                id: filename,
            },
            other => CoreError::Metadata(other),
        }
    }
}

impl From<SyncError> for CoreError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Library(inner) => inner.into(),
            other => CoreError::Sync(other),
        }
    }
}

impl From<tokio::task::JoinError> for CoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        CoreError::Sync(SyncError::from(err))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
