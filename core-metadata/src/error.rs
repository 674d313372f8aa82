use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Failed to parse tags of {path}: {message}")]
    ParseFailure { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No embedded picture in {filename}")]
    NoPicture { filename: String },

    #[error("Image processing error: {message}")]
    ImageProcessing { message: String },

    #[error("Background task failed: {0}")]
    Task(String),
}

impl MetadataError {
    /// Whether the file itself could not be reached, as opposed to parsed.
    pub fn is_io(&self) -> bool {
        matches!(self, MetadataError::Io(_))
    }
}

impl From<tokio::task::JoinError> for MetadataError {
    fn from(err: tokio::task::JoinError) -> Self {
        MetadataError::Task(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MetadataError>;
