/// Metadata error types
use thiserror::Error;

/// Result type alias using `MetadataError`
pub type Result<T> = std::result::Result<T, MetadataError>;

/// Errors from metadata extraction and cache persistence
#[derive(Error, Debug)]
pub enum MetadataError {
    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Failed to parse the file's tags or properties
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Cache persistence failed
    #[error("Cache store error: {0}")]
    Store(String),

    /// The extraction task was cancelled before completing
    #[error("Extraction cancelled")]
    Cancelled,

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl From<coda_core::CoreError> for MetadataError {
    fn from(err: coda_core::CoreError) -> Self {
        MetadataError::Store(err.to_string())
    }
}
