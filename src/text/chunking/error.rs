//! Error types for page-attributed chunking

/// Error types for corpus building and segmentation
#[derive(thiserror::Error, Debug)]
pub enum ChunkingError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Page marker pattern error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Internal processing error: {0}")]
    Internal(String),
}

/// Result type for chunking operations
pub type Result<T> = std::result::Result<T, ChunkingError>;

impl ChunkingError {
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}
