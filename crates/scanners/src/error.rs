use thiserror::Error;

/// Result type for scanner operations
pub type Result<T> = std::result::Result<T, ScanError>;

/// Errors raised while reading or parsing an artifact.
///
/// Only unreadable artifacts surface as errors; malformed syntax yields an
/// empty fact list instead.
#[derive(Error, Debug)]
pub enum ScanError {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Artifact is not valid UTF-8
    #[error("{path} is not valid UTF-8")]
    Decode { path: String },

    /// Tree-sitter could not be initialized
    #[error("Tree-sitter error: {0}")]
    TreeSitter(String),

    /// Artifact could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),
}

impl ScanError {
    pub fn decode(path: impl Into<String>) -> Self {
        Self::Decode { path: path.into() }
    }

    pub fn tree_sitter(msg: impl Into<String>) -> Self {
        Self::TreeSitter(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
